use crate::common::{counter_debugger, TestInfo, COUNTER_ADDR};
use serial_test::serial;
use xray::debugger::machine::Machine;
use xray::debugger::trap::TrapKind;
use xray::debugger::{Debugger, ExecState, NopHook, StopReason};
use xray::demo::DemoMachine;

#[test]
#[serial]
fn test_breakpoint_stops_every_time() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    debugger.set_trap(0x0003, TrapKind::BREAKPOINT).unwrap();

    let report = debugger.run(false);
    assert_eq!(
        report.reason,
        StopReason::Trap {
            pc: 0x0003,
            kind: TrapKind::BREAKPOINT
        }
    );
    assert_eq!(report.checked_steps, 2);
    assert_eq!(report.continuous_steps, 0);
    assert_eq!(debugger.state(), ExecState::HaltedByTrap);
    assert_eq!(info.addr.take(), Some(0x0003));
    assert_eq!(info.kind.take(), Some(TrapKind::BREAKPOINT));

    for expected in 2..5 {
        let report = debugger.run(false);
        assert_eq!(report.reason.pc(), 0x0003);
        assert_eq!(debugger.machine().read_memory(COUNTER_ADDR), expected - 1);
        assert_eq!(debugger.machine().registers().af >> 8, expected as u16);
    }
    assert_eq!(debugger.traps().len(), 1);
}

#[test]
#[serial]
fn test_break_once_stops_only_once() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    debugger.set_trap(0x0006, TrapKind::BREAK_ONCE).unwrap();

    let report = debugger.run(false);
    assert_eq!(
        report.reason,
        StopReason::Trap {
            pc: 0x0006,
            kind: TrapKind::BREAK_ONCE
        }
    );
    assert!(debugger.traps().is_empty());
    assert_eq!(debugger.traps().flags_at(0x0006), TrapKind::empty());

    // no traps left, next run goes through 0006h until stopped from outside
    let mut boundaries = 0;
    let report = debugger.run_with(false, |debugger| {
        boundaries += 1;
        if boundaries == 1000 {
            debugger.pause();
        }
    });
    assert!(matches!(report.reason, StopReason::Request { .. }));
    assert_eq!(report.continuous_steps, 1000);
    assert_eq!(report.checked_steps, 0);
    assert_eq!(debugger.state(), ExecState::HaltedByRequest);
}

#[test]
#[serial]
fn test_continuous_mode_only_without_traps() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);

    // trace display forces checked execution
    debugger.set_trace(true);
    let mut boundaries = 0;
    let report = debugger.run_with(false, |debugger| {
        boundaries += 1;
        if boundaries == 10 {
            debugger.pause();
        }
    });
    assert_eq!(report.checked_steps, 10);
    assert_eq!(report.continuous_steps, 0);

    // so does the force flag
    debugger.set_trace(false);
    let mut boundaries = 0;
    let report = debugger.run_with(true, |debugger| {
        boundaries += 1;
        if boundaries == 10 {
            debugger.pause();
        }
    });
    assert_eq!(report.checked_steps, 10);
    assert_eq!(report.continuous_steps, 0);

    // trap set from the boundary callback switches mode on the next instruction
    let mut boundaries = 0;
    let report = debugger.run_with(false, |debugger| {
        boundaries += 1;
        if boundaries == 5 {
            debugger.set_trap(0x0003, TrapKind::BREAKPOINT).unwrap();
        }
    });
    assert_eq!(report.continuous_steps, 5);
    assert!(report.checked_steps > 0);
    assert_eq!(report.reason.pc(), 0x0003);
}

#[test]
#[serial]
fn test_halt_leaves_temporary_breakpoint() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);

    let mut boundaries = 0;
    let report = debugger.run_with(false, |debugger| {
        boundaries += 1;
        if boundaries == 7 {
            debugger.halt();
        }
    });
    let StopReason::Request { pc } = report.reason else {
        panic!("unexpected stop reason {:?}", report.reason);
    };
    assert_eq!(pc, debugger.machine().pc());
    assert_eq!(debugger.state(), ExecState::HaltedByRequest);
    assert_eq!(debugger.traps().flags_at(pc), TrapKind::BREAK_ONCE);

    // loop comes back to the halt address and stops there once
    let report = debugger.run(false);
    assert_eq!(
        report.reason,
        StopReason::Trap {
            pc,
            kind: TrapKind::BREAK_ONCE
        }
    );
    assert!(debugger.traps().is_empty());
}

#[test]
#[serial]
fn test_trace_traps() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    debugger.set_trap(0x0003, TrapKind::TRACE).unwrap();
    debugger.set_trap(0x0006, TrapKind::BREAKPOINT).unwrap();

    let report = debugger.run(false);
    assert_eq!(report.reason.pc(), 0x0006);
    let traces = info.traces.take();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].0, 0x0003);
    assert!(traces[0].1.contains("ld (4000h),a"));
    debugger.clear_all_traps();

    debugger
        .set_trap(0x0003, TrapKind::TRACE_ON | TrapKind::BREAKPOINT)
        .unwrap();
    debugger.run(false);
    assert!(debugger.trace_enabled());
    debugger.clear_all_traps();

    debugger.set_trap(0x0006, TrapKind::TRACE_OFF).unwrap();
    debugger.set_trap(0x0006, TrapKind::BREAKPOINT).unwrap();
    let report = debugger.run(false);
    assert_eq!(report.reason.pc(), 0x0006);
    assert!(!debugger.trace_enabled());
}

#[test]
#[serial]
fn test_clear_traps_at_address() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    let breakpoint = debugger.set_trap(0x0003, TrapKind::BREAKPOINT).unwrap();
    debugger.set_trap(0x0003, TrapKind::BREAK_ONCE).unwrap();
    debugger.set_trap(0x0003, TrapKind::BREAK_ONCE).unwrap();
    assert_eq!(
        debugger.traps().flags_at(0x0003),
        TrapKind::BREAKPOINT | TrapKind::BREAK_ONCE
    );

    assert_eq!(debugger.clear_traps_at(0x0003, Some(TrapKind::BREAK_ONCE)), 2);
    assert_eq!(debugger.traps().flags_at(0x0003), TrapKind::BREAKPOINT);
    assert!(debugger.traps().get(breakpoint).is_some());

    assert_eq!(debugger.clear_traps_at(0x0003, None), 1);
    assert!(debugger.traps().is_empty());
}

#[test]
#[serial]
fn test_machine_debug_request() {
    // inc a, emt_debug, inc a, halt
    let machine = DemoMachine::with_program(0, &[0x3C, 0xED, 0xF5, 0x3C, 0x76]);
    let mut debugger = Debugger::new(machine, NopHook::default());

    let report = debugger.run(false);
    assert_eq!(report.reason, StopReason::MachineRequest { pc: 0x0003 });
    assert_eq!(report.continuous_steps, 2);
    assert_eq!(debugger.state(), ExecState::HaltedByTrap);
    assert_eq!(debugger.machine().a(), 1);
}

#[test]
#[serial]
fn test_trap_table_capacity() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    for addr in 0..100u16 {
        debugger.set_trap(0x8000 + addr, TrapKind::BREAKPOINT).unwrap();
    }
    assert!(debugger.set_trap(0x0003, TrapKind::BREAKPOINT).is_err());

    // freed slot is reused
    debugger.clear_trap(42).unwrap();
    assert_eq!(debugger.set_trap(0x0003, TrapKind::BREAKPOINT).unwrap(), 42);
}

#[test]
#[serial]
fn test_trace_traps_at_entry_address() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    // 0000 is never reached again, only the entry check can see these traps
    debugger
        .set_trap(0x0000, TrapKind::TRACE | TrapKind::TRACE_ON)
        .unwrap();
    debugger.set_trap(0x0006, TrapKind::BREAKPOINT).unwrap();

    let report = debugger.run(false);
    assert_eq!(report.reason.pc(), 0x0006);
    assert!(debugger.trace_enabled());
    let traces = info.traces.take();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].0, 0x0000);
    assert!(traces[0].1.contains("ld a,00h"));

    // run starting at a trace off trap switches the display off
    debugger.set_trap(0x0006, TrapKind::TRACE_OFF).unwrap();
    debugger.set_trap(0x0003, TrapKind::BREAKPOINT).unwrap();
    let report = debugger.run(false);
    assert_eq!(report.reason.pc(), 0x0003);
    assert!(!debugger.trace_enabled());
}
