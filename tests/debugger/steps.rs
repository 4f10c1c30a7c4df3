use crate::common::{calls_debugger, counter_debugger, TestInfo, CALLS_ORG};
use serial_test::serial;
use xray::debugger::machine::Machine;
use xray::debugger::trap::TrapKind;
use xray::debugger::{ExecState, StopReason};

#[test]
#[serial]
fn test_step() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);

    debugger.step(false);
    assert_eq!(debugger.machine().pc(), 0x0002);
    assert_eq!(info.addr.take(), Some(0x0002));
    assert_eq!(debugger.state(), ExecState::HaltedByRequest);

    debugger.step(false);
    debugger.step(false);
    debugger.step(false);
    assert_eq!(debugger.machine().pc(), 0x0002);
    assert_eq!(debugger.machine().a(), 1);
}

#[test]
#[serial]
fn test_step_ignores_traps() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    debugger.set_trap(0x0002, TrapKind::BREAK_ONCE).unwrap();

    debugger.step(false);
    assert_eq!(debugger.machine().pc(), 0x0002);
    assert_eq!(debugger.traps().len(), 1);
    assert_eq!(info.kind.take(), None);
}

#[test]
#[serial]
fn test_step_over_plain_instruction() {
    let info = TestInfo::default();
    let mut debugger = calls_debugger(&info);

    let report = debugger.step_over();
    assert_eq!(report.reason, StopReason::Step { pc: CALLS_ORG + 3 });
    assert_eq!(report.checked_steps, 1);
    assert!(debugger.traps().is_empty());
}

#[test]
#[serial]
fn test_step_over_call_restart_and_block_copy() {
    let info = TestInfo::default();
    let mut debugger = calls_debugger(&info);
    debugger.step_over();
    debugger.step_over();
    debugger.step_over();
    assert_eq!(debugger.machine().pc(), 0x0109);

    // call 0020h
    let report = debugger.step_over();
    assert_eq!(
        report.reason,
        StopReason::Trap {
            pc: 0x010C,
            kind: TrapKind::BREAK_ONCE
        }
    );
    assert_eq!(report.checked_steps, 4);
    assert_eq!(debugger.machine().a(), 2);
    assert!(debugger.traps().is_empty());

    // rst 08h
    let report = debugger.step_over();
    assert_eq!(report.reason.pc(), 0x010D);
    assert_eq!(debugger.machine().a(), 3);
    assert!(debugger.traps().is_empty());

    // ldir, four iterations
    let report = debugger.step_over();
    assert_eq!(report.reason.pc(), 0x010F);
    assert_eq!(report.checked_steps, 4);
    let machine = debugger.machine();
    let copied: Vec<u8> = (0x5000..0x5004).map(|a| machine.read_memory(a)).collect();
    assert_eq!(copied, vec![1, 2, 3, 4]);
    assert_eq!(machine.registers().bc, 0);
}

#[test]
#[serial]
fn test_step_over_stopped_inside_call() {
    let info = TestInfo::default();
    let mut debugger = calls_debugger(&info);
    debugger.machine_mut().set_pc(0x0109);
    debugger.set_trap(0x0021, TrapKind::BREAKPOINT).unwrap();

    let report = debugger.step_over();
    assert_eq!(
        report.reason,
        StopReason::Trap {
            pc: 0x0021,
            kind: TrapKind::BREAKPOINT
        }
    );
    assert_eq!(info.addr.take(), Some(0x0021));

    // temporary breakpoint at the return address is removed, user breakpoint stays
    assert_eq!(debugger.traps().len(), 1);
    assert_eq!(debugger.traps().flags_at(0x010C), TrapKind::empty());
    assert_eq!(debugger.traps().flags_at(0x0021), TrapKind::BREAKPOINT);
}

#[test]
#[serial]
fn test_step_over_keeps_user_break_once_at_return_address() {
    let info = TestInfo::default();
    let mut debugger = calls_debugger(&info);
    debugger.machine_mut().set_pc(0x0109);
    debugger.set_trap(0x0021, TrapKind::BREAKPOINT).unwrap();
    debugger.set_trap(0x010C, TrapKind::BREAK_ONCE).unwrap();

    let report = debugger.step_over();
    assert_eq!(report.reason.pc(), 0x0021);
    // only the step over trap is removed
    assert_eq!(debugger.traps().len(), 2);
    assert_eq!(debugger.traps().flags_at(0x010C), TrapKind::BREAK_ONCE);
}
