use crate::common::{counter_debugger, TestInfo, COUNTER_ADDR};
use serial_test::serial;
use xray::debugger::trap::{TrapKind, WatchpointChange};
use xray::debugger::StopReason;

#[test]
#[serial]
fn test_watchpoint_works() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    let wp = debugger.set_trap(COUNTER_ADDR, TrapKind::WATCHPOINT).unwrap();
    assert_eq!(debugger.traps().get(wp).unwrap().last_byte, 0);
    assert_eq!(debugger.traps().watchpoint_count(), 1);

    let report = debugger.run(false);
    assert_eq!(report.reason, StopReason::Watchpoint { pc: 0x0006 });
    assert_eq!(
        report.changes,
        vec![WatchpointChange {
            trap: wp,
            address: COUNTER_ADDR,
            old_value: 0,
            new_value: 1,
        }]
    );
    assert_eq!(info.addr.take(), Some(0x0006));
    assert_eq!(info.changes.take(), report.changes);

    let report = debugger.run(false);
    assert_eq!(report.reason, StopReason::Watchpoint { pc: 0x0006 });
    assert_eq!(report.changes[0].old_value, 1);
    assert_eq!(report.changes[0].new_value, 2);
    assert_eq!(report.checked_steps, 3);

    // watchpoint is not a one shot trap
    assert_eq!(debugger.traps().len(), 1);
}

#[test]
#[serial]
fn test_watchpoint_without_changes() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    debugger.set_trap(0x5000, TrapKind::WATCHPOINT).unwrap();
    debugger.set_trap(0x0006, TrapKind::BREAKPOINT).unwrap();

    for _ in 0..3 {
        let report = debugger.run(false);
        assert_eq!(report.reason.pc(), 0x0006);
        assert!(matches!(report.reason, StopReason::Trap { .. }));
        assert!(report.changes.is_empty());
    }
    assert!(info.changes.take().is_empty());
}

#[test]
#[serial]
fn test_breakpoint_and_watchpoint_at_same_step() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    debugger.set_trap(COUNTER_ADDR, TrapKind::WATCHPOINT).unwrap();
    debugger.set_trap(0x0006, TrapKind::BREAKPOINT).unwrap();

    let report = debugger.run(false);
    assert_eq!(
        report.reason,
        StopReason::Trap {
            pc: 0x0006,
            kind: TrapKind::BREAKPOINT
        }
    );
    assert_eq!(report.changes.len(), 1);
    assert_eq!(info.changes.take().len(), 1);
}

#[test]
#[serial]
fn test_watchpoint_snapshot_is_taken_on_set() {
    let info = TestInfo::default();
    let mut debugger = counter_debugger(&info);
    debugger.machine_mut().poke(COUNTER_ADDR, 1);

    // first store writes the same value, no change is detected
    let wp = debugger.set_trap(COUNTER_ADDR, TrapKind::WATCHPOINT).unwrap();
    assert_eq!(debugger.traps().get(wp).unwrap().last_byte, 1);
    let report = debugger.run(false);
    assert_eq!(report.changes[0].old_value, 1);
    assert_eq!(report.changes[0].new_value, 2);
    assert_eq!(report.checked_steps, 6);

    debugger.clear_trap(wp).unwrap();
    assert_eq!(debugger.traps().watchpoint_count(), 0);
}
