use crate::common::{COUNTER, COUNTER_ADDR};
use serial_test::serial;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use xray::debugger::machine::{Machine, Registers, ResetKind, Stepped, TargetContext};
use xray::debugger::session::{self, SessionHandle};
use xray::debugger::trap::TrapKind;
use xray::debugger::{Debugger, Error, NopHook};
use xray::demo::DemoMachine;
use xray::server::target::{Control, DebugTarget};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn counter_session() -> (SessionHandle, JoinHandle<()>) {
    let machine = DemoMachine::with_program(0, COUNTER);
    session::spawn(Debugger::new(machine, NopHook::default()), REQUEST_TIMEOUT).unwrap()
}

fn counter_value(session: &SessionHandle) -> u8 {
    let mut buf = vec![0; 1];
    session.read_memory(COUNTER_ADDR, &mut buf).unwrap();
    buf[0]
}

fn t_states(session: &SessionHandle) -> u64 {
    session.state().unwrap().t_state_counter
}

/// Start continuous execution in a background thread, return when the machine is
/// observed running.
fn continue_in_background(session: &SessionHandle) -> JoinHandle<Result<(), Error>> {
    let start = t_states(session);
    let background = session.clone();
    let run = thread::spawn(move || background.control(Control::Continue));

    let deadline = Instant::now() + Duration::from_secs(5);
    while t_states(session) == start {
        assert!(Instant::now() < deadline, "machine is not running");
        thread::sleep(Duration::from_millis(1));
    }
    run
}

#[test]
#[serial]
fn test_session_requests() {
    let (session, emulation) = counter_session();
    assert_eq!(session.context().system_name, "xray demo");
    assert_eq!(session.state().unwrap().pc, 0);

    session.control(Control::Step).unwrap();
    assert_eq!(session.state().unwrap().pc, 0x0002);

    let id = session.set_trap(0x0006, TrapKind::BREAKPOINT).unwrap();
    session.control(Control::Continue).unwrap();
    assert_eq!(session.state().unwrap().pc, 0x0006);
    assert_eq!(counter_value(&session), 1);

    session.clear_trap(id).unwrap();
    assert!(matches!(
        session.clear_trap(id),
        Err(Error::TrapNotFound(_))
    ));

    let mut buf = vec![0; 4];
    session.read_memory(0xFFFF, &mut buf).unwrap();
    assert_eq!(buf, vec![0, 0x3E, 0x00, 0x3C]);

    session.shutdown();
    emulation.join().unwrap();
    assert!(matches!(session.state(), Err(Error::ExecutorGone)));
}

#[test]
#[serial]
fn test_session_serves_while_running() {
    let (session, emulation) = counter_session();
    let run = continue_in_background(&session);

    // requests are answered between instructions
    let first = t_states(&session);
    thread::sleep(Duration::from_millis(10));
    assert!(t_states(&session) > first);

    // trap set while running stops the machine
    session.set_trap(0x0003, TrapKind::BREAKPOINT).unwrap();
    run.join().unwrap().unwrap();
    assert_eq!(session.state().unwrap().pc, 0x0003);

    session.shutdown();
    emulation.join().unwrap();
}

#[test]
#[serial]
fn test_session_halt_and_pause() {
    let (session, emulation) = counter_session();

    let run = continue_in_background(&session);
    session.control(Control::Pause).unwrap();
    run.join().unwrap().unwrap();
    let paused = t_states(&session);
    thread::sleep(Duration::from_millis(10));
    assert_eq!(t_states(&session), paused);

    let run = continue_in_background(&session);
    session.control(Control::Halt).unwrap();
    run.join().unwrap().unwrap();
    let halted_at = session.state().unwrap().pc;
    assert!((0x0002..=0x0006).contains(&halted_at));

    // stopped machine can be stepped
    session.control(Control::Step).unwrap();
    assert_ne!(session.state().unwrap().pc, halted_at);

    session.shutdown();
    emulation.join().unwrap();
}

#[test]
#[serial]
fn test_session_reset() {
    let (session, emulation) = counter_session();
    for _ in 0..4 {
        session.control(Control::Step).unwrap();
    }
    assert_eq!(session.state().unwrap().pc, 0x0002);

    session.control(Control::SoftReset).unwrap();
    assert_eq!(session.state().unwrap().pc, 0);

    session.control(Control::Step).unwrap();
    session.control(Control::Step).unwrap();
    session.control(Control::HardReset).unwrap();
    let registers = session.state().unwrap();
    assert_eq!(registers.pc, 0);
    assert_eq!(registers.af, 0);
    // reset does not start execution
    thread::sleep(Duration::from_millis(10));
    assert_eq!(session.state().unwrap().pc, 0);

    session.shutdown();
    emulation.join().unwrap();
}

#[test]
#[serial]
fn test_session_shutdown_while_running() {
    let (session, emulation) = counter_session();
    let run = continue_in_background(&session);

    session.shutdown();
    emulation.join().unwrap();
    run.join().unwrap().unwrap();
}

/// Demo machine that needs `delay` for every instruction.
struct SlowMachine {
    inner: DemoMachine,
    delay: Duration,
}

impl Machine for SlowMachine {
    fn context(&self) -> TargetContext {
        self.inner.context()
    }

    fn pc(&self) -> u16 {
        self.inner.pc()
    }

    fn read_memory(&self, address: u16) -> u8 {
        self.inner.read_memory(address)
    }

    fn step(&mut self, allow_interrupt: bool) -> Stepped {
        thread::sleep(self.delay);
        self.inner.step(allow_interrupt)
    }

    fn registers(&self) -> Registers {
        self.inner.registers()
    }

    fn reset(&mut self, kind: ResetKind) {
        self.inner.reset(kind)
    }
}

#[test]
#[serial]
fn test_trap_edits_outlast_request_timeout() {
    let machine = SlowMachine {
        inner: DemoMachine::with_program(0, COUNTER),
        delay: Duration::from_millis(30),
    };
    let (session, emulation) = session::spawn(
        Debugger::new(machine, NopHook::default()),
        Duration::from_millis(5),
    )
    .unwrap();

    let background = session.clone();
    let run = thread::spawn(move || background.control(Control::Continue));
    thread::sleep(Duration::from_millis(50));

    // edit is served at the next instruction boundary, after the request timeout
    let id = session.set_trap(0x0002, TrapKind::BREAKPOINT).unwrap();
    run.join().unwrap().unwrap();
    assert_eq!(session.state().unwrap().pc, 0x0002);

    let background = session.clone();
    let run = thread::spawn(move || background.control(Control::Continue));
    thread::sleep(Duration::from_millis(50));

    session.clear_trap(id).unwrap();
    assert!(matches!(
        session.clear_trap(id),
        Err(Error::TrapNotFound(_))
    ));

    session.shutdown();
    emulation.join().unwrap();
    run.join().unwrap().unwrap();
}
