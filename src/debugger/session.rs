//! Emulation executor.
//!
//! A single thread owns the [`Debugger`] (and so the machine and the trap table) and is
//! the only writer of engine state. Other executors talk to it through [`SessionHandle`],
//! every request is a command sent over a channel with an optional reply channel.
//! While the machine runs, the command channel is drained at every instruction boundary.

use crate::debugger::machine::{Machine, Registers, ResetKind, TargetContext};
use crate::debugger::trap::{TrapId, TrapKind};
use crate::debugger::{Debugger, Error, EventHook};
use crate::server::target::{Control, DebugTarget};
use crate::{muted_error, weak_error, xr_debug, xr_info, xr_warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

enum EngineCommand {
    State(SyncSender<Registers>),
    ReadMemory {
        start: u16,
        buf: Vec<u8>,
        reply: SyncSender<Vec<u8>>,
    },
    SetTrap {
        address: u16,
        kind: TrapKind,
        reply: SyncSender<Result<TrapId, Error>>,
    },
    ClearTrap {
        id: TrapId,
        reply: SyncSender<Result<(), Error>>,
    },
    Control {
        control: Control,
        done: SyncSender<()>,
    },
    Shutdown,
}

#[derive(Clone, Copy, PartialEq)]
enum Flow {
    Proceed,
    Exit,
}

/// Start emulation executor thread.
///
/// # Arguments
///
/// * `debugger`: execution controller, moved into the executor
/// * `request_timeout`: how long state, memory and non-blocking control requests wait
///   for an answer
pub fn spawn<M, H>(
    debugger: Debugger<M, H>,
    request_timeout: Duration,
) -> Result<(SessionHandle, JoinHandle<()>), Error>
where
    M: Machine + Send + 'static,
    H: EventHook + Send + 'static,
{
    let context = debugger.machine().context();
    let (sender, receiver) = mpsc::channel();

    let thread = thread::Builder::new()
        .name("xray-emulation".to_string())
        .spawn(move || executor_loop(debugger, receiver))?;

    Ok((
        SessionHandle {
            sender,
            context,
            request_timeout,
        },
        thread,
    ))
}

fn executor_loop<M: Machine, H: EventHook>(
    mut debugger: Debugger<M, H>,
    receiver: Receiver<EngineCommand>,
) {
    while let Ok(command) = receiver.recv() {
        if serve(&mut debugger, command, Some(&receiver)) == Flow::Exit {
            break;
        }
    }
    xr_debug!(target: "debugger", "emulation executor finished");
}

/// Serve a single command. `receiver` is `None` if the machine is running, in this
/// case controls that start execution are rejected.
fn serve<M: Machine, H: EventHook>(
    debugger: &mut Debugger<M, H>,
    command: EngineCommand,
    receiver: Option<&Receiver<EngineCommand>>,
) -> Flow {
    match command {
        EngineCommand::State(reply) => {
            muted_error!(reply.send(debugger.machine().registers()));
        }
        EngineCommand::ReadMemory {
            start,
            mut buf,
            reply,
        } => {
            let machine = debugger.machine();
            for (offset, byte) in buf.iter_mut().enumerate() {
                *byte = machine.read_memory(start.wrapping_add(offset as u16));
            }
            muted_error!(reply.send(buf));
        }
        EngineCommand::SetTrap {
            address,
            kind,
            reply,
        } => {
            muted_error!(reply.send(debugger.set_trap(address, kind)));
        }
        EngineCommand::ClearTrap { id, reply } => {
            muted_error!(reply.send(debugger.clear_trap(id).map(|_| ())));
        }
        EngineCommand::Control { control, done } => {
            let flow = match receiver {
                Some(receiver) => apply_control(debugger, control, receiver),
                None => {
                    apply_control_while_running(debugger, control);
                    Flow::Proceed
                }
            };
            muted_error!(done.send(()));
            return flow;
        }
        EngineCommand::Shutdown => {
            debugger.pause();
            return Flow::Exit;
        }
    }
    Flow::Proceed
}

fn apply_control<M: Machine, H: EventHook>(
    debugger: &mut Debugger<M, H>,
    control: Control,
    receiver: &Receiver<EngineCommand>,
) -> Flow {
    match control {
        Control::Step => debugger.step(false),
        Control::Continue | Control::StepOver => return run_serving(debugger, control, receiver),
        Control::Halt => debugger.halt(),
        Control::Pause => xr_debug!(target: "debugger", "machine is not running, pause ignored"),
        Control::SoftReset => debugger.reset(ResetKind::Soft),
        Control::HardReset => debugger.reset(ResetKind::Hard),
    }
    Flow::Proceed
}

fn apply_control_while_running<M: Machine, H: EventHook>(
    debugger: &mut Debugger<M, H>,
    control: Control,
) {
    match control {
        Control::Halt => debugger.halt(),
        Control::Pause => debugger.pause(),
        Control::SoftReset => debugger.reset(ResetKind::Soft),
        Control::HardReset => debugger.reset(ResetKind::Hard),
        Control::Step | Control::Continue | Control::StepOver => {
            xr_warn!(target: "debugger", "machine is running, `{control}` ignored")
        }
    }
}

/// Run the machine, serving incoming commands at every instruction boundary.
fn run_serving<M: Machine, H: EventHook>(
    debugger: &mut Debugger<M, H>,
    control: Control,
    receiver: &Receiver<EngineCommand>,
) -> Flow {
    let mut flow = Flow::Proceed;
    let drain = |debugger: &mut Debugger<M, H>| {
        while let Ok(command) = receiver.try_recv() {
            if serve(debugger, command, None) == Flow::Exit {
                flow = Flow::Exit;
            }
        }
    };

    let report = match control {
        Control::StepOver => debugger.step_over_with(drain),
        _ => debugger.run_with(false, drain),
    };
    xr_info!(
        target: "debugger",
        "{control} finished after {} instruction(s) ({} checked)",
        report.continuous_steps + report.checked_steps,
        report.checked_steps
    );
    flow
}

/// Client side of the emulation executor.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<EngineCommand>,
    context: TargetContext,
    request_timeout: Duration,
}

impl SessionHandle {
    fn request<T>(
        &self,
        cmd: impl FnOnce(SyncSender<T>) -> EngineCommand,
        timeout: Option<Duration>,
    ) -> Result<T, Error> {
        let (sender, receiver) = mpsc::sync_channel(1);
        self.sender
            .send(cmd(sender))
            .map_err(|_| Error::ExecutorGone)?;

        match timeout {
            None => receiver.recv().map_err(|_| Error::ExecutorGone),
            Some(timeout) => receiver.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => Error::ExecutorTimeout(timeout),
                RecvTimeoutError::Disconnected => Error::ExecutorGone,
            }),
        }
    }

    /// Ask the executor to stop, a running machine is paused first.
    pub fn shutdown(&self) {
        weak_error!(
            self.sender
                .send(EngineCommand::Shutdown)
                .map_err(|_| Error::ExecutorGone),
            "shutdown:"
        );
    }
}

impl DebugTarget for SessionHandle {
    fn context(&self) -> &TargetContext {
        &self.context
    }

    fn state(&self) -> Result<Registers, Error> {
        self.request(EngineCommand::State, Some(self.request_timeout))
    }

    fn read_memory(&self, start: u16, buf: &mut Vec<u8>) -> Result<(), Error> {
        let data = self.request(
            |reply| EngineCommand::ReadMemory {
                start,
                buf: std::mem::take(buf),
                reply,
            },
            Some(self.request_timeout),
        )?;
        *buf = data;
        Ok(())
    }

    fn control(&self, control: Control) -> Result<(), Error> {
        let timeout = (!control.is_blocking()).then_some(self.request_timeout);
        self.request(|done| EngineCommand::Control { control, done }, timeout)
    }

    // trap edits have no reply timeout, a queued edit is applied anyway and must not be
    // reported as failed. They are served at every instruction boundary.
    fn set_trap(&self, address: u16, kind: TrapKind) -> Result<TrapId, Error> {
        self.request(
            |reply| EngineCommand::SetTrap {
                address,
                kind,
                reply,
            },
            None,
        )?
    }

    fn clear_trap(&self, id: TrapId) -> Result<(), Error> {
        self.request(
            |reply| EngineCommand::ClearTrap { id, reply },
            None,
        )?
    }
}
