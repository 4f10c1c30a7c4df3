//! Action runner.
//!
//! Blocking controls (continue, step over) never run on the network executor. They are
//! put into a single pending slot and performed by a dedicated thread, which also keeps
//! [`RunFlags`] up to date.

use crate::debugger::Error;
use crate::server::scheduler::RunFlags;
use crate::server::target::{Control, DebugTarget};
use crate::{weak_error, xr_debug};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

pub struct ActionRunner {
    pending: SyncSender<Control>,
    flags: Arc<RunFlags>,
    thread: JoinHandle<()>,
}

impl ActionRunner {
    pub fn spawn(target: Arc<dyn DebugTarget>, flags: Arc<RunFlags>) -> Result<Self, Error> {
        let (pending, receiver) = mpsc::sync_channel::<Control>(1);

        let thread = thread::Builder::new()
            .name("xray-action-runner".to_string())
            .spawn({
                let flags = flags.clone();
                move || {
                    while let Ok(control) = receiver.recv() {
                        xr_debug!(target: "server", "runner: {control} started");
                        weak_error!(target.control(control), "runner:");
                        flags.finish();
                        xr_debug!(target: "server", "runner: {control} finished");
                    }
                }
            })?;

        Ok(Self {
            pending,
            flags,
            thread,
        })
    }

    /// Queue a blocking control. Rejected if another one is running or pending.
    pub fn submit(&self, control: Control) -> Result<(), Error> {
        if !self.flags.try_start() {
            return Err(Error::RunnerBusy(control.into()));
        }

        match self.pending.try_send(control) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.flags.cancel();
                Err(Error::RunnerBusy(control.into()))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.flags.cancel();
                Err(Error::ExecutorGone)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.flags.is_running()
    }

    /// Close the pending slot, pause the machine while an action is still running and
    /// wait for the runner thread.
    pub fn shutdown(self, target: &dyn DebugTarget) {
        drop(self.pending);
        while !self.thread.is_finished() {
            if self.flags.is_running() {
                weak_error!(target.control(Control::Pause), "runner shutdown:");
            }
            thread::sleep(SHUTDOWN_POLL);
        }
        _ = self.thread.join();
        xr_debug!(target: "server", "runner: stopped");
    }
}
