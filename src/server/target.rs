use crate::debugger::machine::{Registers, TargetContext};
use crate::debugger::trap::{TrapId, TrapKind};
use crate::debugger::Error;
use crate::server::resources::{self, Resource};
use std::borrow::Cow;
use strum_macros::{Display, IntoStaticStr};

/// Execution control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum Control {
    #[strum(serialize = "step")]
    Step,
    #[strum(serialize = "step-over")]
    StepOver,
    #[strum(serialize = "continue")]
    Continue,
    #[strum(serialize = "stop")]
    Halt,
    #[strum(serialize = "pause")]
    Pause,
    #[strum(serialize = "soft_reset")]
    SoftReset,
    #[strum(serialize = "hard_reset")]
    HardReset,
}

impl Control {
    /// Return true if control may take unbounded time (runs the machine until a stop).
    pub fn is_blocking(self) -> bool {
        matches!(self, Control::Continue | Control::StepOver)
    }
}

/// Emulation side as seen by the protocol server.
pub trait DebugTarget: Send + Sync {
    fn context(&self) -> &TargetContext;

    /// Return current register file.
    fn state(&self) -> Result<Registers, Error>;

    /// Fill `buf` with live memory starting at `start`, `buf` length is preserved.
    fn read_memory(&self, start: u16, buf: &mut Vec<u8>) -> Result<(), Error>;

    /// Apply a control. Blocking controls return when the machine stops.
    fn control(&self, control: Control) -> Result<(), Error>;

    fn set_trap(&self, address: u16, kind: TrapKind) -> Result<TrapId, Error>;

    fn clear_trap(&self, id: TrapId) -> Result<(), Error>;

    /// Return content of a web UI resource.
    fn resource(&self, resource: Resource) -> Cow<'static, str> {
        Cow::Borrowed(resources::builtin(resource))
    }
}
