pub mod breakpoint;
pub mod error;
pub mod machine;
pub mod session;
pub mod trap;

pub use error::Error;

use crate::debugger::machine::{Machine, ResetKind, Stepped};
use crate::debugger::trap::{TrapEntry, TrapId, TrapKind, TrapTable, WatchpointChange};
use crate::{weak_error, xr_debug, xr_info, xr_warn};
use strum_macros::Display;

/// Callbacks invoked by the execution loop. Used by embedders and tests, everything
/// a hook receives is also written into the log.
pub trait EventHook {
    fn on_breakpoint(&self, pc: u16, kind: TrapKind) -> anyhow::Result<()>;
    fn on_watchpoint(&self, pc: u16, change: &WatchpointChange) -> anyhow::Result<()>;
    fn on_step(&self, pc: u16) -> anyhow::Result<()>;
    fn on_trace(&self, pc: u16, instruction: &str);
}

#[derive(Default)]
pub struct NopHook {}

impl EventHook for NopHook {
    fn on_breakpoint(&self, _: u16, _: TrapKind) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_watchpoint(&self, _: u16, _: &WatchpointChange) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_step(&self, _: u16) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_trace(&self, _: u16, _: &str) {}
}

/// Execution controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ExecState {
    #[strum(serialize = "idle")]
    Idle,
    #[strum(serialize = "stepping")]
    Stepping,
    #[strum(serialize = "running")]
    Continuous,
    #[strum(serialize = "stopped at trap")]
    HaltedByTrap,
    #[strum(serialize = "stopped")]
    HaltedByRequest,
}

/// Why a run has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Program counter reached a breakpoint or a temporary breakpoint.
    Trap { pc: u16, kind: TrapKind },
    /// At least one watched byte changed.
    Watchpoint { pc: u16 },
    /// Machine executed an emulator trap instruction.
    MachineRequest { pc: u16 },
    /// Halt or pause was requested.
    Request { pc: u16 },
    /// Single instruction was executed.
    Step { pc: u16 },
}

impl StopReason {
    pub fn pc(&self) -> u16 {
        match *self {
            StopReason::Trap { pc, .. }
            | StopReason::Watchpoint { pc }
            | StopReason::MachineRequest { pc }
            | StopReason::Request { pc }
            | StopReason::Step { pc } => pc,
        }
    }
}

/// Result of a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub reason: StopReason,
    /// Number of instructions executed without trap checks.
    pub continuous_steps: u64,
    /// Number of instructions executed with trap checks.
    pub checked_steps: u64,
    pub changes: Vec<WatchpointChange>,
}

impl RunReport {
    fn new(pc: u16) -> Self {
        Self {
            reason: StopReason::Request { pc },
            continuous_steps: 0,
            checked_steps: 0,
            changes: vec![],
        }
    }
}

/// Execution controller. Steps the machine, consults the trap table and implements
/// step, run, halt and reset semantics.
pub struct Debugger<M: Machine, H: EventHook = NopHook> {
    machine: M,
    traps: TrapTable,
    hooks: H,
    state: ExecState,
    /// Instruction trace display flag, disassembles every executed instruction.
    print_instructions: bool,
    stop_requested: bool,
}

impl<M: Machine, H: EventHook> Debugger<M, H> {
    pub fn new(machine: M, hooks: H) -> Self {
        Self {
            machine,
            traps: TrapTable::new(),
            hooks,
            state: ExecState::Idle,
            print_instructions: false,
            stop_requested: false,
        }
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    pub fn traps(&self) -> &TrapTable {
        &self.traps
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn trace_enabled(&self) -> bool {
        self.print_instructions
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.print_instructions = enabled;
    }

    /// Set a new trap at address.
    pub fn set_trap(&mut self, address: u16, kind: TrapKind) -> Result<TrapId, Error> {
        let machine = &self.machine;
        let result = self
            .traps
            .set_trap(address, kind, |addr| machine.read_memory(addr));

        match result {
            Ok(id) => {
                xr_info!(target: "debugger", "Set {kind} [{id}] at {address:04x}");
                self.dump_traps();
                Ok(id)
            }
            Err(e) => {
                xr_warn!(target: "debugger", "Cannot set {kind} at {address:04x}: {e}");
                Err(e)
            }
        }
    }

    /// Remove trap by id.
    pub fn clear_trap(&mut self, id: TrapId) -> Result<TrapEntry, Error> {
        let entry = self.traps.clear_trap(id)?;
        xr_info!(target: "debugger", "Cleared {} [{id}] at {:04x}", entry.kind, entry.address);
        self.dump_traps();
        Ok(entry)
    }

    /// Remove all traps at address, see [`TrapTable::clear_traps_at`].
    pub fn clear_traps_at(&mut self, address: u16, filter: Option<TrapKind>) -> usize {
        let cleared = self.traps.clear_traps_at(address, filter);
        if cleared > 0 {
            xr_debug!(target: "debugger", "Cleared {cleared} trap(s) at {address:04x}");
            self.dump_traps();
        }
        cleared
    }

    pub fn clear_all_traps(&mut self) {
        self.traps.clear_all();
        xr_info!(target: "debugger", "All traps cleared");
    }

    /// Execute exactly one instruction.
    pub fn step(&mut self, allow_interrupt: bool) {
        self.state = ExecState::Stepping;
        if self.machine.step(allow_interrupt) == Stepped::DebugRequest {
            xr_debug!(target: "debugger", "Debug request ignored while stepping");
        }
        let pc = self.machine.pc();
        weak_error!(self.hooks.on_step(pc), "step hook:");
        self.state = ExecState::HaltedByRequest;
    }

    /// Run until a stop condition, see [`Debugger::run_with`].
    pub fn run(&mut self, force_stepping: bool) -> RunReport {
        self.run_with(force_stepping, |_| {})
    }

    /// Run until a breakpoint, a watchpoint, a machine debug request or an external stop.
    /// At least one instruction is always executed.
    ///
    /// # Arguments
    ///
    /// * `force_stepping`: check traps even if the trap table is empty
    /// * `between`: called at every instruction boundary, may stop the run with
    ///   [`Debugger::halt`] or [`Debugger::pause`]
    pub fn run_with(
        &mut self,
        force_stepping: bool,
        mut between: impl FnMut(&mut Self),
    ) -> RunReport {
        self.stop_requested = false;
        let entry = self.machine.pc();
        let mut report = RunReport::new(entry);

        // trace flags at the entry address act before the first instruction
        let entry_flags = self.traps.flags_at(entry);
        self.apply_trace_flags(entry, entry_flags);

        let reason = loop {
            // traps may be set while running, mode is decided for every instruction
            let continuous =
                !force_stepping && !self.print_instructions && self.traps.is_empty();

            let reason = if continuous {
                self.state = ExecState::Continuous;
                report.continuous_steps += 1;
                match self.machine.step(false) {
                    Stepped::DebugRequest => Some(StopReason::MachineRequest {
                        pc: self.machine.pc(),
                    }),
                    Stepped::Executed => None,
                }
            } else {
                self.state = ExecState::Stepping;
                report.checked_steps += 1;
                self.checked_step(&mut report.changes)
            };

            if let Some(reason) = reason {
                break reason;
            }

            between(self);
            if self.stop_requested {
                break StopReason::Request {
                    pc: self.machine.pc(),
                };
            }
        };

        self.state = match reason {
            StopReason::Request { .. } => ExecState::HaltedByRequest,
            _ => ExecState::HaltedByTrap,
        };
        xr_info!(target: "debugger", "Stopped at {:04x}", reason.pc());

        report.reason = reason;
        report
    }

    fn checked_step(&mut self, changes: &mut Vec<WatchpointChange>) -> Option<StopReason> {
        if self.print_instructions {
            let line = self.machine.disassemble(self.machine.pc());
            xr_info!(target: "debugger", "{line}");
        }

        let stepped = self.machine.step(false);
        let pc = self.machine.pc();
        let flags = self.traps.flags_at(pc);
        let mut reason = None;

        if !flags.is_empty() {
            self.apply_trace_flags(pc, flags);

            let stop_kind = flags & (TrapKind::BREAKPOINT | TrapKind::BREAK_ONCE);
            if !stop_kind.is_empty() {
                if stop_kind.contains(TrapKind::BREAK_ONCE) {
                    self.clear_traps_at(pc, Some(TrapKind::BREAK_ONCE));
                }
                xr_info!(target: "debugger", "Hit {stop_kind} at {pc:04x}");
                weak_error!(self.hooks.on_breakpoint(pc, stop_kind), "breakpoint hook:");
                reason = Some(StopReason::Trap {
                    pc,
                    kind: stop_kind,
                });
            }
        }

        if self.traps.watchpoint_count() > 0 {
            let start = changes.len();
            let machine = &self.machine;
            if self
                .traps
                .scan_watchpoints(|addr| machine.read_memory(addr), changes)
            {
                for change in &changes[start..] {
                    xr_info!(
                        target: "debugger",
                        "Memory location 0x{:04x} changed value from 0x{:02x} to 0x{:02x}.",
                        change.address,
                        change.old_value,
                        change.new_value
                    );
                    weak_error!(self.hooks.on_watchpoint(pc, change), "watchpoint hook:");
                }
                reason = reason.or(Some(StopReason::Watchpoint { pc }));
            }
        }

        if stepped == Stepped::DebugRequest {
            reason = reason.or(Some(StopReason::MachineRequest { pc }));
        }

        reason
    }

    fn apply_trace_flags(&mut self, pc: u16, flags: TrapKind) {
        if flags.contains(TrapKind::TRACE) {
            let line = self.machine.disassemble(pc);
            xr_info!(target: "debugger", "Trace: {line}");
            self.hooks.on_trace(pc, &line);
        }
        if flags.contains(TrapKind::TRACE_ON) {
            self.print_instructions = true;
        }
        if flags.contains(TrapKind::TRACE_OFF) {
            self.print_instructions = false;
        }
    }

    /// Request a stop and set a temporary breakpoint at current program counter.
    pub fn halt(&mut self) {
        self.stop_requested = true;
        let pc = self.machine.pc();
        weak_error!(self.set_trap(pc, TrapKind::BREAK_ONCE), "halt:");
    }

    /// Request a stop without touching the trap table.
    pub fn pause(&mut self) {
        self.stop_requested = true;
    }

    /// Reset the machine, traps are kept.
    pub fn reset(&mut self, kind: ResetKind) {
        match kind {
            ResetKind::Soft => xr_info!(target: "debugger", "Pressing reset button"),
            ResetKind::Hard => xr_info!(target: "debugger", "Performing hard reset"),
        }
        self.machine.reset(kind);
        self.state = ExecState::Idle;
    }

    /// Step over a call, restart or block repeat instruction, see [`Debugger::step_over_with`].
    pub fn step_over(&mut self) -> RunReport {
        self.step_over_with(|_| {})
    }

    /// Run until the instruction at the program counter returns. Any other instruction
    /// is executed as a single step.
    pub fn step_over_with(&mut self, between: impl FnMut(&mut Self)) -> RunReport {
        let Some(return_to) = self.machine.step_over_target() else {
            return self.single_step();
        };
        let Some(trap) = weak_error!(self.set_trap(return_to, TrapKind::BREAK_ONCE), "step over:")
        else {
            return self.single_step();
        };

        let report = self.run_with(false, between);

        // stopped somewhere else, temporary breakpoint is not needed anymore
        let stale = self
            .traps
            .get(trap)
            .is_some_and(|e| e.address == return_to && e.kind == TrapKind::BREAK_ONCE);
        if stale {
            weak_error!(self.clear_trap(trap));
        }
        report
    }

    fn single_step(&mut self) -> RunReport {
        self.step(false);
        let pc = self.machine.pc();
        RunReport {
            reason: StopReason::Step { pc },
            checked_steps: 1,
            ..RunReport::new(pc)
        }
    }

    fn dump_traps(&self) {
        if log::log_enabled!(target: "debugger", log::Level::Debug) {
            xr_debug!(target: "debugger", "{}", self.traps);
        }
    }
}
