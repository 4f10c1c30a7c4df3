//! Boundary between the debugger and an emulation core.
//!
//! The debugger never looks into emulator internals, everything it needs is requested
//! through the [`Machine`] trait.

use serde::Serialize;
use strum_macros::Display;

/// Descriptive information about the system under test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetContext {
    pub system_name: String,
    pub model: u8,
}

/// CPU register file, flags and counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Registers {
    pub pc: u16,
    pub sp: u16,
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub af_prime: u16,
    pub bc_prime: u16,
    pub de_prime: u16,
    pub hl_prime: u16,
    pub ix: u16,
    pub iy: u16,
    pub i: u8,
    /// Lower 7 bits of the refresh register.
    pub r: u8,
    /// Bit 7 of the refresh register as last loaded.
    pub r7: u8,
    pub iff1: u8,
    pub iff2: u8,
    pub interrupt_mode: u8,
    pub t_state_counter: u64,
    pub clock_mhz: f32,
}

/// Outcome of a single executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stepped {
    Executed,
    /// Emulator trap instruction was executed, machine asks to stop.
    DebugRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ResetKind {
    /// Assert the reset line of devices only.
    #[strum(serialize = "soft")]
    Soft,
    /// Reinitialize CPU and all devices.
    #[strum(serialize = "hard")]
    Hard,
}

/// Emulation core as seen by the debugger.
pub trait Machine {
    fn context(&self) -> TargetContext;

    /// Current program counter.
    fn pc(&self) -> u16;

    fn read_memory(&self, address: u16) -> u8;

    /// Execute exactly one instruction.
    ///
    /// # Arguments
    ///
    /// * `allow_interrupt`: admit a pending interrupt after the instruction
    fn step(&mut self, allow_interrupt: bool) -> Stepped;

    fn registers(&self) -> Registers;

    fn reset(&mut self, kind: ResetKind);

    /// Human readable form of the instruction at address.
    fn disassemble(&self, address: u16) -> String {
        format!("{address:04x}  {:02x}", self.read_memory(address))
    }

    /// Return address following the current instruction if it transfers control and
    /// comes back (call, restart, block repeat), `None` for any other instruction.
    fn step_over_target(&self) -> Option<u16> {
        None
    }
}
