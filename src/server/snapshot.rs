use crate::debugger::breakpoint::{BreakpointRecord, BreakpointRegistry};
use crate::debugger::machine::{Registers, TargetContext};
use crate::debugger::Error;
use serde::Serialize;

#[derive(Serialize)]
struct ContextView<'a> {
    system_name: &'a str,
    model: u8,
    running: bool,
}

#[derive(Serialize)]
struct RegistersView {
    pc: u16,
    sp: u16,
    af: u16,
    bc: u16,
    de: u16,
    hl: u16,
    af_prime: u16,
    bc_prime: u16,
    de_prime: u16,
    hl_prime: u16,
    ix: u16,
    iy: u16,
    i: u8,
    r_1: u8,
    r_2: u8,
    z80_t_state_counter: u64,
    z80_clockspeed: f32,
    z80_iff1: u8,
    z80_iff2: u8,
    z80_interrupt_mode: u8,
}

impl From<&Registers> for RegistersView {
    fn from(regs: &Registers) -> Self {
        Self {
            pc: regs.pc,
            sp: regs.sp,
            af: regs.af,
            bc: regs.bc,
            de: regs.de,
            hl: regs.hl,
            af_prime: regs.af_prime,
            bc_prime: regs.bc_prime,
            de_prime: regs.de_prime,
            hl_prime: regs.hl_prime,
            ix: regs.ix,
            iy: regs.iy,
            i: regs.i,
            r_1: regs.r,
            r_2: regs.r7,
            z80_t_state_counter: regs.t_state_counter,
            z80_clockspeed: regs.clock_mhz,
            z80_iff1: regs.iff1,
            z80_iff2: regs.iff2,
            z80_interrupt_mode: regs.interrupt_mode,
        }
    }
}

/// Point-in-time view of the debugged system, derived on demand and never stored.
#[derive(Serialize)]
pub struct Snapshot<'a> {
    context: ContextView<'a>,
    breakpoints: Vec<&'a BreakpointRecord>,
    registers: RegistersView,
}

impl<'a> Snapshot<'a> {
    pub fn new(
        context: &'a TargetContext,
        registers: &Registers,
        breakpoints: &'a BreakpointRegistry,
        running: bool,
    ) -> Self {
        Self {
            context: ContextView {
                system_name: &context.system_name,
                model: context.model,
                running,
            },
            breakpoints: breakpoints.iter().collect(),
            registers: registers.into(),
        }
    }

    /// Encode snapshot as a JSON text.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}
