//! Tiny Z80 subset machine.
//!
//! Enough of the instruction set to drive the debugger without a real emulator:
//! loads, stores, jumps, calls, restarts, `LDIR` and the `ED F5` emulator trap.
//! Unknown opcodes are executed as `NOP`. The machine has no interrupt sources.

use crate::debugger::machine::{Machine, Registers, ResetKind, Stepped, TargetContext};
use crate::debugger::trap::ADDRESS_SPACE;

const CLOCK_MHZ: f32 = 2.03;

pub struct DemoMachine {
    memory: Vec<u8>,
    regs: Registers,
}

impl Default for DemoMachine {
    fn default() -> Self {
        Self {
            memory: vec![0; ADDRESS_SPACE],
            regs: Registers {
                sp: 0xFFFF,
                clock_mhz: CLOCK_MHZ,
                ..Registers::default()
            },
        }
    }
}

impl DemoMachine {
    /// Create machine with `program` loaded at `org`, execution starts at `org`.
    pub fn with_program(org: u16, program: &[u8]) -> Self {
        let mut machine = Self::default();
        machine.load(org, program);
        machine.regs.pc = org;
        machine
    }

    /// Copy bytes into memory, wrapping at the end of the address space.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        for (offset, byte) in data.iter().enumerate() {
            self.poke(address.wrapping_add(offset as u16), *byte);
        }
    }

    pub fn poke(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }

    pub fn peek(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    pub fn a(&self) -> u8 {
        (self.regs.af >> 8) as u8
    }

    fn set_a(&mut self, value: u8) {
        self.regs.af = (self.regs.af & 0x00FF) | ((value as u16) << 8);
    }

    fn set_zero_flag(&mut self, value: u8) {
        let f = (self.regs.af as u8 & !0x40) | if value == 0 { 0x40 } else { 0 };
        self.regs.af = (self.regs.af & 0xFF00) | f as u16;
    }

    fn word(&self, address: u16) -> u16 {
        u16::from_le_bytes([self.peek(address), self.peek(address.wrapping_add(1))])
    }

    fn push(&mut self, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.poke(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.poke(self.regs.sp, lo);
    }

    fn pop(&mut self) -> u16 {
        let value = self.word(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    /// Execute instruction at pc, return number of T-states and the outcome.
    fn execute(&mut self) -> (u64, Stepped) {
        let pc = self.regs.pc;
        let opcode = self.peek(pc);
        let imm8 = self.peek(pc.wrapping_add(1));
        let imm16 = self.word(pc.wrapping_add(1));
        let next = |len: u16| pc.wrapping_add(len);

        let mut outcome = Stepped::Executed;
        let (t_states, new_pc) = match opcode {
            0x01 => {
                self.regs.bc = imm16;
                (10, next(3))
            }
            0x11 => {
                self.regs.de = imm16;
                (10, next(3))
            }
            0x21 => {
                self.regs.hl = imm16;
                (10, next(3))
            }
            0x31 => {
                self.regs.sp = imm16;
                (10, next(3))
            }
            0x18 => (12, next(2).wrapping_add(imm8 as i8 as u16)),
            0x23 => {
                self.regs.hl = self.regs.hl.wrapping_add(1);
                (6, next(1))
            }
            0x32 => {
                self.poke(imm16, self.a());
                (13, next(3))
            }
            0x3A => {
                self.set_a(self.peek(imm16));
                (13, next(3))
            }
            0x3C => {
                let a = self.a().wrapping_add(1);
                self.set_a(a);
                self.set_zero_flag(a);
                (4, next(1))
            }
            0x3D => {
                let a = self.a().wrapping_sub(1);
                self.set_a(a);
                self.set_zero_flag(a);
                (4, next(1))
            }
            0x3E => {
                self.set_a(imm8);
                (7, next(2))
            }
            // HALT, wait in place for an interrupt that never comes
            0x76 => (4, pc),
            0x77 => {
                self.poke(self.regs.hl, self.a());
                (7, next(1))
            }
            0x7E => {
                self.set_a(self.peek(self.regs.hl));
                (7, next(1))
            }
            0xC3 => (10, imm16),
            0xC9 => (10, self.pop()),
            0xCD => {
                self.push(next(3));
                (17, imm16)
            }
            0xED => match imm8 {
                0xB0 => {
                    let byte = self.peek(self.regs.hl);
                    self.poke(self.regs.de, byte);
                    self.regs.hl = self.regs.hl.wrapping_add(1);
                    self.regs.de = self.regs.de.wrapping_add(1);
                    self.regs.bc = self.regs.bc.wrapping_sub(1);
                    if self.regs.bc != 0 {
                        (21, pc)
                    } else {
                        (16, next(2))
                    }
                }
                0xF5 => {
                    outcome = Stepped::DebugRequest;
                    (8, next(2))
                }
                _ => (8, next(2)),
            },
            0xF3 => {
                self.regs.iff1 = 0;
                self.regs.iff2 = 0;
                (4, next(1))
            }
            0xFB => {
                self.regs.iff1 = 1;
                self.regs.iff2 = 1;
                (4, next(1))
            }
            op if op & 0xC7 == 0xC7 => {
                self.push(next(1));
                (11, (op & 0x38) as u16)
            }
            _ => (4, next(1)),
        };

        self.regs.pc = new_pc;
        (t_states, outcome)
    }

    fn mnemonic(&self, address: u16) -> (u16, String) {
        let opcode = self.peek(address);
        let imm8 = self.peek(address.wrapping_add(1));
        let imm16 = self.word(address.wrapping_add(1));
        match opcode {
            0x00 => (1, "nop".to_string()),
            0x01 => (3, format!("ld bc,{imm16:04x}h")),
            0x11 => (3, format!("ld de,{imm16:04x}h")),
            0x21 => (3, format!("ld hl,{imm16:04x}h")),
            0x31 => (3, format!("ld sp,{imm16:04x}h")),
            0x18 => {
                let target = address.wrapping_add(2).wrapping_add(imm8 as i8 as u16);
                (2, format!("jr {target:04x}h"))
            }
            0x23 => (1, "inc hl".to_string()),
            0x32 => (3, format!("ld ({imm16:04x}h),a")),
            0x3A => (3, format!("ld a,({imm16:04x}h)")),
            0x3C => (1, "inc a".to_string()),
            0x3D => (1, "dec a".to_string()),
            0x3E => (2, format!("ld a,{imm8:02x}h")),
            0x76 => (1, "halt".to_string()),
            0x77 => (1, "ld (hl),a".to_string()),
            0x7E => (1, "ld a,(hl)".to_string()),
            0xC3 => (3, format!("jp {imm16:04x}h")),
            0xC9 => (1, "ret".to_string()),
            0xCD => (3, format!("call {imm16:04x}h")),
            0xED if imm8 == 0xB0 => (2, "ldir".to_string()),
            0xED if imm8 == 0xF5 => (2, "emt_debug".to_string()),
            0xF3 => (1, "di".to_string()),
            0xFB => (1, "ei".to_string()),
            op if op & 0xC7 == 0xC7 => (1, format!("rst {:02x}h", op & 0x38)),
            op => (1, format!("db {op:02x}h")),
        }
    }
}

impl Machine for DemoMachine {
    fn context(&self) -> TargetContext {
        TargetContext {
            system_name: "xray demo".to_string(),
            model: 1,
        }
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn read_memory(&self, address: u16) -> u8 {
        self.peek(address)
    }

    fn step(&mut self, _allow_interrupt: bool) -> Stepped {
        let (t_states, outcome) = self.execute();
        self.regs.t_state_counter += t_states;
        self.regs.r = (self.regs.r.wrapping_add(1)) & 0x7F;
        outcome
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn reset(&mut self, kind: ResetKind) {
        match kind {
            ResetKind::Soft => {
                self.regs.pc = 0;
                self.regs.iff1 = 0;
                self.regs.iff2 = 0;
                self.regs.interrupt_mode = 0;
            }
            ResetKind::Hard => {
                self.regs = Registers {
                    sp: 0xFFFF,
                    clock_mhz: CLOCK_MHZ,
                    ..Registers::default()
                };
            }
        }
    }

    fn disassemble(&self, address: u16) -> String {
        let (len, mnemonic) = self.mnemonic(address);
        let bytes = (0..len)
            .map(|i| format!("{:02x}", self.peek(address.wrapping_add(i))))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{address:04x}  {bytes:<9} {mnemonic}")
    }

    fn step_over_target(&self) -> Option<u16> {
        let pc = self.regs.pc;
        match (self.peek(pc), self.peek(pc.wrapping_add(1))) {
            (0xCD, _) => Some(pc.wrapping_add(3)),
            (0xED, 0xB0) => Some(pc.wrapping_add(2)),
            (op, _) if op & 0xC7 == 0xC7 => Some(pc.wrapping_add(1)),
            _ => None,
        }
    }
}
