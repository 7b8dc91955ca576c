//! Reference models for the single-register ALU group.
//!
//! Each model derives result and SREG from the instruction set manual's flag
//! equations, never from a simulator.

use crate::avr::flags;
use serde::Serialize;

/// Instructions of the `1001 010d dddd xxxx` group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Instruction {
    /// One's complement
    Com,
    /// Two's complement
    Neg,
    /// Swap nibbles
    Swap,
    Inc,
    Dec,
    /// Arithmetic shift right
    Asr,
    /// Logical shift right
    Lsr,
    /// Rotate right through carry
    Ror,
}

/// Result of applying an instruction to a destination register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub result: u8,
    pub sreg: u8,
}

#[inline(always)]
fn bit(value: u8, n: u8) -> bool {
    value & (1 << n) != 0
}

#[inline(always)]
fn set_if(cond: bool, mask: u8) -> u8 {
    if cond {
        mask
    } else {
        0
    }
}

/// N, Z and S = N ^ V for a result, given the computed V.
fn nzs(result: u8, v: bool) -> u8 {
    let n = bit(result, 7);
    set_if(n, flags::NEGATIVE) | set_if(result == 0, flags::ZERO) | set_if(n ^ v, flags::SIGN)
}

impl Instruction {
    /// SREG bits the instruction writes. Every other bit keeps its value.
    pub const fn affected_flags(self) -> u8 {
        const ARITH: u8 = flags::CARRY
            | flags::ZERO
            | flags::NEGATIVE
            | flags::OVERFLOW
            | flags::SIGN;
        match self {
            Instruction::Com => ARITH,
            Instruction::Neg => ARITH | flags::HALF_CARRY,
            Instruction::Swap => 0,
            Instruction::Inc | Instruction::Dec => {
                flags::ZERO | flags::NEGATIVE | flags::OVERFLOW | flags::SIGN
            }
            Instruction::Asr | Instruction::Lsr | Instruction::Ror => ARITH,
        }
    }

    /// Compute the destination register and SREG after execution.
    pub fn execute(self, rd: u8, sreg: u8) -> Outcome {
        let (result, written) = match self {
            Instruction::Com => {
                let r = 0xFF - rd;
                // V = 0, C = 1
                (r, nzs(r, false) | flags::CARRY)
            }
            Instruction::Neg => {
                let r = 0u8.wrapping_sub(rd);
                let v = r == 0x80;
                let h = bit(r, 3) || bit(rd, 3);
                (
                    r,
                    nzs(r, v)
                        | set_if(v, flags::OVERFLOW)
                        | set_if(r != 0, flags::CARRY)
                        | set_if(h, flags::HALF_CARRY),
                )
            }
            Instruction::Swap => (rd.rotate_left(4), 0),
            Instruction::Inc => {
                let r = rd.wrapping_add(1);
                let v = rd == 0x7F;
                (r, nzs(r, v) | set_if(v, flags::OVERFLOW))
            }
            Instruction::Dec => {
                let r = rd.wrapping_sub(1);
                let v = rd == 0x80;
                (r, nzs(r, v) | set_if(v, flags::OVERFLOW))
            }
            Instruction::Asr => {
                let r = (rd >> 1) | (rd & 0x80);
                shift_flags(rd, r)
            }
            Instruction::Lsr => {
                let r = rd >> 1;
                shift_flags(rd, r)
            }
            Instruction::Ror => {
                let carry_in = set_if(sreg & flags::CARRY != 0, 0x80);
                let r = (rd >> 1) | carry_in;
                shift_flags(rd, r)
            }
        };

        let mask = self.affected_flags();
        Outcome {
            result,
            sreg: (sreg & !mask) | (written & mask),
        }
    }
}

/// Shared flag equations for right shifts: C = Rd0, V = N ^ C.
fn shift_flags(rd: u8, r: u8) -> (u8, u8) {
    let c = bit(rd, 0);
    let v = bit(r, 7) ^ c;
    (
        r,
        nzs(r, v) | set_if(v, flags::OVERFLOW) | set_if(c, flags::CARRY),
    )
}
