//! Opcode Test Specifications
//!
//! One `OpcodeSpec` per instruction: the encoding template, the operand
//! bit field and its legal range, the representative operand values and the
//! SREG probe loaded before execution. The table is plain data consumed by
//! the generic case generator and runner.

pub mod oracle;

#[cfg(test)]
mod tests_oracle;

pub use oracle::{Instruction, Outcome};

use crate::avr::{flags, Reg, GPR_COUNT};
use serde::Serialize;
use thiserror::Error;

/// Errors while substituting an operand into an encoding template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{mnemonic}: operand {value} outside legal range {min}..={max}")]
    OutOfRange {
        mnemonic: &'static str,
        value: u8,
        min: u8,
        max: u8,
    },
    #[error("{mnemonic}: operand {value} does not fit a {width}-bit field")]
    TooWide {
        mnemonic: &'static str,
        value: u8,
        width: u8,
    },
    #[error("{mnemonic}: operand r{value} is past the last working register")]
    NoSuchRegister { mnemonic: &'static str, value: u8 },
}

/// Position of an operand inside a 16-bit instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitField {
    pub shift: u8,
    pub width: u8,
}

impl BitField {
    pub const fn new(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    pub const fn mask(self) -> u16 {
        (((1u32 << self.width) - 1) as u16) << self.shift
    }

    pub const fn fits(self, value: u8) -> bool {
        (value as u32) < (1u32 << self.width)
    }

    /// Replace the field's bits in `word` with `value`.
    pub const fn insert(self, word: u16, value: u8) -> u16 {
        (word & !self.mask()) | (((value as u16) << self.shift) & self.mask())
    }

    pub const fn extract(self, word: u16) -> u8 {
        ((word & self.mask()) >> self.shift) as u8
    }
}

/// Registers an instruction may modify.
///
/// Declared per opcode; the destination role resolves to a concrete
/// register once a case binds the operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeWhitelist {
    pub destination: bool,
    pub sreg: bool,
    pub pc: bool,
}

impl ChangeWhitelist {
    /// Does the whitelist allow `reg` to change when the destination is `rd`?
    pub fn permits(&self, reg: Reg, rd: u8) -> bool {
        match reg {
            Reg::R(n) => self.destination && n == rd,
            Reg::Sreg => self.sreg,
            Reg::Pc => self.pc,
            Reg::Sp => false,
        }
    }

    /// Concrete registers for destination `rd`, in numbering order.
    pub fn resolve(&self, rd: u8) -> Vec<Reg> {
        Reg::all().filter(|&reg| self.permits(reg, rd)).collect()
    }
}

/// Static description of how to exercise one instruction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OpcodeSpec {
    pub mnemonic: &'static str,
    pub instruction: Instruction,
    /// Fixed bits with the operand field zeroed
    pub template: u16,
    /// Destination register field
    pub destination: BitField,
    pub first_register: u8,
    pub last_register: u8,
    /// Operand values chosen to hit flag boundaries
    pub values: &'static [u8],
    /// SREG loaded before execution. Sets at least one flag the instruction
    /// writes, so a missed clear shows up, and usually one it must preserve.
    pub sreg_probe: u8,
    /// Instruction length in 16-bit words
    pub words: u8,
}

impl OpcodeSpec {
    /// Raw instruction word with `rd` substituted into the destination field.
    pub fn encode(&self, rd: u8) -> Result<u16, EncodeError> {
        if rd < self.first_register || rd > self.last_register {
            return Err(EncodeError::OutOfRange {
                mnemonic: self.mnemonic,
                value: rd,
                min: self.first_register,
                max: self.last_register,
            });
        }
        if !self.destination.fits(rd) {
            return Err(EncodeError::TooWide {
                mnemonic: self.mnemonic,
                value: rd,
                width: self.destination.width,
            });
        }
        if rd as usize >= GPR_COUNT {
            return Err(EncodeError::NoSuchRegister {
                mnemonic: self.mnemonic,
                value: rd,
            });
        }
        Ok(self.destination.insert(self.template, rd))
    }

    pub fn registers(&self) -> impl Iterator<Item = u8> {
        self.first_register..=self.last_register
    }

    pub fn whitelist(&self) -> ChangeWhitelist {
        ChangeWhitelist {
            destination: true,
            sreg: self.instruction.affected_flags() != 0,
            pc: true,
        }
    }

    /// Instruction length in bytes, i.e. the expected PC advance
    pub fn length_bytes(&self) -> u32 {
        self.words as u32 * 2
    }
}

/// `BREAK`: stops a resumed target, used to bracket the instruction under test
pub const BREAK_OPCODE: u16 = 0x9598;

const DEST_FIELD: BitField = BitField::new(4, 5);

/// Values shared by the logic and shift instructions: all-zero, all-ones,
/// both alternating patterns, nibble halves and single end bits.
const PATTERN_VALUES: &[u8] = &[0x00, 0xFF, 0xAA, 0x55, 0xF0, 0x0F, 0x01, 0x80];

/// Values for the arithmetic instructions, adding the signed overflow edges.
const ARITH_VALUES: &[u8] = &[0x00, 0xFF, 0xAA, 0xF0, 0x01, 0x7F, 0x80, 0x08];

const fn single_register(
    mnemonic: &'static str,
    instruction: Instruction,
    low_nibble: u16,
    values: &'static [u8],
    sreg_probe: u8,
) -> OpcodeSpec {
    OpcodeSpec {
        mnemonic,
        instruction,
        template: 0x9400 | low_nibble,
        destination: DEST_FIELD,
        first_register: 0,
        last_register: 31,
        values,
        sreg_probe,
        words: 1,
    }
}

/// The `1001 010d dddd xxxx` group
pub static SINGLE_REGISTER_OPS: [OpcodeSpec; 8] = [
    // Only V set: COM must clear it.
    single_register(
        "COM",
        Instruction::Com,
        0x0,
        &[0x00, 0xFF, 0xAA, 0xF0, 0x01],
        flags::OVERFLOW,
    ),
    single_register(
        "NEG",
        Instruction::Neg,
        0x1,
        ARITH_VALUES,
        flags::CARRY | flags::HALF_CARRY | flags::TRANSFER,
    ),
    // SWAP touches no flag; a mixed pattern shows any stray write.
    single_register(
        "SWAP",
        Instruction::Swap,
        0x2,
        PATTERN_VALUES,
        flags::CARRY | flags::NEGATIVE | flags::SIGN | flags::TRANSFER,
    ),
    single_register(
        "INC",
        Instruction::Inc,
        0x3,
        ARITH_VALUES,
        flags::CARRY | flags::OVERFLOW | flags::HALF_CARRY,
    ),
    single_register(
        "ASR",
        Instruction::Asr,
        0x5,
        PATTERN_VALUES,
        flags::CARRY | flags::HALF_CARRY,
    ),
    single_register(
        "LSR",
        Instruction::Lsr,
        0x6,
        PATTERN_VALUES,
        flags::NEGATIVE | flags::HALF_CARRY,
    ),
    // C set: it rotates into bit 7.
    single_register(
        "ROR",
        Instruction::Ror,
        0x7,
        PATTERN_VALUES,
        flags::CARRY | flags::HALF_CARRY,
    ),
    single_register(
        "DEC",
        Instruction::Dec,
        0xA,
        ARITH_VALUES,
        flags::CARRY | flags::OVERFLOW | flags::HALF_CARRY,
    ),
];

/// Find a spec by mnemonic, ignoring case.
pub fn lookup(mnemonic: &str) -> Option<&'static OpcodeSpec> {
    SINGLE_REGISTER_OPS
        .iter()
        .find(|spec| spec.mnemonic.eq_ignore_ascii_case(mnemonic))
}
