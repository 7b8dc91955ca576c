//! AVR Register File and Status Flags
//!
//! Static description of the architectural state a single-instruction
//! conformance check observes: 32 byte-wide working registers, the status
//! register (SREG), the stack pointer and the program counter.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of general purpose working registers (r0..r31)
pub const GPR_COUNT: usize = 32;

/// Size of the register block exchanged with the remote stub:
/// r0..r31, SREG, SPL, SPH, PC (4 bytes, little endian)
pub const WIRE_BYTES: usize = GPR_COUNT + 1 + 2 + 4;

/// SREG bit masks
pub mod flags {
    pub const CARRY: u8 = 0b0000_0001; // C
    pub const ZERO: u8 = 0b0000_0010; // Z
    pub const NEGATIVE: u8 = 0b0000_0100; // N
    pub const OVERFLOW: u8 = 0b0000_1000; // V
    pub const SIGN: u8 = 0b0001_0000; // S
    pub const HALF_CARRY: u8 = 0b0010_0000; // H
    pub const TRANSFER: u8 = 0b0100_0000; // T
    pub const INTERRUPT: u8 = 0b1000_0000; // I
}

/// A named bit of the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    C,
    Z,
    N,
    V,
    S,
    H,
    T,
    I,
}

impl Flag {
    /// Every flag, ordered by bit position.
    pub const ALL: [Flag; 8] = [
        Flag::C,
        Flag::Z,
        Flag::N,
        Flag::V,
        Flag::S,
        Flag::H,
        Flag::T,
        Flag::I,
    ];

    /// Bit position inside SREG
    pub const fn bit(self) -> u8 {
        match self {
            Flag::C => 0,
            Flag::Z => 1,
            Flag::N => 2,
            Flag::V => 3,
            Flag::S => 4,
            Flag::H => 5,
            Flag::T => 6,
            Flag::I => 7,
        }
    }

    pub const fn mask(self) -> u8 {
        1 << self.bit()
    }

    pub const fn letter(self) -> char {
        match self {
            Flag::C => 'C',
            Flag::Z => 'Z',
            Flag::N => 'N',
            Flag::V => 'V',
            Flag::S => 'S',
            Flag::H => 'H',
            Flag::T => 'T',
            Flag::I => 'I',
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Flag::C => "carry",
            Flag::Z => "zero",
            Flag::N => "negative",
            Flag::V => "overflow",
            Flag::S => "sign",
            Flag::H => "half-carry",
            Flag::T => "transfer",
            Flag::I => "interrupt-enable",
        }
    }

    pub fn is_set(self, sreg: u8) -> bool {
        sreg & self.mask() != 0
    }
}

/// Render SREG the way AVR data sheets print it, most significant bit first.
/// Clear bits show as `-`: `0x15` renders as `---S-N-C`.
pub fn render_sreg(sreg: u8) -> String {
    Flag::ALL
        .iter()
        .rev()
        .map(|f| if f.is_set(sreg) { f.letter() } else { '-' })
        .collect()
}

/// Flags whose value differs between two SREG snapshots, in bit order.
pub fn flag_differences(expected: u8, actual: u8) -> Vec<Flag> {
    Flag::ALL
        .iter()
        .copied()
        .filter(|f| f.is_set(expected ^ actual))
        .collect()
}

/// Identifies one element of the register file.
///
/// `number()` yields the register number the remote stub uses for
/// single-register access: r0..r31 are 0..31, SREG is 32, SP 33, PC 34.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Reg {
    R(u8),
    Sreg,
    Sp,
    Pc,
}

impl Reg {
    pub const SREG_NUMBER: u8 = 32;
    pub const SP_NUMBER: u8 = 33;
    pub const PC_NUMBER: u8 = 34;

    /// Number of distinct registers in a snapshot
    pub const COUNT: usize = GPR_COUNT + 3;

    pub fn number(self) -> u8 {
        match self {
            Reg::R(n) => n,
            Reg::Sreg => Self::SREG_NUMBER,
            Reg::Sp => Self::SP_NUMBER,
            Reg::Pc => Self::PC_NUMBER,
        }
    }

    pub fn from_number(number: u8) -> Option<Reg> {
        match number {
            0..=31 => Some(Reg::R(number)),
            Self::SREG_NUMBER => Some(Reg::Sreg),
            Self::SP_NUMBER => Some(Reg::Sp),
            Self::PC_NUMBER => Some(Reg::Pc),
            _ => None,
        }
    }

    /// All registers in remote-numbering order.
    pub fn all() -> impl Iterator<Item = Reg> {
        (0..Reg::COUNT as u8).filter_map(Reg::from_number)
    }

    /// Width in bytes as carried in the register block
    pub fn width(self) -> usize {
        match self {
            Reg::R(_) | Reg::Sreg => 1,
            Reg::Sp => 2,
            Reg::Pc => 4,
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::R(n) => write!(f, "r{:02}", n),
            Reg::Sreg => f.write_str("SREG"),
            Reg::Sp => f.write_str("SP"),
            Reg::Pc => f.write_str("PC"),
        }
    }
}

/// Errors decoding a register block received from the target
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("register block holds {0} hex digits, expected {expected}", expected = WIRE_BYTES * 2)]
    Length(usize),
    #[error("invalid hex digit at offset {0} of register block")]
    InvalidHex(usize),
}

/// Complete architectural register snapshot.
///
/// Always fully populated; there is no partial form. PC is a byte address
/// into code memory, which is how the remote stub reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterState {
    pub r: [u8; GPR_COUNT],
    pub sreg: u8,
    pub sp: u16,
    pub pc: u32,
}

impl Default for RegisterState {
    fn default() -> Self {
        Self {
            r: [0; GPR_COUNT],
            sreg: 0,
            sp: 0,
            pc: 0,
        }
    }
}

impl RegisterState {
    /// Snapshot with every working register holding a distinct background
    /// value (`0xA0 + n`), so a stray write to the wrong register is visible
    /// even when the written value is zero.
    pub fn patterned(pc: u32, sp: u16) -> Self {
        let mut r = [0u8; GPR_COUNT];
        for (n, slot) in r.iter_mut().enumerate() {
            *slot = 0xA0 + n as u8;
        }
        Self { r, sreg: 0, sp, pc }
    }

    /// Value of one register, widened to `u32`
    pub fn get(&self, reg: Reg) -> u32 {
        match reg {
            Reg::R(n) => self.r[n as usize] as u32,
            Reg::Sreg => self.sreg as u32,
            Reg::Sp => self.sp as u32,
            Reg::Pc => self.pc,
        }
    }

    /// Copy of this snapshot with one register replaced. Values wider than
    /// the register are truncated.
    pub fn with(mut self, reg: Reg, value: u32) -> Self {
        match reg {
            Reg::R(n) => self.r[n as usize] = value as u8,
            Reg::Sreg => self.sreg = value as u8,
            Reg::Sp => self.sp = value as u16,
            Reg::Pc => self.pc = value,
        }
        self
    }

    /// Registers whose values differ between two snapshots, in numbering order.
    pub fn diff(&self, other: &RegisterState) -> Vec<Reg> {
        Reg::all().filter(|&reg| self.get(reg) != other.get(reg)).collect()
    }

    /// Encode as the `g`/`G` register block: r0..r31, SREG, SPL, SPH, then
    /// the PC as four little endian bytes.
    pub fn to_wire_hex(&self) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(WIRE_BYTES * 2);
        for &b in &self.r {
            write!(out, "{:02x}", b).unwrap();
        }
        write!(out, "{:02x}", self.sreg).unwrap();
        for b in self.sp.to_le_bytes() {
            write!(out, "{:02x}", b).unwrap();
        }
        for b in self.pc.to_le_bytes() {
            write!(out, "{:02x}", b).unwrap();
        }
        out
    }

    pub fn from_wire_hex(data: &str) -> Result<Self, WireError> {
        if data.len() != WIRE_BYTES * 2 || !data.is_ascii() {
            return Err(WireError::Length(data.len()));
        }
        if let Some(pos) = data.bytes().position(|b| !b.is_ascii_hexdigit()) {
            return Err(WireError::InvalidHex(pos & !1));
        }

        let mut bytes = [0u8; WIRE_BYTES];
        for (i, slot) in bytes.iter_mut().enumerate() {
            let pos = i * 2;
            *slot = u8::from_str_radix(&data[pos..pos + 2], 16)
                .map_err(|_| WireError::InvalidHex(pos))?;
        }

        let mut r = [0u8; GPR_COUNT];
        r.copy_from_slice(&bytes[..GPR_COUNT]);
        let sreg = bytes[GPR_COUNT];
        let sp = u16::from_le_bytes([bytes[GPR_COUNT + 1], bytes[GPR_COUNT + 2]]);
        let pc = u32::from_le_bytes([
            bytes[GPR_COUNT + 3],
            bytes[GPR_COUNT + 4],
            bytes[GPR_COUNT + 5],
            bytes[GPR_COUNT + 6],
        ]);

        Ok(Self { r, sreg, sp, pc })
    }
}
