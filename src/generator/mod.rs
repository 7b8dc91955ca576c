//! Test Case Generation
//!
//! Binds an `OpcodeSpec`'s destination operand to every legal register and
//! every representative value. Generation is a pure function of its inputs:
//! the same spec, value list and baseline always yield the same cases in the
//! same order (registers outer, values inner).

use crate::avr::{Reg, RegisterState};
use crate::isa::{EncodeError, OpcodeSpec};
use serde::Serialize;
use std::fmt;

/// Identifies one case: instruction, destination register, operand value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CaseLabel {
    pub mnemonic: &'static str,
    pub register: u8,
    pub value: u8,
}

impl fmt::Display for CaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} r{:02} v=0x{:02x}",
            self.mnemonic, self.register, self.value
        )
    }
}

/// One concrete binding of a spec's operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub label: CaseLabel,
    pub initial: RegisterState,
    pub opcode: u16,
}

impl TestCase {
    /// Opcode bytes as stored in code memory (little endian)
    pub fn opcode_bytes(&self) -> [u8; 2] {
        self.opcode.to_le_bytes()
    }
}

/// Cases for `spec` using its own representative values.
pub fn generate(spec: &OpcodeSpec, baseline: &RegisterState) -> Result<Vec<TestCase>, EncodeError> {
    generate_with(spec, spec.values, baseline)
}

/// Cases for `spec` over an explicit value list.
pub fn generate_with(
    spec: &OpcodeSpec,
    values: &[u8],
    baseline: &RegisterState,
) -> Result<Vec<TestCase>, EncodeError> {
    let mut cases = Vec::with_capacity(spec.registers().count() * values.len());

    for rd in spec.registers() {
        let opcode = spec.encode(rd)?;
        for &value in values {
            let initial = baseline
                .with(Reg::R(rd), value as u32)
                .with(Reg::Sreg, spec.sreg_probe as u32);

            cases.push(TestCase {
                label: CaseLabel {
                    mnemonic: spec.mnemonic,
                    register: rd,
                    value,
                },
                initial,
                opcode,
            });
        }
    }

    Ok(cases)
}
