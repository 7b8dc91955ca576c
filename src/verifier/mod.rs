//! Expected-state computation and comparison
//!
//! `expected_state` applies the reference model to a case. `compare` checks
//! every register exactly once: whitelisted registers against the expected
//! state (semantic), all others against the initial state (side effect).

use crate::avr::{Reg, RegisterState};
use crate::config::{ExecStrategy, RunConfig};
use crate::generator::TestCase;
use crate::isa::{ChangeWhitelist, OpcodeSpec, BREAK_OPCODE};
use crate::report::{CaseResult, Mismatch, MismatchKind};
use crate::target::{DriverError, ExecutionDriver, MemoryRegion, RemoteTarget, StopReason};
use log::debug;

#[cfg(test)]
mod tests_verifier;

/// Register state the instruction must leave behind.
pub fn expected_state(spec: &OpcodeSpec, case: &TestCase) -> RegisterState {
    let rd = case.label.register;
    let whitelist = spec.whitelist();
    let outcome = spec
        .instruction
        .execute(case.initial.r[rd as usize], case.initial.sreg);

    let mut expected = case.initial;
    if whitelist.destination {
        expected = expected.with(Reg::R(rd), outcome.result as u32);
    }
    if whitelist.sreg {
        expected = expected.with(Reg::Sreg, outcome.sreg as u32);
    }
    if whitelist.pc {
        expected = expected.with(Reg::Pc, case.initial.pc.wrapping_add(spec.length_bytes()));
    }
    expected
}

/// Mismatches of both kinds, in register numbering order.
pub fn compare(
    whitelist: &ChangeWhitelist,
    rd: u8,
    initial: &RegisterState,
    expected: &RegisterState,
    actual: &RegisterState,
) -> Vec<Mismatch> {
    Reg::all()
        .filter_map(|reg| {
            let (kind, want) = if whitelist.permits(reg, rd) {
                (MismatchKind::Semantic, expected.get(reg))
            } else {
                (MismatchKind::SideEffect, initial.get(reg))
            };
            let got = actual.get(reg);
            (got != want).then_some(Mismatch {
                kind,
                reg,
                expected: want,
                actual: got,
            })
        })
        .collect()
}

/// Judge a captured state without touching a target.
///
/// `stop` is how the target halted; anything but SIGTRAP fails the case even
/// when every register matches.
pub fn check(
    spec: &OpcodeSpec,
    case: &TestCase,
    actual: RegisterState,
    stop: StopReason,
) -> CaseResult {
    let expected = expected_state(spec, case);
    let mismatches = compare(
        &spec.whitelist(),
        case.label.register,
        &case.initial,
        &expected,
        &actual,
    );
    CaseResult {
        label: case.label,
        opcode: case.opcode,
        initial: case.initial,
        expected,
        actual,
        stop,
        mismatches,
    }
}

/// Put the case on the target, run the instruction and capture the result
/// together with the reason the target stopped.
pub fn execute_case<T: RemoteTarget>(
    driver: &mut ExecutionDriver<T>,
    case: &TestCase,
    run: &RunConfig,
) -> Result<(RegisterState, StopReason), DriverError> {
    if run.reset_between_cases {
        driver.reset()?;
    }

    let pc = case.initial.pc;
    let stop = match run.strategy {
        ExecStrategy::Step => {
            driver.write_block(MemoryRegion::Code, pc, &case.opcode_bytes())?;
            driver.write_registers(&case.initial)?;
            driver.step()?
        }
        ExecStrategy::BreakAfter => {
            let mut code = case.opcode_bytes().to_vec();
            code.extend_from_slice(&BREAK_OPCODE.to_le_bytes());
            driver.write_block(MemoryRegion::Code, pc, &code)?;
            driver.write_registers(&case.initial)?;
            driver.resume(None)?
        }
    };

    Ok((driver.read_registers()?, stop))
}

/// Execute one case and judge it.
pub fn verify_case<T: RemoteTarget>(
    driver: &mut ExecutionDriver<T>,
    spec: &OpcodeSpec,
    case: &TestCase,
    run: &RunConfig,
) -> Result<CaseResult, DriverError> {
    let (actual, stop) = execute_case(driver, case, run)?;
    let result = check(spec, case, actual, stop);
    debug!(
        "{}: {}",
        case.label,
        if result.passed() { "pass" } else { "FAIL" }
    );
    Ok(result)
}
