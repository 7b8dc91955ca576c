use super::*;
use crate::avr::flags;
use crate::generator::{generate, generate_with};
use crate::isa::{lookup, SINGLE_REGISTER_OPS};
use crate::target::{IoFailure, StopReason, SIGHUP, SIGTRAP};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    None,
    /// Leaves V untouched
    KeepOverflow,
    /// Also writes 0 to the register after Rd
    ClobberNext,
    /// Fails every step
    Dead,
    /// Refuses the opcode: stops with SIGILL without executing it
    Illegal,
}

#[derive(Debug, PartialEq)]
enum Call {
    Write(u32, Vec<u8>),
    Resume(Option<u8>),
    Step,
}

/// Executes COM only; enough to drive the verifier end to end.
struct ComTarget {
    memory: HashMap<u32, u8>,
    regs: RegisterState,
    calls: Vec<Call>,
    fault: Fault,
}

impl ComTarget {
    fn new(fault: Fault) -> Self {
        Self {
            memory: HashMap::new(),
            regs: RegisterState::default(),
            calls: Vec::new(),
            fault,
        }
    }

    fn word_at(&self, addr: u32) -> u16 {
        let lo = *self.memory.get(&addr).unwrap_or(&0xFF);
        let hi = *self.memory.get(&(addr + 1)).unwrap_or(&0xFF);
        u16::from_le_bytes([lo, hi])
    }

    fn execute(&mut self) {
        let word = self.word_at(self.regs.pc);
        assert_eq!(word & 0xFE0F, 0x9400, "not a COM: {:#06x}", word);
        let rd = ((word >> 4) & 0x1F) as usize;
        let r = !self.regs.r[rd];
        self.regs.r[rd] = r;

        let n = r & 0x80 != 0;
        let mut sreg = self.regs.sreg & !(flags::ZERO | flags::NEGATIVE | flags::SIGN | flags::CARRY);
        if self.fault != Fault::KeepOverflow {
            sreg &= !flags::OVERFLOW;
        }
        sreg |= flags::CARRY;
        if r == 0 {
            sreg |= flags::ZERO;
        }
        if n {
            sreg |= flags::NEGATIVE | flags::SIGN;
        }
        self.regs.sreg = sreg;
        if self.fault == Fault::ClobberNext {
            self.regs.r[(rd + 1) % 32] = 0;
        }
        self.regs.pc += 2;
    }
}

impl RemoteTarget for ComTarget {
    fn read_memory(&mut self, addr: u32, len: usize) -> Result<Vec<u8>, IoFailure> {
        Ok((0..len as u32)
            .map(|i| *self.memory.get(&(addr + i)).unwrap_or(&0xFF))
            .collect())
    }
    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), IoFailure> {
        self.calls.push(Call::Write(addr, data.to_vec()));
        for (i, &b) in data.iter().enumerate() {
            self.memory.insert(addr + i as u32, b);
        }
        Ok(())
    }
    fn read_registers(&mut self) -> Result<RegisterState, IoFailure> {
        Ok(self.regs)
    }
    fn write_registers(&mut self, state: &RegisterState) -> Result<(), IoFailure> {
        self.regs = *state;
        Ok(())
    }
    fn resume(&mut self, signal: Option<u8>) -> Result<StopReason, IoFailure> {
        self.calls.push(Call::Resume(signal));
        if signal == Some(SIGHUP) {
            self.regs = RegisterState::default();
            return Ok(StopReason::Signal(SIGTRAP));
        }
        self.execute();
        assert_eq!(self.word_at(self.regs.pc), BREAK_OPCODE);
        Ok(StopReason::Signal(SIGTRAP))
    }
    fn step(&mut self) -> Result<StopReason, IoFailure> {
        self.calls.push(Call::Step);
        if self.fault == Fault::Dead {
            return Err(IoFailure::Closed);
        }
        if self.fault == Fault::Illegal {
            return Ok(StopReason::Signal(SIGILL));
        }
        self.execute();
        Ok(StopReason::Signal(SIGTRAP))
    }
    fn close(&mut self) -> Result<(), IoFailure> {
        Ok(())
    }
}

const SIGILL: u8 = 4;

fn baseline() -> RegisterState {
    RegisterState::patterned(0x0000, 0x045f)
}

fn com_case(rd: u8, value: u8) -> TestCase {
    let com = lookup("COM").unwrap();
    let cases = generate_with(com, &[value], &baseline()).unwrap();
    cases.into_iter().nth(rd as usize).unwrap()
}

#[test]
fn test_expected_state_com() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0xAA);
    assert_eq!(case.initial.sreg, flags::OVERFLOW);

    let expected = expected_state(com, &case);
    assert_eq!(expected.r[5], 0x55);
    assert_eq!(expected.sreg, flags::CARRY);
    assert_eq!(expected.pc, 2);
    assert_eq!(expected.sp, case.initial.sp);
    assert_eq!(case.initial.diff(&expected), vec![Reg::R(5), Reg::Sreg, Reg::Pc]);
}

#[test]
fn test_expected_state_swap_keeps_sreg() {
    let swap = lookup("SWAP").unwrap();
    let case = generate_with(swap, &[0xF0], &baseline()).unwrap().remove(3);
    let expected = expected_state(swap, &case);
    assert_eq!(expected.r[3], 0x0F);
    assert_eq!(expected.sreg, swap.sreg_probe);
}

#[test]
fn test_compare_clean() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0x00);
    let expected = expected_state(com, &case);
    assert!(compare(&com.whitelist(), 5, &case.initial, &expected, &expected).is_empty());
}

#[test]
fn test_compare_classifies_mismatches() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0xAA);
    let expected = expected_state(com, &case);
    let actual = expected
        .with(Reg::Sreg, (flags::CARRY | flags::OVERFLOW) as u32)
        .with(Reg::R(6), 0)
        .with(Reg::Sp, 0x0400);

    let mismatches = compare(&com.whitelist(), 5, &case.initial, &expected, &actual);
    assert_eq!(
        mismatches,
        vec![
            Mismatch {
                kind: MismatchKind::SideEffect,
                reg: Reg::R(6),
                expected: 0xA6,
                actual: 0,
            },
            Mismatch {
                kind: MismatchKind::Semantic,
                reg: Reg::Sreg,
                expected: flags::CARRY as u32,
                actual: (flags::CARRY | flags::OVERFLOW) as u32,
            },
            Mismatch {
                kind: MismatchKind::SideEffect,
                reg: Reg::Sp,
                expected: 0x045F,
                actual: 0x0400,
            },
        ]
    );
}

#[test]
fn test_unchanged_destination_is_semantic() {
    let com = lookup("COM").unwrap();
    let case = com_case(0, 0x0F);
    let actual = case.initial.with(Reg::Pc, 2);
    let result = check(com, &case, actual, StopReason::Signal(SIGTRAP));
    assert!(result.has(MismatchKind::Semantic));
    assert!(!result.has(MismatchKind::SideEffect));
    assert_eq!(result.first(MismatchKind::Semantic).unwrap().reg, Reg::R(0));
}

#[test]
fn test_sreg_write_by_swap_is_side_effect() {
    let swap = lookup("SWAP").unwrap();
    let case = generate_with(swap, &[0x12], &baseline()).unwrap().remove(0);
    let actual = expected_state(swap, &case).with(Reg::Sreg, 0);
    let result = check(swap, &case, actual, StopReason::Signal(SIGTRAP));
    assert_eq!(result.mismatches.len(), 1);
    assert_eq!(result.mismatches[0].kind, MismatchKind::SideEffect);
    assert_eq!(result.mismatches[0].reg, Reg::Sreg);
}

#[test]
fn test_step_strategy_calls() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0xAA);
    let mut driver = ExecutionDriver::new(ComTarget::new(Fault::None));
    let result = verify_case(&mut driver, com, &case, &RunConfig::default()).unwrap();

    assert!(result.passed(), "{}", result);
    assert_eq!(
        driver.target().calls,
        vec![
            Call::Resume(Some(SIGHUP)),
            Call::Write(0, vec![0x50, 0x94]),
            Call::Step,
        ]
    );
}

#[test]
fn test_break_after_strategy_calls() {
    let com = lookup("COM").unwrap();
    let case = com_case(31, 0x01);
    let run = RunConfig {
        strategy: ExecStrategy::BreakAfter,
        reset_between_cases: false,
        ..Default::default()
    };
    let mut driver = ExecutionDriver::new(ComTarget::new(Fault::None));
    let result = verify_case(&mut driver, com, &case, &run).unwrap();

    assert!(result.passed(), "{}", result);
    assert_eq!(
        driver.target().calls,
        vec![
            Call::Write(0, vec![0xF0, 0x95, 0x98, 0x95]),
            Call::Resume(None),
        ]
    );
}

#[test]
fn test_all_com_cases_pass_on_correct_target() {
    let com = lookup("COM").unwrap();
    let mut driver = ExecutionDriver::new(ComTarget::new(Fault::None));
    let run = RunConfig::default();
    for case in generate(com, &baseline()).unwrap() {
        let result = verify_case(&mut driver, com, &case, &run).unwrap();
        assert!(result.passed(), "{}", result);
    }
}

#[test]
fn test_overflow_fault_is_semantic() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0xAA);
    let mut driver = ExecutionDriver::new(ComTarget::new(Fault::KeepOverflow));
    let result = verify_case(&mut driver, com, &case, &RunConfig::default()).unwrap();

    assert!(!result.passed());
    assert!(!result.has(MismatchKind::SideEffect));
    let m = result.first(MismatchKind::Semantic).unwrap();
    assert_eq!(m.reg, Reg::Sreg);
    assert_eq!(m.expected, 0x01);
    assert_eq!(m.actual, 0x09);
}

#[test]
fn test_clobber_fault_is_side_effect() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0xAA);
    let mut driver = ExecutionDriver::new(ComTarget::new(Fault::ClobberNext));
    let result = verify_case(&mut driver, com, &case, &RunConfig::default()).unwrap();

    assert!(!result.has(MismatchKind::Semantic));
    let m = result.first(MismatchKind::SideEffect).unwrap();
    assert_eq!(m.reg, Reg::R(6));
    assert_eq!(m.expected, 0xA6);
    assert_eq!(m.actual, 0x00);
}

#[test]
fn test_sigill_stop_fails_case() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0xAA);
    let mut driver = ExecutionDriver::new(ComTarget::new(Fault::Illegal));
    let (_, stop) = execute_case(&mut driver, &case, &RunConfig::default()).unwrap();
    assert_eq!(stop, StopReason::Signal(SIGILL));

    let result = verify_case(&mut driver, com, &case, &RunConfig::default()).unwrap();
    assert!(!result.passed());
    assert!(result.unexpected_stop());
    assert_eq!(result.stop, StopReason::Signal(SIGILL));
    assert!(result.to_string().contains("stopped with signal 4"), "{}", result);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["stop"]["Signal"], 4);
}

#[test]
fn test_sigill_stop_fails_even_with_matching_registers() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0xAA);
    let result = check(com, &case, expected_state(com, &case), StopReason::Signal(SIGILL));
    assert!(result.mismatches.is_empty());
    assert!(!result.passed());
}

#[test]
fn test_transport_failure_propagates() {
    let com = lookup("COM").unwrap();
    let case = com_case(5, 0xAA);
    let mut driver = ExecutionDriver::new(ComTarget::new(Fault::Dead));
    let err = verify_case(&mut driver, com, &case, &RunConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        DriverError::TargetIo {
            action: "stepping",
            source: IoFailure::Closed
        }
    ));
}

proptest! {
    #[test]
    fn prop_expected_state_always_checks_clean(op in 0usize..8, rd in 0u8..32, value in any::<u8>()) {
        let spec = &SINGLE_REGISTER_OPS[op];
        let case = generate_with(spec, &[value], &baseline()).unwrap().remove(rd as usize);
        let result = check(spec, &case, expected_state(spec, &case), StopReason::Signal(SIGTRAP));
        prop_assert!(result.passed());
    }

    #[test]
    fn prop_only_whitelisted_registers_move(op in 0usize..8, rd in 0u8..32, value in any::<u8>()) {
        let spec = &SINGLE_REGISTER_OPS[op];
        let case = generate_with(spec, &[value], &baseline()).unwrap().remove(rd as usize);
        let expected = expected_state(spec, &case);
        let whitelist = spec.whitelist();
        for reg in case.initial.diff(&expected) {
            prop_assert!(whitelist.permits(reg, rd), "{} moved", reg);
        }
    }
}
