//! Reference model checks for the single-register ALU group.

use super::*;
use crate::avr::{flags, Flag};
use proptest::prelude::*;

fn com() -> &'static OpcodeSpec {
    lookup("COM").unwrap()
}

// ============ Concrete COM scenarios, r5 ============

fn com_r5(value: u8) -> Outcome {
    let spec = com();
    assert_eq!(spec.encode(5), Ok(0x9450));
    spec.instruction.execute(value, spec.sreg_probe)
}

#[test]
fn test_com_zero() {
    let out = com_r5(0x00);
    assert_eq!(out.result, 0xFF);
    assert!(!Flag::Z.is_set(out.sreg));
    assert!(Flag::N.is_set(out.sreg));
    assert!(Flag::C.is_set(out.sreg));
    assert!(!Flag::V.is_set(out.sreg));
    assert!(Flag::S.is_set(out.sreg));
    assert_eq!(out.sreg, 0x15);
}

#[test]
fn test_com_all_ones() {
    let out = com_r5(0xFF);
    assert_eq!(out.result, 0x00);
    assert!(Flag::Z.is_set(out.sreg));
    assert!(!Flag::N.is_set(out.sreg));
    assert!(Flag::C.is_set(out.sreg));
    assert!(!Flag::V.is_set(out.sreg));
    assert!(!Flag::S.is_set(out.sreg));
    assert_eq!(out.sreg, 0x03);
}

#[test]
fn test_com_alternating() {
    let out = com_r5(0xAA);
    assert_eq!(out.result, 0x55);
    assert_eq!(out.sreg, flags::CARRY);
}

#[test]
fn test_com_high_nibble() {
    let out = com_r5(0xF0);
    assert_eq!(out.result, 0x0F);
    assert!(!Flag::Z.is_set(out.sreg));
    assert!(!Flag::N.is_set(out.sreg));
    assert!(Flag::C.is_set(out.sreg));
    assert!(!Flag::V.is_set(out.sreg));
    assert!(!Flag::S.is_set(out.sreg));
}

#[test]
fn test_com_preserves_h_t_i() {
    let sreg_in = flags::HALF_CARRY | flags::TRANSFER | flags::INTERRUPT | flags::OVERFLOW;
    let out = Instruction::Com.execute(0x0F, sreg_in);
    assert_eq!(out.result, 0xF0);
    assert_eq!(
        out.sreg,
        flags::HALF_CARRY
            | flags::TRANSFER
            | flags::INTERRUPT
            | flags::NEGATIVE
            | flags::SIGN
            | flags::CARRY
    );
}

// ============ Other instructions ============

#[test]
fn test_neg_edges() {
    let probe = lookup("NEG").unwrap().sreg_probe;

    let zero = Instruction::Neg.execute(0x00, probe);
    assert_eq!(zero.result, 0x00);
    assert_eq!(zero.sreg, flags::TRANSFER | flags::ZERO);

    let min = Instruction::Neg.execute(0x80, probe);
    assert_eq!(min.result, 0x80);
    assert_eq!(
        min.sreg,
        flags::TRANSFER | flags::OVERFLOW | flags::NEGATIVE | flags::CARRY
    );

    let one = Instruction::Neg.execute(0x01, probe);
    assert_eq!(one.result, 0xFF);
    assert_eq!(one.sreg, 0x75);
}

#[test]
fn test_inc_dec_overflow() {
    let probe = flags::CARRY | flags::OVERFLOW | flags::HALF_CARRY;

    let inc = Instruction::Inc.execute(0x7F, probe);
    assert_eq!(inc.result, 0x80);
    assert_eq!(inc.sreg, 0x2D);

    let wrap = Instruction::Inc.execute(0xFF, probe);
    assert_eq!(wrap.result, 0x00);
    assert_eq!(wrap.sreg, 0x23);

    let dec = Instruction::Dec.execute(0x80, probe);
    assert_eq!(dec.result, 0x7F);
    assert_eq!(dec.sreg, 0x39);

    let to_zero = Instruction::Dec.execute(0x01, probe);
    assert_eq!(to_zero.result, 0x00);
    assert_eq!(to_zero.sreg, 0x23);
}

#[test]
fn test_shifts() {
    let lsr = Instruction::Lsr.execute(0x01, flags::NEGATIVE | flags::HALF_CARRY);
    assert_eq!(lsr.result, 0x00);
    assert_eq!(lsr.sreg, 0x3B);

    let asr = Instruction::Asr.execute(0x81, flags::CARRY | flags::HALF_CARRY);
    assert_eq!(asr.result, 0xC0);
    assert_eq!(asr.sreg, 0x35);

    let ror_in = Instruction::Ror.execute(0x00, flags::CARRY | flags::HALF_CARRY);
    assert_eq!(ror_in.result, 0x80);
    assert_eq!(ror_in.sreg, 0x2C);

    let ror_out = Instruction::Ror.execute(0x01, 0);
    assert_eq!(ror_out.result, 0x00);
    assert_eq!(ror_out.sreg, 0x1B);
}

#[test]
fn test_swap_keeps_sreg() {
    let out = Instruction::Swap.execute(0xF0, 0x55);
    assert_eq!(out.result, 0x0F);
    assert_eq!(out.sreg, 0x55);
}

// ============ Properties ============

proptest! {
    #[test]
    fn prop_com_is_complement_for_any_register(d in 0u8..32, v in any::<u8>()) {
        let spec = com();
        prop_assert!(spec.encode(d).is_ok());
        let out = spec.instruction.execute(v, spec.sreg_probe);
        prop_assert_eq!(out.result, 255 - v);
        prop_assert!(!Flag::V.is_set(out.sreg));
        prop_assert!(Flag::C.is_set(out.sreg));
    }

    #[test]
    fn prop_com_twice_is_identity(v in any::<u8>(), sreg in any::<u8>()) {
        let once = Instruction::Com.execute(v, sreg);
        let twice = Instruction::Com.execute(once.result, once.sreg);
        prop_assert_eq!(twice.result, v);
    }

    #[test]
    fn prop_sign_is_n_xor_v(v in any::<u8>(), sreg in any::<u8>(), idx in 0usize..8) {
        let spec = &SINGLE_REGISTER_OPS[idx];
        let out = spec.instruction.execute(v, sreg);
        if spec.instruction.affected_flags() & flags::SIGN != 0 {
            prop_assert_eq!(
                Flag::S.is_set(out.sreg),
                Flag::N.is_set(out.sreg) ^ Flag::V.is_set(out.sreg)
            );
            prop_assert_eq!(Flag::Z.is_set(out.sreg), out.result == 0);
            prop_assert_eq!(Flag::N.is_set(out.sreg), out.result & 0x80 != 0);
        }
    }

    #[test]
    fn prop_unaffected_flags_preserved(v in any::<u8>(), sreg in any::<u8>(), idx in 0usize..8) {
        let spec = &SINGLE_REGISTER_OPS[idx];
        let keep = !spec.instruction.affected_flags();
        let out = spec.instruction.execute(v, sreg);
        prop_assert_eq!(out.sreg & keep, sreg & keep);
    }

    #[test]
    fn prop_ror_without_carry_matches_lsr_result(v in any::<u8>(), sreg in any::<u8>()) {
        let ror = Instruction::Ror.execute(v, sreg & !flags::CARRY);
        let lsr = Instruction::Lsr.execute(v, sreg);
        prop_assert_eq!(ror.result, lsr.result);
        prop_assert_eq!(Flag::C.is_set(ror.sreg), v & 1 != 0);
    }

    #[test]
    fn prop_inc_then_dec_restores(v in any::<u8>()) {
        let up = Instruction::Inc.execute(v, 0);
        let down = Instruction::Dec.execute(up.result, up.sreg);
        prop_assert_eq!(down.result, v);
    }
}
