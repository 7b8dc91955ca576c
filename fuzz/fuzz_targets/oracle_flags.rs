#![no_main]

//! Flag invariants of the reference models
//!
//! - S is always N xor V
//! - Z and N follow the result
//! - bits outside an instruction's affected set are untouched

use avr_oracle::avr::flags;
use avr_oracle::isa::SINGLE_REGISTER_OPS;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let spec = &SINGLE_REGISTER_OPS[data[0] as usize % SINGLE_REGISTER_OPS.len()];
    let rd = data[1];
    let sreg = data[2];

    let affected = spec.instruction.affected_flags();
    let out = spec.instruction.execute(rd, sreg);

    assert_eq!(out.sreg & !affected, sreg & !affected, "{} touched unaffected flags", spec.mnemonic);
    if affected == 0 {
        return;
    }

    let n = out.sreg & flags::NEGATIVE != 0;
    let v = out.sreg & flags::OVERFLOW != 0;
    let s = out.sreg & flags::SIGN != 0;
    assert_eq!(s, n ^ v, "{} S != N ^ V", spec.mnemonic);
    assert_eq!(out.sreg & flags::ZERO != 0, out.result == 0, "{} Z", spec.mnemonic);
    assert_eq!(n, out.result & 0x80 != 0, "{} N", spec.mnemonic);
});
