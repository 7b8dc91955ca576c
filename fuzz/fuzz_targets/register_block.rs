#![no_main]

//! Register block fuzzer
//!
//! Arbitrary text must either decode or be rejected; a decoded block must
//! encode back to the same digits, ignoring case.

use avr_oracle::avr::RegisterState;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(state) = RegisterState::from_wire_hex(text) {
        assert_eq!(state.to_wire_hex(), text.to_ascii_lowercase());
    }
});
