#![no_main]

//! Reply parsing fuzzer - anything a misbehaving stub could send back
//!
//! None of the parsers may panic, and whatever `expand_rle` accepts must be
//! at least as long as its input minus the run markers.

use avr_oracle::target::gdb::{checksum, decode_hex, expand_rle, frame, parse_stop_reply};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = parse_stop_reply(text);

    if let Ok(expanded) = expand_rle(text) {
        let markers = text.matches('*').count();
        assert!(expanded.len() + 2 * markers >= text.len());
        let _ = decode_hex(&expanded);
    }

    if let Ok(bytes) = decode_hex(text) {
        assert_eq!(bytes.len() * 2, text.len());
    }

    // framing is the inverse of the checksum trailer
    let framed = frame(text);
    let sum = &framed[framed.len() - 2..];
    assert_eq!(u8::from_str_radix(sum, 16).ok(), Some(checksum(text.as_bytes())));
});
