//! Fuzz target: `parse_response`
//!
//! Whatever the authority sends back, an identity is only produced from a
//! 2xx body and is never empty.
//!
//! cargo fuzz run fuzz_registration_response

#![no_main]

use edgelink::app::registration::parse_response;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (status, body) = match data.split_first_chunk::<2>() {
        Some((head, rest)) => (u16::from_le_bytes(*head), rest),
        None => (200, data),
    };
    if let Ok(identity) = parse_response(status, body) {
        assert!((200..300).contains(&status));
        assert!(!identity.as_str().is_empty());
    }
});
