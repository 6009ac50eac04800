//! Shared validation helpers for the adapter layer (WiFi, BLE).

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E` (space through tilde, inclusive).
pub(super) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// SSIDs reaching the radio must be non-empty printable ASCII.
pub(super) fn is_valid_ssid(s: &str) -> bool {
    !s.is_empty() && s.len() <= 32 && is_printable_ascii(s)
}
