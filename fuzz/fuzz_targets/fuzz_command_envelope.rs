//! Fuzz target: `parse_command`
//!
//! Feeds arbitrary bytes as an inbound bus payload.  The parser must never
//! panic, and anything it accepts must name a pin and carry no foreign
//! tenant.
//!
//! cargo fuzz run fuzz_command_envelope

#![no_main]

use edgelink::app::commands::parse_command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(cmd) = parse_command(data, "tenantX") {
        assert!(!cmd.vpin.is_empty(), "accepted command without a pin");

        let doc: serde_json::Value =
            serde_json::from_slice(data).expect("accepted payload must be JSON");
        if let Some(tenant) = doc.get("tenant_id").and_then(|t| t.as_str()) {
            assert!(tenant.is_empty() || tenant == "tenantX", "foreign tenant accepted");
        }
    }
});
