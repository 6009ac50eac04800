//! Fuzz target: `parse_write`
//!
//! Arbitrary peer writes must decode or be ignored, never panic.  A
//! decoded credential write must also survive `Credentials::new` or be
//! rejected with an error.
//!
//! cargo fuzz run fuzz_provisioning_write

#![no_main]

use edgelink::app::credentials::Credentials;
use edgelink::app::provisioning::{ProvisioningWrite, parse_write};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(ProvisioningWrite::Credentials { ssid, pass, persist }) = parse_write(data) {
        if let Ok(creds) = Credentials::new(&ssid, &pass, persist) {
            assert_eq!(creds.network_name(), ssid);
            assert_eq!(creds.secret(), pass);
        }
    }
});
