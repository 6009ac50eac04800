//! Network credentials and their NVS-backed store.
//!
//! A [`Credentials`] value is always valid by construction: non-empty
//! network name of at most 32 bytes, secret of at most 64 bytes.  It is
//! replaced wholesale, never edited in place.

use core::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::ports::{CredentialStore, StorageError, StoragePort};
use crate::error::CredentialError;

/// 802.11 SSID limit.
pub const NETWORK_NAME_MAX: usize = 32;
/// WPA2 passphrase limit.
pub const SECRET_MAX: usize = 64;

const CRED_NAMESPACE: &str = "netcfg";
const CRED_KEY: &str = "wifi";
/// Postcard blob upper bound: two length prefixes plus both strings.
const CRED_BLOB_MAX: usize = NETWORK_NAME_MAX + SECRET_MAX + 8;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    network_name: heapless::String<NETWORK_NAME_MAX>,
    secret: heapless::String<SECRET_MAX>,
    /// Whether this pair should survive a reboot.  Not itself stored.
    #[serde(skip)]
    persisted: bool,
}

impl Credentials {
    pub fn new(network_name: &str, secret: &str, persisted: bool) -> Result<Self, CredentialError> {
        if network_name.is_empty() {
            return Err(CredentialError::EmptyNetworkName);
        }
        let network_name = heapless::String::try_from(network_name)
            .map_err(|_| CredentialError::NetworkNameTooLong)?;
        let secret =
            heapless::String::try_from(secret).map_err(|_| CredentialError::SecretTooLong)?;
        Ok(Self {
            network_name,
            secret,
            persisted,
        })
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn persisted(&self) -> bool {
        self.persisted
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("network_name", &self.network_name.as_str())
            .field("secret_len", &self.secret.len())
            .field("persisted", &self.persisted)
            .finish()
    }
}

// ───────────────────────────────────────────────────────────────
// NVS-backed credential store
// ───────────────────────────────────────────────────────────────

/// [`CredentialStore`] over any [`StoragePort`], as a single postcard blob.
pub struct NvsCredentialStore<S: StoragePort> {
    storage: S,
}

impl<S: StoragePort> NvsCredentialStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<S: StoragePort> CredentialStore for NvsCredentialStore<S> {
    fn load(&mut self) -> Option<Credentials> {
        let mut buf = [0u8; CRED_BLOB_MAX];
        let len = match self.storage.read(CRED_NAMESPACE, CRED_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => return None,
            Err(e) => {
                warn!("CredentialStore: read failed: {}", e);
                return None;
            }
        };
        match postcard::from_bytes::<Credentials>(&buf[..len]) {
            Ok(mut creds) if !creds.network_name.is_empty() => {
                creds.persisted = true;
                info!("CredentialStore: loaded ssid='{}'", creds.network_name());
                Some(creds)
            }
            Ok(_) => None,
            Err(_) => {
                warn!("CredentialStore: stored blob corrupted, ignoring");
                None
            }
        }
    }

    fn save(&mut self, creds: &Credentials) -> bool {
        let mut buf = [0u8; CRED_BLOB_MAX];
        let bytes = match postcard::to_slice(creds, &mut buf) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        match self.storage.write(CRED_NAMESPACE, CRED_KEY, bytes) {
            Ok(()) => {
                info!("CredentialStore: saved ssid='{}'", creds.network_name());
                true
            }
            Err(e) => {
                warn!("CredentialStore: write failed: {}", e);
                false
            }
        }
    }

    fn clear(&mut self) {
        if let Err(e) = self.storage.delete(CRED_NAMESPACE, CRED_KEY) {
            warn!("CredentialStore: erase failed: {}", e);
        } else {
            info!("CredentialStore: cleared");
        }
    }
}
