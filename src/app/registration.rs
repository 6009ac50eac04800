//! Registration client: the one-time identity bootstrap exchange.
//!
//! ```text
//!  POST <api_base><bootstrap_path>
//!  Content-Type: application/json
//!  x-api-key / x-api-secret        (only when configured)
//!
//!  {tenant_id, project_id, alias, mac_address, chip_model,
//!   fw_version, ip, rssi, profile_id}
//!
//!  ◀── 2xx {"ok": true, "device_id": "<uuid>"}
//! ```
//!
//! The response is validated strictly: a boolean `ok == true` **and** a
//! non-empty string `device_id` are both required.

use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use super::ports::{HttpPort, HttpRequest};
use crate::config::NetConfig;
use crate::error::RegistrationError;

/// Firmware version reported to the authority.
pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

// ───────────────────────────────────────────────────────────────
// Device identity
// ───────────────────────────────────────────────────────────────

/// Identity issued by the bootstrap authority.  Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(uuid: &str) -> Option<Self> {
        if uuid.is_empty() {
            None
        } else {
            Some(Self(uuid.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

// ───────────────────────────────────────────────────────────────
// Request
// ───────────────────────────────────────────────────────────────

/// Everything the authority needs to know about this device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub tenant_id: String,
    pub project_id: String,
    pub profile_id: String,
    pub alias: String,
    /// Upper-case colon-separated hardware fingerprint.
    pub mac_address: String,
    pub chip_model: String,
    pub fw_version: String,
    pub ip: String,
    pub rssi: i32,
}

#[derive(Serialize)]
struct RegistrationRequest<'a> {
    tenant_id: &'a str,
    project_id: &'a str,
    alias: &'a str,
    mac_address: &'a str,
    chip_model: &'a str,
    fw_version: &'a str,
    ip: &'a str,
    rssi: i32,
    profile_id: &'a str,
}

impl<'a> From<&'a DeviceMetadata> for RegistrationRequest<'a> {
    fn from(m: &'a DeviceMetadata) -> Self {
        Self {
            tenant_id: &m.tenant_id,
            project_id: &m.project_id,
            alias: &m.alias,
            mac_address: &m.mac_address,
            chip_model: &m.chip_model,
            fw_version: &m.fw_version,
            ip: &m.ip,
            rssi: m.rssi,
            profile_id: &m.profile_id,
        }
    }
}

/// Serialise the request body.
pub fn build_request_body(meta: &DeviceMetadata) -> Vec<u8> {
    // Serialising a struct of strings and an integer cannot fail.
    serde_json::to_vec(&RegistrationRequest::from(meta)).unwrap_or_default()
}

// ───────────────────────────────────────────────────────────────
// Response
// ───────────────────────────────────────────────────────────────

/// Validate a completed exchange and extract the identity.
pub fn parse_response(status: u16, body: &[u8]) -> Result<DeviceIdentity, RegistrationError> {
    if !(200..300).contains(&status) {
        return Err(RegistrationError::HttpStatus(status));
    }

    let doc: Map<String, Value> =
        serde_json::from_slice(body).map_err(|_| RegistrationError::MalformedResponse)?;

    let ok = doc.get("ok").and_then(Value::as_bool).unwrap_or(false);
    let device_id = doc.get("device_id").and_then(Value::as_str).unwrap_or("");

    if !ok {
        return Err(RegistrationError::RejectedOrEmptyIdentity);
    }
    DeviceIdentity::new(device_id).ok_or(RegistrationError::RejectedOrEmptyIdentity)
}

// ───────────────────────────────────────────────────────────────
// Client
// ───────────────────────────────────────────────────────────────

pub struct RegistrationClient<H: HttpPort> {
    http: H,
    url: Option<String>,
    api_key: String,
    api_secret: String,
    timeout_ms: u32,
    insecure: bool,
}

impl<H: HttpPort> RegistrationClient<H> {
    pub fn new(http: H, cfg: &NetConfig) -> Self {
        Self {
            http,
            url: cfg.bootstrap_url(),
            api_key: cfg.api_key.clone(),
            api_secret: cfg.api_secret.clone(),
            timeout_ms: cfg.http_timeout_ms,
            insecure: cfg.tls_insecure,
        }
    }

    /// One bounded exchange.  `link_up` is checked first so no request is
    /// attempted without a route.
    pub fn register(
        &mut self,
        link_up: bool,
        meta: &DeviceMetadata,
    ) -> Result<DeviceIdentity, RegistrationError> {
        if !link_up {
            warn!("Registration: link down");
            return Err(RegistrationError::TransportUnavailable);
        }
        let Some(url) = self.url.as_deref() else {
            warn!("Registration: api_base/bootstrap_path not configured");
            return Err(RegistrationError::TransportUnavailable);
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            warn!("Registration: unsupported URL scheme in '{}'", url);
            return Err(RegistrationError::TransportUnavailable);
        }

        let mut headers: heapless::Vec<(&str, &str), 3> = heapless::Vec::new();
        // Capacity 3 is exactly the maximum pushed below.
        let _ = headers.push(("Content-Type", "application/json"));
        if !self.api_key.is_empty() {
            let _ = headers.push(("x-api-key", self.api_key.as_str()));
        }
        if !self.api_secret.is_empty() {
            let _ = headers.push(("x-api-secret", self.api_secret.as_str()));
        }

        let body = build_request_body(meta);
        info!("Registration: POST {} ({} bytes)", url, body.len());

        let request = HttpRequest {
            url,
            headers: headers.as_slice(),
            body: &body,
            timeout_ms: self.timeout_ms,
            insecure: self.insecure,
        };
        let response = self.http.post(&request).map_err(|e| {
            warn!("Registration: transport error: {}", e);
            RegistrationError::TransportUnavailable
        })?;

        match parse_response(response.status, &response.body) {
            Ok(identity) => {
                info!("Registration: ok device_id={}", identity);
                Ok(identity)
            }
            Err(e) => {
                warn!("Registration: {} (status {})", e, response.status);
                Err(e)
            }
        }
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn http_mut(&mut self) -> &mut H {
        &mut self.http
    }
}
