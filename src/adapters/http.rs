//! HTTP(S) client adapter for the bootstrap request.
//!
//! Implements [`HttpPort`].  One connection per request; the bootstrap
//! exchange happens once per link-up so there is nothing to keep alive.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspHttpConnection` (esp_http_client).
//!   Verified requests attach the IDF certificate bundle.  Unverified
//!   requests additionally need `CONFIG_ESP_TLS_INSECURE` and
//!   `CONFIG_ESP_TLS_SKIP_SERVER_CERT_VERIFY` in sdkconfig.
//! - **all other targets**: a simulated authority that accepts every
//!   device.

use log::{debug, warn};

use crate::app::ports::{HttpPort, HttpRequest, HttpResponse, TransportError};

/// Upper bound on a bootstrap response body.
pub const MAX_RESPONSE_BYTES: usize = 2048;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    http::{
        Method,
        client::{Configuration, EspHttpConnection},
    },
    sys::EspError,
};

pub struct HttpClient {
    #[cfg(not(target_os = "espidf"))]
    sim_device_id: String,
    #[cfg(not(target_os = "espidf"))]
    sim_requests: u32,
}

#[cfg(target_os = "espidf")]
impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl HttpClient {
    pub fn new() -> Self {
        Self {}
    }

    fn exchange(request: &HttpRequest<'_>) -> Result<HttpResponse, EspError> {
        let config = Configuration {
            timeout: Some(core::time::Duration::from_millis(u64::from(request.timeout_ms))),
            crt_bundle_attach: if request.insecure {
                None
            } else {
                Some(esp_idf_svc::sys::esp_crt_bundle_attach)
            },
            buffer_size: Some(1024),
            ..Default::default()
        };
        let mut conn = EspHttpConnection::new(&config)?;

        let content_length = request.body.len().to_string();
        let mut headers: heapless::Vec<(&str, &str), 4> = heapless::Vec::new();
        for &h in request.headers.iter().take(3) {
            let _ = headers.push(h);
        }
        let _ = headers.push(("Content-Length", content_length.as_str()));

        conn.initiate_request(Method::Post, request.url, &headers)?;
        let mut written = 0;
        while written < request.body.len() {
            written += conn.write(&request.body[written..])?;
        }
        conn.initiate_response()?;
        let status = conn.status();

        let mut body = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = conn.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            if body.len() + n > MAX_RESPONSE_BYTES {
                warn!("HTTP: response truncated at {} bytes", MAX_RESPONSE_BYTES);
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        Ok(HttpResponse { status, body })
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for HttpClient {
    fn default() -> Self {
        Self::new("sim-device")
    }
}

#[cfg(not(target_os = "espidf"))]
impl HttpClient {
    /// Simulation: every bootstrap is accepted with `device_id`.
    pub fn new(device_id: &str) -> Self {
        Self {
            sim_device_id: device_id.to_owned(),
            sim_requests: 0,
        }
    }

    pub fn sim_requests(&self) -> u32 {
        self.sim_requests
    }
}

impl HttpPort for HttpClient {
    #[cfg(target_os = "espidf")]
    fn post(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        debug!("HTTP: POST {} ({} bytes)", request.url, request.body.len());
        Self::exchange(request).map_err(|e| {
            warn!("HTTP: POST {} failed: {:?}", request.url, e);
            use esp_idf_svc::sys::{ESP_ERR_HTTP_EAGAIN, ESP_ERR_TIMEOUT, esp_err_t};
            let code = e.code();
            if code == ESP_ERR_HTTP_EAGAIN as esp_err_t || code == ESP_ERR_TIMEOUT as esp_err_t {
                TransportError::Timeout
            } else {
                TransportError::ConnectFailed
            }
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn post(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        debug!("HTTP(sim): POST {} ({} bytes)", request.url, request.body.len());
        if !(request.url.starts_with("http://") || request.url.starts_with("https://")) {
            warn!("HTTP(sim): unsupported URL {}", request.url);
            return Err(TransportError::ConnectFailed);
        }
        self.sim_requests = self.sim_requests.wrapping_add(1);
        let body = serde_json::json!({ "ok": true, "device_id": self.sim_device_id });
        Ok(HttpResponse {
            status: 200,
            body: serde_json::to_vec(&body).map_err(|_| TransportError::Closed)?,
        })
    }
}
