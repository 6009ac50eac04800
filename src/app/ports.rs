//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Orchestrator (domain)
//! ```
//!
//! Driven adapters (link driver, HTTP client, bus client, BLE peer,
//! storage, clock) implement these traits.  The
//! [`Orchestrator`](super::service::Orchestrator) consumes them via
//! generics, so the connectivity core never touches the radio directly
//! and every stage can be driven from a fake in host tests.
//!
//! ## Security notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **StoragePort** implementations SHOULD encrypt the credential namespace.
//! - Secrets handed to [`LinkDriver::connect`] must never be logged.

use crate::app::credentials::Credentials;
use crate::config::NetConfig;
use crate::error::SessionError;

// ───────────────────────────────────────────────────────────────
// Credential store (driven adapter: domain ↔ persisted network creds)
// ───────────────────────────────────────────────────────────────

/// Persists and retrieves the single (network-name, secret) pair.
pub trait CredentialStore {
    /// Returns `None` when nothing (or nothing readable) is stored.
    fn load(&mut self) -> Option<Credentials>;

    /// Replace the stored pair wholesale.  Returns `false` on write failure.
    fn save(&mut self, creds: &Credentials) -> bool;

    /// Forget the stored pair.  Idempotent.
    fn clear(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Link driver (driven adapter: domain → WiFi station)
// ───────────────────────────────────────────────────────────────

/// Minimal local-network link primitive.
pub trait LinkDriver {
    /// Join `network_name`, blocking for at most `timeout_ms`.
    /// Returns `true` once the link reports connected with an address.
    fn connect(&mut self, network_name: &str, secret: &str, timeout_ms: u32) -> bool;

    /// Drop any current association.  Safe to call when already down.
    fn disconnect(&mut self);

    /// Cheap liveness poll.
    fn is_connected(&self) -> bool;

    /// Dotted-quad address of the station interface (empty when down).
    fn local_ip(&self) -> String;

    /// Received signal strength in dBm (0 when unknown).
    fn rssi(&self) -> i32;
}

// ───────────────────────────────────────────────────────────────
// HTTP port (driven adapter: domain → bootstrap authority)
// ───────────────────────────────────────────────────────────────

/// A single JSON POST.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
    pub timeout_ms: u32,
    /// Skip server-certificate verification.
    pub insecure: bool,
}

/// Status line and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub trait HttpPort {
    /// Send one request and wait for the full response.
    ///
    /// Any HTTP status is `Ok`; `Err` means no response was obtained.
    fn post(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Session transport (driven adapter: domain ↔ pub/sub bus)
// ───────────────────────────────────────────────────────────────

/// Where and as whom to open the bus session.
#[derive(Debug, Clone, Copy)]
pub struct BusEndpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    /// Only meaningful on the TLS transport.
    pub insecure: bool,
}

/// One message taken off the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe primitive.  Plaintext and TLS transports both
/// implement it; the session manager picks one per configuration.
pub trait SessionTransport {
    /// Open the session.  Blocks until the broker acknowledges or refuses.
    fn connect(&mut self, endpoint: &BusEndpoint<'_>) -> Result<(), SessionError>;

    fn disconnect(&mut self);

    /// Cheap liveness poll.
    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Fire-and-forget, non-retained publish.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Take the next buffered inbound message, if any.  Never blocks.
    fn poll_inbound(&mut self) -> Option<InboundMessage>;
}

// ───────────────────────────────────────────────────────────────
// Provisioning port (driven adapter: domain ↔ BLE peer)
// ───────────────────────────────────────────────────────────────

/// The short-range channel as seen from the core: a peer that may be
/// attached, writes it has sent, and a text notify path back to it.
pub trait ProvisioningPort {
    /// Best-effort status push to the attached peer.
    fn notify(&mut self, text: &str);

    fn is_peer_connected(&self) -> bool;

    /// Take the next raw write from the peer, if any.
    fn take_write(&mut self) -> Option<Vec<u8>>;

    /// Re-kick advertising so a new peer can find the device.
    fn restart_advertising(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock & device identity
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Factory-fixed hardware facts.
pub trait DeviceInfo {
    /// Upper-case colon-separated station MAC, e.g. `AA:BB:CC:DD:EE:FF`.
    fn mac_address(&self) -> String;

    fn chip_model(&self) -> String;

    /// Low 32 bits of the factory MAC, used to make client ids unique.
    fn unique_suffix(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Host application callbacks
// ───────────────────────────────────────────────────────────────

/// Capability the host application registers with the core.
pub trait CommandHandler {
    /// An inbound command addressed to `vpin`.
    fn on_command(&mut self, vpin: &str, value: i32);

    /// The session just came up; republish every cached state.
    fn on_session_ready(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / peer)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`ConnEvent`](super::events::ConnEvent)s
/// through this port.  Adapters decide where they go (serial log, BLE
/// notify, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::ConnEvent);
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn emit(&mut self, event: &super::events::ConnEvent) {
        (**self).emit(event);
    }
}

/// Fan an event out to two sinks.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &super::events::ConnEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`NetConfig`].
///
/// # Security
///
/// Implementations MUST validate config values before persisting
/// (see [`crate::config::validate`]).  Invalid values are rejected with
/// [`ConfigError::ValidationFailed`], never silently clamped.
pub trait ConfigPort {
    /// Returns [`NetConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<NetConfig, ConfigError>;

    fn save(&mut self, config: &NetConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// # Security
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; the in-memory
///   simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    /// Storage partition is full.
    Full,
    /// Destination buffer too small for the stored value.
    BufferTooSmall,
    IoError,
}

/// Errors from [`HttpPort`] and [`SessionTransport`] I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be opened (DNS, TCP, TLS handshake).
    ConnectFailed,
    /// No answer within the deadline.
    Timeout,
    /// The peer closed the connection mid-exchange.
    Closed,
    /// The local client is not connected.
    NotConnected,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::Timeout => write!(f, "timed out"),
            Self::Closed => write!(f, "connection closed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}
