//! Unified error types for the EdgeLink firmware.
//!
//! One `Copy` enum per connectivity stage, each funnelled into the
//! top-level [`Error`].  Every variant here is recoverable: the
//! orchestrator absorbs it at the stage that produced it and retries
//! after that stage's cooldown.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible connectivity operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The local-network link could not be brought up.
    Link(LinkError),
    /// The identity-bootstrap exchange failed.
    Registration(RegistrationError),
    /// The publish/subscribe session failed.
    Session(SessionError),
    /// An inbound command envelope was dropped.
    Command(CommandError),
    /// Supplied network credentials are unusable.
    Credentials(CredentialError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Registration(e) => write!(f, "registration: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Credentials(e) => write!(f, "credentials: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No network name is configured (waiting for provisioning).
    NoCredentials,
    /// The driver did not report a connection before the deadline.
    Timeout,
    /// A connect attempt is already in flight.
    Busy,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no network credentials"),
            Self::Timeout => write!(f, "connect timed out"),
            Self::Busy => write!(f, "connect already in progress"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Registration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// No link, bad URL scheme, or the HTTP transport could not be opened.
    TransportUnavailable,
    /// The authority answered outside the 2xx range.
    HttpStatus(u16),
    /// The response body is not a JSON object.
    MalformedResponse,
    /// `ok` is false/missing, or `device_id` is missing or empty.
    RejectedOrEmptyIdentity,
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportUnavailable => write!(f, "transport unavailable"),
            Self::HttpStatus(code) => write!(f, "HTTP status {code}"),
            Self::MalformedResponse => write!(f, "malformed response body"),
            Self::RejectedOrEmptyIdentity => write!(f, "rejected or empty device_id"),
        }
    }
}

impl From<RegistrationError> for Error {
    fn from(e: RegistrationError) -> Self {
        Self::Registration(e)
    }
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// `connect` called before topics were derived.
    NotConfigured,
    /// The broker refused the credentials or client id.
    Auth,
    /// Socket / TLS failure or broker unreachable.
    Transport,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "session not configured"),
            Self::Auth => write!(f, "broker rejected credentials"),
            Self::Transport => write!(f, "broker unreachable"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Inbound command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Payload is not a JSON object.
    Malformed,
    /// `type` is present and is not `"cmd"`.
    UnsupportedType,
    /// `tenant_id` is present and differs from the configured tenant.
    TenantMismatch,
    /// Neither `vpin` nor `pin` carries a non-empty string.
    MissingPin,
    /// `value` is absent or null.
    MissingValue,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "payload is not a JSON object"),
            Self::UnsupportedType => write!(f, "envelope type is not cmd"),
            Self::TenantMismatch => write!(f, "tenant_id mismatch"),
            Self::MissingPin => write!(f, "missing vpin/pin"),
            Self::MissingValue => write!(f, "missing value"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Credential errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    EmptyNetworkName,
    NetworkNameTooLong,
    SecretTooLong,
    /// The credential inbox could not take the update.
    InboxBusy,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNetworkName => write!(f, "network name is empty"),
            Self::NetworkNameTooLong => write!(f, "network name exceeds 32 bytes"),
            Self::SecretTooLong => write!(f, "secret exceeds 64 bytes"),
            Self::InboxBusy => write!(f, "credential inbox busy"),
        }
    }
}

impl From<CredentialError> for Error {
    fn from(e: CredentialError) -> Self {
        Self::Credentials(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
