//! Network configuration parameters
//!
//! Everything the connectivity stack needs to reach the bootstrap
//! authority and the message bus, plus the per-stage retry timing.
//! Values can be overridden via NVS (see [`ConfigPort`](crate::app::ports::ConfigPort)).
//!
//! Deployment values are baked in at build time from the environment:
//!
//! | Variable                                   | Field                      |
//! |--------------------------------------------|----------------------------|
//! | `EDGELINK_TENANT_ID`                       | `tenant_id`                |
//! | `EDGELINK_PROJECT_ID`, `EDGELINK_PROFILE_ID` | `project_id`, `profile_id` |
//! | `EDGELINK_ALIAS`                           | `alias`                    |
//! | `EDGELINK_API_BASE`                        | `api_base`                 |
//! | `EDGELINK_API_KEY`, `EDGELINK_API_SECRET`  | `api_key`, `api_secret`    |
//! | `EDGELINK_BUS_HOST`, `EDGELINK_BUS_PORT`   | `bus_host`, `bus_port`     |
//! | `EDGELINK_BUS_USER`, `EDGELINK_BUS_PASSWORD` | `bus_user`, `bus_password` |
//! | `EDGELINK_WIFI_SSID`, `EDGELINK_WIFI_PASSWORD` | fallback credentials   |
//! | `EDGELINK_TLS_INSECURE=1`                  | `tls_insecure`             |
//!
//! Unset variables leave the field empty, which [`validate`] rejects for
//! the tenant, bootstrap and bus fields.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Port at which the bus is expected to speak TLS.
pub const SECURE_BUS_PORT: u16 = 8883;

/// Core network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetConfig {
    // --- Tenant / device profile ---
    pub tenant_id: String,
    pub project_id: String,
    pub profile_id: String,
    /// Human-readable device alias reported at registration.
    pub alias: String,

    // --- Bootstrap authority ---
    /// Scheme + host, e.g. `https://api.example.com`.
    pub api_base: String,
    /// Path appended to `api_base`, e.g. `/device/bootstrap`.
    pub bootstrap_path: String,
    pub api_key: String,
    pub api_secret: String,
    /// Skip server certificate verification (HTTPS and MQTTS).  Off unless
    /// the image is built with `EDGELINK_TLS_INSECURE=1`.
    pub tls_insecure: bool,

    // --- Message bus ---
    pub bus_host: String,
    pub bus_port: u16,
    pub bus_user: String,
    pub bus_password: String,
    pub publish_namespace: String,
    pub state_suffix: String,
    pub command_namespace: String,
    pub command_suffix: String,

    // --- Link ---
    /// Credentials baked into the image, used only when NVS holds none.
    pub fallback_ssid: String,
    pub fallback_password: String,
    /// Start SNTP once the link is up.
    pub use_ntp: bool,

    // --- Timing ---
    /// Minimum spacing between link connect attempts (milliseconds)
    pub link_cooldown_ms: u32,
    /// Minimum spacing between registration attempts (milliseconds)
    pub registration_cooldown_ms: u32,
    /// Minimum spacing between session connect attempts (milliseconds)
    pub session_cooldown_ms: u32,
    /// Link timeout for the first attempt after boot or provisioning
    pub link_timeout_initial_ms: u32,
    /// Link timeout for subsequent retries
    pub link_timeout_retry_ms: u32,
    /// Bound on the registration request
    pub http_timeout_ms: u32,
    /// Provisioning-peer heartbeat period
    pub heartbeat_interval_ms: u32,
    /// Advertising re-kick period while no peer is attached
    pub advertising_kick_ms: u32,
}

/// Build-time value of an `EDGELINK_*` variable, empty when unset.
fn baked(value: Option<&'static str>) -> String {
    value.unwrap_or_default().to_owned()
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            tenant_id: baked(option_env!("EDGELINK_TENANT_ID")),
            project_id: baked(option_env!("EDGELINK_PROJECT_ID")),
            profile_id: baked(option_env!("EDGELINK_PROFILE_ID")),
            alias: baked(option_env!("EDGELINK_ALIAS")),

            api_base: baked(option_env!("EDGELINK_API_BASE")),
            bootstrap_path: "/device/bootstrap".into(),
            api_key: baked(option_env!("EDGELINK_API_KEY")),
            api_secret: baked(option_env!("EDGELINK_API_SECRET")),
            tls_insecure: option_env!("EDGELINK_TLS_INSECURE") == Some("1"),

            bus_host: baked(option_env!("EDGELINK_BUS_HOST")),
            bus_port: option_env!("EDGELINK_BUS_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(SECURE_BUS_PORT),
            bus_user: baked(option_env!("EDGELINK_BUS_USER")),
            bus_password: baked(option_env!("EDGELINK_BUS_PASSWORD")),
            publish_namespace: "nebadondevice".into(),
            state_suffix: "dt".into(),
            command_namespace: "nebadoncmd".into(),
            command_suffix: "cmd".into(),

            fallback_ssid: baked(option_env!("EDGELINK_WIFI_SSID")),
            fallback_password: baked(option_env!("EDGELINK_WIFI_PASSWORD")),
            use_ntp: true,

            link_cooldown_ms: 3_000,
            registration_cooldown_ms: 5_000,
            session_cooldown_ms: 2_000,
            link_timeout_initial_ms: 20_000,
            link_timeout_retry_ms: 12_000,
            http_timeout_ms: 7_000,
            heartbeat_interval_ms: 3_000,
            advertising_kick_ms: 5_000,
        }
    }
}

impl NetConfig {
    /// Full bootstrap endpoint, or `None` when either half is unset.
    pub fn bootstrap_url(&self) -> Option<String> {
        if self.api_base.is_empty() || self.bootstrap_path.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.api_base, self.bootstrap_path))
    }

    /// Whether the bus connection should run over TLS.
    pub fn bus_uses_tls(&self) -> bool {
        self.bus_port == SECURE_BUS_PORT
    }
}

/// Range-check a configuration before it is persisted.
pub fn validate(cfg: &NetConfig) -> Result<(), ConfigError> {
    if cfg.tenant_id.is_empty() {
        return Err(ConfigError::ValidationFailed("tenant_id must be set"));
    }
    if !cfg.api_base.starts_with("http://") && !cfg.api_base.starts_with("https://") {
        return Err(ConfigError::ValidationFailed(
            "api_base must start with http:// or https://",
        ));
    }
    if cfg.bus_host.is_empty() {
        return Err(ConfigError::ValidationFailed("bus_host must be set"));
    }
    if cfg.bus_port == 0 {
        return Err(ConfigError::ValidationFailed("bus_port must be non-zero"));
    }
    for segment in [
        &cfg.publish_namespace,
        &cfg.state_suffix,
        &cfg.command_namespace,
        &cfg.command_suffix,
    ] {
        if segment.is_empty() || segment.contains(['/', '+', '#']) {
            return Err(ConfigError::ValidationFailed(
                "topic segments must be non-empty and free of '/', '+', '#'",
            ));
        }
    }
    if !(500..=60_000).contains(&cfg.link_cooldown_ms)
        || !(500..=60_000).contains(&cfg.registration_cooldown_ms)
        || !(500..=60_000).contains(&cfg.session_cooldown_ms)
    {
        return Err(ConfigError::ValidationFailed(
            "stage cooldowns must be 500–60000 ms",
        ));
    }
    if !(1_000..=60_000).contains(&cfg.link_timeout_initial_ms)
        || !(1_000..=60_000).contains(&cfg.link_timeout_retry_ms)
    {
        return Err(ConfigError::ValidationFailed(
            "link timeouts must be 1000–60000 ms",
        ));
    }
    if !(1_000..=30_000).contains(&cfg.http_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "http_timeout_ms must be 1000–30000",
        ));
    }
    Ok(())
}
