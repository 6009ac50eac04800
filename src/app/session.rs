//! Session manager: the publish/subscribe connection.
//!
//! Owns one plaintext and one TLS [`SessionTransport`]; which one is
//! live is decided at [`SessionManager::configure`] time from the bus
//! port.  Topics are a pure function of (tenant, identity):
//!
//! ```text
//!  publish:   <publish_namespace>/<tenant_id>/<device_id>/<state_suffix>
//!  subscribe: <command_namespace>/<tenant_id>/<device_id>/<command_suffix>
//! ```

use log::{debug, info, warn};
use serde::Serialize;

use super::commands::{PendingCommand, parse_command};
use super::ports::{BusEndpoint, CommandHandler, SessionTransport};
use super::registration::DeviceIdentity;
use crate::config::{NetConfig, SECURE_BUS_PORT};
use crate::error::{CommandError, SessionError};

/// Outbound envelope limit.
pub const MAX_PUBLISH_BYTES: usize = 256;
/// Inbound messages drained per pump, so one tick stays bounded.
const MAX_INBOUND_PER_PUMP: usize = 8;

// ───────────────────────────────────────────────────────────────
// Topics
// ───────────────────────────────────────────────────────────────

/// The four fixed topic segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLayout {
    pub publish_namespace: String,
    pub state_suffix: String,
    pub command_namespace: String,
    pub command_suffix: String,
}

impl Default for TopicLayout {
    fn default() -> Self {
        Self::from_config(&NetConfig::default())
    }
}

impl TopicLayout {
    pub fn from_config(cfg: &NetConfig) -> Self {
        Self {
            publish_namespace: cfg.publish_namespace.clone(),
            state_suffix: cfg.state_suffix.clone(),
            command_namespace: cfg.command_namespace.clone(),
            command_suffix: cfg.command_suffix.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPair {
    pub publish: String,
    pub subscribe: String,
}

impl TopicPair {
    pub fn derive(layout: &TopicLayout, tenant_id: &str, identity: &DeviceIdentity) -> Self {
        let id = identity.as_str();
        Self {
            publish: format!(
                "{}/{}/{}/{}",
                layout.publish_namespace, tenant_id, id, layout.state_suffix
            ),
            subscribe: format!(
                "{}/{}/{}/{}",
                layout.command_namespace, tenant_id, id, layout.command_suffix
            ),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Transport selection
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Plain,
    Tls,
}

impl TransportMode {
    pub fn for_port(port: u16) -> Self {
        if port == SECURE_BUS_PORT {
            Self::Tls
        } else {
            Self::Plain
        }
    }
}

/// `<device_id>-<hex of low 32 MAC bits>`, unique across a fleet.
pub fn client_id(identity: &DeviceIdentity, unique_suffix: u32) -> String {
    format!("{}-{:x}", identity.as_str(), unique_suffix)
}

#[derive(Serialize)]
struct StateEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    tenant_id: &'a str,
    device_id: &'a str,
    vpin: &'a str,
    value: i32,
}

/// Everything `configure` derives; cleared on reset.
#[derive(Debug, Clone)]
struct Binding {
    identity: DeviceIdentity,
    topics: TopicPair,
    client_id: String,
    mode: TransportMode,
}

// ───────────────────────────────────────────────────────────────
// SessionManager
// ───────────────────────────────────────────────────────────────

pub struct SessionManager<P: SessionTransport, T: SessionTransport> {
    plain: P,
    tls: T,
    layout: TopicLayout,
    tenant_id: String,
    host: String,
    port: u16,
    user: String,
    password: String,
    insecure: bool,
    unique_suffix: u32,
    binding: Option<Binding>,
}

impl<P: SessionTransport, T: SessionTransport> SessionManager<P, T> {
    pub fn new(plain: P, tls: T, cfg: &NetConfig, unique_suffix: u32) -> Self {
        Self {
            plain,
            tls,
            layout: TopicLayout::from_config(cfg),
            tenant_id: cfg.tenant_id.clone(),
            host: cfg.bus_host.clone(),
            port: cfg.bus_port,
            user: cfg.bus_user.clone(),
            password: cfg.bus_password.clone(),
            insecure: cfg.tls_insecure,
            unique_suffix,
            binding: None,
        }
    }

    /// Bind to an identity: derive topics and client id, pick the transport.
    /// Re-binding first drops any session held under the old identity.
    pub fn configure(&mut self, tenant_id: &str, identity: &DeviceIdentity) -> &TopicPair {
        if self.binding.is_some() {
            self.disconnect();
        }
        self.tenant_id = tenant_id.to_owned();
        let mode = TransportMode::for_port(self.port);
        let topics = TopicPair::derive(&self.layout, tenant_id, identity);
        info!(
            "Session: configured pub='{}' sub='{}' mode={:?}",
            topics.publish, topics.subscribe, mode
        );
        let binding = self.binding.insert(Binding {
            identity: identity.clone(),
            topics,
            client_id: client_id(identity, self.unique_suffix),
            mode,
        });
        &binding.topics
    }

    /// Open the session, subscribe to commands, then ask the host to
    /// republish its cached state.
    pub fn connect(&mut self, handler: &mut impl CommandHandler) -> Result<(), SessionError> {
        let Some(binding) = self.binding.as_ref() else {
            return Err(SessionError::NotConfigured);
        };
        let endpoint = BusEndpoint {
            host: &self.host,
            port: self.port,
            client_id: &binding.client_id,
            user: &self.user,
            password: &self.password,
            insecure: self.insecure,
        };
        let transport: &mut dyn SessionTransport = match binding.mode {
            TransportMode::Plain => &mut self.plain,
            TransportMode::Tls => &mut self.tls,
        };

        if transport.is_connected() {
            transport.disconnect();
        }
        info!(
            "Session: connecting {}:{} as '{}'",
            endpoint.host, endpoint.port, endpoint.client_id
        );
        if let Err(e) = transport.connect(&endpoint) {
            warn!("Session: connect failed: {}", e);
            return Err(e);
        }

        if let Err(e) = transport.subscribe(&binding.topics.subscribe) {
            // Still usable for publishing; the next reconnect resubscribes.
            warn!("Session: subscribe '{}' failed: {}", binding.topics.subscribe, e);
        } else {
            info!("Session: subscribed '{}'", binding.topics.subscribe);
        }

        handler.on_session_ready();
        Ok(())
    }

    /// Fire-and-drop state publication.  `false` when not connected or the
    /// envelope does not fit.
    pub fn publish(&mut self, vpin: &str, value: i32) -> bool {
        let Some(binding) = self.binding.as_ref() else {
            return false;
        };
        let transport: &mut dyn SessionTransport = match binding.mode {
            TransportMode::Plain => &mut self.plain,
            TransportMode::Tls => &mut self.tls,
        };
        if !transport.is_connected() {
            return false;
        }

        let envelope = StateEnvelope {
            kind: "state",
            tenant_id: &self.tenant_id,
            device_id: binding.identity.as_str(),
            vpin,
            value,
        };
        let payload = match serde_json::to_vec(&envelope) {
            Ok(p) if p.len() <= MAX_PUBLISH_BYTES => p,
            _ => {
                warn!("Session: envelope for '{}' exceeds {} bytes", vpin, MAX_PUBLISH_BYTES);
                return false;
            }
        };

        match transport.publish(&binding.topics.publish, &payload) {
            Ok(()) => {
                debug!("Session: published {}={}", vpin, value);
                true
            }
            Err(e) => {
                warn!("Session: publish failed: {}", e);
                false
            }
        }
    }

    /// Drain buffered inbound messages and dispatch commands.
    /// Returns the number of commands delivered to `handler`.
    pub fn pump(&mut self, handler: &mut impl CommandHandler) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_INBOUND_PER_PUMP {
            let Some(msg) = self.active_mut().and_then(|t| t.poll_inbound()) else {
                break;
            };
            if self.on_message(&msg.topic, &msg.payload, handler).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Parse one inbound message and hand a valid command to `handler`.
    /// Rejected envelopes are logged and dropped.
    pub fn on_message(
        &mut self,
        topic: &str,
        payload: &[u8],
        handler: &mut impl CommandHandler,
    ) -> Result<PendingCommand, CommandError> {
        debug!("Session: inbound on '{}' ({} bytes)", topic, payload.len());
        match parse_command(payload, &self.tenant_id) {
            Ok(cmd) => {
                info!("Session: cmd {}={}", cmd.vpin, cmd.value);
                handler.on_command(&cmd.vpin, cmd.value);
                Ok(cmd)
            }
            Err(e) => {
                warn!("Session: dropped inbound message: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        match self.binding.as_ref().map(|b| b.mode) {
            Some(TransportMode::Plain) => self.plain.is_connected(),
            Some(TransportMode::Tls) => self.tls.is_connected(),
            None => false,
        }
    }

    /// Close the session, keeping the binding.
    pub fn disconnect(&mut self) {
        if let Some(t) = self.active_mut() {
            if t.is_connected() {
                info!("Session: disconnecting");
                t.disconnect();
            }
        }
    }

    /// Close the session and forget identity and topics.
    pub fn reset(&mut self) {
        self.disconnect();
        self.binding = None;
    }

    pub fn topics(&self) -> Option<&TopicPair> {
        self.binding.as_ref().map(|b| &b.topics)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.client_id.as_str())
    }

    pub fn mode(&self) -> Option<TransportMode> {
        self.binding.as_ref().map(|b| b.mode)
    }

    pub fn plain(&self) -> &P {
        &self.plain
    }

    pub fn tls(&self) -> &T {
        &self.tls
    }

    fn active_mut(&mut self) -> Option<&mut dyn SessionTransport> {
        match self.binding.as_ref()?.mode {
            TransportMode::Plain => Some(&mut self.plain),
            TransportMode::Tls => Some(&mut self.tls),
        }
    }
}
