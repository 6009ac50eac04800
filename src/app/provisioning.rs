//! Provisioning channel bridge: BLE peer ↔ orchestrator.
//!
//! The peer writes UTF-8 text to a single characteristic:
//!
//! | Write                                          | Effect                         |
//! |------------------------------------------------|--------------------------------|
//! | `{"ssid":"…","pass":"…","persist":true}`       | credential update → inbox      |
//! | `PING` (any case)                              | notify `PONG`                  |
//! | `ERASE` (any case)                             | erase request → inbox          |
//!
//! `password` is accepted in place of `pass`; `persist` defaults to true.
//! Credential writes are answered with `OK` or `ERR`.
//!
//! The bridge never touches connectivity state.  Everything it learns is
//! pushed through the bounded [`CredentialInbox`], which the
//! orchestrator drains on its own schedule.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::{info, warn};
use serde::Deserialize;

use super::credentials::Credentials;
use super::events::ConnEvent;
use super::ports::{EventSink, ProvisioningPort};
use crate::config::NetConfig;
use crate::error::CredentialError;

/// Inbox depth.  Updates are rare; overflow evicts the oldest message so
/// the most recent update always reaches the orchestrator.
pub const INBOX_DEPTH: usize = 4;

/// Messages from the provisioning side to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxMessage {
    CredentialUpdate(Credentials),
    Erase,
}

/// Single-consumer queue into the orchestrator.  May be fed from any task.
pub type CredentialInbox = Channel<CriticalSectionRawMutex, InboxMessage, INBOX_DEPTH>;

/// Queue `msg`, evicting the oldest pending message while the inbox is
/// full.  Fails only if the inbox stays full after `INBOX_DEPTH` evictions,
/// which needs another producer racing this one.
pub fn push_latest(inbox: &CredentialInbox, msg: InboxMessage) -> Result<(), CredentialError> {
    let mut msg = msg;
    for _ in 0..=INBOX_DEPTH {
        match inbox.try_send(msg) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(back)) => {
                msg = back;
                if let Ok(evicted) = inbox.try_receive() {
                    warn!("Provisioning: inbox full, superseded {:?}", evicted);
                }
            }
        }
    }
    warn!("Provisioning: inbox contended, update dropped");
    Err(CredentialError::InboxBusy)
}

// ───────────────────────────────────────────────────────────────
// Write parsing
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningWrite {
    Credentials {
        ssid: String,
        pass: String,
        persist: bool,
    },
    Ping,
    Erase,
}

#[derive(Deserialize)]
struct CredentialPayload {
    ssid: String,
    #[serde(default, alias = "password")]
    pass: String,
    #[serde(default = "persist_default")]
    persist: bool,
}

fn persist_default() -> bool {
    true
}

/// Decode one peer write.  `None` for empty or unrecognised input.
pub fn parse_write(raw: &[u8]) -> Option<ProvisioningWrite> {
    let text = core::str::from_utf8(raw).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    if text.eq_ignore_ascii_case("PING") {
        return Some(ProvisioningWrite::Ping);
    }
    if text.eq_ignore_ascii_case("ERASE") {
        return Some(ProvisioningWrite::Erase);
    }
    let payload: CredentialPayload = serde_json::from_str(text).ok()?;
    Some(ProvisioningWrite::Credentials {
        ssid: payload.ssid,
        pass: payload.pass,
        persist: payload.persist,
    })
}

// ───────────────────────────────────────────────────────────────
// Bridge
// ───────────────────────────────────────────────────────────────

pub struct ProvisioningBridge<B: ProvisioningPort> {
    port: B,
    heartbeat_interval_ms: u32,
    advertising_kick_ms: u32,
    heartbeat_counter: u32,
    last_heartbeat_ms: u64,
    last_kick_ms: u64,
    peer_attached: bool,
}

impl<B: ProvisioningPort> ProvisioningBridge<B> {
    pub fn new(port: B, cfg: &NetConfig) -> Self {
        Self {
            port,
            heartbeat_interval_ms: cfg.heartbeat_interval_ms,
            advertising_kick_ms: cfg.advertising_kick_ms,
            heartbeat_counter: 0,
            last_heartbeat_ms: 0,
            last_kick_ms: 0,
            peer_attached: false,
        }
    }

    /// Credentials received from the peer (or any other out-of-band source).
    pub fn on_credentials(
        &mut self,
        inbox: &CredentialInbox,
        network_name: &str,
        secret: &str,
        persist: bool,
    ) -> Result<(), CredentialError> {
        let creds = Credentials::new(network_name, secret, persist)?;
        info!(
            "Provisioning: credentials for '{}' (persist={})",
            creds.network_name(),
            persist
        );
        push_latest(inbox, InboxMessage::CredentialUpdate(creds))
    }

    /// Best-effort status push to the peer.
    pub fn notify(&mut self, text: &str) {
        if self.port.is_peer_connected() {
            self.port.notify(text);
        }
    }

    /// Service the channel: attach/detach edges, peer writes, heartbeat
    /// and advertising keep-alive.  Never blocks.
    pub fn poll(&mut self, now_ms: u64, inbox: &CredentialInbox) {
        let attached = self.port.is_peer_connected();
        if attached && !self.peer_attached {
            info!("Provisioning: peer attached");
            self.port.notify("READY");
            self.last_heartbeat_ms = now_ms;
        } else if !attached && self.peer_attached {
            info!("Provisioning: peer detached, advertising");
            self.port.restart_advertising();
            self.last_kick_ms = now_ms;
        }
        self.peer_attached = attached;

        while let Some(raw) = self.port.take_write() {
            self.handle_write(&raw, inbox);
        }

        if attached {
            if now_ms.saturating_sub(self.last_heartbeat_ms) >= u64::from(self.heartbeat_interval_ms)
            {
                let msg = format!("{{\"heartbeat\":{}}}", self.heartbeat_counter);
                self.heartbeat_counter = self.heartbeat_counter.wrapping_add(1);
                self.port.notify(&msg);
                self.last_heartbeat_ms = now_ms;
            }
        } else if now_ms.saturating_sub(self.last_kick_ms) >= u64::from(self.advertising_kick_ms) {
            self.port.restart_advertising();
            self.last_kick_ms = now_ms;
        }
    }

    fn handle_write(&mut self, raw: &[u8], inbox: &CredentialInbox) {
        match parse_write(raw) {
            Some(ProvisioningWrite::Ping) => self.port.notify("PONG"),
            Some(ProvisioningWrite::Erase) => {
                info!("Provisioning: erase requested");
                match push_latest(inbox, InboxMessage::Erase) {
                    Ok(()) => self.port.notify("OK"),
                    Err(_) => self.port.notify("ERR"),
                }
            }
            Some(ProvisioningWrite::Credentials {
                ssid,
                pass,
                persist,
            }) => match self.on_credentials(inbox, &ssid, &pass, persist) {
                Ok(()) => self.port.notify("OK"),
                Err(e) => {
                    warn!("Provisioning: rejected credentials: {}", e);
                    self.port.notify("ERR");
                }
            },
            None => {
                if !raw.iter().all(u8::is_ascii_whitespace) {
                    warn!("Provisioning: unrecognised write ({} bytes)", raw.len());
                    self.port.notify("ERR");
                }
            }
        }
    }

    pub fn heartbeat_counter(&self) -> u32 {
        self.heartbeat_counter
    }

    pub fn port(&self) -> &B {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut B {
        &mut self.port
    }
}

/// Mirrors connectivity milestones to the attached peer so a phone app
/// can follow provisioning progress.
impl<B: ProvisioningPort> EventSink for ProvisioningBridge<B> {
    fn emit(&mut self, event: &ConnEvent) {
        let text = match event {
            ConnEvent::LinkUp { .. } => "LINK_UP",
            ConnEvent::Registered { .. } => "REGISTERED",
            ConnEvent::SessionUp { .. } => "ONLINE",
            ConnEvent::SessionDown | ConnEvent::LinkLost => "OFFLINE",
            ConnEvent::CredentialsErased => "ERASED",
            _ => return,
        };
        self.notify(text);
    }
}
