//! MQTT transport adapter.
//!
//! Implements [`SessionTransport`] twice over the same client type: a
//! plaintext flavour (`mqtt://`) and a TLS flavour (`mqtts://`).  The
//! session manager owns one of each and picks per configuration.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspMqttClient` (esp-mqtt).  The client
//!   callback runs on the MQTT task; it shares a small mutex-guarded
//!   state block with the main task (connected flag + inbound queue).
//! - **all other targets**: an in-process loopback broker for host runs.
//!
//! Inbound messages are queued, never dispatched from the callback, so
//! commands are handled on the orchestrator's own tick.

use std::collections::VecDeque;

use log::{info, warn};

use crate::app::ports::{BusEndpoint, InboundMessage, SessionTransport, TransportError};
use crate::error::SessionError;

/// esp-mqtt receive/transmit buffer.
pub const MQTT_BUFFER_BYTES: usize = 1024;
/// Oldest inbound messages are dropped beyond this depth.
const INBOUND_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Plain,
    Tls,
}

impl Scheme {
    fn prefix(self) -> &'static str {
        match self {
            Self::Plain => "mqtt",
            Self::Tls => "mqtts",
        }
    }
}

/// `mqtt://host:port` or `mqtts://host:port`.
pub fn broker_url(scheme: Scheme, host: &str, port: u16) -> String {
    format!("{}://{}:{}", scheme.prefix(), host, port)
}

/// State written by the client callback, read by the main task.
#[derive(Default)]
struct Shared {
    connected: bool,
    /// The broker closed the connection before ever acknowledging it.
    refused: bool,
    inbound: VecDeque<InboundMessage>,
}

impl Shared {
    fn push_inbound(&mut self, msg: InboundMessage) {
        if self.inbound.len() >= INBOUND_QUEUE_DEPTH {
            self.inbound.pop_front();
            warn!("MQTT: inbound queue full, dropped oldest");
        }
        self.inbound.push_back(msg);
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF implementation
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    use esp_idf_svc::mqtt::client::{
        EspMqttClient, EspMqttEvent, EventPayload, MqttClientConfiguration, QoS,
    };

    use super::*;

    const CONNECT_TIMEOUT_MS: u64 = 10_000;
    const CONNECT_POLL_MS: u64 = 50;

    pub struct MqttTransport {
        scheme: Scheme,
        client: Option<EspMqttClient<'static>>,
        shared: Arc<Mutex<Shared>>,
    }

    fn lock(shared: &Mutex<Shared>) -> std::sync::MutexGuard<'_, Shared> {
        shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl MqttTransport {
        pub fn plain() -> Self {
            Self::with_scheme(Scheme::Plain)
        }

        pub fn tls() -> Self {
            Self::with_scheme(Scheme::Tls)
        }

        fn with_scheme(scheme: Scheme) -> Self {
            Self {
                scheme,
                client: None,
                shared: Arc::new(Mutex::new(Shared::default())),
            }
        }

        fn on_event(shared: &Mutex<Shared>, event: EspMqttEvent<'_>) {
            match event.payload() {
                EventPayload::Connected(_) => {
                    let mut s = lock(shared);
                    s.connected = true;
                    s.refused = false;
                }
                EventPayload::Disconnected => {
                    let mut s = lock(shared);
                    if !s.connected {
                        s.refused = true;
                    }
                    s.connected = false;
                }
                EventPayload::Received {
                    topic: Some(topic),
                    data,
                    ..
                } => lock(shared).push_inbound(InboundMessage {
                    topic: topic.to_owned(),
                    payload: data.to_vec(),
                }),
                EventPayload::Error(e) => warn!("MQTT: client error {:?}", e),
                _ => {}
            }
        }
    }

    impl SessionTransport for MqttTransport {
        fn connect(&mut self, endpoint: &BusEndpoint<'_>) -> Result<(), SessionError> {
            self.disconnect();
            *lock(&self.shared) = Shared::default();

            let url = broker_url(self.scheme, endpoint.host, endpoint.port);
            let tls = self.scheme == Scheme::Tls;
            let conf = MqttClientConfiguration {
                client_id: Some(endpoint.client_id),
                username: (!endpoint.user.is_empty()).then_some(endpoint.user),
                password: (!endpoint.password.is_empty()).then_some(endpoint.password),
                buffer_size: MQTT_BUFFER_BYTES,
                out_buffer_size: MQTT_BUFFER_BYTES,
                disable_clean_session: false,
                crt_bundle_attach: (tls && !endpoint.insecure)
                    .then_some(esp_idf_svc::sys::esp_crt_bundle_attach),
                skip_cert_common_name_check: tls && endpoint.insecure,
                ..Default::default()
            };

            let shared = Arc::clone(&self.shared);
            let client = EspMqttClient::new_cb(&url, &conf, move |event| {
                Self::on_event(&shared, event);
            })
            .map_err(|e| {
                warn!("MQTT: client create failed for {}: {:?}", url, e);
                SessionError::Transport
            })?;
            self.client = Some(client);

            let deadline = Instant::now() + Duration::from_millis(CONNECT_TIMEOUT_MS);
            loop {
                {
                    let s = lock(&self.shared);
                    if s.connected {
                        info!("MQTT: connected to {}", url);
                        return Ok(());
                    }
                    if s.refused {
                        drop(s);
                        self.disconnect();
                        return Err(SessionError::Auth);
                    }
                }
                if Instant::now() >= deadline {
                    warn!("MQTT: connect to {} timed out", url);
                    self.disconnect();
                    return Err(SessionError::Transport);
                }
                std::thread::sleep(Duration::from_millis(CONNECT_POLL_MS));
            }
        }

        fn disconnect(&mut self) {
            // Dropping the client stops the esp-mqtt task.
            if self.client.take().is_some() {
                info!("MQTT: disconnected");
            }
            lock(&self.shared).connected = false;
        }

        fn is_connected(&self) -> bool {
            self.client.is_some() && lock(&self.shared).connected
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
            let client = self.client.as_mut().ok_or(TransportError::NotConnected)?;
            client
                .subscribe(topic, QoS::AtMostOnce)
                .map(|_| ())
                .map_err(|_| TransportError::Closed)
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
            if !self.is_connected() {
                return Err(TransportError::NotConnected);
            }
            let client = self.client.as_mut().ok_or(TransportError::NotConnected)?;
            client
                .publish(topic, QoS::AtMostOnce, false, payload)
                .map(|_| ())
                .map_err(|_| TransportError::Closed)
        }

        fn poll_inbound(&mut self) -> Option<InboundMessage> {
            lock(&self.shared).inbound.pop_front()
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::MqttTransport;

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub struct MqttTransport {
    scheme: Scheme,
    shared: Shared,
    url: Option<String>,
    subscriptions: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
}

#[cfg(not(target_os = "espidf"))]
impl MqttTransport {
    pub fn plain() -> Self {
        Self::with_scheme(Scheme::Plain)
    }

    pub fn tls() -> Self {
        Self::with_scheme(Scheme::Tls)
    }

    fn with_scheme(scheme: Scheme) -> Self {
        Self {
            scheme,
            shared: Shared::default(),
            url: None,
            subscriptions: Vec::new(),
            published: Vec::new(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Simulation: deliver a message as the broker would.  Dropped unless
    /// the client is connected and subscribed to `topic`.
    pub fn sim_deliver(&mut self, topic: &str, payload: &[u8]) -> bool {
        if !self.shared.connected || !self.subscriptions.iter().any(|s| s == topic) {
            return false;
        }
        self.shared.push_inbound(InboundMessage {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
        });
        true
    }

    /// Simulation: the broker rejects the next connect (bad credentials).
    pub fn sim_refuse_next(&mut self) {
        self.shared.refused = true;
    }

    /// Simulation: the broker closes the connection.
    pub fn sim_drop(&mut self) {
        self.shared.connected = false;
    }

    pub fn sim_published(&self) -> &[(String, Vec<u8>)] {
        &self.published
    }
}

#[cfg(not(target_os = "espidf"))]
impl SessionTransport for MqttTransport {
    fn connect(&mut self, endpoint: &BusEndpoint<'_>) -> Result<(), SessionError> {
        if endpoint.host.is_empty() {
            return Err(SessionError::Transport);
        }
        let url = broker_url(self.scheme, endpoint.host, endpoint.port);
        if core::mem::take(&mut self.shared.refused) {
            warn!("MQTT(sim): {} refused by {}", endpoint.client_id, url);
            self.shared.connected = false;
            return Err(SessionError::Auth);
        }
        info!("MQTT(sim): {} connected to {}", endpoint.client_id, url);
        self.url = Some(url);
        self.shared = Shared {
            connected: true,
            ..Shared::default()
        };
        self.subscriptions.clear();
        Ok(())
    }

    fn disconnect(&mut self) {
        self.shared.connected = false;
        self.subscriptions.clear();
    }

    fn is_connected(&self) -> bool {
        self.shared.connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if !self.shared.connected {
            return Err(TransportError::NotConnected);
        }
        self.subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.shared.connected {
            return Err(TransportError::NotConnected);
        }
        self.published.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }

    fn poll_inbound(&mut self) -> Option<InboundMessage> {
        self.shared.inbound.pop_front()
    }
}
