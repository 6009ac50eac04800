//! Scriptable fakes for every driven port.
//!
//! Each fake is a cheap `Rc` handle: the orchestrator owns one clone,
//! the test keeps another to script failures, flip liveness and inspect
//! what the core did.  Nothing here blocks or sleeps.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use edgelink::app::credentials::Credentials;
use edgelink::app::events::ConnEvent;
use edgelink::app::ports::{
    BusEndpoint, Clock, CommandHandler, CredentialStore, DeviceInfo, EventSink, HttpPort,
    HttpRequest, HttpResponse, InboundMessage, LinkDriver, ProvisioningPort, SessionTransport,
    TransportError,
};
use edgelink::error::SessionError;

// ── Clock ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeClock(Rc<Cell<u64>>);

#[allow(dead_code)]
impl FakeClock {
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.0.set(ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

// ── Board ─────────────────────────────────────────────────────

pub struct Board;

impl DeviceInfo for Board {
    fn mac_address(&self) -> String {
        "24:6F:28:AA:BB:CC".into()
    }

    fn chip_model(&self) -> String {
        "ESP32-S3".into()
    }

    fn unique_suffix(&self) -> u32 {
        0xAA28_6F24
    }
}

// ── Link ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct LinkState {
    pub up: bool,
    /// Results for upcoming connects; empty means succeed.
    pub script: VecDeque<bool>,
    /// `(network_name, timeout_ms)` per connect call.
    pub connects: Vec<(String, u32)>,
    pub disconnects: u32,
}

#[derive(Clone, Default)]
pub struct FakeLink(pub Rc<RefCell<LinkState>>);

#[allow(dead_code)]
impl FakeLink {
    pub fn fail_next(&self, n: usize) {
        let mut s = self.0.borrow_mut();
        for _ in 0..n {
            s.script.push_back(false);
        }
    }

    /// The access point vanished.
    pub fn drop_link(&self) {
        self.0.borrow_mut().up = false;
    }

    pub fn connects(&self) -> Vec<(String, u32)> {
        self.0.borrow().connects.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.0.borrow().connects.len()
    }
}

impl LinkDriver for FakeLink {
    fn connect(&mut self, network_name: &str, _secret: &str, timeout_ms: u32) -> bool {
        let mut s = self.0.borrow_mut();
        s.connects.push((network_name.to_owned(), timeout_ms));
        let ok = s.script.pop_front().unwrap_or(true);
        s.up = ok;
        ok
    }

    fn disconnect(&mut self) {
        let mut s = self.0.borrow_mut();
        s.up = false;
        s.disconnects += 1;
    }

    fn is_connected(&self) -> bool {
        self.0.borrow().up
    }

    fn local_ip(&self) -> String {
        if self.0.borrow().up {
            "10.1.2.3".into()
        } else {
            String::new()
        }
    }

    fn rssi(&self) -> i32 {
        -58
    }
}

// ── HTTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout_ms: u32,
}

pub struct HttpState {
    /// Scripted replies; when empty, `device_id` is issued with 200.
    pub replies: VecDeque<Result<HttpResponse, TransportError>>,
    pub device_id: String,
    pub requests: Vec<RecordedRequest>,
    /// Runs while the request is "on the wire".
    pub during_post: Option<Box<dyn FnMut()>>,
}

impl Default for HttpState {
    fn default() -> Self {
        Self {
            replies: VecDeque::new(),
            device_id: "abc-123".into(),
            requests: Vec::new(),
            during_post: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeHttp(pub Rc<RefCell<HttpState>>);

#[allow(dead_code)]
impl FakeHttp {
    pub fn reply(&self, status: u16, body: &str) {
        self.0.borrow_mut().replies.push_back(Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn fail(&self, err: TransportError) {
        self.0.borrow_mut().replies.push_back(Err(err));
    }

    pub fn issue(&self, device_id: &str) {
        self.0.borrow_mut().device_id = device_id.to_owned();
    }

    pub fn on_post(&self, hook: impl FnMut() + 'static) {
        self.0.borrow_mut().during_post = Some(Box::new(hook));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.0.borrow().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.0.borrow().requests.len()
    }
}

impl HttpPort for FakeHttp {
    fn post(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        self.0.borrow_mut().requests.push(RecordedRequest {
            url: request.url.to_owned(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            body: request.body.to_vec(),
            timeout_ms: request.timeout_ms,
        });

        // Take the hook out so it may freely touch other fakes.
        let hook = self.0.borrow_mut().during_post.take();
        if let Some(mut hook) = hook {
            hook();
            self.0.borrow_mut().during_post = Some(hook);
        }

        let mut s = self.0.borrow_mut();
        match s.replies.pop_front() {
            Some(reply) => reply,
            None => Ok(HttpResponse {
                status: 200,
                body: format!(r#"{{"ok":true,"device_id":"{}"}}"#, s.device_id).into_bytes(),
            }),
        }
    }
}

// ── Bus ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEndpoint {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub user: String,
}

#[derive(Default)]
pub struct BusState {
    pub connected: bool,
    /// Errors for upcoming connects; empty means accept.
    pub refusals: VecDeque<SessionError>,
    pub endpoints: Vec<RecordedEndpoint>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub inbound: VecDeque<InboundMessage>,
    pub disconnects: u32,
}

#[derive(Clone, Default)]
pub struct FakeBus(pub Rc<RefCell<BusState>>);

#[allow(dead_code)]
impl FakeBus {
    pub fn refuse_next(&self, err: SessionError) {
        self.0.borrow_mut().refusals.push_back(err);
    }

    /// The broker closed the connection.
    pub fn drop_session(&self) {
        self.0.borrow_mut().connected = false;
    }

    pub fn inject(&self, topic: &str, payload: &str) {
        self.0.borrow_mut().inbound.push_back(InboundMessage {
            topic: topic.to_owned(),
            payload: payload.as_bytes().to_vec(),
        });
    }

    pub fn is_up(&self) -> bool {
        self.0.borrow().connected
    }

    pub fn connect_count(&self) -> usize {
        self.0.borrow().endpoints.len()
    }

    pub fn endpoints(&self) -> Vec<RecordedEndpoint> {
        self.0.borrow().endpoints.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.0.borrow().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.0
            .borrow()
            .published
            .iter()
            .map(|(t, p)| (t.clone(), String::from_utf8_lossy(p).into_owned()))
            .collect()
    }

    pub fn disconnects(&self) -> u32 {
        self.0.borrow().disconnects
    }
}

impl SessionTransport for FakeBus {
    fn connect(&mut self, endpoint: &BusEndpoint<'_>) -> Result<(), SessionError> {
        let mut s = self.0.borrow_mut();
        s.endpoints.push(RecordedEndpoint {
            host: endpoint.host.to_owned(),
            port: endpoint.port,
            client_id: endpoint.client_id.to_owned(),
            user: endpoint.user.to_owned(),
        });
        if let Some(err) = s.refusals.pop_front() {
            return Err(err);
        }
        s.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut s = self.0.borrow_mut();
        s.connected = false;
        s.disconnects += 1;
    }

    fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut s = self.0.borrow_mut();
        if !s.connected {
            return Err(TransportError::NotConnected);
        }
        s.subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut s = self.0.borrow_mut();
        if !s.connected {
            return Err(TransportError::NotConnected);
        }
        s.published.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }

    fn poll_inbound(&mut self) -> Option<InboundMessage> {
        self.0.borrow_mut().inbound.pop_front()
    }
}

// ── Credential store ──────────────────────────────────────────

#[derive(Default)]
pub struct StoreState {
    pub stored: Option<Credentials>,
    pub saves: u32,
    pub clears: u32,
    pub fail_writes: bool,
}

#[derive(Clone, Default)]
pub struct FakeStore(pub Rc<RefCell<StoreState>>);

#[allow(dead_code)]
impl FakeStore {
    pub fn holding(network_name: &str, secret: &str) -> Self {
        let store = Self::default();
        store.0.borrow_mut().stored = Credentials::new(network_name, secret, true).ok();
        store
    }

    pub fn stored_name(&self) -> Option<String> {
        self.0
            .borrow()
            .stored
            .as_ref()
            .map(|c| c.network_name().to_owned())
    }

    pub fn saves(&self) -> u32 {
        self.0.borrow().saves
    }

    pub fn clears(&self) -> u32 {
        self.0.borrow().clears
    }
}

impl CredentialStore for FakeStore {
    fn load(&mut self) -> Option<Credentials> {
        self.0.borrow().stored.clone()
    }

    fn save(&mut self, creds: &Credentials) -> bool {
        let mut s = self.0.borrow_mut();
        if s.fail_writes {
            return false;
        }
        s.saves += 1;
        s.stored = Some(creds.clone());
        true
    }

    fn clear(&mut self) {
        let mut s = self.0.borrow_mut();
        s.clears += 1;
        s.stored = None;
    }
}

// ── Provisioning peer ─────────────────────────────────────────

#[derive(Default)]
pub struct FakePeer {
    pub attached: bool,
    pub writes: VecDeque<Vec<u8>>,
    pub notified: Vec<String>,
    pub advertising_restarts: u32,
}

#[allow(dead_code)]
impl FakePeer {
    pub fn attached() -> Self {
        Self {
            attached: true,
            ..Self::default()
        }
    }

    pub fn write(&mut self, text: &str) {
        self.writes.push_back(text.as_bytes().to_vec());
    }
}

impl ProvisioningPort for FakePeer {
    fn notify(&mut self, text: &str) {
        self.notified.push(text.to_owned());
    }

    fn is_peer_connected(&self) -> bool {
        self.attached
    }

    fn take_write(&mut self) -> Option<Vec<u8>> {
        self.writes.pop_front()
    }

    fn restart_advertising(&mut self) {
        self.advertising_restarts += 1;
    }
}

// ── Host application ──────────────────────────────────────────

#[derive(Default)]
pub struct RecordingHandler {
    pub commands: Vec<(String, i32)>,
    pub session_ready: u32,
}

impl CommandHandler for RecordingHandler {
    fn on_command(&mut self, vpin: &str, value: i32) {
        self.commands.push((vpin.to_owned(), value));
    }

    fn on_session_ready(&mut self) {
        self.session_ready += 1;
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<ConnEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn contains(&self, event: &ConnEvent) -> bool {
        self.events.contains(event)
    }

    pub fn count(&self, pred: impl Fn(&ConnEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ConnEvent) {
        self.events.push(event.clone());
    }
}
