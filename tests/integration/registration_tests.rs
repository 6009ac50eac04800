//! Registration client against the fake authority, standalone and
//! inside the pipeline.

use edgelink::app::events::ConnEvent;
use edgelink::app::ports::TransportError;
use edgelink::app::registration::{DeviceMetadata, FW_VERSION, RegistrationClient};
use edgelink::config::NetConfig;
use edgelink::error::RegistrationError;
use edgelink::fsm::StateId;

use crate::mock_io::FakeHttp;
use crate::rig::{Rig, config};

fn metadata() -> DeviceMetadata {
    DeviceMetadata {
        tenant_id: "tenantX".into(),
        project_id: "proj-1".into(),
        profile_id: "prof-7".into(),
        alias: "kitchen".into(),
        mac_address: "24:6F:28:AA:BB:CC".into(),
        chip_model: "ESP32-S3".into(),
        fw_version: FW_VERSION.into(),
        ip: "10.1.2.3".into(),
        rssi: -58,
    }
}

fn client(cfg: &NetConfig) -> (RegistrationClient<FakeHttp>, FakeHttp) {
    let http = FakeHttp::default();
    (RegistrationClient::new(http.clone(), cfg), http)
}

// ── Request shape ─────────────────────────────────────────────

#[test]
fn posts_device_metadata_to_bootstrap_endpoint() {
    let (mut reg, http) = client(&config());
    let id = reg.register(true, &metadata()).expect("issued");
    assert_eq!(id.as_str(), "abc-123");

    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.url, "https://api.example.com/device/bootstrap");
    assert_eq!(req.timeout_ms, 7_000);
    assert!(req.headers.contains(&("Content-Type".into(), "application/json".into())));
    assert!(req.headers.contains(&("x-api-key".into(), "key-1".into())));
    assert!(req.headers.contains(&("x-api-secret".into(), "secret-1".into())));

    let body: serde_json::Value = serde_json::from_slice(&req.body).expect("json body");
    assert_eq!(body["tenant_id"], "tenantX");
    assert_eq!(body["project_id"], "proj-1");
    assert_eq!(body["profile_id"], "prof-7");
    assert_eq!(body["alias"], "kitchen");
    assert_eq!(body["mac_address"], "24:6F:28:AA:BB:CC");
    assert_eq!(body["chip_model"], "ESP32-S3");
    assert_eq!(body["fw_version"], FW_VERSION);
    assert_eq!(body["ip"], "10.1.2.3");
    assert_eq!(body["rssi"], -58);
}

#[test]
fn auth_headers_omitted_when_unset() {
    let cfg = NetConfig {
        api_key: String::new(),
        api_secret: String::new(),
        ..config()
    };
    let (mut reg, http) = client(&cfg);
    assert!(reg.register(true, &metadata()).is_ok());

    let headers = &http.requests()[0].headers;
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].0, "Content-Type");
}

// ── Preconditions ─────────────────────────────────────────────

#[test]
fn no_request_without_link() {
    let (mut reg, http) = client(&config());
    assert_eq!(
        reg.register(false, &metadata()),
        Err(RegistrationError::TransportUnavailable)
    );
    assert_eq!(http.request_count(), 0);
}

#[test]
fn no_request_without_endpoint() {
    let cfg = NetConfig {
        api_base: String::new(),
        ..config()
    };
    let (mut reg, http) = client(&cfg);
    assert_eq!(
        reg.register(true, &metadata()),
        Err(RegistrationError::TransportUnavailable)
    );
    assert_eq!(http.request_count(), 0);
}

#[test]
fn unsupported_scheme_is_refused_locally() {
    let cfg = NetConfig {
        api_base: "ftp://api.example.com".into(),
        ..config()
    };
    let (mut reg, http) = client(&cfg);
    assert_eq!(
        reg.register(true, &metadata()),
        Err(RegistrationError::TransportUnavailable)
    );
    assert_eq!(http.request_count(), 0);
}

// ── Response handling ─────────────────────────────────────────

#[test]
fn transport_failure_maps_to_unavailable() {
    let (mut reg, http) = client(&config());
    http.fail(TransportError::Timeout);
    assert_eq!(
        reg.register(true, &metadata()),
        Err(RegistrationError::TransportUnavailable)
    );
}

#[test]
fn rejected_and_empty_identity_never_yield_identity() {
    let (mut reg, http) = client(&config());
    http.reply(200, r#"{"ok":false,"device_id":"x"}"#);
    http.reply(200, r#"{"ok":true,"device_id":""}"#);

    assert_eq!(
        reg.register(true, &metadata()),
        Err(RegistrationError::RejectedOrEmptyIdentity)
    );
    assert_eq!(
        reg.register(true, &metadata()),
        Err(RegistrationError::RejectedOrEmptyIdentity)
    );
}

#[test]
fn server_error_and_garbage_are_distinguished() {
    let (mut reg, http) = client(&config());
    http.reply(503, r#"{"ok":true,"device_id":"x"}"#);
    http.reply(200, "<html>maintenance</html>");

    assert_eq!(
        reg.register(true, &metadata()),
        Err(RegistrationError::HttpStatus(503))
    );
    assert_eq!(
        reg.register(true, &metadata()),
        Err(RegistrationError::MalformedResponse)
    );
}

// ── In the pipeline ───────────────────────────────────────────

#[test]
fn rejection_keeps_device_registering_without_identity() {
    let mut rig = Rig::provisioned();
    rig.http.reply(200, r#"{"ok":false,"device_id":"x"}"#);
    rig.poll_n(2);

    assert_eq!(rig.state(), StateId::Registering);
    assert!(rig.orch.identity().is_none());
    assert!(rig.sink.contains(&ConnEvent::RegistrationFailed(
        RegistrationError::RejectedOrEmptyIdentity
    )));
}

#[test]
fn pipeline_reports_live_link_facts() {
    let mut rig = Rig::provisioned();
    rig.poll_n(2);

    let body: serde_json::Value =
        serde_json::from_slice(&rig.http.requests()[0].body).expect("json body");
    assert_eq!(body["ip"], "10.1.2.3");
    assert_eq!(body["rssi"], -58);
    assert_eq!(body["mac_address"], "24:6F:28:AA:BB:CC");
    assert_eq!(body["chip_model"], "ESP32-S3");
}
