//! Session stage: transport selection, command dispatch, tenant filtering.

use edgelink::app::session::TransportMode;
use edgelink::config::NetConfig;
use edgelink::fsm::StateId;

use crate::mock_io::FakeStore;
use crate::rig::{COMMAND_TOPIC, Rig, config};

fn plain_rig() -> Rig {
    let cfg = NetConfig {
        bus_port: 1883,
        ..config()
    };
    Rig::new(&cfg, FakeStore::holding("home", "hunter22"))
}

// ── Transport selection ───────────────────────────────────────

#[test]
fn secure_port_selects_tls_transport() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    assert_eq!(rig.orch.session().mode(), Some(TransportMode::Tls));
    assert_eq!(rig.tls.connect_count(), 1);
    assert_eq!(rig.plain.connect_count(), 0);

    let ep = &rig.tls.endpoints()[0];
    assert_eq!(ep.host, "bus.example.com");
    assert_eq!(ep.port, 8883);
    assert_eq!(ep.user, "dev");
    assert_eq!(ep.client_id, "abc-123-aa286f24");
}

#[test]
fn other_ports_select_plain_transport() {
    let mut rig = plain_rig();
    rig.bring_online();

    assert_eq!(rig.orch.session().mode(), Some(TransportMode::Plain));
    assert_eq!(rig.plain.connect_count(), 1);
    assert_eq!(rig.tls.connect_count(), 0);
    assert!(rig.orch.publish_state("V2", 3));
    assert_eq!(rig.plain.published().len(), 1);
}

// ── Command dispatch ──────────────────────────────────────────

#[test]
fn inbound_commands_reach_the_handler_normalised() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    rig.tls.inject(COMMAND_TOPIC, r#"{"type":"cmd","tenant_id":"tenantX","vpin":"V3","value":"42"}"#);
    rig.tls.inject(COMMAND_TOPIC, r#"{"vpin":"V4","value":true}"#);
    rig.tls.inject(COMMAND_TOPIC, r#"{"pin":"V5","value":3.7}"#);
    rig.tls.inject(COMMAND_TOPIC, r#"{"vpin":"V6","value":"abc"}"#);
    rig.poll();

    assert_eq!(
        rig.app.commands,
        vec![
            ("V3".to_owned(), 42),
            ("V4".to_owned(), 1),
            ("V5".to_owned(), 4),
            ("V6".to_owned(), 0),
        ]
    );
}

#[test]
fn foreign_tenant_and_incomplete_commands_are_dropped() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    rig.tls.inject(COMMAND_TOPIC, r#"{"tenant_id":"other","vpin":"V1","value":1}"#);
    rig.tls.inject(COMMAND_TOPIC, r#"{"vpin":"V1"}"#);
    rig.tls.inject(COMMAND_TOPIC, r#"{"value":1}"#);
    rig.tls.inject(COMMAND_TOPIC, "not json");
    rig.tls.inject(COMMAND_TOPIC, r#"{"type":"state","vpin":"V1","value":1}"#);
    rig.tls.inject(COMMAND_TOPIC, r#"{"tenant_id":"tenantX","vpin":"V9","value":false}"#);
    rig.poll();

    assert_eq!(rig.app.commands, vec![("V9".to_owned(), 0)]);
    assert_eq!(rig.state(), StateId::SessionActive);
}

#[test]
fn pump_is_bounded_per_poll() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    for i in 0..10 {
        rig.tls
            .inject(COMMAND_TOPIC, &format!(r#"{{"vpin":"V{}","value":{}}}"#, i, i));
    }
    rig.poll();
    assert_eq!(rig.app.commands.len(), 8);
    rig.poll();
    assert_eq!(rig.app.commands.len(), 10);
    assert_eq!(rig.app.commands[9], ("V9".to_owned(), 9));
}

#[test]
fn commands_are_not_pumped_outside_session_active() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    rig.tls.drop_session();
    rig.tls.inject(COMMAND_TOPIC, r#"{"vpin":"V1","value":1}"#);
    rig.poll_at(100);

    assert_eq!(rig.state(), StateId::SessionConnecting);
    assert!(rig.app.commands.is_empty());
}

// ── Topics ────────────────────────────────────────────────────

#[test]
fn topics_follow_configured_layout() {
    let cfg = NetConfig {
        publish_namespace: "acme-dev".into(),
        state_suffix: "state".into(),
        command_namespace: "acme-cmd".into(),
        command_suffix: "in".into(),
        ..config()
    };
    let mut rig = Rig::new(&cfg, FakeStore::holding("home", "hunter22"));
    rig.bring_online();

    let topics = rig.orch.topics().expect("active session has topics");
    assert_eq!(topics.publish, "acme-dev/tenantX/abc-123/state");
    assert_eq!(topics.subscribe, "acme-cmd/tenantX/abc-123/in");
    assert_eq!(rig.tls.subscriptions(), vec![topics.subscribe.clone()]);
}
