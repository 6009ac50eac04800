//! End-to-end pipeline tests: credentials → link → registration → session.
//!
//! Every poll in these tests goes through [`Rig::poll`], which asserts
//! the identity invariant after each step.

use std::rc::Rc;

use edgelink::app::credentials::Credentials;
use edgelink::app::events::ConnEvent;
use edgelink::app::provisioning::InboxMessage;
use edgelink::error::{LinkError, SessionError};
use edgelink::fsm::StateId;

use crate::mock_io::FakeStore;
use crate::rig::{COMMAND_TOPIC, PUBLISH_TOPIC, Rig, config};

// ── Startup ───────────────────────────────────────────────────

#[test]
fn unprovisioned_device_waits_in_idle() {
    let mut rig = Rig::unprovisioned();
    rig.poll_n(10);

    assert_eq!(rig.state(), StateId::Idle);
    assert_eq!(rig.link.connect_count(), 0);
    assert_eq!(rig.http.request_count(), 0);
    assert!(rig.orch.credentials().is_none());
}

#[test]
fn stored_credentials_are_used_at_boot() {
    let rig = Rig::provisioned();
    assert_eq!(
        rig.orch.credentials().map(Credentials::network_name),
        Some("home")
    );
    assert!(rig.sink.contains(&ConnEvent::Started(StateId::Idle)));
}

#[test]
fn stored_credentials_win_over_firmware_fallback() {
    let cfg = edgelink::config::NetConfig {
        fallback_ssid: "factory".into(),
        ..config()
    };
    let mut rig = Rig::new(&cfg, FakeStore::holding("home", "hunter22"));
    rig.poll();
    assert_eq!(rig.link.connects()[0].0, "home");
}

// ── Scenario A: fresh device reaches SessionActive ────────────

#[test]
fn fresh_device_reaches_session_active() {
    let mut rig = Rig::provisioned();

    rig.poll();
    assert_eq!(rig.state(), StateId::Registering);
    rig.poll();
    assert_eq!(rig.state(), StateId::SessionConnecting);
    assert_eq!(rig.device_id().as_deref(), Some("abc-123"));
    rig.poll();
    assert_eq!(rig.state(), StateId::SessionActive);

    let topics = rig.orch.topics().expect("topics derived with identity");
    assert_eq!(topics.publish, PUBLISH_TOPIC);
    assert_eq!(topics.subscribe, COMMAND_TOPIC);
    assert!(rig.orch.is_connected());
    assert_eq!(rig.tls.subscriptions(), vec![COMMAND_TOPIC.to_owned()]);
    assert_eq!(rig.app.session_ready, 1);
}

#[test]
fn first_link_attempt_uses_initial_timeout() {
    let mut rig = Rig::provisioned();
    rig.poll();
    assert_eq!(rig.link.connects(), vec![("home".to_owned(), 20_000)]);
}

#[test]
fn milestones_are_emitted_in_order() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    let milestones: Vec<&str> = rig
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            ConnEvent::LinkUp { .. } => Some("link"),
            ConnEvent::Registered { .. } => Some("registered"),
            ConnEvent::SessionUp { .. } => Some("session"),
            _ => None,
        })
        .collect();
    assert_eq!(milestones, ["link", "registered", "session"]);
    assert!(rig.sink.contains(&ConnEvent::Registered {
        device_id: "abc-123".into()
    }));
    assert!(rig.sink.contains(&ConnEvent::SessionUp {
        client_id: "abc-123-aa286f24".into()
    }));
}

// ── Scenario B: link drop forces full re-registration ─────────

#[test]
fn link_drop_returns_to_link_connecting_and_clears_identity() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    rig.link.drop_link();
    rig.link.fail_next(1);
    rig.poll();

    assert_eq!(rig.state(), StateId::LinkConnecting);
    assert!(rig.orch.identity().is_none());
    assert!(rig.orch.topics().is_none());
    assert!(rig.orch.session().topics().is_none());
    assert!(!rig.tls.is_up());
    assert!(rig.sink.contains(&ConnEvent::LinkLost));
    assert!(rig.sink.contains(&ConnEvent::SessionDown));
    assert!(rig.sink.contains(&ConnEvent::LinkFailed(LinkError::Timeout)));
}

#[test]
fn reconnect_after_link_drop_replays_state_once() {
    let mut rig = Rig::provisioned();
    rig.bring_online();
    assert_eq!(rig.app.session_ready, 1);

    rig.link.drop_link();
    rig.link.fail_next(1);
    rig.poll();
    assert_eq!(rig.state(), StateId::LinkConnecting);

    rig.http.issue("def-456");
    rig.poll_at(3_000);
    assert_eq!(rig.state(), StateId::Registering);
    rig.poll();
    rig.poll();
    assert_eq!(rig.state(), StateId::SessionActive);

    assert_eq!(rig.http.request_count(), 2);
    assert_eq!(rig.device_id().as_deref(), Some("def-456"));
    assert_eq!(
        rig.orch.topics().map(|t| t.publish.as_str()),
        Some("nebadondevice/tenantX/def-456/dt")
    );
    assert_eq!(rig.app.session_ready, 2);

    rig.poll_n(5);
    assert_eq!(rig.app.session_ready, 2);
}

#[test]
fn reconnect_with_same_identity_still_replays_once() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    rig.link.drop_link();
    rig.poll();
    rig.poll_n(2);

    assert_eq!(rig.state(), StateId::SessionActive);
    assert_eq!(rig.device_id().as_deref(), Some("abc-123"));
    assert_eq!(rig.app.session_ready, 2);
    assert_eq!(rig.tls.connect_count(), 2);
}

#[test]
fn retry_link_attempts_use_shorter_timeout() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    rig.link.drop_link();
    rig.poll();

    let timeouts: Vec<u32> = rig.link.connects().iter().map(|(_, t)| *t).collect();
    assert_eq!(timeouts, [20_000, 12_000]);
}

// ── Scenario C: new credentials while SessionActive ───────────

#[test]
fn direct_credentials_tear_down_session_immediately() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    rig.orch
        .on_credentials("office", "pw-2", true, &mut rig.sink)
        .expect("valid credentials");

    assert_eq!(rig.state(), StateId::LinkConnecting);
    assert!(rig.orch.identity().is_none());
    assert!(rig.orch.topics().is_none());
    assert!(!rig.tls.is_up());
    assert_eq!(rig.store.stored_name().as_deref(), Some("office"));
    assert!(rig.sink.contains(&ConnEvent::StateChanged {
        from: StateId::SessionActive,
        to: StateId::LinkConnecting,
    }));
}

#[test]
fn inbox_credentials_restart_within_one_poll() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    let creds = Credentials::new("office", "pw-2", true).expect("valid");
    assert!(rig.inbox.try_send(InboxMessage::CredentialUpdate(creds)).is_ok());
    rig.link.fail_next(1);
    rig.poll();

    assert_eq!(rig.state(), StateId::LinkConnecting);
    assert!(rig.orch.identity().is_none());
    // New credentials restart with the long initial timeout.
    assert_eq!(
        rig.link.connects().last(),
        Some(&("office".to_owned(), 20_000))
    );
}

#[test]
fn credential_update_preempts_pending_retry_cooldown() {
    let mut rig = Rig::provisioned();
    rig.link.fail_next(1);
    rig.poll();
    assert_eq!(rig.link.connect_count(), 1);

    // Still inside the 3 s link cooldown.
    rig.clock.set(500);
    rig.orch
        .on_credentials("office", "pw-2", true, &mut rig.sink)
        .expect("valid credentials");
    rig.poll();

    assert_eq!(rig.link.connect_count(), 2);
    assert_eq!(rig.state(), StateId::Registering);
}

#[test]
fn volatile_credentials_are_not_persisted() {
    let mut rig = Rig::provisioned();
    rig.orch
        .on_credentials("guest", "", false, &mut rig.sink)
        .expect("open network");

    assert_eq!(rig.store.saves(), 0);
    assert_eq!(rig.store.stored_name().as_deref(), Some("home"));
    assert!(rig.sink.contains(&ConnEvent::CredentialsApplied {
        network_name: "guest".into(),
        persisted: false,
    }));
}

#[test]
fn failed_persist_still_applies_credentials() {
    let mut rig = Rig::provisioned();
    rig.store.0.borrow_mut().fail_writes = true;
    rig.orch
        .on_credentials("office", "pw-2", true, &mut rig.sink)
        .expect("valid credentials");

    assert_eq!(rig.state(), StateId::LinkConnecting);
    assert_eq!(
        rig.orch.credentials().map(Credentials::network_name),
        Some("office")
    );
    assert_eq!(rig.store.stored_name().as_deref(), Some("home"));
}

// ── Mid-flight credential update ──────────────────────────────

#[test]
fn update_during_registration_discards_its_result() {
    let mut rig = Rig::provisioned();
    rig.poll();
    assert_eq!(rig.state(), StateId::Registering);

    let inbox = Rc::clone(&rig.inbox);
    let mut pending = Credentials::new("office", "pw-2", true).ok();
    rig.http.on_post(move || {
        if let Some(creds) = pending.take() {
            let _ = inbox.try_send(InboxMessage::CredentialUpdate(creds));
        }
    });

    rig.poll();
    assert_eq!(rig.http.request_count(), 1);
    assert_eq!(rig.state(), StateId::LinkConnecting);
    assert!(rig.orch.identity().is_none());
    assert!(!rig.sink.contains(&ConnEvent::StateChanged {
        from: StateId::Registering,
        to: StateId::Registered,
    }));

    rig.poll();
    assert_eq!(rig.link.connects().last().map(|(n, _)| n.as_str()), Some("office"));
    assert_eq!(rig.state(), StateId::Registering);
}

// ── Retry cooldowns ───────────────────────────────────────────

#[test]
fn link_retries_respect_cooldown() {
    let mut rig = Rig::provisioned();
    rig.link.fail_next(2);

    rig.poll_at(0);
    assert_eq!(rig.link.connect_count(), 1);
    rig.poll_at(2_999);
    assert_eq!(rig.link.connect_count(), 1);
    assert_eq!(rig.state(), StateId::LinkConnecting);
    rig.poll_at(3_000);
    assert_eq!(rig.link.connect_count(), 2);
    rig.poll_at(6_000);
    assert_eq!(rig.link.connect_count(), 3);
    assert_eq!(rig.state(), StateId::Registering);
}

#[test]
fn registration_retries_respect_cooldown() {
    let mut rig = Rig::provisioned();
    rig.http.reply(500, "oops");

    rig.poll_at(0);
    rig.poll_at(0);
    assert_eq!(rig.http.request_count(), 1);
    assert_eq!(rig.state(), StateId::Registering);

    rig.poll_at(4_999);
    assert_eq!(rig.http.request_count(), 1);
    rig.poll_at(5_000);
    assert_eq!(rig.http.request_count(), 2);
    assert_eq!(rig.state(), StateId::SessionConnecting);
}

#[test]
fn session_retries_respect_cooldown_and_keep_identity() {
    let mut rig = Rig::provisioned();
    rig.tls.refuse_next(SessionError::Auth);

    rig.poll_n(3);
    assert_eq!(rig.state(), StateId::SessionConnecting);
    assert_eq!(rig.device_id().as_deref(), Some("abc-123"));
    assert!(rig.sink.contains(&ConnEvent::SessionFailed(SessionError::Auth)));
    assert_eq!(rig.app.session_ready, 0);

    rig.poll_at(1_999);
    assert_eq!(rig.tls.connect_count(), 1);
    rig.poll_at(2_000);
    assert_eq!(rig.tls.connect_count(), 2);
    assert_eq!(rig.state(), StateId::SessionActive);
    assert_eq!(rig.http.request_count(), 1);
}

// ── Session-only drop ─────────────────────────────────────────

#[test]
fn bus_drop_reconnects_session_without_reregistering() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    rig.tls.drop_session();
    rig.poll_at(1_000);
    assert_eq!(rig.state(), StateId::SessionConnecting);
    assert_eq!(rig.device_id().as_deref(), Some("abc-123"));
    assert!(rig.sink.contains(&ConnEvent::SessionDown));
    assert!(!rig.sink.contains(&ConnEvent::LinkLost));

    rig.poll_at(2_000);
    assert_eq!(rig.state(), StateId::SessionActive);
    assert_eq!(rig.http.request_count(), 1);
    assert_eq!(rig.app.session_ready, 2);
}

#[test]
fn link_loss_while_registering_skips_the_request() {
    let mut rig = Rig::provisioned();
    rig.poll();
    assert_eq!(rig.state(), StateId::Registering);

    rig.link.drop_link();
    rig.link.fail_next(1);
    rig.poll();

    assert_eq!(rig.state(), StateId::LinkConnecting);
    assert_eq!(rig.http.request_count(), 0);
}

// ── Erase ─────────────────────────────────────────────────────

#[test]
fn erase_returns_to_idle_and_stays_there() {
    let mut rig = Rig::provisioned();
    rig.bring_online();

    assert!(rig.inbox.try_send(InboxMessage::Erase).is_ok());
    rig.poll();

    assert_eq!(rig.state(), StateId::Idle);
    assert_eq!(rig.store.clears(), 1);
    assert!(rig.store.stored_name().is_none());
    assert!(!rig.tls.is_up());
    assert!(rig.sink.contains(&ConnEvent::CredentialsErased));

    let connects = rig.link.connect_count();
    rig.poll_at(60_000);
    assert_eq!(rig.state(), StateId::Idle);
    assert_eq!(rig.link.connect_count(), connects);
}

// ── Host-facing publish ───────────────────────────────────────

#[test]
fn publish_state_sends_flat_envelope_on_state_topic() {
    let mut rig = Rig::provisioned();
    assert!(!rig.orch.publish_state("V1", 7));
    rig.bring_online();

    assert!(rig.orch.publish_state("V1", 7));
    let published = rig.tls.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, PUBLISH_TOPIC);

    let doc: serde_json::Value = serde_json::from_str(&published[0].1).expect("json");
    assert_eq!(doc["type"], "state");
    assert_eq!(doc["tenant_id"], "tenantX");
    assert_eq!(doc["device_id"], "abc-123");
    assert_eq!(doc["vpin"], "V1");
    assert_eq!(doc["value"], 7);
}

#[test]
fn publish_refused_while_session_reconnecting() {
    let mut rig = Rig::provisioned();
    rig.bring_online();
    rig.tls.drop_session();
    rig.poll_at(500);

    assert!(!rig.orch.publish_state("V1", 1));
    assert!(rig.tls.published().is_empty());
}
