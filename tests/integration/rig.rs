//! A fully-faked orchestrator plus the handles needed to drive it.

use std::rc::Rc;

use edgelink::app::provisioning::CredentialInbox;
use edgelink::app::service::{Collaborators, Orchestrator};
use edgelink::config::NetConfig;
use edgelink::fsm::StateId;

use crate::mock_io::{
    Board, FakeBus, FakeClock, FakeHttp, FakeLink, FakeStore, RecordingHandler, RecordingSink,
};

pub type TestOrchestrator = Orchestrator<FakeStore, FakeLink, FakeHttp, FakeBus, FakeBus, FakeClock>;

pub const PUBLISH_TOPIC: &str = "nebadondevice/tenantX/abc-123/dt";
pub const COMMAND_TOPIC: &str = "nebadoncmd/tenantX/abc-123/cmd";

pub fn config() -> NetConfig {
    NetConfig {
        tenant_id: "tenantX".into(),
        project_id: "proj-1".into(),
        profile_id: "prof-7".into(),
        alias: "kitchen".into(),
        api_base: "https://api.example.com".into(),
        api_key: "key-1".into(),
        api_secret: "secret-1".into(),
        bus_host: "bus.example.com".into(),
        bus_user: "dev".into(),
        bus_password: "bus-pw".into(),
        ..Default::default()
    }
}

pub struct Rig {
    pub orch: TestOrchestrator,
    pub clock: FakeClock,
    pub link: FakeLink,
    pub http: FakeHttp,
    pub plain: FakeBus,
    pub tls: FakeBus,
    pub store: FakeStore,
    pub inbox: Rc<CredentialInbox>,
    pub app: RecordingHandler,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(cfg: &NetConfig, store: FakeStore) -> Self {
        let clock = FakeClock::default();
        let link = FakeLink::default();
        let http = FakeHttp::default();
        let plain = FakeBus::default();
        let tls = FakeBus::default();

        let mut orch = Orchestrator::new(
            cfg,
            &Board,
            Collaborators {
                store: store.clone(),
                link: link.clone(),
                http: http.clone(),
                plain: plain.clone(),
                tls: tls.clone(),
                clock: clock.clone(),
            },
        );
        let mut sink = RecordingSink::default();
        orch.start(&mut sink);

        Self {
            orch,
            clock,
            link,
            http,
            plain,
            tls,
            store,
            inbox: Rc::new(CredentialInbox::new()),
            app: RecordingHandler::default(),
            sink,
        }
    }

    /// Device with `home`/`hunter22` already in flash.
    pub fn provisioned() -> Self {
        Self::new(&config(), FakeStore::holding("home", "hunter22"))
    }

    pub fn unprovisioned() -> Self {
        Self::new(&config(), FakeStore::default())
    }

    /// One main-loop iteration; the identity invariant must hold after it.
    pub fn poll(&mut self) {
        self.orch.poll(&self.inbox, &mut self.app, &mut self.sink);
        assert!(
            self.orch.invariants_hold(),
            "identity invariant broken in {}",
            self.orch.state()
        );
    }

    pub fn poll_n(&mut self, n: usize) {
        for _ in 0..n {
            self.poll();
        }
    }

    /// Advance the clock, then poll once.
    pub fn poll_at(&mut self, now_ms: u64) {
        self.clock.set(now_ms);
        self.poll();
    }

    /// Link, registration and session each take one poll with instant fakes.
    pub fn bring_online(&mut self) {
        self.poll_n(3);
        assert_eq!(self.orch.state(), StateId::SessionActive);
    }

    pub fn state(&self) -> StateId {
        self.orch.state()
    }

    pub fn device_id(&self) -> Option<String> {
        self.orch.identity().map(|id| id.as_str().to_owned())
    }
}
