//! Connectivity orchestrator: the hexagonal core.
//!
//! [`Orchestrator`] owns the FSM, the shared context and every stage
//! manager.  It is the single authority over connectivity state: nothing
//! else may move the state machine, and provisioning reaches it only
//! through the [`CredentialInbox`].
//!
//! ```text
//!  CredentialInbox ──▶ ┌──────────────────────────────────┐ ──▶ EventSink
//!                      │           Orchestrator           │
//!       LinkDriver ◀──▶│  FSM · Link · Registration ·     │◀──▶ SessionTransport
//!         HttpPort ◀──▶│  Session · CredentialStore       │ ──▶ CommandHandler
//!                      └──────────────────────────────────┘
//! ```
//!
//! Each [`poll`](Orchestrator::poll) runs at most one bounded blocking
//! attempt (link connect or registration exchange or session connect).
//! Everything else is a non-blocking check.  An inbox message that arrives
//! during the attempt (from another task) discards its result.

use log::{debug, error, info, warn};

use crate::config::NetConfig;
use crate::error::CredentialError;
use crate::fsm::context::{Attempt, FsmContext, Outcome};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};

use super::credentials::Credentials;
use super::events::ConnEvent;
use super::link::LinkManager;
use super::ports::{
    Clock, CommandHandler, CredentialStore, DeviceInfo, EventSink, HttpPort, LinkDriver,
    SessionTransport,
};
use super::provisioning::{CredentialInbox, InboxMessage};
use super::registration::{DeviceIdentity, DeviceMetadata, FW_VERSION, RegistrationClient};
use super::session::{SessionManager, TopicLayout, TopicPair};

// ───────────────────────────────────────────────────────────────
// Construction bundle
// ───────────────────────────────────────────────────────────────

/// The driven adapters an [`Orchestrator`] takes ownership of.
pub struct Collaborators<S, L, H, P, T, C> {
    pub store: S,
    pub link: L,
    pub http: H,
    /// Plaintext bus transport.
    pub plain: P,
    /// TLS bus transport.
    pub tls: T,
    pub clock: C,
}

// ───────────────────────────────────────────────────────────────
// Orchestrator
// ───────────────────────────────────────────────────────────────

pub struct Orchestrator<S, L, H, P, T, C>
where
    S: CredentialStore,
    L: LinkDriver,
    H: HttpPort,
    P: SessionTransport,
    T: SessionTransport,
    C: Clock,
{
    fsm: Fsm,
    ctx: FsmContext,
    store: S,
    link: LinkManager<L>,
    registration: RegistrationClient<H>,
    session: SessionManager<P, T>,
    clock: C,
    /// Static part of the registration metadata; ip/rssi filled per attempt.
    metadata: DeviceMetadata,
    fallback: Option<Credentials>,
    /// Last state reported through the event sink.
    reported: StateId,
}

impl<S, L, H, P, T, C> Orchestrator<S, L, H, P, T, C>
where
    S: CredentialStore,
    L: LinkDriver,
    H: HttpPort,
    P: SessionTransport,
    T: SessionTransport,
    C: Clock,
{
    /// Construct the orchestrator.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(
        cfg: &NetConfig,
        device: &impl DeviceInfo,
        parts: Collaborators<S, L, H, P, T, C>,
    ) -> Self {
        let ctx = FsmContext::new(
            &cfg.tenant_id,
            TopicLayout::from_config(cfg),
            cfg.link_cooldown_ms,
            cfg.registration_cooldown_ms,
            cfg.session_cooldown_ms,
        );
        let fallback = if cfg.fallback_ssid.is_empty() {
            None
        } else {
            match Credentials::new(&cfg.fallback_ssid, &cfg.fallback_password, false) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("Orchestrator: firmware credentials unusable: {}", e);
                    None
                }
            }
        };

        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx,
            store: parts.store,
            link: LinkManager::new(
                parts.link,
                cfg.link_timeout_initial_ms,
                cfg.link_timeout_retry_ms,
            ),
            registration: RegistrationClient::new(parts.http, cfg),
            session: SessionManager::new(parts.plain, parts.tls, cfg, device.unique_suffix()),
            clock: parts.clock,
            metadata: DeviceMetadata {
                tenant_id: cfg.tenant_id.clone(),
                project_id: cfg.project_id.clone(),
                profile_id: cfg.profile_id.clone(),
                alias: cfg.alias.clone(),
                mac_address: device.mac_address(),
                chip_model: device.chip_model(),
                fw_version: FW_VERSION.to_owned(),
                ip: String::new(),
                rssi: 0,
            },
            fallback,
            reported: StateId::Idle,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter Idle and pick up credentials: stored first, then firmware
    /// fallback.  With neither, the device waits for provisioning.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);

        let creds = match self.store.load() {
            Some(c) => Some(c),
            None => {
                if self.fallback.is_some() {
                    info!("Orchestrator: no stored credentials, using firmware defaults");
                }
                self.fallback.clone()
            }
        };
        if creds.is_none() {
            info!("Orchestrator: no credentials, waiting for provisioning");
        }
        self.link.set_credentials(creds);
        self.ctx.has_credentials = self.link.has_credentials();
        self.ctx.now_ms = self.clock.now_ms();

        self.reported = self.fsm.current_state();
        sink.emit(&ConnEvent::Started(self.reported));
        info!("Orchestrator started in {}", self.reported);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One cooperative step.  Call repeatedly from the main loop.
    ///
    /// 1. Apply pending inbox messages (highest priority).
    /// 2. Observe link/session liveness and time; tick the FSM.
    /// 3. Run any requested teardown, then at most one blocking attempt.
    /// 4. If an inbox message arrived during the attempt, discard its
    ///    result; otherwise feed the outcome back and tick again.
    /// 5. In SessionActive, pump inbound commands to `handler`.
    pub fn poll(
        &mut self,
        inbox: &CredentialInbox,
        handler: &mut impl CommandHandler,
        sink: &mut impl EventSink,
    ) {
        self.drain_inbox(inbox, sink);

        self.observe();
        self.fsm.tick(&mut self.ctx);
        self.report_state(sink, true);
        self.run_teardown();

        if let Some(attempt) = self.ctx.request.take() {
            let outcome = self.run_attempt(attempt, handler, sink);

            if self.drain_inbox(inbox, sink) {
                info!("Orchestrator: discarding {:?} result after credential update", attempt);
            } else {
                self.ctx.outcome = Some(outcome);
                self.observe();
                self.fsm.tick(&mut self.ctx);
                self.report_state(sink, true);
                self.run_teardown();
            }
        }

        if !self.invariants_hold() {
            error!(
                "Orchestrator: identity invariant violated in {}",
                self.fsm.current_state()
            );
            debug_assert!(false, "identity invariant violated");
        }

        if self.fsm.current_state() == StateId::SessionActive {
            self.session.pump(handler);
        }
    }

    // ── Host-facing operations ────────────────────────────────

    /// Apply new credentials immediately, bypassing the inbox.
    pub fn on_credentials(
        &mut self,
        network_name: &str,
        secret: &str,
        persist: bool,
        sink: &mut impl EventSink,
    ) -> Result<(), CredentialError> {
        let creds = Credentials::new(network_name, secret, persist)?;
        self.apply_credentials(creds, sink);
        Ok(())
    }

    /// Forget stored and runtime credentials and return to Idle.
    pub fn erase_credentials(&mut self, sink: &mut impl EventSink) {
        info!("Orchestrator: erasing credentials");
        self.store.clear();
        self.session.reset();
        self.link.set_credentials(None);
        self.link.disconnect();
        self.ctx.has_credentials = false;
        self.fsm.force_transition(StateId::Idle, &mut self.ctx);
        self.ctx.teardown_session = false;
        sink.emit(&ConnEvent::CredentialsErased);
        self.report_state(sink, false);
    }

    /// Publish one state value.  `false` unless the session is active.
    pub fn publish_state(&mut self, vpin: &str, value: i32) -> bool {
        if self.fsm.current_state() != StateId::SessionActive {
            return false;
        }
        self.session.publish(vpin, value)
    }

    /// Link up, identity held and session connected.
    pub fn is_connected(&self) -> bool {
        self.link.is_up() && self.ctx.identity.is_some() && self.session.is_connected()
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.ctx.identity.as_ref()
    }

    pub fn topics(&self) -> Option<&TopicPair> {
        self.ctx.topics.as_ref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.link.credentials()
    }

    /// Identity present iff the state holds one; topics present iff identity is.
    pub fn invariants_hold(&self) -> bool {
        let state = self.fsm.current_state();
        self.ctx.identity.is_some() == state.holds_identity()
            && self.ctx.topics.is_some() == self.ctx.identity.is_some()
    }

    pub fn link(&self) -> &LinkManager<L> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkManager<L> {
        &mut self.link
    }

    pub fn registration(&self) -> &RegistrationClient<H> {
        &self.registration
    }

    pub fn session(&self) -> &SessionManager<P, T> {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Internal ──────────────────────────────────────────────

    /// Apply every queued inbox message.  Returns whether any arrived.
    fn drain_inbox(&mut self, inbox: &CredentialInbox, sink: &mut impl EventSink) -> bool {
        let mut any = false;
        while let Ok(msg) = inbox.try_receive() {
            any = true;
            match msg {
                InboxMessage::CredentialUpdate(creds) => self.apply_credentials(creds, sink),
                InboxMessage::Erase => self.erase_credentials(sink),
            }
        }
        any
    }

    /// Persist if requested, tear the session down synchronously, and
    /// restart from LinkConnecting whatever the current state.
    fn apply_credentials(&mut self, creds: Credentials, sink: &mut impl EventSink) {
        info!(
            "Orchestrator: credential update for '{}' in {}",
            creds.network_name(),
            self.fsm.current_state()
        );
        if creds.persisted() && !self.store.save(&creds) {
            warn!("Orchestrator: credentials applied but not persisted");
        }
        sink.emit(&ConnEvent::CredentialsApplied {
            network_name: creds.network_name().to_owned(),
            persisted: creds.persisted(),
        });

        self.session.reset();
        self.link.set_credentials(Some(creds));
        self.ctx.has_credentials = true;
        self.ctx.now_ms = self.clock.now_ms();
        self.fsm
            .force_transition(StateId::LinkConnecting, &mut self.ctx);
        self.ctx.teardown_session = false;
        self.report_state(sink, false);
    }

    fn observe(&mut self) {
        self.ctx.now_ms = self.clock.now_ms();
        self.ctx.has_credentials = self.link.has_credentials();
        self.ctx.link_up = self.link.is_up();
        self.ctx.session_up = self.session.is_connected();
    }

    fn run_teardown(&mut self) {
        if self.ctx.teardown_session {
            self.ctx.teardown_session = false;
            self.session.reset();
        }
    }

    fn run_attempt(
        &mut self,
        attempt: Attempt,
        handler: &mut impl CommandHandler,
        sink: &mut impl EventSink,
    ) -> Outcome {
        debug!("Orchestrator: running {:?} attempt", attempt);
        match attempt {
            Attempt::Link => match self.link.connect() {
                Ok(()) => {
                    sink.emit(&ConnEvent::LinkUp {
                        ip: self.link.local_ip(),
                        rssi: self.link.rssi(),
                    });
                    Outcome::LinkUp
                }
                Err(e) => {
                    sink.emit(&ConnEvent::LinkFailed(e));
                    Outcome::LinkFailed
                }
            },

            Attempt::Register => {
                let mut meta = self.metadata.clone();
                meta.ip = self.link.local_ip();
                meta.rssi = self.link.rssi();
                match self.registration.register(self.link.is_up(), &meta) {
                    Ok(identity) => {
                        sink.emit(&ConnEvent::Registered {
                            device_id: identity.as_str().to_owned(),
                        });
                        Outcome::Registered(identity)
                    }
                    Err(e) => {
                        sink.emit(&ConnEvent::RegistrationFailed(e));
                        Outcome::RegistrationFailed
                    }
                }
            }

            Attempt::Session => {
                let Some(identity) = self.ctx.identity.clone() else {
                    warn!("Orchestrator: session attempt without identity");
                    return Outcome::SessionFailed;
                };
                if self.session.topics() != self.ctx.topics.as_ref() {
                    let topics = self.session.configure(&self.ctx.tenant_id, &identity);
                    debug_assert_eq!(Some(topics), self.ctx.topics.as_ref());
                }
                match self.session.connect(handler) {
                    Ok(()) => {
                        sink.emit(&ConnEvent::SessionUp {
                            client_id: self.session.client_id().unwrap_or_default().to_owned(),
                        });
                        Outcome::SessionUp
                    }
                    Err(e) => {
                        sink.emit(&ConnEvent::SessionFailed(e));
                        Outcome::SessionFailed
                    }
                }
            }
        }
    }

    /// Emit `StateChanged` (plus loss events for tick-driven drops) when
    /// the state differs from the last one reported.
    fn report_state(&mut self, sink: &mut impl EventSink, from_tick: bool) {
        let now = self.fsm.current_state();
        let from = self.reported;
        if now == from {
            return;
        }
        if from_tick {
            if from == StateId::SessionActive {
                sink.emit(&ConnEvent::SessionDown);
            }
            if from.requires_link() && now == StateId::LinkConnecting {
                sink.emit(&ConnEvent::LinkLost);
            }
        }
        sink.emit(&ConnEvent::StateChanged { from, to: now });
        self.reported = now;
    }
}
