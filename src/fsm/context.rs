//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to.  The orchestrator writes *observations* (link/session
//! liveness, time, the outcome of the last blocking attempt) before each
//! tick; handlers write back *requests* and own the identity/topic
//! fields.  Think of it as the "blackboard" in a blackboard architecture.

use crate::app::registration::DeviceIdentity;
use crate::app::session::{TopicLayout, TopicPair};

// ---------------------------------------------------------------------------
// Retry timers
// ---------------------------------------------------------------------------

/// Per-stage attempt spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTimer {
    /// `None` until the first attempt after a reset (attempt immediately).
    pub last_attempt_ms: Option<u64>,
    pub cooldown_ms: u32,
}

impl RetryTimer {
    pub const fn new(cooldown_ms: u32) -> Self {
        Self {
            last_attempt_ms: None,
            cooldown_ms,
        }
    }

    pub fn reset(&mut self) {
        self.last_attempt_ms = None;
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_attempt_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= u64::from(self.cooldown_ms),
        }
    }

    pub fn mark(&mut self, now_ms: u64) {
        self.last_attempt_ms = Some(now_ms);
    }
}

/// One timer per stage.  Only the timer of the current stage is live.
#[derive(Debug, Clone, Copy)]
pub struct RetryTimers {
    pub link: RetryTimer,
    pub registration: RetryTimer,
    pub session: RetryTimer,
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// A bounded blocking attempt a handler wants the orchestrator to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Link,
    Register,
    Session,
}

/// Result of the last attempt, fed back on the following tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    LinkUp,
    LinkFailed,
    Registered(DeviceIdentity),
    RegistrationFailed,
    SessionUp,
    SessionFailed,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared "blackboard" that all state handlers operate on.
#[derive(Debug)]
pub struct FsmContext {
    // ── Observations (written by the orchestrator) ─────────────
    pub now_ms: u64,
    /// Usable credentials are loaded.
    pub has_credentials: bool,
    pub link_up: bool,
    pub session_up: bool,
    pub outcome: Option<Outcome>,

    // ── Identity (owned by state handlers) ─────────────────────
    pub tenant_id: String,
    pub layout: TopicLayout,
    /// Present iff the current state holds an identity.
    pub identity: Option<DeviceIdentity>,
    /// Present iff `identity` is present.
    pub topics: Option<TopicPair>,
    /// Hand-off slot between Registering and Registered.
    pub pending_identity: Option<DeviceIdentity>,

    // ── Requests (read by the orchestrator) ────────────────────
    pub timers: RetryTimers,
    pub request: Option<Attempt>,
    /// Tear down the bus session before the next attempt.
    pub teardown_session: bool,

    // ── Timing ─────────────────────────────────────────────────
    pub ticks_in_state: u64,
    pub total_ticks: u64,
}

impl FsmContext {
    pub fn new(
        tenant_id: &str,
        layout: TopicLayout,
        link_cooldown_ms: u32,
        registration_cooldown_ms: u32,
        session_cooldown_ms: u32,
    ) -> Self {
        Self {
            now_ms: 0,
            has_credentials: false,
            link_up: false,
            session_up: false,
            outcome: None,
            tenant_id: tenant_id.to_owned(),
            layout,
            identity: None,
            topics: None,
            pending_identity: None,
            timers: RetryTimers {
                link: RetryTimer::new(link_cooldown_ms),
                registration: RetryTimer::new(registration_cooldown_ms),
                session: RetryTimer::new(session_cooldown_ms),
            },
            request: None,
            teardown_session: false,
            ticks_in_state: 0,
            total_ticks: 0,
        }
    }

    /// Drop identity and everything derived from it.
    pub fn clear_identity(&mut self) {
        self.identity = None;
        self.topics = None;
        self.pending_identity = None;
    }

    pub fn device_id(&self) -> Option<&str> {
        self.identity.as_ref().map(DeviceIdentity::as_str)
    }
}
