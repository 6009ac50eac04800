//! Outbound connectivity events.
//!
//! The [`Orchestrator`](super::service::Orchestrator) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (serial log, BLE peer status).

use crate::error::{LinkError, RegistrationError, SessionError};
use crate::fsm::StateId;

/// Structured events emitted by the connectivity core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    /// The orchestrator has started (carries initial state).
    Started(StateId),

    /// The state machine moved between states.
    StateChanged { from: StateId, to: StateId },

    /// New credentials were accepted and the pipeline restarted.
    CredentialsApplied { network_name: String, persisted: bool },

    /// Stored and runtime credentials were erased.
    CredentialsErased,

    /// The link came up.
    LinkUp { ip: String, rssi: i32 },

    /// The link went down underneath an established stage.
    LinkLost,

    /// The bootstrap authority issued an identity.
    Registered { device_id: String },

    /// The bus session is up and subscribed.
    SessionUp { client_id: String },

    /// The bus session dropped.
    SessionDown,

    /// A stage attempt failed and will be retried after its cooldown.
    LinkFailed(LinkError),
    RegistrationFailed(RegistrationError),
    SessionFailed(SessionError),
}
