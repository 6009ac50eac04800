//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers, with no closures
//! and no dynamic dispatch.  Handlers only read and write the
//! [`FsmContext`] blackboard.
//!
//! ```text
//!  IDLE ──[creds]──▶ LINK_CONNECTING ◀──────────────[link lost]──────┐
//!                        │   ▲ (retry after link cooldown)           │
//!                   [link ok]                                        │
//!                        ▼                                           │
//!                     LINK_UP ──▶ REGISTERING ─┐ (retry after reg cd) │
//!                                   │   ▲──────┘                     │
//!                              [identity]                            │
//!                                   ▼                                │
//!                              REGISTERED ──▶ SESSION_CONNECTING ◀─┐ │
//!                                                 │  (retry)       │ │
//!                                             [session ok]  [drop] │ │
//!                                                 ▼                │ │
//!                                           SESSION_ACTIVE ────────┘ │
//!
//!  Any state ──[credential update]──▶ LINK_CONNECTING (forced)
//! ```
//!
//! Identity invariant: `on_enter` of every state below Registered clears
//! identity and topics; `on_enter(Registered)` is the only place they
//! are set.

use super::context::{Attempt, FsmContext, Outcome};
use super::{StateDescriptor, StateId};
use crate::app::session::TopicPair;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        StateDescriptor {
            id: StateId::LinkConnecting,
            name: "LinkConnecting",
            on_enter: Some(link_connecting_enter),
            on_exit: None,
            on_update: link_connecting_update,
        },
        StateDescriptor {
            id: StateId::LinkUp,
            name: "LinkUp",
            on_enter: Some(link_up_enter),
            on_exit: None,
            on_update: link_up_update,
        },
        StateDescriptor {
            id: StateId::Registering,
            name: "Registering",
            on_enter: Some(registering_enter),
            on_exit: None,
            on_update: registering_update,
        },
        StateDescriptor {
            id: StateId::Registered,
            name: "Registered",
            on_enter: Some(registered_enter),
            on_exit: None,
            on_update: registered_update,
        },
        StateDescriptor {
            id: StateId::SessionConnecting,
            name: "SessionConnecting",
            on_enter: Some(session_connecting_enter),
            on_exit: None,
            on_update: session_connecting_update,
        },
        StateDescriptor {
            id: StateId::SessionActive,
            name: "SessionActive",
            on_enter: Some(session_active_enter),
            on_exit: Some(session_active_exit),
            on_update: session_active_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Common prelude for every `on_enter`: stale requests and outcomes
/// belong to the state being left.
fn enter_common(ctx: &mut FsmContext) {
    ctx.request = None;
    ctx.outcome = None;
}

/// Entry into any state below Registered.
fn enter_without_identity(ctx: &mut FsmContext) {
    enter_common(ctx);
    if ctx.identity.is_some() {
        info!("FSM: discarding device identity");
    }
    ctx.clear_identity();
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE: no credentials
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    enter_without_identity(ctx);
    ctx.teardown_session = true;
}

fn idle_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_credentials {
        return Some(StateId::LinkConnecting);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  LINK_CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn link_connecting_enter(ctx: &mut FsmContext) {
    enter_without_identity(ctx);
    ctx.teardown_session = true;
    ctx.timers.link.reset();
}

fn link_connecting_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.has_credentials {
        return Some(StateId::Idle);
    }

    match ctx.outcome.take() {
        Some(Outcome::LinkUp) => return Some(StateId::LinkUp),
        Some(Outcome::LinkFailed) => {
            info!(
                "FSM: link attempt failed, retry in {} ms",
                ctx.timers.link.cooldown_ms
            );
        }
        Some(other) => warn!("FSM: ignoring stale outcome {:?}", other),
        None => {}
    }

    request_if_due(ctx, Attempt::Link);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  LINK_UP: transient
// ═══════════════════════════════════════════════════════════════════════════

fn link_up_enter(ctx: &mut FsmContext) {
    enter_without_identity(ctx);
}

fn link_up_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.link_up {
        return Some(StateId::LinkConnecting);
    }
    Some(StateId::Registering)
}

// ═══════════════════════════════════════════════════════════════════════════
//  REGISTERING
// ═══════════════════════════════════════════════════════════════════════════

fn registering_enter(ctx: &mut FsmContext) {
    enter_without_identity(ctx);
    ctx.timers.registration.reset();
}

fn registering_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.link_up {
        return Some(StateId::LinkConnecting);
    }

    match ctx.outcome.take() {
        Some(Outcome::Registered(identity)) => {
            ctx.pending_identity = Some(identity);
            return Some(StateId::Registered);
        }
        Some(Outcome::RegistrationFailed) => {
            info!(
                "FSM: registration failed, retry in {} ms",
                ctx.timers.registration.cooldown_ms
            );
        }
        Some(other) => warn!("FSM: ignoring stale outcome {:?}", other),
        None => {}
    }

    request_if_due(ctx, Attempt::Register);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  REGISTERED: transient; topics derived here
// ═══════════════════════════════════════════════════════════════════════════

fn registered_enter(ctx: &mut FsmContext) {
    enter_common(ctx);
    match ctx.pending_identity.take() {
        Some(identity) => {
            ctx.topics = Some(TopicPair::derive(&ctx.layout, &ctx.tenant_id, &identity));
            info!("FSM: device_id={}", identity.as_str());
            ctx.identity = Some(identity);
        }
        None => {
            // Only reachable through a forced transition.
            warn!("FSM: entered Registered without an identity");
        }
    }
    ctx.timers.session.reset();
}

fn registered_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.link_up {
        return Some(StateId::LinkConnecting);
    }
    if ctx.identity.is_none() {
        return Some(StateId::Registering);
    }
    Some(StateId::SessionConnecting)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SESSION_CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn session_connecting_enter(ctx: &mut FsmContext) {
    // Session timer is reset on entry to Registered, not here: a drop from
    // SessionActive must still honour the cooldown since the last connect.
    enter_common(ctx);
}

fn session_connecting_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.link_up {
        return Some(StateId::LinkConnecting);
    }

    match ctx.outcome.take() {
        Some(Outcome::SessionUp) => return Some(StateId::SessionActive),
        Some(Outcome::SessionFailed) => {
            info!(
                "FSM: session connect failed, retry in {} ms",
                ctx.timers.session.cooldown_ms
            );
        }
        Some(other) => warn!("FSM: ignoring stale outcome {:?}", other),
        None => {}
    }

    request_if_due(ctx, Attempt::Session);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SESSION_ACTIVE
// ═══════════════════════════════════════════════════════════════════════════

fn session_active_enter(ctx: &mut FsmContext) {
    enter_common(ctx);
    ctx.teardown_session = false;
}

fn session_active_exit(ctx: &mut FsmContext) {
    if ctx.link_up && !ctx.session_up {
        warn!("FSM: bus session lost");
    }
}

fn session_active_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.link_up {
        return Some(StateId::LinkConnecting);
    }
    if !ctx.session_up {
        return Some(StateId::SessionConnecting);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════

fn request_if_due(ctx: &mut FsmContext, attempt: Attempt) {
    if ctx.request.is_some() {
        return;
    }
    let timer = match attempt {
        Attempt::Link => &mut ctx.timers.link,
        Attempt::Register => &mut ctx.timers.registration,
        Attempt::Session => &mut ctx.timers.session,
    };
    if timer.is_due(ctx.now_ms) {
        timer.mark(ctx.now_ms);
        ctx.request = Some(attempt);
    }
}
