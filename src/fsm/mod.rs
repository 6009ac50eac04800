//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                     │
//! │  ┌───────────────────┬──────────┬─────────┬───────────────────┐ │
//! │  │ StateId           │ on_enter │ on_exit │ on_update         │ │
//! │  ├───────────────────┼──────────┼─────────┼───────────────────┤ │
//! │  │ Idle              │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option<> │ │
//! │  │ LinkConnecting    │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option<> │ │
//! │  │ LinkUp            │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option<> │ │
//! │  │ Registering       │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option<> │ │
//! │  │ Registered        │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option<> │ │
//! │  │ SessionConnecting │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option<> │ │
//! │  │ SessionActive     │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option<> │ │
//! │  └───────────────────┴──────────┴─────────┴───────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  Automatic transitions (e.g. LinkUp → Registering)
//! chain within the same tick, bounded by the number of states.
//!
//! Handlers never perform I/O.  They read observations from
//! [`FsmContext`] and write back *requests* (which blocking attempt to
//! run) that the [`Orchestrator`](crate::app::service::Orchestrator)
//! executes.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all connectivity states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    LinkConnecting = 1,
    LinkUp = 2,
    Registering = 3,
    Registered = 4,
    SessionConnecting = 5,
    SessionActive = 6,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Idle,
        Self::LinkConnecting,
        Self::LinkUp,
        Self::Registering,
        Self::Registered,
        Self::SessionConnecting,
        Self::SessionActive,
    ];

    /// Convert an index back to `StateId`.  Asserts in debug builds;
    /// returns `Idle` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match Self::ALL.get(idx) {
            Some(id) => *id,
            None => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Idle
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::LinkConnecting => "LinkConnecting",
            Self::LinkUp => "LinkUp",
            Self::Registering => "Registering",
            Self::Registered => "Registered",
            Self::SessionConnecting => "SessionConnecting",
            Self::SessionActive => "SessionActive",
        }
    }

    /// States in which a device identity (and its topics) must exist.
    pub fn holds_identity(self) -> bool {
        matches!(
            self,
            Self::Registered | Self::SessionConnecting | Self::SessionActive
        )
    }

    /// States that sit on top of an established link.
    pub fn requires_link(self) -> bool {
        !matches!(self, Self::Idle | Self::LinkConnecting)
    }
}

impl core::fmt::Display for StateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array: no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]).  The mutable
/// [`FsmContext`] is threaded through every handler call by the owner.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id as usize == i),
            "state table out of order"
        );
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// Calls `on_update` for the current state and follows any returned
    /// transition, then re-runs `on_update` for the new state so that
    /// immediate transitions settle in one tick.  At most
    /// [`StateId::COUNT`] hops per tick.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count += 1;
        ctx.total_ticks = self.tick_count;

        for _ in 0..StateId::COUNT {
            ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
            match (self.table[self.current].on_update)(ctx) {
                Some(next_id) if next_id as usize != self.current => {
                    self.transition(next_id, ctx);
                }
                _ => break,
            }
        }
    }

    /// Force an immediate transition regardless of what `on_update`
    /// would return.  Forcing into the current state re-runs its
    /// `on_exit` / `on_enter` pair (a restart).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        self.transition(next, ctx);
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
