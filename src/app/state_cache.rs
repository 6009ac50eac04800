//! Host-side state cache.
//!
//! A ready-made [`CommandHandler`]: keeps the last value per virtual pin,
//! applies inbound commands to it and queues publishes.  The main loop
//! drains the queue with [`StateCache::take_outbox`] and hands each entry
//! to [`Orchestrator::publish_state`](super::service::Orchestrator::publish_state).
//!
//! On session-ready every cached pin is queued, so the backend sees the
//! full device state after each reconnect.

use std::collections::BTreeMap;

use log::{debug, info};

use super::ports::CommandHandler;

#[derive(Debug, Default)]
pub struct StateCache {
    values: BTreeMap<String, i32>,
    outbox: Vec<(String, i32)>,
    commands_applied: u32,
    sessions_seen: u32,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local change (e.g. a button): cache and queue for publish.
    pub fn set(&mut self, vpin: &str, value: i32) {
        self.values.insert(vpin.to_owned(), value);
        self.queue(vpin, value);
    }

    pub fn get(&self, vpin: &str) -> Option<i32> {
        self.values.get(vpin).copied()
    }

    /// Everything queued since the last call, oldest first.
    pub fn take_outbox(&mut self) -> Vec<(String, i32)> {
        core::mem::take(&mut self.outbox)
    }

    pub fn commands_applied(&self) -> u32 {
        self.commands_applied
    }

    pub fn sessions_seen(&self) -> u32 {
        self.sessions_seen
    }

    fn queue(&mut self, vpin: &str, value: i32) {
        // Only the latest value per pin matters.
        self.outbox.retain(|(p, _)| p != vpin);
        self.outbox.push((vpin.to_owned(), value));
    }
}

impl CommandHandler for StateCache {
    fn on_command(&mut self, vpin: &str, value: i32) {
        info!("Command: {} <- {}", vpin, value);
        self.commands_applied = self.commands_applied.wrapping_add(1);
        self.set(vpin, value);
    }

    fn on_session_ready(&mut self) {
        self.sessions_seen = self.sessions_seen.wrapping_add(1);
        debug!("StateCache: replaying {} pins", self.values.len());
        let snapshot: Vec<(String, i32)> =
            self.values.iter().map(|(k, v)| (k.clone(), *v)).collect();
        for (vpin, value) in snapshot {
            self.queue(&vpin, value);
        }
    }
}
