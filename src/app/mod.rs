//! Application core: pure domain logic, zero direct I/O.
//!
//! This module contains the connectivity rules for the EdgeLink device:
//! credential lifecycle, link / registration / session stages, inbound
//! command parsing and the orchestrator that sequences them.  All
//! interaction with the radio, flash and network happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod credentials;
pub mod events;
pub mod link;
pub mod ports;
pub mod provisioning;
pub mod registration;
pub mod service;
pub mod session;
pub mod state_cache;
