//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing connectivity events to the
//! ESP-IDF logger (which goes to UART / USB-CDC in production), one
//! structured line per event.

use log::{info, warn};

use crate::app::events::ConnEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`ConnEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &ConnEvent) {
        match event {
            ConnEvent::Started(state) => info!("START | initial_state={}", state),
            ConnEvent::StateChanged { from, to } => info!("STATE | {} -> {}", from, to),
            ConnEvent::CredentialsApplied {
                network_name,
                persisted,
            } => info!("CREDS | ssid='{}' persisted={}", network_name, persisted),
            ConnEvent::CredentialsErased => info!("CREDS | erased"),
            ConnEvent::LinkUp { ip, rssi } => info!("LINK  | up ip={} rssi={}dBm", ip, rssi),
            ConnEvent::LinkLost => warn!("LINK  | lost"),
            ConnEvent::Registered { device_id } => info!("REG   | device_id={}", device_id),
            ConnEvent::SessionUp { client_id } => info!("BUS   | up client_id={}", client_id),
            ConnEvent::SessionDown => warn!("BUS   | down"),
            ConnEvent::LinkFailed(e) => warn!("LINK  | attempt failed: {}", e),
            ConnEvent::RegistrationFailed(e) => warn!("REG   | attempt failed: {}", e),
            ConnEvent::SessionFailed(e) => warn!("BUS   | attempt failed: {}", e),
        }
    }
}
