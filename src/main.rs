//! EdgeLink Firmware: Main Entry Point
//!
//! Wires the adapters to the connectivity core and runs the cooperative
//! main loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiLink       HttpClient     MqttTransport ×2   NvsAdapter   │
//! │  (LinkDriver)   (HttpPort)     (SessionTransport) (Storage)    │
//! │  BleProvisioning  LogEventSink  Esp32Clock  EfuseDeviceInfo    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │           Orchestrator (pure logic)                    │    │
//! │  │  FSM · Link · Registration · Session                   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  ProvisioningBridge ──▶ CredentialInbox ──▶ Orchestrator       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Result, anyhow};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{debug, error, info, warn};

use edgelink::adapters::ble::BleProvisioning;
use edgelink::adapters::device_id::{self, EfuseDeviceInfo};
use edgelink::adapters::http::HttpClient;
use edgelink::adapters::log_sink::LogEventSink;
use edgelink::adapters::mqtt::MqttTransport;
use edgelink::adapters::nvs::NvsAdapter;
use edgelink::adapters::time::Esp32Clock;
use edgelink::adapters::wifi::WifiLink;
use edgelink::app::credentials::NvsCredentialStore;
use edgelink::app::ports::{Clock, ConfigPort};
use edgelink::app::provisioning::{CredentialInbox, ProvisioningBridge};
use edgelink::app::service::{Collaborators, Orchestrator};
use edgelink::app::state_cache::StateCache;
use edgelink::config::{self, NetConfig};

/// Main loop period.  Every stage attempt is bounded separately.
const LOOP_PERIOD_MS: u32 = 50;

/// Provisioning → orchestrator queue.  Fed by the bridge, drained by the
/// orchestrator.  Both run on this task, so an update always lands between
/// attempts and the orchestrator's post-attempt inbox re-check never fires
/// here; it only matters when the bridge is polled from another task.
static INBOX: CredentialInbox = CredentialInbox::new();

/// Stored config if it validates, otherwise the build-time defaults.
fn load_config(nvs: &NvsAdapter) -> NetConfig {
    match nvs.load() {
        Ok(cfg) => match config::validate(&cfg) {
            Ok(()) => return cfg,
            Err(e) => error!("Stored config invalid ({}), using build-time defaults", e),
        },
        Err(e) => warn!("NVS config load failed ({}), using build-time defaults", e),
    }
    let defaults = NetConfig::default();
    if let Err(e) = config::validate(&defaults) {
        error!(
            "Build-time config invalid ({}): rebuild with EDGELINK_TENANT_ID, \
             EDGELINK_API_BASE and EDGELINK_BUS_HOST set; registration cannot succeed",
            e
        );
    }
    defaults
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  EdgeLink v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Config from NVS (or defaults) ──────────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let config = load_config(&nvs);
    info!(
        "Config: tenant='{}' bus={}:{} api='{}'",
        config.tenant_id, config.bus_host, config.bus_port, config.api_base
    );

    // ── 3. Provisioning channel ───────────────────────────────
    let device = EfuseDeviceInfo::new();
    let mut ble = BleProvisioning::new(device_id::hostname(device.mac()));
    ble.start();
    let mut bridge = ProvisioningBridge::new(ble, &config);

    // ── 4. Orchestrator ───────────────────────────────────────
    let wifi = WifiLink::new(
        peripherals.modem,
        sysloop,
        Some(nvs_partition),
        config.use_ntp,
    )?;
    let mut orchestrator = Orchestrator::new(
        &config,
        &device,
        Collaborators {
            store: NvsCredentialStore::new(nvs),
            link: wifi,
            http: HttpClient::new(),
            plain: MqttTransport::plain(),
            tls: MqttTransport::tls(),
            clock: Esp32Clock::new(),
        },
    );

    let clock = Esp32Clock::new();
    let mut app = StateCache::new();
    let mut log_sink = LogEventSink::new();
    orchestrator.start(&mut (&mut log_sink, &mut bridge));

    info!("System ready. Entering main loop.");

    // ── 5. Main loop ──────────────────────────────────────────
    loop {
        bridge.poll(clock.now_ms(), &INBOX);
        orchestrator.poll(&INBOX, &mut app, &mut (&mut log_sink, &mut bridge));

        for (vpin, value) in app.take_outbox() {
            if !orchestrator.publish_state(&vpin, value) {
                debug!("Publish {}={} skipped (session not active)", vpin, value);
            }
        }

        FreeRtos::delay_ms(LOOP_PERIOD_MS);
    }
}
