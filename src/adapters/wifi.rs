//! WiFi station-mode adapter.
//!
//! Implements [`LinkDriver`], the hexagonal boundary for the local
//! network link.  Retry pacing lives in the connectivity state machine;
//! this adapter only performs one bounded join per call.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` from `esp_idf_svc`,
//!   plus an optional SNTP client started once the link is up.
//! - **all other targets**: a simulated station for host-side runs.

use log::{info, warn};

use super::utils::is_valid_ssid;
use crate::app::ports::LinkDriver;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    nvs::EspDefaultNvsPartition,
    sntp::EspSntp,
    sys::EspError,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

/// How often the join loop re-checks the interface.
#[cfg(target_os = "espidf")]
const JOIN_POLL_MS: u64 = 100;

pub struct WifiLink {
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    #[cfg(target_os = "espidf")]
    sntp: Option<EspSntp<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_joins: u32,
    use_ntp: bool,
}

// ── Construction ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl WifiLink {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        use_ntp: bool,
    ) -> Result<Self, EspError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        Ok(Self {
            wifi,
            sntp: None,
            use_ntp,
        })
    }

    fn configure(&mut self, network_name: &str, secret: &str) -> Result<(), EspError> {
        let auth_method = if secret.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let cfg = Configuration::Client(ClientConfiguration {
            // Lengths are bounded by `Credentials`; a failed conversion
            // leaves the field empty and the join simply times out.
            ssid: network_name.try_into().unwrap_or_default(),
            password: secret.try_into().unwrap_or_default(),
            auth_method,
            ..Default::default()
        });
        self.wifi.set_configuration(&cfg)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        self.wifi.wifi_mut().connect()
    }

    fn start_time_sync(&mut self) {
        if !self.use_ntp || self.sntp.is_some() {
            return;
        }
        match EspSntp::new_default() {
            Ok(sntp) => {
                info!("WiFi: SNTP started");
                self.sntp = Some(sntp);
            }
            Err(e) => warn!("WiFi: SNTP start failed: {:?}", e),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiLink {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiLink {
    pub fn new(use_ntp: bool) -> Self {
        Self {
            sim_connected: false,
            sim_joins: 0,
            use_ntp,
        }
    }

    /// Simulation: drop the association as if the AP vanished.
    pub fn sim_drop(&mut self) {
        self.sim_connected = false;
    }
}

// ── LinkDriver ────────────────────────────────────────────────

impl LinkDriver for WifiLink {
    #[cfg(target_os = "espidf")]
    fn connect(&mut self, network_name: &str, secret: &str, timeout_ms: u32) -> bool {
        use std::time::{Duration, Instant};

        if !is_valid_ssid(network_name) {
            warn!("WiFi: refusing to join non-printable SSID");
            return false;
        }
        info!("WiFi: joining '{}' (timeout {} ms)", network_name, timeout_ms);
        if let Err(e) = self.configure(network_name, secret) {
            warn!("WiFi: connect request failed: {:?}", e);
            return false;
        }

        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        while Instant::now() < deadline {
            if self.wifi.is_up().unwrap_or(false) {
                info!("WiFi: up ip={} rssi={}dBm", self.local_ip(), self.rssi());
                self.start_time_sync();
                return true;
            }
            std::thread::sleep(Duration::from_millis(JOIN_POLL_MS));
        }
        warn!("WiFi: join timed out");
        let _ = self.wifi.wifi_mut().disconnect();
        false
    }

    #[cfg(not(target_os = "espidf"))]
    fn connect(&mut self, network_name: &str, _secret: &str, timeout_ms: u32) -> bool {
        if !is_valid_ssid(network_name) {
            warn!("WiFi(sim): refusing to join non-printable SSID");
            return false;
        }
        self.sim_joins = self.sim_joins.wrapping_add(1);
        self.sim_connected = true;
        info!(
            "WiFi(sim): joined '{}' (attempt {}, timeout {} ms, ntp={})",
            network_name, self.sim_joins, timeout_ms, self.use_ntp
        );
        true
    }

    fn disconnect(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            self.sntp = None;
            if let Err(e) = self.wifi.disconnect() {
                // Already disconnected is reported as an error by the driver.
                log::debug!("WiFi: disconnect: {:?}", e);
            }
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_connected = false;
        }
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            self.wifi.is_up().unwrap_or(false)
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_connected
        }
    }

    fn local_ip(&self) -> String {
        if !self.is_connected() {
            return String::new();
        }
        #[cfg(target_os = "espidf")]
        {
            self.wifi
                .wifi()
                .sta_netif()
                .get_ip_info()
                .map(|ip| ip.ip.to_string())
                .unwrap_or_default()
        }
        #[cfg(not(target_os = "espidf"))]
        {
            "192.168.4.2".to_owned()
        }
    }

    fn rssi(&self) -> i32 {
        if !self.is_connected() {
            return 0;
        }
        #[cfg(target_os = "espidf")]
        {
            let mut ap = esp_idf_svc::sys::wifi_ap_record_t::default();
            // SAFETY: `ap` is a valid out-pointer for the duration of the call.
            let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap) };
            if ret == esp_idf_svc::sys::ESP_OK as esp_idf_svc::sys::esp_err_t {
                i32::from(ap.rssi)
            } else {
                0
            }
        }
        #[cfg(not(target_os = "espidf"))]
        {
            -60 + (self.sim_joins % 12) as i32 - 6
        }
    }
}
