//! Hardware facts derived from the ESP32 factory MAC address.
//!
//! Implements [`DeviceInfo`]:
//! - `mac_address`: `AA:BB:CC:DD:EE:FF`, the registration fingerprint
//! - `unique_suffix`: low 32 bits of the MAC, appended to bus client ids
//! - `chip_model`: e.g. `ESP32-S3`
//!
//! All three are deterministic across reboots (factory-burned eFuse MAC).

use core::fmt::Write;

use crate::app::ports::DeviceInfo;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

#[cfg(target_os = "espidf")]
fn read_chip_model() -> &'static str {
    use esp_idf_svc::sys::*;
    let mut info = esp_chip_info_t::default();
    unsafe { esp_chip_info(&mut info) };
    #[allow(non_upper_case_globals)]
    match info.model {
        esp_chip_model_t_CHIP_ESP32 => "ESP32",
        esp_chip_model_t_CHIP_ESP32S2 => "ESP32-S2",
        esp_chip_model_t_CHIP_ESP32S3 => "ESP32-S3",
        esp_chip_model_t_CHIP_ESP32C3 => "ESP32-C3",
        esp_chip_model_t_CHIP_ESP32C6 => "ESP32-C6",
        esp_chip_model_t_CHIP_ESP32H2 => "ESP32-H2",
        _ => "ESP32-unknown",
    }
}

#[cfg(not(target_os = "espidf"))]
fn read_chip_model() -> &'static str {
    "ESP32-sim"
}

/// Upper-case colon-separated MAC.
pub fn format_mac(mac: &MacAddress) -> heapless::String<17> {
    let mut s = heapless::String::new();
    for (i, b) in mac.iter().enumerate() {
        if i > 0 {
            let _ = s.push(':');
        }
        let _ = write!(s, "{:02X}", b);
    }
    s
}

/// Low 32 bits of the MAC as the eFuse reports it (little-endian base).
pub fn mac_suffix(mac: &MacAddress) -> u32 {
    u32::from_le_bytes([mac[0], mac[1], mac[2], mac[3]])
}

/// BLE advertising name: `edgelink-xxyyzz` from the last 3 MAC bytes.
pub fn hostname(mac: &MacAddress) -> heapless::String<24> {
    let mut name = heapless::String::<24>::new();
    let _ = write!(name, "edgelink-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}

/// [`DeviceInfo`] backed by the factory MAC.
pub struct EfuseDeviceInfo {
    mac: MacAddress,
}

impl Default for EfuseDeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl EfuseDeviceInfo {
    pub fn new() -> Self {
        Self { mac: read_mac() }
    }

    pub fn mac(&self) -> &MacAddress {
        &self.mac
    }
}

impl DeviceInfo for EfuseDeviceInfo {
    fn mac_address(&self) -> String {
        format_mac(&self.mac).as_str().to_owned()
    }

    fn chip_model(&self) -> String {
        read_chip_model().to_owned()
    }

    fn unique_suffix(&self) -> u32 {
        mac_suffix(&self.mac)
    }
}
