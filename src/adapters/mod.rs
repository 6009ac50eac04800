//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements           | Connects to                  |
//! |-------------|----------------------|------------------------------|
//! | `ble`       | ProvisioningPort     | Bluedroid GATT server        |
//! | `device_id` | DeviceInfo           | eFuse factory MAC            |
//! | `http`      | HttpPort             | esp_http_client              |
//! | `log_sink`  | EventSink            | Serial log output            |
//! | `mqtt`      | SessionTransport ×2  | esp-mqtt (mqtt:// / mqtts://)|
//! | `nvs`       | ConfigPort           | NVS / in-memory store        |
//! |             | StoragePort          |                              |
//! | `time`      | Clock                | ESP32 high-resolution timer  |
//! | `wifi`      | LinkDriver           | ESP-IDF WiFi STA             |

pub mod ble;
pub mod device_id;
pub mod http;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
pub(super) mod utils;
pub mod wifi;
