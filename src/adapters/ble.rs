//! BLE provisioning adapter.
//!
//! Implements [`ProvisioningPort`] over a single GATT characteristic
//! (write + read + notify).  The peer writes UTF-8 text; the device
//! answers and reports status through notifications on the same
//! characteristic.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: an in-memory peer for host-side runs.
//!
//! ## GATT layout
//!
//! | Characteristic | UUID                          | Props               |
//! |----------------|-------------------------------|---------------------|
//! | Control        | `6e400002-…-e50e24dcca9e`     | Write, Read, Notify |

use log::{info, warn};

use super::utils::is_printable_ascii;
use crate::app::ports::ProvisioningPort;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x6e400001_b5a3_f393_e0a9_e50e24dcca9e;
pub const CHAR_CONTROL_UUID: u128 = 0x6e400002_b5a3_f393_e0a9_e50e24dcca9e;

/// Requested ATT MTU.
pub const BLE_MTU: u16 = 185;
/// Largest single write/notify payload (MTU minus ATT header).
pub const MAX_PAYLOAD: usize = BLE_MTU as usize - 3;
/// Unread peer writes beyond this depth are dropped.
const WRITE_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF Bluedroid glue
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// state.  These statics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
mod stack {
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};

    use esp_idf_svc::sys::*;

    use super::{CHAR_CONTROL_UUID, MAX_PAYLOAD, SERVICE_UUID, WRITE_QUEUE_DEPTH};

    pub static GATTS_IF: AtomicU32 = AtomicU32::new(0);
    pub static CONN_ID: AtomicU32 = AtomicU32::new(0);
    pub static CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
    pub static PEER_CONNECTED: AtomicBool = AtomicBool::new(false);

    // GATTS callbacks run in the Bluedroid task (not ISR), so a std Mutex is fine.
    static WRITES: Mutex<VecDeque<Vec<u8>>> = Mutex::new(VecDeque::new());

    pub fn take_write() -> Option<Vec<u8>> {
        WRITES
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn push_write(data: &[u8]) {
        if data.len() > MAX_PAYLOAD {
            log::warn!("BLE GATTS: oversize write ({} bytes) dropped", data.len());
            return;
        }
        let mut q = WRITES.lock().unwrap_or_else(PoisonError::into_inner);
        if q.len() >= WRITE_QUEUE_DEPTH {
            log::warn!("BLE GATTS: write queue full, dropped");
            return;
        }
        q.push_back(data.to_vec());
    }

    fn uuid128(uuid: u128) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = 16;
        t.uuid.uuid128 = uuid.to_le_bytes();
        t
    }

    fn adv_params() -> esp_ble_adv_params_t {
        esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..unsafe { core::mem::zeroed() }
        }
    }

    pub fn start_advertising() {
        let mut params = adv_params();
        unsafe { esp_ble_gap_start_advertising(&mut params) };
    }

    pub fn notify(text: &str) {
        let handle = CHAR_HANDLE.load(Ordering::Relaxed);
        if handle == 0 || !PEER_CONNECTED.load(Ordering::Relaxed) {
            return;
        }
        let len = text.len().min(MAX_PAYLOAD);
        unsafe {
            esp_ble_gatts_set_attr_value(handle as u16, len as u16, text.as_ptr());
            esp_ble_gatts_send_indicate(
                GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t,
                CONN_ID.load(Ordering::Relaxed) as u16,
                handle as u16,
                len as u16,
                text.as_ptr() as *mut u8,
                false,
            );
        }
    }

    pub unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => start_advertising(),
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising started");
            }
            _ => {}
        }
    }

    pub unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                GATTS_IF.store(u32::from(gatts_if), Ordering::Relaxed);
                let mut svc_id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: uuid128(SERVICE_UUID),
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, 4) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let svc_handle = unsafe { (*param).create.service_handle };
                let mut char_uuid = uuid128(CHAR_CONTROL_UUID);
                unsafe {
                    esp_ble_gatts_start_service(svc_handle);
                    esp_ble_gatts_add_char(
                        svc_handle,
                        &mut char_uuid,
                        (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                        (ESP_GATT_CHAR_PROP_BIT_READ
                            | ESP_GATT_CHAR_PROP_BIT_WRITE
                            | ESP_GATT_CHAR_PROP_BIT_NOTIFY) as esp_gatt_char_prop_t,
                        core::ptr::null_mut(),
                        core::ptr::null_mut(),
                    );
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let handle = unsafe { (*param).add_char.attr_handle };
                CHAR_HANDLE.store(u32::from(handle), Ordering::Relaxed);
                log::info!("BLE GATTS: control characteristic (handle={})", handle);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let conn_id = unsafe { (*param).connect.conn_id };
                CONN_ID.store(u32::from(conn_id), Ordering::Relaxed);
                PEER_CONNECTED.store(true, Ordering::Release);
                log::info!("BLE GATTS: peer connected (conn_id={})", conn_id);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                PEER_CONNECTED.store(false, Ordering::Release);
                log::info!("BLE GATTS: peer disconnected");
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = unsafe { &(*param).write };
                if u32::from(p.handle) == CHAR_HANDLE.load(Ordering::Relaxed) && !p.value.is_null()
                {
                    let data = unsafe { core::slice::from_raw_parts(p.value, usize::from(p.len)) };
                    push_write(data);
                }
            }
            _ => {}
        }
    }

    /// Bring up controller + Bluedroid, register the GATT app and start
    /// advertising as `name` (NUL-terminated).
    pub fn init(name: &[u8]) -> Result<(), esp_err_t> {
        let ok = ESP_OK as esp_err_t;
        let check = |ret: esp_err_t| if ret == ok { Ok(()) } else { Err(ret) };
        unsafe {
            // BLE-only: classic BT memory is returned to the heap.
            check(esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT))?;
            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg))?;
            check(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE))?;
            check(esp_bluedroid_init())?;
            check(esp_bluedroid_enable())?;
            check(esp_ble_gap_register_callback(Some(gap_event_handler)))?;
            check(esp_ble_gatts_register_callback(Some(gatts_event_handler)))?;
            check(esp_ble_gatts_app_register(0))?;
            check(esp_ble_gatt_set_local_mtu(super::BLE_MTU))?;
            check(esp_ble_gap_set_device_name(name.as_ptr() as *const _))?;

            let mut svc_uuid = SERVICE_UUID.to_le_bytes();
            let mut adv = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: true,
                include_txpower: true,
                service_uuid_len: svc_uuid.len() as u16,
                p_service_uuid: svc_uuid.as_mut_ptr(),
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
                ..core::mem::zeroed()
            };
            // Advertising starts from the ADV_DATA_SET_COMPLETE event.
            check(esp_ble_gap_config_adv_data(&mut adv))?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct BleProvisioning {
    state: BleState,
    device_name: heapless::String<24>,
    advertising_restarts: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_writes: std::collections::VecDeque<Vec<u8>>,
    #[cfg(not(target_os = "espidf"))]
    sim_notified: Vec<String>,
}

impl BleProvisioning {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            state: BleState::Idle,
            device_name,
            advertising_restarts: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_writes: std::collections::VecDeque::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_notified: Vec::new(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn advertising_restarts(&self) -> u32 {
        self.advertising_restarts
    }

    /// Bring the GATT server up and start advertising.
    pub fn start(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            let mut name: heapless::Vec<u8, 25> = heapless::Vec::new();
            let _ = name.extend_from_slice(self.device_name.as_bytes());
            let _ = name.push(0);
            if let Err(e) = stack::init(&name) {
                log::error!("BLE: stack init failed ({})", e);
                self.state = BleState::Failed;
                return;
            }
        }
        info!("BLE: advertising as '{}' (MTU {})", self.device_name, BLE_MTU);
        self.state = BleState::Advertising;
    }

    // ── Simulation hooks ──────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_attach(&mut self) {
        self.state = BleState::Connected;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_detach(&mut self) {
        self.state = BleState::Idle;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_write(&mut self, data: &[u8]) {
        if data.len() <= MAX_PAYLOAD && self.sim_writes.len() < WRITE_QUEUE_DEPTH {
            self.sim_writes.push_back(data.to_vec());
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_notified(&self) -> &[String] {
        &self.sim_notified
    }
}

impl ProvisioningPort for BleProvisioning {
    fn notify(&mut self, text: &str) {
        if !is_printable_ascii(text) {
            warn!("BLE: refusing non-printable notify");
            return;
        }
        #[cfg(target_os = "espidf")]
        {
            stack::notify(text);
        }
        #[cfg(not(target_os = "espidf"))]
        {
            if self.state == BleState::Connected {
                self.sim_notified.push(text.to_owned());
            }
        }
    }

    fn is_peer_connected(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            stack::PEER_CONNECTED.load(core::sync::atomic::Ordering::Acquire)
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.state == BleState::Connected
        }
    }

    fn take_write(&mut self) -> Option<Vec<u8>> {
        #[cfg(target_os = "espidf")]
        {
            stack::take_write()
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_writes.pop_front()
        }
    }

    fn restart_advertising(&mut self) {
        if self.state == BleState::Failed {
            return;
        }
        #[cfg(target_os = "espidf")]
        stack::start_advertising();
        self.advertising_restarts = self.advertising_restarts.wrapping_add(1);
        self.state = BleState::Advertising;
    }
}
