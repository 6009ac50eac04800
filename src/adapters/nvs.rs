//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] (backing the credential store) and
//! [`ConfigPort`] (backing [`NetConfig`]).
//!
//! # Security
//!
//! - Config is validated with [`config::validate`] before it is written.
//! - The credential namespace should live on the encrypted NVS partition
//!   in production builds (`CONFIG_NVS_ENCRYPTION`); the API is unchanged.
//! - NVS commits are atomic per `nvs_commit()`.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::{self, NetConfig};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::{
    esp_err_t, nvs_close, nvs_commit, nvs_erase_key, nvs_find_key, nvs_flash_erase,
    nvs_flash_init, nvs_get_blob, nvs_handle_t, nvs_open, nvs_open_mode_t_NVS_READONLY,
    nvs_open_mode_t_NVS_READWRITE, nvs_set_blob,
};

// Bindgen emits the error codes untyped; pin them to `esp_err_t` so they
// can be matched against return values.
#[cfg(target_os = "espidf")]
mod code {
    use esp_idf_svc::sys::{self, esp_err_t};
    pub const OK: esp_err_t = sys::ESP_OK as esp_err_t;
    pub const NOT_FOUND: esp_err_t = sys::ESP_ERR_NVS_NOT_FOUND as esp_err_t;
    pub const NO_FREE_PAGES: esp_err_t = sys::ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t;
    pub const NEW_VERSION: esp_err_t = sys::ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t;
    pub const INVALID_LENGTH: esp_err_t = sys::ESP_ERR_NVS_INVALID_LENGTH as esp_err_t;
    pub const NO_SPACE: esp_err_t = sys::ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t;
}

const CONFIG_NAMESPACE: &str = "edgelink";
const CONFIG_KEY: &str = "netcfg";

/// NVS keys and namespaces are limited to 15 bytes plus NUL.
const NVS_NAME_MAX: usize = 15;

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 2048;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

/// NUL-terminated copy of an NVS name, truncated to the NVS limit.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn nvs_name(name: &str) -> [u8; NVS_NAME_MAX + 1] {
    let mut buf = [0u8; NVS_NAME_MAX + 1];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NVS_NAME_MAX);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

impl NvsAdapter {
    /// Initialise NVS flash.  A partition with no free pages or written by a
    /// newer IDF is erased and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called from the main task before any other NVS user.
            let ret = unsafe { nvs_flash_init() };
            if ret == code::NO_FREE_PAGES || ret == code::NEW_VERSION {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != code::OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != code::OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != code::OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open `namespace`, run `f` with the handle, close.
    #[cfg(target_os = "espidf")]
    fn with_handle<T>(
        namespace: &str,
        write: bool,
        f: impl FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
    ) -> Result<T, esp_err_t> {
        let ns = nvs_name(namespace);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != code::OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }

    /// Size-probe then read a whole blob.
    #[cfg(target_os = "espidf")]
    fn read_blob(namespace: &str, key: &str) -> Result<Vec<u8>, esp_err_t> {
        let k = nvs_name(key);
        Self::with_handle(namespace, false, |handle| {
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(handle, k.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
            };
            if ret != code::OK {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(code::INVALID_LENGTH);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(handle, k.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret != code::OK {
                return Err(ret);
            }
            buf.truncate(size);
            Ok(buf)
        })
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(namespace: &str, key: &str, data: &[u8]) -> Result<(), esp_err_t> {
        let k = nvs_name(key);
        Self::with_handle(namespace, true, |handle| {
            let ret = unsafe {
                nvs_set_blob(handle, k.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
            };
            if ret != code::OK {
                return Err(ret);
            }
            match unsafe { nvs_commit(handle) } {
                code::OK => Ok(()),
                e => Err(e),
            }
        })
    }
}

// ── ConfigPort ────────────────────────────────────────────────

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<NetConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        let stored = self
            .store
            .borrow()
            .get(&Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY))
            .cloned();

        #[cfg(target_os = "espidf")]
        let stored = match Self::read_blob(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(bytes) => Some(bytes),
            Err(code::NOT_FOUND) => None,
            Err(e) => {
                warn!("NvsAdapter: config read error {}", e);
                return Err(ConfigError::IoError);
            }
        };

        match stored {
            Some(bytes) => {
                let cfg: NetConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            None => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(NetConfig::default())
            }
        }
    }

    fn save(&mut self, cfg: &NetConfig) -> Result<(), ConfigError> {
        config::validate(cfg)?;
        let bytes = postcard::to_allocvec(cfg).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        self.store
            .borrow_mut()
            .insert(Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY), bytes.clone());

        #[cfg(target_os = "espidf")]
        Self::write_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes).map_err(|e| {
            warn!("NvsAdapter: config write error {}", e);
            ConfigError::IoError
        })?;

        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

// ── StoragePort ───────────────────────────────────────────────

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let store = self.store.borrow();
            let data = store
                .get(&Self::composite_key(namespace, key))
                .ok_or(StorageError::NotFound)?;
            if data.len() > buf.len() {
                return Err(StorageError::BufferTooSmall);
            }
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = nvs_name(key);
            let result = Self::with_handle(namespace, false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(handle, k.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
                };
                if ret != code::OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(code::NOT_FOUND) => Err(StorageError::NotFound),
                Err(code::INVALID_LENGTH) => Err(StorageError::BufferTooSmall),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::write_blob(namespace, key, data).map_err(|e| match e {
                code::NO_SPACE => StorageError::Full,
                _ => StorageError::IoError,
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = nvs_name(key);
            let result = Self::with_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, k.as_ptr() as *const _) };
                if ret != code::OK && ret != code::NOT_FOUND {
                    return Err(ret);
                }
                match unsafe { nvs_commit(handle) } {
                    code::OK => Ok(()),
                    e => Err(e),
                }
            });
            match result {
                // Namespace never opened for write: nothing to delete.
                Ok(()) | Err(code::NOT_FOUND) => Ok(()),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let k = nvs_name(key);
            Self::with_handle(namespace, false, |handle| {
                let ret =
                    unsafe { nvs_find_key(handle, k.as_ptr() as *const _, core::ptr::null_mut()) };
                Ok(ret == code::OK)
            })
            .unwrap_or(false)
        }
    }
}
