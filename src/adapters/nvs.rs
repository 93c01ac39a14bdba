//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`DurableStore`] for the door
//! controller.
//!
//! - Config validation: all fields are range-checked before persistence.
//! - Namespace isolation: everything lives under the `doorpilot` namespace.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - State tags are single `u8` values; the config blob is `postcard`.
//!
//! NVS limits keys to 15 characters, so the long domain key names map to
//! short on-flash keys on the device.  The simulation backend (HashMap)
//! uses the domain keys directly.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{
    ConfigPort, DurableStore, KEY_CURRENT_DOOR_STATE, KEY_TARGET_DOOR_STATE,
};
use crate::config::SystemConfig;
use crate::error::{Error, StoreError};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "doorpilot";
const CONFIG_KEY: &str = "syscfg";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 1024;

/// Domain key → on-flash key (NVS key limit is 15 chars).
#[cfg(target_os = "espidf")]
fn flash_key(key: &str) -> &str {
    match key {
        KEY_CURRENT_DOOR_STATE => "cur_state",
        KEY_TARGET_DOOR_STATE => "tgt_state",
        other => other,
    }
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(Error::Store(StoreError::IoError));
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(Error::Store(StoreError::IoError));
                }
            } else if ret != ESP_OK {
                return Err(Error::Store(StoreError::IoError));
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
    fn composite_key(key: &str) -> String {
        format!("{}::{}", NAMESPACE, key)
    }

    /// Open the NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = NAMESPACE.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn key_cstr(key: &str) -> [u8; 16] {
        let mut key_buf = [0u8; 16];
        let kb = key.as_bytes();
        let kl = kb.len().min(15);
        key_buf[..kl].copy_from_slice(&kb[..kl]);
        key_buf
    }
}

fn validate_config(cfg: &SystemConfig) -> Result<(), Error> {
    if !(20..=5_000).contains(&cfg.pulse_duration_ms) {
        return Err(Error::Config("pulse_duration_ms must be 20–5000"));
    }
    if !(1..=300).contains(&cfg.travel_duration_secs) {
        return Err(Error::Config("travel_duration_secs must be 1–300"));
    }
    if !(10..=1_000).contains(&cfg.control_loop_interval_ms) {
        return Err(Error::Config("control_loop_interval_ms must be 10–1000"));
    }
    for gpio in [cfg.open_line_gpio, cfg.close_line_gpio, cfg.sensor_gpio] {
        if !(0..=48).contains(&gpio) {
            return Err(Error::Config("GPIO number must be 0–48"));
        }
    }
    if cfg.webhook_json_path.is_empty() {
        return Err(Error::Config("webhook_json_path must not be empty"));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, Error> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_KEY);
            if let Some(bytes) = self.store.borrow().get(&key) {
                let cfg: SystemConfig = postcard::from_bytes(bytes)
                    .map_err(|_| Error::Store(StoreError::Corrupted))?;
                info!("NvsAdapter: loaded config from store");
                Ok(cfg)
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let key = Self::key_cstr(CONFIG_KEY);
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }

                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: SystemConfig = postcard::from_bytes(&bytes)
                        .map_err(|_| Error::Store(StoreError::Corrupted))?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(SystemConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    Ok(SystemConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), Error> {
        validate_config(config)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_KEY);
            let bytes =
                postcard::to_allocvec(config).map_err(|_| Error::Store(StoreError::IoError))?;
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let bytes =
                postcard::to_allocvec(config).map_err(|_| Error::Store(StoreError::IoError))?;
            let result = Self::with_nvs_handle(true, |handle| {
                let key = Self::key_cstr(CONFIG_KEY);
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(Error::Store(StoreError::IoError))
                }
            }
        }
    }
}

impl DurableStore for NvsAdapter {
    fn get(&self, key: &str) -> Result<Option<u8>, StoreError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(key);
            match self.store.borrow().get(&composite) {
                Some(data) if data.len() == 1 => Ok(Some(data[0])),
                Some(_) => Err(StoreError::Corrupted),
                None => Ok(None),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let key = Self::key_cstr(flash_key(key));
                let mut value: u8 = 0;
                let ret = unsafe { nvs_get_u8(handle, key.as_ptr() as *const _, &mut value) };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(value)
            });
            match result {
                Ok(value) => Ok(Some(value)),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
                Err(_) => Err(StoreError::IoError),
            }
        }
    }

    fn set(&mut self, key: &str, value: u8) -> Result<(), StoreError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(key);
            self.store.borrow_mut().insert(composite, vec![value]);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let key = Self::key_cstr(flash_key(key));
                let ret = unsafe { nvs_set_u8(handle, key.as_ptr() as *const _, value) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|rc| {
                if rc == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StoreError::Full
                } else {
                    StoreError::IoError
                }
            })
        }
    }
}
