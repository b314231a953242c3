use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::Mutex;

use crate::models::{DeviceInfo, DeviceRecord};

/// Host device registry.
pub trait DeviceDirectory: Send + Sync {
    /// Return the record for `info`'s identifier, creating it under `config_entry_id` if absent.
    fn get_or_create(&self, config_entry_id: &str, info: DeviceInfo) -> DeviceRecord;

    fn get(&self, device_id: &str) -> Option<DeviceRecord>;

    /// Drop every record owned by `config_entry_id`, returning how many were removed.
    fn remove_for_entry(&self, config_entry_id: &str) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: Mutex<IndexMap<String, DeviceRecord>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }
}

impl DeviceDirectory for InMemoryDeviceRegistry {
    fn get_or_create(&self, config_entry_id: &str, info: DeviceInfo) -> DeviceRecord {
        let key = info.device_id().unwrap_or(info.name.as_str()).to_string();
        let mut devices = self.devices.lock();
        if let Some(existing) = devices.get(&key) {
            debug!("Device {} already registered", key);
            return existing.clone();
        }

        info!("Registering device {} ({})", info.name, key);
        let record = DeviceRecord {
            config_entry_id: config_entry_id.to_string(),
            info,
        };
        devices.insert(key, record.clone());
        record
    }

    fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.lock().get(device_id).cloned()
    }

    fn remove_for_entry(&self, config_entry_id: &str) -> usize {
        let mut devices = self.devices.lock();
        let before = devices.len();
        devices.retain(|_, record| record.config_entry_id != config_entry_id);
        let removed = before - devices.len();
        if removed > 0 {
            info!("Removed {} device(s) for entry {}", removed, config_entry_id);
        }
        removed
    }
}
