use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::client::{fetch_status, GrowcubeClient};
use crate::config_entries::ConfigEntry;
use crate::coordinator::{Coordinator, CoordinatorHandle, PollSettings, UpdateFailed};
use crate::models::{DeviceInfo, DeviceRecord, Status};
use crate::registry::DeviceDirectory;
use crate::sensors::{self, SensorEntity, StateSink};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Cannot connect to GrowCube at {host}: {reason}")]
    CannotConnect { host: String, reason: String },

    #[error("GrowCube not ready: {0}")]
    NotReady(#[source] UpdateFailed),

    #[error("Config entry {0} is already loaded")]
    AlreadyLoaded(String),
}

/// Runtime state of one loaded config entry.
#[derive(Debug)]
struct LoadedEntry {
    status: Arc<Status>,
    device: DeviceRecord,
    entities: Vec<Arc<SensorEntity>>,
    poller: CoordinatorHandle,
}

#[derive(Debug)]
enum EntryState {
    SettingUp,
    Loaded(LoadedEntry),
}

type EntryMap = Mutex<HashMap<String, EntryState>>;

/// Claim on an entry id while its setup runs. Released on drop unless committed.
struct Reservation<'a> {
    entries: &'a EntryMap,
    entry_id: String,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, loaded: LoadedEntry) {
        self.entries
            .lock()
            .insert(self.entry_id.clone(), EntryState::Loaded(loaded));
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut entries = self.entries.lock();
        if matches!(entries.get(&self.entry_id), Some(EntryState::SettingUp)) {
            entries.remove(&self.entry_id);
        }
    }
}

/// Loads and unloads GrowCube config entries against the host capabilities.
pub struct Integration {
    client: Arc<dyn GrowcubeClient>,
    devices: Arc<dyn DeviceDirectory>,
    sink: Arc<dyn StateSink>,
    setup_timeout: Duration,
    poll: PollSettings,
    entries: EntryMap,
}

impl Integration {
    pub fn new(
        client: Arc<dyn GrowcubeClient>,
        devices: Arc<dyn DeviceDirectory>,
        sink: Arc<dyn StateSink>,
        setup_timeout: Duration,
        poll: PollSettings,
    ) -> Self {
        Self {
            client,
            devices,
            sink,
            setup_timeout,
            poll,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn reserve(&self, entry_id: &str) -> Result<Reservation<'_>, SetupError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(entry_id) {
            return Err(SetupError::AlreadyLoaded(entry_id.to_string()));
        }
        entries.insert(entry_id.to_string(), EntryState::SettingUp);
        Ok(Reservation {
            entries: &self.entries,
            entry_id: entry_id.to_string(),
            committed: false,
        })
    }

    /// Set up GrowCube from a config entry.
    ///
    /// The identity fetch does not wait for sensor readings; the full readings
    /// arrive with the coordinator's first refresh. Any failure leaves no
    /// device record behind.
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> Result<DeviceRecord, SetupError> {
        let reservation = self.reserve(&entry.entry_id)?;

        let host = entry.data.ip.clone();
        let fetch = fetch_status(self.client.clone(), &host, self.setup_timeout, false);
        let status = match tokio::time::timeout(self.setup_timeout, fetch).await {
            Ok(Ok(status)) => Arc::new(status),
            Ok(Err(err)) => {
                return Err(SetupError::CannotConnect {
                    host,
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                return Err(SetupError::CannotConnect {
                    host,
                    reason: format!("no reply within {:?}", self.setup_timeout),
                })
            }
        };

        let device = self
            .devices
            .get_or_create(&entry.entry_id, DeviceInfo::from_status(&status));

        let (entities, poller) = match self.setup_sensors(&host, &status).await {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("Sensor setup for {} failed, rolling back", entry.entry_id);
                self.devices.remove_for_entry(&entry.entry_id);
                return Err(err);
            }
        };

        info!("Set up {} for entry {}", device.info.name, entry.entry_id);
        reservation.commit(LoadedEntry {
            status,
            device: device.clone(),
            entities,
            poller,
        });
        Ok(device)
    }

    async fn setup_sensors(
        &self,
        host: &str,
        status: &Arc<Status>,
    ) -> Result<(Vec<Arc<SensorEntity>>, CoordinatorHandle), SetupError> {
        let coordinator = Arc::new(Coordinator::new(
            host,
            self.client.clone(),
            status.clone(),
            self.poll,
        ));
        let entities = sensors::setup_entities(status, &coordinator, self.sink.clone());

        coordinator.refresh().await.map_err(SetupError::NotReady)?;

        let poller = coordinator.spawn();
        Ok((entities, poller))
    }

    /// Unload a config entry. Returns false when the entry was not loaded.
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.get(entry_id) {
                Some(EntryState::Loaded(_)) => entries.remove(entry_id),
                _ => None,
            }
        };
        let Some(EntryState::Loaded(loaded)) = removed else {
            return false;
        };

        loaded.poller.stop().await;
        self.devices.remove_for_entry(entry_id);
        info!(
            "Unloaded {} ({} entities)",
            loaded.device.info.name,
            loaded.entities.len()
        );
        true
    }

    fn with_loaded<T>(&self, entry_id: &str, f: impl FnOnce(&LoadedEntry) -> T) -> Option<T> {
        match self.entries.lock().get(entry_id) {
            Some(EntryState::Loaded(loaded)) => Some(f(loaded)),
            _ => None,
        }
    }

    /// Snapshot fetched when the entry was set up.
    pub fn setup_status(&self, entry_id: &str) -> Option<Arc<Status>> {
        self.with_loaded(entry_id, |l| l.status.clone())
    }

    pub fn coordinator(&self, entry_id: &str) -> Option<Arc<Coordinator>> {
        self.with_loaded(entry_id, |l| l.poller.coordinator().clone())
    }

    pub fn entities(&self, entry_id: &str) -> Vec<Arc<SensorEntity>> {
        self.with_loaded(entry_id, |l| l.entities.clone())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, entry_id: &str) -> bool {
        self.with_loaded(entry_id, |_| ()).is_some()
    }

    /// Unload every entry, used on shutdown.
    pub async fn unload_all(&self) {
        let ids: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, state)| matches!(state, EntryState::Loaded(_)))
            .map(|(id, _)| id.clone())
            .collect();
        for entry_id in ids {
            if !self.unload_entry(&entry_id).await {
                error!("Entry {} vanished during shutdown", entry_id);
            }
        }
    }
}
