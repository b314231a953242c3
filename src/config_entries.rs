use indexmap::IndexMap;
use log::info;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::DOMAIN;

/// Data collected by the setup form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryData {
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub version: u32,
    pub title: String,
    pub unique_id: Option<String>,
    pub data: EntryData,
}

/// Config entries created by the setup flow, kept for the life of the process.
#[derive(Debug, Default)]
pub struct ConfigEntries {
    entries: Mutex<IndexMap<String, ConfigEntry>>,
    next_id: AtomicU64,
}

impl ConfigEntries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, version: u32, title: &str, unique_id: Option<String>, data: EntryData) -> ConfigEntry {
        let mut entries = self.entries.lock();
        self.insert(&mut entries, version, title, unique_id, data)
    }

    /// Add an entry unless one with the same unique id exists. The check and
    /// the insert happen under one lock.
    pub fn add_unique(
        &self,
        version: u32,
        title: &str,
        unique_id: String,
        data: EntryData,
    ) -> Option<ConfigEntry> {
        let mut entries = self.entries.lock();
        if entries
            .values()
            .any(|entry| entry.unique_id.as_deref() == Some(unique_id.as_str()))
        {
            return None;
        }
        Some(self.insert(&mut entries, version, title, Some(unique_id), data))
    }

    fn insert(
        &self,
        entries: &mut IndexMap<String, ConfigEntry>,
        version: u32,
        title: &str,
        unique_id: Option<String>,
        data: EntryData,
    ) -> ConfigEntry {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = ConfigEntry {
            entry_id: format!("{}-{}", DOMAIN, n),
            version,
            title: title.to_string(),
            unique_id,
            data,
        };
        info!("Created config entry {} ({})", entry.entry_id, entry.title);
        entries.insert(entry.entry_id.clone(), entry.clone());
        entry
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.lock().get(entry_id).cloned()
    }

    pub fn find_by_unique_id(&self, unique_id: &str) -> Option<ConfigEntry> {
        self.entries
            .lock()
            .values()
            .find(|entry| entry.unique_id.as_deref() == Some(unique_id))
            .cloned()
    }

    pub fn remove(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.lock().shift_remove(entry_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
