use crate::models::status::Status;
use crate::DOMAIN;

pub const MANUFACTURER: &str = "Elecrow";
pub const MODEL: &str = "GrowCube";

/// Description of a physical device as handed to the device directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

impl DeviceInfo {
    pub fn from_status(status: &Status) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), status.id.clone())],
            name: format!("GrowCube {}", status.id),
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            sw_version: status.version.clone(),
        }
    }

    /// Device identifier within this integration's domain.
    pub fn device_id(&self) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|(domain, _)| domain == DOMAIN)
            .map(|(_, id)| id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub config_entry_id: String,
    pub info: DeviceInfo,
}

impl DeviceRecord {
    pub fn device_id(&self) -> Option<&str> {
        self.info.device_id()
    }
}
