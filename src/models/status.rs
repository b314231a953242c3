use serde::Deserialize;
use std::fmt;

pub const MOISTURE_CHANNELS: usize = 4;

/// One complete read of a GrowCube's identity and sensor fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Status {
    pub id: String,
    pub version: String,
    pub host: String,
    pub temperature: f32,
    pub humidity: f32,
    pub moistures: [u8; MOISTURE_CHANNELS],
    /// Set once every sensor reading has been reported by the device.
    #[serde(default)]
    pub is_refresh_complete: bool,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            id: String::new(),
            version: String::new(),
            host: String::new(),
            temperature: 0.0,
            humidity: 0.0,
            moistures: [0; MOISTURE_CHANNELS],
            is_refresh_complete: false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GrowCube {} (v{}) at {}: {:.1} °C, {:.1}% humidity, moisture {:?}, complete: {}",
            self.id,
            self.version,
            self.host,
            self.temperature,
            self.humidity,
            self.moistures,
            self.is_refresh_complete
        )
    }
}
