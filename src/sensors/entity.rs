use chrono::{DateTime, Local};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::coordinator::CoordinatorListener;
use crate::models::{Status, MOISTURE_CHANNELS};
use crate::sensors::StateSink;

pub const CELSIUS: &str = "°C";
pub const PERCENTAGE: &str = "%";

/// Moisture port on the device, labelled A to D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    A,
    B,
    C,
    D,
}

impl Channel {
    pub const ALL: [Channel; MOISTURE_CHANNELS] = [Channel::A, Channel::B, Channel::C, Channel::D];

    pub fn index(self) -> usize {
        match self {
            Channel::A => 0,
            Channel::B => 1,
            Channel::C => 2,
            Channel::D => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn letter(self) -> char {
        match self {
            Channel::A => 'A',
            Channel::B => 'B',
            Channel::C => 'C',
            Channel::D => 'D',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Temperature,
    Humidity,
    Moisture,
}

impl DeviceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Temperature => "temperature",
            DeviceClass::Humidity => "humidity",
            DeviceClass::Moisture => "moisture",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Moisture(Channel),
}

impl SensorKind {
    /// Reads this sensor's field from a snapshot, truncated toward zero.
    pub fn read(self, status: &Status) -> i32 {
        match self {
            SensorKind::Temperature => status.temperature.trunc() as i32,
            SensorKind::Humidity => status.humidity.trunc() as i32,
            SensorKind::Moisture(channel) => i32::from(status.moistures[channel.index()]),
        }
    }

    pub fn device_class(self) -> DeviceClass {
        match self {
            SensorKind::Temperature => DeviceClass::Temperature,
            SensorKind::Humidity => DeviceClass::Humidity,
            SensorKind::Moisture(_) => DeviceClass::Moisture,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::Temperature => CELSIUS,
            SensorKind::Humidity | SensorKind::Moisture(_) => PERCENTAGE,
        }
    }

    // The "+_" in the first two ids is kept so existing entity ids stay stable.
    fn unique_id(self, device_id: &str) -> String {
        match self {
            SensorKind::Temperature => format!("{}+_temperature", device_id),
            SensorKind::Humidity => format!("{}+_humidity", device_id),
            SensorKind::Moisture(channel) => format!("{}_plant_{}", device_id, channel.letter()),
        }
    }

    fn name(self) -> String {
        match self {
            SensorKind::Temperature => "GrowCube Temperature".to_string(),
            SensorKind::Humidity => "GrowCube Humidity".to_string(),
            SensorKind::Moisture(channel) => format!("GrowCube Plant {}", channel.letter()),
        }
    }
}

/// Fixed display metadata of a sensor entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescription {
    pub unique_id: String,
    pub name: String,
    pub unit: &'static str,
    pub device_class: DeviceClass,
}

/// State as written to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub unique_id: String,
    pub name: String,
    pub native_value: i32,
    pub unit: &'static str,
    pub device_class: DeviceClass,
    pub last_updated: DateTime<Local>,
}

/// One measurement of a GrowCube. Holds the last seen value and republishes
/// it whenever the coordinator hands over a new snapshot.
pub struct SensorEntity {
    kind: SensorKind,
    description: SensorDescription,
    value: Mutex<i32>,
    sink: Arc<dyn StateSink>,
}

impl SensorEntity {
    pub fn new(kind: SensorKind, status: &Status, sink: Arc<dyn StateSink>) -> Self {
        Self {
            kind,
            description: SensorDescription {
                unique_id: kind.unique_id(&status.id),
                name: kind.name(),
                unit: kind.unit(),
                device_class: kind.device_class(),
            },
            value: Mutex::new(kind.read(status)),
            sink,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn description(&self) -> &SensorDescription {
        &self.description
    }

    pub fn unique_id(&self) -> &str {
        &self.description.unique_id
    }

    pub fn native_value(&self) -> i32 {
        *self.value.lock()
    }

    pub fn state(&self) -> EntityState {
        EntityState {
            unique_id: self.description.unique_id.clone(),
            name: self.description.name.clone(),
            native_value: self.native_value(),
            unit: self.description.unit,
            device_class: self.description.device_class,
            last_updated: Local::now(),
        }
    }

    pub fn write_state(&self) {
        self.sink.publish(&self.state());
    }
}

impl CoordinatorListener for SensorEntity {
    fn handle_coordinator_update(&self, status: &Status) {
        debug!("Update {} {}", self.description.name, status);
        *self.value.lock() = self.kind.read(status);
        self.write_state();
    }
}

impl std::fmt::Debug for SensorEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorEntity")
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("value", &self.native_value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_status, RecordingSink};

    #[test]
    fn test_channel_letters() {
        let letters: String = Channel::ALL.iter().map(|c| c.letter()).collect();
        assert_eq!(letters, "ABCD");
        assert_eq!(Channel::from_index(2), Some(Channel::C));
        assert_eq!(Channel::from_index(4), None);
    }

    #[test]
    fn test_metadata() {
        let sink = Arc::new(RecordingSink::default());
        let status = sample_status();

        let temperature = SensorEntity::new(SensorKind::Temperature, &status, sink.clone());
        assert_eq!(temperature.unique_id(), "abc123+_temperature");
        assert_eq!(temperature.description().name, "GrowCube Temperature");
        assert_eq!(temperature.description().unit, "°C");
        assert_eq!(temperature.description().device_class.as_str(), "temperature");

        let humidity = SensorEntity::new(SensorKind::Humidity, &status, sink.clone());
        assert_eq!(humidity.unique_id(), "abc123+_humidity");
        assert_eq!(humidity.description().unit, "%");

        let plant = SensorEntity::new(SensorKind::Moisture(Channel::D), &status, sink);
        assert_eq!(plant.unique_id(), "abc123_plant_D");
        assert_eq!(plant.description().name, "GrowCube Plant D");
        assert_eq!(plant.description().device_class, DeviceClass::Moisture);
    }

    #[test]
    fn test_initial_value_is_truncated() {
        let sink = Arc::new(RecordingSink::default());
        let mut status = sample_status();
        status.temperature = -3.9;
        let entity = SensorEntity::new(SensorKind::Temperature, &status, sink);
        assert_eq!(entity.native_value(), -3);
    }

    #[test]
    fn test_update_republishes() {
        let sink = Arc::new(RecordingSink::default());
        let entity = SensorEntity::new(SensorKind::Moisture(Channel::B), &sample_status(), sink.clone());
        assert_eq!(entity.native_value(), 20);
        assert!(sink.states().is_empty());

        let mut next = sample_status();
        next.moistures = [1, 2, 3, 4];
        entity.handle_coordinator_update(&next);

        assert_eq!(entity.native_value(), 2);
        let states = sink.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].unique_id, "abc123_plant_B");
        assert_eq!(states[0].native_value, 2);
    }
}
