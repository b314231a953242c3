use log::info;
use std::sync::Arc;

use crate::coordinator::{Coordinator, CoordinatorListener};
use crate::models::Status;

pub mod entity;

pub use entity::{Channel, DeviceClass, EntityState, SensorDescription, SensorEntity, SensorKind};

/// Host side of an observable sensor: receives every state write.
pub trait StateSink: Send + Sync {
    fn publish(&self, state: &EntityState);
}

/// Writes entity states to the application log.
#[derive(Debug, Default, Clone)]
pub struct LogStateSink;

impl StateSink for LogStateSink {
    fn publish(&self, state: &EntityState) {
        info!(
            "{} [{}]: {} {}",
            state.name, state.unique_id, state.native_value, state.unit
        );
    }
}

/// Create the six sensor entities of one device and attach them to `coordinator`.
pub fn setup_entities(
    status: &Status,
    coordinator: &Coordinator,
    sink: Arc<dyn StateSink>,
) -> Vec<Arc<SensorEntity>> {
    let mut kinds = vec![SensorKind::Temperature, SensorKind::Humidity];
    kinds.extend(Channel::ALL.iter().map(|channel| SensorKind::Moisture(*channel)));

    let entities: Vec<Arc<SensorEntity>> = kinds
        .into_iter()
        .map(|kind| Arc::new(SensorEntity::new(kind, status, sink.clone())))
        .collect();

    for entity in &entities {
        coordinator.add_listener(entity.clone() as Arc<dyn CoordinatorListener>);
        entity.write_state();
    }

    entities
}
