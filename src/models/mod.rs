pub mod device;
pub mod status;

pub use device::{DeviceInfo, DeviceRecord};
pub use status::{Status, MOISTURE_CHANNELS};
