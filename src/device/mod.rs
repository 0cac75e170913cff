pub mod traits;

#[cfg(feature = "usbd")]
pub mod usbd;

pub use traits::{CdcDevice, Clock, DeviceError, Duration, Instant};
