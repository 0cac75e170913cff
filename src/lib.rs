//! Line- and buffer-oriented I/O over a polled USB CDC serial channel.
//!
//! The device stack is reached through the [`CdcDevice`] trait and must be
//! serviced cooperatively: every polling iteration calls
//! [`CdcDevice::service`] before checking for data or space. On top of that
//! [`UsbSerial`] offers three flavours of each operation:
//!
//! - blocking, bounded by an inactivity timeout that re-arms on progress
//! - non-blocking, a single pass that stops once the FIFO runs dry
//! - quick, a single look at whatever is staged right now
//!
//! ```no_run
//! # use usb_cdc_comms::{CdcDevice, Clock, CommsStatus, Duration, UsbSerial};
//! # fn demo<D: CdcDevice, C: Clock>(device: D, clock: C) {
//! let mut serial = UsbSerial::new(device, clock);
//! serial.init().ok();
//!
//! let mut line = [0u8; 128];
//! let outcome = serial.read_line_blocking(&mut line, Duration::millis(3000));
//! if outcome.status == CommsStatus::Ok {
//!     serial.write_buffer_blocking(outcome.data(&line), Duration::millis(3000));
//! }
//! # }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod comms;
pub mod config;
pub mod device;

pub use comms::{CommsError, CommsStatus, ReadOutcome, UsbSerial};
pub use config::CommsConfig;
pub use device::{CdcDevice, Clock, DeviceError, Duration, Instant};

#[cfg(feature = "usbd")]
pub use device::usbd::UsbdCdcDevice;
