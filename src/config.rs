//! Configuration constants for the USB CDC transport

use crate::device::Duration;

/// Line framing
pub mod line {
    /// Carriage return, ends a line
    pub const CR: u8 = b'\r';
    /// Line feed, ends a line
    pub const LF: u8 = b'\n';
    /// Written after the last data byte of every text read
    pub const SENTINEL: u8 = 0x00;

    /// Returns true if `byte` terminates a line.
    pub const fn is_delimiter(byte: u8) -> bool {
        byte == CR || byte == LF
    }
}

/// Timing defaults
pub mod timing {
    /// Inactivity timeout used by the convenience read/write methods
    pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
}

/// Staging buffers for the usb-device backend
pub mod usbd {
    /// USB full-speed bulk endpoint size
    pub const MAX_PACKET_SIZE: usize = 64;
    pub const RX_STAGING_SIZE: usize = 256;
    pub const TX_STAGING_SIZE: usize = 256;
}

/// Runtime configuration for a [`UsbSerial`](crate::comms::UsbSerial)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommsConfig {
    /// Inactivity timeout applied by `read_line`, `read_buffer`,
    /// `write_line`, `write_buffer` and `write_str`
    pub default_timeout: Duration,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::millis(timing::DEFAULT_TIMEOUT_MS),
        }
    }
}
