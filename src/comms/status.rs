//! Status taxonomy shared by every transfer operation

use crate::device::DeviceError;

/// Result of a read or write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsStatus {
    /// Request fully satisfied
    Ok,
    /// Channel not connected, or nothing to transfer into
    Fail,
    /// No forward progress within the inactivity timeout
    Timeout,
    /// Non-blocking call moved some but not all of the request
    Partial,
    /// Non-blocking call found nothing to read
    NoData,
}

impl CommsStatus {
    /// Numeric status code as exposed over C-style interfaces
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Fail => -1,
            Self::Timeout => -2,
            Self::Partial => -3,
            Self::NoData => -4,
        }
    }

    /// Status of a non-blocking pass that stopped early after `len` bytes
    pub(crate) const fn from_progress(len: usize) -> Self {
        if len == 0 {
            Self::NoData
        } else {
            Self::Partial
        }
    }
}

/// Status of a read together with the number of bytes placed in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    pub status: CommsStatus,
    /// Data bytes obtained, not counting the text sentinel
    pub len: usize,
}

impl ReadOutcome {
    pub const fn new(status: CommsStatus, len: usize) -> Self {
        Self { status, len }
    }

    pub(crate) const fn fail() -> Self {
        Self::new(CommsStatus::Fail, 0)
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self.status, CommsStatus::Ok)
    }

    /// The bytes this read placed in `buf`
    pub fn data<'b>(&self, buf: &'b [u8]) -> &'b [u8] {
        &buf[..self.len.min(buf.len())]
    }
}

/// Errors surfaced through the `embedded-io` traits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    /// Host closed the port or never opened it
    NotConnected,
    /// Device stack failure
    Device(DeviceError),
}

impl From<DeviceError> for CommsError {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

impl embedded_io::Error for CommsError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::NotConnected => embedded_io::ErrorKind::NotConnected,
            Self::Device(_) => embedded_io::ErrorKind::Other,
        }
    }
}

impl core::fmt::Display for CommsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotConnected => f.write_str("CDC channel not connected"),
            Self::Device(e) => write!(f, "CDC device error: {:?}", e),
        }
    }
}
