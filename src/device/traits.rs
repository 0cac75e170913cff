//! USB CDC device stack trait for abstraction and testability
//!
//! These traits define the interface the transport needs from the
//! underlying device stack and from a monotonic time source, allowing the
//! real USB driver to be swapped with a mock for testing.

/// Microsecond instant used for inactivity deadlines
pub type Instant = fugit::TimerInstantU64<1_000_000>;

/// Microsecond duration used for timeouts
pub type Duration = fugit::MicrosDurationU64;

/// Errors reported by the device stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// Device stack could not be brought up
    InitFailed,
    /// Error reported by the USB peripheral or class driver
    Usb,
}

/// Byte-oriented FIFO view of a CDC serial channel
///
/// None of these calls block. The stack only moves bytes between the
/// hardware and its FIFOs inside [`service`](CdcDevice::service), so callers
/// that poll must service it on every iteration.
pub trait CdcDevice {
    /// One-time bring-up. Calling it again on an initialised stack returns
    /// the same result as the first call.
    fn initialize(&mut self) -> Result<(), DeviceError>;

    /// True while the host has the port open
    fn is_connected(&self) -> bool;

    /// Number of inbound bytes waiting in the FIFO
    fn bytes_available(&self) -> usize;

    /// Number of bytes the outbound FIFO can accept right now
    fn write_space_available(&self) -> usize;

    /// Pop a single inbound byte, if any
    fn read_byte(&mut self) -> Option<u8>;

    /// Pop up to `buf.len()` inbound bytes, returning how many were copied
    fn read_block(&mut self, buf: &mut [u8]) -> usize;

    /// Queue up to `data.len()` outbound bytes, returning how many were taken
    fn write_block(&mut self, data: &[u8]) -> usize;

    /// Push queued outbound bytes towards the host
    fn flush(&mut self);

    /// Run the device stack's task processing
    fn service(&mut self);

    /// Take the last error the stack hit while moving bytes, if any
    fn take_error(&mut self) -> Option<DeviceError> {
        None
    }
}

impl<D: CdcDevice + ?Sized> CdcDevice for &mut D {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        (**self).initialize()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn bytes_available(&self) -> usize {
        (**self).bytes_available()
    }

    fn write_space_available(&self) -> usize {
        (**self).write_space_available()
    }

    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }

    fn read_block(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_block(buf)
    }

    fn write_block(&mut self, data: &[u8]) -> usize {
        (**self).write_block(data)
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn service(&mut self) {
        (**self).service()
    }

    fn take_error(&mut self) -> Option<DeviceError> {
        (**self).take_error()
    }
}

/// Monotonic time source
pub trait Clock {
    /// Current time since boot
    fn now(&mut self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &mut C {
    fn now(&mut self) -> Instant {
        (**self).now()
    }
}
