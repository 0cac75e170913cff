//! Polling transport engine
//!
//! Buffer-oriented reads and writes over a [`CdcDevice`]. Every loop
//! iteration services the device stack before looking at the FIFOs, and
//! blocking calls measure their timeout from the last time any bytes moved.

use log::{debug, trace, warn};

use super::status::{CommsStatus, ReadOutcome};
use crate::config::CommsConfig;
use crate::device::{CdcDevice, Clock, DeviceError, Duration, Instant};

/// Serial transport over a polled USB CDC device
pub struct UsbSerial<D, C> {
    pub(super) device: D,
    pub(super) clock: C,
    pub(super) config: CommsConfig,
}

impl<D: CdcDevice, C: Clock> UsbSerial<D, C> {
    /// Create a transport with the default configuration
    pub fn new(device: D, clock: C) -> Self {
        Self::with_config(device, clock, CommsConfig::default())
    }

    pub fn with_config(device: D, clock: C, config: CommsConfig) -> Self {
        Self {
            device,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CommsConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CommsConfig) {
        self.config = config;
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Give back the device and clock
    pub fn release(self) -> (D, C) {
        (self.device, self.clock)
    }

    /// Bring up the device stack. Safe to call more than once.
    pub fn init(&mut self) -> Result<(), DeviceError> {
        match self.device.initialize() {
            Ok(()) => {
                debug!("USB CDC initialised");
                Ok(())
            }
            Err(e) => {
                warn!("USB CDC init failed ({:?})", e);
                Err(e)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_connected()
    }

    /// Entry check shared by every operation
    pub(super) fn connected_for(&self, op: &str) -> bool {
        if self.device.is_connected() {
            true
        } else {
            trace!("{}: not connected", op);
            false
        }
    }

    /// True once `timeout` has passed since `last_progress`
    pub(super) fn inactive_for(&mut self, last_progress: Instant, timeout: Duration) -> bool {
        self.clock
            .now()
            .checked_duration_since(last_progress)
            .is_some_and(|idle| idle >= timeout)
    }

    /// Pop one inbound byte if the FIFO holds any. Does not service.
    pub(super) fn take_byte(&mut self) -> Option<u8> {
        if self.device.bytes_available() == 0 {
            return None;
        }
        self.device.read_byte()
    }

    /// Read exactly `buf.len()` bytes, waiting up to `timeout` of
    /// inactivity.
    ///
    /// On `Timeout` the bytes gathered so far stay in `buf` and are
    /// reported in `len`.
    pub fn read_buffer_blocking(&mut self, buf: &mut [u8], timeout: Duration) -> ReadOutcome {
        if !self.connected_for("read_buffer_blocking") || buf.is_empty() {
            return ReadOutcome::fail();
        }

        let mut len = 0;
        let mut last_progress = self.clock.now();

        while len < buf.len() {
            self.device.service();

            if !self.device.is_connected() {
                debug!("read_buffer_blocking: disconnected after {} bytes", len);
                return ReadOutcome::new(CommsStatus::Fail, len);
            }

            let available = self.device.bytes_available();
            if available > 0 {
                let want = available.min(buf.len() - len);
                let n = self.device.read_block(&mut buf[len..len + want]);
                if n > 0 {
                    len += n;
                    last_progress = self.clock.now();
                    continue;
                }
            }

            if self.inactive_for(last_progress, timeout) {
                debug!("read_buffer_blocking: timed out after {} bytes", len);
                return ReadOutcome::new(CommsStatus::Timeout, len);
            }
        }

        ReadOutcome::new(CommsStatus::Ok, len)
    }

    /// [`read_buffer_blocking`](Self::read_buffer_blocking) with the
    /// configured default timeout
    pub fn read_buffer(&mut self, buf: &mut [u8]) -> ReadOutcome {
        let timeout = self.config.default_timeout;
        self.read_buffer_blocking(buf, timeout)
    }

    /// Read whatever arrives until the inbound FIFO runs dry or `buf` is
    /// full.
    pub fn try_read_buffer(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if !self.connected_for("try_read_buffer") || buf.is_empty() {
            return ReadOutcome::fail();
        }

        let mut len = 0;
        while len < buf.len() {
            self.device.service();

            let available = if self.device.is_connected() {
                self.device.bytes_available()
            } else {
                0
            };
            if available == 0 {
                return ReadOutcome::new(CommsStatus::from_progress(len), len);
            }

            let want = available.min(buf.len() - len);
            let n = self.device.read_block(&mut buf[len..len + want]);
            if n == 0 {
                return ReadOutcome::new(CommsStatus::from_progress(len), len);
            }
            len += n;
        }

        ReadOutcome::new(CommsStatus::Ok, len)
    }

    /// Single pass: one service call, one availability check, one copy.
    pub fn try_read_buffer_quick(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if !self.connected_for("try_read_buffer_quick") || buf.is_empty() {
            return ReadOutcome::fail();
        }

        self.device.service();

        let available = self.device.bytes_available();
        if available == 0 {
            return ReadOutcome::new(CommsStatus::NoData, 0);
        }

        let want = available.min(buf.len());
        let n = self.device.read_block(&mut buf[..want]);
        let status = if n == buf.len() {
            CommsStatus::Ok
        } else {
            CommsStatus::from_progress(n)
        };
        ReadOutcome::new(status, n)
    }

    /// Write all of `data`, waiting up to `timeout` of inactivity.
    ///
    /// Returns the number of bytes handed to the device stack.
    pub fn write_buffer_blocking(&mut self, data: &[u8], timeout: Duration) -> usize {
        if !self.connected_for("write_buffer_blocking") {
            return 0;
        }

        let mut written = 0;
        let mut last_progress = self.clock.now();

        while written < data.len() {
            self.device.service();

            if !self.device.is_connected() {
                debug!("write_buffer_blocking: disconnected after {} bytes", written);
                break;
            }

            let space = self.device.write_space_available();
            if space > 0 {
                let want = space.min(data.len() - written);
                let n = self.device.write_block(&data[written..written + want]);
                if n > 0 {
                    self.device.flush();
                    written += n;
                    last_progress = self.clock.now();
                    continue;
                }
            }

            if self.inactive_for(last_progress, timeout) {
                debug!("write_buffer_blocking: timed out after {} bytes", written);
                break;
            }
        }

        written
    }

    /// [`write_buffer_blocking`](Self::write_buffer_blocking) with the
    /// configured default timeout
    pub fn write_buffer(&mut self, data: &[u8]) -> usize {
        let timeout = self.config.default_timeout;
        self.write_buffer_blocking(data, timeout)
    }

    /// Write until the outbound FIFO stops accepting bytes.
    pub fn try_write_buffer(&mut self, data: &[u8]) -> usize {
        if !self.connected_for("try_write_buffer") {
            return 0;
        }

        let mut written = 0;
        while written < data.len() {
            self.device.service();

            if !self.device.is_connected() {
                break;
            }

            let space = self.device.write_space_available();
            if space == 0 {
                break;
            }

            let want = space.min(data.len() - written);
            let n = self.device.write_block(&data[written..written + want]);
            if n == 0 {
                break;
            }
            self.device.flush();
            written += n;
        }

        written
    }

    /// Single pass: push as much as the outbound FIFO holds right now.
    pub fn try_write_buffer_quick(&mut self, data: &[u8]) -> usize {
        if !self.connected_for("try_write_buffer_quick") || data.is_empty() {
            return 0;
        }

        self.device.service();

        let space = self.device.write_space_available();
        if space == 0 {
            return 0;
        }

        let n = self.device.write_block(&data[..space.min(data.len())]);
        if n > 0 {
            self.device.flush();
        }
        n
    }

    /// Service the stack once and pop a single byte, if one is waiting.
    pub fn try_read_byte(&mut self) -> Option<u8> {
        if !self.connected_for("try_read_byte") {
            return None;
        }

        self.device.service();
        self.take_byte()
    }

    /// Service the stack once and queue a single byte, if there is room.
    pub fn try_write_byte(&mut self, byte: u8) -> bool {
        self.try_write_buffer_quick(&[byte]) == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::traits::mock::{init_logging, MockCdcDevice, MockClock};

    type TestSerial = UsbSerial<MockCdcDevice, MockClock>;

    /// Clock advances 100us on every reading
    fn serial(device: MockCdcDevice) -> TestSerial {
        init_logging();
        UsbSerial::new(device, MockClock::new(Duration::micros(100)))
    }

    fn ms(ms: u64) -> Duration {
        Duration::millis(ms)
    }

    #[test]
    fn test_disconnected_fails_without_servicing() {
        let mut serial = serial(MockCdcDevice::disconnected());
        let mut buf = [0xAAu8; 8];

        assert_eq!(
            serial.read_buffer_blocking(&mut buf, ms(10)),
            ReadOutcome::new(CommsStatus::Fail, 0)
        );
        assert_eq!(serial.try_read_buffer(&mut buf).status, CommsStatus::Fail);
        assert_eq!(serial.try_read_buffer_quick(&mut buf).status, CommsStatus::Fail);
        assert_eq!(serial.write_buffer_blocking(b"hello", ms(10)), 0);
        assert_eq!(serial.try_write_buffer(b"hello"), 0);
        assert_eq!(serial.try_write_buffer_quick(b"hello"), 0);
        assert_eq!(serial.try_read_byte(), None);
        assert!(!serial.try_write_byte(b'x'));

        assert_eq!(buf, [0xAA; 8]);
        assert_eq!(serial.device().service_calls(), 0);
        assert!(serial.device().tx_data().is_empty());
    }

    #[test]
    fn test_empty_buffer_read_fails() {
        let mut serial = serial(MockCdcDevice::new());
        let mut buf = [0u8; 0];

        assert_eq!(serial.read_buffer_blocking(&mut buf, ms(10)).status, CommsStatus::Fail);
        assert_eq!(serial.try_read_buffer(&mut buf).status, CommsStatus::Fail);
        assert_eq!(serial.try_read_buffer_quick(&mut buf).status, CommsStatus::Fail);
    }

    #[test]
    fn test_blocking_read_complete() {
        let mut device = MockCdcDevice::new();
        device.queue_rx_data(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        let mut serial = serial(device);

        let mut buf = [0u8; 4];
        let outcome = serial.read_buffer_blocking(&mut buf, ms(10));

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Ok, 4));
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04]);
        // Never reads past the request
        assert_eq!(serial.device().rx_pending(), 1);
    }

    #[test]
    fn test_blocking_read_gathers_across_service_calls() {
        let mut device = MockCdcDevice::new();
        device.schedule_rx_data(3, b"ab");
        device.schedule_rx_data(6, b"cd");
        let mut serial = serial(device);

        let mut buf = [0u8; 4];
        let outcome = serial.read_buffer_blocking(&mut buf, ms(10));

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Ok, 4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(serial.device().service_calls(), 6);
    }

    #[test]
    fn test_blocking_read_timeout_keeps_partial_count() {
        let mut device = MockCdcDevice::new();
        device.queue_rx_data(b"abc");
        let mut serial = serial(device);

        let mut buf = [0u8; 8];
        let outcome = serial.read_buffer_blocking(&mut buf, ms(1));

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Timeout, 3));
        assert_eq!(outcome.data(&buf), b"abc");
    }

    #[test]
    fn test_blocking_read_stall_after_progress_times_out() {
        let mut device = MockCdcDevice::new();
        device.schedule_rx_data(2, b"a");
        device.schedule_rx_data(1000, b"b");
        let mut serial = serial(device);

        let mut buf = [0u8; 2];
        let outcome = serial.read_buffer_blocking(&mut buf, ms(1));

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Timeout, 1));
        assert!(serial.device().service_calls() < 1000);
    }

    #[test]
    fn test_blocking_read_timeout_measures_inactivity() {
        let mut device = MockCdcDevice::new();
        // One byte every fifth service call, roughly 500us apart
        for i in 0..20u8 {
            device.schedule_rx_data(5 * (u32::from(i) + 1), &[i]);
        }
        let mut serial = serial(device);

        let mut buf = [0u8; 20];
        let outcome = serial.read_buffer_blocking(&mut buf, ms(1));

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Ok, 20));
        assert_eq!(buf[19], 19);
        // Total call time is well past the timeout
        assert!(serial.clock().elapsed() > ms(5));
    }

    #[test]
    fn test_blocking_read_disconnect_mid_call() {
        let mut device = MockCdcDevice::new();
        device.schedule_rx_data(1, b"ab");
        device.disconnect_at_service(3);
        let mut serial = serial(device);

        let mut buf = [0u8; 8];
        let outcome = serial.read_buffer_blocking(&mut buf, ms(100));

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Fail, 2));
    }

    #[test]
    fn test_try_read_no_data() {
        let mut serial = serial(MockCdcDevice::new());

        let mut buf = [0u8; 8];
        let outcome = serial.try_read_buffer(&mut buf);

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::NoData, 0));
        assert_eq!(buf, [0u8; 8]);
        assert_eq!(serial.device().service_calls(), 1);
    }

    #[test]
    fn test_try_read_converges_to_ok() {
        let mut serial = serial(MockCdcDevice::new());
        let mut buf = [0u8; 6];

        serial.device_mut().queue_rx_data(b"abc");
        let first = serial.try_read_buffer(&mut buf);
        assert_eq!(first, ReadOutcome::new(CommsStatus::Partial, 3));

        // Nothing new arrived
        let idle = serial.try_read_buffer(&mut buf[first.len..]);
        assert_eq!(idle, ReadOutcome::new(CommsStatus::NoData, 0));

        serial.device_mut().queue_rx_data(b"defgh");
        let second = serial.try_read_buffer(&mut buf[first.len..]);
        assert_eq!(second, ReadOutcome::new(CommsStatus::Ok, 3));
        assert_eq!(&buf, b"abcdef");
        assert_eq!(serial.device().rx_pending(), 2);
    }

    #[test]
    fn test_try_read_drains_data_arriving_mid_pass() {
        let mut device = MockCdcDevice::new();
        device.schedule_rx_data(1, b"ab");
        device.schedule_rx_data(2, b"cd");
        let mut serial = serial(device);

        let mut buf = [0u8; 8];
        let outcome = serial.try_read_buffer(&mut buf);

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Partial, 4));
        assert_eq!(outcome.data(&buf), b"abcd");
        assert_eq!(serial.device().service_calls(), 3);
    }

    #[test]
    fn test_quick_read_single_pass() {
        let mut device = MockCdcDevice::new();
        device.queue_rx_data(&[1, 2, 3, 4, 5]);
        device.schedule_rx_data(2, &[6, 7, 8, 9, 10]);
        let mut serial = serial(device);

        let mut buf = [0u8; 10];
        let outcome = serial.try_read_buffer_quick(&mut buf);

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Partial, 5));
        assert_eq!(outcome.data(&buf), &[1, 2, 3, 4, 5]);
        assert_eq!(serial.device().service_calls(), 1);
    }

    #[test]
    fn test_quick_read_full_and_empty() {
        let mut device = MockCdcDevice::new();
        device.queue_rx_data(b"xyz!");
        let mut serial = serial(device);

        let mut buf = [0u8; 3];
        assert_eq!(
            serial.try_read_buffer_quick(&mut buf),
            ReadOutcome::new(CommsStatus::Ok, 3)
        );
        assert_eq!(&buf, b"xyz");

        let mut buf = [0u8; 3];
        assert_eq!(
            serial.try_read_buffer_quick(&mut buf),
            ReadOutcome::new(CommsStatus::Partial, 1)
        );
        assert_eq!(
            serial.try_read_buffer_quick(&mut buf),
            ReadOutcome::new(CommsStatus::NoData, 0)
        );
    }

    #[test]
    fn test_blocking_write_flushes_each_chunk() {
        let mut device = MockCdcDevice::new();
        device.set_tx_space_per_service(4);
        let mut serial = serial(device);

        let written = serial.write_buffer_blocking(b"hello world", ms(10));

        assert_eq!(written, 11);
        assert_eq!(serial.device().tx_data(), b"hello world");
        assert_eq!(serial.device().flush_calls(), 3);
    }

    #[test]
    fn test_blocking_write_timeout_returns_progress() {
        let mut device = MockCdcDevice::new();
        device.set_tx_space(5);
        let mut serial = serial(device);

        let written = serial.write_buffer_blocking(b"hello world", ms(1));

        assert_eq!(written, 5);
        assert_eq!(serial.device().tx_data(), b"hello");
    }

    #[test]
    fn test_blocking_write_timeout_measures_inactivity() {
        let mut device = MockCdcDevice::new();
        device.set_tx_space_per_service(1);
        let mut serial = serial(device);

        let data = [0x5Au8; 30];
        let written = serial.write_buffer_blocking(&data, ms(1));

        assert_eq!(written, 30);
        assert_eq!(serial.device().tx_data(), &data[..]);
        // Total call time is well past the timeout
        assert!(serial.clock().elapsed() > ms(2));
    }

    #[test]
    fn test_blocking_write_disconnect_mid_call() {
        let mut device = MockCdcDevice::new();
        device.set_tx_space_per_service(2);
        device.disconnect_at_service(3);
        let mut serial = serial(device);

        let written = serial.write_buffer_blocking(b"hello world", ms(100));

        assert_eq!(written, 4);
        assert_eq!(serial.device().tx_data(), b"hell");
        assert_eq!(serial.device().service_calls(), 3);
    }

    #[test]
    fn test_try_read_disconnect_mid_pass() {
        let mut device = MockCdcDevice::new();
        device.schedule_rx_data(1, b"ab");
        device.schedule_rx_data(2, b"cd");
        device.disconnect_at_service(2);
        let mut serial = serial(device);

        let mut buf = [0u8; 8];
        let outcome = serial.try_read_buffer(&mut buf);

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Partial, 2));
        assert_eq!(outcome.data(&buf), b"ab");

        // Bytes that arrived as the host dropped are still there on reconnect
        serial.device_mut().set_connected(true);
        let outcome = serial.try_read_buffer(&mut buf);
        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Partial, 2));
        assert_eq!(outcome.data(&buf), b"cd");
    }

    #[test]
    fn test_try_write_stops_when_space_exhausted() {
        let mut device = MockCdcDevice::new();
        device.set_tx_space(3);
        let mut serial = serial(device);

        assert_eq!(serial.try_write_buffer(b"hello"), 3);
        assert_eq!(serial.device().tx_data(), b"hel");
        assert_eq!(serial.try_write_buffer(b"lo"), 0);
    }

    #[test]
    fn test_try_write_uses_space_freed_by_service() {
        let mut device = MockCdcDevice::new();
        device.set_tx_space_per_service(2);
        let mut serial = serial(device);

        assert_eq!(serial.try_write_buffer(b"hello"), 5);
        assert_eq!(serial.device().tx_data(), b"hello");
    }

    #[test]
    fn test_quick_write_single_pass() {
        let mut device = MockCdcDevice::new();
        device.set_tx_space_per_service(4);
        let mut serial = serial(device);

        assert_eq!(serial.try_write_buffer_quick(b"hello"), 4);
        assert_eq!(serial.device().tx_data(), b"hell");
        assert_eq!(serial.device().service_calls(), 1);
        assert_eq!(serial.device().flush_calls(), 1);
    }

    #[test]
    fn test_byte_primitives() {
        let mut device = MockCdcDevice::new();
        device.queue_rx_data(b"q");
        let mut serial = serial(device);

        assert_eq!(serial.try_read_byte(), Some(b'q'));
        assert_eq!(serial.try_read_byte(), None);

        assert!(serial.try_write_byte(b'z'));
        assert_eq!(serial.device().tx_data(), b"z");
    }

    #[test]
    fn test_init_idempotent() {
        let mut serial = serial(MockCdcDevice::new());

        assert_eq!(serial.init(), Ok(()));
        assert_eq!(serial.init(), Ok(()));
        assert!(serial.device().is_initialised());
    }

    #[test]
    fn test_init_failure() {
        let mut device = MockCdcDevice::new();
        device.fail_init();
        let mut serial = serial(device);

        assert_eq!(serial.init(), Err(DeviceError::InitFailed));
        assert_eq!(serial.init(), Err(DeviceError::InitFailed));
    }

    #[test]
    fn test_default_timeout_from_config() {
        let mut device = MockCdcDevice::new();
        device.queue_rx_data(b"ab");
        let mut serial = UsbSerial::with_config(
            device,
            MockClock::new(Duration::micros(100)),
            CommsConfig {
                default_timeout: ms(2),
            },
        );

        let mut buf = [0u8; 4];
        let outcome = serial.read_buffer(&mut buf);

        assert_eq!(outcome, ReadOutcome::new(CommsStatus::Timeout, 2));
        assert!(serial.clock().elapsed() >= ms(2));
    }
}
