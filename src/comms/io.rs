//! embedded_io implementations for [`UsbSerial`].
//!
//! `embedded-io` requires reads and writes to block until at least one byte
//! moves, so these spin on the quick calls and only give up when the host
//! closes the port or the device stack reports an error.

use embedded_io::{ErrorType, Read, ReadReady, Write, WriteReady};

use super::engine::UsbSerial;
use super::status::{CommsError, CommsStatus};
use crate::device::{CdcDevice, Clock};

impl<D: CdcDevice, C: Clock> ErrorType for UsbSerial<D, C> {
    type Error = CommsError;
}

impl<D: CdcDevice, C: Clock> Read for UsbSerial<D, C> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let outcome = self.try_read_buffer_quick(buf);
            if outcome.len > 0 {
                return Ok(outcome.len);
            }
            if let Some(e) = self.device.take_error() {
                return Err(CommsError::Device(e));
            }
            if outcome.status == CommsStatus::Fail {
                return Err(CommsError::NotConnected);
            }
        }
    }
}

impl<D: CdcDevice, C: Clock> ReadReady for UsbSerial<D, C> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if !self.device.is_connected() {
            return Err(CommsError::NotConnected);
        }
        self.device.service();
        Ok(self.device.bytes_available() != 0)
    }
}

impl<D: CdcDevice, C: Clock> Write for UsbSerial<D, C> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let n = self.try_write_buffer_quick(buf);
            if n > 0 {
                return Ok(n);
            }
            if let Some(e) = self.device.take_error() {
                return Err(CommsError::Device(e));
            }
            if !self.device.is_connected() {
                return Err(CommsError::NotConnected);
            }
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if !self.device.is_connected() {
            return Err(CommsError::NotConnected);
        }
        self.device.flush();
        match self.device.take_error() {
            Some(e) => Err(CommsError::Device(e)),
            None => Ok(()),
        }
    }
}

impl<D: CdcDevice, C: Clock> WriteReady for UsbSerial<D, C> {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        if !self.device.is_connected() {
            return Err(CommsError::NotConnected);
        }
        Ok(self.device.write_space_available() != 0)
    }
}
