//! Line framing over the transport engine
//!
//! Text reads pull one byte per service call so each byte can be checked
//! for a CR/LF delimiter. The delimiter is consumed but not stored, and the
//! last slot of the caller's buffer is kept for the sentinel, so a buffer of
//! `n` bytes holds at most `n - 1` characters.

use log::{debug, trace};

use super::engine::UsbSerial;
use super::status::{CommsStatus, ReadOutcome};
use crate::config::line::{is_delimiter, SENTINEL};
use crate::device::{CdcDevice, Clock, Duration};

/// How a text read decides it is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Stop at CR or LF
    Line,
    /// Only stop when the buffer is full
    Raw,
}

impl Framing {
    fn ends_line(self, byte: u8) -> bool {
        self == Framing::Line && is_delimiter(byte)
    }
}

/// Length of the line at the start of `data`: up to the first CR, LF or
/// sentinel, or all of it.
pub fn line_len(data: &[u8]) -> usize {
    data.iter()
        .position(|&b| is_delimiter(b) || b == SENTINEL)
        .unwrap_or(data.len())
}

impl<D: CdcDevice, C: Clock> UsbSerial<D, C> {
    /// Read one line, waiting up to `timeout` between bytes.
    ///
    /// Returns `Ok` when a delimiter arrives or the buffer fills. `buf` is
    /// sentinel-terminated on every outcome except an entry `Fail`.
    pub fn read_line_blocking(&mut self, buf: &mut [u8], timeout: Duration) -> ReadOutcome {
        self.scan_blocking("read_line_blocking", buf, timeout, Framing::Line)
    }

    /// [`read_line_blocking`](Self::read_line_blocking) with the configured
    /// default timeout
    pub fn read_line(&mut self, buf: &mut [u8]) -> ReadOutcome {
        let timeout = self.config.default_timeout;
        self.read_line_blocking(buf, timeout)
    }

    /// Read one line from whatever is already queued.
    ///
    /// `NoData` if nothing was waiting, `Partial` if the bytes ran out
    /// before a delimiter, `Ok` on delimiter or full buffer.
    pub fn try_read_line(&mut self, buf: &mut [u8]) -> ReadOutcome {
        self.scan("try_read_line", buf, Framing::Line)
    }

    /// Read `buf.len() - 1` characters without looking for delimiters,
    /// waiting up to `timeout` between bytes.
    pub fn read_text_blocking(&mut self, buf: &mut [u8], timeout: Duration) -> ReadOutcome {
        self.scan_blocking("read_text_blocking", buf, timeout, Framing::Raw)
    }

    /// Read up to `buf.len() - 1` characters from whatever is already
    /// queued.
    pub fn try_read_text(&mut self, buf: &mut [u8]) -> ReadOutcome {
        self.scan("try_read_text", buf, Framing::Raw)
    }

    /// Write the line at the start of `data`, without its delimiter.
    pub fn write_line_blocking(&mut self, data: &[u8], timeout: Duration) -> usize {
        self.write_buffer_blocking(&data[..line_len(data)], timeout)
    }

    /// [`write_line_blocking`](Self::write_line_blocking) with the
    /// configured default timeout
    pub fn write_line(&mut self, data: &[u8]) -> usize {
        let timeout = self.config.default_timeout;
        self.write_line_blocking(data, timeout)
    }

    /// Write the line at the start of `data` without waiting for space.
    pub fn try_write_line(&mut self, data: &[u8]) -> usize {
        self.try_write_buffer(&data[..line_len(data)])
    }

    /// Write all of `s`, delimiters included.
    pub fn write_str_blocking(&mut self, s: &str, timeout: Duration) -> usize {
        self.write_buffer_blocking(s.as_bytes(), timeout)
    }

    /// [`write_str_blocking`](Self::write_str_blocking) with the configured
    /// default timeout
    pub fn write_str(&mut self, s: &str) -> usize {
        let timeout = self.config.default_timeout;
        self.write_str_blocking(s, timeout)
    }

    pub fn try_write_str(&mut self, s: &str) -> usize {
        self.try_write_buffer(s.as_bytes())
    }

    fn scan_blocking(
        &mut self,
        op: &str,
        buf: &mut [u8],
        timeout: Duration,
        framing: Framing,
    ) -> ReadOutcome {
        if !self.connected_for(op) {
            return ReadOutcome::fail();
        }
        let Some(capacity) = buf.len().checked_sub(1) else {
            return ReadOutcome::fail();
        };

        let mut len = 0;
        let mut last_progress = self.clock.now();

        let status = loop {
            if len == capacity {
                trace!("{}: buffer full at {} bytes", op, len);
                break CommsStatus::Ok;
            }

            self.device.service();

            if !self.device.is_connected() {
                debug!("{}: disconnected after {} bytes", op, len);
                break CommsStatus::Fail;
            }

            match self.take_byte() {
                Some(byte) if framing.ends_line(byte) => break CommsStatus::Ok,
                Some(byte) => {
                    buf[len] = byte;
                    len += 1;
                    last_progress = self.clock.now();
                }
                None => {
                    if self.inactive_for(last_progress, timeout) {
                        debug!("{}: timed out after {} bytes", op, len);
                        break CommsStatus::Timeout;
                    }
                }
            }
        };

        buf[len] = SENTINEL;
        ReadOutcome::new(status, len)
    }

    fn scan(&mut self, op: &str, buf: &mut [u8], framing: Framing) -> ReadOutcome {
        if !self.connected_for(op) {
            return ReadOutcome::fail();
        }
        let Some(capacity) = buf.len().checked_sub(1) else {
            return ReadOutcome::fail();
        };

        let mut len = 0;

        let status = loop {
            if len == capacity {
                trace!("{}: buffer full at {} bytes", op, len);
                break CommsStatus::Ok;
            }

            self.device.service();

            let next = if self.device.is_connected() {
                self.take_byte()
            } else {
                None
            };

            match next {
                Some(byte) if framing.ends_line(byte) => break CommsStatus::Ok,
                Some(byte) => {
                    buf[len] = byte;
                    len += 1;
                }
                None => break CommsStatus::from_progress(len),
            }
        };

        buf[len] = SENTINEL;
        ReadOutcome::new(status, len)
    }
}
