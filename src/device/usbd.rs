//! [`CdcDevice`] backed by `usb-device` and `usbd-serial`.
//!
//! `SerialPort` only offers packet-sized reads and writes, so inbound and
//! outbound bytes are staged in fixed queues that can report how much data
//! or space is available between service calls.

use heapless::Deque;
use log::{debug, warn};
use usb_device::bus::UsbBus;
use usb_device::device::{UsbDevice, UsbDeviceState};
use usb_device::UsbError;
use usbd_serial::SerialPort;

use super::traits::{CdcDevice, DeviceError};
use crate::config::usbd::{MAX_PACKET_SIZE, RX_STAGING_SIZE, TX_STAGING_SIZE};

/// CDC-ACM serial port on a `usb-device` bus
pub struct UsbdCdcDevice<'a, B: UsbBus> {
    device: UsbDevice<'a, B>,
    serial: SerialPort<'a, B>,
    rx: Deque<u8, RX_STAGING_SIZE>,
    tx: Deque<u8, TX_STAGING_SIZE>,
    initialised: bool,
    last_error: Option<DeviceError>,
}

impl<'a, B: UsbBus> UsbdCdcDevice<'a, B> {
    /// Wrap an already built device and its serial class
    pub fn new(device: UsbDevice<'a, B>, serial: SerialPort<'a, B>) -> Self {
        Self {
            device,
            serial,
            rx: Deque::new(),
            tx: Deque::new(),
            initialised: false,
            last_error: None,
        }
    }

    /// Give back the device and class, dropping anything still staged
    pub fn release(self) -> (UsbDevice<'a, B>, SerialPort<'a, B>) {
        (self.device, self.serial)
    }

    /// Move received packets from the class into the inbound queue
    fn pull_inbound(&mut self) {
        let mut packet = [0u8; MAX_PACKET_SIZE];

        loop {
            let room = self.rx.capacity() - self.rx.len();
            if room == 0 {
                break;
            }

            let want = room.min(packet.len());
            match self.serial.read(&mut packet[..want]) {
                Ok(0) | Err(UsbError::WouldBlock) => break,
                Ok(n) => {
                    for &byte in &packet[..n] {
                        let _ = self.rx.push_back(byte);
                    }
                }
                Err(e) => {
                    warn!("usbd: read failed ({:?})", e);
                    self.last_error = Some(DeviceError::Usb);
                    break;
                }
            }
        }
    }

    /// Hand as much of the outbound queue to the class as it accepts
    fn push_outbound(&mut self) {
        while !self.tx.is_empty() {
            let (front, _) = self.tx.as_slices();
            match self.serial.write(front) {
                Ok(0) | Err(UsbError::WouldBlock) => break,
                Ok(n) => {
                    for _ in 0..n {
                        self.tx.pop_front();
                    }
                }
                Err(e) => {
                    warn!("usbd: write failed ({:?})", e);
                    self.last_error = Some(DeviceError::Usb);
                    break;
                }
            }
        }
    }
}

impl<B: UsbBus> CdcDevice for UsbdCdcDevice<'_, B> {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        if !self.initialised {
            self.rx.clear();
            self.tx.clear();
            self.initialised = true;
            debug!("usbd: CDC device initialised");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.device.state() == UsbDeviceState::Configured && self.serial.dtr()
    }

    fn bytes_available(&self) -> usize {
        self.rx.len()
    }

    fn write_space_available(&self) -> usize {
        if !self.is_connected() {
            return 0;
        }
        self.tx.capacity() - self.tx.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn read_block(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        while count < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    fn write_block(&mut self, data: &[u8]) -> usize {
        let mut count = 0;
        for &byte in data {
            if self.tx.push_back(byte).is_err() {
                break;
            }
            count += 1;
        }
        count
    }

    fn flush(&mut self) {
        self.push_outbound();

        match self.serial.flush() {
            Ok(()) | Err(UsbError::WouldBlock) => {}
            Err(e) => {
                warn!("usbd: flush failed ({:?})", e);
                self.last_error = Some(DeviceError::Usb);
            }
        }
    }

    fn service(&mut self) {
        self.device.poll(&mut [&mut self.serial]);
        self.pull_inbound();
        self.push_outbound();
    }

    fn take_error(&mut self) -> Option<DeviceError> {
        self.last_error.take()
    }
}
