//! Register-oriented operations bound to one `(bus, address)` pair

use std::fmt;
use std::sync::{Arc, Mutex};

use embedded_hal::i2c::Error as _;
use trellis_hal::I2cBus;

use super::lock;
use crate::error::{Error, Result};

/// Largest data payload for block transfers
pub const MAX_BLOCK_LEN: usize = 32;

struct Binding<B> {
    bus: Arc<Mutex<B>>,
    bus_index: u8,
    address: u8,
}

/// Handle to one device on a shared bus
///
/// Cloning is cheap and yields the same connection. Each method is one
/// transaction under the bus mutex, so calls on one connection are applied
/// in call order and never interleave with other devices on the bus.
pub struct Connection<B> {
    inner: Arc<Binding<B>>,
}

impl<B> Clone for Connection<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> fmt::Debug for Connection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("bus", &self.inner.bus_index)
            .field("address", &format_args!("0x{:02X}", self.inner.address))
            .finish()
    }
}

impl<B> Connection<B> {
    /// Bind `address` on an open bus
    pub fn new(bus: Arc<Mutex<B>>, bus_index: u8, address: u8) -> Self {
        Self {
            inner: Arc::new(Binding {
                bus,
                bus_index,
                address,
            }),
        }
    }

    /// 7-bit slave address
    pub fn address(&self) -> u8 {
        self.inner.address
    }

    /// Bus index
    pub fn bus_index(&self) -> u8 {
        self.inner.bus_index
    }

    /// Whether `other` is a clone of this connection
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether both connections go through the same bus
    pub fn shares_bus_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner.bus, &other.inner.bus)
    }
}

impl<B: I2cBus> Connection<B> {
    fn transfer<R>(
        &self,
        op: &str,
        f: impl FnOnce(&mut B, u8) -> core::result::Result<R, B::Error>,
    ) -> Result<R> {
        let address = self.inner.address;
        let mut bus = lock(&self.inner.bus);
        f(&mut *bus, address).map_err(|e| {
            log::trace!("0x{:02X} {} failed: {:?}", address, op, e);
            Error::Io(e.kind())
        })
    }

    /// Write raw bytes, returns the count written
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        log::trace!("0x{:02X} write {:02X?}", self.address(), data);
        self.transfer("write", |bus, addr| bus.write(addr, data))?;
        Ok(data.len())
    }

    /// Read raw bytes, returns the count read
    ///
    /// Short reads are not an error here; the register helpers check them.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let n = self.transfer("read", |bus, addr| bus.read(addr, buf))?;
        log::trace!("0x{:02X} read {:02X?}", self.address(), &buf[..n.min(buf.len())]);
        Ok(n)
    }

    /// Write a single byte without a register
    pub fn write_byte(&self, value: u8) -> Result<()> {
        self.write(&[value]).map(|_| ())
    }

    /// Read a single byte without a register
    pub fn read_byte(&self) -> Result<u8> {
        let mut buf = [0u8; 1];
        let n = self.read(&mut buf)?;
        full(n, 1)?;
        Ok(buf[0])
    }

    /// Write `value` to register `reg`
    pub fn write_byte_data(&self, reg: u8, value: u8) -> Result<()> {
        self.write(&[reg, value]).map(|_| ())
    }

    /// Read register `reg`
    pub fn read_byte_data(&self, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.register_read(reg, &mut buf)?;
        Ok(buf[0])
    }

    /// Write a 16-bit word to `reg`, low byte first
    pub fn write_word_data(&self, reg: u8, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        self.write(&[reg, lo, hi]).map(|_| ())
    }

    /// Write a 16-bit word to `reg`, high byte first
    pub fn write_word_data_be(&self, reg: u8, value: u16) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        self.write(&[reg, hi, lo]).map(|_| ())
    }

    /// Read a 16-bit word from `reg`, low byte first
    pub fn read_word_data(&self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.register_read(reg, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Read a 16-bit word from `reg`, high byte first
    pub fn read_word_data_be(&self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.register_read(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Write `data` starting at `reg` in one transaction
    ///
    /// No count byte is sent; the device auto-increments its register
    /// pointer. At most [`MAX_BLOCK_LEN`] data bytes.
    pub fn write_block_data(&self, reg: u8, data: &[u8]) -> Result<()> {
        let mut frame: heapless::Vec<u8, { MAX_BLOCK_LEN + 1 }> = heapless::Vec::new();
        // Register byte always fits
        let _ = frame.push(reg);
        frame.extend_from_slice(data).map_err(|_| {
            Error::invalid(format!(
                "block of {} bytes exceeds {}",
                data.len(),
                MAX_BLOCK_LEN
            ))
        })?;
        self.write(&frame).map(|_| ())
    }

    /// Fill `buf` from registers starting at `reg`
    ///
    /// At most [`MAX_BLOCK_LEN`] bytes. Returns the count read, which is
    /// always `buf.len()` on success.
    pub fn read_block_data(&self, reg: u8, buf: &mut [u8]) -> Result<usize> {
        if buf.len() > MAX_BLOCK_LEN {
            return Err(Error::invalid(format!(
                "block of {} bytes exceeds {}",
                buf.len(),
                MAX_BLOCK_LEN
            )));
        }
        self.register_read(reg, buf)?;
        Ok(buf.len())
    }

    fn register_read(&self, reg: u8, buf: &mut [u8]) -> Result<()> {
        let n = self.transfer("register read", |bus, addr| bus.write_read(addr, &[reg], buf))?;
        log::trace!(
            "0x{:02X} reg 0x{:02X} read {:02X?}",
            self.address(),
            reg,
            &buf[..n.min(buf.len())]
        );
        full(n, buf.len())
    }
}

fn full(read: usize, expected: usize) -> Result<()> {
    if read < expected {
        Err(Error::NotEnoughBytes { read, expected })
    } else {
        Ok(())
    }
}
