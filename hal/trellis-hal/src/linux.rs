//! Linux `/dev/i2c-N` transport
//!
//! Uses the kernel's i2c-dev character device through `i2cdev`. The slave
//! address is a property of the open file, so it is re-targeted whenever a
//! transfer addresses a different device.

use std::fmt;
use std::path::{Path, PathBuf};

use embedded_hal::i2c::ErrorKind;
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};

use crate::i2c::I2cBus;

/// Address the device file is opened with before any transfer
const PARKING_ADDRESS: u16 = 0x03;

/// Error reported by the character-device transport
///
/// The kernel only gives errno values, so every failure maps to
/// [`ErrorKind::Other`]; the message keeps the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxI2cError {
    message: String,
}

impl LinuxI2cError {
    /// Original error text
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LinuxI2cError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LinuxI2cError {}

impl embedded_hal::i2c::Error for LinuxI2cError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl From<LinuxI2CError> for LinuxI2cError {
    fn from(err: LinuxI2CError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// An open I2C character device
pub struct LinuxI2cBus {
    path: PathBuf,
    device: LinuxI2CDevice,
    address: u16,
}

impl LinuxI2cBus {
    /// Open the device file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LinuxI2cError> {
        let path = path.as_ref().to_path_buf();
        let device = LinuxI2CDevice::new(&path, PARKING_ADDRESS)?;
        log::debug!("opened {}", path.display());
        Ok(Self {
            path,
            device,
            address: PARKING_ADDRESS,
        })
    }

    /// Open `/dev/i2c-<index>`
    pub fn open_index(index: u8) -> Result<Self, LinuxI2cError> {
        Self::open(format!("/dev/i2c-{}", index))
    }

    /// Path of the device file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn target(&mut self, address: u8) -> Result<&mut LinuxI2CDevice, LinuxI2cError> {
        let address = u16::from(address);
        if self.address != address {
            self.device
                .set_slave_address(address)
                .map_err(|e| self.failure("set address", e))?;
            self.address = address;
        }
        Ok(&mut self.device)
    }

    fn failure(&self, op: &str, err: LinuxI2CError) -> LinuxI2cError {
        log::warn!(
            "{} {} at 0x{:02x} failed: {}",
            self.path.display(),
            op,
            self.address,
            err
        );
        err.into()
    }
}

impl fmt::Debug for LinuxI2cBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinuxI2cBus")
            .field("path", &self.path)
            .field("address", &self.address)
            .finish()
    }
}

impl I2cBus for LinuxI2cBus {
    type Error = LinuxI2cError;

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        let result = self.target(address)?.write(data);
        result.map_err(|e| self.failure("write", e))
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let result = self.target(address)?.read(buf);
        result.map_err(|e| self.failure("read", e))?;
        Ok(buf.len())
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        self.write(address, write_data)?;
        self.read(address, read_buf)
    }
}
