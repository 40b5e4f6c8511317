//! Adapter for `embedded-hal` I2C peripherals
//!
//! Any controller implementing [`embedded_hal::i2c::I2c`] (chip HALs,
//! bit-banged buses, shared-bus proxies) can back a Trellis bus.

use embedded_hal::i2c::I2c;

use crate::i2c::I2cBus;

/// Wraps an `embedded_hal::i2c::I2c` implementation
///
/// `embedded-hal` transfers either fill the whole buffer or fail, so reads
/// always report the full buffer length.
#[derive(Debug)]
pub struct EmbeddedHalBus<T> {
    inner: T,
}

impl<T: I2c> EmbeddedHalBus<T> {
    /// Wrap an I2C peripheral
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Get the wrapped peripheral back
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: I2c> I2cBus for EmbeddedHalBus<T> {
    type Error = T::Error;

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        self.inner.write(address, data)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.inner.read(address, buf)?;
        Ok(buf.len())
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        self.inner.write_read(address, write_data, read_buf)?;
        Ok(read_buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    #[derive(Debug)]
    struct Fault;

    impl embedded_hal::i2c::Error for Fault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Bus
        }
    }

    /// Echoes the last written byte back on reads
    struct Loopback {
        last: u8,
        fail: bool,
    }

    impl ErrorType for Loopback {
        type Error = Fault;
    }

    impl I2c for Loopback {
        fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail {
                return Err(Fault);
            }
            for op in operations {
                match op {
                    Operation::Write(data) => {
                        if let Some(b) = data.last() {
                            self.last = *b;
                        }
                    }
                    Operation::Read(buf) => buf.fill(self.last),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_reads_report_full_length() {
        let mut bus = EmbeddedHalBus::new(Loopback {
            last: 0,
            fail: false,
        });
        let mut buf = [0u8; 3];

        assert_eq!(bus.write_read(0x40, &[0x5A], &mut buf).unwrap(), 3);
        assert_eq!(buf, [0x5A; 3]);
        assert_eq!(bus.read(0x40, &mut buf[..2]).unwrap(), 2);
    }

    #[test]
    fn test_errors_pass_through() {
        let mut bus = EmbeddedHalBus::new(Loopback {
            last: 0,
            fail: true,
        });

        let err = bus.write(0x40, &[0x00]).unwrap_err();
        assert_eq!(embedded_hal::i2c::Error::kind(&err), ErrorKind::Bus);
    }
}
