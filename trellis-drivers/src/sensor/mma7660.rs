//! MMA7660FC 3-axis orientation/motion sensor
//!
//! Axis registers hold 6-bit two's complement counts (about 21.33 counts
//! per g). Bit 6 of an axis register is the alert flag: the value was read
//! while the device was updating it and must be read again.

use std::sync::Arc;

use trellis_core::bits::twos_complement;
use trellis_core::{BaseOptions, Connector, Driver, DriverBase, DriverBuilder, Error, Result};

/// Fixed 7-bit address
pub const DEFAULT_ADDRESS: u8 = 0x4C;

/// Counts per g at the ±1.5 g range
pub const COUNTS_PER_G: f64 = 21.33;

/// MMA7660 registers
pub mod reg {
    pub const XOUT: u8 = 0x00;
    pub const YOUT: u8 = 0x01;
    pub const ZOUT: u8 = 0x02;
    pub const TILT: u8 = 0x03;
    pub const MODE: u8 = 0x07;
    /// Auto-wake/sleep sample rates
    pub const SR: u8 = 0x08;
}

/// MODE register values
pub mod mode {
    pub const STANDBY: u8 = 0x00;
    pub const ACTIVE: u8 = 0x01;
}

/// Sample rate codes for SR (samples per second in active mode)
pub mod rate {
    pub const SPS_120: u8 = 0x00;
    pub const SPS_64: u8 = 0x01;
    pub const SPS_32: u8 = 0x02;
    pub const SPS_16: u8 = 0x03;
    pub const SPS_8: u8 = 0x04;
    pub const SPS_4: u8 = 0x05;
    pub const SPS_2: u8 = 0x06;
    pub const SPS_1: u8 = 0x07;
}

/// Axis alert flag
const ALERT: u8 = 0x40;

/// Convert raw counts to g
pub fn acceleration(x: i8, y: i8, z: i8) -> (f64, f64, f64) {
    (
        f64::from(x) / COUNTS_PER_G,
        f64::from(y) / COUNTS_PER_G,
        f64::from(z) / COUNTS_PER_G,
    )
}

fn decode(raw: u8) -> i8 {
    twos_complement(u32::from(raw & 0x3F), 6) as i8
}

/// MMA7660 driver
pub struct Mma7660<C: Connector> {
    base: DriverBase<C, ()>,
    sample_rate: u8,
}

/// Builder for [`Mma7660`]
pub struct Mma7660Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
    sample_rate: u8,
}

impl<C> DriverBuilder for Mma7660Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Mma7660Builder<C> {
    /// Active-mode sample rate code, see [`rate`]
    pub fn sample_rate(mut self, code: u8) -> Result<Self> {
        if code > rate::SPS_1 {
            return Err(Error::invalid(format!("sample rate code 0x{:02X} above 0x07", code)));
        }
        self.sample_rate = code;
        Ok(self)
    }

    pub fn build(self) -> Mma7660<C> {
        Mma7660 {
            base: DriverBase::new(self.connector, "MMA7660", DEFAULT_ADDRESS, self.options, ()),
            sample_rate: self.sample_rate,
        }
    }
}

impl<C: Connector> Mma7660<C> {
    pub fn builder(connector: Arc<C>) -> Mma7660Builder<C> {
        Mma7660Builder {
            connector,
            options: BaseOptions::default(),
            sample_rate: rate::SPS_32,
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn base(&self) -> &DriverBase<C, ()> {
        &self.base
    }

    /// Raw axis counts
    ///
    /// Fails with [`Error::NotReady`] when any axis carries the alert flag.
    pub fn xyz(&self) -> Result<(i8, i8, i8)> {
        self.base.session(|s| {
            let mut buf = [0u8; 3];
            s.conn.read_block_data(reg::XOUT, &mut buf)?;
            if buf.iter().any(|b| b & ALERT != 0) {
                log::trace!("MMA7660 alert set in {:02X?}", buf);
                return Err(Error::NotReady);
            }
            Ok((decode(buf[0]), decode(buf[1]), decode(buf[2])))
        })
    }

    /// Axis readings in g
    pub fn acceleration(&self) -> Result<(f64, f64, f64)> {
        let (x, y, z) = self.xyz()?;
        Ok(acceleration(x, y, z))
    }
}

impl<C: Connector> Driver for Mma7660<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    /// Configuration registers are only writable in standby
    fn start(&self) -> Result<()> {
        let sample_rate = self.sample_rate;
        self.base.start(|s| {
            s.conn.write_byte_data(reg::MODE, mode::STANDBY)?;
            s.conn.write_byte_data(reg::SR, sample_rate)?;
            s.conn.write_byte_data(reg::MODE, mode::ACTIVE)
        })
    }

    fn halt(&self) -> Result<()> {
        self.base.halt(|s| s.conn.write_byte_data(reg::MODE, mode::STANDBY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use trellis_core::mock::{self, MockBus, MockFactory};
    use trellis_core::BusAdapter;

    type TestMma = Mma7660<BusAdapter<MockFactory>>;

    fn started() -> (TestMma, MockBus) {
        let (adapter, bus) = mock::adapter();
        let mma = Mma7660::new(adapter);
        mma.start().unwrap();
        bus.clear_written();
        (mma, bus)
    }

    #[test]
    fn test_start_sequence() {
        let (adapter, bus) = mock::adapter();
        let mma = Mma7660::builder(adapter).sample_rate(rate::SPS_8).unwrap().build();

        mma.start().unwrap();

        assert_eq!(bus.written(), vec![0x07, 0x00, 0x08, 0x04, 0x07, 0x01]);
        assert_eq!(bus.addresses()[0], DEFAULT_ADDRESS);
        assert!(mma.name().starts_with("MMA7660"));
    }

    #[test]
    fn test_xyz() {
        let (mma, bus) = started();
        bus.queue_read(&[0x11, 0x12, 0x13]);

        assert_eq!(mma.xyz().unwrap(), (17, 18, 19));
    }

    #[test]
    fn test_xyz_negative() {
        let (mma, bus) = started();
        bus.queue_read(&[0x3F, 0x20, 0x00]);

        assert_eq!(mma.xyz().unwrap(), (-1, -32, 0));
    }

    #[test]
    fn test_xyz_not_ready() {
        let (mma, bus) = started();
        bus.queue_read(&[0x01, 0x41, 0x02]);

        assert_eq!(mma.xyz(), Err(Error::NotReady));
    }

    #[test]
    fn test_xyz_read_error() {
        let (mma, bus) = started();
        bus.fail_reads(ErrorKind::Bus);

        assert_eq!(mma.xyz(), Err(Error::Io(ErrorKind::Bus)));
    }

    #[test]
    fn test_acceleration() {
        let (x, y, z) = acceleration(21, -21, 0);
        assert!((x - 0.98453).abs() < 1e-4);
        assert!((y + 0.98453).abs() < 1e-4);
        assert_eq!(z, 0.0);
    }

    #[test]
    fn test_sample_rate_range() {
        let (adapter, _) = mock::adapter();
        assert!(matches!(
            Mma7660::builder(adapter).sample_rate(0x08),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_halt_enters_standby() {
        let (mma, bus) = started();

        mma.halt().unwrap();

        assert_eq!(bus.written(), vec![reg::MODE, mode::STANDBY]);
    }
}
