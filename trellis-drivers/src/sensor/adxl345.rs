//! ADXL345 3-axis accelerometer
//!
//! Configuration lives in three registers assembled from the driver's
//! settings: BW_RATE (rate code plus low-power bit), POWER_CTL (measure bit)
//! and DATA_FORMAT (range). Axis data is six bytes from DATAX0, three
//! little-endian `i16`s in 10-bit resolution.

use std::sync::Arc;

use trellis_core::{BaseOptions, Connector, Driver, DriverBase, DriverBuilder, Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default 7-bit address (ALT ADDRESS low)
pub const DEFAULT_ADDRESS: u8 = 0x53;

/// Address with ALT ADDRESS pulled high
pub const ALT_ADDRESS: u8 = 0x1D;

/// ADXL345 registers
pub mod reg {
    pub const DEVID: u8 = 0x00;
    /// Data rate and power mode
    pub const BW_RATE: u8 = 0x2C;
    /// Power-saving features
    pub const POWER_CTL: u8 = 0x2D;
    /// Range and justification
    pub const DATA_FORMAT: u8 = 0x31;
    /// First of six axis data bytes
    pub const DATAX0: u8 = 0x32;
}

/// BW_RATE bit: reduced power, more noise
const LOW_POWER: u8 = 0x10;

/// POWER_CTL bit: measurement mode
const MEASURE: u8 = 0x08;

/// Output data rate codes for BW_RATE
pub mod rate {
    pub const HZ_0_10: u8 = 0x00;
    pub const HZ_0_20: u8 = 0x01;
    pub const HZ_0_39: u8 = 0x02;
    pub const HZ_0_78: u8 = 0x03;
    pub const HZ_1_56: u8 = 0x04;
    pub const HZ_3_13: u8 = 0x05;
    pub const HZ_6_25: u8 = 0x06;
    pub const HZ_12_5: u8 = 0x07;
    pub const HZ_25: u8 = 0x08;
    pub const HZ_50: u8 = 0x09;
    pub const HZ_100: u8 = 0x0A;
    pub const HZ_200: u8 = 0x0B;
    pub const HZ_400: u8 = 0x0C;
    pub const HZ_800: u8 = 0x0D;
    pub const HZ_1600: u8 = 0x0E;
    pub const HZ_3200: u8 = 0x0F;
}

/// Full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Adxl345Range {
    #[default]
    G2,
    G4,
    G8,
    G16,
}

impl Adxl345Range {
    /// DATA_FORMAT range bits
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Full-scale value in g
    pub const fn g(self) -> f64 {
        match self {
            Adxl345Range::G2 => 2.0,
            Adxl345Range::G4 => 4.0,
            Adxl345Range::G8 => 8.0,
            Adxl345Range::G16 => 16.0,
        }
    }

    /// Convert a raw axis reading to g
    pub fn to_g(self, raw: i16) -> f64 {
        f64::from(raw) * self.g() / 512.0
    }
}

fn check_rate(code: u8) -> Result<u8> {
    if code > rate::HZ_3200 {
        return Err(Error::invalid(format!(
            "rate code 0x{:02X} above 3200 Hz (0x0F)",
            code
        )));
    }
    Ok(code)
}

#[derive(Debug, Clone, Copy)]
pub struct Adxl345Settings {
    pub low_power: bool,
    pub rate: u8,
    pub range: Adxl345Range,
}

impl Default for Adxl345Settings {
    fn default() -> Self {
        Self {
            low_power: true,
            rate: rate::HZ_100,
            range: Adxl345Range::G2,
        }
    }
}

impl Adxl345Settings {
    fn bw_rate(&self) -> u8 {
        if self.low_power {
            self.rate | LOW_POWER
        } else {
            self.rate
        }
    }
}

/// ADXL345 driver
pub struct Adxl345<C: Connector> {
    base: DriverBase<C, Adxl345Settings>,
}

/// Builder for [`Adxl345`]
pub struct Adxl345Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
    settings: Adxl345Settings,
}

impl<C> DriverBuilder for Adxl345Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Adxl345Builder<C> {
    pub fn low_power(mut self, on: bool) -> Self {
        self.settings.low_power = on;
        self
    }

    /// Output data rate code, see [`rate`]
    pub fn rate(mut self, code: u8) -> Result<Self> {
        self.settings.rate = check_rate(code)?;
        Ok(self)
    }

    pub fn range(mut self, range: Adxl345Range) -> Self {
        self.settings.range = range;
        self
    }

    pub fn build(self) -> Adxl345<C> {
        Adxl345 {
            base: DriverBase::new(
                self.connector,
                "ADXL345",
                DEFAULT_ADDRESS,
                self.options,
                self.settings,
            ),
        }
    }
}

impl<C: Connector> Adxl345<C> {
    pub fn builder(connector: Arc<C>) -> Adxl345Builder<C> {
        Adxl345Builder {
            connector,
            options: BaseOptions::default(),
            settings: Adxl345Settings::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn base(&self) -> &DriverBase<C, Adxl345Settings> {
        &self.base
    }

    pub fn settings(&self) -> Adxl345Settings {
        self.base.with_state(|s| *s)
    }

    /// Switch low-power mode and rewrite BW_RATE
    pub fn use_low_power(&self, on: bool) -> Result<()> {
        self.base.session(|s| {
            let mut next = *s.state;
            next.low_power = on;
            s.conn.write_byte_data(reg::BW_RATE, next.bw_rate())?;
            *s.state = next;
            Ok(())
        })
    }

    /// Change the output data rate and rewrite BW_RATE
    pub fn set_rate(&self, code: u8) -> Result<()> {
        let code = check_rate(code)?;
        self.base.session(|s| {
            let mut next = *s.state;
            next.rate = code;
            s.conn.write_byte_data(reg::BW_RATE, next.bw_rate())?;
            *s.state = next;
            Ok(())
        })
    }

    /// Change the range and rewrite DATA_FORMAT
    pub fn set_range(&self, range: Adxl345Range) -> Result<()> {
        self.base.session(|s| {
            s.conn.write_byte_data(reg::DATA_FORMAT, range.bits())?;
            s.state.range = range;
            Ok(())
        })
    }

    /// Raw axis readings
    pub fn raw_xyz(&self) -> Result<(i16, i16, i16)> {
        self.base.session(|s| {
            let mut buf = [0u8; 6];
            s.conn.read_block_data(reg::DATAX0, &mut buf)?;
            Ok((
                i16::from_le_bytes([buf[0], buf[1]]),
                i16::from_le_bytes([buf[2], buf[3]]),
                i16::from_le_bytes([buf[4], buf[5]]),
            ))
        })
    }

    /// Acceleration in g
    pub fn xyz(&self) -> Result<(f64, f64, f64)> {
        let (x, y, z) = self.raw_xyz()?;
        let range = self.base.with_state(|s| s.range);
        Ok((range.to_g(x), range.to_g(y), range.to_g(z)))
    }
}

impl<C: Connector> Driver for Adxl345<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    fn start(&self) -> Result<()> {
        self.base.start(|s| {
            s.conn.write_byte_data(reg::BW_RATE, s.state.bw_rate())?;
            s.conn.write_byte_data(reg::POWER_CTL, MEASURE)?;
            s.conn.write_byte_data(reg::DATA_FORMAT, s.state.range.bits())
        })
    }

    fn halt(&self) -> Result<()> {
        self.base.halt(|s| s.conn.write_byte_data(reg::POWER_CTL, 0))
    }
}
