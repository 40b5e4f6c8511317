//! ADS1015 12-bit ADC
//!
//! Every read is a single-shot conversion: write the config register with
//! the OS bit set and the wanted input multiplexer, wait for the conversion,
//! then point at the conversion register and read two bytes. The 12-bit
//! result sits left-aligned in those bytes.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use trellis_core::traits::AnalogReader;
use trellis_core::{
    BaseOptions, Connection, Connector, Driver, DriverBase, DriverBuilder, Error, I2cBus, Result,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default 7-bit address (ADDR to GND)
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// Register pointers
pub mod reg {
    pub const CONVERSION: u8 = 0x00;
    pub const CONFIG: u8 = 0x01;
    pub const LO_THRESH: u8 = 0x02;
    pub const HI_THRESH: u8 = 0x03;
}

/// Config register fields
pub mod config {
    /// Start a single conversion
    pub const OS_SINGLE: u16 = 0x8000;

    pub const MUX_DIFF_0_1: u16 = 0x0000;
    pub const MUX_DIFF_0_3: u16 = 0x1000;
    pub const MUX_DIFF_1_3: u16 = 0x2000;
    pub const MUX_DIFF_2_3: u16 = 0x3000;
    /// Single-ended AIN0; AIN1..AIN3 follow in 0x1000 steps
    pub const MUX_SINGLE_0: u16 = 0x4000;

    pub const MODE_SINGLE: u16 = 0x0100;
    pub const DR_1600SPS: u16 = 0x0080;
    pub const CQUE_NONE: u16 = 0x0003;
}

/// Wait after starting a conversion
const CONVERSION_DELAY_MS: u32 = 1;

/// Full-scale range of the programmable gain amplifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Ads1015Gain {
    /// ±6.144 V
    #[default]
    V6_144,
    /// ±4.096 V
    V4_096,
    /// ±2.048 V
    V2_048,
    /// ±1.024 V
    V1_024,
    /// ±0.512 V
    V0_512,
    /// ±0.256 V
    V0_256,
}

impl Ads1015Gain {
    /// PGA field of the config register
    pub const fn bits(self) -> u16 {
        match self {
            Ads1015Gain::V6_144 => 0x0000,
            Ads1015Gain::V4_096 => 0x0200,
            Ads1015Gain::V2_048 => 0x0400,
            Ads1015Gain::V1_024 => 0x0600,
            Ads1015Gain::V0_512 => 0x0800,
            Ads1015Gain::V0_256 => 0x0A00,
        }
    }

    /// Full-scale voltage
    pub fn full_scale(self) -> f64 {
        match self {
            Ads1015Gain::V6_144 => 6.144,
            Ads1015Gain::V4_096 => 4.096,
            Ads1015Gain::V2_048 => 2.048,
            Ads1015Gain::V1_024 => 1.024,
            Ads1015Gain::V0_512 => 0.512,
            Ads1015Gain::V0_256 => 0.256,
        }
    }
}

/// Config word for a single-shot conversion of `mux`
pub fn config_word(mux: u16, gain: Ads1015Gain) -> u16 {
    config::OS_SINGLE | mux | gain.bits() | config::MODE_SINGLE | config::DR_1600SPS | config::CQUE_NONE
}

/// 12-bit result from the two conversion register bytes
pub fn decode(b: [u8; 2]) -> u16 {
    (u16::from(b[0]) << 4) | (u16::from(b[1]) >> 4)
}

/// Sign-extend a 12-bit differential result
pub fn decode_signed(b: [u8; 2]) -> i16 {
    let v = decode(b) as i16;
    if v & 0x800 != 0 {
        v - (1 << 12)
    } else {
        v
    }
}

fn convert<B: I2cBus>(
    conn: &Connection<B>,
    delay: &mut dyn DelayNs,
    word: u16,
) -> Result<[u8; 2]> {
    let [hi, lo] = word.to_be_bytes();
    conn.write(&[reg::CONFIG, hi, lo])?;
    delay.delay_ms(CONVERSION_DELAY_MS);
    conn.write_byte(reg::CONVERSION)?;

    let mut buf = [0u8; 2];
    let n = conn.read(&mut buf)?;
    if n != buf.len() {
        return Err(Error::NotEnoughBytes {
            read: n,
            expected: buf.len(),
        });
    }
    Ok(buf)
}

/// ADS1015 driver
pub struct Ads1015<C: Connector> {
    base: DriverBase<C, ()>,
    gain: Ads1015Gain,
}

/// Builder for [`Ads1015`]
pub struct Ads1015Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
    gain: Ads1015Gain,
}

impl<C> DriverBuilder for Ads1015Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Ads1015Builder<C> {
    pub fn gain(mut self, gain: Ads1015Gain) -> Self {
        self.gain = gain;
        self
    }

    pub fn build(self) -> Ads1015<C> {
        Ads1015 {
            base: DriverBase::new(self.connector, "ADS1015", DEFAULT_ADDRESS, self.options, ()),
            gain: self.gain,
        }
    }
}

impl<C: Connector> Ads1015<C> {
    pub fn builder(connector: Arc<C>) -> Ads1015Builder<C> {
        Ads1015Builder {
            connector,
            options: BaseOptions::default(),
            gain: Ads1015Gain::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn base(&self) -> &DriverBase<C, ()> {
        &self.base
    }

    pub fn gain(&self) -> Ads1015Gain {
        self.gain
    }

    /// Single-ended conversion of input `channel` (0..=3)
    pub fn read_adc(&self, channel: u8) -> Result<u16> {
        if channel > 3 {
            return Err(Error::invalid(format!("ADS1015 channel {} out of 0..=3", channel)));
        }
        let mux = config::MUX_SINGLE_0 + u16::from(channel) * 0x1000;
        let word = config_word(mux, self.gain);
        self.base.session(|s| convert(s.conn, s.delay, word)).map(decode)
    }

    /// Differential conversion AIN0 - AIN1
    pub fn read_adc_difference_01(&self) -> Result<i16> {
        self.read_difference(config::MUX_DIFF_0_1)
    }

    /// Differential conversion AIN2 - AIN3
    pub fn read_adc_difference_23(&self) -> Result<i16> {
        self.read_difference(config::MUX_DIFF_2_3)
    }

    fn read_difference(&self, mux: u16) -> Result<i16> {
        let word = config_word(mux, self.gain);
        self.base.session(|s| convert(s.conn, s.delay, word)).map(decode_signed)
    }
}

impl<C: Connector> AnalogReader for Ads1015<C> {
    /// `"0"`..`"3"` single-ended, `"0-1"` and `"2-3"` differential
    fn analog_read(&self, pin: &str) -> Result<i32> {
        match pin {
            "0-1" => self.read_adc_difference_01().map(i32::from),
            "2-3" => self.read_adc_difference_23().map(i32::from),
            _ => {
                let channel = pin
                    .parse::<u8>()
                    .map_err(|_| Error::invalid(format!("invalid ADS1015 pin '{}'", pin)))?;
                self.read_adc(channel).map(i32::from)
            }
        }
    }
}

impl<C: Connector> Driver for Ads1015<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    fn start(&self) -> Result<()> {
        self.base.start(|_| Ok(()))
    }

    fn halt(&self) -> Result<()> {
        self.base.halt(|_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use trellis_core::mock::{self, MockBus, MockFactory, RecordingDelay};
    use trellis_core::BusAdapter;

    type TestAds = Ads1015<BusAdapter<MockFactory>>;

    fn started() -> (TestAds, MockBus, RecordingDelay) {
        let (adapter, bus) = mock::adapter();
        let delay = RecordingDelay::new();
        let ads = Ads1015::builder(adapter).delay(delay.clone()).build();
        ads.start().unwrap();
        (ads, bus, delay)
    }

    #[test]
    fn test_start_is_silent() {
        let (_, bus, _) = started();
        assert!(bus.written().is_empty());
    }

    #[test]
    fn test_read_channel_2() {
        let (ads, bus, delay) = started();
        bus.queue_read(&[0x7F, 0xF0]);

        let v = ads.read_adc(2).unwrap();

        assert_eq!(v, 2047);
        // OS | MUX_SINGLE_2 | 6.144 V | single shot | 1600 SPS | no comparator
        assert_eq!(bus.written(), vec![0x01, 0xE1, 0x83, 0x00]);
        assert_eq!(delay.delays(), vec![Duration::from_millis(1)]);
    }

    #[test]
    fn test_gain_in_config() {
        let (adapter, bus) = mock::adapter();
        let ads = Ads1015::builder(adapter)
            .gain(Ads1015Gain::V2_048)
            .delay(RecordingDelay::new())
            .build();
        ads.start().unwrap();
        bus.queue_read(&[0x00, 0x10]);

        assert_eq!(ads.read_adc(0).unwrap(), 1);
        assert_eq!(&bus.written()[..3], &[0x01, 0xC5, 0x83]);
    }

    #[test]
    fn test_invalid_channel() {
        let (ads, bus, _) = started();

        assert!(matches!(ads.read_adc(4), Err(Error::InvalidArgument(_))));
        assert!(bus.written().is_empty());
    }

    #[test]
    fn test_difference_sign() {
        let (ads, bus, _) = started();
        bus.queue_read(&[0xFF, 0xF0]);
        assert_eq!(ads.read_adc_difference_01().unwrap(), -1);
        assert_eq!(&bus.written()[..3], &[0x01, 0x81, 0x83]);

        bus.clear_written();
        bus.queue_read(&[0x80, 0x00]);
        assert_eq!(ads.read_adc_difference_23().unwrap(), -2048);
        assert_eq!(&bus.written()[..3], &[0x01, 0xB1, 0x83]);
    }

    #[test]
    fn test_analog_reader_pins() {
        let (ads, bus, _) = started();
        bus.queue_read(&[0x12, 0x30]);
        assert_eq!(ads.analog_read("3").unwrap(), 0x123);
        assert_eq!(&bus.written()[..3], &[0x01, 0xF1, 0x83]);

        bus.queue_read(&[0x00, 0x20]);
        assert_eq!(ads.analog_read("2-3").unwrap(), 2);

        assert!(matches!(ads.analog_read("x"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_short_read() {
        let (ads, bus, _) = started();
        bus.limit_reads(1);

        assert_eq!(
            ads.read_adc(0),
            Err(Error::NotEnoughBytes { read: 1, expected: 2 })
        );
    }

    #[test]
    fn test_requires_start() {
        let (adapter, _) = mock::adapter();
        let ads = Ads1015::new(adapter);
        assert_eq!(ads.read_adc(0), Err(Error::NotStarted));
    }

    proptest! {
        #[test]
        fn test_decode_signed_matches_unsigned(hi in any::<u8>(), lo in any::<u8>()) {
            let u = decode([hi, lo]);
            let s = decode_signed([hi, lo]);
            prop_assert!(u < 4096);
            prop_assert!((-2048..2048).contains(&s));
            prop_assert_eq!((s as u16) & 0x0FFF, u);
        }
    }
}
