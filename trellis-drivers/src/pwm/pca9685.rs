//! PCA9685 16-channel 12-bit PWM controller
//!
//! Each channel has an on and an off count within a 4096-tick frame. The
//! chip starts asleep; waking it and changing the prescaler both go through
//! the documented sleep → restart sequence.
//!
//! # Start sequence
//!
//! 1. All channels `on = off = 0` through the `ALL_LED_*` registers
//! 2. `MODE2 = OUTDRV` (totem-pole outputs)
//! 3. `MODE1 = ALLCALL` (awake, no auto-increment)
//! 4. 5 ms for the oscillator
//! 5. `MODE1 |= RESTART`, then 5 ms
//!
//! Halting forces every channel off.
//!
//! The register routines are shared with the motor HAT driver, which owns
//! its PCA9685 connection directly.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use trellis_core::bits::{from_scale, to_scale};
use trellis_core::command::{reply, Command, Commander, Params, Reply};
use trellis_core::traits::{parse_pin, PwmWriter, ServoWriter};
use trellis_core::{
    BaseOptions, Connection, Connector, Driver, DriverBase, DriverBuilder, Error, I2cBus, Result,
};

/// Default 7-bit address (all address pins low)
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Number of PWM channels
pub const CHANNELS: u8 = 16;

/// Count that sets the full-on / full-off flag (bit 4 of the high register)
pub const FULL: u16 = 4096;

/// Internal oscillator frequency
pub const OSCILLATOR_HZ: f64 = 25_000_000.0;

/// Lowest output frequency the prescaler reaches
pub const MIN_FREQ_HZ: f32 = 24.0;

/// Highest output frequency the prescaler reaches
pub const MAX_FREQ_HZ: f32 = 1526.0;

/// PCA9685 register addresses
pub mod reg {
    /// Mode register 1
    pub const MODE1: u8 = 0x00;
    /// Mode register 2
    pub const MODE2: u8 = 0x01;
    /// Channel 0 on count, low byte (channel n at +4n)
    pub const LED0_ON_L: u8 = 0x06;
    /// Channel 0 on count, high byte
    pub const LED0_ON_H: u8 = 0x07;
    /// Channel 0 off count, low byte
    pub const LED0_OFF_L: u8 = 0x08;
    /// Channel 0 off count, high byte
    pub const LED0_OFF_H: u8 = 0x09;
    /// All channels on count, low byte
    pub const ALL_LED_ON_L: u8 = 0xFA;
    /// All channels on count, high byte
    pub const ALL_LED_ON_H: u8 = 0xFB;
    /// All channels off count, low byte
    pub const ALL_LED_OFF_L: u8 = 0xFC;
    /// All channels off count, high byte
    pub const ALL_LED_OFF_H: u8 = 0xFD;
    /// Output frequency prescaler
    pub const PRESCALE: u8 = 0xFE;
}

/// MODE1 bits
pub mod mode1 {
    /// Restart PWM channels stopped by sleep
    pub const RESTART: u8 = 0x80;
    /// Low power mode, oscillator off
    pub const SLEEP: u8 = 0x10;
    /// Respond to the all-call address
    pub const ALLCALL: u8 = 0x01;
}

/// MODE2 bits
pub mod mode2 {
    /// Totem-pole outputs instead of open drain
    pub const OUTDRV: u8 = 0x04;
    /// Full-off bit in a channel's high off register
    pub const FULL_OFF: u8 = 0x10;
}

const SETTLE_MS: u32 = 5;

/// Reduce a count to 12 bits, keeping the full-on/off flag value
fn counts(value: u16) -> u16 {
    if value == FULL {
        FULL
    } else {
        value % FULL
    }
}

/// Prescaler value for `hz`
///
/// `⌊25 MHz / (4096 · f) − 1 + 0.5⌋`, valid for 24..=1526 Hz.
pub fn prescale_for(hz: f32) -> Result<u8> {
    if !(MIN_FREQ_HZ..=MAX_FREQ_HZ).contains(&hz) {
        return Err(Error::invalid(format!(
            "PWM frequency {} Hz outside {}..={} Hz",
            hz, MIN_FREQ_HZ, MAX_FREQ_HZ
        )));
    }
    let prescale = OSCILLATOR_HZ / 4096.0 / f64::from(hz) - 1.0;
    Ok((prescale + 0.5).floor() as u8)
}

/// Off count for duty `val` in 0..=255
pub fn duty_counts(val: u8) -> u16 {
    to_scale(from_scale(f64::from(val), 0.0, 255.0), 0.0, 4095.0) as u16
}

/// Off count for a servo at `angle` degrees (0..=180 → 200..=500)
pub fn servo_counts(angle: u8) -> u16 {
    to_scale(from_scale(f64::from(angle), 0.0, 180.0), 200.0, 500.0) as u16
}

/// Wake the chip and restart its outputs
pub(crate) fn initialize<B: I2cBus>(conn: &Connection<B>, delay: &mut dyn DelayNs) -> Result<()> {
    set_all_pwm(conn, 0, 0)?;
    conn.write_byte_data(reg::MODE2, mode2::OUTDRV)?;
    conn.write_byte_data(reg::MODE1, mode1::ALLCALL)?;
    delay.delay_ms(SETTLE_MS);

    let mode = conn.read_byte_data(reg::MODE1)?;
    conn.write_byte_data(reg::MODE1, mode | mode1::RESTART)?;
    delay.delay_ms(SETTLE_MS);
    Ok(())
}

/// Force every channel off
pub(crate) fn all_off<B: I2cBus>(conn: &Connection<B>) -> Result<()> {
    conn.write_byte_data(reg::ALL_LED_OFF_H, mode2::FULL_OFF)
}

/// Program one channel
pub(crate) fn set_pwm<B: I2cBus>(conn: &Connection<B>, channel: u8, on: u16, off: u16) -> Result<()> {
    if channel >= CHANNELS {
        return Err(Error::invalid(format!(
            "PWM channel {} outside 0..{}",
            channel, CHANNELS
        )));
    }
    let (on, off) = (counts(on), counts(off));
    let base = 4 * channel;
    conn.write_byte_data(reg::LED0_ON_L + base, (on & 0xFF) as u8)?;
    conn.write_byte_data(reg::LED0_ON_H + base, (on >> 8) as u8)?;
    conn.write_byte_data(reg::LED0_OFF_L + base, (off & 0xFF) as u8)?;
    conn.write_byte_data(reg::LED0_OFF_H + base, (off >> 8) as u8)
}

/// Program every channel at once
pub(crate) fn set_all_pwm<B: I2cBus>(conn: &Connection<B>, on: u16, off: u16) -> Result<()> {
    let (on, off) = (counts(on), counts(off));
    conn.write_byte_data(reg::ALL_LED_ON_L, (on & 0xFF) as u8)?;
    conn.write_byte_data(reg::ALL_LED_ON_H, (on >> 8) as u8)?;
    conn.write_byte_data(reg::ALL_LED_OFF_L, (off & 0xFF) as u8)?;
    conn.write_byte_data(reg::ALL_LED_OFF_H, (off >> 8) as u8)
}

/// Change the output frequency
///
/// The prescaler can only be written while asleep, so the chip is put to
/// sleep, reprogrammed, woken and restarted.
pub(crate) fn set_pwm_freq<B: I2cBus>(
    conn: &Connection<B>,
    delay: &mut dyn DelayNs,
    hz: f32,
) -> Result<()> {
    let prescale = prescale_for(hz)?;
    log::debug!("PCA9685 0x{:02X}: {} Hz, prescale {}", conn.address(), hz, prescale);

    let old = conn.read_byte_data(reg::MODE1)?;
    conn.write_byte_data(reg::MODE1, (old & !mode1::RESTART) | mode1::SLEEP)?;
    conn.write_byte_data(reg::PRESCALE, prescale)?;
    let awake = old & !mode1::SLEEP;
    conn.write_byte_data(reg::MODE1, awake)?;
    delay.delay_ms(SETTLE_MS);
    conn.write_byte_data(reg::MODE1, awake | mode1::RESTART)
}

/// PCA9685 driver
pub struct Pca9685<C: Connector> {
    base: DriverBase<C, ()>,
}

/// Builder for [`Pca9685`]
pub struct Pca9685Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
}

impl<C> DriverBuilder for Pca9685Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Pca9685Builder<C> {
    pub fn build(self) -> Pca9685<C> {
        Pca9685::with_chip(self.connector, "PCA9685", self.options)
    }
}

impl<C: Connector> Pca9685<C> {
    /// Start building a driver on `connector`
    pub fn builder(connector: Arc<C>) -> Pca9685Builder<C> {
        Pca9685Builder {
            connector,
            options: BaseOptions::default(),
        }
    }

    /// Driver with default bus, address and name
    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    /// Driver for a board that carries a PCA9685 under another name
    pub(crate) fn with_chip(connector: Arc<C>, chip: &'static str, options: BaseOptions) -> Self {
        Self {
            base: DriverBase::new(connector, chip, DEFAULT_ADDRESS, options, ()),
        }
    }

    /// Shared driver state
    pub fn base(&self) -> &DriverBase<C, ()> {
        &self.base
    }

    /// Set `channel` to turn on at count `on` and off at count `off`
    ///
    /// Counts are 12-bit; 4096 sets the channel's full-on or full-off flag.
    pub fn set_pwm(&self, channel: u8, on: u16, off: u16) -> Result<()> {
        self.base.session(|s| set_pwm(s.conn, channel, on, off))
    }

    /// Set every channel at once
    pub fn set_all_pwm(&self, on: u16, off: u16) -> Result<()> {
        self.base.session(|s| set_all_pwm(s.conn, on, off))
    }

    /// Set the output frequency, 24..=1526 Hz
    pub fn set_pwm_freq(&self, hz: f32) -> Result<()> {
        self.base.session(|s| set_pwm_freq(s.conn, s.delay, hz))
    }

    /// Duty cycle 0..=255 on `channel`
    pub fn write_duty(&self, channel: u8, val: u8) -> Result<()> {
        self.set_pwm(channel, 0, duty_counts(val))
    }

    /// Servo on `channel` to `angle` degrees
    pub fn write_servo(&self, channel: u8, angle: u8) -> Result<()> {
        self.set_pwm(channel, 0, servo_counts(angle))
    }
}

impl<C: Connector> Driver for Pca9685<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    fn start(&self) -> Result<()> {
        self.base.start(|s| initialize(s.conn, s.delay))
    }

    fn halt(&self) -> Result<()> {
        self.base.halt(|s| all_off(s.conn))
    }
}

impl<C: Connector> PwmWriter for Pca9685<C> {
    fn pwm_write(&self, pin: &str, val: u8) -> Result<()> {
        self.write_duty(parse_pin(pin)?, val)
    }
}

impl<C: Connector> ServoWriter for Pca9685<C> {
    fn servo_write(&self, pin: &str, angle: u8) -> Result<()> {
        self.write_servo(parse_pin(pin)?, angle)
    }
}

/// Commands understood by [`Pca9685`]
#[derive(Debug, Clone, PartialEq)]
pub enum Pca9685Command {
    PwmWrite { pin: String, val: u8 },
    ServoWrite { pin: String, val: u8 },
    SetPwm { channel: u8, on: u16, off: u16 },
    SetPwmFreq { freq: f32 },
}

impl Command for Pca9685Command {
    const KEYS: &'static [&'static str] = &["PwmWrite", "ServoWrite", "SetPWM", "SetPWMFreq"];

    fn parse(key: &str, params: &Params) -> Result<Self> {
        Ok(match key {
            "PwmWrite" => Pca9685Command::PwmWrite {
                pin: params.text("pin")?,
                val: params.int_as("val")?,
            },
            "ServoWrite" => Pca9685Command::ServoWrite {
                pin: params.text("pin")?,
                val: params.int_as("val")?,
            },
            "SetPWM" => Pca9685Command::SetPwm {
                channel: params.int_as("channel")?,
                on: params.int_as("on")?,
                off: params.int_as("off")?,
            },
            "SetPWMFreq" => Pca9685Command::SetPwmFreq {
                freq: params.float("freq")? as f32,
            },
            other => return Err(Error::UnknownCommand(other.to_owned())),
        })
    }
}

impl<C: Connector> Commander for Pca9685<C> {
    type Command = Pca9685Command;

    fn execute(&self, command: Pca9685Command) -> Reply {
        match command {
            Pca9685Command::PwmWrite { pin, val } => self.pwm_write(&pin, val).into(),
            Pca9685Command::ServoWrite { pin, val } => self.servo_write(&pin, val).into(),
            Pca9685Command::SetPwm { channel, on, off } => self.set_pwm(channel, on, off).into(),
            Pca9685Command::SetPwmFreq { freq } => reply(self.set_pwm_freq(freq).map(|()| freq)),
        }
    }
}
