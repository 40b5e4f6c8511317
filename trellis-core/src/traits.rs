//! Optional driver capabilities
//!
//! Each capability is a small independent trait a driver may implement in
//! addition to [`crate::Driver`]. Pins are named by string, in whatever
//! scheme the driver documents (`"7"` for a PWM channel, `"A_3"` for an
//! expander pin, `"s.0"` for an ADC input).

use crate::error::{Error, Result};

/// Drive a digital output
pub trait DigitalWriter {
    /// Set `pin` low (0) or high (any other value)
    fn digital_write(&self, pin: &str, val: u8) -> Result<()>;
}

/// Sample a digital input
pub trait DigitalReader {
    /// Level of `pin`, 0 or 1
    fn digital_read(&self, pin: &str) -> Result<u8>;
}

/// Sample an analog input
pub trait AnalogReader {
    /// Raw converter value of `pin`
    fn analog_read(&self, pin: &str) -> Result<i32>;
}

/// Drive an analog output
pub trait AnalogWriter {
    fn analog_write(&self, pin: &str, val: i32) -> Result<()>;
}

/// Drive a PWM output
pub trait PwmWriter {
    /// Duty cycle `val` in 0..=255
    fn pwm_write(&self, pin: &str, val: u8) -> Result<()>;
}

/// Position a hobby servo
pub trait ServoWriter {
    /// Angle in degrees, 0..=180
    fn servo_write(&self, pin: &str, angle: u8) -> Result<()>;
}

impl<T: DigitalWriter + ?Sized> DigitalWriter for std::sync::Arc<T> {
    fn digital_write(&self, pin: &str, val: u8) -> Result<()> {
        (**self).digital_write(pin, val)
    }
}

impl<T: DigitalReader + ?Sized> DigitalReader for std::sync::Arc<T> {
    fn digital_read(&self, pin: &str) -> Result<u8> {
        (**self).digital_read(pin)
    }
}

/// Parse a numeric pin name such as `"7"`
pub fn parse_pin(pin: &str) -> Result<u8> {
    pin.trim()
        .parse()
        .map_err(|_| Error::invalid(format!("pin '{}' is not a number", pin)))
}
