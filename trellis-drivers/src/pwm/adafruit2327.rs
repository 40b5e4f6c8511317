//! Adafruit 16-channel PWM/servo HAT (product 2327)
//!
//! A PCA9685 on a stackable board. Stacked HATs are told apart by their
//! solder-jumper address, configured per instance.

use std::sync::Arc;

use trellis_core::{BaseOptions, Connector, Driver, DriverBuilder, Result};

use super::pca9685::{self, Pca9685};

/// Servo HAT driver
pub struct Adafruit2327<C: Connector> {
    pwm: Pca9685<C>,
}

/// Builder for [`Adafruit2327`]
pub struct Adafruit2327Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
}

impl<C> DriverBuilder for Adafruit2327Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Adafruit2327Builder<C> {
    pub fn build(self) -> Adafruit2327<C> {
        Adafruit2327 {
            pwm: Pca9685::with_chip(self.connector, "Adafruit2327ServoHat", self.options),
        }
    }
}

impl<C: Connector> Adafruit2327<C> {
    pub fn builder(connector: Arc<C>) -> Adafruit2327Builder<C> {
        Adafruit2327Builder {
            connector,
            options: BaseOptions::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    /// Underlying PWM controller
    pub fn pwm(&self) -> &Pca9685<C> {
        &self.pwm
    }

    /// Servo update rate, 24..=1526 Hz (analog servos expect ~50-60 Hz)
    pub fn set_servo_motor_freq(&self, hz: f32) -> Result<()> {
        self.pwm.set_pwm_freq(hz)
    }

    /// Raw pulse on `channel`
    pub fn set_servo_motor_pulse(&self, channel: u8, on: u16, off: u16) -> Result<()> {
        self.pwm.set_pwm(channel, on, off)
    }
}

impl<C: Connector> Driver for Adafruit2327<C> {
    fn name(&self) -> &str {
        self.pwm.name()
    }

    fn set_name(&mut self, name: &str) {
        self.pwm.set_name(name);
    }

    fn start(&self) -> Result<()> {
        self.pwm.start()
    }

    fn halt(&self) -> Result<()> {
        self.pwm.halt()
    }
}

/// Default address of the servo HAT
pub const DEFAULT_ADDRESS: u8 = pca9685::DEFAULT_ADDRESS;
