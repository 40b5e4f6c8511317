//! I2C device drivers
//!
//! Concrete drivers built on the `trellis-core` driver base:
//!
//! - PWM controllers (PCA9685, Adafruit servo HAT)
//! - Motor HATs (Adafruit DC + stepper HAT)
//! - Real-time clocks (PCF8583 clock / event counter)
//! - I/O expanders (MCP23017)
//! - Displays (HD44780 over digital pins, Adafruit RGB LCD backpack)
//! - Sensors (ADXL345, MMA7660, Wii Nunchuck)
//! - Converters (ADS1015, PCF8591, YL-40 board)

#![deny(unsafe_code)]

pub mod adc;
pub mod display;
pub mod expander;
pub mod motor;
pub mod pwm;
pub mod rtc;
pub mod sensor;
