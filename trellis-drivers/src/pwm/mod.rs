//! PWM controllers
//!
//! - [`pca9685`] - 16-channel 12-bit PWM controller
//! - [`adafruit2327`] - Adafruit 16-channel servo HAT (a PCA9685 board)

pub mod adafruit2327;
pub mod pca9685;

pub use adafruit2327::Adafruit2327;
pub use pca9685::Pca9685;
