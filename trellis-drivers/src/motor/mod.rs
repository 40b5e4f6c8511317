//! Motor drivers
//!
//! - [`stepper`] - Phase arithmetic for two-coil bipolar steppers
//! - [`adafruit2348`] - Adafruit DC + stepper motor HAT (PCA9685 based)

pub mod adafruit2348;
pub mod stepper;

pub use adafruit2348::{Adafruit2348, DcDirection};
pub use stepper::{StepDirection, StepStyle};
