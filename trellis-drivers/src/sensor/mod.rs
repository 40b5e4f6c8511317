//! Motion sensors and input devices
//!
//! - [`adxl345`] - 3-axis digital accelerometer, ±2..±16 g
//! - [`mma7660`] - 3-axis orientation/motion sensor, 6-bit
//! - [`wiichuck`] - Wii Nunchuck joystick and buttons

pub mod adxl345;
pub mod mma7660;
pub mod wiichuck;

pub use adxl345::{Adxl345, Adxl345Range};
pub use mma7660::Mma7660;
pub use wiichuck::{Wiichuck, WiichuckSample};
