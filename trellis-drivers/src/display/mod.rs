//! Character displays
//!
//! - [`hd44780`] - HD44780 LCD controller in 4-bit mode over digital pins
//! - [`adafruit1109`] - Adafruit RGB LCD + keypad kit (MCP23017 + HD44780)

pub mod adafruit1109;
pub mod hd44780;

pub use adafruit1109::Adafruit1109;
pub use hd44780::{Hd44780, Hd44780Pins};
