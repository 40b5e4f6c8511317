//! Analog-to-digital converters
//!
//! - [`ads1015`] - 12-bit, 4 channel ADC with programmable gain
//! - [`pcf8591`] - 8-bit, 4 input ADC with a single DAC output
//! - [`yl40`] - PCF8591 board with light, temperature and potentiometer inputs

pub mod ads1015;
pub mod pcf8591;
pub mod yl40;

pub use ads1015::{Ads1015, Ads1015Gain};
pub use pcf8591::{ModeChannel, Pcf8591};
pub use yl40::{Yl40, Yl40Pin};
