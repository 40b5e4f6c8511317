//! Real-time clocks
//!
//! - [`pcf8583`] - Clock/calendar with 240 bytes RAM, doubles as event counter

pub mod pcf8583;

pub use pcf8583::{Pcf8583, Pcf8583Mode, YearAnchor};
