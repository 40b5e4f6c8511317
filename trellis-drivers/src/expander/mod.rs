//! I/O expanders
//!
//! - [`mcp23017`] - 16-bit GPIO expander with two 8-bit ports

pub mod mcp23017;

pub use mcp23017::{Mcp23017, Mcp23017Options, PinDirection, Port};
