//! Trellis Hardware Abstraction Layer
//!
//! This crate defines the I2C transport trait that the Trellis connection
//! layer talks to, plus the transports that ship with the workspace.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  trellis-drivers (PCA9685, MCP23017 …)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  trellis-core (bus adapter, connection) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  trellis-hal (this crate - transports)  │
//! └─────────────────────────────────────────┘
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ embedded-hal  │       │  /dev/i2c-N   │
//! │   I2c impls   │       │   (i2cdev)    │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`i2c::I2cBus`] - I2C master transfers addressed per call
//!
//! # Transports
//!
//! - [`embedded::EmbeddedHalBus`] - any `embedded_hal::i2c::I2c`
//! - `linux::LinuxI2cBus` - Linux character device (feature `linux`)

#![cfg_attr(not(feature = "linux"), no_std)]
#![deny(unsafe_code)]

pub mod embedded;
pub mod i2c;
#[cfg(feature = "linux")]
pub mod linux;

// Re-export key traits at crate root for convenience
pub use embedded::EmbeddedHalBus;
pub use i2c::{I2cBus, I2cConfig};
#[cfg(feature = "linux")]
pub use linux::{LinuxI2cBus, LinuxI2cError};

pub use embedded_hal::i2c::{Error as I2cError, ErrorKind as I2cErrorKind};
