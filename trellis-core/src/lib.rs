//! Bus adapter, connections and driver base for Trellis I2C drivers
//!
//! This crate contains everything a device driver needs that is not tied to
//! a particular chip:
//!
//! - Bus adapter with an open-bus map and a per-`(bus, address)` connection cache
//! - Register-oriented connection operations (byte, word, block)
//! - Driver base: lifecycle, naming, options, per-driver mutex
//! - Command layer for string-keyed remote invocation
//! - Capability traits (digital, analog, PWM, servo)
//! - BCD and bit helpers
//! - Mock transport for host tests (feature `mock`)

#![deny(unsafe_code)]

pub mod bits;
pub mod bus;
pub mod command;
pub mod config;
pub mod delay;
pub mod driver;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod traits;

pub use bus::{BusAdapter, BusFactory, Connection, Connector};
pub use config::Config;
pub use delay::StdDelay;
pub use driver::{BaseOptions, Driver, DriverBase, DriverBuilder, Lifecycle, Session};
pub use error::{Error, Result};
pub use trellis_hal::{I2cBus, I2cConfig};

/// Common imports for driver implementations and applications
pub mod prelude {
    pub use crate::command::{Command, Commander, Params, Reply, Value};
    pub use crate::driver::{Driver, DriverBuilder};
    pub use crate::traits::{
        AnalogReader, AnalogWriter, DigitalReader, DigitalWriter, PwmWriter, ServoWriter,
    };
    pub use crate::{Error, Result};
}
