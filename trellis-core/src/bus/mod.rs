//! Bus adapter and connections
//!
//! A [`BusFactory`] knows how to open a platform bus by index. The
//! [`BusAdapter`] wraps a factory, keeps every bus it opened, and hands out
//! one cached [`Connection`] per `(bus, address)` pair. Drivers only see the
//! [`Connector`] trait.
//!
//! ```text
//! driver ──▶ Connector::get_connection(address, bus)
//!                │
//!                ▼
//!        BusAdapter (open-bus map, connection cache)
//!                │
//!                ▼
//!        Arc<Mutex<Bus>>  ◀── shared by every connection on that bus
//! ```

mod adapter;
mod connection;
#[cfg(feature = "linux")]
mod linux;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use adapter::BusAdapter;
pub use connection::{Connection, MAX_BLOCK_LEN};
#[cfg(feature = "linux")]
pub use linux::LinuxBusFactory;

use crate::error::Result;
use trellis_hal::I2cBus;

/// Lowest usable 7-bit slave address
pub const MIN_ADDRESS: u8 = 0x03;
/// Highest usable 7-bit slave address
pub const MAX_ADDRESS: u8 = 0x77;

/// Opens platform buses by index
pub trait BusFactory: Send + Sync {
    /// Transport produced for each bus
    type Bus: I2cBus + Send;

    /// Open bus `index`
    ///
    /// Fails with [`crate::Error::BusUnavailable`] when the platform refuses.
    fn open(&self, index: u8) -> Result<Self::Bus>;

    /// Bus used when a driver does not configure one
    fn default_bus(&self) -> u8;
}

/// What a driver needs from its adapter
pub trait Connector: Send + Sync {
    /// Transport behind the connections
    type Bus: I2cBus + Send;

    /// Connection bound to `(bus, address)`, reused when it already exists
    fn get_connection(&self, address: u8, bus: u8) -> Result<Connection<Self::Bus>>;

    /// Bus used when a driver does not configure one
    fn default_bus(&self) -> u8;
}

/// Lock a mutex, recovering the data if a holder panicked
///
/// Bus and driver state stay consistent at transaction boundaries, so a
/// panic in one caller does not invalidate them for the others.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
