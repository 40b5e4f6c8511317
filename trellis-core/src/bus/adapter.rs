//! Connection cache over a bus factory

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use super::{lock, BusFactory, Connection, Connector, MAX_ADDRESS, MIN_ADDRESS};
use crate::error::{Error, Result};

/// Open buses and cached connections
struct AdapterState<B> {
    buses: HashMap<u8, Arc<Mutex<B>>>,
    connections: HashMap<(u8, u8), Connection<B>>,
}

/// Bus adapter: open-bus map plus per-`(bus, address)` connection cache
///
/// Safe to share between threads. Every connection on one bus shares that
/// bus's mutex, so transfers from different drivers never interleave inside
/// a transaction. Different buses proceed in parallel.
pub struct BusAdapter<F: BusFactory> {
    factory: F,
    state: Mutex<AdapterState<F::Bus>>,
}

impl<F: BusFactory> BusAdapter<F> {
    /// Create an adapter; no bus is opened until first use
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            state: Mutex::new(AdapterState {
                buses: HashMap::new(),
                connections: HashMap::new(),
            }),
        }
    }

    /// Open bus `index`, or return the already open handle
    pub fn open(&self, index: u8) -> Result<Arc<Mutex<F::Bus>>> {
        let mut state = lock(&self.state);
        self.open_locked(&mut state, index)
    }

    fn open_locked(
        &self,
        state: &mut AdapterState<F::Bus>,
        index: u8,
    ) -> Result<Arc<Mutex<F::Bus>>> {
        if let Some(bus) = state.buses.get(&index) {
            return Ok(Arc::clone(bus));
        }
        let bus = Arc::new(Mutex::new(self.factory.open(index)?));
        log::debug!("opened i2c bus {}", index);
        state.buses.insert(index, Arc::clone(&bus));
        Ok(bus)
    }

    /// Whether bus `index` has been opened
    pub fn is_open(&self, index: u8) -> bool {
        lock(&self.state).buses.contains_key(&index)
    }

    /// Forget every open bus and cached connection
    ///
    /// A bus is closed once the last connection using it is dropped.
    pub fn close_all(&self) {
        let mut state = lock(&self.state);
        state.connections.clear();
        state.buses.clear();
        log::debug!("closed all i2c buses");
    }

    /// The wrapped factory
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: BusFactory> Connector for BusAdapter<F> {
    type Bus = F::Bus;

    fn get_connection(&self, address: u8, bus: u8) -> Result<Connection<F::Bus>> {
        if !(MIN_ADDRESS..=MAX_ADDRESS).contains(&address) {
            return Err(Error::invalid(format!(
                "address 0x{:02X} outside 0x{:02X}..=0x{:02X}",
                address, MIN_ADDRESS, MAX_ADDRESS
            )));
        }

        let mut state = lock(&self.state);
        if let Some(conn) = state.connections.get(&(bus, address)) {
            return Ok(conn.clone());
        }
        let handle = self.open_locked(&mut state, bus)?;
        let conn = Connection::new(handle, bus, address);
        state.connections.insert((bus, address), conn.clone());
        Ok(conn)
    }

    fn default_bus(&self) -> u8 {
        self.factory.default_bus()
    }
}

impl<F: BusFactory> fmt::Debug for BusAdapter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        let mut buses: Vec<_> = state.buses.keys().copied().collect();
        buses.sort_unstable();
        f.debug_struct("BusAdapter")
            .field("buses", &buses)
            .field("connections", &state.connections.len())
            .finish()
    }
}
