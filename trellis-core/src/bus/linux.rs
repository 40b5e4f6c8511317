//! Linux character-device bus factory

use trellis_hal::LinuxI2cBus;

use super::BusFactory;
use crate::error::{Error, Result};

/// Opens `/dev/i2c-<index>` buses
#[derive(Debug, Clone, Copy)]
pub struct LinuxBusFactory {
    default_bus: u8,
}

impl LinuxBusFactory {
    /// Factory with bus 1 as default (Raspberry Pi header pins)
    pub const fn new() -> Self {
        Self { default_bus: 1 }
    }

    /// Change the bus used when drivers configure none
    pub const fn with_default_bus(mut self, bus: u8) -> Self {
        self.default_bus = bus;
        self
    }
}

impl Default for LinuxBusFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BusFactory for LinuxBusFactory {
    type Bus = LinuxI2cBus;

    fn open(&self, index: u8) -> Result<LinuxI2cBus> {
        LinuxI2cBus::open_index(index).map_err(|e| {
            log::warn!("cannot open /dev/i2c-{}: {}", index, e);
            Error::BusUnavailable(index)
        })
    }

    fn default_bus(&self) -> u8 {
        self.default_bus
    }
}
