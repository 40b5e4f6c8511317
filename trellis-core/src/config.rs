//! Driver configuration
//!
//! Every driver carries a [`Config`] with the two well-known keys, bus index
//! and slave address. `None` means "not initialized, use the default", so an
//! explicit bus 0 is distinguishable from an unset one. Driver-specific
//! options live on each driver's typed builder.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bus and address selection for one driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Bus index, `None` for the connector's default bus
    pub bus: Option<u8>,
    /// 7-bit slave address, `None` for the chip's default address
    pub address: Option<u8>,
}

impl Config {
    /// Create an empty config (both keys unset)
    pub const fn new() -> Self {
        Self {
            bus: None,
            address: None,
        }
    }

    /// Select the bus index
    pub fn with_bus(mut self, bus: u8) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Select the slave address
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = Some(address);
        self
    }

    /// Configured bus, or `fallback` when unset
    pub fn bus_or_default(&self, fallback: u8) -> u8 {
        self.bus.unwrap_or(fallback)
    }

    /// Configured address, or `fallback` when unset
    pub fn address_or_default(&self, fallback: u8) -> u8 {
        self.address.unwrap_or(fallback)
    }

    /// Parse a config from TOML
    ///
    /// ```toml
    /// bus = 1
    /// address = 0x41
    /// ```
    #[cfg(feature = "toml")]
    pub fn from_toml_str(s: &str) -> crate::Result<Self> {
        toml::from_str(s).map_err(|e| crate::Error::invalid(format!("config: {}", e.message())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fall_back() {
        let config = Config::default();
        assert_eq!(config.bus_or_default(1), 1);
        assert_eq!(config.address_or_default(0x40), 0x40);
    }

    #[test]
    fn test_explicit_zero_bus_is_kept() {
        let config = Config::new().with_bus(0).with_address(0x41);
        assert_eq!(config.bus_or_default(1), 0);
        assert_eq!(config.address_or_default(0x40), 0x41);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str("bus = 2\naddress = 0x41\n").unwrap();
        assert_eq!(config, Config::new().with_bus(2).with_address(0x41));

        let partial = Config::from_toml_str("bus = 3\n").unwrap();
        assert_eq!(partial.address, None);

        assert!(Config::from_toml_str("bus = \"one\"").is_err());
    }
}
