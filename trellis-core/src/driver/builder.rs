//! Options shared by every driver builder

use embedded_hal::delay::DelayNs;

use crate::config::Config;
use crate::delay::StdDelay;

/// Settings every driver accepts
pub struct BaseOptions {
    /// Bus and address selection
    pub config: Config,
    /// Name override, `None` for `<chip>-<uid>`
    pub name: Option<String>,
    /// Delay used for datasheet timings
    pub delay: Box<dyn DelayNs + Send>,
}

impl Default for BaseOptions {
    fn default() -> Self {
        Self {
            config: Config::default(),
            name: None,
            delay: Box::new(StdDelay),
        }
    }
}

impl core::fmt::Debug for BaseOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BaseOptions")
            .field("config", &self.config)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Setters shared by every typed driver builder
///
/// A builder only has to expose its [`BaseOptions`]; the bus, address, name
/// and delay setters come for free.
///
/// ```ignore
/// let pwm = Pca9685::builder(adapter)
///     .bus(1)
///     .address(0x41)
///     .build();
/// ```
pub trait DriverBuilder: Sized {
    /// Shared options being built
    fn options_mut(&mut self) -> &mut BaseOptions;

    /// Use bus `bus` instead of the connector's default
    fn bus(mut self, bus: u8) -> Self {
        self.options_mut().config.bus = Some(bus);
        self
    }

    /// Use `address` instead of the chip's default
    fn address(mut self, address: u8) -> Self {
        self.options_mut().config.address = Some(address);
        self
    }

    /// Replace the whole config
    fn config(mut self, config: Config) -> Self {
        self.options_mut().config = config;
        self
    }

    /// Name the driver
    fn name(mut self, name: impl Into<String>) -> Self {
        self.options_mut().name = Some(name.into());
        self
    }

    /// Delay used between register sequences
    fn delay(mut self, delay: impl DelayNs + Send + 'static) -> Self {
        self.options_mut().delay = Box::new(delay);
        self
    }
}

impl DriverBuilder for BaseOptions {
    fn options_mut(&mut self) -> &mut BaseOptions {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters() {
        let options = BaseOptions::default().bus(1).address(0x41).name("servo");

        assert_eq!(options.config, Config::new().with_bus(1).with_address(0x41));
        assert_eq!(options.name.as_deref(), Some("servo"));
    }

    #[test]
    fn test_config_replaces() {
        let options = BaseOptions::default()
            .address(0x41)
            .config(Config::new().with_bus(3));

        assert_eq!(options.config.address, None);
        assert_eq!(options.config.bus, Some(3));
    }
}
