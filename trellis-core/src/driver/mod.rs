//! Driver base
//!
//! Every device driver is built on a [`DriverBase`]. The base owns the
//! name, the config, the connector and (once started) the connection,
//! together with the device state behind one mutex. Device code runs inside
//! a [`Session`], which is only handed out while the driver is running.
//!
//! # Lifecycle
//!
//! ```text
//!  Constructed ──start()──▶ Running ──halt()──▶ Halted
//!       ▲                     │  ▲                │
//!       └── after_start fails ┘  └────start()─────┘
//! ```
//!
//! - `start` resolves `(bus, address)`, acquires the connection and runs the
//!   device's `after_start` hook. Starting a running driver is a no-op.
//! - `halt` runs the device's `before_halt` hook and releases the connection.
//!   If the hook fails the driver keeps running so the halt can be retried.

mod builder;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use embedded_hal::delay::DelayNs;

pub use builder::{BaseOptions, DriverBuilder};

use crate::bus::{lock, Connection, Connector};
use crate::config::Config;
use crate::error::{Error, Result};

/// Lifecycle of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Lifecycle {
    /// Built, never started (or start failed)
    #[default]
    Constructed,
    /// Connection acquired and device initialized
    Running,
    /// Halted after running
    Halted,
}

/// Capability shared by every driver, composites included
pub trait Driver {
    /// Driver name
    fn name(&self) -> &str;

    /// Rename the driver
    fn set_name(&mut self, name: &str);

    /// Acquire the connection and initialize the device
    fn start(&self) -> Result<()>;

    /// Put the device into its safe state and release the connection
    fn halt(&self) -> Result<()>;
}

/// Access to a running device for the duration of one locked sequence
pub struct Session<'a, B, S> {
    /// Connection to the device
    pub conn: &'a Connection<B>,
    /// Delay source for datasheet timings
    pub delay: &'a mut dyn DelayNs,
    /// Driver-specific state
    pub state: &'a mut S,
}

struct Inner<B, S> {
    lifecycle: Lifecycle,
    connection: Option<Connection<B>>,
    delay: Box<dyn DelayNs + Send>,
    state: S,
}

/// Common driver state and lifecycle
pub struct DriverBase<C: Connector, S> {
    name: String,
    chip: &'static str,
    default_address: u8,
    config: Config,
    connector: Arc<C>,
    inner: Mutex<Inner<C::Bus, S>>,
}

impl<C: Connector, S> DriverBase<C, S> {
    /// Create a driver base
    ///
    /// # Arguments
    /// * `connector` - Adapter the connection is acquired from
    /// * `chip` - Chip tag used for the default name
    /// * `default_address` - Address used when the config has none
    /// * `options` - Config, name and delay from the builder
    /// * `state` - Driver-specific state
    pub fn new(
        connector: Arc<C>,
        chip: &'static str,
        default_address: u8,
        options: BaseOptions,
        state: S,
    ) -> Self {
        let BaseOptions {
            config,
            name,
            delay,
        } = options;
        Self {
            name: name.unwrap_or_else(|| default_name(chip)),
            chip,
            default_address,
            config,
            connector,
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Constructed,
                connection: None,
                delay,
                state,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    /// Chip tag, e.g. `PCA9685`
    pub fn chip(&self) -> &'static str {
        self.chip
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// Address the driver connects to
    pub fn address(&self) -> u8 {
        self.config.address_or_default(self.default_address)
    }

    /// Bus the driver connects to
    pub fn bus(&self) -> u8 {
        self.config.bus_or_default(self.connector.default_bus())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        lock(&self.inner).lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    /// Connection while running
    pub fn connection(&self) -> Option<Connection<C::Bus>> {
        lock(&self.inner).connection.clone()
    }

    /// Acquire the connection and run `after_start`
    ///
    /// On failure the connection is dropped and the lifecycle is unchanged,
    /// so `start` may be called again.
    pub fn start<F>(&self, after_start: F) -> Result<()>
    where
        F: FnOnce(&mut Session<'_, C::Bus, S>) -> Result<()>,
    {
        let mut inner = lock(&self.inner);
        if inner.lifecycle == Lifecycle::Running {
            return Ok(());
        }

        let conn = self.connector.get_connection(self.address(), self.bus())?;
        let inner = &mut *inner;
        let mut session = Session {
            conn: &conn,
            delay: &mut *inner.delay,
            state: &mut inner.state,
        };
        if let Err(e) = after_start(&mut session) {
            log::warn!("{}: start failed: {}", self.name, e);
            return Err(e);
        }

        log::debug!(
            "{}: started on bus {} at 0x{:02X}",
            self.name,
            conn.bus_index(),
            conn.address()
        );
        inner.connection = Some(conn);
        inner.lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Run `before_halt` and release the connection
    ///
    /// Fails with [`Error::NotStarted`] unless running.
    pub fn halt<F>(&self, before_halt: F) -> Result<()>
    where
        F: FnOnce(&mut Session<'_, C::Bus, S>) -> Result<()>,
    {
        self.session(before_halt)?;

        let mut inner = lock(&self.inner);
        inner.connection = None;
        inner.lifecycle = Lifecycle::Halted;
        log::debug!("{}: halted", self.name);
        Ok(())
    }

    /// Run `f` under the driver mutex with the connection
    ///
    /// The mutex is held for the whole closure, delays included. Fails with
    /// [`Error::NotStarted`] unless running.
    pub fn session<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Session<'_, C::Bus, S>) -> Result<R>,
    {
        let mut inner = lock(&self.inner);
        let Inner {
            lifecycle,
            connection,
            delay,
            state,
        } = &mut *inner;
        let conn = match (lifecycle, connection.as_ref()) {
            (Lifecycle::Running, Some(conn)) => conn,
            _ => return Err(Error::NotStarted),
        };
        f(&mut Session {
            conn,
            delay: &mut **delay,
            state,
        })
    }

    /// Read driver state without touching the device
    ///
    /// Works in every lifecycle state.
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&lock(&self.inner).state)
    }

    /// Change driver state without touching the device
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.inner).state)
    }
}

impl<C: Connector, S> fmt::Debug for DriverBase<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBase")
            .field("name", &self.name)
            .field("chip", &self.chip)
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

/// `<chip>-<short uid>` with eight upper-case hex digits
pub fn default_name(chip: &str) -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(COUNTER.fetch_add(1, Ordering::Relaxed));
    format!("{}-{:08X}", chip, hasher.finish() as u32)
}
