//! MCP23017 16-bit I/O expander
//!
//! Two 8-bit ports, A and B, each with its own direction, polarity,
//! pull-up, input and latch registers. With `IOCON.BANK = 0` the A and B
//! registers interleave (`IODIRA 0x00, IODIRB 0x01, ...`); with `BANK = 1`
//! port A sits at 0x00..0x0A and port B at 0x10..0x1A.
//!
//! Every pin update is a read-modify-write of one register. The write is
//! skipped when the byte would not change, unless `force_refresh` is set.
//! The last known direction register of each port is cached so repeated
//! writes to an output pin only touch the latch.

use std::str::FromStr;
use std::sync::Arc;

use trellis_core::bits::{is_bit_set, with_bit};
use trellis_core::command::{reply, Command, Commander, Params, Reply};
use trellis_core::traits::{DigitalReader, DigitalWriter};
use trellis_core::{
    BaseOptions, Connection, Connector, Driver, DriverBase, DriverBuilder, Error, I2cBus, Result,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default 7-bit address (A2..A0 low)
pub const DEFAULT_ADDRESS: u8 = 0x20;

/// Pins per port
pub const PINS_PER_PORT: u8 = 8;

/// IOCON address at power-on (BANK = 0)
const IOCON_POWER_ON: u8 = 0x0A;

/// Per-port registers, in datasheet order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Direction, 1 = input
    Iodir,
    /// Input polarity, 1 = inverted
    Ipol,
    Gpinten,
    Defval,
    Intcon,
    Iocon,
    /// Pull-up, 1 = 100 kΩ enabled
    Gppu,
    Intf,
    Intcap,
    /// Port level
    Gpio,
    /// Output latch
    Olat,
}

impl Register {
    /// Address of this register for `port`
    pub const fn address(self, port: Port, bank: bool) -> u8 {
        let index = self as u8;
        let port = port as u8;
        if bank {
            index + port * 0x10
        } else {
            index * 2 + port
        }
    }
}

/// Expander port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Port {
    A = 0,
    B = 1,
}

impl FromStr for Port {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "A" | "a" => Ok(Port::A),
            "B" | "b" => Ok(Port::B),
            other => Err(Error::invalid(format!("port '{}' is neither A nor B", other))),
        }
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PinDirection {
    Output,
    Input,
}

impl PinDirection {
    const fn iodir_bit(self) -> bool {
        matches!(self, PinDirection::Input)
    }
}

/// Parse an expander pin name such as `"A_6"` or `"B_0"`
pub fn parse_port_pin(name: &str) -> Result<(Port, u8)> {
    let (port, pin) = name
        .split_once('_')
        .ok_or_else(|| Error::invalid(format!("pin '{}' is not <port>_<bit>", name)))?;
    let pin: u8 = pin
        .parse()
        .map_err(|_| Error::invalid(format!("pin '{}' has no bit number", name)))?;
    Ok((port.parse()?, check_pin(pin)?))
}

fn check_pin(pin: u8) -> Result<u8> {
    if pin < PINS_PER_PORT {
        Ok(pin)
    } else {
        Err(Error::invalid(format!("pin {} outside 0..{}", pin, PINS_PER_PORT)))
    }
}

/// Chip options, most of them IOCON bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Mcp23017Options {
    /// Separate A and B register banks
    pub bank: bool,
    /// INTA and INTB mirrored
    pub mirror: bool,
    /// Sequential operation disabled
    pub seqop: bool,
    /// SDA slew rate control disabled
    pub disslw: bool,
    /// Hardware address pins enabled (MCP23S17 only)
    pub haen: bool,
    /// INT as open drain
    pub odr: bool,
    /// INT active high
    pub intpol: bool,
    /// Write back even when a register would not change
    pub force_refresh: bool,
    /// Leave pin direction alone in `write_gpio` / `read_gpio`
    pub auto_iodir_off: bool,
}

impl Mcp23017Options {
    /// IOCON register value
    pub const fn iocon(&self) -> u8 {
        (self.bank as u8) << 7
            | (self.mirror as u8) << 6
            | (self.seqop as u8) << 5
            | (self.disslw as u8) << 4
            | (self.haen as u8) << 3
            | (self.odr as u8) << 2
            | (self.intpol as u8) << 1
    }
}

/// Cached direction registers
#[derive(Debug, Default)]
pub struct Mcp23017State {
    iodir: [Option<u8>; 2],
}

/// MCP23017 driver
pub struct Mcp23017<C: Connector> {
    base: DriverBase<C, Mcp23017State>,
    options: Mcp23017Options,
}

/// Builder for [`Mcp23017`]
pub struct Mcp23017Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
    chip: Mcp23017Options,
}

impl<C> DriverBuilder for Mcp23017Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Mcp23017Builder<C> {
    /// Replace every chip option at once
    pub fn options(mut self, options: Mcp23017Options) -> Self {
        self.chip = options;
        self
    }

    pub fn bank(mut self, on: bool) -> Self {
        self.chip.bank = on;
        self
    }

    pub fn mirror(mut self, on: bool) -> Self {
        self.chip.mirror = on;
        self
    }

    pub fn seqop(mut self, on: bool) -> Self {
        self.chip.seqop = on;
        self
    }

    pub fn disslw(mut self, on: bool) -> Self {
        self.chip.disslw = on;
        self
    }

    pub fn haen(mut self, on: bool) -> Self {
        self.chip.haen = on;
        self
    }

    pub fn odr(mut self, on: bool) -> Self {
        self.chip.odr = on;
        self
    }

    pub fn intpol(mut self, on: bool) -> Self {
        self.chip.intpol = on;
        self
    }

    pub fn force_refresh(mut self, on: bool) -> Self {
        self.chip.force_refresh = on;
        self
    }

    pub fn auto_iodir_off(mut self, on: bool) -> Self {
        self.chip.auto_iodir_off = on;
        self
    }

    pub fn build(self) -> Mcp23017<C> {
        Mcp23017 {
            base: DriverBase::new(
                self.connector,
                "MCP23017",
                DEFAULT_ADDRESS,
                self.options,
                Mcp23017State::default(),
            ),
            options: self.chip,
        }
    }
}

/// Set or clear one bit of a register, writing only on change
fn modify_bit<B: I2cBus>(
    conn: &Connection<B>,
    reg: u8,
    pin: u8,
    on: bool,
    force: bool,
) -> Result<u8> {
    let old = conn.read_byte_data(reg)?;
    let new = with_bit(old, pin, on);
    if new != old || force {
        conn.write_byte_data(reg, new)?;
    }
    Ok(new)
}

impl<C: Connector> Mcp23017<C> {
    pub fn builder(connector: Arc<C>) -> Mcp23017Builder<C> {
        Mcp23017Builder {
            connector,
            options: BaseOptions::default(),
            chip: Mcp23017Options::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn base(&self) -> &DriverBase<C, Mcp23017State> {
        &self.base
    }

    pub fn options(&self) -> &Mcp23017Options {
        &self.options
    }

    fn reg(&self, register: Register, port: Port) -> u8 {
        register.address(port, self.options.bank)
    }

    /// Update one pin's direction, using the cached IODIR when it already agrees
    fn ensure_direction(
        &self,
        conn: &Connection<C::Bus>,
        state: &mut Mcp23017State,
        pin: u8,
        direction: PinDirection,
        port: Port,
    ) -> Result<()> {
        let wanted = direction.iodir_bit();
        let cached = state.iodir[port as usize];
        if !self.options.force_refresh && cached.is_some_and(|v| is_bit_set(v, pin) == wanted) {
            return Ok(());
        }
        let iodir = modify_bit(
            conn,
            self.reg(Register::Iodir, port),
            pin,
            wanted,
            self.options.force_refresh,
        )?;
        state.iodir[port as usize] = Some(iodir);
        Ok(())
    }

    /// Drive `pin` of `port` high or low
    ///
    /// Makes the pin an output first unless `auto_iodir_off` is set.
    pub fn write_gpio(&self, pin: u8, val: bool, port: Port) -> Result<()> {
        let pin = check_pin(pin)?;
        self.base.session(|s| {
            if !self.options.auto_iodir_off {
                self.ensure_direction(s.conn, s.state, pin, PinDirection::Output, port)?;
            }
            modify_bit(
                s.conn,
                self.reg(Register::Olat, port),
                pin,
                val,
                self.options.force_refresh,
            )
            .map(|_| ())
        })
    }

    /// Level of `pin` of `port`
    ///
    /// Makes the pin an input first unless `auto_iodir_off` is set.
    pub fn read_gpio(&self, pin: u8, port: Port) -> Result<bool> {
        let pin = check_pin(pin)?;
        self.base.session(|s| {
            if !self.options.auto_iodir_off {
                self.ensure_direction(s.conn, s.state, pin, PinDirection::Input, port)?;
            }
            let gpio = s.conn.read_byte_data(self.reg(Register::Gpio, port))?;
            Ok(is_bit_set(gpio, pin))
        })
    }

    /// Set the direction of `pin` of `port`
    pub fn pin_mode(&self, pin: u8, direction: PinDirection, port: Port) -> Result<()> {
        let pin = check_pin(pin)?;
        self.base.session(|s| {
            let iodir = modify_bit(
                s.conn,
                self.reg(Register::Iodir, port),
                pin,
                direction.iodir_bit(),
                self.options.force_refresh,
            )?;
            s.state.iodir[port as usize] = Some(iodir);
            Ok(())
        })
    }

    /// Enable or disable the internal pull-up of `pin`
    pub fn set_pull_up(&self, pin: u8, val: bool, port: Port) -> Result<()> {
        self.modify(Register::Gppu, pin, val, port)
    }

    /// Invert (or not) the input level of `pin`
    pub fn set_gpio_polarity(&self, pin: u8, val: bool, port: Port) -> Result<()> {
        self.modify(Register::Ipol, pin, val, port)
    }

    fn modify(&self, register: Register, pin: u8, val: bool, port: Port) -> Result<()> {
        let pin = check_pin(pin)?;
        let reg = self.reg(register, port);
        self.base
            .session(|s| modify_bit(s.conn, reg, pin, val, self.options.force_refresh).map(|_| ()))
    }
}

impl<C: Connector> Driver for Mcp23017<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    fn start(&self) -> Result<()> {
        let iocon = self.options.iocon();
        self.base.start(|s| {
            s.conn.write_byte_data(IOCON_POWER_ON, iocon)?;
            s.state.iodir = [None; 2];
            log::debug!("MCP23017 IOCON 0x{:02X}", iocon);
            Ok(())
        })
    }

    fn halt(&self) -> Result<()> {
        self.base.halt(|_| Ok(()))
    }
}

impl<C: Connector> DigitalWriter for Mcp23017<C> {
    fn digital_write(&self, pin: &str, val: u8) -> Result<()> {
        let (port, pin) = parse_port_pin(pin)?;
        self.write_gpio(pin, val != 0, port)
    }
}

impl<C: Connector> DigitalReader for Mcp23017<C> {
    fn digital_read(&self, pin: &str) -> Result<u8> {
        let (port, pin) = parse_port_pin(pin)?;
        self.read_gpio(pin, port).map(u8::from)
    }
}

/// Commands understood by [`Mcp23017`]
#[derive(Debug, Clone, PartialEq)]
pub enum Mcp23017Command {
    WriteGpio { pin: u8, val: bool, port: Port },
    ReadGpio { pin: u8, port: Port },
}

impl Command for Mcp23017Command {
    const KEYS: &'static [&'static str] = &["WriteGPIO", "ReadGPIO"];

    fn parse(key: &str, params: &Params) -> Result<Self> {
        Ok(match key {
            "WriteGPIO" => Mcp23017Command::WriteGpio {
                pin: params.int_as("pin")?,
                val: params.int("val")? != 0,
                port: params.str("port")?.parse()?,
            },
            "ReadGPIO" => Mcp23017Command::ReadGpio {
                pin: params.int_as("pin")?,
                port: params.str("port")?.parse()?,
            },
            other => return Err(Error::UnknownCommand(other.to_owned())),
        })
    }
}

impl<C: Connector> Commander for Mcp23017<C> {
    type Command = Mcp23017Command;

    fn execute(&self, command: Mcp23017Command) -> Reply {
        match command {
            Mcp23017Command::WriteGpio { pin, val, port } => self.write_gpio(pin, val, port).into(),
            Mcp23017Command::ReadGpio { pin, port } => {
                reply(self.read_gpio(pin, port).map(u8::from))
            }
        }
    }
}
