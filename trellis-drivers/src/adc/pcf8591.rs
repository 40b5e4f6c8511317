//! PCF8591 8-bit A/D and D/A converter
//!
//! Four analog inputs, combinable into single-ended or differential
//! channels, and one analog output. All configuration lives in a single
//! control byte that prefixes every write:
//!
//! ```text
//! bit 6     analog output enable
//! bits 5:4  input programming (single, three-diff, mixed, two-diff)
//! bit 2     auto-increment
//! bits 1:0  channel
//! ```
//!
//! A read returns the result of the conversion started by the previous
//! read, so the first byte after a channel switch belongs to the old
//! channel. Reads therefore skip stale bytes before taking the value. At
//! 400 kbit/s the converter needs extra write/read cycles to settle; see
//! [`Pcf8591Builder::with_400kbit_stabilization`].

use std::str::FromStr;
use std::sync::Arc;

use trellis_core::traits::{AnalogReader, AnalogWriter};
use trellis_core::{
    BaseOptions, Connection, Connector, Driver, DriverBase, DriverBuilder, Error, I2cBus,
    I2cConfig, Result,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default 7-bit address (A0..A2 to GND); 0x48..=0x4F selectable
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// Analog output enable
const ANALOG_OUT: u8 = 0x40;
/// Auto-increment
const AUTO_INCREMENT: u8 = 0x04;
/// Input programming and channel bits
const AD_MASK: u8 = 0x33;

/// Relax time before the value byte
const SETTLE_MS: u32 = 1;

/// Upper bound for stale bytes skipped per cycle
pub const MAX_ADDITIONAL_READ: u8 = 15;

/// Analog input programming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InputMode {
    /// Four single-ended inputs
    AllSingle,
    /// Three inputs differential against AIN3
    ThreeDiff,
    /// AIN0, AIN1 single-ended, AIN2-AIN3 differential
    Mixed,
    /// AIN0-AIN1 and AIN2-AIN3 differential
    TwoDiff,
}

impl InputMode {
    pub const fn bits(self) -> u8 {
        match self {
            InputMode::AllSingle => 0x00,
            InputMode::ThreeDiff => 0x10,
            InputMode::Mixed => 0x20,
            InputMode::TwoDiff => 0x30,
        }
    }
}

/// Input programming plus channel, parsed from a read description
///
/// | description | mode | channel |
/// |---|---|---|
/// | `s.0`..`s.3`, `0`..`3` | single | n |
/// | `d.0-1`, `0-1` | two-diff | 0 |
/// | `d.2-3` | two-diff | 1 |
/// | `m.0`, `m.1` | mixed | 0, 1 |
/// | `m.2-3` | mixed | 2 |
/// | `t.0-3`, `0-3` | three-diff | 0 |
/// | `t.1-3`, `1-3` | three-diff | 1 |
/// | `t.2-3` | three-diff | 2 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeChannel {
    pub mode: InputMode,
    pub channel: u8,
}

/// Every accepted read description
pub const DESCRIPTIONS: &[&str] = &[
    "s.0", "0", "s.1", "1", "s.2", "2", "s.3", "3", "d.0-1", "0-1", "d.2-3", "m.0", "m.1", "m.2-3",
    "t.0-3", "0-3", "t.1-3", "1-3", "t.2-3",
];

impl ModeChannel {
    const fn new(mode: InputMode, channel: u8) -> Self {
        Self { mode, channel }
    }

    /// Whether the value is a signed difference
    pub fn is_differential(&self) -> bool {
        match self.mode {
            InputMode::AllSingle => false,
            InputMode::ThreeDiff | InputMode::TwoDiff => true,
            InputMode::Mixed => self.channel == 2,
        }
    }

    /// Control byte for reading this channel, keeping the output bit of `last`
    pub fn ctrl_byte(&self, last: u8) -> u8 {
        ((last & !AD_MASK) | self.mode.bits() | self.channel) & !AUTO_INCREMENT
    }
}

impl FromStr for ModeChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        use InputMode::*;
        Ok(match s {
            "s.0" | "0" => Self::new(AllSingle, 0),
            "s.1" | "1" => Self::new(AllSingle, 1),
            "s.2" | "2" => Self::new(AllSingle, 2),
            "s.3" | "3" => Self::new(AllSingle, 3),
            "d.0-1" | "0-1" => Self::new(TwoDiff, 0),
            "d.2-3" => Self::new(TwoDiff, 1),
            "m.0" => Self::new(Mixed, 0),
            "m.1" => Self::new(Mixed, 1),
            "m.2-3" => Self::new(Mixed, 2),
            "t.0-3" | "0-3" => Self::new(ThreeDiff, 0),
            "t.1-3" | "1-3" => Self::new(ThreeDiff, 1),
            "t.2-3" => Self::new(ThreeDiff, 2),
            other => {
                return Err(Error::invalid(format!(
                    "unknown description '{}' for analog read, accepted: {}",
                    other,
                    DESCRIPTIONS.join(", ")
                )))
            }
        })
    }
}

/// Read-path tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pcf8591Options {
    /// Extra control-write/read cycles per value
    pub additional_read_write: u8,
    /// Extra stale bytes skipped per cycle
    pub additional_read: u8,
    /// Write the control byte even when unchanged
    pub force_refresh: bool,
}

/// Control byte and output shadow
#[derive(Debug, Default)]
pub struct Pcf8591State {
    /// Last control byte sent, `None` before the first write
    last_ctrl: Option<u8>,
    last_analog_out: Option<u8>,
}

impl Pcf8591State {
    fn ctrl(&self) -> u8 {
        self.last_ctrl.unwrap_or(0)
    }

    fn write_ctrl<B: I2cBus>(&mut self, conn: &Connection<B>, ctrl: u8, force: bool) -> Result<()> {
        if force || self.last_ctrl != Some(ctrl) {
            conn.write_byte(ctrl)?;
            self.last_ctrl = Some(ctrl);
        } else {
            log::trace!("PCF8591 control byte 0x{:02X} unchanged", ctrl);
        }
        Ok(())
    }

    fn set_output<B: I2cBus>(&mut self, conn: &Connection<B>, on: bool, force: bool) -> Result<()> {
        let ctrl = if on {
            self.ctrl() | ANALOG_OUT
        } else {
            self.ctrl() & !ANALOG_OUT
        };
        self.write_ctrl(conn, ctrl, force)
    }
}

/// Read and drop `count` bytes in one transfer
fn skip_bytes<B: I2cBus>(conn: &Connection<B>, count: usize) -> Result<()> {
    let mut buf: heapless::Vec<u8, { MAX_ADDITIONAL_READ as usize + 1 }> = heapless::Vec::new();
    buf.resize(count, 0)
        .map_err(|_| Error::invalid(format!("cannot skip {} bytes", count)))?;
    let n = conn.read(&mut buf)?;
    if n != count {
        return Err(Error::NotEnoughBytes {
            read: n,
            expected: count,
        });
    }
    Ok(())
}

/// PCF8591 driver
pub struct Pcf8591<C: Connector> {
    base: DriverBase<C, Pcf8591State>,
    options: Pcf8591Options,
}

/// Builder for [`Pcf8591`]
pub struct Pcf8591Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
    pcf: Pcf8591Options,
}

impl<C> DriverBuilder for Pcf8591Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Pcf8591Builder<C> {
    /// Extra cycles for reliable reads at 400 kbit/s
    ///
    /// Negative values pick what works for most boards: one extra
    /// write/read cycle and two extra skipped bytes.
    pub fn with_400kbit_stabilization(mut self, read_write: i32, read: i32) -> Self {
        let clamp = |v: i32, fallback: u8| {
            if v < 0 {
                fallback
            } else {
                u8::try_from(v).unwrap_or(u8::MAX)
            }
        };
        self.pcf.additional_read_write = clamp(read_write, 1);
        let additional_read = clamp(read, 2);
        if additional_read > MAX_ADDITIONAL_READ {
            log::warn!(
                "PCF8591 additional read {} clamped to {}",
                additional_read,
                MAX_ADDITIONAL_READ
            );
        }
        self.pcf.additional_read = additional_read.min(MAX_ADDITIONAL_READ);
        log::debug!(
            "PCF8591 400 kbit stabilization rw: {}, r: {}",
            self.pcf.additional_read_write,
            self.pcf.additional_read
        );
        self
    }

    /// Pick stabilization from the bus speed
    ///
    /// Buses above standard mode get the default extra cycles; slower
    /// buses keep whatever was configured.
    pub fn bus_config(self, bus: I2cConfig) -> Self {
        if bus.is_fast() {
            self.with_400kbit_stabilization(-1, -1)
        } else {
            self
        }
    }

    /// Rewrite the control byte on every access
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.pcf.force_refresh = force;
        self
    }

    pub fn build(self) -> Pcf8591<C> {
        Pcf8591 {
            base: DriverBase::new(
                self.connector,
                "PCF8591",
                DEFAULT_ADDRESS,
                self.options,
                Pcf8591State::default(),
            ),
            options: self.pcf,
        }
    }
}

impl<C: Connector> Pcf8591<C> {
    pub fn builder(connector: Arc<C>) -> Pcf8591Builder<C> {
        Pcf8591Builder {
            connector,
            options: BaseOptions::default(),
            pcf: Pcf8591Options::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn base(&self) -> &DriverBase<C, Pcf8591State> {
        &self.base
    }

    pub fn options(&self) -> Pcf8591Options {
        self.options
    }

    /// Convert the input named by `description`
    ///
    /// Single-ended values are 0..=255, differential values -128..=127.
    pub fn analog_read(&self, description: &str) -> Result<i32> {
        let mc: ModeChannel = description.parse()?;
        let opts = self.options;

        self.base.session(|s| {
            let ctrl = mc.ctrl_byte(s.state.ctrl());
            let mut value = 0u8;
            for cycle in 0..=opts.additional_read_write {
                s.state.write_ctrl(s.conn, ctrl, opts.force_refresh || cycle > 0)?;
                skip_bytes(s.conn, 1 + usize::from(opts.additional_read))?;
                s.delay.delay_ms(SETTLE_MS);
                value = s.conn.read_byte()?;
            }

            if mc.is_differential() {
                Ok(i32::from(value as i8))
            } else {
                Ok(i32::from(value))
            }
        })
    }

    /// Set the DAC output, enabling it
    ///
    /// Writing the value already on an enabled output is skipped unless
    /// `force_refresh` is set.
    pub fn analog_write(&self, value: u8) -> Result<()> {
        let force = self.options.force_refresh;
        self.base.session(|s| {
            let enabled = s.state.last_ctrl.is_some_and(|c| c & ANALOG_OUT != 0);
            if !force && enabled && s.state.last_analog_out == Some(value) {
                log::trace!("PCF8591 output 0x{:02X} unchanged", value);
                return Ok(());
            }
            let ctrl = s.state.ctrl() | ANALOG_OUT;
            s.conn.write_byte_data(ctrl, value)?;
            s.state.last_ctrl = Some(ctrl);
            s.state.last_analog_out = Some(value);
            Ok(())
        })
    }

    /// Enable or disable the DAC output
    pub fn analog_output_state(&self, on: bool) -> Result<()> {
        let force = self.options.force_refresh;
        self.base.session(|s| s.state.set_output(s.conn, on, force))
    }
}

impl<C: Connector> AnalogReader for Pcf8591<C> {
    fn analog_read(&self, pin: &str) -> Result<i32> {
        Pcf8591::analog_read(self, pin)
    }
}

impl<C: Connector> AnalogWriter for Pcf8591<C> {
    /// `pin` is ignored, there is one output
    fn analog_write(&self, _pin: &str, val: i32) -> Result<()> {
        let value = u8::try_from(val)
            .map_err(|_| Error::invalid(format!("PCF8591 output {} out of 0..=255", val)))?;
        Pcf8591::analog_write(self, value)
    }
}

impl<C: Connector> Driver for Pcf8591<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    /// The power-on control byte is unknown, so start always writes it
    fn start(&self) -> Result<()> {
        self.base.start(|s| {
            *s.state = Pcf8591State::default();
            s.state.set_output(s.conn, false, true)
        })
    }

    fn halt(&self) -> Result<()> {
        let force = self.options.force_refresh;
        self.base.halt(|s| s.state.set_output(s.conn, false, force))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trellis_core::mock::{self, MockBus, MockFactory, RecordingDelay};
    use trellis_core::BusAdapter;

    type TestPcf = Pcf8591<BusAdapter<MockFactory>>;
    type TestBuilder = Pcf8591Builder<BusAdapter<MockFactory>>;

    fn started(configure: impl FnOnce(TestBuilder) -> TestBuilder) -> (TestPcf, MockBus, RecordingDelay) {
        let (adapter, bus) = mock::adapter();
        let delay = RecordingDelay::new();
        let pcf = configure(Pcf8591::builder(adapter).delay(delay.clone())).build();
        pcf.start().unwrap();
        bus.clear_written();
        (pcf, bus, delay)
    }

    #[test]
    fn test_start_writes_ctrl() {
        let (adapter, bus) = mock::adapter();
        let pcf = Pcf8591::new(adapter);

        pcf.start().unwrap();

        assert_eq!(bus.written(), vec![0x00]);
        assert_eq!(bus.addresses(), vec![DEFAULT_ADDRESS]);
    }

    #[test]
    fn test_parse_descriptions() {
        for d in DESCRIPTIONS {
            assert!(d.parse::<ModeChannel>().is_ok(), "{}", d);
        }
        let mc: ModeChannel = "m.2-3".parse().unwrap();
        assert_eq!(mc, ModeChannel::new(InputMode::Mixed, 2));
        assert!(mc.is_differential());
        assert!(!"m.1".parse::<ModeChannel>().unwrap().is_differential());
        assert!(matches!("s.4".parse::<ModeChannel>(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_ctrl_byte_keeps_output_bit() {
        let mc = ModeChannel::new(InputMode::TwoDiff, 1);
        assert_eq!(mc.ctrl_byte(0x00), 0x31);
        assert_eq!(mc.ctrl_byte(0x40), 0x71);
        assert_eq!(mc.ctrl_byte(0x47), 0x71);
    }

    #[test]
    fn test_single_read() {
        let (pcf, bus, delay) = started(|b| b);
        bus.queue_read(&[0x80, 0x7B]);

        assert_eq!(pcf.analog_read("s.2").unwrap(), 123);
        assert_eq!(bus.written(), vec![0x02]);
        assert_eq!(delay.delays(), vec![Duration::from_millis(1)]);

        // Same channel: control byte not rewritten
        bus.clear_written();
        bus.queue_read(&[0x7B, 0xC8]);
        assert_eq!(pcf.analog_read("2").unwrap(), 200);
        assert!(bus.written().is_empty());
    }

    #[test]
    fn test_differential_read_is_signed() {
        let (pcf, bus, _) = started(|b| b);

        bus.queue_read(&[0x00, 0xFF]);
        assert_eq!(pcf.analog_read("d.0-1").unwrap(), -1);
        assert_eq!(bus.written(), vec![0x30]);

        bus.queue_read(&[0x00, 0x80]);
        assert_eq!(pcf.analog_read("t.2-3").unwrap(), -128);

        bus.queue_read(&[0x00, 0xFF]);
        assert_eq!(pcf.analog_read("m.1").unwrap(), 255);
    }

    #[test]
    fn test_force_refresh() {
        let (pcf, bus, _) = started(|b| b.force_refresh(true));
        bus.queue_read(&[0, 1, 0, 1]);

        pcf.analog_read("1").unwrap();
        pcf.analog_read("1").unwrap();

        assert_eq!(bus.written(), vec![0x01, 0x01]);
    }

    #[test]
    fn test_400kbit_stabilization() {
        let (pcf, bus, delay) = started(|b| b.with_400kbit_stabilization(-1, -1));
        assert_eq!(pcf.options().additional_read_write, 1);
        assert_eq!(pcf.options().additional_read, 2);
        bus.queue_read(&[9, 9, 9, 1, 9, 9, 9, 42]);

        assert_eq!(pcf.analog_read("s.3").unwrap(), 42);

        // Second cycle always rewrites the control byte
        assert_eq!(bus.written(), vec![0x03, 0x03]);
        assert_eq!(delay.delays().len(), 2);
    }

    #[test]
    fn test_bus_config_picks_stabilization() {
        let (fast, _, _) = started(|b| b.bus_config(I2cConfig::FAST));
        assert_eq!(fast.options().additional_read_write, 1);
        assert_eq!(fast.options().additional_read, 2);

        let (slow, _, _) = started(|b| b.bus_config(I2cConfig::STANDARD));
        assert_eq!(slow.options(), Pcf8591Options::default());
    }

    #[test]
    fn test_unknown_description() {
        let (pcf, bus, _) = started(|b| b);

        assert!(matches!(pcf.analog_read("x.9"), Err(Error::InvalidArgument(_))));
        assert!(bus.written().is_empty());
    }

    #[test]
    fn test_short_read() {
        let (pcf, bus, _) = started(|b| b);
        bus.limit_reads(0);

        assert_eq!(
            pcf.analog_read("0"),
            Err(Error::NotEnoughBytes { read: 0, expected: 1 })
        );
    }

    #[test]
    fn test_analog_write_and_output_state() {
        let (pcf, bus, _) = started(|b| b);

        pcf.analog_write(0x80).unwrap();
        pcf.analog_write(0x80).unwrap();
        assert_eq!(bus.written(), vec![0x40, 0x80]);

        // Output bit survives a channel switch
        bus.clear_written();
        bus.queue_read(&[0, 0]);
        pcf.analog_read("1").unwrap();
        assert_eq!(bus.written(), vec![0x41]);

        bus.clear_written();
        pcf.analog_output_state(false).unwrap();
        assert_eq!(bus.written(), vec![0x01]);
    }

    #[test]
    fn test_analog_write_reenables_output() {
        let (pcf, bus, _) = started(|b| b);

        pcf.analog_write(100).unwrap();
        pcf.analog_output_state(false).unwrap();
        pcf.analog_write(100).unwrap();

        assert_eq!(bus.written(), vec![0x40, 100, 0x00, 0x40, 100]);
    }

    #[test]
    fn test_analog_write_force_refresh() {
        let (pcf, bus, _) = started(|b| b.force_refresh(true));

        pcf.analog_write(7).unwrap();
        pcf.analog_write(7).unwrap();

        assert_eq!(bus.written(), vec![0x40, 7, 0x40, 7]);
    }

    #[test]
    fn test_additional_read_clamped() {
        let (pcf, bus, _) = started(|b| b.with_400kbit_stabilization(0, 200));
        assert_eq!(pcf.options().additional_read, MAX_ADDITIONAL_READ);
        let mut frame = vec![0u8; usize::from(MAX_ADDITIONAL_READ) + 1];
        frame.push(77);
        bus.queue_read(&frame);

        assert_eq!(pcf.analog_read("0").unwrap(), 77);
    }

    #[test]
    fn test_analog_writer_range() {
        let (pcf, bus, _) = started(|b| b);

        assert!(matches!(
            AnalogWriter::analog_write(&pcf, "", 256),
            Err(Error::InvalidArgument(_))
        ));
        AnalogWriter::analog_write(&pcf, "", 255).unwrap();
        assert_eq!(bus.written(), vec![0x40, 0xFF]);
    }

    #[test]
    fn test_halt_turns_output_off() {
        let (pcf, bus, _) = started(|b| b);
        pcf.analog_output_state(true).unwrap();
        bus.clear_written();

        pcf.halt().unwrap();

        assert_eq!(bus.written(), vec![0x00]);
        assert_eq!(pcf.analog_read("0"), Err(Error::NotStarted));
    }
}
