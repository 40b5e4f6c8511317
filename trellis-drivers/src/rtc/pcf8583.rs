//! PCF8583 clock/calendar and event counter
//!
//! The chip keeps either a clock (hundredths to month, two-bit year) or a
//! six-digit event counter in registers 0x01..0x06, all BCD. Bytes 0x10 to
//! 0xFF are free RAM.
//!
//! The device only counts four years. The driver remembers the full year
//! and year bits of the last written time; on read it adds how far the bits
//! moved since (mod 4), so up to three year rollovers are reconstructed.
//!
//! Writes follow the datasheet: set the stop bit in CTRL, write the block
//! with auto-increment, clear the stop bit.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use trellis_core::bits::{bcd_decode, bcd_encode};
use trellis_core::command::{reply, Command, Commander, Params, Reply};
use trellis_core::{
    BaseOptions, Connection, Connector, Driver, DriverBase, DriverBuilder, Error, I2cBus, Result,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default 7-bit address (A0 low)
pub const DEFAULT_ADDRESS: u8 = 0x50;

/// First RAM byte
pub const RAM_OFFSET: u8 = 0x10;

/// Largest value the event counter holds
pub const COUNTER_MAX: i32 = 999_999;

/// PCF8583 registers
pub mod reg {
    /// Control/status
    pub const CTRL: u8 = 0x00;
    /// Hundredths of a second (clock) or counter digits 1 and 2
    pub const SUBSECONDS: u8 = 0x01;
    pub const SECONDS: u8 = 0x02;
    pub const MINUTES: u8 = 0x03;
    pub const HOURS: u8 = 0x04;
    /// Year bits 7..6, day of month 5..0
    pub const YEAR_DATE: u8 = 0x05;
    /// Weekday bits 7..5, month 4..0
    pub const WEEKDAY_MONTH: u8 = 0x06;
}

/// CTRL bits
pub mod ctrl {
    /// Stop counting while set
    pub const STOP: u8 = 0x80;
    /// Function mode field
    pub const MODE_MASK: u8 = 0x30;
    /// Set in every non-clock mode
    pub const MODE_COUNTER: u8 = 0x20;
}

/// Function mode in CTRL bits 5..4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Pcf8583Mode {
    /// Clock from a 32.768 kHz crystal
    #[default]
    Clock32kHz,
    /// Clock from a 50 Hz mains signal
    Clock50Hz,
    /// Count pulses on OSCI
    EventCounter,
    /// Factory test, not usable
    Test,
}

impl Pcf8583Mode {
    pub const fn bits(self) -> u8 {
        match self {
            Pcf8583Mode::Clock32kHz => 0x00,
            Pcf8583Mode::Clock50Hz => 0x10,
            Pcf8583Mode::EventCounter => 0x20,
            Pcf8583Mode::Test => 0x30,
        }
    }

    pub const fn from_ctrl(ctrl: u8) -> Self {
        match ctrl & ctrl::MODE_MASK {
            0x00 => Pcf8583Mode::Clock32kHz,
            0x10 => Pcf8583Mode::Clock50Hz,
            0x20 => Pcf8583Mode::EventCounter,
            _ => Pcf8583Mode::Test,
        }
    }
}

fn is_clock_mode(ctrl: u8) -> bool {
    ctrl & ctrl::MODE_COUNTER == 0
}

fn is_counter_mode(ctrl: u8) -> bool {
    ctrl & ctrl::MODE_MASK == ctrl::MODE_COUNTER
}

/// Full year paired with the device year bits it was written as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct YearAnchor {
    pub year: i32,
    pub bits: u8,
}

impl YearAnchor {
    /// Full year for the device's current year bits
    pub fn year_for(&self, bits: u8) -> i32 {
        self.year + i32::from((bits + 4 - (self.bits & 0x03)) % 4)
    }
}

/// Encode `t` as the six clock registers
///
/// Returns the registers and the year anchor to remember.
pub fn encode_time(t: &NaiveDateTime) -> ([u8; 6], YearAnchor) {
    let year = t.year();
    let year_bits = year.rem_euclid(4) as u8;
    let hundredths = (t.nanosecond() / 10_000_000).min(99) as u8;
    let weekday = t.weekday().num_days_from_sunday() as u8;
    let regs = [
        bcd_encode(hundredths),
        bcd_encode(t.second() as u8),
        bcd_encode(t.minute() as u8),
        bcd_encode(t.hour() as u8),
        year_bits << 6 | bcd_encode(t.day() as u8),
        weekday << 5 | bcd_encode(t.month() as u8),
    ];
    (regs, YearAnchor { year, bits: year_bits })
}

/// Rebuild a date-time from the six clock registers
pub fn decode_time(regs: &[u8; 6], anchor: YearAnchor) -> Result<NaiveDateTime> {
    let millis = u32::from(bcd_decode(regs[0])) * 10;
    let second = u32::from(bcd_decode(regs[1]));
    let minute = u32::from(bcd_decode(regs[2]));
    let hour = u32::from(bcd_decode(regs[3] & 0x3F));
    let year = anchor.year_for(regs[4] >> 6);
    let day = u32::from(bcd_decode(regs[4] & 0x3F));
    let month = u32::from(bcd_decode(regs[5] & 0x1F));

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_milli_opt(hour, minute, second, millis))
        .ok_or_else(|| {
            Error::invalid(format!(
                "registers {:02X?} hold no valid date in year {}",
                regs, year
            ))
        })
}

/// Encode a counter value as three little-endian BCD bytes
pub fn encode_counter(n: i32) -> Result<[u8; 3]> {
    if !(0..=COUNTER_MAX).contains(&n) {
        return Err(Error::invalid(format!("counter {} outside 0..={}", n, COUNTER_MAX)));
    }
    Ok([
        bcd_encode((n % 100) as u8),
        bcd_encode((n / 100 % 100) as u8),
        bcd_encode((n / 10_000 % 100) as u8),
    ])
}

pub fn decode_counter(regs: &[u8; 3]) -> i32 {
    i32::from(bcd_decode(regs[0]))
        + i32::from(bcd_decode(regs[1])) * 100
        + i32::from(bcd_decode(regs[2])) * 10_000
}

fn ram_register(address: u8) -> Result<u8> {
    let real = u16::from(address) + u16::from(RAM_OFFSET);
    u8::try_from(real).map_err(|_| Error::RamOverflow(real))
}

/// Read CTRL and check it against `wanted`
fn ctrl_in_mode<B: I2cBus>(conn: &Connection<B>, wanted: fn(u8) -> bool) -> Result<u8> {
    let ctrl = conn.read_byte_data(reg::CTRL)?;
    if wanted(ctrl) {
        Ok(ctrl)
    } else {
        Err(Error::WrongMode(ctrl))
    }
}

/// Write `data` from 0x01 with the counter stopped, then restart it
fn write_stopped<B: I2cBus>(conn: &Connection<B>, ctrl: u8, data: &[u8]) -> Result<()> {
    let mut frame: heapless::Vec<u8, 7> = heapless::Vec::new();
    let _ = frame.push(ctrl | ctrl::STOP);
    frame
        .extend_from_slice(data)
        .map_err(|_| Error::invalid("PCF8583 data block longer than 6 bytes"))?;
    conn.write_block_data(reg::CTRL, &frame)?;
    conn.write_byte_data(reg::CTRL, ctrl & !ctrl::STOP)
}

/// Continue reading after CTRL with auto-increment
fn read_following<B: I2cBus>(conn: &Connection<B>, buf: &mut [u8]) -> Result<()> {
    let n = conn.read(buf)?;
    if n != buf.len() {
        return Err(Error::NotEnoughBytes {
            read: n,
            expected: buf.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct Pcf8583State {
    year: YearAnchor,
}

/// PCF8583 driver
pub struct Pcf8583<C: Connector> {
    base: DriverBase<C, Pcf8583State>,
    mode: Pcf8583Mode,
}

/// Builder for [`Pcf8583`]
pub struct Pcf8583Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
    mode: Pcf8583Mode,
}

impl<C> DriverBuilder for Pcf8583Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Pcf8583Builder<C> {
    /// Mode to switch the chip to on start
    pub fn mode(mut self, mode: Pcf8583Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Pcf8583<C> {
        Pcf8583 {
            base: DriverBase::new(
                self.connector,
                "PCF8583",
                DEFAULT_ADDRESS,
                self.options,
                Pcf8583State::default(),
            ),
            mode: self.mode,
        }
    }
}

impl<C: Connector> Pcf8583<C> {
    pub fn builder(connector: Arc<C>) -> Pcf8583Builder<C> {
        Pcf8583Builder {
            connector,
            options: BaseOptions::default(),
            mode: Pcf8583Mode::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn base(&self) -> &DriverBase<C, Pcf8583State> {
        &self.base
    }

    pub fn mode(&self) -> Pcf8583Mode {
        self.mode
    }

    /// Year and year bits of the last written time
    pub fn year_anchor(&self) -> YearAnchor {
        self.base.with_state(|s| s.year)
    }

    /// Set the clock; the device must be in a clock mode
    pub fn write_time(&self, time: NaiveDateTime) -> Result<()> {
        self.base.session(|s| {
            let ctrl = ctrl_in_mode(s.conn, is_clock_mode)?;
            let (regs, anchor) = encode_time(&time);
            write_stopped(s.conn, ctrl, &regs)?;
            s.state.year = anchor;
            Ok(())
        })
    }

    /// Read the clock; the device must be in a clock mode
    pub fn read_time(&self) -> Result<NaiveDateTime> {
        self.base.session(|s| {
            ctrl_in_mode(s.conn, is_clock_mode)?;
            let mut regs = [0u8; 6];
            read_following(s.conn, &mut regs)?;
            decode_time(&regs, s.state.year)
        })
    }

    /// Preset the event counter, `0..=999_999`
    pub fn write_counter(&self, value: i32) -> Result<()> {
        let regs = encode_counter(value)?;
        self.base.session(|s| {
            let ctrl = ctrl_in_mode(s.conn, is_counter_mode)?;
            write_stopped(s.conn, ctrl, &regs)
        })
    }

    pub fn read_counter(&self) -> Result<i32> {
        self.base.session(|s| {
            ctrl_in_mode(s.conn, is_counter_mode)?;
            let mut regs = [0u8; 3];
            read_following(s.conn, &mut regs)?;
            Ok(decode_counter(&regs))
        })
    }

    /// Store `value` at RAM `address` (0x00..=0xEF)
    pub fn write_ram(&self, address: u8, value: u8) -> Result<()> {
        let reg = ram_register(address)?;
        self.base.session(|s| s.conn.write_byte_data(reg, value))
    }

    pub fn read_ram(&self, address: u8) -> Result<u8> {
        let reg = ram_register(address)?;
        self.base.session(|s| s.conn.read_byte_data(reg))
    }
}

impl<C: Connector> Driver for Pcf8583<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    fn start(&self) -> Result<()> {
        let mode = self.mode;
        self.base.start(|s| {
            if mode == Pcf8583Mode::Test {
                return Err(Error::invalid("PCF8583 test mode is not supported"));
            }
            let ctrl = s.conn.read_byte_data(reg::CTRL)?;
            if ctrl & ctrl::MODE_MASK != mode.bits() {
                let switched = (ctrl & !ctrl::MODE_MASK) | mode.bits();
                s.conn.write_byte_data(reg::CTRL, switched)?;
                log::debug!("PCF8583 switched to {:?} (CTRL 0x{:02X})", mode, switched);
            }
            Ok(())
        })
    }

    fn halt(&self) -> Result<()> {
        self.base.halt(|_| Ok(()))
    }
}

/// Commands understood by [`Pcf8583`]
#[derive(Debug, Clone, PartialEq)]
pub enum Pcf8583Command {
    WriteTime { val: NaiveDateTime },
    ReadTime,
    WriteCounter { val: i32 },
    ReadCounter,
    WriteRam { address: u8, val: u8 },
    ReadRam { address: u8 },
}

impl Command for Pcf8583Command {
    const KEYS: &'static [&'static str] = &[
        "WriteTime",
        "ReadTime",
        "WriteCounter",
        "ReadCounter",
        "WriteRAM",
        "ReadRAM",
    ];

    fn parse(key: &str, params: &Params) -> Result<Self> {
        Ok(match key {
            "WriteTime" => Pcf8583Command::WriteTime {
                val: params.time("val")?,
            },
            "ReadTime" => Pcf8583Command::ReadTime,
            "WriteCounter" => Pcf8583Command::WriteCounter {
                val: params.int_as("val")?,
            },
            "ReadCounter" => Pcf8583Command::ReadCounter,
            "WriteRAM" => Pcf8583Command::WriteRam {
                address: params.int_as("address")?,
                val: params.int_as("val")?,
            },
            "ReadRAM" => Pcf8583Command::ReadRam {
                address: params.int_as("address")?,
            },
            other => return Err(Error::UnknownCommand(other.to_owned())),
        })
    }
}

impl<C: Connector> Commander for Pcf8583<C> {
    type Command = Pcf8583Command;

    fn execute(&self, command: Pcf8583Command) -> Reply {
        match command {
            Pcf8583Command::WriteTime { val } => self.write_time(val).into(),
            Pcf8583Command::ReadTime => reply(self.read_time()),
            Pcf8583Command::WriteCounter { val } => self.write_counter(val).into(),
            Pcf8583Command::ReadCounter => reply(self.read_counter()),
            Pcf8583Command::WriteRam { address, val } => self.write_ram(address, val).into(),
            Pcf8583Command::ReadRam { address } => reply(self.read_ram(address)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use trellis_core::command::Value;
    use trellis_core::mock::{self, MockBus, MockFactory};
    use trellis_core::BusAdapter;

    type TestRtc = Pcf8583<BusAdapter<MockFactory>>;

    fn started(mode: Pcf8583Mode) -> (TestRtc, MockBus) {
        let (adapter, bus) = mock::adapter();
        let rtc = Pcf8583::builder(adapter).mode(mode).build();
        rtc.start().unwrap();
        bus.clear_written();
        (rtc, bus)
    }

    fn e3_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 12, 16)
            .unwrap()
            .and_hms_milli_opt(15, 14, 13, 210)
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let (adapter, bus) = mock::adapter();
        let rtc = Pcf8583::new(adapter);

        assert_eq!(rtc.mode(), Pcf8583Mode::Clock32kHz);
        assert_eq!(rtc.year_anchor(), YearAnchor::default());
        assert!(rtc.name().starts_with("PCF8583-"));
        rtc.start().unwrap();
        assert_eq!(bus.addresses(), vec![DEFAULT_ADDRESS]);
        // Already in clock mode: read only
        assert_eq!(bus.written(), vec![reg::CTRL]);
    }

    #[test]
    fn test_start_switches_mode() {
        let (adapter, bus) = mock::adapter();
        bus.set_register(reg::CTRL, 0x07);
        let rtc = Pcf8583::builder(adapter).mode(Pcf8583Mode::EventCounter).build();

        rtc.start().unwrap();

        assert_eq!(bus.written(), vec![reg::CTRL, reg::CTRL, 0x27]);
    }

    #[test]
    fn test_start_rejects_test_mode() {
        let (adapter, bus) = mock::adapter();
        let rtc = Pcf8583::builder(adapter).mode(Pcf8583Mode::Test).build();

        assert!(matches!(rtc.start(), Err(Error::InvalidArgument(_))));
        assert!(!rtc.base().is_running());
        assert!(bus.written().is_empty());
    }

    #[test]
    fn test_write_time() {
        let (rtc, bus) = started(Pcf8583Mode::Clock32kHz);
        bus.set_register(reg::CTRL, 0x07);

        rtc.write_time(e3_time()).unwrap();

        assert_eq!(
            bus.written(),
            vec![
                reg::CTRL,
                reg::CTRL, 0x87, 0x21, 0x13, 0x14, 0x15, 0x96, 0xB2,
                reg::CTRL, 0x07,
            ]
        );
        assert_eq!(rtc.year_anchor(), YearAnchor { year: 2022, bits: 2 });
    }

    #[test]
    fn test_time_round_trip() {
        let (rtc, _) = started(Pcf8583Mode::Clock32kHz);

        rtc.write_time(e3_time()).unwrap();

        assert_eq!(rtc.read_time().unwrap(), e3_time());
    }

    #[test]
    fn test_read_time_year_rollover() {
        let (rtc, bus) = started(Pcf8583Mode::Clock32kHz);
        rtc.write_time(e3_time()).unwrap();
        // The device ticked into 2023: year bits 3, January 1st
        bus.set_register(reg::YEAR_DATE, 0xC1);
        bus.set_register(reg::WEEKDAY_MONTH, 0x01);

        let t = rtc.read_time().unwrap();

        assert_eq!(t.date(), NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
    }

    #[test]
    fn test_read_time_across_four_year_wrap() {
        let (rtc, bus) = started(Pcf8583Mode::Clock32kHz);
        let new_years_eve = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_milli_opt(23, 59, 59, 990)
            .unwrap();
        rtc.write_time(new_years_eve).unwrap();
        // Year bits wrapped 3 -> 0 at midnight
        bus.set_register(reg::SUBSECONDS, 0x00);
        bus.set_register(reg::SECONDS, 0x00);
        bus.set_register(reg::MINUTES, 0x00);
        bus.set_register(reg::HOURS, 0x00);
        bus.set_register(reg::YEAR_DATE, 0x01);
        bus.set_register(reg::WEEKDAY_MONTH, 0x01);

        let t = rtc.read_time().unwrap();

        assert_eq!(
            t,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_year_anchor_counts_three_rollovers() {
        let anchor = YearAnchor { year: 2021, bits: 1 };
        assert_eq!(anchor.year_for(1), 2021);
        assert_eq!(anchor.year_for(2), 2022);
        assert_eq!(anchor.year_for(3), 2023);
        assert_eq!(anchor.year_for(0), 2024);
    }

    #[test]
    fn test_time_in_counter_mode() {
        let (rtc, bus) = started(Pcf8583Mode::EventCounter);

        assert_eq!(rtc.write_time(e3_time()), Err(Error::WrongMode(0x20)));
        assert_eq!(bus.written(), vec![reg::CTRL]);
        assert_eq!(rtc.read_time(), Err(Error::WrongMode(0x20)));
    }

    #[test]
    fn test_invalid_date_registers() {
        let (rtc, bus) = started(Pcf8583Mode::Clock32kHz);
        bus.set_register(reg::YEAR_DATE, 0x31);
        bus.set_register(reg::WEEKDAY_MONTH, 0x02);

        assert!(matches!(rtc.read_time(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_short_read() {
        let (rtc, bus) = started(Pcf8583Mode::Clock32kHz);
        bus.limit_reads(1);

        assert_eq!(
            rtc.read_time(),
            Err(Error::NotEnoughBytes { read: 1, expected: 6 })
        );
    }

    #[test]
    fn test_write_counter() {
        let (rtc, bus) = started(Pcf8583Mode::EventCounter);

        rtc.write_counter(123_456).unwrap();

        assert_eq!(
            bus.written(),
            vec![reg::CTRL, reg::CTRL, 0xA0, 0x56, 0x34, 0x12, reg::CTRL, 0x20]
        );
        assert_eq!(rtc.read_counter().unwrap(), 123_456);
    }

    #[test]
    fn test_counter_range_and_mode() {
        let (rtc, bus) = started(Pcf8583Mode::EventCounter);

        assert!(matches!(rtc.write_counter(1_000_000), Err(Error::InvalidArgument(_))));
        assert!(matches!(rtc.write_counter(-1), Err(Error::InvalidArgument(_))));
        assert!(bus.written().is_empty());

        let (rtc, _) = started(Pcf8583Mode::Clock50Hz);
        assert_eq!(rtc.write_counter(5), Err(Error::WrongMode(0x10)));
        assert_eq!(rtc.read_counter(), Err(Error::WrongMode(0x10)));
    }

    #[test]
    fn test_ram() {
        let (rtc, bus) = started(Pcf8583Mode::Clock32kHz);

        rtc.write_ram(0x00, 0xAB).unwrap();
        rtc.write_ram(0xEF, 0x01).unwrap();

        assert_eq!(bus.register(0x10), 0xAB);
        assert_eq!(bus.register(0xFF), 0x01);
        assert_eq!(rtc.read_ram(0x00).unwrap(), 0xAB);
        assert_eq!(rtc.write_ram(0xF0, 1), Err(Error::RamOverflow(0x100)));
        assert_eq!(rtc.read_ram(0xFF), Err(Error::RamOverflow(0x10F)));
    }

    #[test]
    fn test_commands() {
        let (rtc, bus) = started(Pcf8583Mode::Clock32kHz);

        let params = Params::new().with("val", "2022-12-16 15:14:13.21");
        assert!(rtc.command("WriteTime", &params).is_ok());
        let reply = rtc.command("ReadTime", &Params::new());
        assert_eq!(reply.val, Some(Value::Time(e3_time())));

        let params = Params::new().with("address", 3u8).with("val", 0x42u8);
        assert!(rtc.command("WriteRAM", &params).is_ok());
        assert_eq!(bus.register(0x13), 0x42);
        let reply = rtc.command("ReadRAM", &Params::new().with("address", 3u8));
        assert_eq!(reply.val, Some(Value::Int(0x42)));

        let reply = rtc.command("ReadCounter", &Params::new());
        assert_eq!(reply.err, Some(Error::WrongMode(0x00)));
        assert_eq!(rtc.commands().len(), 6);
    }

    fn any_time() -> impl Strategy<Value = NaiveDateTime> {
        (1970i32..2200, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60, 0u32..100).prop_map(
            |(y, mo, d, h, mi, s, cs)| {
                NaiveDate::from_ymd_opt(y, mo, d)
                    .unwrap()
                    .and_hms_milli_opt(h, mi, s, cs * 10)
                    .unwrap()
            },
        )
    }

    proptest! {
        #[test]
        fn test_time_codec_round_trip(t in any_time()) {
            let (regs, anchor) = encode_time(&t);
            prop_assert!(regs.iter().take(4).all(|b| *b <= 0x99));
            prop_assert_eq!(decode_time(&regs, anchor).unwrap(), t);
        }

        #[test]
        fn test_counter_codec_round_trip(n in 0..=COUNTER_MAX) {
            let regs = encode_counter(n).unwrap();
            prop_assert!(regs.iter().all(|b| *b <= 0x99));
            prop_assert_eq!(decode_counter(&regs), n);
        }
    }
}
