//! Adafruit RGB LCD + keypad kit (product 1109)
//!
//! A 16×2 HD44780 LCD, an RGB backlight and five buttons, all on one
//! MCP23017. The LCD talks to the expander through its
//! [`DigitalWriter`] impl, so LCD pins are named `"<port>_<bit>"`.
//!
//! Backlight pins are active-low. Buttons are inputs with pull-ups and
//! inverted polarity, so a pressed button reads 1.

use std::sync::Arc;

use trellis_core::driver::default_name;
use trellis_core::traits::{DigitalReader, DigitalWriter};
use trellis_core::{BaseOptions, Connector, Driver, DriverBuilder, Error, Result};

use super::hd44780::{Hd44780, Hd44780Pins};
use crate::expander::mcp23017::{Mcp23017, Mcp23017Options, PinDirection, Port};

const COLS: u8 = 16;
const ROWS: u8 = 2;

/// One expander pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPin {
    pub port: Port,
    pub pin: u8,
}

const fn pp(port: Port, pin: u8) -> PortPin {
    PortPin { port, pin }
}

impl PortPin {
    /// Name understood by the expander's digital traits
    pub fn id(&self) -> String {
        let port = match self.port {
            Port::A => 'A',
            Port::B => 'B',
        };
        format!("{}_{}", port, self.pin)
    }
}

pub const RED: PortPin = pp(Port::A, 6);
pub const GREEN: PortPin = pp(Port::A, 7);
pub const BLUE: PortPin = pp(Port::B, 0);

pub const SELECT: PortPin = pp(Port::A, 0);
pub const RIGHT: PortPin = pp(Port::A, 1);
pub const DOWN: PortPin = pp(Port::A, 2);
pub const UP: PortPin = pp(Port::A, 3);
pub const LEFT: PortPin = pp(Port::A, 4);

pub const RW: PortPin = pp(Port::B, 6);
pub const RS: PortPin = pp(Port::B, 7);
pub const EN: PortPin = pp(Port::B, 5);
/// D4, D5, D6, D7
pub const DATA: [PortPin; 4] = [pp(Port::B, 4), pp(Port::B, 3), pp(Port::B, 2), pp(Port::B, 1)];

const BUTTONS: [PortPin; 5] = [SELECT, UP, DOWN, LEFT, RIGHT];

fn lcd_pins() -> Hd44780Pins {
    Hd44780Pins {
        rs: RS.id(),
        en: EN.id(),
        rw: Some(RW.id()),
        data: DATA.map(|p| p.id()),
    }
}

/// RGB LCD kit driver
pub struct Adafruit1109<C: Connector> {
    name: String,
    expander: Arc<Mcp23017<C>>,
    lcd: Hd44780<Arc<Mcp23017<C>>>,
}

/// Builder for [`Adafruit1109`]
///
/// Bus and address apply to the expander, the delay to the LCD.
pub struct Adafruit1109Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
    expander: Mcp23017Options,
}

impl<C> DriverBuilder for Adafruit1109Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Adafruit1109Builder<C> {
    /// Expander options; `auto_iodir_off` is always forced on
    pub fn expander_options(mut self, options: Mcp23017Options) -> Self {
        self.expander = options;
        self
    }

    pub fn build(self) -> Adafruit1109<C> {
        let BaseOptions {
            config,
            name,
            delay,
        } = self.options;

        let mut expander = Mcp23017::builder(self.connector).options(Mcp23017Options {
            auto_iodir_off: true,
            ..self.expander
        });
        expander.options_mut().config = config;
        let expander = Arc::new(expander.build());

        let lcd = Hd44780::new(Arc::clone(&expander), lcd_pins(), COLS, ROWS).with_boxed_delay(delay);
        Adafruit1109 {
            name: name.unwrap_or_else(|| default_name("Adafruit1109")),
            expander,
            lcd,
        }
    }
}

impl<C: Connector> Adafruit1109<C> {
    pub fn builder(connector: Arc<C>) -> Adafruit1109Builder<C> {
        Adafruit1109Builder {
            connector,
            options: BaseOptions::default(),
            expander: Mcp23017Options::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn expander(&self) -> &Arc<Mcp23017<C>> {
        &self.expander
    }

    pub fn lcd(&self) -> &Hd44780<Arc<Mcp23017<C>>> {
        &self.lcd
    }

    fn write_pin(&self, pin: PortPin, val: bool) -> Result<()> {
        self.expander.write_gpio(pin.pin, val, pin.port)
    }

    fn read_pin(&self, pin: PortPin) -> Result<bool> {
        self.expander.read_gpio(pin.pin, pin.port)
    }

    fn init_button(&self, pin: PortPin) -> Result<()> {
        self.expander.pin_mode(pin.pin, PinDirection::Input, pin.port)?;
        self.expander.set_pull_up(pin.pin, true, pin.port)?;
        self.expander.set_gpio_polarity(pin.pin, true, pin.port)
    }

    /// Switch the backlight colors on or off
    pub fn set_rgb(&self, r: bool, g: bool, b: bool) -> Result<()> {
        self.write_pin(RED, !r)?;
        self.write_pin(GREEN, !g)?;
        self.write_pin(BLUE, !b)
    }

    pub fn select_button(&self) -> Result<bool> {
        self.read_pin(SELECT)
    }

    pub fn up_button(&self) -> Result<bool> {
        self.read_pin(UP)
    }

    pub fn down_button(&self) -> Result<bool> {
        self.read_pin(DOWN)
    }

    pub fn left_button(&self) -> Result<bool> {
        self.read_pin(LEFT)
    }

    pub fn right_button(&self) -> Result<bool> {
        self.read_pin(RIGHT)
    }

    pub fn write(&self, message: &str) -> Result<()> {
        self.lcd.write(message)
    }

    pub fn clear(&self) -> Result<()> {
        self.lcd.clear()
    }

    pub fn home(&self) -> Result<()> {
        self.lcd.home()
    }

    pub fn set_cursor(&self, col: u8, row: u8) -> Result<()> {
        self.lcd.set_cursor(col, row)
    }

    pub fn display(&self, on: bool) -> Result<()> {
        self.lcd.display(on)
    }

    pub fn cursor(&self, on: bool) -> Result<()> {
        self.lcd.cursor(on)
    }

    pub fn blink(&self, on: bool) -> Result<()> {
        self.lcd.blink(on)
    }

    pub fn scroll_left(&self) -> Result<()> {
        self.lcd.scroll_left()
    }

    pub fn scroll_right(&self) -> Result<()> {
        self.lcd.scroll_right()
    }

    pub fn left_to_right(&self) -> Result<()> {
        self.lcd.left_to_right()
    }

    pub fn right_to_left(&self) -> Result<()> {
        self.lcd.right_to_left()
    }

    pub fn send_command(&self, command: u8) -> Result<()> {
        self.lcd.send_command(command)
    }

    pub fn write_char(&self, code: u8) -> Result<()> {
        self.lcd.write_char(code)
    }

    pub fn create_char(&self, position: u8, glyph: [u8; 8]) -> Result<()> {
        self.lcd.create_char(position, glyph)
    }
}

impl<C: Connector> Driver for Adafruit1109<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    /// Expander, pin setup, backlight, then LCD; stops at the first failure
    fn start(&self) -> Result<()> {
        self.expander.start()?;
        for pin in 0..8 {
            self.expander.pin_mode(pin, PinDirection::Output, Port::A)?;
            self.expander.pin_mode(pin, PinDirection::Output, Port::B)?;
        }
        for button in BUTTONS {
            self.init_button(button)?;
        }
        self.set_rgb(true, true, true)?;
        self.write_pin(RW, false)?;
        self.lcd.start()
    }

    /// LCD, backlight, then expander; every step runs
    fn halt(&self) -> Result<()> {
        let errors: Vec<Error> = [
            self.lcd.halt(),
            self.set_rgb(false, false, false),
            self.expander.halt(),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .collect();
        for e in &errors {
            log::warn!("{}: halt step failed: {}", self.name, e);
        }
        Error::aggregate(errors)
    }
}

impl<C: Connector> DigitalWriter for Adafruit1109<C> {
    fn digital_write(&self, pin: &str, val: u8) -> Result<()> {
        self.expander.digital_write(pin, val)
    }
}

impl<C: Connector> DigitalReader for Adafruit1109<C> {
    fn digital_read(&self, pin: &str) -> Result<u8> {
        self.expander.digital_read(pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use trellis_core::mock::{self, MockBus, MockFactory, RecordingDelay};
    use trellis_core::{BusAdapter, Lifecycle};

    type TestKit = Adafruit1109<BusAdapter<MockFactory>>;

    fn kit() -> (TestKit, MockBus) {
        let (adapter, bus) = mock::adapter();
        let kit = Adafruit1109::builder(adapter).delay(RecordingDelay::new()).build();
        (kit, bus)
    }

    #[test]
    fn test_pin_names() {
        assert_eq!(RED.id(), "A_6");
        assert_eq!(BLUE.id(), "B_0");
        assert_eq!(
            lcd_pins().data,
            ["B_4".to_owned(), "B_3".to_owned(), "B_2".to_owned(), "B_1".to_owned()]
        );
    }

    #[test]
    fn test_defaults() {
        let (kit, _) = kit();

        assert!(kit.name().starts_with("Adafruit1109-"));
        assert!(kit.expander().options().auto_iodir_off);
        assert_eq!(kit.lcd().size(), (16, 2));
    }

    #[test]
    fn test_start() {
        let (kit, bus) = kit();

        kit.start().unwrap();

        // Buttons A0..A4 are pulled-up, inverted inputs
        assert_eq!(bus.register(0x00), 0x1F);
        assert_eq!(bus.register(0x0C), 0x1F);
        assert_eq!(bus.register(0x02), 0x1F);
        assert_eq!(bus.register(0x01), 0x00);
        // Backlight white (active-low), RW low
        assert_eq!(bus.register(0x14) & 0xC0, 0x00);
        assert_eq!(bus.register(0x15) & 0x41, 0x00);
        assert!(bus.addresses().iter().all(|a| *a == 0x20));
        assert_eq!(kit.lcd().lifecycle(), Lifecycle::Running);
        assert!(kit.expander().base().is_running());
    }

    #[test]
    fn test_start_returns_first_error() {
        let (kit, bus) = kit();
        bus.fail_writes(ErrorKind::ArbitrationLoss);

        assert_eq!(kit.start(), Err(Error::Io(ErrorKind::ArbitrationLoss)));
        assert!(!kit.expander().base().is_running());
        assert_eq!(kit.lcd().lifecycle(), Lifecycle::Constructed);
    }

    #[test]
    fn test_set_rgb() {
        let (kit, bus) = kit();
        kit.start().unwrap();

        kit.set_rgb(true, false, false).unwrap();

        assert_eq!(bus.register(0x14) & 0xC0, 0x80);
        assert_eq!(bus.register(0x15) & 0x01, 0x01);
    }

    #[test]
    fn test_buttons() {
        let (kit, bus) = kit();
        kit.start().unwrap();
        bus.set_register(0x12, 0x0A);

        assert!(!kit.select_button().unwrap());
        assert!(kit.right_button().unwrap());
        assert!(!kit.down_button().unwrap());
        assert!(kit.up_button().unwrap());
        assert!(!kit.left_button().unwrap());
    }

    #[test]
    fn test_halt() {
        let (kit, bus) = kit();
        kit.start().unwrap();

        kit.halt().unwrap();

        assert_eq!(bus.register(0x14) & 0xC0, 0xC0);
        assert_eq!(bus.register(0x15) & 0x01, 0x01);
        assert!(!kit.expander().base().is_running());
        assert_eq!(kit.lcd().lifecycle(), Lifecycle::Halted);
    }

    #[test]
    fn test_halt_aggregates_failures() {
        let (kit, bus) = kit();
        kit.start().unwrap();
        bus.fail_writes(ErrorKind::Bus);
        bus.fail_reads(ErrorKind::Bus);

        let err = kit.halt().unwrap_err();

        assert_eq!(
            err,
            Error::Aggregate(vec![Error::Io(ErrorKind::Bus), Error::Io(ErrorKind::Bus)])
        );
        // The expander still halted
        assert_eq!(kit.expander().base().lifecycle(), Lifecycle::Halted);
    }

    #[test]
    fn test_lcd_delegation() {
        let (kit, _) = kit();
        assert_eq!(kit.write("hello"), Err(Error::NotStarted));

        kit.start().unwrap();
        kit.write("hello").unwrap();
        kit.set_cursor(15, 1).unwrap();
        assert!(kit.set_cursor(16, 0).is_err());
    }

    #[test]
    fn test_digital_traits() {
        let (kit, bus) = kit();
        kit.start().unwrap();

        kit.digital_write("A_5", 1).unwrap();

        assert_eq!(bus.register(0x14) & 0x20, 0x20);
        bus.set_register(0x13, 0x80);
        assert_eq!(kit.digital_read("B_7").unwrap(), 1);
    }
}
