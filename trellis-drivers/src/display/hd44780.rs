//! HD44780 character LCD controller
//!
//! Driven in 4-bit mode through any [`DigitalWriter`]: RS, EN, optional RW
//! and D4..D7 are pin names understood by the writer. Every byte goes out
//! as two nibbles, each latched by a falling edge on EN.
//!
//! The controller is write-only here; RW, when wired, is held low.

use std::sync::{Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;
use trellis_core::driver::default_name;
use trellis_core::traits::DigitalWriter;
use trellis_core::{Driver, Error, Lifecycle, Result, StdDelay};

/// Controller instructions
pub mod cmd {
    pub const CLEAR_DISPLAY: u8 = 0x01;
    pub const RETURN_HOME: u8 = 0x02;
    pub const ENTRY_MODE_SET: u8 = 0x04;
    pub const DISPLAY_CONTROL: u8 = 0x08;
    pub const CURSOR_SHIFT: u8 = 0x10;
    pub const FUNCTION_SET: u8 = 0x20;
    pub const SET_CGRAM_ADDR: u8 = 0x40;
    pub const SET_DDRAM_ADDR: u8 = 0x80;
}

/// Instruction flags
pub mod flag {
    /// Entry mode: cursor moves right
    pub const ENTRY_LEFT: u8 = 0x02;
    /// Display control bits
    pub const DISPLAY_ON: u8 = 0x04;
    pub const CURSOR_ON: u8 = 0x02;
    pub const BLINK_ON: u8 = 0x01;
    /// Cursor shift: move the display, not the cursor
    pub const DISPLAY_MOVE: u8 = 0x08;
    pub const MOVE_RIGHT: u8 = 0x04;
    /// Function set: two display lines
    pub const TWO_LINE: u8 = 0x08;
}

/// DDRAM offset of the second row
const SECOND_ROW: u8 = 0x40;

/// Pin names on the backing writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hd44780Pins {
    pub rs: String,
    pub en: String,
    /// Read/write select, held low when present
    pub rw: Option<String>,
    /// D4, D5, D6, D7
    pub data: [String; 4],
}

struct LcdState {
    lifecycle: Lifecycle,
    delay: Box<dyn DelayNs + Send>,
    display_ctrl: u8,
    display_mode: u8,
}

/// HD44780 driver over a digital pin writer
pub struct Hd44780<W> {
    name: String,
    writer: W,
    pins: Hd44780Pins,
    cols: u8,
    rows: u8,
    state: Mutex<LcdState>,
}

/// Pin-level access while the state lock is held
struct Wire<'a, W> {
    writer: &'a W,
    pins: &'a Hd44780Pins,
    delay: &'a mut dyn DelayNs,
}

impl<W: DigitalWriter> Wire<'_, W> {
    fn write_mode(&mut self) -> Result<()> {
        match &self.pins.rw {
            Some(rw) => self.writer.digital_write(rw, 0),
            None => Ok(()),
        }
    }

    /// Put the low four bits of `nibble` on D4..D7 and latch them
    fn nibble(&mut self, nibble: u8) -> Result<()> {
        for (bit, pin) in self.pins.data.iter().enumerate() {
            self.writer.digital_write(pin, (nibble >> bit) & 0x01)?;
        }
        self.writer.digital_write(&self.pins.en, 1)?;
        self.delay.delay_us(1);
        self.writer.digital_write(&self.pins.en, 0)?;
        self.delay.delay_us(60);
        Ok(())
    }

    fn send(&mut self, value: u8, rs: u8) -> Result<()> {
        self.write_mode()?;
        self.writer.digital_write(&self.pins.rs, rs)?;
        self.nibble(value >> 4)?;
        self.nibble(value & 0x0F)
    }

    fn command(&mut self, value: u8) -> Result<()> {
        self.send(value, 0)
    }

    fn data(&mut self, value: u8) -> Result<()> {
        self.send(value, 1)
    }

    fn clear(&mut self) -> Result<()> {
        self.command(cmd::CLEAR_DISPLAY)?;
        self.delay.delay_ms(2);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<W: DigitalWriter> Hd44780<W> {
    /// LCD with `cols` × `rows` characters (rows 1..=4)
    pub fn new(writer: W, pins: Hd44780Pins, cols: u8, rows: u8) -> Self {
        Self {
            name: default_name("HD44780"),
            writer,
            pins,
            cols,
            rows: rows.clamp(1, 4),
            state: Mutex::new(LcdState {
                lifecycle: Lifecycle::Constructed,
                delay: Box::new(StdDelay),
                display_ctrl: 0,
                display_mode: 0,
            }),
        }
    }

    /// Use `delay` for the controller timings
    pub fn with_delay(self, delay: impl DelayNs + Send + 'static) -> Self {
        self.with_boxed_delay(Box::new(delay))
    }

    pub fn with_boxed_delay(self, delay: Box<dyn DelayNs + Send>) -> Self {
        lock(&self.state).delay = delay;
        self
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn size(&self) -> (u8, u8) {
        (self.cols, self.rows)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        lock(&self.state).lifecycle
    }

    fn row_offsets(&self) -> [u8; 4] {
        [0x00, SECOND_ROW, self.cols, SECOND_ROW.wrapping_add(self.cols)]
    }

    /// Run `f` with the pins and display flags, only while running
    fn run<R>(&self, f: impl FnOnce(&mut Wire<'_, W>, &mut u8, &mut u8) -> Result<R>) -> Result<R> {
        let mut guard = lock(&self.state);
        let LcdState {
            lifecycle,
            delay,
            display_ctrl,
            display_mode,
        } = &mut *guard;
        if *lifecycle != Lifecycle::Running {
            return Err(Error::NotStarted);
        }
        let mut wire = Wire {
            writer: &self.writer,
            pins: &self.pins,
            delay: &mut **delay,
        };
        f(&mut wire, display_ctrl, display_mode)
    }

    fn cursor_command(&self, col: u8, row: u8) -> Result<u8> {
        if col >= self.cols || row >= self.rows {
            return Err(Error::invalid(format!(
                "position ({}, {}) outside {}x{}",
                col, row, self.cols, self.rows
            )));
        }
        Ok(cmd::SET_DDRAM_ADDR | col.wrapping_add(self.row_offsets()[usize::from(row)]))
    }

    /// Write `message` from the current cursor; `'\n'` moves to the next row
    pub fn write(&self, message: &str) -> Result<()> {
        self.run(|wire, _, mode| {
            let col = if *mode & flag::ENTRY_LEFT != 0 {
                0
            } else {
                self.cols.saturating_sub(1)
            };
            let mut row = 0;
            for c in message.chars() {
                if c == '\n' {
                    row += 1;
                    wire.command(self.cursor_command(col, row)?)?;
                } else {
                    wire.data(u8::try_from(c).unwrap_or(b'?'))?;
                }
            }
            Ok(())
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.run(|wire, _, _| wire.clear())
    }

    pub fn home(&self) -> Result<()> {
        self.run(|wire, _, _| {
            wire.command(cmd::RETURN_HOME)?;
            wire.delay.delay_ms(2);
            Ok(())
        })
    }

    pub fn set_cursor(&self, col: u8, row: u8) -> Result<()> {
        let command = self.cursor_command(col, row)?;
        self.run(|wire, _, _| wire.command(command))
    }

    fn display_control(&self, bit: u8, on: bool) -> Result<()> {
        self.run(|wire, ctrl, _| {
            if on {
                *ctrl |= bit;
            } else {
                *ctrl &= !bit;
            }
            wire.command(cmd::DISPLAY_CONTROL | *ctrl)
        })
    }

    pub fn display(&self, on: bool) -> Result<()> {
        self.display_control(flag::DISPLAY_ON, on)
    }

    pub fn cursor(&self, on: bool) -> Result<()> {
        self.display_control(flag::CURSOR_ON, on)
    }

    pub fn blink(&self, on: bool) -> Result<()> {
        self.display_control(flag::BLINK_ON, on)
    }

    pub fn scroll_left(&self) -> Result<()> {
        self.run(|wire, _, _| wire.command(cmd::CURSOR_SHIFT | flag::DISPLAY_MOVE))
    }

    pub fn scroll_right(&self) -> Result<()> {
        self.run(|wire, _, _| {
            wire.command(cmd::CURSOR_SHIFT | flag::DISPLAY_MOVE | flag::MOVE_RIGHT)
        })
    }

    pub fn left_to_right(&self) -> Result<()> {
        self.run(|wire, _, mode| {
            *mode |= flag::ENTRY_LEFT;
            wire.command(cmd::ENTRY_MODE_SET | *mode)
        })
    }

    pub fn right_to_left(&self) -> Result<()> {
        self.run(|wire, _, mode| {
            *mode &= !flag::ENTRY_LEFT;
            wire.command(cmd::ENTRY_MODE_SET | *mode)
        })
    }

    /// Send a raw instruction byte
    pub fn send_command(&self, command: u8) -> Result<()> {
        self.run(|wire, _, _| wire.command(command))
    }

    /// Write one character code at the cursor
    pub fn write_char(&self, code: u8) -> Result<()> {
        self.run(|wire, _, _| wire.data(code))
    }

    /// Store a 5×8 glyph as custom character `position` (0..=7)
    pub fn create_char(&self, position: u8, glyph: [u8; 8]) -> Result<()> {
        if position > 7 {
            return Err(Error::invalid(format!(
                "custom character {} outside 0..=7",
                position
            )));
        }
        self.run(|wire, _, _| {
            wire.command(cmd::SET_CGRAM_ADDR | (position << 3))?;
            glyph.iter().try_for_each(|row| wire.data(*row))
        })
    }
}

impl<W: DigitalWriter> Driver for Hd44780<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    /// Power-on initialization by instruction for 4-bit mode
    fn start(&self) -> Result<()> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if state.lifecycle == Lifecycle::Running {
            return Ok(());
        }
        let mut wire = Wire {
            writer: &self.writer,
            pins: &self.pins,
            delay: &mut *state.delay,
        };

        wire.delay.delay_ms(50);
        wire.write_mode()?;
        for (nibble, settle_us) in [(0x03, 5000), (0x03, 5000), (0x03, 100), (0x02, 100)] {
            wire.nibble(nibble)?;
            wire.delay.delay_us(settle_us);
        }

        let function = if self.rows > 1 { flag::TWO_LINE } else { 0 };
        let ctrl = flag::DISPLAY_ON;
        let mode = flag::ENTRY_LEFT;
        wire.command(cmd::DISPLAY_CONTROL | ctrl)?;
        wire.command(cmd::FUNCTION_SET | function)?;
        wire.command(cmd::ENTRY_MODE_SET | mode)?;
        wire.clear()?;

        state.display_ctrl = ctrl;
        state.display_mode = mode;
        state.lifecycle = Lifecycle::Running;
        log::debug!("{}: {}x{} LCD started", self.name, self.cols, self.rows);
        Ok(())
    }

    /// Blank the display and stop
    fn halt(&self) -> Result<()> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if state.lifecycle != Lifecycle::Running {
            return Err(Error::NotStarted);
        }
        let ctrl = state.display_ctrl & !flag::DISPLAY_ON;
        let mut wire = Wire {
            writer: &self.writer,
            pins: &self.pins,
            delay: &mut *state.delay,
        };
        wire.command(cmd::DISPLAY_CONTROL | ctrl)?;
        state.display_ctrl = ctrl;
        state.lifecycle = Lifecycle::Halted;
        log::debug!("{}: halted", self.name);
        Ok(())
    }
}
