//! Wii Nunchuck
//!
//! The extension controller answers a "start conversion" write with six
//! bytes: joystick X/Y, accelerometer and the C/Z buttons in the low bits
//! of byte 5. Bytes arrive obfuscated and are decoded with
//! `(b ^ 0x17) + 0x17`. A frame whose byte pairs are all identical means
//! the controller has not been initialized yet.
//!
//! The first good sample sets the joystick origin; later samples report
//! offsets from it.

use std::sync::Arc;

use trellis_core::{BaseOptions, Connector, Driver, DriverBase, DriverBuilder, Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fixed 7-bit address
pub const DEFAULT_ADDRESS: u8 = 0x52;

/// Wait between the request writes and the read
const PAUSE_MS: u32 = 1;

/// One decoded poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WiichuckSample {
    /// Joystick X offset from the origin
    pub x: i16,
    /// Joystick Y offset from the origin
    pub y: i16,
    pub c: bool,
    pub z: bool,
}

/// Undo the controller's byte obfuscation
pub fn decode(b: u8) -> u8 {
    (b ^ 0x17).wrapping_add(0x17)
}

fn is_encrypted(frame: &[u8; 6]) -> bool {
    frame[0] == frame[1] && frame[2] == frame[3] && frame[4] == frame[5]
}

/// Joystick position of the first good sample
#[derive(Debug, Default)]
pub struct Origin {
    joystick: Option<(u8, u8)>,
}

/// Wii Nunchuck driver
pub struct Wiichuck<C: Connector> {
    base: DriverBase<C, Origin>,
}

/// Builder for [`Wiichuck`]
pub struct WiichuckBuilder<C> {
    connector: Arc<C>,
    options: BaseOptions,
}

impl<C> DriverBuilder for WiichuckBuilder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> WiichuckBuilder<C> {
    pub fn build(self) -> Wiichuck<C> {
        Wiichuck {
            base: DriverBase::new(
                self.connector,
                "Wiichuck",
                DEFAULT_ADDRESS,
                self.options,
                Origin::default(),
            ),
        }
    }
}

impl<C: Connector> Wiichuck<C> {
    pub fn builder(connector: Arc<C>) -> WiichuckBuilder<C> {
        WiichuckBuilder {
            connector,
            options: BaseOptions::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn base(&self) -> &DriverBase<C, Origin> {
        &self.base
    }

    /// Joystick origin, once the first sample arrived
    pub fn origin(&self) -> Option<(u8, u8)> {
        self.base.with_state(|s| s.joystick)
    }

    /// Request and decode one sample
    pub fn poll(&self) -> Result<WiichuckSample> {
        self.base.session(|s| {
            s.conn.write(&[0x40, 0x00])?;
            s.delay.delay_ms(PAUSE_MS);
            s.conn.write(&[0x00])?;
            s.delay.delay_ms(PAUSE_MS);

            let mut frame = [0u8; 6];
            let n = s.conn.read(&mut frame)?;
            if n != frame.len() {
                return Err(Error::NotEnoughBytes {
                    read: n,
                    expected: frame.len(),
                });
            }
            if is_encrypted(&frame) {
                return Err(Error::EncryptedBytes);
            }

            let (sx, sy) = (decode(frame[0]), decode(frame[1]));
            let (ox, oy) = *s.state.joystick.get_or_insert((sx, sy));
            let buttons = decode(frame[5]);
            Ok(WiichuckSample {
                x: i16::from(sx) - i16::from(ox),
                y: i16::from(sy) - i16::from(oy),
                // Buttons are active-low
                z: buttons & 0x01 == 0,
                c: buttons & 0x02 == 0,
            })
        })
    }
}

impl<C: Connector> Driver for Wiichuck<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    fn start(&self) -> Result<()> {
        self.base.start(|s| {
            s.state.joystick = None;
            Ok(())
        })
    }

    fn halt(&self) -> Result<()> {
        self.base.halt(|_| Ok(()))
    }
}
