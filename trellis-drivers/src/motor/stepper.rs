//! Stepper phase arithmetic
//!
//! A bipolar stepper driven by two H-bridges has 32 phase positions when
//! each full step is split into 8 microsteps. Every style moves through the
//! same position space:
//!
//! ```text
//! position  0    4    8    12   16   20   24   28
//! coils     1000 1100 0100 0110 0010 0011 0001 1001
//!           ^single   ^single   ^single   ^single
//!                ^double   ^double   ^double   ^double
//! ```
//!
//! Single style rests on positions with one energized coil, double style on
//! positions with two, interleave visits both, microstep visits all 32.
//! Coil bits are ordered `ain2, bin1, ain1, bin2`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Microsteps per full step
pub const MICROSTEPS: u8 = 8;

/// Phase positions in one electrical cycle
pub const PHASES: u8 = MICROSTEPS * 4;

/// Coil current profile across one quarter cycle (quarter sine, 0..=255)
pub const MICROSTEP_CURVE: [u8; MICROSTEPS as usize + 1] = [0, 50, 98, 142, 180, 212, 236, 250, 255];

/// Coil pattern per half step, bits `ain2, bin1, ain1, bin2`
const STEP_COILS: [[bool; 4]; 8] = [
    [true, false, false, false],
    [true, true, false, false],
    [false, true, false, false],
    [false, true, true, false],
    [false, false, true, false],
    [false, false, true, true],
    [false, false, false, true],
    [true, false, false, true],
];

/// Coil pattern per microstep quadrant
const MICROSTEP_COILS: [[bool; 4]; 4] = [
    [true, true, false, false],
    [false, true, true, false],
    [false, false, true, true],
    [true, false, false, true],
];

/// Rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StepDirection {
    #[default]
    Forward,
    Backward,
}

/// Stepping style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StepStyle {
    /// One coil at a time, full steps
    #[default]
    Single,
    /// Two coils at a time, full steps, more torque
    Double,
    /// Alternating one and two coils, half steps
    Interleave,
    /// Graduated current in both coils, 1/8 steps
    Microstep,
}

impl StepStyle {
    /// Phase positions moved by one step from `current`
    fn increment(self, current: u8) -> u8 {
        let half = MICROSTEPS / 2;
        let odd_half_step = (current / half) % 2 == 1;
        match self {
            StepStyle::Single if odd_half_step => half,
            StepStyle::Single => MICROSTEPS,
            StepStyle::Double if odd_half_step => MICROSTEPS,
            StepStyle::Double => half,
            StepStyle::Interleave => half,
            StepStyle::Microstep => 1,
        }
    }
}

/// Position after one step from `current`, wrapped into `0..PHASES`
pub fn advance(current: u8, direction: StepDirection, style: StepStyle) -> u8 {
    let current = current % PHASES;
    let delta = style.increment(current);
    match direction {
        StepDirection::Forward => (current + delta) % PHASES,
        StepDirection::Backward => (current + PHASES - delta) % PHASES,
    }
}

/// Coil A and coil B levels (0..=255) at `current`
pub fn pwm_levels(current: u8, style: StepStyle) -> (u8, u8) {
    if style != StepStyle::Microstep {
        return (255, 255);
    }
    let c = |i: u8| MICROSTEP_CURVE[usize::from(i)];
    let cs = current % PHASES;
    match cs {
        0..=7 => (c(MICROSTEPS - cs), c(cs)),
        8..=15 => (c(cs - MICROSTEPS), c(2 * MICROSTEPS - cs)),
        16..=23 => (c(3 * MICROSTEPS - cs), c(cs - 2 * MICROSTEPS)),
        _ => (c(cs - 3 * MICROSTEPS), c(4 * MICROSTEPS - cs)),
    }
}

/// Coils to energize at `current`, ordered `ain2, bin1, ain1, bin2`
pub fn coils(current: u8, style: StepStyle) -> [bool; 4] {
    let cs = current % PHASES;
    if style == StepStyle::Microstep {
        MICROSTEP_COILS[usize::from(cs / MICROSTEPS)]
    } else {
        STEP_COILS[usize::from(cs / (MICROSTEPS / 2))]
    }
}
