//! Adafruit DC + stepper motor HAT (product 2348)
//!
//! Two TB6612 dual H-bridges behind a PCA9685. Every bridge input is a PWM
//! channel: speed pins get a duty cycle, direction pins are driven fully on
//! or fully off. The HAT runs four DC motors or two steppers.
//!
//! The whole [`Adafruit2348::step`] sequence, sleeps included, runs under
//! the driver mutex so concurrent moves on one HAT are serialized.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use trellis_core::{
    BaseOptions, Connection, Connector, Driver, DriverBase, DriverBuilder, Error, I2cBus, Result,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::stepper::{self, StepDirection, StepStyle, MICROSTEPS};
use crate::pwm::pca9685::{self, FULL};

/// Default 7-bit address of the motor HAT
pub const DEFAULT_ADDRESS: u8 = 0x60;

/// Steps per revolution of the stock NEMA-17 steppers
pub const DEFAULT_REV_STEPS: u16 = 200;

/// Seconds per step until a speed is set
pub const DEFAULT_SEC_PER_STEP: f64 = 0.1;

/// PCA9685 channels of one DC motor port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcMotorPins {
    pub pwm: u8,
    pub in1: u8,
    pub in2: u8,
}

/// PCA9685 channels of one stepper port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperPins {
    pub pwm_a: u8,
    pub pwm_b: u8,
    pub ain1: u8,
    pub ain2: u8,
    pub bin1: u8,
    pub bin2: u8,
}

impl StepperPins {
    /// Coil pins in the bit order used by [`stepper::coils`]
    fn coil_pins(&self) -> [u8; 4] {
        [self.ain2, self.bin1, self.ain1, self.bin2]
    }
}

/// DC motor ports M1..M4
pub const DC_MOTORS: [DcMotorPins; 4] = [
    DcMotorPins { pwm: 8, in1: 10, in2: 9 },
    DcMotorPins { pwm: 13, in1: 11, in2: 12 },
    DcMotorPins { pwm: 2, in1: 4, in2: 3 },
    DcMotorPins { pwm: 7, in1: 5, in2: 6 },
];

/// Stepper ports (M1+M2, M3+M4)
pub const STEPPERS: [StepperPins; 2] = [
    StepperPins { pwm_a: 8, pwm_b: 13, ain1: 10, ain2: 9, bin1: 11, bin2: 12 },
    StepperPins { pwm_a: 2, pwm_b: 7, ain1: 4, ain2: 3, bin1: 5, bin2: 6 },
];

/// DC motor drive mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DcDirection {
    Forward,
    Backward,
    /// Both inputs low, motor coasts
    Release,
}

/// Position and timing of one stepper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepperState {
    /// Phase position in `0..32`
    pub current_step: u8,
    /// Full steps per revolution
    pub rev_steps: u16,
    /// Delay between full steps
    pub sec_per_step: f64,
}

impl Default for StepperState {
    fn default() -> Self {
        Self {
            current_step: 0,
            rev_steps: DEFAULT_REV_STEPS,
            sec_per_step: DEFAULT_SEC_PER_STEP,
        }
    }
}

/// Per-HAT state guarded by the driver mutex
#[derive(Debug, Default)]
pub struct MotorHat {
    pub steppers: [StepperState; 2],
}

/// Motor HAT driver
pub struct Adafruit2348<C: Connector> {
    base: DriverBase<C, MotorHat>,
}

/// Builder for [`Adafruit2348`]
pub struct Adafruit2348Builder<C> {
    connector: Arc<C>,
    options: BaseOptions,
}

impl<C> DriverBuilder for Adafruit2348Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        &mut self.options
    }
}

impl<C: Connector> Adafruit2348Builder<C> {
    pub fn build(self) -> Adafruit2348<C> {
        Adafruit2348 {
            base: DriverBase::new(
                self.connector,
                "Adafruit2348MotorHat",
                DEFAULT_ADDRESS,
                self.options,
                MotorHat::default(),
            ),
        }
    }
}

fn dc_pins(motor: u8) -> Result<DcMotorPins> {
    DC_MOTORS
        .get(usize::from(motor))
        .copied()
        .ok_or_else(|| Error::invalid(format!("DC motor {} outside 0..4", motor)))
}

fn stepper_index(motor: u8) -> Result<usize> {
    let index = usize::from(motor);
    if index < STEPPERS.len() {
        Ok(index)
    } else {
        Err(Error::invalid(format!("stepper {} outside 0..2", motor)))
    }
}

/// Drive a bridge input fully on or fully off
fn set_pin<B: I2cBus>(conn: &Connection<B>, pin: u8, on: bool) -> Result<()> {
    if on {
        pca9685::set_pwm(conn, pin, FULL, 0)
    } else {
        pca9685::set_pwm(conn, pin, 0, FULL)
    }
}

/// Advance one step and drive the coils for the new position
fn one_step<B: I2cBus>(
    conn: &Connection<B>,
    pins: &StepperPins,
    motor: &mut StepperState,
    direction: StepDirection,
    style: StepStyle,
) -> Result<()> {
    let next = stepper::advance(motor.current_step, direction, style);
    let (pwm_a, pwm_b) = stepper::pwm_levels(next, style);
    pca9685::set_pwm(conn, pins.pwm_a, 0, u16::from(pwm_a) * 16)?;
    pca9685::set_pwm(conn, pins.pwm_b, 0, u16::from(pwm_b) * 16)?;

    for (pin, on) in pins.coil_pins().into_iter().zip(stepper::coils(next, style)) {
        set_pin(conn, pin, on)?;
    }
    motor.current_step = next;
    Ok(())
}

fn pause(delay: &mut dyn DelayNs, seconds: f64) {
    delay.delay_us((seconds * 1_000_000.0).round() as u32);
}

impl<C: Connector> Adafruit2348<C> {
    pub fn builder(connector: Arc<C>) -> Adafruit2348Builder<C> {
        Adafruit2348Builder {
            connector,
            options: BaseOptions::default(),
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn base(&self) -> &DriverBase<C, MotorHat> {
        &self.base
    }

    /// Set the speed of DC motor `motor` (0..4), 0..=255
    pub fn set_dc_motor_speed(&self, motor: u8, speed: u8) -> Result<()> {
        let pins = dc_pins(motor)?;
        self.base
            .session(|s| pca9685::set_pwm(s.conn, pins.pwm, 0, u16::from(speed) * 16))
    }

    /// Drive DC motor `motor` (0..4) forward, backward or let it coast
    pub fn run_dc_motor(&self, motor: u8, direction: DcDirection) -> Result<()> {
        let pins = dc_pins(motor)?;
        self.base.session(|s| match direction {
            DcDirection::Forward => {
                set_pin(s.conn, pins.in2, false)?;
                set_pin(s.conn, pins.in1, true)
            }
            DcDirection::Backward => {
                set_pin(s.conn, pins.in1, false)?;
                set_pin(s.conn, pins.in2, true)
            }
            DcDirection::Release => {
                set_pin(s.conn, pins.in1, false)?;
                set_pin(s.conn, pins.in2, false)
            }
        })
    }

    /// Set stepper `motor` (0..2) speed in revolutions per minute
    ///
    /// Applies from the next [`step`](Self::step) call.
    pub fn set_stepper_speed(&self, motor: u8, rpm: u16) -> Result<()> {
        let index = stepper_index(motor)?;
        if rpm == 0 {
            return Err(Error::invalid("stepper speed must be above 0 rpm"));
        }
        self.base.with_state_mut(|hat| {
            let motor = &mut hat.steppers[index];
            motor.sec_per_step = 60.0 / (f64::from(motor.rev_steps) * f64::from(rpm));
        });
        Ok(())
    }

    /// Stepper state for `motor` (0..2)
    pub fn stepper(&self, motor: u8) -> Result<StepperState> {
        let index = stepper_index(motor)?;
        Ok(self.base.with_state(|hat| hat.steppers[index]))
    }

    /// Move stepper `motor` (0..2) by `steps` in `style`
    ///
    /// Blocks for `steps × sec_per_step` (half that for interleave). A
    /// microstep move that ends between full steps keeps going to the next
    /// full step.
    pub fn step(&self, motor: u8, steps: u32, direction: StepDirection, style: StepStyle) -> Result<()> {
        let index = stepper_index(motor)?;
        let pins = STEPPERS[index];

        self.base.session(|s| {
            let motor = &mut s.state.steppers[index];
            let mut sec_per_step = motor.sec_per_step;
            let mut steps = steps;
            match style {
                StepStyle::Interleave => sec_per_step /= 2.0,
                StepStyle::Microstep => {
                    sec_per_step /= f64::from(MICROSTEPS);
                    steps = steps.saturating_mul(u32::from(MICROSTEPS));
                }
                StepStyle::Single | StepStyle::Double => {}
            }
            log::debug!("stepper {}: {} steps, {} s per step", index, steps, sec_per_step);

            for _ in 0..steps {
                one_step(s.conn, &pins, motor, direction, style)?;
                pause(s.delay, sec_per_step);
            }
            if style == StepStyle::Microstep {
                while motor.current_step % MICROSTEPS != 0 {
                    one_step(s.conn, &pins, motor, direction, style)?;
                    pause(s.delay, sec_per_step);
                }
            }
            Ok(())
        })
    }
}

impl<C: Connector> Driver for Adafruit2348<C> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn set_name(&mut self, name: &str) {
        self.base.set_name(name);
    }

    fn start(&self) -> Result<()> {
        self.base.start(|s| pca9685::initialize(s.conn, s.delay))
    }

    fn halt(&self) -> Result<()> {
        self.base.halt(|s| pca9685::all_off(s.conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::ThreadId;
    use std::time::Duration;
    use trellis_core::mock::{self, MockBus, MockFactory, RecordingDelay};
    use trellis_core::BusAdapter;

    type TestHat = Adafruit2348<BusAdapter<MockFactory>>;

    fn started() -> (TestHat, MockBus, RecordingDelay) {
        let (adapter, bus) = mock::adapter();
        let delay = RecordingDelay::new();
        let hat = Adafruit2348::builder(adapter).delay(delay.clone()).build();
        hat.start().unwrap();
        bus.clear_written();
        delay.clear();
        (hat, bus, delay)
    }

    /// Flat log of `set_pwm(channel, on, off)`
    fn pwm(channel: u8, on: u16, off: u16) -> Vec<u8> {
        let base = 0x06 + 4 * channel;
        vec![
            base,
            (on & 0xFF) as u8,
            base + 1,
            (on >> 8) as u8,
            base + 2,
            (off & 0xFF) as u8,
            base + 3,
            (off >> 8) as u8,
        ]
    }

    #[test]
    fn test_defaults() {
        let (adapter, bus) = mock::adapter();
        let hat = Adafruit2348::builder(adapter).delay(RecordingDelay::new()).build();

        assert!(hat.name().starts_with("Adafruit2348MotorHat"));
        hat.start().unwrap();
        assert!(bus.addresses().iter().all(|a| *a == DEFAULT_ADDRESS));

        let state = hat.stepper(0).unwrap();
        assert_eq!(state.current_step, 0);
        assert_eq!(state.rev_steps, 200);
        assert_eq!(state.sec_per_step, 0.1);
    }

    #[test]
    fn test_single_step_forward() {
        let (hat, bus, delay) = started();

        hat.step(0, 1, StepDirection::Forward, StepStyle::Single).unwrap();

        assert_eq!(hat.stepper(0).unwrap().current_step, 8);
        let expected = [
            pwm(8, 0, 255 * 16),
            pwm(13, 0, 255 * 16),
            pwm(9, 0, FULL),  // ain2 off
            pwm(11, FULL, 0), // bin1 on
            pwm(10, 0, FULL), // ain1 off
            pwm(12, 0, FULL), // bin2 off
        ]
        .concat();
        assert_eq!(bus.written(), expected);
        assert_eq!(delay.delays(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn test_double_step_energizes_two_coils() {
        let (hat, bus, _) = started();

        hat.step(1, 1, StepDirection::Forward, StepStyle::Double).unwrap();

        assert_eq!(hat.stepper(1).unwrap().current_step, 4);
        let expected = [
            pwm(2, 0, 255 * 16),
            pwm(7, 0, 255 * 16),
            pwm(3, FULL, 0),
            pwm(5, FULL, 0),
            pwm(4, 0, FULL),
            pwm(6, 0, FULL),
        ]
        .concat();
        assert_eq!(bus.written(), expected);
    }

    #[test]
    fn test_interleave_halves_delay() {
        let (hat, _, delay) = started();

        hat.step(0, 2, StepDirection::Backward, StepStyle::Interleave).unwrap();

        assert_eq!(hat.stepper(0).unwrap().current_step, 24);
        assert_eq!(delay.delays(), vec![Duration::from_millis(50); 2]);
    }

    #[test]
    fn test_microstep_scales_steps_and_delay() {
        let (hat, bus, delay) = started();
        hat.set_stepper_speed(0, 30).unwrap();

        hat.step(0, 1, StepDirection::Forward, StepStyle::Microstep).unwrap();

        // 30 rpm at 200 steps is 10 ms per step, 1.25 ms per microstep
        assert_eq!(hat.stepper(0).unwrap().current_step, 8);
        assert_eq!(delay.delays(), vec![Duration::from_micros(1250); 8]);
        // First microstep: position 1 → coil A 250, coil B 50
        assert_eq!(bus.written()[..16], [pwm(8, 0, 250 * 16), pwm(13, 0, 50 * 16)].concat()[..]);
    }

    #[test]
    fn test_microstep_finishes_on_full_step() {
        let (hat, _, delay) = started();
        hat.step(0, 3, StepDirection::Forward, StepStyle::Interleave).unwrap();
        assert_eq!(hat.stepper(0).unwrap().current_step, 12);
        delay.clear();

        hat.step(0, 1, StepDirection::Forward, StepStyle::Microstep).unwrap();

        // 12 + 8 = 20 is off a full step, keeps going to 24
        assert_eq!(hat.stepper(0).unwrap().current_step, 24);
        assert_eq!(delay.delays().len(), 12);
    }

    #[test]
    fn test_set_stepper_speed() {
        let (hat, _, _) = started();

        hat.set_stepper_speed(1, 60).unwrap();

        assert_eq!(hat.stepper(1).unwrap().sec_per_step, 0.005);
        assert_eq!(hat.stepper(0).unwrap().sec_per_step, 0.1);
        assert!(matches!(hat.set_stepper_speed(0, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(hat.set_stepper_speed(2, 10), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_step_motor_range() {
        let (hat, bus, _) = started();

        assert!(matches!(
            hat.step(2, 1, StepDirection::Forward, StepStyle::Single),
            Err(Error::InvalidArgument(_))
        ));
        assert!(bus.written().is_empty());
    }

    #[test]
    fn test_dc_motor() {
        let (hat, bus, _) = started();

        hat.set_dc_motor_speed(2, 255).unwrap();
        hat.run_dc_motor(2, DcDirection::Forward).unwrap();

        let expected = [pwm(2, 0, 4080), pwm(3, 0, FULL), pwm(4, FULL, 0)].concat();
        assert_eq!(bus.written(), expected);
    }

    #[test]
    fn test_dc_motor_backward_and_release() {
        let (hat, bus, _) = started();

        hat.run_dc_motor(0, DcDirection::Backward).unwrap();
        hat.run_dc_motor(0, DcDirection::Release).unwrap();

        let expected = [
            pwm(10, 0, FULL),
            pwm(9, FULL, 0),
            pwm(10, 0, FULL),
            pwm(9, 0, FULL),
        ]
        .concat();
        assert_eq!(bus.written(), expected);
        assert!(matches!(hat.set_dc_motor_speed(4, 1), Err(Error::InvalidArgument(_))));
    }

    /// Delay that logs each entering and leaving thread, then sleeps briefly
    #[derive(Clone, Default)]
    struct TracingDelay {
        log: Arc<Mutex<Vec<(ThreadId, bool)>>>,
    }

    impl DelayNs for TracingDelay {
        fn delay_ns(&mut self, _ns: u32) {
            let id = std::thread::current().id();
            self.log.lock().unwrap().push((id, true));
            std::thread::sleep(Duration::from_millis(1));
            self.log.lock().unwrap().push((id, false));
        }
    }

    fn steps_alone(motor: u8) -> Vec<u8> {
        let (hat, bus, _) = started();
        hat.step(motor, 4, StepDirection::Forward, StepStyle::Double).unwrap();
        bus.written()
    }

    #[test]
    fn test_concurrent_steps_do_not_interleave() {
        let (adapter, bus) = mock::adapter();
        let delay = TracingDelay::default();
        let hat = Adafruit2348::builder(adapter).delay(delay.clone()).build();
        hat.start().unwrap();
        bus.clear_written();
        delay.log.lock().unwrap().clear();

        std::thread::scope(|scope| {
            for motor in 0..2 {
                let hat = &hat;
                scope.spawn(move || {
                    hat.step(motor, 4, StepDirection::Forward, StepStyle::Double).unwrap();
                });
            }
        });

        let (first, second) = (steps_alone(0), steps_alone(1));
        let written = bus.written();
        assert!(
            written == [first.as_slice(), second.as_slice()].concat()
                || written == [second.as_slice(), first.as_slice()].concat(),
            "bus writes of the two steps interleaved"
        );

        let log = delay.log.lock().unwrap().clone();
        assert!(!log.is_empty());
        for pair in log.chunks(2) {
            assert!(pair[0].1 && !pair[1].1 && pair[0].0 == pair[1].0);
        }
        let switches = log.windows(2).filter(|w| w[0].0 != w[1].0).count();
        assert_eq!(switches, 1);
    }

    #[test]
    fn test_step_requires_start() {
        let (adapter, _) = mock::adapter();
        let hat = Adafruit2348::new(adapter);

        assert_eq!(
            hat.step(0, 1, StepDirection::Forward, StepStyle::Single),
            Err(Error::NotStarted)
        );
    }
}
