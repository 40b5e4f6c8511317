//! YL-40 board: PCF8591 with onboard sensors
//!
//! The board wires an LDR to AIN0, an NTC thermistor to AIN1 and a
//! potentiometer to AIN3. AIN2 is free and AOUT drives an LED. Raw 8-bit
//! readings are scaled to physical values:
//!
//! ```text
//! brightness     0..=255 -> 1000..0
//! temperature    NTC (R0 10 kΩ at 25 °C, B 3950, 1 kΩ series) -> °C
//! AIN2           0..=255 -> 0..3.3 V
//! potentiometer  0..=255 -> 100..-100
//! AOUT           0..3.3 V -> 0..=255
//! ```
//!
//! Each input keeps its last value. With a non-zero interval a read
//! younger than the interval is served from that cache instead of the bus.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use trellis_core::driver::default_name;
use trellis_core::{BaseOptions, Connector, Driver, DriverBuilder, Error, Result};

use super::pcf8591::{Pcf8591, Pcf8591Builder};

/// LED level written on start, in volts
const DEFAULT_LED_VOLTS: f64 = 1.7;

/// Board pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Yl40Pin {
    Brightness,
    Temperature,
    Ain2,
    Potentiometer,
    AnalogOut,
}

impl Yl40Pin {
    const INPUTS: [Yl40Pin; 4] = [
        Yl40Pin::Brightness,
        Yl40Pin::Temperature,
        Yl40Pin::Ain2,
        Yl40Pin::Potentiometer,
    ];

    /// PCF8591 input description, `None` for the output
    pub fn description(self) -> Option<&'static str> {
        match self {
            Yl40Pin::Brightness => Some("s.0"),
            Yl40Pin::Temperature => Some("s.1"),
            Yl40Pin::Ain2 => Some("s.2"),
            Yl40Pin::Potentiometer => Some("s.3"),
            Yl40Pin::AnalogOut => None,
        }
    }

    fn input_index(self) -> Option<usize> {
        Self::INPUTS.iter().position(|&p| p == self)
    }
}

/// Raw reading to physical value
pub type InputScaler = Arc<dyn Fn(i32) -> f64 + Send + Sync>;
/// Physical value to raw DAC value
pub type OutputScaler = Arc<dyn Fn(f64) -> i32 + Send + Sync>;

/// Map `from_min..=from_max` onto `to_min..=to_max`, saturating at the ends
///
/// The target range may be descending.
pub fn linear_input_scaler(from_min: i32, from_max: i32, to_min: f64, to_max: f64) -> InputScaler {
    let m = (to_max - to_min) / f64::from(from_max - from_min);
    let n = to_min - m * f64::from(from_min);
    Arc::new(move |raw| {
        if raw <= from_min {
            to_min
        } else if raw >= from_max {
            to_max
        } else {
            f64::from(raw) * m + n
        }
    })
}

/// Map `from_min..=from_max` onto integers `to_min..=to_max`, truncating
pub fn linear_output_scaler(from_min: f64, from_max: f64, to_min: i32, to_max: i32) -> OutputScaler {
    let m = f64::from(to_max - to_min) / (from_max - from_min);
    let n = f64::from(to_min) - m * from_min;
    Arc::new(move |value| {
        if value <= from_min {
            to_min
        } else if value >= from_max {
            to_max
        } else {
            (value * m + n) as i32
        }
    })
}

/// NTC thermistor characteristics
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ntc {
    /// Reference temperature, °C
    pub t0: f64,
    /// Resistance at `t0`, Ω
    pub r0: f64,
    /// B constant, K
    pub b: f64,
}

impl Ntc {
    /// Temperature in °C for resistance `r` in Ω
    pub fn temperature(&self, r: f64) -> f64 {
        let t0 = self.t0 + 273.15;
        self.b / (self.b / t0 + (r / self.r0).ln()) - 273.15
    }
}

/// Thermistor in a voltage divider with `r_series`
///
/// `v_ref` is the raw reading at full supply. With `reverse` the
/// thermistor sits on the low side of the divider.
pub fn ntc_scaler(v_ref: i32, r_series: f64, reverse: bool, ntc: Ntc) -> InputScaler {
    Arc::new(move |raw| {
        let value = raw.clamp(1, v_ref - 1);
        let diff = f64::from(v_ref - value);
        let value = f64::from(value);
        let r = if reverse {
            r_series * value / diff
        } else {
            r_series * diff / value
        };
        ntc.temperature(r)
    })
}

fn default_scaler(pin: Yl40Pin) -> InputScaler {
    match pin {
        Yl40Pin::Brightness => linear_input_scaler(0, 255, 1000.0, 0.0),
        Yl40Pin::Temperature => ntc_scaler(
            255,
            1000.0,
            true,
            Ntc {
                t0: 25.0,
                r0: 10_000.0,
                b: 3950.0,
            },
        ),
        Yl40Pin::Ain2 => linear_input_scaler(0, 255, 0.0, 3.3),
        _ => linear_input_scaler(0, 255, 100.0, -100.0),
    }
}

struct Input {
    interval: Duration,
    scaler: InputScaler,
    last: Option<(f64, Instant)>,
}

impl Input {
    fn fresh(&self, now: Instant) -> Option<f64> {
        let (value, at) = self.last?;
        (now.duration_since(at) < self.interval).then_some(value)
    }
}

struct Yl40State {
    inputs: [Input; 4],
    output: f64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// YL-40 driver
pub struct Yl40<C: Connector> {
    name: String,
    pcf: Pcf8591<C>,
    output_scaler: OutputScaler,
    state: Mutex<Yl40State>,
}

/// Builder for [`Yl40`]
///
/// Bus, address, config and delay apply to the PCF8591.
pub struct Yl40Builder<C> {
    pcf: Pcf8591Builder<C>,
    intervals: [Duration; 4],
    scalers: [Option<InputScaler>; 4],
    output_scaler: Option<OutputScaler>,
}

impl<C> DriverBuilder for Yl40Builder<C> {
    fn options_mut(&mut self) -> &mut BaseOptions {
        self.pcf.options_mut()
    }
}

impl<C: Connector> Yl40Builder<C> {
    /// Serve reads of `pin` from cache for `interval`; ignored for AOUT
    pub fn interval(mut self, pin: Yl40Pin, interval: Duration) -> Self {
        match pin.input_index() {
            Some(i) => self.intervals[i] = interval,
            None => log::warn!("YL-40 interval ignored for {:?}", pin),
        }
        self
    }

    /// Replace the scaler of an input pin; ignored for AOUT
    pub fn input_scaler(mut self, pin: Yl40Pin, scaler: InputScaler) -> Self {
        match pin.input_index() {
            Some(i) => self.scalers[i] = Some(scaler),
            None => log::warn!("YL-40 input scaler ignored for {:?}", pin),
        }
        self
    }

    pub fn output_scaler(mut self, scaler: OutputScaler) -> Self {
        self.output_scaler = Some(scaler);
        self
    }

    /// Configure the converter itself
    pub fn pcf8591(mut self, configure: impl FnOnce(Pcf8591Builder<C>) -> Pcf8591Builder<C>) -> Self {
        self.pcf = configure(self.pcf);
        self
    }

    pub fn build(mut self) -> Yl40<C> {
        let name = self
            .pcf
            .options_mut()
            .name
            .take()
            .unwrap_or_else(|| default_name("YL-40"));
        let mut scalers = self.scalers;
        let inputs = std::array::from_fn(|i| Input {
            interval: self.intervals[i],
            scaler: scalers[i]
                .take()
                .unwrap_or_else(|| default_scaler(Yl40Pin::INPUTS[i])),
            last: None,
        });
        Yl40 {
            name,
            pcf: self.pcf.build(),
            output_scaler: self
                .output_scaler
                .unwrap_or_else(|| linear_output_scaler(0.0, 3.3, 0, 255)),
            state: Mutex::new(Yl40State { inputs, output: 0.0 }),
        }
    }
}

impl<C: Connector> Yl40<C> {
    pub fn builder(connector: Arc<C>) -> Yl40Builder<C> {
        Yl40Builder {
            pcf: Pcf8591::builder(connector),
            intervals: [Duration::ZERO; 4],
            scalers: [None, None, None, None],
            output_scaler: None,
        }
    }

    pub fn new(connector: Arc<C>) -> Self {
        Self::builder(connector).build()
    }

    pub fn pcf8591(&self) -> &Pcf8591<C> {
        &self.pcf
    }

    pub fn interval(&self, pin: Yl40Pin) -> Option<Duration> {
        let i = pin.input_index()?;
        Some(lock(&self.state).inputs[i].interval)
    }

    /// Scaled value of `pin`, from the bus unless the cache is fresh
    ///
    /// AOUT returns the last written value.
    pub fn read(&self, pin: Yl40Pin) -> Result<f64> {
        let (Some(i), Some(description)) = (pin.input_index(), pin.description()) else {
            return Ok(lock(&self.state).output);
        };

        let mut state = lock(&self.state);
        let now = Instant::now();
        if let Some(value) = state.inputs[i].fresh(now) {
            log::trace!("{}: {:?} from cache", self.name, pin);
            return Ok(value);
        }
        let raw = self.pcf.analog_read(description)?;
        let input = &mut state.inputs[i];
        let value = (input.scaler)(raw);
        input.last = Some((value, now));
        Ok(value)
    }

    /// Last value of `pin` without touching the bus, 0 before any access
    pub fn value(&self, pin: Yl40Pin) -> f64 {
        let state = lock(&self.state);
        match pin.input_index() {
            Some(i) => state.inputs[i].last.map_or(0.0, |(v, _)| v),
            None => state.output,
        }
    }

    /// Drive AOUT to `volts`
    pub fn write(&self, volts: f64) -> Result<()> {
        let raw = (self.output_scaler)(volts);
        let raw = u8::try_from(raw)
            .map_err(|_| Error::invalid(format!("YL-40 output {} out of 0..=255", raw)))?;
        self.pcf.analog_write(raw)?;
        lock(&self.state).output = volts;
        Ok(())
    }

    pub fn read_brightness(&self) -> Result<f64> {
        self.read(Yl40Pin::Brightness)
    }

    pub fn read_temperature(&self) -> Result<f64> {
        self.read(Yl40Pin::Temperature)
    }

    pub fn read_ain2(&self) -> Result<f64> {
        self.read(Yl40Pin::Ain2)
    }

    pub fn read_potentiometer(&self) -> Result<f64> {
        self.read(Yl40Pin::Potentiometer)
    }

    pub fn brightness(&self) -> f64 {
        self.value(Yl40Pin::Brightness)
    }

    pub fn temperature(&self) -> f64 {
        self.value(Yl40Pin::Temperature)
    }

    pub fn ain2(&self) -> f64 {
        self.value(Yl40Pin::Ain2)
    }

    pub fn potentiometer(&self) -> f64 {
        self.value(Yl40Pin::Potentiometer)
    }

    pub fn analog_out(&self) -> f64 {
        self.value(Yl40Pin::AnalogOut)
    }
}

impl<C: Connector> Driver for Yl40<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    /// Converter, then the LED default on AOUT
    fn start(&self) -> Result<()> {
        self.pcf.start()?;
        {
            let mut state = lock(&self.state);
            for input in &mut state.inputs {
                input.last = None;
            }
        }
        self.write(DEFAULT_LED_VOLTS)
    }

    fn halt(&self) -> Result<()> {
        let errors: Vec<Error> = self.pcf.halt().err().into_iter().collect();
        for e in &errors {
            log::warn!("{}: halt failed: {}", self.name, e);
        }
        Error::aggregate(errors)
    }
}
