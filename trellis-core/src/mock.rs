//! In-memory bus for host tests
//!
//! [`MockBus`] behaves like a typical register-file device: the first byte
//! of every write sets the register pointer, remaining bytes are stored at
//! successive registers, and reads continue from the pointer. Every written
//! byte is appended to a flat log, including the register byte of a
//! combined write/read, so a test can assert the exact wire traffic.
//!
//! All clones share state, so a test keeps one handle while the adapter
//! owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::ErrorKind;
use trellis_hal::I2cBus;

use crate::bus::{lock, BusAdapter, BusFactory};
use crate::error::{Error, Result};

/// Error produced by injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub ErrorKind);

impl embedded_hal::i2c::Error for MockError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct MockState {
    registers: [u8; 256],
    pointer: u8,
    written: Vec<u8>,
    addresses: Vec<u8>,
    queued: VecDeque<u8>,
    write_error: Option<ErrorKind>,
    read_error: Option<ErrorKind>,
    read_limit: Option<usize>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            registers: [0; 256],
            pointer: 0,
            written: Vec::new(),
            addresses: Vec::new(),
            queued: VecDeque::new(),
            write_error: None,
            read_error: None,
            read_limit: None,
        }
    }
}

/// Register-file bus with a write log and failure injection
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    /// Empty device, all registers zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset a register
    pub fn set_register(&self, reg: u8, value: u8) {
        lock(&self.state).registers[usize::from(reg)] = value;
    }

    /// Current register content
    pub fn register(&self, reg: u8) -> u8 {
        lock(&self.state).registers[usize::from(reg)]
    }

    /// Bytes returned by the next reads before the register file is used
    pub fn queue_read(&self, bytes: &[u8]) {
        lock(&self.state).queued.extend(bytes.iter().copied());
    }

    /// Every byte written so far
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Forget the write log
    pub fn clear_written(&self) {
        lock(&self.state).written.clear();
    }

    /// Slave address of every transaction so far
    pub fn addresses(&self) -> Vec<u8> {
        lock(&self.state).addresses.clone()
    }

    /// Fail every following write (and combined write/read)
    pub fn fail_writes(&self, kind: ErrorKind) {
        lock(&self.state).write_error = Some(kind);
    }

    /// Fail every following read
    pub fn fail_reads(&self, kind: ErrorKind) {
        lock(&self.state).read_error = Some(kind);
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.write_error = None;
        state.read_error = None;
    }

    /// Return at most `n` bytes per read
    pub fn limit_reads(&self, n: usize) {
        lock(&self.state).read_limit = Some(n);
    }

    fn do_write(state: &mut MockState, address: u8, data: &[u8]) -> core::result::Result<(), MockError> {
        state.addresses.push(address);
        if let Some(kind) = state.write_error {
            return Err(MockError(kind));
        }
        state.written.extend_from_slice(data);
        if let Some((reg, payload)) = data.split_first() {
            state.pointer = *reg;
            for b in payload {
                state.registers[usize::from(state.pointer)] = *b;
                state.pointer = state.pointer.wrapping_add(1);
            }
        }
        Ok(())
    }

    fn do_read(state: &mut MockState, buf: &mut [u8]) -> core::result::Result<usize, MockError> {
        if let Some(kind) = state.read_error {
            return Err(MockError(kind));
        }
        let n = state.read_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        for slot in &mut buf[..n] {
            *slot = match state.queued.pop_front() {
                Some(b) => b,
                None => {
                    let b = state.registers[usize::from(state.pointer)];
                    state.pointer = state.pointer.wrapping_add(1);
                    b
                }
            };
        }
        Ok(n)
    }
}

impl I2cBus for MockBus {
    type Error = MockError;

    fn write(&mut self, address: u8, data: &[u8]) -> core::result::Result<(), MockError> {
        Self::do_write(&mut lock(&self.state), address, data)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> core::result::Result<usize, MockError> {
        let mut state = lock(&self.state);
        state.addresses.push(address);
        Self::do_read(&mut state, buf)
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> core::result::Result<usize, MockError> {
        let mut state = lock(&self.state);
        Self::do_write(&mut state, address, write_data)?;
        Self::do_read(&mut state, read_buf)
    }
}

/// Factory handing out clones of one [`MockBus`] for every index
#[derive(Debug)]
pub struct MockFactory {
    bus: MockBus,
    unavailable: Vec<u8>,
    default_bus: u8,
    opened: Mutex<Vec<u8>>,
}

impl MockFactory {
    /// Factory over `bus` with default bus 0
    pub fn new(bus: MockBus) -> Self {
        Self {
            bus,
            unavailable: Vec::new(),
            default_bus: 0,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Refuse to open bus `index`
    pub fn unavailable(mut self, index: u8) -> Self {
        self.unavailable.push(index);
        self
    }

    /// Change the default bus
    pub fn with_default_bus(mut self, index: u8) -> Self {
        self.default_bus = index;
        self
    }

    /// Indices opened so far, in order
    pub fn opened(&self) -> Vec<u8> {
        lock(&self.opened).clone()
    }
}

impl BusFactory for MockFactory {
    type Bus = MockBus;

    fn open(&self, index: u8) -> Result<MockBus> {
        if self.unavailable.contains(&index) {
            return Err(Error::BusUnavailable(index));
        }
        lock(&self.opened).push(index);
        Ok(self.bus.clone())
    }

    fn default_bus(&self) -> u8 {
        self.default_bus
    }
}

/// Shared adapter over a fresh mock bus, plus the test's handle to it
pub fn adapter() -> (Arc<BusAdapter<MockFactory>>, MockBus) {
    let bus = MockBus::new();
    let adapter = Arc::new(BusAdapter::new(MockFactory::new(bus.clone())));
    (adapter, bus)
}

/// Delay that records requested durations instead of sleeping
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    log: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested delay, in order
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.log).clone()
    }

    /// Sum of all requested delays
    pub fn total(&self) -> Duration {
        lock(&self.log).iter().sum()
    }

    pub fn clear(&self) {
        lock(&self.log).clear();
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        lock(&self.log).push(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        lock(&self.log).push(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        lock(&self.log).push(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_auto_increments() {
        let mut bus = MockBus::new();
        bus.write(0x40, &[0x10, 1, 2, 3]).unwrap();

        let mut buf = [0u8; 2];
        bus.write_read(0x40, &[0x11], &mut buf).unwrap();
        assert_eq!(buf, [2, 3]);

        assert_eq!(bus.written(), vec![0x10, 1, 2, 3, 0x11]);
        assert_eq!(bus.addresses(), vec![0x40, 0x40]);
    }

    #[test]
    fn test_queued_reads_first() {
        let mut bus = MockBus::new();
        bus.set_register(0x00, 0xEE);
        bus.queue_read(&[0xAA]);

        let mut buf = [0u8; 2];
        bus.read(0x40, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xEE]);
    }

    #[test]
    fn test_failed_write_not_logged() {
        let mut bus = MockBus::new();
        bus.fail_writes(ErrorKind::Bus);

        assert_eq!(bus.write(0x40, &[0x01, 0x02]), Err(MockError(ErrorKind::Bus)));
        assert!(bus.written().is_empty());
        assert_eq!(bus.register(0x01), 0);

        bus.clear_failures();
        bus.write(0x40, &[0x01, 0x02]).unwrap();
        assert_eq!(bus.register(0x01), 0x02);
    }

    #[test]
    fn test_recording_delay() {
        let delay = RecordingDelay::new();
        let mut handle = delay.clone();
        handle.delay_ms(5);
        handle.delay_us(100);

        assert_eq!(
            delay.delays(),
            vec![Duration::from_millis(5), Duration::from_micros(100)]
        );
        assert_eq!(delay.total(), Duration::from_micros(5100));
    }
}
