// Shared fixtures for bus tests
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use super::bus::BitBangedI2cBus;
use super::line::{LineObserver, LineRole, Transition};
use crate::config::{AckPolicy, BusConfig};
use crate::gpio::sim::{SimBus, SimDevice};

pub const CLOCK_PIN: u32 = 3;
pub const DATA_PIN: u32 = 2;

/// Mock clock: records every delay request instead of sleeping
#[derive(Debug, Default)]
pub struct CountingDelay {
    pub calls: usize,
    pub total_ns: u64,
    pub delays: Vec<u32>,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_ns += ns as u64;
        self.delays.push(ns);
    }
}

/// Observer that keeps every transition for later inspection
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    pub log: Arc<Mutex<Vec<(LineRole, Transition)>>>,
}

impl RecordingObserver {
    pub fn transitions(&self) -> Vec<(LineRole, Transition)> {
        self.log.lock().unwrap().clone()
    }
}

impl LineObserver for RecordingObserver {
    fn on_transition(&mut self, line: LineRole, transition: Transition) {
        self.log.lock().unwrap().push((line, transition));
    }
}

pub fn test_config() -> BusConfig {
    BusConfig {
        data_pin: DATA_PIN,
        clock_pin: CLOCK_PIN,
        signal_change_time_us: 1_000,
        transaction_timeout_ms: None,
        ack_policy: AckPolicy::Abort,
    }
}

pub fn sim_bus(device: Option<SimDevice>) -> (SimBus, BitBangedI2cBus<SimBus, CountingDelay>) {
    sim_bus_with(device, test_config())
}

pub fn sim_bus_with(
    device: Option<SimDevice>,
    config: BusConfig,
) -> (SimBus, BitBangedI2cBus<SimBus, CountingDelay>) {
    let mut sim = SimBus::new(config.clock_pin, config.data_pin);
    if let Some(device) = device {
        sim = sim.with_device(device);
    }
    let bus =
        BitBangedI2cBus::new(sim.clone(), sim.clone(), &config, CountingDelay::default()).unwrap();
    sim.clear_transcript();
    (sim, bus)
}

pub fn accelerometer() -> SimDevice {
    // LSM303D-style accelerometer, OUT_X_L/OUT_X_H at 0x28/0x29
    SimDevice::new(0x1D)
        .with_register(0x08, 0xA5)
        .with_register(0x28, 0x18)
        .with_register(0x29, 0xFC)
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// In-memory log sink for the fmt subscriber
#[derive(Debug, Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a trace-level subscriber and return everything it logged
pub fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
