// I2C master bit-banged over two digital lines
//
// Signaling primitives (start, stop, bit write/read, acknowledge) and the
// byte transfers built from them. Every primitive enters and leaves with the
// clock low, so they compose without extra synchronisation.
//
// The bus is a plain owned value: one transaction at a time, enforced by
// `&mut self`. Share it across threads behind a Mutex if needed.

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use tracing::{debug, info, warn};

use super::error::{BusError, Result};
use super::line::{DigitalLine, LineObserver, LineRole, Transition};
use crate::config::{AckPolicy, BusConfig};
use crate::gpio::sysfs::SysfsGpio;
use crate::gpio::{Gpio, Level};
use crate::timing::StdDelay;

/// Acknowledge bit: the receiver pulls data low to acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckBit {
    Acknowledged,
    NotAcknowledged,
}

impl AckBit {
    pub fn is_ack(self) -> bool {
        self == AckBit::Acknowledged
    }
}

impl From<Level> for AckBit {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => AckBit::Acknowledged,
            Level::High => AckBit::NotAcknowledged,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    limit: Duration,
}

pub struct BitBangedI2cBus<G: Gpio, D: DelayNs> {
    clock: DigitalLine<G>,
    data: DigitalLine<G>,
    delay: D,
    ack_policy: AckPolicy,
    timeout: Option<Duration>,
    deadline: Option<Deadline>,
    observer: Option<Box<dyn LineObserver>>,
    cleaned_up: bool,
}

impl BitBangedI2cBus<SysfsGpio, StdDelay> {
    /// Open the bus on the Linux sysfs GPIO interface with real sleeps
    pub fn open_sysfs(config: &BusConfig) -> Result<Self> {
        Self::new(SysfsGpio::new(), SysfsGpio::new(), config, StdDelay)
    }
}

impl<G: Gpio, D: DelayNs> BitBangedI2cBus<G, D> {
    /// Build both lines from the config and bring the bus to idle:
    /// both lines output, data high, clock low.
    pub fn new(clock_gpio: G, data_gpio: G, config: &BusConfig, delay: D) -> Result<Self> {
        config.validate()?;
        let t = config.signal_change_time();
        let clock = DigitalLine::new(clock_gpio, config.clock_pin, LineRole::Clock, t)?;
        let data = DigitalLine::new(data_gpio, config.data_pin, LineRole::Data, t)?;
        info!(
            "Opening bit-banged I2C bus: clock pin {}, data pin {}, {:?} per transition",
            clock.pin(),
            data.pin(),
            t
        );

        let mut bus = Self {
            clock,
            data,
            delay,
            ack_policy: config.ack_policy,
            timeout: config.transaction_timeout(),
            deadline: None,
            observer: None,
            cleaned_up: false,
        };

        bus.clock.set_output(&mut bus.delay)?;
        bus.data.set_output(&mut bus.delay)?;
        bus.drive(LineRole::Data, Level::High)?;
        bus.drive(LineRole::Clock, Level::Low)?;
        Ok(bus)
    }

    /// Attach a diagnostic observer, called after every transition
    pub fn with_observer(mut self, observer: impl LineObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn clock_line(&self) -> &DigitalLine<G> {
        &self.clock
    }

    pub fn data_line(&self) -> &DigitalLine<G> {
        &self.data
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn ack_policy(&self) -> AckPolicy {
        self.ack_policy
    }

    pub fn set_ack_policy(&mut self, policy: AckPolicy) {
        self.ack_policy = policy;
    }

    pub fn set_transaction_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn notify(&mut self, line: LineRole, transition: Transition) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_transition(line, transition);
        }
    }

    fn drive(&mut self, role: LineRole, level: Level) -> Result<()> {
        let line = match role {
            LineRole::Clock => &mut self.clock,
            LineRole::Data => &mut self.data,
        };
        line.write(level, &mut self.delay)?;
        self.notify(role, Transition::Wrote(level));
        Ok(())
    }

    fn sample_data(&mut self) -> Result<Level> {
        let level = self.data.read(&mut self.delay)?;
        self.notify(LineRole::Data, Transition::Sampled(level));
        Ok(level)
    }

    /// Make data an output again
    fn acquire_data(&mut self) -> Result<()> {
        self.data.set_output(&mut self.delay)?;
        self.notify(LineRole::Data, Transition::Output);
        Ok(())
    }

    /// Hand data to the slave (input with pull-up)
    fn release_data(&mut self) -> Result<()> {
        self.data.set_input_pulled_up(&mut self.delay)?;
        self.notify(LineRole::Data, Transition::InputPulledUp);
        Ok(())
    }

    fn ensure_data_output(&mut self) -> Result<()> {
        if self.data.is_output() {
            Ok(())
        } else {
            self.acquire_data()
        }
    }

    fn ensure_data_released(&mut self) -> Result<()> {
        if self.data.is_input() {
            Ok(())
        } else {
            self.release_data()
        }
    }

    pub(super) fn arm_deadline(&mut self) {
        self.deadline = self.timeout.map(|limit| Deadline {
            started: Instant::now(),
            limit,
        });
    }

    pub(super) fn disarm_deadline(&mut self) {
        self.deadline = None;
    }

    fn check_deadline(&self) -> Result<()> {
        if let Some(deadline) = self.deadline {
            let elapsed = deadline.started.elapsed();
            if elapsed > deadline.limit {
                return Err(BusError::Timeout {
                    elapsed,
                    limit: deadline.limit,
                });
            }
        }
        Ok(())
    }

    /// START: data falls while clock is high. Leaves clock low, data low.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_data_output()?;
        self.drive(LineRole::Data, Level::High)?;
        self.drive(LineRole::Clock, Level::High)?;
        self.drive(LineRole::Data, Level::Low)?;
        self.drive(LineRole::Clock, Level::Low)
    }

    /// STOP: data rises while clock is high. Leaves clock low, data high.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_data_output()?;
        self.drive(LineRole::Data, Level::Low)?;
        self.drive(LineRole::Clock, Level::High)?;
        self.drive(LineRole::Data, Level::High)?;
        self.drive(LineRole::Clock, Level::Low)
    }

    pub fn write_bit(&mut self, bit: Level) -> Result<()> {
        self.ensure_data_output()?;
        self.drive(LineRole::Data, bit)?;
        self.drive(LineRole::Clock, Level::High)?;
        self.drive(LineRole::Clock, Level::Low)
    }

    /// Sample data while the clock is high
    pub fn read_bit(&mut self) -> Result<Level> {
        self.ensure_data_released()?;
        self.drive(LineRole::Clock, Level::High)?;
        let bit = self.sample_data()?;
        self.drive(LineRole::Clock, Level::Low)?;
        self.check_deadline()?;
        Ok(bit)
    }

    /// Acknowledge a byte received from the slave
    pub fn send_acknowledge(&mut self) -> Result<()> {
        self.ensure_data_output()?;
        self.drive(LineRole::Data, Level::Low)?;
        self.drive(LineRole::Clock, Level::High)?;
        self.drive(LineRole::Clock, Level::Low)?;
        self.drive(LineRole::Data, Level::High)
    }

    /// Clock the acknowledge slot and report what the slave did
    pub fn check_acknowledge(&mut self) -> Result<AckBit> {
        self.ensure_data_released()?;
        self.drive(LineRole::Clock, Level::High)?;
        let level = self.sample_data()?;
        self.drive(LineRole::Clock, Level::Low)?;
        self.check_deadline()?;
        Ok(AckBit::from(level))
    }

    /// Shift out one byte MSB first and return the slave's acknowledge
    pub fn send_byte_with_ack(&mut self, byte: u8) -> Result<AckBit> {
        self.ensure_data_output()?;
        for shift in (0..8).rev() {
            self.write_bit(Level::from((byte >> shift) & 1 == 1))?;
        }
        self.release_data()?;
        let ack = self.check_acknowledge()?;
        self.acquire_data()?;
        Ok(ack)
    }

    /// Shift in one byte MSB first and acknowledge it
    pub fn read_byte_with_ack(&mut self) -> Result<u8> {
        self.release_data()?;
        let mut result: u8 = 0;
        for _ in 0..8 {
            let bit = self.read_bit()?;
            result = (result << 1) | bit.is_high() as u8;
        }
        self.acquire_data()?;
        self.send_acknowledge()?;
        Ok(result)
    }

    /// Release both pins. Safe to call more than once.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.cleaned_up {
            debug!("I2C bus already cleaned up");
            return Ok(());
        }
        self.cleaned_up = true;
        info!(
            "Releasing I2C lines (data pin {}, clock pin {})",
            self.data.pin(),
            self.clock.pin()
        );

        let data = self.data.cleanup();
        self.notify(LineRole::Data, Transition::Released);
        let clock = self.clock.cleanup();
        self.notify(LineRole::Clock, Transition::Released);
        data.and(clock)
    }
}

impl<G: Gpio, D: DelayNs> Drop for BitBangedI2cBus<G, D> {
    fn drop(&mut self) {
        // Give the pins back even if the owner forgot to
        if !self.cleaned_up {
            if let Err(e) = self.cleanup() {
                warn!("Failed to release I2C lines on drop: {}", e);
            }
        }
    }
}
