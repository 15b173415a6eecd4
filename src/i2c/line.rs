// One digital line (clock or data) of the bit-banged bus
//
// Every hardware effect is bracketed by two settle delays that together last
// one signal change time, so devices see clean edges at a bounded rate.

use std::fmt;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use tracing::{debug, trace};

use super::error::{BusError, Result};
use crate::config::MAX_SIGNAL_CHANGE_TIME;
use crate::gpio::{Gpio, Level, Pin, Pull};
use crate::timing::settle_halves;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    Clock,
    Data,
}

impl fmt::Display for LineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineRole::Clock => f.write_str("clock"),
            LineRole::Data => f.write_str("data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Unconfigured,
    Output,
    /// Input with pull-up, line released to the bus
    Input,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Unconfigured => f.write_str("unconfigured"),
            Direction::Output => f.write_str("output"),
            Direction::Input => f.write_str("input"),
        }
    }
}

/// What just happened on a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Output,
    InputPulledUp,
    Wrote(Level),
    Sampled(Level),
    Released,
}

/// Diagnostic hook called after each line transition.
/// Observers see the protocol, they never take part in it.
pub trait LineObserver: Send {
    fn on_transition(&mut self, line: LineRole, transition: Transition);
}

/// Logs every transition at trace level ("clock up", "data down", ...)
#[derive(Debug, Default)]
pub struct TraceObserver;

impl LineObserver for TraceObserver {
    fn on_transition(&mut self, line: LineRole, transition: Transition) {
        match transition {
            Transition::Wrote(Level::High) => trace!("{} up", line),
            Transition::Wrote(Level::Low) => trace!("{} down", line),
            Transition::Sampled(level) => trace!("{} sampled {}", line, level),
            Transition::Output => trace!("{} -> output", line),
            Transition::InputPulledUp => trace!("{} -> input (pull-up)", line),
            Transition::Released => trace!("{} released", line),
        }
    }
}

/// Exclusive owner of one GPIO pin
pub struct DigitalLine<G> {
    gpio: G,
    pin: Pin,
    role: LineRole,
    direction: Direction,
    settle_before: u32,
    settle_after: u32,
    released: bool,
}

impl<G: Gpio> DigitalLine<G> {
    /// `signal_change_time` must lie in (0, 1 s]
    pub fn new(gpio: G, pin: Pin, role: LineRole, signal_change_time: Duration) -> Result<Self> {
        let (settle_before, settle_after) = settle_halves(signal_change_time).ok_or_else(|| {
            BusError::Config(format!(
                "{} line signal change time {:?} outside (0, {:?}]",
                role, signal_change_time, MAX_SIGNAL_CHANGE_TIME
            ))
        })?;
        Ok(Self {
            gpio,
            pin,
            role,
            direction: Direction::Unconfigured,
            settle_before,
            settle_after,
            released: false,
        })
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    pub fn role(&self) -> LineRole {
        self.role
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            Err(BusError::Released { line: self.role })
        } else {
            Ok(())
        }
    }

    fn ensure_direction(&self, expected: Direction) -> Result<()> {
        self.ensure_live()?;
        if self.direction != expected {
            return Err(BusError::WrongDirection {
                line: self.role,
                expected,
                actual: self.direction,
            });
        }
        Ok(())
    }

    /// Run one hardware effect between the two settle delays
    fn settled<T>(
        &mut self,
        delay: &mut impl DelayNs,
        effect: impl FnOnce(&mut G, Pin) -> crate::gpio::Result<T>,
    ) -> Result<T> {
        delay.delay_ns(self.settle_before);
        let value = effect(&mut self.gpio, self.pin)?;
        delay.delay_ns(self.settle_after);
        Ok(value)
    }

    pub fn set_output(&mut self, delay: &mut impl DelayNs) -> Result<()> {
        self.ensure_live()?;
        self.settled(delay, |gpio, pin| gpio.configure_output(pin))?;
        self.direction = Direction::Output;
        Ok(())
    }

    pub fn set_input_pulled_up(&mut self, delay: &mut impl DelayNs) -> Result<()> {
        self.ensure_live()?;
        self.settled(delay, |gpio, pin| gpio.configure_input(pin, Pull::Up))?;
        self.direction = Direction::Input;
        Ok(())
    }

    /// Drive a level; the line must be an output
    pub fn write(&mut self, level: Level, delay: &mut impl DelayNs) -> Result<()> {
        self.ensure_direction(Direction::Output)?;
        self.settled(delay, |gpio, pin| gpio.write_level(pin, level))
    }

    /// Sample the line; it must be an input
    pub fn read(&mut self, delay: &mut impl DelayNs) -> Result<Level> {
        self.ensure_direction(Direction::Input)?;
        self.settled(delay, |gpio, pin| gpio.read_level(pin))
    }

    /// Release the pin. Later calls are no-ops.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.released {
            debug!("{} line (pin {}) already released", self.role, self.pin);
            return Ok(());
        }
        self.released = true;
        self.direction = Direction::Unconfigured;
        self.gpio.release(self.pin)?;
        Ok(())
    }
}
