// GPIO collaborator for the bit-banged bus
//
// The bus only needs five capabilities from the hardware layer: switch a pin
// to output, switch it to input (optionally pulled up), drive a level, sample
// a level, and give the pin back. Backends:
// - sysfs: Linux /sys/class/gpio
// - sim: in-memory two-wire bus with a monitor and a simulated slave

pub mod sim;
pub mod sysfs;

use std::fmt;

/// Pin number as understood by the backend (BCM numbering for sysfs)
pub type Pin = u32;

/// Logic level on a digital line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    pub fn is_low(self) -> bool {
        self == Level::Low
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => f.write_str("low"),
            Level::High => f.write_str("high"),
        }
    }
}

/// Input bias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
}

/// Error types for GPIO access
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("IO error on pin {pin}: {source}")]
    Io {
        pin: Pin,
        #[source]
        source: std::io::Error,
    },

    #[error("sysfs GPIO error on pin {pin}: {source}")]
    Sysfs {
        pin: Pin,
        #[source]
        source: linux_embedded_hal::sysfs_gpio::Error,
    },

    #[error("Pin {pin} reported an unreadable value: {raw:?}")]
    InvalidValue { pin: Pin, raw: String },

    #[error("Pin {pin} has already been released")]
    Released { pin: Pin },
}

pub type Result<T> = std::result::Result<T, GpioError>;

/// Minimal digital I/O capability set the bus depends on
pub trait Gpio {
    fn configure_output(&mut self, pin: Pin) -> Result<()>;

    fn configure_input(&mut self, pin: Pin, pull: Pull) -> Result<()>;

    /// Drive `level` on a pin configured as output
    fn write_level(&mut self, pin: Pin, level: Level) -> Result<()>;

    /// Sample a pin configured as input
    fn read_level(&mut self, pin: Pin) -> Result<Level>;

    /// Return the pin to the system. The pin must not be used afterwards.
    fn release(&mut self, pin: Pin) -> Result<()>;
}

impl<G: Gpio + ?Sized> Gpio for Box<G> {
    fn configure_output(&mut self, pin: Pin) -> Result<()> {
        (**self).configure_output(pin)
    }

    fn configure_input(&mut self, pin: Pin, pull: Pull) -> Result<()> {
        (**self).configure_input(pin, pull)
    }

    fn write_level(&mut self, pin: Pin, level: Level) -> Result<()> {
        (**self).write_level(pin, level)
    }

    fn read_level(&mut self, pin: Pin) -> Result<Level> {
        (**self).read_level(pin)
    }

    fn release(&mut self, pin: Pin) -> Result<()> {
        (**self).release(pin)
    }
}
