use std::fmt;
use std::time::Duration;

use super::line::{Direction, LineRole};
use crate::gpio::GpioError;

/// Which addressed byte of a register read went unacknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPhase {
    WriteAddress,
    Register,
    ReadAddress,
}

impl fmt::Display for AddressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressPhase::WriteAddress => f.write_str("write address"),
            AddressPhase::Register => f.write_str("register address"),
            AddressPhase::ReadAddress => f.write_str("read address"),
        }
    }
}

/// The slave left the data line high after a byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Device 0x{device:02X} did not acknowledge the {phase}")]
pub struct AckError {
    pub device: u8,
    pub phase: AddressPhase,
}

/// Error types for bus operations
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),

    #[error("{line} line is configured as {actual} but the operation needs {expected}")]
    WrongDirection {
        line: LineRole,
        expected: Direction,
        actual: Direction,
    },

    #[error("{line} line was used after cleanup")]
    Released { line: LineRole },

    #[error(transparent)]
    Ack(#[from] AckError),

    #[error("Bus timeout: transaction ran {elapsed:?}, limit is {limit:?}")]
    Timeout { elapsed: Duration, limit: Duration },

    #[error("Device address 0x{0:02X} does not fit in 7 bits")]
    InvalidAddress(u8),

    #[error("Invalid bus configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
