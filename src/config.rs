// Pins, timing and acknowledge policy for the bit-banged bus
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::i2c::BusError;

// Raspberry Pi header pins 3 (SDA) and 5 (SCL), BCM numbering
pub const DATA_PIN: u32 = 2;
pub const CLOCK_PIN: u32 = 3;

// Duration every line transition is wrapped in
pub const SIGNAL_CHANGE_TIME: Duration = Duration::from_millis(5);

// Below this, slow sensors start missing edges
pub const MIN_RECOMMENDED_SIGNAL_CHANGE_TIME: Duration = Duration::from_millis(1);
pub const MAX_SIGNAL_CHANGE_TIME: Duration = Duration::from_secs(1);

// Upper bound for one register transaction
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// What a register transaction does when a byte is not acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Send a stop and return the acknowledge error
    #[default]
    Abort,
    /// Log a warning and carry on with the transaction
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub data_pin: u32,
    pub clock_pin: u32,
    pub signal_change_time_us: u64,
    /// `None` waits forever
    pub transaction_timeout_ms: Option<u64>,
    pub ack_policy: AckPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            data_pin: DATA_PIN,
            clock_pin: CLOCK_PIN,
            signal_change_time_us: SIGNAL_CHANGE_TIME.as_micros() as u64,
            transaction_timeout_ms: Some(TRANSACTION_TIMEOUT.as_millis() as u64),
            ack_policy: AckPolicy::Abort,
        }
    }
}

impl BusConfig {
    /// Load a JSON config file; missing fields take their defaults.
    /// Values are checked when the bus is built.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BusError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BusError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| BusError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    pub fn signal_change_time(&self) -> Duration {
        Duration::from_micros(self.signal_change_time_us)
    }

    pub fn transaction_timeout(&self) -> Option<Duration> {
        self.transaction_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), BusError> {
        if self.data_pin == self.clock_pin {
            return Err(BusError::Config(format!(
                "data and clock share pin {}",
                self.data_pin
            )));
        }

        let t = self.signal_change_time();
        if t.is_zero() || t > MAX_SIGNAL_CHANGE_TIME {
            return Err(BusError::Config(format!(
                "signal change time {:?} outside (0, {:?}]",
                t, MAX_SIGNAL_CHANGE_TIME
            )));
        }
        if t < MIN_RECOMMENDED_SIGNAL_CHANGE_TIME {
            warn!(
                "Signal change time {:?} is below the recommended {:?}",
                t, MIN_RECOMMENDED_SIGNAL_CHANGE_TIME
            );
        }

        if self.transaction_timeout_ms == Some(0) {
            return Err(BusError::Config("transaction timeout must be positive".into()));
        }
        Ok(())
    }
}
