// Software I2C master for GPIO-only boards
//
// Provides:
// - DigitalLine: one pin with direction tracking and settle delays
// - BitBangedI2cBus: start/stop/bit/acknowledge signaling and byte transfers
// - Register read transaction (stop, start, address, register, repeated start, read)
// - Signed 16-bit word decoding for sensor register pairs

mod bus;
mod error;
pub mod line;
pub mod register;
mod word;

#[cfg(test)]
pub(crate) mod testing;

pub use bus::{AckBit, BitBangedI2cBus};
pub use error::{AckError, AddressPhase, BusError, Result};
pub use line::{DigitalLine, Direction, LineObserver, LineRole, TraceObserver, Transition};
pub use register::{read_address, write_address};
pub use word::decode_signed16;
