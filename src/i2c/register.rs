// Register read transaction
//
// Sequence on the wire:
//   STOP START [dev<<1 | W] [register] START [dev<<1 | R] <data> ACK STOP
//
// The leading STOP forces a clean bus whatever the previous transaction left
// behind. Two-byte values take two transactions; nothing keeps the device
// from updating the register pair in between.

use embedded_hal::delay::DelayNs;
use tracing::{debug, warn};

use super::bus::{AckBit, BitBangedI2cBus};
use super::error::{AckError, AddressPhase, BusError, Result};
use crate::config::AckPolicy;
use crate::gpio::Gpio;

/// Highest 7-bit device address
pub const MAX_DEVICE_ADDRESS: u8 = 0x7F;

/// Address byte for writing to `device`
pub fn write_address(device: u8) -> Result<u8> {
    if device > MAX_DEVICE_ADDRESS {
        return Err(BusError::InvalidAddress(device));
    }
    Ok(device << 1)
}

/// Address byte for reading from `device`
pub fn read_address(device: u8) -> Result<u8> {
    Ok(write_address(device)? | 1)
}

impl<G: Gpio, D: DelayNs> BitBangedI2cBus<G, D> {
    /// Read one byte from `register` of the 7-bit `device`
    pub fn read_byte_from_register(&mut self, device: u8, register: u8) -> Result<u8> {
        let write_addr = write_address(device)?;
        let read_addr = write_addr | 1;

        self.arm_deadline();
        let result = self.register_read(device, register, write_addr, read_addr);
        self.disarm_deadline();

        match result {
            Ok(value) => {
                debug!(
                    "Read device 0x{:02X} register 0x{:02X}: 0x{:02X}",
                    device, register, value
                );
                Ok(value)
            }
            Err(e @ (BusError::Ack(_) | BusError::Timeout { .. })) => {
                // don't leave the slave holding the bus
                if let Err(stop_err) = self.stop() {
                    debug!("Stop after failed transaction failed too: {}", stop_err);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn register_read(
        &mut self,
        device: u8,
        register: u8,
        write_addr: u8,
        read_addr: u8,
    ) -> Result<u8> {
        self.stop()?;
        self.start()?;

        let ack = self.send_byte_with_ack(write_addr)?;
        self.expect_ack(ack, device, AddressPhase::WriteAddress)?;

        let ack = self.send_byte_with_ack(register)?;
        self.expect_ack(ack, device, AddressPhase::Register)?;

        // repeated start switches direction without giving up the bus
        self.start()?;

        let ack = self.send_byte_with_ack(read_addr)?;
        self.expect_ack(ack, device, AddressPhase::ReadAddress)?;

        let value = self.read_byte_with_ack()?;
        self.stop()?;
        Ok(value)
    }

    fn expect_ack(&self, ack: AckBit, device: u8, phase: AddressPhase) -> Result<()> {
        if ack.is_ack() {
            return Ok(());
        }
        let err = AckError { device, phase };
        match self.ack_policy() {
            AckPolicy::Abort => Err(err.into()),
            AckPolicy::Continue => {
                warn!("{}, continuing", err);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::gpio::Level;
    use crate::gpio::sim::{BusEvent, SimDevice};
    use crate::i2c::decode_signed16;
    use crate::i2c::testing::{accelerometer, millis, sim_bus, sim_bus_with, test_config};

    #[test]
    fn test_address_derivation() {
        assert_eq!(write_address(0x1D).unwrap(), 0x3A);
        assert_eq!(read_address(0x1D).unwrap(), 0x3B);
        assert_eq!(read_address(0x7F).unwrap(), 0xFF);
        assert!(matches!(write_address(0x80), Err(BusError::InvalidAddress(0x80))));
    }

    #[test]
    fn test_register_read_wire_sequence() {
        let (sim, mut bus) = sim_bus(Some(accelerometer()));
        let value = bus.read_byte_from_register(0x1D, 0x08).unwrap();
        assert_eq!(value, 0xA5);

        assert_eq!(
            sim.transcript(),
            vec![
                BusEvent::Stop,
                BusEvent::Start,
                BusEvent::Write { byte: 0x3A, acked: true },
                BusEvent::Write { byte: 0x08, acked: true },
                BusEvent::Start,
                BusEvent::Write { byte: 0x3B, acked: true },
                BusEvent::Read { byte: 0xA5, acked: true },
                BusEvent::Stop,
            ]
        );
        assert_eq!(sim.clock_level(), Level::Low);
        assert_eq!(sim.data_level(), Level::High);
    }

    #[test]
    fn test_word_from_adjacent_registers() {
        let (_sim, mut bus) = sim_bus(Some(accelerometer()));
        let low = bus.read_byte_from_register(0x1D, 0x28).unwrap();
        let high = bus.read_byte_from_register(0x1D, 0x29).unwrap();
        assert_eq!(decode_signed16(low, high), -1000);
    }

    #[test]
    fn test_word_halves_are_separate_transactions() {
        let (sim, mut bus) = sim_bus(Some(accelerometer()));
        let low = bus.read_byte_from_register(0x1D, 0x28).unwrap();
        // sensor refreshes its output between the two reads
        sim.set_register(0x28, 0x00);
        sim.set_register(0x29, 0x01);
        let high = bus.read_byte_from_register(0x1D, 0x29).unwrap();

        assert_eq!(decode_signed16(low, high), 0x0118);
        let stops = sim
            .transcript()
            .iter()
            .filter(|&&e| e == BusEvent::Stop)
            .count();
        assert_eq!(stops, 4);
    }

    #[test]
    fn test_missing_device_aborts_by_default() {
        let (sim, mut bus) = sim_bus(None);
        let err = bus.read_byte_from_register(0x1D, 0x08).unwrap_err();
        assert!(matches!(
            err,
            BusError::Ack(AckError {
                device: 0x1D,
                phase: AddressPhase::WriteAddress,
            })
        ));

        // aborted after the write address, then released with a stop
        assert_eq!(
            sim.transcript(),
            vec![
                BusEvent::Stop,
                BusEvent::Start,
                BusEvent::Write { byte: 0x3A, acked: false },
                BusEvent::Stop,
            ]
        );
        assert_eq!(sim.data_level(), Level::High);
    }

    #[test]
    fn test_continue_policy_finishes_transaction() {
        let config = BusConfig {
            ack_policy: AckPolicy::Continue,
            ..test_config()
        };
        let (sim, mut bus) = sim_bus_with(None, config);

        // nobody drives data, so the read floats high
        assert_eq!(bus.read_byte_from_register(0x1D, 0x08).unwrap(), 0xFF);
        assert_eq!(
            sim.transcript(),
            vec![
                BusEvent::Stop,
                BusEvent::Start,
                BusEvent::Write { byte: 0x3A, acked: false },
                BusEvent::Write { byte: 0x08, acked: false },
                BusEvent::Start,
                BusEvent::Write { byte: 0x3B, acked: false },
                BusEvent::Read { byte: 0xFF, acked: true },
                BusEvent::Stop,
            ]
        );
    }

    #[test]
    fn test_wrong_address_is_not_acknowledged() {
        let (_sim, mut bus) = sim_bus(Some(accelerometer()));
        let err = bus.read_byte_from_register(0x1E, 0x08).unwrap_err();
        assert!(matches!(err, BusError::Ack(AckError { device: 0x1E, .. })));

        // the bus is usable again right away
        assert_eq!(bus.read_byte_from_register(0x1D, 0x08).unwrap(), 0xA5);
    }

    #[test]
    fn test_invalid_address_touches_nothing() {
        let (sim, mut bus) = sim_bus(Some(accelerometer()));
        assert!(matches!(
            bus.read_byte_from_register(0x9D, 0x08),
            Err(BusError::InvalidAddress(0x9D))
        ));
        assert!(sim.transcript().is_empty());
        assert!(sim.clock_samples().is_empty());
    }

    #[test]
    fn test_slow_line_times_out() {
        let config = BusConfig {
            transaction_timeout_ms: Some(1),
            ..test_config()
        };
        let (sim, mut bus) = sim_bus_with(Some(accelerometer()), config);
        sim.set_read_latency(millis(3));

        let err = bus.read_byte_from_register(0x1D, 0x08).unwrap_err();
        match err {
            BusError::Timeout { elapsed, limit } => {
                assert_eq!(limit, millis(1));
                assert!(elapsed > limit);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(sim.transcript().last(), Some(&BusEvent::Stop));

        sim.set_read_latency(millis(0));
        bus.set_transaction_timeout(Some(millis(5_000)));
        assert_eq!(bus.read_byte_from_register(0x1D, 0x08).unwrap(), 0xA5);
    }

    #[test]
    fn test_read_after_cleanup_fails_fast() {
        let (sim, mut bus) = sim_bus(Some(SimDevice::new(0x1D)));
        bus.cleanup().unwrap();
        assert!(matches!(
            bus.read_byte_from_register(0x1D, 0x08),
            Err(BusError::Released { .. })
        ));
        assert!(sim.transcript().is_empty());
    }
}
