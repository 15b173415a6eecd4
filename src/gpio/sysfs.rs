// Linux sysfs GPIO backend (/sys/class/gpio) on linux-embedded-hal's SysfsPin
//
// A pin is exported on its first configure call and unexported on release.
// Pins this backend has not configured are treated as released.

use std::collections::HashMap;

use linux_embedded_hal::SysfsPin;
use linux_embedded_hal::sysfs_gpio::Direction;
use tracing::debug;

use super::{Gpio, GpioError, Level, Pin, Pull, Result};

#[derive(Default)]
pub struct SysfsGpio {
    pins: HashMap<Pin, SysfsPin>,
}

impl SysfsGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export the pin (no-op when the kernel already has it) and set its direction
    fn configure(&mut self, pin: Pin, direction: Direction) -> Result<()> {
        let handle = self.pins.entry(pin).or_insert_with(|| {
            debug!("Exporting GPIO {}", pin);
            SysfsPin::new(u64::from(pin))
        });
        handle
            .export()
            .and_then(|()| handle.set_direction(direction))
            .map_err(|source| GpioError::Sysfs { pin, source })
    }

    fn exported(&self, pin: Pin) -> Result<&SysfsPin> {
        self.pins.get(&pin).ok_or(GpioError::Released { pin })
    }
}

impl Gpio for SysfsGpio {
    fn configure_output(&mut self, pin: Pin) -> Result<()> {
        self.configure(pin, Direction::Out)
    }

    fn configure_input(&mut self, pin: Pin, pull: Pull) -> Result<()> {
        if pull == Pull::Up {
            // sysfs has no bias control
            debug!("GPIO {} input pull-up relies on the board resistor", pin);
        }
        self.configure(pin, Direction::In)
    }

    fn write_level(&mut self, pin: Pin, level: Level) -> Result<()> {
        self.exported(pin)?
            .set_value(level.is_high() as u8)
            .map_err(|source| GpioError::Sysfs { pin, source })
    }

    fn read_level(&mut self, pin: Pin) -> Result<Level> {
        let raw = self
            .exported(pin)?
            .get_value()
            .map_err(|source| GpioError::Sysfs { pin, source })?;
        match raw {
            0 => Ok(Level::Low),
            1 => Ok(Level::High),
            other => Err(GpioError::InvalidValue {
                pin,
                raw: other.to_string(),
            }),
        }
    }

    fn release(&mut self, pin: Pin) -> Result<()> {
        let Some(handle) = self.pins.remove(&pin) else {
            return Ok(());
        };
        debug!("Unexporting GPIO {}", pin);
        handle
            .unexport()
            .map_err(|source| GpioError::Sysfs { pin, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No test here relies on real GPIO hardware being present

    #[test]
    fn test_unconfigured_pin_reports_released() {
        let mut gpio = SysfsGpio::new();
        assert!(matches!(
            gpio.write_level(4, Level::Low),
            Err(GpioError::Released { pin: 4 })
        ));
        assert!(matches!(
            gpio.read_level(4),
            Err(GpioError::Released { pin: 4 })
        ));
    }

    #[test]
    fn test_release_of_unconfigured_pin_is_noop() {
        let mut gpio = SysfsGpio::new();
        gpio.release(5).unwrap();
        gpio.release(5).unwrap();
    }

    #[test]
    fn test_configure_nonexistent_pin_fails() {
        let mut gpio = SysfsGpio::new();
        assert!(matches!(
            gpio.configure_output(999_999),
            Err(GpioError::Sysfs { pin: 999_999, .. })
        ));
        assert!(matches!(
            gpio.configure_input(999_999, Pull::Up),
            Err(GpioError::Sysfs { pin: 999_999, .. })
        ));
    }
}
