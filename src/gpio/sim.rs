// Simulated two-wire bus
//
// Stands in for the physical clock/data wires so the protocol layer can be
// exercised without hardware. The master is modelled as push-pull: while one
// of its pins is an output the wire follows the master; otherwise the wire
// is pulled high unless the simulated slave holds it low.
//
// Every master operation re-resolves both wires and feeds the resulting edge
// to a bus monitor (transcript of frames) and to the optional slave.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Gpio, GpioError, Level, Pin, Pull, Result};

/// One decoded frame on the wire, in the order it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    Stop,
    /// Byte driven by the master; the first byte after a start is the address
    Write { byte: u8, acked: bool },
    /// Byte clocked in from the slave after a read address
    Read { byte: u8, acked: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unconfigured,
    Output,
    Input,
    Released,
}

#[derive(Debug, Clone, Copy)]
struct MasterPin {
    pin: Pin,
    mode: Mode,
    out: Level,
}

impl MasterPin {
    fn new(pin: Pin) -> Self {
        Self {
            pin,
            mode: Mode::Unconfigured,
            out: Level::High,
        }
    }
}

/// Decodes start/stop conditions and 9-bit frames from clock rising samples
#[derive(Debug, Default)]
struct Monitor {
    events: Vec<BusEvent>,
    samples: Vec<Level>,
    in_frame: bool,
    first_byte: bool,
    reading: bool,
    shift: u8,
    count: u8,
}

impl Monitor {
    fn on_start(&mut self) {
        self.events.push(BusEvent::Start);
        self.in_frame = true;
        self.first_byte = true;
        self.reading = false;
        self.shift = 0;
        self.count = 0;
    }

    fn on_stop(&mut self) {
        self.events.push(BusEvent::Stop);
        self.in_frame = false;
        self.shift = 0;
        self.count = 0;
    }

    fn on_rising(&mut self, data: Level) {
        self.samples.push(data);
        if !self.in_frame {
            return;
        }
        if self.count < 8 {
            self.shift = (self.shift << 1) | data.is_high() as u8;
            self.count += 1;
            return;
        }

        let byte = self.shift;
        let acked = data.is_low();
        if self.first_byte {
            self.first_byte = false;
            self.reading = byte & 1 == 1;
            self.events.push(BusEvent::Write { byte, acked });
        } else if self.reading {
            self.events.push(BusEvent::Read { byte, acked });
        } else {
            self.events.push(BusEvent::Write { byte, acked });
        }
        self.shift = 0;
        self.count = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Address,
    Register,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Receive(Target),
    /// Holding data low for the acknowledge clock, then continuing
    AckOut { transmit_next: bool, then: Target },
    Transmit,
    AckIn,
    /// Not addressed, wait for the next start
    Ignore,
}

/// Register-file slave device: pointer write, then auto-incrementing reads
#[derive(Debug, Clone)]
pub struct SimDevice {
    address: u8,
    registers: [u8; 256],
    pointer: u8,
    phase: Phase,
    shift: u8,
    count: u8,
    tx: u8,
    master_acked: bool,
    drive_low: bool,
}

impl SimDevice {
    pub fn new(address: u8) -> Self {
        Self {
            address: address & 0x7F,
            registers: [0; 256],
            pointer: 0,
            phase: Phase::Idle,
            shift: 0,
            count: 0,
            tx: 0,
            master_acked: false,
            drive_low: false,
        }
    }

    pub fn with_register(mut self, register: u8, value: u8) -> Self {
        self.registers[register as usize] = value;
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn register(&self, register: u8) -> u8 {
        self.registers[register as usize]
    }

    pub fn set_register(&mut self, register: u8, value: u8) {
        self.registers[register as usize] = value;
    }

    /// Current register pointer (advances after every byte transferred)
    pub fn pointer(&self) -> u8 {
        self.pointer
    }

    fn drives_low(&self) -> bool {
        self.drive_low
    }

    fn on_start(&mut self) {
        self.phase = Phase::Receive(Target::Address);
        self.shift = 0;
        self.count = 0;
        self.drive_low = false;
    }

    fn on_stop(&mut self) {
        self.phase = Phase::Idle;
        self.drive_low = false;
    }

    fn on_rising(&mut self, data: Level) {
        match self.phase {
            Phase::Receive(_) if self.count < 8 => {
                self.shift = (self.shift << 1) | data.is_high() as u8;
                self.count += 1;
            }
            Phase::AckIn => self.master_acked = data.is_low(),
            _ => {}
        }
    }

    fn on_falling(&mut self) {
        match self.phase {
            Phase::Receive(target) if self.count == 8 => {
                let byte = self.shift;
                self.shift = 0;
                self.count = 0;
                self.receive(target, byte);
            }
            Phase::AckOut {
                transmit_next,
                then,
            } => {
                self.drive_low = false;
                if transmit_next {
                    self.load_next();
                } else {
                    self.phase = Phase::Receive(then);
                }
            }
            Phase::Transmit => {
                self.count += 1;
                if self.count == 8 {
                    self.drive_low = false;
                    self.phase = Phase::AckIn;
                } else {
                    self.drive_bit();
                }
            }
            Phase::AckIn => {
                if self.master_acked {
                    self.load_next();
                } else {
                    self.phase = Phase::Ignore;
                }
            }
            _ => {}
        }
    }

    fn receive(&mut self, target: Target, byte: u8) {
        match target {
            Target::Address if byte >> 1 != self.address => {
                self.phase = Phase::Ignore;
                return;
            }
            Target::Address => {
                self.phase = Phase::AckOut {
                    transmit_next: byte & 1 == 1,
                    then: Target::Register,
                };
            }
            Target::Register => {
                self.pointer = byte;
                self.phase = Phase::AckOut {
                    transmit_next: false,
                    then: Target::Data,
                };
            }
            Target::Data => {
                self.registers[self.pointer as usize] = byte;
                self.pointer = self.pointer.wrapping_add(1);
                self.phase = Phase::AckOut {
                    transmit_next: false,
                    then: Target::Data,
                };
            }
        }
        self.drive_low = true;
    }

    fn load_next(&mut self) {
        self.tx = self.registers[self.pointer as usize];
        self.pointer = self.pointer.wrapping_add(1);
        self.count = 0;
        self.phase = Phase::Transmit;
        self.drive_bit();
    }

    fn drive_bit(&mut self) {
        self.drive_low = (self.tx >> (7 - self.count)) & 1 == 0;
    }
}

#[derive(Debug)]
struct Wires {
    clock: MasterPin,
    data: MasterPin,
    clock_level: Level,
    data_level: Level,
    device: Option<SimDevice>,
    monitor: Monitor,
    read_latency: Duration,
    releases: Vec<Pin>,
}

impl Wires {
    fn master(&mut self, pin: Pin) -> Result<&mut MasterPin> {
        let master = if pin == self.clock.pin {
            &mut self.clock
        } else if pin == self.data.pin {
            &mut self.data
        } else {
            return Err(GpioError::Io {
                pin,
                source: io::Error::new(io::ErrorKind::NotFound, "pin is not wired to the bus"),
            });
        };
        if master.mode == Mode::Released {
            return Err(GpioError::Released { pin });
        }
        Ok(master)
    }

    fn resolve_clock(&self) -> Level {
        match self.clock.mode {
            Mode::Output => self.clock.out,
            _ => Level::High,
        }
    }

    fn resolve_data(&self) -> Level {
        match self.data.mode {
            Mode::Output => self.data.out,
            _ if self.device.as_ref().is_some_and(SimDevice::drives_low) => Level::Low,
            _ => Level::High,
        }
    }

    /// Recompute both wires and dispatch the edge to the monitor and slave
    fn settle(&mut self) {
        let (prev_clock, prev_data) = (self.clock_level, self.data_level);
        let (clock, data) = (self.resolve_clock(), self.resolve_data());
        self.clock_level = clock;
        self.data_level = data;

        if prev_clock.is_high() && clock.is_high() && prev_data != data {
            if data.is_low() {
                self.monitor.on_start();
                if let Some(device) = self.device.as_mut() {
                    device.on_start();
                }
            } else {
                self.monitor.on_stop();
                if let Some(device) = self.device.as_mut() {
                    device.on_stop();
                }
            }
        } else if prev_clock.is_low() && clock.is_high() {
            self.monitor.on_rising(data);
            if let Some(device) = self.device.as_mut() {
                device.on_rising(data);
            }
        } else if prev_clock.is_high() && clock.is_low() {
            if let Some(device) = self.device.as_mut() {
                device.on_falling();
            }
            // slave only changes its drive while the clock is low
            self.data_level = self.resolve_data();
        }
    }
}

/// Cloneable handle onto a simulated bus; every clone sees the same wires
#[derive(Debug, Clone)]
pub struct SimBus {
    wires: Arc<Mutex<Wires>>,
}

impl SimBus {
    pub fn new(clock_pin: Pin, data_pin: Pin) -> Self {
        let wires = Wires {
            clock: MasterPin::new(clock_pin),
            data: MasterPin::new(data_pin),
            clock_level: Level::High,
            data_level: Level::High,
            device: None,
            monitor: Monitor::default(),
            read_latency: Duration::ZERO,
            releases: Vec::new(),
        };
        Self {
            wires: Arc::new(Mutex::new(wires)),
        }
    }

    /// Attach a slave device to the bus
    pub fn with_device(self, device: SimDevice) -> Self {
        self.wires().device = Some(device);
        self
    }

    /// Make every `read_level` block for `latency`
    pub fn set_read_latency(&self, latency: Duration) {
        self.wires().read_latency = latency;
    }

    fn wires(&self) -> MutexGuard<'_, Wires> {
        // a panicking test thread must not hide the wire state from others
        self.wires.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn clock_level(&self) -> Level {
        self.wires().clock_level
    }

    pub fn data_level(&self) -> Level {
        self.wires().data_level
    }

    /// Frames decoded so far
    pub fn transcript(&self) -> Vec<BusEvent> {
        self.wires().monitor.events.clone()
    }

    /// Data level seen at every clock rising edge since creation
    pub fn clock_samples(&self) -> Vec<Level> {
        self.wires().monitor.samples.clone()
    }

    pub fn clear_transcript(&self) {
        let mut wires = self.wires();
        wires.monitor.events.clear();
        wires.monitor.samples.clear();
    }

    /// Snapshot of the attached slave
    pub fn device(&self) -> Option<SimDevice> {
        self.wires().device.clone()
    }

    pub fn set_register(&self, register: u8, value: u8) {
        if let Some(device) = self.wires().device.as_mut() {
            device.set_register(register, value);
        }
    }

    /// How many times `pin` was released
    pub fn release_count(&self, pin: Pin) -> usize {
        self.wires().releases.iter().filter(|&&p| p == pin).count()
    }
}

impl Gpio for SimBus {
    fn configure_output(&mut self, pin: Pin) -> Result<()> {
        let mut wires = self.wires();
        wires.master(pin)?.mode = Mode::Output;
        wires.settle();
        Ok(())
    }

    fn configure_input(&mut self, pin: Pin, _pull: Pull) -> Result<()> {
        // undriven wires always float high through the bus resistors
        let mut wires = self.wires();
        wires.master(pin)?.mode = Mode::Input;
        wires.settle();
        Ok(())
    }

    fn write_level(&mut self, pin: Pin, level: Level) -> Result<()> {
        let mut wires = self.wires();
        wires.master(pin)?.out = level;
        wires.settle();
        Ok(())
    }

    fn read_level(&mut self, pin: Pin) -> Result<Level> {
        let latency = self.wires().read_latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let mut wires = self.wires();
        wires.master(pin)?;
        if pin == wires.clock.pin {
            Ok(wires.clock_level)
        } else {
            Ok(wires.data_level)
        }
    }

    fn release(&mut self, pin: Pin) -> Result<()> {
        let mut wires = self.wires();
        wires.master(pin)?.mode = Mode::Released;
        wires.releases.push(pin);
        wires.settle();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCL: Pin = 3;
    const SDA: Pin = 2;

    /// Drive raw edges directly, no bus layer involved
    fn clock_pulse(bus: &mut SimBus) {
        bus.write_level(SCL, Level::High).unwrap();
        bus.write_level(SCL, Level::Low).unwrap();
    }

    fn raw_start(bus: &mut SimBus) {
        bus.write_level(SDA, Level::High).unwrap();
        bus.write_level(SCL, Level::High).unwrap();
        bus.write_level(SDA, Level::Low).unwrap();
        bus.write_level(SCL, Level::Low).unwrap();
    }

    fn raw_write(bus: &mut SimBus, byte: u8) -> Level {
        for i in (0..8).rev() {
            bus.write_level(SDA, Level::from((byte >> i) & 1 == 1)).unwrap();
            clock_pulse(bus);
        }
        bus.configure_input(SDA, Pull::Up).unwrap();
        bus.write_level(SCL, Level::High).unwrap();
        let ack = bus.read_level(SDA).unwrap();
        bus.write_level(SCL, Level::Low).unwrap();
        bus.configure_output(SDA).unwrap();
        ack
    }

    fn wired_bus(device: Option<SimDevice>) -> SimBus {
        let mut bus = SimBus::new(SCL, SDA);
        if let Some(device) = device {
            bus = bus.with_device(device);
        }
        bus.configure_output(SCL).unwrap();
        bus.configure_output(SDA).unwrap();
        bus.write_level(SCL, Level::Low).unwrap();
        bus
    }

    #[test]
    fn test_start_condition_detected() {
        let mut bus = wired_bus(None);
        raw_start(&mut bus);
        assert_eq!(bus.transcript(), vec![BusEvent::Start]);
    }

    #[test]
    fn test_device_acknowledges_own_address_only() {
        let mut bus = wired_bus(Some(SimDevice::new(0x1D)));
        raw_start(&mut bus);
        assert_eq!(raw_write(&mut bus, 0x3A), Level::Low);

        raw_start(&mut bus);
        assert_eq!(raw_write(&mut bus, 0x40), Level::High);

        assert_eq!(
            bus.transcript(),
            vec![
                BusEvent::Start,
                BusEvent::Write { byte: 0x3A, acked: true },
                BusEvent::Start,
                BusEvent::Write { byte: 0x40, acked: false },
            ]
        );
    }

    #[test]
    fn test_device_stores_written_register() {
        let mut bus = wired_bus(Some(SimDevice::new(0x1D)));
        raw_start(&mut bus);
        raw_write(&mut bus, 0x3A);
        raw_write(&mut bus, 0x20);
        raw_write(&mut bus, 0x57);

        let device = bus.device().unwrap();
        assert_eq!(device.register(0x20), 0x57);
        assert_eq!(device.pointer(), 0x21);
    }

    #[test]
    fn test_released_pin_rejects_access() {
        let mut bus = wired_bus(None);
        bus.release(SDA).unwrap();
        assert_eq!(bus.release_count(SDA), 1);
        assert!(matches!(
            bus.write_level(SDA, Level::Low),
            Err(GpioError::Released { pin: SDA })
        ));
        assert!(matches!(bus.release(SDA), Err(GpioError::Released { .. })));
    }

    #[test]
    fn test_unknown_pin_is_an_error() {
        let mut bus = wired_bus(None);
        assert!(matches!(
            bus.configure_output(17),
            Err(GpioError::Io { pin: 17, .. })
        ));
    }

    #[test]
    fn test_released_data_line_floats_high() {
        let mut bus = wired_bus(None);
        bus.write_level(SDA, Level::Low).unwrap();
        assert_eq!(bus.data_level(), Level::Low);
        bus.configure_input(SDA, Pull::Up).unwrap();
        assert_eq!(bus.read_level(SDA).unwrap(), Level::High);
    }
}
