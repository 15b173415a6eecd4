use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sumo_bitbang_i2c::config::{AckPolicy, BusConfig};
use sumo_bitbang_i2c::gpio::Gpio;
use sumo_bitbang_i2c::gpio::sim::{SimBus, SimDevice};
use sumo_bitbang_i2c::gpio::sysfs::SysfsGpio;
use sumo_bitbang_i2c::i2c::{BitBangedI2cBus, TraceObserver};
use sumo_bitbang_i2c::messages::RegisterReading;
use sumo_bitbang_i2c::timing::StdDelay;

/// Read a sensor register over the GPIO bit-banged I2C bus
#[derive(Debug, Parser)]
#[command(name = "sumo-i2c", version)]
struct Args {
    /// 7-bit device address (hex with 0x prefix or decimal)
    #[arg(value_parser = parse_u8)]
    device: u8,

    /// Register address
    #[arg(value_parser = parse_u8)]
    register: u8,

    /// Also read register+1 and decode the pair as a signed word
    #[arg(long)]
    word: bool,

    /// JSON bus configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    data_pin: Option<u32>,

    #[arg(long)]
    clock_pin: Option<u32>,

    /// Signal change time per transition, microseconds
    #[arg(long)]
    signal_change_us: Option<u64>,

    /// Log unacknowledged bytes instead of failing
    #[arg(long)]
    continue_on_nack: bool,

    /// Run against a simulated device instead of real pins
    #[arg(long)]
    simulate: bool,

    /// Register contents of the simulated device, REG=VALUE
    #[arg(long = "sim-register", value_parser = parse_assignment)]
    sim_registers: Vec<(u8, u8)>,

    /// Log every line transition (visible with RUST_LOG=trace)
    #[arg(long)]
    trace_lines: bool,
}

fn parse_u8(raw: &str) -> Result<u8, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid byte {:?}: {}", raw, e))
}

fn parse_assignment(raw: &str) -> Result<(u8, u8), String> {
    let (register, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected REG=VALUE, got {:?}", raw))?;
    Ok((parse_u8(register)?, parse_u8(value)?))
}

fn bus_config(args: &Args) -> Result<BusConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => BusConfig::from_json_file(path)?,
        None => BusConfig::default(),
    };
    if let Some(pin) = args.data_pin {
        config.data_pin = pin;
    }
    if let Some(pin) = args.clock_pin {
        config.clock_pin = pin;
    }
    if let Some(us) = args.signal_change_us {
        config.signal_change_time_us = us;
    }
    if args.continue_on_nack {
        config.ack_policy = AckPolicy::Continue;
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = bus_config(&args)?;

    let (clock_gpio, data_gpio): (Box<dyn Gpio>, Box<dyn Gpio>) = if args.simulate {
        let device = args
            .sim_registers
            .iter()
            .fold(SimDevice::new(args.device), |device, &(reg, value)| {
                device.with_register(reg, value)
            });
        info!("Simulating device 0x{:02X}", args.device);
        let sim = SimBus::new(config.clock_pin, config.data_pin).with_device(device);
        (Box::new(sim.clone()), Box::new(sim))
    } else {
        (Box::new(SysfsGpio::new()), Box::new(SysfsGpio::new()))
    };

    let mut bus = BitBangedI2cBus::new(clock_gpio, data_gpio, &config, StdDelay)?;
    if args.trace_lines {
        bus = bus.with_observer(TraceObserver);
    }

    let low = bus.read_byte_from_register(args.device, args.register)?;
    let reading = if args.word {
        let high = bus.read_byte_from_register(args.device, args.register.wrapping_add(1))?;
        RegisterReading::word(args.device, args.register, low, high)
    } else {
        RegisterReading::byte(args.device, args.register, low)
    };
    bus.cleanup()?;

    println!("{}", serde_json::to_string(&reading)?);
    Ok(())
}

/// `RUST_LOG` directives when given and parseable, info otherwise
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() {
    // Setup logging (set RUST_LOG=debug or trace)
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
