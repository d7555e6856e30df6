//! RFID Interlock Daemon — Main Entry Point
//!
//! A long-running single-instance Linux service: reads a JSON routing
//! table, instantiates one Connection per table entry against real GPIO/
//! I2C/serial/HID backends, and hands them to the [`Interlock`] event
//! loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Connections (producers/consumers)            │
//! │                                                                │
//! │  BadgeReader(serial|stdio|input_event)   DigitalMonitor        │
//! │  AnalogMonitor    HardcodedRFIDs         WebService+Heartbeat  │
//! │  DigitalOutput    LcdP018Output          StdioOutput           │
//! │                                                                │
//! │  ─────────────────── Connection trait boundary ────────────   │
//! │                                                                │
//! │  ┌──────────────────────────────────────────────────────┐     │
//! │  │                  Interlock (event loop)               │     │
//! │  │   timer_to_warning · timer_to_deactivate · fanout     │     │
//! │  └──────────────────────────────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use gpio_cdev::{Chip, LineRequestFlags};
use log::{error, info, warn};

use rfid_interlock::bus::{
    EvdevLineSource, HalI2c, HalInputPin, HalOutputPin, SerialLineSource, StdinLineSource, SysfsAdc,
};
use rfid_interlock::config::{Config, ConnectionConfig};
use rfid_interlock::connection::analog_monitor::AnalogMonitor;
use rfid_interlock::connection::badge_reader::BadgeReader;
use rfid_interlock::connection::digital_monitor::DigitalMonitor;
use rfid_interlock::connection::digital_output::DigitalOutput;
use rfid_interlock::connection::hardcoded_rfids::HardcodedRfids;
use rfid_interlock::connection::lcd_output::LcdOutput;
use rfid_interlock::connection::stdio_output::StdioOutput;
use rfid_interlock::connection::webservice::WebService;
use rfid_interlock::connection::{Connection, ConnectionRegistry};
use rfid_interlock::diagnostics::ErrorArrayHandler;
use rfid_interlock::interlock::{resolve_tool_id, Interlock};

const DEFAULT_CONFIG_PATH: &str = "/etc/rfid-interlock/config.json";
const DEFAULT_LOCKFILE: &str = "/var/lock/rfid-interlock";
const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

/// Split a `pin` string from the routing table into a gpiochip path and
/// line offset. Accepts the bare `"GPIO<N>"` shorthand (chip 0) and the
/// explicit `"<chip>:<offset>"` form, e.g. `"gpiochip1:17"`.
fn parse_pin_spec(pin: &str) -> Result<(String, u32), String> {
    if let Some(rest) = pin.strip_prefix("GPIO") {
        let offset: u32 = rest.parse().map_err(|_| format!("bad pin spec '{pin}'"))?;
        return Ok((DEFAULT_GPIO_CHIP.to_string(), offset));
    }
    let (chip, offset) = pin
        .split_once(':')
        .ok_or_else(|| format!("bad pin spec '{pin}', expected GPIO<N> or <chip>:<offset>"))?;
    let offset: u32 = offset.parse().map_err(|_| format!("bad pin spec '{pin}'"))?;
    let chip_path = if chip.starts_with('/') {
        chip.to_string()
    } else {
        format!("/dev/{chip}")
    };
    Ok((chip_path, offset))
}

fn open_output_pin(pin: &str) -> Result<HalOutputPin<linux_embedded_hal::CdevPin>, String> {
    let (chip_path, offset) = parse_pin_spec(pin)?;
    let mut chip = Chip::new(&chip_path).map_err(|e| format!("opening {chip_path}: {e}"))?;
    let line = chip
        .get_line(offset)
        .map_err(|e| format!("{chip_path} line {offset}: {e}"))?;
    let handle = line
        .request(LineRequestFlags::OUTPUT, 0, "rfid-interlock")
        .map_err(|e| format!("requesting {chip_path} line {offset}: {e}"))?;
    let cdev_pin =
        linux_embedded_hal::CdevPin::new(handle).map_err(|e| format!("wrapping pin: {e}"))?;
    Ok(HalOutputPin(cdev_pin))
}

fn open_input_pin(pin: &str) -> Result<HalInputPin<linux_embedded_hal::CdevPin>, String> {
    let (chip_path, offset) = parse_pin_spec(pin)?;
    let mut chip = Chip::new(&chip_path).map_err(|e| format!("opening {chip_path}: {e}"))?;
    let line = chip
        .get_line(offset)
        .map_err(|e| format!("{chip_path} line {offset}: {e}"))?;
    let handle = line
        .request(LineRequestFlags::INPUT, 0, "rfid-interlock")
        .map_err(|e| format!("requesting {chip_path} line {offset}: {e}"))?;
    let cdev_pin =
        linux_embedded_hal::CdevPin::new(handle).map_err(|e| format!("wrapping pin: {e}"))?;
    Ok(HalInputPin(cdev_pin))
}

fn open_i2c(bus: u8) -> Result<HalI2c<linux_embedded_hal::I2cdev>, String> {
    let path = format!("/dev/i2c-{bus}");
    let dev = linux_embedded_hal::I2cdev::new(&path).map_err(|e| format!("opening {path}: {e}"))?;
    Ok(HalI2c(dev))
}

/// Instantiate one Connection per declared config entry against real
/// hardware backends, recording any construction failure into `errors`
/// rather than aborting (§7: an `ErrorArrayHandler`-style bootstrap log).
fn build_registry(config: &Config, tool_id: &str, errors: &mut ErrorArrayHandler) -> ConnectionRegistry {
    let mut registry = ConnectionRegistry::new();

    for (name, entry) in &config.connections {
        let connection: Box<dyn Connection> = match entry {
            ConnectionConfig::DigitalOutput(c) => match open_output_pin(&c.pin) {
                Ok(pin) => Box::new(DigitalOutput::new(pin, c.on, c.routing.clone())),
                Err(e) => {
                    errors.record(name, e);
                    continue;
                }
            },
            ConnectionConfig::StdioOutput(c) => Box::new(StdioOutput::new(c)),
            ConnectionConfig::LcdOutput(c) => match open_i2c(c.i2c_bus) {
                Ok(bus) => Box::new(LcdOutput::new(bus, c.columns, c.rows, c.routing.clone())),
                Err(e) => {
                    errors.record(name, e);
                    continue;
                }
            },
            ConnectionConfig::WebService(c) => {
                let mut ws = WebService::new(c, tool_id.to_string());
                if let Some(hb) = ws.take_heartbeat() {
                    registry.push(format!("{name}:heartbeat"), Box::new(hb));
                }
                Box::new(ws)
            }
            ConnectionConfig::SerialBadgeReader(c) => {
                let Some(device) = c.device.as_deref() else {
                    errors.record(name, "serial:badge_reader requires 'device'");
                    continue;
                };
                match SerialLineSource::open(device, c.baud) {
                    Ok(source) => {
                        Box::new(BadgeReader::new(source, c.code.clone(), "serial:badge_reader"))
                    }
                    Err(e) => {
                        errors.record(name, e);
                        continue;
                    }
                }
            }
            ConnectionConfig::StdioBadgeReader(c) => Box::new(BadgeReader::new(
                StdinLineSource::default(),
                c.code.clone(),
                "stdio:badge_reader",
            )),
            ConnectionConfig::InputEventBadgeReader(c) => {
                let Some(device) = c.device.as_deref() else {
                    errors.record(name, "input_event:badge_reader requires 'device'");
                    continue;
                };
                match EvdevLineSource::open(device) {
                    Ok(source) => Box::new(BadgeReader::new(
                        source,
                        c.code.clone(),
                        "input_event:badge_reader",
                    )),
                    Err(e) => {
                        errors.record(name, e);
                        continue;
                    }
                }
            }
            ConnectionConfig::AnalogMonitor(c) => {
                let adc = SysfsAdc::new(format!("/sys/bus/iio/devices/{}/in_voltage_raw", c.pin), 4095.0);
                Box::new(AnalogMonitor::new(adc, c.routing.clone()))
            }
            ConnectionConfig::DigitalMonitor(c) => match open_input_pin(&c.pin) {
                Ok(pin) => Box::new(DigitalMonitor::new(pin, c)),
                Err(e) => {
                    errors.record(name, e);
                    continue;
                }
            },
            ConnectionConfig::HardcodedRfids(c) => Box::new(HardcodedRfids::new(c)),
        };
        registry.push(name.clone(), connection);
    }

    registry
}

/// Acquire the single-instance advisory lock. A second startup against an
/// already-locked file exits cleanly (exit code 0), per §6's process
/// boundary contract.
fn acquire_lockfile(path: &Path) -> Result<std::fs::File> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .with_context(|| format!("opening lockfile {}", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        info!("another instance holds {}, exiting cleanly", path.display());
        std::process::exit(0);
    }
    Ok(file)
}

fn write_pid_courtesy(file: &mut std::fs::File) {
    use std::io::{Seek, SeekFrom};
    let _ = file.set_len(0);
    let _ = file.seek(SeekFrom::Start(0));
    if let Err(e) = writeln!(file, "{}", std::process::id()) {
        warn!("failed to write PID to lockfile (non-fatal): {e}");
    }
}

fn init_logging(configured: Option<&str>) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        if let Some(filter) = configured {
            builder.parse_filters(filter);
        }
    }
    builder.init();
}

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading config {}", config_path.display()))?;

    let mut errors = ErrorArrayHandler::new();
    let (config, parse_errors) = match Config::parse(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("fatal: config parse error: {e}");
            std::process::exit(1);
        }
    };
    for e in &parse_errors {
        errors.record("config", e);
    }

    init_logging(config.logging.as_deref());

    info!("╔══════════════════════════════════════╗");
    info!("║  rfid-interlockd v{}                 ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let lockfile_path = config
        .lockfile
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCKFILE));
    let mut lockfile = acquire_lockfile(&lockfile_path)?;
    write_pid_courtesy(&mut lockfile);

    let tool_id = resolve_tool_id(config.tool_id.as_deref());
    info!("tool_id: {tool_id}");

    let registry = build_registry(&config, &tool_id, &mut errors);
    if !errors.is_empty() {
        for e in errors.errors() {
            error!("bootstrap: {}: {}", e.source, e.message);
        }
    }

    let mut interlock = Interlock::new(
        config.timeout_secs,
        config.warning_secs,
        tool_id,
        registry,
        &errors,
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let locked_out = errors.should_lock_out();
    runtime.block_on(async {
        tokio::select! {
            () = interlock.run() => {}
            _ = shutdown_signal() => {
                info!("shutdown signal received");
            }
        }
    });

    let _ = std::fs::remove_file(&lockfile_path);
    if locked_out {
        std::process::exit(1);
    }
    info!("rfid-interlockd shutting down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
