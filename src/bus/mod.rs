//! Bus abstractions: thin capability interfaces the Connections depend on.
//!
//! These are deliberately narrow — the specific GPIO/I2C/ADC/serial/HID
//! driver for a given board is an external collaborator outside this
//! crate's scope (see §1). What lives here is the capability surface each
//! Connection programs against, built on `embedded-hal`'s traits where
//! they fit, plus a line-oriented source trait and a simulation backend
//! used by the crate's own tests.

use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin, PinState};
use embedded_hal::i2c::I2c;

use crate::error::ConnectionError;

/// A single digital output line, with the polarity baked in by the caller
/// (the Connection maps `HIGH`/`LOW` config to `PinState` before driving).
pub trait DigitalOutputBus: Send {
    fn set(&mut self, state: PinState) -> Result<(), ConnectionError>;
}

/// A single digital input line, polled for level and edges.
pub trait DigitalInputBus: Send {
    fn read(&mut self) -> Result<PinState, ConnectionError>;
}

/// An ADC channel normalized to `[0.0, 1.0]`.
pub trait AnalogInputBus: Send {
    fn read_normalized(&mut self) -> Result<f64, ConnectionError>;
}

/// An I2C bus transaction surface, used by the LCD driver.
pub trait I2cBus: Send {
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), ConnectionError>;
}

/// A line-oriented input source (serial port, stdin, translated HID stream).
pub trait LineSource: Send {
    /// Block until a line is available, or return `Ok(None)` at EOF.
    fn read_line(&mut self) -> Result<Option<String>, ConnectionError>;
}

/// Adapts any blanket `embedded_hal::digital::OutputPin` into a
/// [`DigitalOutputBus`].
pub struct HalOutputPin<P>(pub P);

impl<P: OutputPin + Send> DigitalOutputBus for HalOutputPin<P> {
    fn set(&mut self, state: PinState) -> Result<(), ConnectionError> {
        self.0
            .set_state(state)
            .map_err(|_| ConnectionError::BusIo("digital output set failed".into()))
    }
}

/// Adapts any blanket `embedded_hal::digital::InputPin` into a
/// [`DigitalInputBus`].
pub struct HalInputPin<P>(pub P);

impl<P: InputPin + Send> DigitalInputBus for HalInputPin<P> {
    fn read(&mut self) -> Result<PinState, ConnectionError> {
        let high = self
            .0
            .is_high()
            .map_err(|_| ConnectionError::BusIo("digital input read failed".into()))?;
        Ok(if high { PinState::High } else { PinState::Low })
    }
}

/// Adapts any blanket `embedded_hal::i2c::I2c` bus into an [`I2cBus`] by
/// writing the register byte and payload as a single transaction, matching
/// how the LCD controller expects register-addressed writes.
pub struct HalI2c<P>(pub P);

impl<P: I2c + Send> I2cBus for HalI2c<P> {
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), ConnectionError> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);
        self.0
            .write(address, &frame)
            .map_err(|_| ConnectionError::BusIo("I2C write failed".into()))
    }
}

/// A single-channel Linux IIO ADC exposed at `/sys/bus/iio/devices/.../in_voltageN_raw`,
/// normalized into `[0.0, 1.0]` by the channel's declared `_scale` (millivolts
/// per raw count) against a fixed reference of 1.8 V — the common rail for
/// the SoCs this controller targets.
pub struct SysfsAdc {
    raw_path: std::path::PathBuf,
    max_raw: f64,
}

impl SysfsAdc {
    pub fn new(raw_path: impl Into<std::path::PathBuf>, max_raw: f64) -> Self {
        Self {
            raw_path: raw_path.into(),
            max_raw,
        }
    }
}

impl AnalogInputBus for SysfsAdc {
    fn read_normalized(&mut self) -> Result<f64, ConnectionError> {
        let raw = std::fs::read_to_string(&self.raw_path)
            .map_err(|e| ConnectionError::BusIo(format!("reading {}: {e}", self.raw_path.display())))?;
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|e| ConnectionError::BusIo(format!("parsing ADC raw value: {e}")))?;
        Ok((value / self.max_raw).clamp(0.0, 1.0))
    }
}

/// A [`LineSource`] over a blocking serial port, for the `serial:badge_reader`
/// variant.
pub struct SerialLineSource {
    reader: std::io::BufReader<Box<dyn serialport::SerialPort>>,
}

impl SerialLineSource {
    pub fn open(device: &str, baud: u32) -> Result<Self, ConnectionError> {
        let port = serialport::new(device, baud)
            .timeout(Duration::from_secs(3600))
            .open()
            .map_err(|e| ConnectionError::BusIo(format!("opening {device}: {e}")))?;
        Ok(Self {
            reader: std::io::BufReader::new(port),
        })
    }
}

impl LineSource for SerialLineSource {
    fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        use std::io::BufRead;
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line)),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Some(String::new())),
            Err(e) => Err(ConnectionError::BusIo(format!("serial read: {e}"))),
        }
    }
}

/// A [`LineSource`] over the process's standard input, for the
/// `stdio:badge_reader` variant.
pub struct StdinLineSource {
    reader: std::io::BufReader<std::io::Stdin>,
}

impl Default for StdinLineSource {
    fn default() -> Self {
        Self {
            reader: std::io::BufReader::new(std::io::stdin()),
        }
    }
}

impl LineSource for StdinLineSource {
    fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        use std::io::BufRead;
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line)),
            Err(e) => Err(ConnectionError::BusIo(format!("stdin read: {e}"))),
        }
    }
}

/// A line-oriented [`LineSource`] over a Linux `evdev` key-event device,
/// translating key-down scan codes to characters the same way a keyboard
/// or USB HID RFID reader would: digits `0`-`9` accumulate into the line,
/// `Enter` terminates it.
pub struct EvdevLineSource {
    device: evdev::Device,
}

impl EvdevLineSource {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ConnectionError> {
        let device = evdev::Device::open(path.as_ref())
            .map_err(|e| ConnectionError::BusIo(format!("opening {}: {e}", path.as_ref().display())))?;
        Ok(Self { device })
    }

    fn scan_to_char(code: evdev::KeyCode) -> Option<char> {
        use evdev::KeyCode;
        Some(match code {
            KeyCode::KEY_1 => '1',
            KeyCode::KEY_2 => '2',
            KeyCode::KEY_3 => '3',
            KeyCode::KEY_4 => '4',
            KeyCode::KEY_5 => '5',
            KeyCode::KEY_6 => '6',
            KeyCode::KEY_7 => '7',
            KeyCode::KEY_8 => '8',
            KeyCode::KEY_9 => '9',
            KeyCode::KEY_0 => '0',
            _ => return None,
        })
    }
}

impl LineSource for EvdevLineSource {
    fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let mut line = String::new();
        loop {
            let events = self
                .device
                .fetch_events()
                .map_err(|e| ConnectionError::BusIo(format!("reading input events: {e}")))?;
            for event in events {
                if event.event_type() != evdev::EventType::KEY || event.value() != 1 {
                    continue;
                }
                let code = evdev::KeyCode::new(event.code());
                if code == evdev::KeyCode::KEY_ENTER {
                    return Ok(Some(line));
                }
                if let Some(c) = Self::scan_to_char(code) {
                    line.push(c);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation backends — used by this crate's own unit/integration tests and
// as a software-only runtime mode when no real bus is attached.
// ---------------------------------------------------------------------------

pub mod sim {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    pub struct SimDigitalOutput {
        pub history: Arc<Mutex<Vec<PinState>>>,
    }

    impl DigitalOutputBus for SimDigitalOutput {
        fn set(&mut self, state: PinState) -> Result<(), ConnectionError> {
            self.history.lock().push(state);
            Ok(())
        }
    }

    #[derive(Clone)]
    pub struct SimDigitalInput {
        pub level: Arc<Mutex<PinState>>,
    }

    impl Default for SimDigitalInput {
        fn default() -> Self {
            Self {
                level: Arc::new(Mutex::new(PinState::Low)),
            }
        }
    }

    impl DigitalInputBus for SimDigitalInput {
        fn read(&mut self) -> Result<PinState, ConnectionError> {
            Ok(*self.level.lock())
        }
    }

    #[derive(Clone, Default)]
    pub struct SimAnalogInput {
        pub value: Arc<Mutex<f64>>,
    }

    impl AnalogInputBus for SimAnalogInput {
        fn read_normalized(&mut self) -> Result<f64, ConnectionError> {
            Ok(*self.value.lock())
        }
    }

    #[derive(Clone, Default)]
    pub struct SimI2cBus {
        pub writes: Arc<Mutex<Vec<(u8, u8, Vec<u8>)>>>,
    }

    impl I2cBus for SimI2cBus {
        fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), ConnectionError> {
            self.writes.lock().push((address, register, data.to_vec()));
            Ok(())
        }
    }

    /// A scripted line source: feeds preloaded lines, then reports EOF.
    #[derive(Clone, Default)]
    pub struct SimLineSource {
        pub lines: Arc<Mutex<VecDeque<String>>>,
    }

    impl SimLineSource {
        pub fn feed(&self, line: impl Into<String>) {
            self.lines.lock().push_back(line.into());
        }
    }

    impl LineSource for SimLineSource {
        fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
            Ok(self.lines.lock().pop_front())
        }
    }
}

/// Sleep helper shared by producer loops; isolated so tests can reason
/// about it, and so a future tokio::time::pause-aware substitution stays
/// localized to one place.
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}
