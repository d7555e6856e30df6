//! LCD P018 driver: character-grid + RGB backlight over I2C.
//!
//! Grounded directly on the original controller's I2C protocol: register 2
//! selects the cursor position (row 0 at `0x80`, row 1 at `0xC0`), register
//! 3 streams the row text terminated by a carriage return, and register 1
//! sets the RGB backlight as three bytes scaled from `[0,255]` into the
//! controller's `[0,10]` PWM range.

use std::time::Duration;

use log::warn;

use crate::bus::I2cBus;
use crate::error::ConnectionError;

const DEVICE_ADDRESS: u8 = 0x38;
const REG_RGB: u8 = 1;
const REG_CURSOR: u8 = 2;
const REG_TEXT: u8 = 3;
const CURSOR_HOME_ROW: [u8; 2] = [0x80, 0xC0];
const WRITE_SETTLE: Duration = Duration::from_millis(20);
const MAX_RETRIES: u32 = 5;

pub struct LcdP018<B> {
    bus: B,
    pub columns: usize,
    pub rows: usize,
}

impl<B: I2cBus> LcdP018<B> {
    pub fn new(bus: B, columns: usize, rows: usize) -> Self {
        Self { bus, columns, rows }
    }

    /// Render up to `self.rows` lines. Each non-empty line is padded/truncated
    /// to `self.columns` before transmission; blank lines are skipped
    /// entirely (matching the source's `if this_message != ""` guard).
    pub async fn show(&mut self, lines: &[String]) -> Result<(), ConnectionError> {
        for (row, text) in lines.iter().take(self.rows).enumerate() {
            if text.is_empty() {
                continue;
            }
            let mut padded: String = text.chars().take(self.columns).collect();
            while padded.chars().count() < self.columns {
                padded.push(' ');
            }
            let mut bytes: Vec<u8> = padded.bytes().collect();
            bytes.push(13);

            let cursor = CURSOR_HOME_ROW.get(row).copied().unwrap_or(0x80);
            self.write_with_retry(REG_CURSOR, &[cursor]).await?;
            tokio::time::sleep(WRITE_SETTLE).await;
            self.write_with_retry(REG_TEXT, &bytes).await?;
            tokio::time::sleep(WRITE_SETTLE).await;
        }
        Ok(())
    }

    pub async fn set_rgb(&mut self, r: u8, g: u8, b: u8) -> Result<(), ConnectionError> {
        let scale = |v: u8| ((v as u16) * 10 / 255) as u8;
        let payload = [scale(r), scale(g), scale(b)];
        self.write_with_retry(REG_RGB, &payload).await?;
        tokio::time::sleep(WRITE_SETTLE).await;
        Ok(())
    }

    pub async fn clear(&mut self) -> Result<(), ConnectionError> {
        self.write_with_retry(REG_CURSOR, &[1]).await?;
        tokio::time::sleep(WRITE_SETTLE).await;
        Ok(())
    }

    async fn write_with_retry(&mut self, register: u8, data: &[u8]) -> Result<(), ConnectionError> {
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.bus.write(DEVICE_ADDRESS, register, data) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("LCD write retry {attempt}/{MAX_RETRIES}: {e}");
                    last_err = Some(e);
                    tokio::time::sleep(WRITE_SETTLE).await;
                }
            }
        }
        Err(last_err.unwrap_or(ConnectionError::BusIo("LCD write failed".into())))
    }
}

/// Validate a message against the configured geometry (§4.8: "Rows must
/// match the LCD geometry; violations are logged and the state skipped").
pub fn validate_geometry(message: &[String], columns: usize, rows: usize) -> Result<(), ConnectionError> {
    if message.len() != rows {
        return Err(ConnectionError::LcdGeometry {
            expected_cols: rows,
            got: message.len(),
        });
    }
    for line in message {
        if line.chars().count() > columns {
            return Err(ConnectionError::LcdGeometry {
                expected_cols: columns,
                got: line.chars().count(),
            });
        }
    }
    Ok(())
}
