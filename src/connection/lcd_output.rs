//! LcdP018Output: per-state message/color routing over [`crate::lcd::LcdP018`] (§4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::bus::I2cBus;
use crate::config::LcdAction;
use crate::connection::{Connection, EventSender};
use crate::lcd::{validate_geometry, LcdP018};
use crate::message::{Message, State};

pub struct LcdOutput<B> {
    lcd: Arc<AsyncMutex<LcdP018<B>>>,
    columns: usize,
    rows: usize,
    routing: HashMap<State, LcdAction>,
    saved_status: Arc<SyncMutex<Option<State>>>,
    reset_task: Option<JoinHandle<()>>,
}

impl<B: I2cBus + 'static> LcdOutput<B> {
    pub fn new(bus: B, columns: usize, rows: usize, routing: HashMap<State, LcdAction>) -> Self {
        Self {
            lcd: Arc::new(AsyncMutex::new(LcdP018::new(bus, columns, rows))),
            columns,
            rows,
            routing,
            saved_status: Arc::new(SyncMutex::new(None)),
            reset_task: None,
        }
    }

    fn cancel_reset(&mut self) {
        if let Some(task) = self.reset_task.take() {
            task.abort();
        }
    }

    fn render(&self, action: &LcdAction) {
        let lcd = self.lcd.clone();
        let message = action.message.clone();
        let (r, g, b) = action.color;
        tokio::spawn(async move {
            let mut lcd = lcd.lock().await;
            if let Err(e) = lcd.show(&message).await {
                warn!("lcd_p018:output: show failed: {e}");
            }
            if let Err(e) = lcd.set_rgb(r, g, b).await {
                warn!("lcd_p018:output: set_rgb failed: {e}");
            }
        });
    }

    fn arm_reset(&mut self, timeout_secs: f64) {
        let routing = self.routing.clone();
        let saved_status = self.saved_status.clone();
        let lcd = self.lcd.clone();
        self.reset_task = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(timeout_secs)).await;
            let Some(state) = *saved_status.lock() else {
                return;
            };
            let Some(action) = routing.get(&state) else {
                return;
            };
            let mut lcd = lcd.lock().await;
            if let Err(e) = lcd.show(&action.message).await {
                warn!("lcd_p018:output: reset show failed: {e}");
            }
            let (r, g, b) = action.color;
            if let Err(e) = lcd.set_rgb(r, g, b).await {
                warn!("lcd_p018:output: reset set_rgb failed: {e}");
            }
        }));
    }
}

impl<B: I2cBus + 'static> Connection for LcdOutput<B> {
    fn update(&mut self, message: &Message, _outbox: &EventSender) {
        let Some(action) = self.routing.get(&message.state).cloned() else {
            return;
        };
        if let Err(e) = validate_geometry(&action.message, self.columns, self.rows) {
            warn!("lcd_p018:output: {e}, skipping state {}", message.state);
            return;
        }

        self.cancel_reset();
        self.render(&action);

        if !message.state.is_info_only() {
            *self.saved_status.lock() = Some(message.state);
        }
        if let Some(timeout) = action.timeout {
            self.arm_reset(timeout);
        }
    }

    fn kind(&self) -> &'static str {
        "lcd_p018:output"
    }
}
