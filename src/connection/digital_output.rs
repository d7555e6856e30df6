//! DigitalOutput: `ON`/`OFF`/`BLINK`/`SOS` driver over one GPIO line (§4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use embedded_hal::digital::PinState;
use log::warn;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::bus::DigitalOutputBus;
use crate::config::{DigitalAction, DigitalOp, Polarity};
use crate::connection::{Connection, EventSender};
use crate::message::{Message, State};

const DEFAULT_BLINK_PERIOD: Duration = Duration::from_millis(500);
const SOS_DOT: Duration = Duration::from_millis(300);
const SOS_DASH: Duration = Duration::from_secs(1);
const SOS_GAP: Duration = Duration::from_millis(300);
const SOS_CYCLE_GAP: Duration = Duration::from_secs(2);

fn active_level(polarity: Polarity) -> PinState {
    match polarity {
        Polarity::High => PinState::High,
        Polarity::Low => PinState::Low,
    }
}

fn inactive_level(polarity: Polarity) -> PinState {
    match active_level(polarity) {
        PinState::High => PinState::Low,
        PinState::Low => PinState::High,
    }
}

pub struct DigitalOutput<B> {
    bus: Arc<Mutex<B>>,
    polarity: Polarity,
    routing: HashMap<State, DigitalAction>,
    task: Option<JoinHandle<()>>,
}

impl<B: DigitalOutputBus + 'static> DigitalOutput<B> {
    pub fn new(bus: B, polarity: Polarity, routing: HashMap<State, DigitalAction>) -> Self {
        Self {
            bus: Arc::new(Mutex::new(bus)),
            polarity,
            routing,
            task: None,
        }
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn drive(&mut self, level: PinState) {
        if let Err(e) = self.bus.lock().set(level) {
            warn!("digital_output: set failed: {e}");
        }
    }

    fn run(&mut self, action: DigitalAction) {
        self.cancel();
        let polarity = self.polarity;
        match action.op {
            DigitalOp::On => {
                self.drive(active_level(polarity));
                if let Some(secs) = action.seconds {
                    let bus = self.bus.clone();
                    self.task = Some(tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                        if let Err(e) = bus.lock().set(inactive_level(polarity)) {
                            warn!("digital_output: timed-off failed: {e}");
                        }
                    }));
                }
            }
            DigitalOp::Off => {
                self.drive(inactive_level(polarity));
                if let Some(secs) = action.seconds {
                    let bus = self.bus.clone();
                    self.task = Some(tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                        if let Err(e) = bus.lock().set(active_level(polarity)) {
                            warn!("digital_output: timed-on failed: {e}");
                        }
                    }));
                }
            }
            DigitalOp::Blink => {
                let period = action
                    .seconds
                    .map(Duration::from_secs_f64)
                    .unwrap_or(DEFAULT_BLINK_PERIOD);
                let bus = self.bus.clone();
                self.task = Some(tokio::spawn(async move {
                    let mut level = active_level(polarity);
                    loop {
                        if let Err(e) = bus.lock().set(level) {
                            warn!("digital_output: blink failed: {e}");
                            return;
                        }
                        tokio::time::sleep(period).await;
                        level = match level {
                            PinState::High => PinState::Low,
                            PinState::Low => PinState::High,
                        };
                    }
                }));
            }
            DigitalOp::Sos => self.start_sos(),
        }
    }

    fn start_sos(&mut self) {
        let polarity = self.polarity;
        let bus = self.bus.clone();
        self.task = Some(tokio::spawn(async move {
            // S O S: three dots, three dashes, three dots, then a pause
            // before the cycle repeats (§4.7's fixed schedule).
            let pulses: [Duration; 9] = [
                SOS_DOT, SOS_DOT, SOS_DOT, SOS_DASH, SOS_DASH, SOS_DASH, SOS_DOT, SOS_DOT, SOS_DOT,
            ];
            loop {
                for pulse in pulses {
                    if bus.lock().set(active_level(polarity)).is_err() {
                        return;
                    }
                    tokio::time::sleep(pulse).await;
                    if bus.lock().set(inactive_level(polarity)).is_err() {
                        return;
                    }
                    tokio::time::sleep(SOS_GAP).await;
                }
                tokio::time::sleep(SOS_CYCLE_GAP).await;
            }
        }));
    }
}

impl<B: DigitalOutputBus + 'static> Connection for DigitalOutput<B> {
    fn update(&mut self, message: &Message, _outbox: &EventSender) {
        if let Some(action) = self.routing.get(&message.state).copied() {
            self.run(action);
            return;
        }
        if message.state == State::Error {
            self.cancel();
            self.start_sos();
        }
    }

    fn kind(&self) -> &'static str {
        "digital:output"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::sim::SimDigitalOutput;

    fn action(op: DigitalOp, seconds: Option<f64>) -> DigitalAction {
        DigitalAction { op, seconds }
    }

    #[tokio::test(start_paused = true)]
    async fn on_drives_active_level_immediately() {
        let sim = SimDigitalOutput::default();
        let history = sim.history.clone();
        let mut routing = HashMap::new();
        routing.insert(State::Active, action(DigitalOp::On, None));
        let mut out = DigitalOutput::new(sim, Polarity::High, routing);
        let (tx, _rx) = crate::connection::event_channel();
        out.update(&Message::new(State::Active, "x"), &tx);
        assert_eq!(history.lock().as_slice(), &[PinState::High]);
    }

    #[tokio::test(start_paused = true)]
    async fn on_with_seconds_times_out_to_inactive() {
        let sim = SimDigitalOutput::default();
        let history = sim.history.clone();
        let mut routing = HashMap::new();
        routing.insert(State::Active, action(DigitalOp::On, Some(1.0)));
        let mut out = DigitalOutput::new(sim, Polarity::High, routing);
        let (tx, _rx) = crate::connection::event_channel();
        out.update(&Message::new(State::Active, "x"), &tx);
        tokio::time::advance(Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;
        assert_eq!(
            history.lock().as_slice(),
            &[PinState::High, PinState::Low]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn low_polarity_inverts_levels() {
        let sim = SimDigitalOutput::default();
        let history = sim.history.clone();
        let mut routing = HashMap::new();
        routing.insert(State::Active, action(DigitalOp::On, None));
        let mut out = DigitalOutput::new(sim, Polarity::Low, routing);
        let (tx, _rx) = crate::connection::event_channel();
        out.update(&Message::new(State::Active, "x"), &tx);
        assert_eq!(history.lock().as_slice(), &[PinState::Low]);
    }

    #[tokio::test(start_paused = true)]
    async fn new_action_cancels_previous_blink() {
        let sim = SimDigitalOutput::default();
        let history = sim.history.clone();
        let mut routing = HashMap::new();
        routing.insert(State::Active, action(DigitalOp::Blink, Some(0.1)));
        routing.insert(State::Inactive, action(DigitalOp::Off, None));
        let mut out = DigitalOutput::new(sim, Polarity::High, routing);
        let (tx, _rx) = crate::connection::event_channel();
        out.update(&Message::new(State::Active, "x"), &tx);
        tokio::time::advance(Duration::from_millis(250)).await;
        tokio::task::yield_now().await;
        let len_during_blink = history.lock().len();
        assert!(len_during_blink >= 2);

        out.update(&Message::new(State::Inactive, "x"), &tx);
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        let len_after_cancel = history.lock().len();
        assert_eq!(len_after_cancel, len_during_blink + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unmapped_literal_error_defaults_to_sos() {
        let sim = SimDigitalOutput::default();
        let history = sim.history.clone();
        let routing = HashMap::new();
        let mut out = DigitalOutput::new(sim, Polarity::High, routing);
        let (tx, _rx) = crate::connection::event_channel();
        out.update(&Message::new(State::Error, "x"), &tx);
        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert!(!history.lock().is_empty());
    }
}
