//! DigitalMonitor: edge-triggered background producer over one input line (§4.9).

use embedded_hal::digital::PinState;
use log::warn;

use crate::bus::DigitalInputBus;
use crate::config::DigitalMonitorConfig;
use crate::connection::{Connection, EventSender};
use crate::message::{Message, State};

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);

pub struct DigitalMonitor<B> {
    bus: Option<B>,
    falling: Option<State>,
    rising: Option<State>,
}

impl<B: DigitalInputBus + 'static> DigitalMonitor<B> {
    pub fn new(bus: B, config: &DigitalMonitorConfig) -> Self {
        Self {
            bus: Some(bus),
            falling: config.falling,
            rising: config.rising,
        }
    }
}

/// Given the previous level and a freshly read one, the state (if any)
/// this edge maps to.
fn edge_state(previous: PinState, current: PinState, falling: Option<State>, rising: Option<State>) -> Option<State> {
    match (previous, current) {
        (PinState::High, PinState::Low) => falling,
        (PinState::Low, PinState::High) => rising,
        _ => None,
    }
}

impl<B: DigitalInputBus + 'static> Connection for DigitalMonitor<B> {
    fn update(&mut self, _message: &Message, _outbox: &EventSender) {}

    fn start_background(&mut self, outbox: EventSender) {
        let Some(mut bus) = self.bus.take() else {
            return;
        };
        let falling = self.falling;
        let rising = self.rising;
        tokio::spawn(async move {
            let mut previous = match bus.read() {
                Ok(level) => level,
                Err(e) => {
                    warn!("digital:monitor: initial read failed: {e}");
                    return;
                }
            };
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                let current = match bus.read() {
                    Ok(level) => level,
                    Err(e) => {
                        warn!("digital:monitor: read failed: {e}");
                        continue;
                    }
                };
                if let Some(state) = edge_state(previous, current, falling, rising) {
                    let _ = outbox.send(Message::new(state, "DigitalMonitor"));
                }
                previous = current;
            }
        });
    }

    fn kind(&self) -> &'static str {
        "digital:monitor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falling_edge_maps_to_configured_state() {
        assert_eq!(
            edge_state(PinState::High, PinState::Low, Some(State::Inactive), None),
            Some(State::Inactive)
        );
    }

    #[test]
    fn rising_edge_maps_to_configured_state() {
        assert_eq!(
            edge_state(PinState::Low, PinState::High, None, Some(State::Active)),
            Some(State::Active)
        );
    }

    #[test]
    fn unchanged_level_produces_no_edge() {
        assert_eq!(
            edge_state(PinState::High, PinState::High, Some(State::Inactive), Some(State::Active)),
            None
        );
    }

    #[test]
    fn edge_with_no_mapped_state_is_none() {
        assert_eq!(edge_state(PinState::High, PinState::Low, None, Some(State::Active)), None);
    }
}
