//! AnalogMonitor: per-state range/disjunction conditions over one ADC channel (§4.10).

use std::time::Duration;

use log::warn;

use crate::bus::AnalogInputBus;
use crate::config::RangeCondition;
use crate::connection::{Connection, EventSender};
use crate::message::{Message, State};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const HYSTERESIS_SLEEP: Duration = Duration::from_millis(500);

pub struct AnalogMonitor<B> {
    bus: Option<B>,
    routing: Vec<(State, RangeCondition)>,
}

impl<B: AnalogInputBus + 'static> AnalogMonitor<B> {
    pub fn new(bus: B, routing: Vec<(State, RangeCondition)>) -> Self {
        Self {
            bus: Some(bus),
            routing,
        }
    }
}

/// `true` if `value` satisfies `cond`, per the range-vs-disjunction rule:
/// when both bounds are set and `higher < lower`, treat them as a closed
/// band; otherwise either bound alone triggers.
fn condition_met(value: f64, cond: &RangeCondition) -> bool {
    match (cond.higher, cond.lower) {
        (Some(higher), Some(lower)) if higher < lower => value > higher && value < lower,
        (higher, lower) => {
            higher.is_some_and(|h| value > h) || lower.is_some_and(|l| value < l)
        }
    }
}

/// First matching condition in declaration order, preserving the
/// deterministic-evaluation-order contract.
fn first_match(routing: &[(State, RangeCondition)], value: f64) -> Option<State> {
    routing
        .iter()
        .find(|(_, cond)| condition_met(value, cond))
        .map(|(state, _)| *state)
}

impl<B: AnalogInputBus + 'static> Connection for AnalogMonitor<B> {
    fn update(&mut self, _message: &Message, _outbox: &EventSender) {}

    fn start_background(&mut self, outbox: EventSender) {
        let Some(mut bus) = self.bus.take() else {
            return;
        };
        let routing = self.routing.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                let value = match bus.read_normalized() {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("analog:monitor: read failed: {e}");
                        continue;
                    }
                };
                if let Some(state) = first_match(&routing, value) {
                    let _ = outbox.send(Message::new(state, "AnalogMonitor"));
                    tokio::time::sleep(HYSTERESIS_SLEEP).await;
                }
            }
        });
    }

    fn kind(&self) -> &'static str {
        "analog:monitor"
    }
}
