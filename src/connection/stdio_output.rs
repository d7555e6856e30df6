//! StdioOutput: prints a literal line per routed state (§4.2, §6).

use std::collections::HashMap;

use crate::config::StdioOutputConfig;
use crate::connection::{Connection, EventSender};
use crate::message::{Message, State};

pub struct StdioOutput {
    routing: HashMap<State, String>,
}

impl StdioOutput {
    pub fn new(config: &StdioOutputConfig) -> Self {
        Self {
            routing: config.routing.clone(),
        }
    }
}

impl Connection for StdioOutput {
    fn update(&mut self, message: &Message, _outbox: &EventSender) {
        if let Some(line) = self.routing.get(&message.state) {
            println!("{line}");
        }
    }

    fn kind(&self) -> &'static str {
        "stdio:output"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_state_is_not_an_error() {
        let mut routing = HashMap::new();
        routing.insert(State::Active, "tool is live".to_string());
        let mut out = StdioOutput::new(&StdioOutputConfig { routing });
        let (tx, _rx) = crate::connection::event_channel();
        out.update(&Message::new(State::Active, "x"), &tx);
    }

    #[test]
    fn unmapped_state_is_silently_ignored() {
        let mut out = StdioOutput::new(&StdioOutputConfig {
            routing: HashMap::new(),
        });
        let (tx, _rx) = crate::connection::event_channel();
        out.update(&Message::new(State::Error, "x"), &tx);
    }
}
