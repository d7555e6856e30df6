//! HardcodedRFIDs validator: a static badge → state lookup (§4.4).

use std::collections::HashMap;

use log::warn;

use crate::config::HardcodedRfidsConfig;
use crate::connection::{Connection, EventSender};
use crate::message::{Message, State};

const DEFAULT_KEY: &str = "default";

pub struct HardcodedRfids {
    bindings: HashMap<String, State>,
}

impl HardcodedRfids {
    pub fn new(config: &HardcodedRfidsConfig) -> Self {
        let mut bindings = HashMap::new();
        for (state, ids) in &config.bindings {
            for id in ids {
                if bindings.contains_key(id) {
                    warn!("hardcoded_rfids: duplicate binding for '{id}', keeping first");
                    continue;
                }
                bindings.insert(id.clone(), *state);
            }
        }
        Self { bindings }
    }
}

impl Connection for HardcodedRfids {
    fn update(&mut self, message: &Message, outbox: &EventSender) {
        if message.state != State::CheckBadge {
            return;
        }
        let key = message.badge_id.as_deref().unwrap_or(DEFAULT_KEY);
        let resolved = self
            .bindings
            .get(key)
            .or_else(|| self.bindings.get(DEFAULT_KEY));
        if let Some(state) = resolved {
            let _ = outbox.send(Message::new(*state, "HardcodedRFIDs"));
        }
    }

    fn kind(&self) -> &'static str {
        "internal:hardcoded_rfids"
    }
}
