//! BadgeReader: abstract producer over a line-oriented source (§4.3).
//!
//! The three concrete variants (`serial:badge_reader`, `stdio:badge_reader`,
//! `input_event:badge_reader`) differ only in which [`LineSource`] feeds
//! them; the debounce and dispatch logic here is shared.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::bus::LineSource;
use crate::config::BadgeCodeConfig;
use crate::connection::{Connection, EventSender};
use crate::message::{Message, State};

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

struct Shared {
    last_status: State,
    ignore_until: HashMap<String, Instant>,
}

pub struct BadgeReader<S> {
    source: Option<S>,
    code: BadgeCodeConfig,
    shared: Arc<Mutex<Shared>>,
    label: &'static str,
}

impl<S: LineSource + 'static> BadgeReader<S> {
    pub fn new(source: S, code: BadgeCodeConfig, label: &'static str) -> Self {
        Self {
            source: Some(source),
            code,
            shared: Arc::new(Mutex::new(Shared {
                last_status: State::Inactive,
                ignore_until: HashMap::new(),
            })),
            label,
        }
    }
}

/// Debounce + dispatch one raw line, returning the [`Message`] to enqueue
/// (if any). Pulled out of the async/threaded plumbing so it is directly
/// unit-testable against a plain clock.
fn process_line(
    shared: &Mutex<Shared>,
    code: &BadgeCodeConfig,
    raw: &str,
    now: Instant,
) -> Option<Message> {
    let mut state = shared.lock();

    state.ignore_until.retain(|_, deadline| *deadline > now);
    if state.ignore_until.contains_key(raw) {
        debug!("badge '{raw}' debounced");
        return None;
    }
    state.ignore_until.insert(raw.to_string(), now + DEBOUNCE_WINDOW);

    if state.last_status == State::Active {
        return Some(Message::new(State::Inactive, "swipe out"));
    }

    let start = code.code_skip_chars.unwrap_or(0);
    let end = code.code_len.unwrap_or(raw.len());
    let slice = raw.get(start..end.min(raw.len())).unwrap_or("");
    match i64::from_str_radix(slice, code.code_base) {
        Ok(value) => Some(
            Message::new(State::CheckBadge, "BadgeReader").with_badge_id(value.to_string()),
        ),
        Err(e) => {
            warn!("badge parse failure on '{raw}' (slice '{slice}'): {e}");
            None
        }
    }
}

impl<S: LineSource + 'static> Connection for BadgeReader<S> {
    fn update(&mut self, message: &Message, _outbox: &EventSender) {
        if message.state.is_info_only() {
            return;
        }
        if message.state != State::Active && message.state != State::Inactive {
            return;
        }
        let mut state = self.shared.lock();
        if state.last_status != message.state {
            state.ignore_until.clear();
            state.last_status = message.state;
        }
    }

    fn start_background(&mut self, outbox: EventSender) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        let code = self.code.clone();
        let shared = self.shared.clone();
        let label = self.label;
        tokio::task::spawn_blocking(move || loop {
            match source.read_line() {
                Ok(Some(raw)) => {
                    let raw = raw.trim();
                    if raw.is_empty() {
                        continue;
                    }
                    if let Some(msg) = process_line(&shared, &code, raw, Instant::now()) {
                        let _ = outbox.send(msg);
                    }
                }
                Ok(None) => {
                    debug!("{label}: line source reached EOF, stopping");
                    break;
                }
                Err(e) => {
                    warn!("{label}: read error: {e}");
                    break;
                }
            }
        });
    }

    fn kind(&self) -> &'static str {
        self.label
    }
}
