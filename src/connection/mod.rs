//! Connection trait & lifecycle: the uniform `update(message)` contract
//! every input/output plugs into, plus the registry the Interlock owns.

pub mod analog_monitor;
pub mod badge_reader;
pub mod digital_monitor;
pub mod digital_output;
pub mod hardcoded_rfids;
pub mod lcd_output;
pub mod stdio_output;
pub mod webservice;

use tokio::sync::mpsc;

use crate::message::Message;

/// Handle producers (badge readers, monitors, validator follow-ups, the
/// heartbeat) use to push a message onto the Interlock's single event
/// queue. Cloning is cheap; every Connection that produces messages holds
/// one.
pub type EventSender = mpsc::UnboundedSender<Message>;
pub type EventReceiver = mpsc::UnboundedReceiver<Message>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Every Connection exposes this contract (§4.2). A Connection may be a
/// pure consumer (outputs), pure producer (monitors, badge readers), or
/// mixed (validator, heartbeat).
pub trait Connection: Send {
    /// React to a message. Must return quickly: if reacting requires I/O
    /// (HTTP, LCD bus writes with retry), spawn a task against `outbox`
    /// rather than blocking here.
    fn update(&mut self, message: &Message, outbox: &EventSender);

    /// Start this Connection's background producer loop, if it has one.
    /// Called once at startup for every Connection whose config declares
    /// `run_continuously`. Default: no background task.
    fn start_background(&mut self, _outbox: EventSender) {}

    /// Human-readable name for logging; the registry also tracks the
    /// configured name separately, this is for self-identification in
    /// log lines emitted from within `update`/background loops.
    fn kind(&self) -> &'static str;
}

/// An owned, named Connection plus whether it declared a background task.
pub struct Registered {
    pub name: String,
    pub connection: Box<dyn Connection>,
}

/// The Interlock's connection registry. Fanout order is insertion order,
/// matching the spec's "Fanout ordering is iteration order of the
/// connection list".
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Vec<Registered>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, connection: Box<dyn Connection>) {
        self.entries.push(Registered {
            name: name.into(),
            connection,
        });
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Registered> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fan the message out to every registered Connection, in order.
    pub fn dispatch(&mut self, message: &Message, outbox: &EventSender) {
        for entry in self.entries.iter_mut() {
            entry.connection.update(message, outbox);
        }
    }

    pub fn start_all_background(&mut self, outbox: &EventSender) {
        for entry in self.entries.iter_mut() {
            entry.connection.start_background(outbox.clone());
        }
    }
}
