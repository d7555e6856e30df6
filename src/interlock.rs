//! The Interlock: the sole event-queue consumer, timer housekeeping, and
//! Connection fanout (§4.1).

use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::connection::{event_channel, ConnectionRegistry, EventReceiver, EventSender};
use crate::diagnostics::ErrorArrayHandler;
use crate::message::{Message, State};

/// Cancellable handles for the two mutually-exclusive auto-deactivate timers.
#[derive(Default)]
struct Timers {
    to_warning: Option<JoinHandle<()>>,
    to_deactivate: Option<JoinHandle<()>>,
}

impl Timers {
    fn cancel_all(&mut self) {
        if let Some(t) = self.to_warning.take() {
            t.abort();
        }
        if let Some(t) = self.to_deactivate.take() {
            t.abort();
        }
    }

    fn any_live(&self) -> bool {
        self.to_warning.is_some() || self.to_deactivate.is_some()
    }
}

pub struct Interlock {
    timeout_secs: f64,
    warning_secs: f64,
    tool_id: String,
    registry: ConnectionRegistry,
    timers: Timers,
    outbox: EventSender,
    inbox: EventReceiver,
    locked_out: bool,
}

impl Interlock {
    /// Assemble the Interlock from an already-instantiated registry. Errors
    /// recorded in `bootstrap_errors` (construction-time failures captured
    /// in the caller's [`ErrorArrayHandler`]) determine whether this
    /// instance starts locked out.
    pub fn new(
        timeout_secs: f64,
        warning_secs: f64,
        tool_id: String,
        registry: ConnectionRegistry,
        bootstrap_errors: &ErrorArrayHandler,
    ) -> Self {
        let (outbox, inbox) = event_channel();
        Self {
            timeout_secs,
            warning_secs,
            tool_id,
            registry,
            timers: Timers::default(),
            outbox,
            inbox,
            locked_out: bootstrap_errors.should_lock_out(),
        }
    }

    /// A sender any external bootstrap code (e.g. the daemon's signal
    /// handler) can use to inject messages into the same queue the
    /// Connections publish to.
    pub fn sender(&self) -> EventSender {
        self.outbox.clone()
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    /// Runs the full lifecycle: bootstrap fanout, background task startup,
    /// and (if not locked out) the main event loop. Returns once the queue
    /// is closed (every sender dropped) or the process is asked to stop.
    pub async fn run(&mut self) {
        let power_up = Message::new(State::PowerUp, "bootstrap");
        self.registry.dispatch(&power_up, &self.outbox);

        if self.locked_out {
            warn!("interlock: entering locked_out due to bootstrap configuration errors");
            let error_config = Message::new(State::ErrorConfig, "bootstrap");
            self.registry.dispatch(&error_config, &self.outbox);
            return;
        }

        self.registry.start_all_background(&self.outbox);
        let _ = self
            .outbox
            .send(Message::new(State::Inactive, "initial power up"));

        while let Some(message) = self.inbox.recv().await {
            self.handle(message).await;
        }
    }

    async fn handle(&mut self, message: Message) {
        match message.state {
            State::Active => self.active_mode(),
            State::InactiveSoon => self.warning_mode(),
            State::Inactive => self.inactive_mode(),
            State::Error => self.timers.cancel_all(),
            State::ResetTimer => {
                if self.timers.any_live() {
                    let _ = self.outbox.send(Message::new(State::Active, "reset_timer"));
                }
                // RESET_TIMER is a pure control signal: never fanned out.
                return;
            }
            _ => {}
        }
        self.registry.dispatch(&message, &self.outbox);
    }

    fn active_mode(&mut self) {
        self.timers.cancel_all();
        let delay = (self.timeout_secs - self.warning_secs).max(0.0);
        let tx = self.outbox.clone();
        self.timers.to_warning = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            let _ = tx.send(Message::new(State::InactiveSoon, "timer_to_warning"));
        }));
    }

    fn warning_mode(&mut self) {
        if self.timers.to_deactivate.is_some() && self.timers.to_warning.is_none() {
            // Already counting down to deactivation; a repeated
            // INACTIVE_SOON is a no-op (§4.1).
            return;
        }
        self.timers.cancel_all();
        let tx = self.outbox.clone();
        let delay = self.warning_secs.max(0.0);
        self.timers.to_deactivate = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            let _ = tx.send(Message::new(State::Inactive, "timer_to_deactivate"));
        }));
    }

    fn inactive_mode(&mut self) {
        self.timers.cancel_all();
    }
}

/// Derive the `tool_id` to present to validators/heartbeats: the
/// configured value if present, else the MAC-derived fallback (§4.1).
pub fn resolve_tool_id(configured: Option<&str>) -> String {
    match configured {
        Some(id) => id.to_string(),
        None => {
            let mac = crate::device_id::read_mac();
            let id = crate::device_id::tool_id(&mac);
            info!("interlock: no tool_id configured, derived '{id}' from MAC address");
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        seen: Arc<Mutex<Vec<State>>>,
    }

    impl Connection for Recorder {
        fn update(&mut self, message: &Message, _outbox: &EventSender) {
            self.seen.lock().unwrap().push(message.state);
        }

        fn kind(&self) -> &'static str {
            "test:recorder"
        }
    }

    fn harness(timeout: f64, warning: f64) -> (Interlock, Arc<Mutex<Vec<State>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ConnectionRegistry::default();
        registry.push("recorder", Box::new(Recorder { seen: seen.clone() }));
        let errors = ErrorArrayHandler::new();
        let interlock = Interlock::new(timeout, warning, "0xdeadbeef".to_string(), registry, &errors);
        (interlock, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn power_up_and_initial_inactive_are_fanned_out() {
        let (mut interlock, seen) = harness(10.0, 3.0);
        let sender = interlock.sender();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(sender);
        });
        interlock.run().await;
        let events = seen.lock().unwrap();
        assert_eq!(events[0], State::PowerUp);
        assert!(events.contains(&State::Inactive));
    }

    #[tokio::test(start_paused = true)]
    async fn active_arms_warning_after_timeout_minus_warning() {
        let (mut interlock, seen) = harness(10.0, 3.0);
        let sender = interlock.sender();
        sender.send(Message::new(State::Active, "test")).unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(11)).await;
            drop(sender);
        });
        interlock.run().await;
        let events = seen.lock().unwrap();
        assert!(events.contains(&State::Active));
        assert!(events.contains(&State::InactiveSoon));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_timer_with_no_live_timer_has_no_effect() {
        let (mut interlock, seen) = harness(10.0, 3.0);
        let sender = interlock.sender();
        sender.send(Message::new(State::ResetTimer, "test")).unwrap();
        drop(sender);
        interlock.run().await;
        let events = seen.lock().unwrap();
        assert!(!events.contains(&State::ResetTimer));
        assert!(!events.contains(&State::Active) || events.iter().filter(|s| **s == State::Active).count() == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_timer_with_live_timer_re_enqueues_active() {
        let (mut interlock, seen) = harness(10.0, 3.0);
        let sender = interlock.sender();
        sender.send(Message::new(State::Active, "test")).unwrap();
        let sender2 = sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender2.send(Message::new(State::ResetTimer, "test")).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(sender2);
        });
        drop(sender);
        interlock.run().await;
        let events = seen.lock().unwrap();
        let active_count = events.iter().filter(|s| **s == State::Active).count();
        assert_eq!(active_count, 2);
    }

    #[tokio::test]
    async fn locked_out_broadcasts_error_config_and_skips_loop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ConnectionRegistry::default();
        registry.push("recorder", Box::new(Recorder { seen: seen.clone() }));
        let mut errors = ErrorArrayHandler::new();
        errors.record("config", "bad timeout");
        let mut interlock = Interlock::new(10.0, 3.0, "0xdeadbeef".to_string(), registry, &errors);
        interlock.run().await;
        let events = seen.lock().unwrap();
        assert_eq!(events.as_slice(), &[State::PowerUp, State::ErrorConfig]);
    }

    #[test]
    fn resolve_tool_id_prefers_configured_value() {
        assert_eq!(resolve_tool_id(Some("0xabc123")), "0xabc123");
    }
}
