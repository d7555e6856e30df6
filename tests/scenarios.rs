//! End-to-end scenarios (spec §8): a real `Interlock` driving a real
//! `ConnectionRegistry` built from simulation bus backends — no config
//! parsing involved, just the assembled runtime pieces wired together the
//! way `main.rs`'s factory wires the real ones.

use std::collections::HashMap;
use std::time::Duration;

use embedded_hal::digital::PinState;

use rfid_interlock::bus::sim::{SimDigitalOutput, SimLineSource};
use rfid_interlock::config::{BadgeCodeConfig, DigitalAction, DigitalOp, HardcodedRfidsConfig, Polarity};
use rfid_interlock::connection::badge_reader::BadgeReader;
use rfid_interlock::connection::digital_output::DigitalOutput;
use rfid_interlock::connection::hardcoded_rfids::HardcodedRfids;
use rfid_interlock::connection::ConnectionRegistry;
use rfid_interlock::diagnostics::ErrorArrayHandler;
use rfid_interlock::interlock::Interlock;
use rfid_interlock::message::{Message, State};

fn badge_code() -> BadgeCodeConfig {
    BadgeCodeConfig {
        code_skip_chars: None,
        code_len: Some(4),
        code_base: 16,
    }
}

fn hardcoded(bindings: Vec<(State, Vec<&str>)>) -> HardcodedRfidsConfig {
    HardcodedRfidsConfig {
        bindings: bindings
            .into_iter()
            .map(|(s, ids)| (s, ids.into_iter().map(str::to_string).collect()))
            .collect(),
    }
}

fn relay_routing() -> HashMap<State, DigitalAction> {
    let mut routing = HashMap::new();
    routing.insert(
        State::Active,
        DigitalAction {
            op: DigitalOp::On,
            seconds: None,
        },
    );
    routing.insert(
        State::Inactive,
        DigitalAction {
            op: DigitalOp::Off,
            seconds: None,
        },
    );
    routing
}

/// Assembles a badge reader (fed by `source`), a hardcoded-RFID validator,
/// and a relay `DigitalOutput` whose drive history is observable via the
/// returned `SimDigitalOutput` handle.
fn build_registry(source: SimLineSource, bindings: Vec<(State, Vec<&str>)>) -> (ConnectionRegistry, SimDigitalOutput) {
    let relay = SimDigitalOutput::default();
    let mut registry = ConnectionRegistry::new();
    registry.push(
        "serial:badge_reader",
        Box::new(BadgeReader::new(source, badge_code(), "serial:badge_reader")),
    );
    registry.push(
        "internal:hardcoded_rfids",
        Box::new(HardcodedRfids::new(&hardcoded(bindings))),
    );
    registry.push(
        "gpio:relay",
        Box::new(DigitalOutput::new(relay.clone(), Polarity::High, relay_routing())),
    );
    (registry, relay)
}

fn interlock(registry: ConnectionRegistry, timeout: f64, warning: f64) -> Interlock {
    let errors = ErrorArrayHandler::new();
    Interlock::new(timeout, warning, "0xdeadbeef".to_string(), registry, &errors)
}

#[tokio::test(start_paused = true)]
async fn swipe_in_then_timeout_turns_relay_on_then_off() {
    let source = SimLineSource::default();
    source.feed("04D2");
    let (registry, relay) = build_registry(source, vec![(State::Active, vec!["1234"])]);
    let mut il = interlock(registry, 10.0, 3.0);
    let sender = il.sender();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        drop(sender);
    });
    il.run().await;

    let history = relay.history.lock();
    assert!(history.contains(&PinState::High), "relay should have been driven on for ACTIVE");
    assert_eq!(history.last(), Some(&PinState::Low), "relay should end off after auto-deactivate");
}

#[tokio::test(start_paused = true)]
async fn swipe_in_then_swipe_out_deactivates_immediately() {
    let source = SimLineSource::default();
    source.feed("04D2");
    let (registry, relay) = build_registry(source.clone(), vec![(State::Active, vec!["1234"])]);
    let mut il = interlock(registry, 600.0, 60.0);
    let sender = il.sender();
    tokio::spawn(async move {
        // Let the swipe-in land and the relay turn on before the swipe-out.
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.feed("04D2");
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(sender);
    });
    il.run().await;

    let history = relay.history.lock();
    assert_eq!(
        history.as_slice(),
        &[PinState::High, PinState::Low],
        "swipe-out before the long timeout should deactivate without waiting on the timer"
    );
}

#[tokio::test(start_paused = true)]
async fn duplicate_swipe_within_debounce_window_is_ignored() {
    let source = SimLineSource::default();
    source.feed("04D2");
    source.feed("04D2");
    let (registry, relay) = build_registry(source, vec![(State::Active, vec!["1234"])]);
    let mut il = interlock(registry, 600.0, 60.0);
    let sender = il.sender();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(sender);
    });
    il.run().await;

    // A debounced repeat must not toggle the relay back off.
    let history = relay.history.lock();
    assert_eq!(history.as_slice(), &[PinState::High]);
}

#[tokio::test(start_paused = true)]
async fn reset_timer_with_no_live_timer_has_no_effect_end_to_end() {
    let source = SimLineSource::default();
    let (registry, relay) = build_registry(source, vec![]);
    let mut il = interlock(registry, 10.0, 3.0);
    let sender = il.sender();
    sender.send(Message::new(State::ResetTimer, "test")).unwrap();
    drop(sender);
    il.run().await;

    // Nothing ever drove the relay: RESET_TIMER with no live timer is inert.
    assert!(relay.history.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reset_timer_with_live_timer_keeps_relay_on_and_rearms() {
    let source = SimLineSource::default();
    source.feed("04D2");
    let (registry, relay) = build_registry(source, vec![(State::Active, vec!["1234"])]);
    let mut il = interlock(registry, 2.0, 1.0);
    let sender = il.sender();
    tokio::spawn(async move {
        // Swipe lands, ACTIVE arms the warning timer. Reset it just before
        // the deactivate timer would otherwise fire.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        sender.send(Message::new(State::ResetTimer, "test")).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(sender);
    });
    il.run().await;

    let history = relay.history.lock();
    // Relay goes on once, stays on through the reset (no intervening OFF),
    // then eventually the re-armed timer lets it time out.
    assert_eq!(history.first(), Some(&PinState::High));
    assert_eq!(history.last(), Some(&PinState::Low));
}

#[tokio::test(start_paused = true)]
async fn denied_badge_never_drives_the_relay() {
    let source = SimLineSource::default();
    source.feed("04D2");
    let (registry, relay) = build_registry(source, vec![(State::LoginDenied, vec!["1234"])]);
    let mut il = interlock(registry, 10.0, 3.0);
    let sender = il.sender();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(sender);
    });
    il.run().await;

    assert!(relay.history.lock().is_empty(), "LOGIN_DENIED must never arm the relay");
}

#[tokio::test(start_paused = true)]
async fn unknown_badge_with_no_default_binding_is_a_noop() {
    let source = SimLineSource::default();
    source.feed("04D2");
    let (registry, relay) = build_registry(source, vec![(State::Active, vec!["9999"])]);
    let mut il = interlock(registry, 10.0, 3.0);
    let sender = il.sender();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(sender);
    });
    il.run().await;

    assert!(relay.history.lock().is_empty());
}

#[tokio::test]
async fn bootstrap_lockout_skips_the_relay_entirely() {
    let source = SimLineSource::default();
    let (registry, relay) = build_registry(source, vec![]);
    let mut errors = ErrorArrayHandler::new();
    errors.record("config", "bad timeout value");
    let mut il = Interlock::new(10.0, 3.0, "0xdeadbeef".to_string(), registry, &errors);
    il.run().await;

    // ERROR_CONFIG is fanned out, but no ACTIVE ever reaches the relay.
    assert!(relay.history.lock().is_empty());
}
