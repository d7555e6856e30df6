//! The interlock's data model: [`State`], the `INFO_ONLY` subset, and [`Message`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed enumeration of interlock conditions, plus the `RESET_TIMER`
/// pseudo-state used only as an internal control signal (never fanned out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    PowerUp,
    Active,
    InactiveSoon,
    Inactive,
    Error,
    ErrorConfig,
    ErrorNetwork,
    ErrorMaintenance,
    TestingNetwork,
    CheckBadge,
    LoginDenied,
    /// Internal control signal: re-arm `ACTIVE` if any timer was live.
    /// Never delivered to a Connection's `update`.
    ResetTimer,
}

impl State {
    /// `true` for transient states that must not overwrite a Connection's
    /// remembered "saved status".
    pub const fn is_info_only(self) -> bool {
        matches!(self, Self::TestingNetwork | Self::CheckBadge | Self::LoginDenied)
    }

    /// The wire name used in configuration routing tables and JSON fields,
    /// matching the original system's `UPPER_SNAKE_CASE` state names.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::PowerUp => "POWER_UP",
            Self::Active => "ACTIVE",
            Self::InactiveSoon => "INACTIVE_SOON",
            Self::Inactive => "INACTIVE",
            Self::Error => "ERROR",
            Self::ErrorConfig => "ERROR_CONFIG",
            Self::ErrorNetwork => "ERROR_NETWORK",
            Self::ErrorMaintenance => "ERROR_MAINTENANCE",
            Self::TestingNetwork => "TESTING_NETWORK",
            Self::CheckBadge => "CHECK_BADGE",
            Self::LoginDenied => "LOGIN_DENIED",
            Self::ResetTimer => "RESET_TIMER",
        }
    }

    pub fn from_wire_name(s: &str) -> Option<Self> {
        Some(match s {
            "POWER_UP" => Self::PowerUp,
            "ACTIVE" => Self::Active,
            "INACTIVE_SOON" => Self::InactiveSoon,
            "INACTIVE" => Self::Inactive,
            "ERROR" => Self::Error,
            "ERROR_CONFIG" => Self::ErrorConfig,
            "ERROR_NETWORK" => Self::ErrorNetwork,
            "ERROR_MAINTENANCE" => Self::ErrorMaintenance,
            "TESTING_NETWORK" => Self::TestingNetwork,
            "CHECK_BADGE" => Self::CheckBadge,
            "LOGIN_DENIED" => Self::LoginDenied,
            "RESET_TIMER" => Self::ResetTimer,
            _ => return None,
        })
    }

    /// States the [`NetworkHeartbeat`](crate::connection::webservice::NetworkHeartbeat)
    /// tracks as `current_mode`.
    pub const fn is_heartbeat_tracked(self) -> bool {
        matches!(
            self,
            Self::Active
                | Self::InactiveSoon
                | Self::Inactive
                | Self::Error
                | Self::ErrorConfig
                | Self::ErrorNetwork
                | Self::ErrorMaintenance
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// An arbitrary scalar value carried in a [`Message`]'s extra fields, also
/// used as the JSON value type for validator replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl Value {
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::Bool(b) => Self::Bool(*b),
            _ => Self::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => write!(f, ""),
        }
    }
}

/// The unit of the event queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub state: State,
    /// Human-readable origin, diagnostic only.
    pub from: String,
    /// Present only for `CHECK_BADGE`: the decimal-rendered badge id.
    pub badge_id: Option<String>,
    /// Arbitrary additional context, forwarded to the Validator's URL
    /// templating (e.g. saved validator reply fields merged in by callers
    /// that need them).
    pub fields: HashMap<String, Value>,
}

impl Message {
    pub fn new(state: State, from: impl Into<String>) -> Self {
        Self {
            state,
            from: from.into(),
            badge_id: None,
            fields: HashMap::new(),
        }
    }

    pub fn with_badge_id(mut self, badge_id: impl Into<String>) -> Self {
        self.badge_id = Some(badge_id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_only_set_matches_spec() {
        assert!(State::TestingNetwork.is_info_only());
        assert!(State::CheckBadge.is_info_only());
        assert!(State::LoginDenied.is_info_only());
        assert!(!State::Active.is_info_only());
        assert!(!State::Inactive.is_info_only());
        assert!(!State::ResetTimer.is_info_only());
    }

    #[test]
    fn wire_name_roundtrip() {
        for s in [
            State::PowerUp,
            State::Active,
            State::InactiveSoon,
            State::Inactive,
            State::Error,
            State::ErrorConfig,
            State::ErrorNetwork,
            State::ErrorMaintenance,
            State::TestingNetwork,
            State::CheckBadge,
            State::LoginDenied,
            State::ResetTimer,
        ] {
            assert_eq!(State::from_wire_name(s.wire_name()), Some(s));
        }
    }

    #[test]
    fn heartbeat_tracked_excludes_transients() {
        assert!(!State::PowerUp.is_heartbeat_tracked());
        assert!(!State::CheckBadge.is_heartbeat_tracked());
        assert!(State::Active.is_heartbeat_tracked());
        assert!(State::ErrorNetwork.is_heartbeat_tracked());
    }

    #[test]
    fn message_builder() {
        let msg = Message::new(State::CheckBadge, "BadgeReader")
            .with_badge_id("1234")
            .with_field("tool_id", Value::String("0xdeadbeef".into()));
        assert_eq!(msg.badge_id.as_deref(), Some("1234"));
        assert_eq!(
            msg.fields.get("tool_id"),
            Some(&Value::String("0xdeadbeef".into()))
        );
    }
}
