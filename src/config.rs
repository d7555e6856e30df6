//! Configuration model: typed view of the per-connection routing table.
//!
//! The configuration file is a single JSON object. A handful of top-level
//! keys are interpreted by the Interlock itself (`timeout`, `warning`,
//! `tool_id`, `lockfile`, `logging`); every other key names a Connection,
//! whose value carries a `type` tag and that Connection's own routing
//! table. One bad Connection entry is recorded as a [`ConfigError`] and
//! skipped rather than failing the whole file, matching the "unknown
//! connection types log a config error" contract.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value as Json;

use crate::error::ConfigError;
use crate::message::{State, Value};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub timeout_secs: f64,
    pub warning_secs: f64,
    pub tool_id: Option<String>,
    pub lockfile: Option<PathBuf>,
    /// `RUST_LOG`-style filter string; only consulted if the environment
    /// variable itself is unset.
    pub logging: Option<String>,
    /// Connections in declaration order — fanout order is iteration order
    /// of this list (see the Interlock's main-loop contract).
    pub connections: Vec<(String, ConnectionConfig)>,
}

impl Config {
    /// Parse a configuration document, collecting recoverable errors
    /// (unknown connection types, malformed per-connection routing)
    /// instead of failing outright. A non-empty `errors` return means the
    /// bootstrap should broadcast `ERROR_CONFIG` and enter `locked_out`.
    pub fn parse(raw: &str) -> Result<(Config, Vec<ConfigError>), ConfigError> {
        let doc: Json =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let obj = doc
            .as_object()
            .ok_or_else(|| ConfigError::Parse("top-level document must be a JSON object".into()))?;

        let mut errors = Vec::new();

        let timeout_secs = match obj.get("timeout").and_then(Json::as_f64) {
            Some(v) => v,
            None => {
                errors.push(ConfigError::BadTiming("timeout must be numeric".into()));
                0.0
            }
        };
        let warning_secs = match obj.get("warning").and_then(Json::as_f64) {
            Some(v) => v,
            None => {
                errors.push(ConfigError::BadTiming("warning must be numeric".into()));
                0.0
            }
        };
        let tool_id = obj
            .get("tool_id")
            .and_then(Json::as_str)
            .map(str::to_owned);
        let lockfile = obj
            .get("lockfile")
            .and_then(Json::as_str)
            .map(PathBuf::from);
        let logging = obj
            .get("logging")
            .and_then(Json::as_str)
            .map(str::to_owned);

        const RESERVED: &[&str] = &["timeout", "warning", "tool_id", "lockfile", "logging"];
        let mut connections = Vec::new();
        for (name, value) in obj {
            if RESERVED.contains(&name.as_str()) {
                continue;
            }
            match ConnectionConfig::parse(value) {
                Ok(cfg) => connections.push((name.clone(), cfg)),
                Err(e) => errors.push(ConfigError::BadRoutingEntry {
                    name: name.clone(),
                    detail: e,
                }),
            }
        }

        Ok((
            Config {
                timeout_secs,
                warning_secs,
                tool_id,
                lockfile,
                logging,
                connections,
            },
            errors,
        ))
    }
}

// ---------------------------------------------------------------------------
// Per-connection configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ConnectionConfig {
    DigitalOutput(DigitalOutputConfig),
    StdioOutput(StdioOutputConfig),
    LcdOutput(LcdOutputConfig),
    WebService(WebServiceConfig),
    SerialBadgeReader(BadgeReaderConfig),
    StdioBadgeReader(BadgeReaderConfig),
    InputEventBadgeReader(BadgeReaderConfig),
    AnalogMonitor(AnalogMonitorConfig),
    DigitalMonitor(DigitalMonitorConfig),
    HardcodedRfids(HardcodedRfidsConfig),
}

impl ConnectionConfig {
    fn parse(value: &Json) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "connection entry must be a JSON object".to_string())?;
        let kind = obj
            .get("type")
            .and_then(Json::as_str)
            .ok_or_else(|| "missing 'type' tag".to_string())?;

        Ok(match kind {
            "digital:output" => ConnectionConfig::DigitalOutput(
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            ),
            "stdio:output" => ConnectionConfig::StdioOutput(
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            ),
            "lcd_p018:output" => ConnectionConfig::LcdOutput(
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            ),
            "webservice:connection" => ConnectionConfig::WebService(WebServiceConfig::parse(obj)?),
            "serial:badge_reader" => ConnectionConfig::SerialBadgeReader(
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            ),
            "stdio:badge_reader" => ConnectionConfig::StdioBadgeReader(
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            ),
            "input_event:badge_reader" => ConnectionConfig::InputEventBadgeReader(
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            ),
            "analog:monitor" => ConnectionConfig::AnalogMonitor(AnalogMonitorConfig::parse(obj)?),
            "digital:monitor" => ConnectionConfig::DigitalMonitor(
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            ),
            "internal:hardcoded_rfids" => {
                ConnectionConfig::HardcodedRfids(HardcodedRfidsConfig::parse(obj)?)
            }
            other => return Err(format!("unknown connection type '{other}'")),
        })
    }
}

fn default_polarity() -> Polarity {
    Polarity::High
}

fn default_code_base() -> u32 {
    16
}

fn default_baud() -> u32 {
    9600
}

fn default_lcd_columns() -> usize {
    16
}

fn default_lcd_rows() -> usize {
    2
}

fn default_i2c_bus() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Polarity {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DigitalOp {
    On,
    Off,
    Blink,
    Sos,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DigitalAction {
    pub op: DigitalOp,
    pub seconds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigitalOutputConfig {
    pub pin: String,
    #[serde(default = "default_polarity")]
    pub on: Polarity,
    #[serde(default)]
    pub routing: HashMap<State, DigitalAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StdioOutputConfig {
    #[serde(default)]
    pub routing: HashMap<State, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LcdAction {
    pub message: Vec<String>,
    pub color: (u8, u8, u8),
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LcdOutputConfig {
    /// Linux I2C bus index (`/dev/i2c-<N>`), matching the original
    /// `"i2c:<bus>:0x38"` connection-string convention.
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    #[serde(default = "default_lcd_columns")]
    pub columns: usize,
    #[serde(default = "default_lcd_rows")]
    pub rows: usize,
    #[serde(default)]
    pub routing: HashMap<State, LcdAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BadgeCodeConfig {
    pub code_skip_chars: Option<usize>,
    pub code_len: Option<usize>,
    #[serde(default = "default_code_base")]
    pub code_base: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BadgeReaderConfig {
    /// Serial device path (`serial:badge_reader`) or HID device path
    /// (`input_event:badge_reader`); unused by `stdio:badge_reader`.
    pub device: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(flatten)]
    pub code: BadgeCodeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangeCondition {
    pub higher: Option<f64>,
    pub lower: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AnalogMonitorConfig {
    pub pin: String,
    /// Declaration order preserved (not a `HashMap`) so evaluation is
    /// deterministic — see the Design Notes decision on iteration order.
    pub routing: Vec<(State, RangeCondition)>,
}

impl AnalogMonitorConfig {
    fn parse(obj: &serde_json::Map<String, Json>) -> Result<Self, String> {
        let pin = obj
            .get("pin")
            .and_then(Json::as_str)
            .ok_or("analog:monitor requires a 'pin'")?
            .to_string();
        let mut routing = Vec::new();
        for (key, value) in obj {
            let Some(state) = State::from_wire_name(key) else {
                continue;
            };
            let cond: RangeCondition =
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
            routing.push((state, cond));
        }
        Ok(Self { pin, routing })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigitalMonitorConfig {
    pub pin: String,
    pub falling: Option<State>,
    pub rising: Option<State>,
}

/// A validator routing entry: either a bare URL template string, or a full
/// object carrying `save_reply` and `"<state>:when"` match conditions.
#[derive(Debug, Clone)]
pub enum ValidatorAction {
    UrlOnly(String),
    Full {
        url: String,
        save_reply: bool,
        conditions: Vec<(State, HashMap<String, Value>)>,
    },
}

impl ValidatorAction {
    pub fn url_template(&self) -> &str {
        match self {
            ValidatorAction::UrlOnly(u) => u,
            ValidatorAction::Full { url, .. } => url,
        }
    }

    fn parse(value: &Json) -> Result<Self, String> {
        if let Some(s) = value.as_str() {
            return Ok(ValidatorAction::UrlOnly(s.to_string()));
        }
        let obj = value
            .as_object()
            .ok_or("validator routing entry must be a string or object")?;
        let url = obj
            .get("url")
            .and_then(Json::as_str)
            .ok_or("validator routing object requires 'url'")?
            .to_string();
        let save_reply = obj
            .get("save_reply")
            .and_then(Json::as_bool)
            .unwrap_or(false);
        let mut conditions = Vec::new();
        for (key, cond_value) in obj {
            let Some(state_name) = key.strip_suffix(":when") else {
                continue;
            };
            let Some(state) = State::from_wire_name(state_name) else {
                continue;
            };
            let cond_obj = cond_value
                .as_object()
                .ok_or("'<state>:when' condition must be an object")?;
            let mut fields = HashMap::new();
            for (field, expected) in cond_obj {
                fields.insert(field.clone(), Value::from_json(expected));
            }
            conditions.push((state, fields));
        }
        Ok(ValidatorAction::Full {
            url,
            save_reply,
            conditions,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    pub query_url: String,
}

#[derive(Debug, Clone)]
pub struct WebServiceConfig {
    pub routing: Vec<(State, ValidatorAction)>,
    pub heartbeat_monitor: Option<HeartbeatConfig>,
}

impl WebServiceConfig {
    fn parse(obj: &serde_json::Map<String, Json>) -> Result<Self, String> {
        let heartbeat_monitor = match obj.get("heartbeat_monitor") {
            Some(v) => Some(serde_json::from_value(v.clone()).map_err(|e| e.to_string())?),
            None => None,
        };
        let mut routing = Vec::new();
        for (key, value) in obj {
            let Some(state) = State::from_wire_name(key) else {
                continue;
            };
            routing.push((state, ValidatorAction::parse(value)?));
        }
        Ok(Self {
            routing,
            heartbeat_monitor,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HardcodedRfidsConfig {
    /// `"<state>:when"` → list of badge ids, in declaration order.
    pub bindings: Vec<(State, Vec<String>)>,
}

impl HardcodedRfidsConfig {
    fn parse(obj: &serde_json::Map<String, Json>) -> Result<Self, String> {
        let check_badge = obj
            .get("CHECK_BADGE")
            .and_then(Json::as_object)
            .ok_or("internal:hardcoded_rfids requires a 'CHECK_BADGE' object")?;
        let mut bindings = Vec::new();
        for (key, value) in check_badge {
            let Some(state_name) = key.strip_suffix(":when") else {
                continue;
            };
            let Some(state) = State::from_wire_name(state_name) else {
                continue;
            };
            let ids: Vec<String> = value
                .as_array()
                .ok_or("badge id list must be an array")?
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            bindings.push((state, ids));
        }
        Ok(Self { bindings })
    }
}
