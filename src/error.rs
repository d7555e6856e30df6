//! Unified error types for the interlock core.
//!
//! Follows the same shape as other hexagonal-architecture firmware in this
//! family: a single `InterlockError` enum that every subsystem converts
//! into, keeping the Interlock's own error handling uniform. Unlike the
//! pure sensor/actuator firmware this descends from, the subsystems here
//! are configuration, connection I/O, and network access — so the variants
//! reflect that domain instead.

use std::fmt;

/// Every fallible operation in the interlock core funnels into this type.
#[derive(Debug)]
pub enum InterlockError {
    /// Configuration failed to parse, or named an unrecognized Connection type.
    Config(ConfigError),
    /// A Connection's own setup or I/O failed.
    Connection(ConnectionError),
    /// Filesystem / bus I/O failure.
    Io(std::io::Error),
    /// Validator or heartbeat network failure.
    Network(NetworkError),
}

impl fmt::Display for InterlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Connection(e) => write!(f, "connection: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Network(e) => write!(f, "network: {e}"),
        }
    }
}

impl std::error::Error for InterlockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for InterlockError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ConnectionError> for InterlockError {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e)
    }
}

impl From<std::io::Error> for InterlockError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<NetworkError> for InterlockError {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `timeout` or `warning` were missing or non-numeric.
    BadTiming(String),
    /// A Connection entry's `type` tag did not match any known kind.
    UnknownConnectionType { name: String, kind: String },
    /// A Connection's routing table referenced a field it could not use.
    BadRoutingEntry { name: String, detail: String },
    /// The configuration file could not be read or parsed as JSON.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadTiming(msg) => write!(f, "bad timeout/warning: {msg}"),
            Self::UnknownConnectionType { name, kind } => {
                write!(f, "connection '{name}': unknown type '{kind}'")
            }
            Self::BadRoutingEntry { name, detail } => {
                write!(f, "connection '{name}': {detail}")
            }
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Connection errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The underlying bus (GPIO/I2C/serial/HID) returned an I/O failure.
    BusIo(String),
    /// A badge code could not be parsed from its raw slice.
    BadgeParse { raw: String, reason: String },
    /// LCD geometry mismatch (row too long, wrong row count).
    LcdGeometry { expected_cols: usize, got: usize },
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusIo(msg) => write!(f, "bus I/O: {msg}"),
            Self::BadgeParse { raw, reason } => {
                write!(f, "could not parse badge code '{raw}': {reason}")
            }
            Self::LcdGeometry { expected_cols, got } => {
                write!(f, "LCD row length {got} does not match {expected_cols} columns")
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

// ---------------------------------------------------------------------------
// Network errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    UrlTemplate(String),
    Http(String),
    Json(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlTemplate(msg) => write!(f, "URL template: {msg}"),
            Self::Http(msg) => write!(f, "HTTP: {msg}"),
            Self::Json(msg) => write!(f, "JSON: {msg}"),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Interlock-wide `Result` alias.
pub type Result<T> = std::result::Result<T, InterlockError>;
