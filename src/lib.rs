//! RFID interlock controller library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection: the data model, configuration loader, bus abstractions,
//! Connection implementations, and the Interlock event loop itself.

#![deny(unused_must_use)]

pub mod bus;
pub mod config;
pub mod connection;
pub mod device_id;
pub mod diagnostics;
pub mod error;
pub mod interlock;
pub mod lcd;
pub mod message;
