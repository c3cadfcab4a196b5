//! Core domain + application logic for the remote-control bot.
//!
//! Telegram, the Transmission daemon, systemctl and the SQLite store live
//! behind ports (traits) implemented in adapter crates.

pub mod broadcast;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod security;
pub mod session;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
