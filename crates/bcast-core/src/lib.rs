//! Core domain + dispatch logic for the broadcast bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the recipient
//! registry live behind ports (traits) implemented in adapter crates or here
//! as small file-backed implementations.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod registry;
pub mod security;
pub mod transport;

pub use errors::{Error, Result};
