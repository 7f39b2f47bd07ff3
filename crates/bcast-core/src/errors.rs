use std::path::PathBuf;

/// Core error type for the broadcast bot.
///
/// Only run-level failures (bad options, unreadable recipient lists) reach the
/// caller of a dispatch. `Delivery` is produced by transports and absorbed into
/// the run tally by the batch processor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed recipient list: {path}: {reason}")]
    RecipientList { path: PathBuf, reason: String },

    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
