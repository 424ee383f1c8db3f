// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

use crate::item::SourceKind;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy of a monitor run.
///
/// Only `Configuration` and `Render` ever abort a run. The others are
/// recovered where they occur and surface as warnings and counters.
#[derive(Error, Debug)]
pub enum Error {
    #[error("adapter {adapter} failed: {message}")]
    Adapter { adapter: SourceKind, message: String },

    #[error("malformed {shape} record: {reason}")]
    MalformedRecord { shape: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("persisted state at {path} is unreadable: {reason}")]
    StateCorrupt { path: PathBuf, reason: String },

    #[error("report rendering failed: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(shape: &'static str, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            shape,
            reason: reason.into(),
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}
