//! Error types for the SceneMirror core.
//!
//! Lookups and mutations addressed to unknown entities are not errors: they
//! return `None`, a sentinel, or do nothing. `GraphError` only covers the
//! encode/decode surface where bytes cross a process boundary.

use thiserror::Error;

/// Errors raised while encoding or decoding graph state.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Snapshot bytes could not be decoded
    #[error("Snapshot decode error: {0}")]
    SnapshotDecode(String),

    /// Snapshot could not be encoded (e.g. a payload that is not valid JSON)
    #[error("Snapshot encode error: {0}")]
    SnapshotEncode(String),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),
}

impl GraphError {
    /// Creates a snapshot decode error.
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::SnapshotDecode(err.to_string())
    }

    /// Creates a snapshot encode error.
    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self::SnapshotEncode(err.to_string())
    }

    /// Creates a configuration error.
    pub fn config(err: impl std::fmt::Display) -> Self {
        Self::Config(err.to_string())
    }
}
