//! Error types for the simulation harness.

use scenemirror_core::GraphError;
use thiserror::Error;

/// Errors that can occur while running a scenario.
#[derive(Debug, Error)]
pub enum SimError {
    /// A graph invariant did not hold after a run
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Harness configuration was rejected
    #[error("Config error: {0}")]
    Config(String),

    /// Snapshot encode/decode failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Export file could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Creates an invariant violation.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Creates a configuration error.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }
}
