//! Error types for the mocker environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// An identifier string was empty or whitespace only
    #[error("Invalid {kind} id: {value:?}")]
    InvalidId {
        kind: &'static str,
        value: String,
    },

    /// Attempted to move the virtual clock backwards
    #[error("Clock rewind: {from_ns}ns -> {to_ns}ns")]
    ClockRewind { from_ns: u64, to_ns: u64 },
}

impl EnvError {
    /// Creates an invalid id error.
    pub fn invalid_id(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidId {
            kind,
            value: value.into(),
        }
    }
}
