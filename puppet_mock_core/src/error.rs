//! Error types for the mocker engine.

use puppet_mock_env::EnvError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a failed lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Contact,
    Room,
    Message,
    /// Either a contact or a room
    Conversation,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PayloadKind::Contact => "contact",
            PayloadKind::Room => "room",
            PayloadKind::Message => "message",
            PayloadKind::Conversation => "conversation",
        };
        f.write_str(name)
    }
}

/// Errors raised by the mocker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockerError {
    /// Payload lookup miss
    #[error("no {kind} payload found for id {id}")]
    NotFound { kind: PayloadKind, id: String },

    /// The puppet binding was already assigned
    #[error("puppet has already been bound, can not be bound twice")]
    AlreadyBound,

    /// The puppet binding was read before assignment
    #[error("puppet has not been bound yet")]
    NotBound,

    /// Random conversation requested over an empty universe
    #[error("no conversation found: 0 contact & 0 room")]
    NoEntities,

    /// A behavior failed while being installed by `start()`
    #[error("behavior {behavior} failed to install: {reason}")]
    BehaviorInstall { behavior: String, reason: String },

    /// Environment layer failure
    #[error(transparent)]
    Env(#[from] EnvError),
}

impl MockerError {
    /// Creates a not-found error for the given payload kind.
    pub fn not_found(kind: PayloadKind, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates a behavior installation error.
    pub fn behavior(behavior: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BehaviorInstall {
            behavior: behavior.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, MockerError>;
