//! Identifier types shared by the mocker and its adapter.

use crate::context::MockerContext;
use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a string-backed identifier newtype.
///
/// Ids are opaque strings so adapters can inject well-known values
/// (e.g. a fixed logged-in user id) next to generated ones.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a random identifier from the context's entropy.
            ///
            /// Deterministic under a seeded context.
            pub fn generate<C: MockerContext + ?Sized>(ctx: &C) -> Self {
                let uuid = uuid::Builder::from_random_bytes(ctx.random_bytes()).into_uuid();
                Self(uuid.to_string())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = EnvError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(EnvError::invalid_id($kind, s));
                }
                Ok(Self(trimmed.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a contact payload.
    ContactId,
    "contact"
);

string_id!(
    /// Identifier of a room payload.
    RoomId,
    "room"
);

string_id!(
    /// Identifier of a message payload.
    MessageId,
    "message"
);

string_id!(
    /// Identifier of a conversation: either a contact id or a room id.
    ///
    /// Message recipients use this type; the mocker does not record which
    /// kind of entity the id points at.
    ConversationId,
    "conversation"
);

impl From<ContactId> for ConversationId {
    fn from(id: ContactId) -> Self {
        Self(id.0)
    }
}

impl From<&ContactId> for ConversationId {
    fn from(id: &ContactId) -> Self {
        Self(id.0.clone())
    }
}

impl From<RoomId> for ConversationId {
    fn from(id: RoomId) -> Self {
        Self(id.0)
    }
}

impl From<&RoomId> for ConversationId {
    fn from(id: &RoomId) -> Self {
        Self(id.0.clone())
    }
}

impl PartialEq<ContactId> for ConversationId {
    fn eq(&self, other: &ContactId) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<RoomId> for ConversationId {
    fn eq(&self, other: &RoomId) -> bool {
        self.0 == other.0
    }
}

/// Process-lifetime identity of a mocker instance.
///
/// Always drawn from OS entropy, even under a seeded context, so two
/// mockers built from the same seed remain distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MockerId(pub Uuid);

impl MockerId {
    /// Creates a new random MockerId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MockerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MockerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}
