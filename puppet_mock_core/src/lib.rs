//! Puppet Mock Core - In-Memory Chat Universe
//!
//! This library simulates the contacts, rooms and messages a chat backend
//! would serve, so chat-automation code can be tested without a network:
//! 1. **Payload Store**: authoritative id -> payload maps for every entity
//! 2. **Entity Factory**: seeded, randomized-but-valid payload generation
//! 3. **Behaviors**: pluggable autonomous activity with start/stop lifecycle
//! 4. **Events**: scan/login/logout/message/dong pushed to one bound sink
//!
//! # Architecture
//!
//! ```text
//!   test code / behaviors
//!          │  create_*, say, login ...
//!   ┌──────▼───────────────────────────────┐
//!   │               Mocker                 │
//!   │  EntityFactory ── PayloadStore       │
//!   │  BehaviorRegistry                    │
//!   │  Binding<PuppetSink> ────────────────┼──► adapter (EventBus)
//!   └──────────────────────────────────────┘
//! ```

pub mod behavior;
pub mod binding;
pub mod error;
pub mod events;
pub mod factory;
pub mod handle;
pub mod mocker;
pub mod payload;
pub mod store;

// Re-export key types for convenience
pub use behavior::{recurring, Behavior, BehaviorRegistry, CancelHandle, Populate, RandomTalk};
pub use binding::Binding;
pub use error::{MockerError, PayloadKind, Result};
pub use events::{EventBus, PuppetEvent, PuppetSink, ScanStatus};
pub use factory::EntityFactory;
pub use handle::{Contact, Conversation, Room};
pub use mocker::{Mocker, WeakMocker};
pub use payload::{
    ContactOverrides, ContactPayload, ContactType, Gender, MessageBody, MessagePayload,
    MessageType, RoomOverrides, RoomPayload,
};
pub use store::{PayloadMap, PayloadStore, StoreStats};

pub use puppet_mock_env::{
    ContactId, ConversationId, MessageId, MockerContext, MockerId, RoomId, SimContext,
    TokioContext,
};
