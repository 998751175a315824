//! Puppet Mock Environment Abstraction Layer
//!
//! This crate isolates every source of non-determinism the mocker touches
//! so the same engine can run against the **real** world (tokio clock,
//! thread-local entropy) or a **simulated** one (virtual clock, seeded RNG).
//!
//! # Core Concept
//!
//! The mocker never calls `SystemTime::now()` or `rand::thread_rng()`
//! directly. Instead it asks its [`MockerContext`] for:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Randomness (`next_u64()`, `next_f64()`, `random_index()`)
//!
//! By deriving all entropy from a single 64-bit seed, any generated
//! contact list, room membership or message stream becomes reproducible
//! via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use puppet_mock_env::{MockerContext, SimContext, ContactId};
//!
//! let ctx = SimContext::new(42);
//! let id = ContactId::generate(&ctx);
//! let pick = ctx.random_index(10);
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;
mod sim_impl;

pub use context::MockerContext;
pub use types::{ContactId, ConversationId, MessageId, MockerId, RoomId};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use sim_impl::SimContext;
