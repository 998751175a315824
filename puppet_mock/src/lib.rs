//! Puppet Mock - adapter, fixture and simulator over the in-memory mocker
//!
//! This crate is what a chat-automation framework talks to:
//! - **PuppetMock**: the puppet adapter, bound once into a `Mocker`
//! - **Fixture**: a logged-in user, two friends, a room and a first message
//! - **Runner**: seeded, reproducible traffic simulation behind the
//!   `puppet-mock-sim` binary
//!
//! # Usage
//!
//! ```ignore
//! use puppet_mock::Fixture;
//!
//! let mut fixture = Fixture::new().await?;
//! assert_eq!(fixture.message.from_id, *fixture.mike().id());
//! fixture.mary().say(fixture.user().id(), "hi");
//! assert_eq!(fixture.mt_list().len(), 1);
//! fixture.shutdown().await;
//! ```

mod error;
mod fixture;
mod puppet;
mod runner;

pub use error::{PuppetError, Result};
pub use fixture::{next_message, Fixture};
pub use puppet::{PuppetMock, PuppetMockOptions, PuppetState, MOCK_QR_CODE};
pub use runner::{run, RunMode, SimConfig, SimulationReport};
