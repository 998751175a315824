//! Error types for the puppet adapter.

use puppet_mock_core::MockerError;
use puppet_mock_env::EnvError;
use thiserror::Error;

/// Errors surfaced by [`PuppetMock`](crate::PuppetMock) and the fixture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PuppetError {
    #[error(transparent)]
    Mocker(#[from] MockerError),

    #[error(transparent)]
    Env(#[from] EnvError),

    /// Operation needs a logged-in user
    #[error("not logged in: logout or send before login?")]
    NotLoggedIn,

    /// The event channel closed or the receiver fell behind
    #[error("event channel: {0}")]
    EventChannel(String),

    /// An expected event did not arrive
    #[error("timed out waiting for {0} event")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, PuppetError>;
