//! Write-once binding slot.

use crate::error::{MockerError, Result};

/// A value that can be assigned exactly once.
///
/// Used for the mocker → puppet link: the adapter binds itself once,
/// reading before that or binding again is a programming error.
#[derive(Debug, Clone, Default)]
pub enum Binding<T> {
    #[default]
    Unbound,
    Bound(T),
}

impl<T> Binding<T> {
    /// Assigns the value. Fails with `AlreadyBound` if already assigned.
    pub fn bind(&mut self, value: T) -> Result<()> {
        match self {
            Binding::Bound(_) => Err(MockerError::AlreadyBound),
            Binding::Unbound => {
                *self = Binding::Bound(value);
                Ok(())
            }
        }
    }

    /// Reads the value. Fails with `NotBound` if never assigned.
    pub fn get(&self) -> Result<&T> {
        match self {
            Binding::Bound(value) => Ok(value),
            Binding::Unbound => Err(MockerError::NotBound),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Binding::Bound(_))
    }
}
