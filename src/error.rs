use thiserror::Error;

use crate::binder::SubmitError;
use crate::config::ConfigError;
use crate::curator::LocatorError;
use crate::store::StoreError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs or state.
    Permanent,
    /// Retry may help (transient contention or outage).
    Retryable,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Crate-level convenience error: a thin wrapper over the capability
/// errors, not a replacement for them.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Submit(SubmitError::QueueFull) => Transience::Retryable,
            Error::Submit(_) => Transience::Permanent,
            Error::Store(StoreError::Io(_)) => Transience::Retryable,
            Error::Store(_) => Transience::Permanent,
            Error::Locator(LocatorError::BinderClosed) => Transience::Retryable,
            Error::Locator(LocatorError::Store(StoreError::Io(_))) => Transience::Retryable,
            Error::Locator(_) => Transience::Permanent,
            Error::Config(_) => Transience::Permanent,
        }
    }
}
