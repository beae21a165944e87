//! Error taxonomy for the load coordinator.
//!
//! Fetch errors split into transient (retried internally, never surface) and
//! permanent. What callers see is [`LoadError`]: a permanent fetch failure of
//! a mandatory part, or an assembly failure. A permanent image failure is
//! absorbed by the coordinator and never becomes a `LoadError`.

use thiserror::Error;

use crate::parts::{PartKind, PartRef};

/// Outcome classification for a single fetch attempt.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Retryable failure such as a network hiccup, a 5xx response or a
    /// timed-out attempt.
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// Non-retryable failure such as a malformed locator or a 4xx response.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The fetched bytes could not be combined into an artifact.
#[derive(Debug, Clone, Error)]
#[error("assembly failed: {0}")]
pub struct AssemblyError(pub String);

/// Composite failure delivered to `on_failure` callbacks.
///
/// Exactly one of `on_success`/`on_failure` fires per registered caller,
/// exactly once. Shutting the coordinator down invokes neither; only the
/// async [`Loader::load`](crate::Loader::load) wrapper observes that case,
/// as [`LoadError::Shutdown`].
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// A mandatory part (geometry or material) could not be fetched.
    #[error("{kind} part {locator} could not be fetched: {message}")]
    Fetch {
        kind: PartKind,
        locator: PartRef,
        message: String,
    },
    /// All parts arrived but the assembler rejected them.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    /// The coordinator was shut down before the request completed.
    #[error("coordinator shut down before the request completed")]
    Shutdown,
}
