//! Failure outcomes of a retried operation.

use thiserror::Error;

/// Why a retried operation did not succeed.
///
/// Together with `Ok(T)` this gives the three distinguishable outcomes of
/// a retry run.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The classifier rejected the error; it was returned on the spot.
    #[error("{0}")]
    NonRetryable(E),

    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The underlying error, unmodified.
    pub fn into_inner(self) -> E {
        match self {
            Self::NonRetryable(err) | Self::Exhausted { last: err, .. } => err,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            Self::NonRetryable(err) | Self::Exhausted { last: err, .. } => err,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// How many times the operation ran before giving up.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } => Some(*attempts),
            Self::NonRetryable(_) => None,
        }
    }
}
