//! `ScriptedOperation`: a test double for retried operations.
//!
//! Replays a programmer-specified sequence of results and counts how many
//! times it was invoked. Once the script is down to its last entry, that
//! entry repeats forever.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::{Classify, ErrorKind};

/// A classifiable error with a fixed kind and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MockError {
    pub kind: ErrorKind,
    pub message: String,
}

impl MockError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A transient failure whose message names the kind's code.
    pub fn transient(kind: ErrorKind) -> Self {
        Self::new(kind, format!("connect {}", kind.code()))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }
}

impl Classify for MockError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// An operation that returns scripted results in order.
pub struct ScriptedOperation<T> {
    script: Mutex<VecDeque<Result<T, MockError>>>,
    calls: Mutex<usize>,
}

impl<T: Clone> ScriptedOperation<T> {
    /// Replay `script` in order, repeating the final entry.
    ///
    /// An empty script behaves like a single fatal failure, repeated.
    pub fn new(script: impl IntoIterator<Item = Result<T, MockError>>) -> Self {
        let mut script: VecDeque<_> = script.into_iter().collect();
        if script.is_empty() {
            script.push_back(Err(MockError::fatal("empty script")));
        }
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(0),
        }
    }

    /// Always return `result`.
    pub fn always(result: Result<T, MockError>) -> Self {
        Self::new([result])
    }

    /// Fail `failures` times with `kind`, then succeed with `value`.
    pub fn failing_then(kind: ErrorKind, failures: usize, value: T) -> Self {
        let script = std::iter::repeat_with(|| Err(MockError::transient(kind)))
            .take(failures)
            .chain(std::iter::once(Ok(value)));
        Self::new(script)
    }

    /// Run the operation once.
    pub async fn call(&self) -> Result<T, MockError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        if script.len() > 1 {
            if let Some(next) = script.pop_front() {
                return next;
            }
        }
        script
            .front()
            .cloned()
            .unwrap_or_else(|| Err(MockError::fatal("empty script")))
    }

    /// Number of times this operation has been invoked.
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
