//! Transient-vs-fatal failure classification.
//!
//! Drivers map their own error codes onto the closed [`ErrorKind`] set once,
//! at their boundary. Everything downstream only ever asks
//! [`is_retryable`].

use std::fmt;

/// Substring some servers use to report a blocked host without a code.
pub const BLOCKED_MARKER: &str = "is blocked";

/// Coarse category of a failure, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionRefused,
    HostNotFound,
    TimedOut,
    ConnectionReset,
    /// The server went away mid-conversation.
    ConnectionLost,
    /// The server refused a new session because of its connection limit.
    TooManyConnections,
    HostBlocked,
    /// Constraint violations, syntax errors, auth failures, missing rows...
    Other,
}

impl ErrorKind {
    /// Every kind that is expected to resolve on its own.
    pub const TRANSIENT: [ErrorKind; 7] = [
        ErrorKind::ConnectionRefused,
        ErrorKind::HostNotFound,
        ErrorKind::TimedOut,
        ErrorKind::ConnectionReset,
        ErrorKind::ConnectionLost,
        ErrorKind::TooManyConnections,
        ErrorKind::HostBlocked,
    ];

    /// Map a driver/system string code (`ECONNREFUSED`, `ER_CON_COUNT_ERROR`,
    /// ...) onto a kind. Unknown codes are [`ErrorKind::Other`].
    pub fn from_code(code: &str) -> Self {
        match code {
            "ECONNREFUSED" => Self::ConnectionRefused,
            "ENOTFOUND" => Self::HostNotFound,
            "ETIMEDOUT" => Self::TimedOut,
            "ECONNRESET" => Self::ConnectionReset,
            "PROTOCOL_CONNECTION_LOST" => Self::ConnectionLost,
            "ER_CON_COUNT_ERROR" => Self::TooManyConnections,
            "ER_HOST_IS_BLOCKED" => Self::HostBlocked,
            _ => Self::Other,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::HostNotFound => "ENOTFOUND",
            Self::TimedOut => "ETIMEDOUT",
            Self::ConnectionReset => "ECONNRESET",
            Self::ConnectionLost => "PROTOCOL_CONNECTION_LOST",
            Self::TooManyConnections => "ER_CON_COUNT_ERROR",
            Self::HostBlocked => "ER_HOST_IS_BLOCKED",
            Self::Other => "OTHER",
        }
    }

    pub fn is_transient(self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Implemented by error types that can report an [`ErrorKind`].
///
/// The `Display` output doubles as the human-readable message inspected for
/// [`BLOCKED_MARKER`].
pub trait Classify: fmt::Display {
    fn kind(&self) -> ErrorKind;
}

/// `true` iff `err` is one of the transient kinds, or its message says the
/// host is blocked.
pub fn is_retryable<E: Classify + ?Sized>(err: &E) -> bool {
    err.kind().is_transient() || err.to_string().contains(BLOCKED_MARKER)
}

/// Retry predicate consulted by the executor.
pub trait Classifier<E: ?Sized>: Send + Sync {
    fn is_retryable(&self, err: &E) -> bool;
}

/// The default classifier: defers to [`is_retryable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientClassifier;

impl<E: Classify + ?Sized> Classifier<E> for TransientClassifier {
    fn is_retryable(&self, err: &E) -> bool {
        is_retryable(err)
    }
}

/// Adapts a plain predicate into a [`Classifier`].
#[derive(Debug, Clone, Copy)]
pub struct FnClassifier<F>(pub F);

impl<E: ?Sized, F> Classifier<E> for FnClassifier<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_retryable(&self, err: &E) -> bool {
        (self.0)(err)
    }
}
