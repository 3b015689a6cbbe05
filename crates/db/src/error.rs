//! Typed error type for the db crate, and its mapping onto
//! [`resilience::ErrorKind`].
//!
//! This is the only place that looks at driver-specific error details.

use std::io;

use resilience::{Classify, ErrorKind};
use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("a recipe with source url '{0}' already exists")]
    DuplicateSourceUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl Classify for DbError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Sqlx(err) => sqlx_error_kind(err),
            _ => ErrorKind::Other,
        }
    }
}

/// Classify a driver error.
pub fn sqlx_error_kind(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::Io(io) => io_error_kind(io),
        sqlx::Error::PoolTimedOut => ErrorKind::TimedOut,
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| server_error_kind(e.number()))
            .unwrap_or(ErrorKind::Other),
        _ => ErrorKind::Other,
    }
}

/// Classify a socket-level failure.
pub fn io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
        io::ErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
        io::ErrorKind::TimedOut => ErrorKind::TimedOut,
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected => ErrorKind::ConnectionLost,
        _ if is_lookup_failure(err) => ErrorKind::HostNotFound,
        _ => ErrorKind::Other,
    }
}

// getaddrinfo failures carry no dedicated io::ErrorKind.
fn is_lookup_failure(err: &io::Error) -> bool {
    let message = err.to_string();
    [
        "failed to lookup address",
        "Name or service not known",
        "nodename nor servname",
        "No such host is known",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

/// Classify a MySQL/MariaDB server error number.
pub fn server_error_kind(number: u16) -> ErrorKind {
    match number {
        1040 => ErrorKind::TooManyConnections, // ER_CON_COUNT_ERROR
        1129 => ErrorKind::HostBlocked,        // ER_HOST_IS_BLOCKED
        2006 | 2013 => ErrorKind::ConnectionLost,
        _ => ErrorKind::Other,
    }
}

/// `true` for a unique-key violation (MySQL 1062).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience::is_retryable;

    fn io(kind: io::ErrorKind) -> DbError {
        DbError::Sqlx(sqlx::Error::Io(io::Error::from(kind)))
    }

    #[test]
    fn socket_failures_are_transient() {
        assert_eq!(io(io::ErrorKind::ConnectionRefused).kind(), ErrorKind::ConnectionRefused);
        assert_eq!(io(io::ErrorKind::ConnectionReset).kind(), ErrorKind::ConnectionReset);
        assert_eq!(io(io::ErrorKind::TimedOut).kind(), ErrorKind::TimedOut);
        assert_eq!(io(io::ErrorKind::UnexpectedEof).kind(), ErrorKind::ConnectionLost);
        assert_eq!(io(io::ErrorKind::BrokenPipe).kind(), ErrorKind::ConnectionLost);
        assert!(is_retryable(&io(io::ErrorKind::ConnectionRefused)));
    }

    #[test]
    fn dns_failure_is_host_not_found() {
        let err = io::Error::new(
            io::ErrorKind::Other,
            "failed to lookup address information: Name or service not known",
        );
        assert_eq!(io_error_kind(&err), ErrorKind::HostNotFound);
    }

    #[test]
    fn unrelated_io_error_is_fatal() {
        assert!(!is_retryable(&io(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn pool_timeout_is_transient() {
        let err = DbError::Sqlx(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(is_retryable(&err));
    }

    #[test]
    fn server_error_numbers_map_to_kinds() {
        assert_eq!(server_error_kind(1040), ErrorKind::TooManyConnections);
        assert_eq!(server_error_kind(1129), ErrorKind::HostBlocked);
        assert_eq!(server_error_kind(2013), ErrorKind::ConnectionLost);
        assert_eq!(server_error_kind(1062), ErrorKind::Other);
        assert_eq!(server_error_kind(1064), ErrorKind::Other);
        assert_eq!(server_error_kind(1045), ErrorKind::Other);
    }

    #[test]
    fn protocol_message_mentioning_a_blocked_host_is_retryable() {
        let err = DbError::Sqlx(sqlx::Error::Protocol(
            "Host '172.18.0.4' is blocked because of many connection errors".into(),
        ));
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(is_retryable(&err));
    }

    #[test]
    fn domain_errors_are_never_retried() {
        assert!(!is_retryable(&DbError::NotFound));
        assert!(!is_retryable(&DbError::DuplicateSourceUrl("https://x".into())));
        assert!(!is_retryable(&DbError::InvalidConfig("bad".into())));
        assert!(!is_retryable(&DbError::Sqlx(sqlx::Error::RowNotFound)));
    }
}
