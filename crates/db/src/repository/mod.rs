//! Repository functions: one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! None of them retry. Callers that want retries wrap the call in a
//! `resilience::RetryExecutor` themselves.

pub mod recipes;
