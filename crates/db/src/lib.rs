//! `db` crate: resilient persistence layer.
//!
//! Provides a bounded connection pool with keep-alive and health checks,
//! idempotent schema initialisation driven by the `resilience` retry
//! executor, typed row structs, and repository functions for the `recipes`
//! table. No business logic lives here.

pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod schema;

pub use config::PoolConfig;
pub use error::DbError;
pub use pool::{DbPool, Param, PooledConnection};
pub use schema::{init_db, InitError, InitState, SchemaInitializer, RECIPES_SCHEMA};
