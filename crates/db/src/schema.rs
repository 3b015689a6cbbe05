//! Idempotent schema bootstrap.
//!
//! The recipes schema is a fixed, ordered list of statements, each safe to
//! run against a schema at or beyond its target state. Initialisation runs
//! the whole list inside one retry run: a transient failure anywhere
//! restarts from the first statement, and a fatal one aborts startup.
//!
//! Targets MariaDB (`ADD COLUMN IF NOT EXISTS` is a MariaDB extension).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use resilience::{
    Backoff, Classifier, ExponentialBackoff, RetryError, RetryExecutor, TransientClassifier,
};
use tracing::{debug, error, info, instrument};

use crate::{DbError, DbPool};

/// Label used in retry log lines.
pub const INIT_LABEL: &str = "Database initialization";

/// One schema statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// An ordered sequence of idempotent statements.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDefinition {
    migrations: &'static [Migration],
}

impl SchemaDefinition {
    pub const fn new(migrations: &'static [Migration]) -> Self {
        Self { migrations }
    }

    pub fn migrations(&self) -> &'static [Migration] {
        self.migrations
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// The `recipes` table, plus the statements that heal tables created by
/// older versions (missing soft-delete column, list columns of the wrong
/// width).
pub const RECIPES_SCHEMA: SchemaDefinition = SchemaDefinition::new(&[
    Migration {
        name: "create_recipes",
        sql: "CREATE TABLE IF NOT EXISTS recipes (
            id INT AUTO_INCREMENT PRIMARY KEY,
            title VARCHAR(255) NOT NULL,
            source_url VARCHAR(2048) NOT NULL UNIQUE,
            description TEXT,
            image_url VARCHAR(2048),
            servings VARCHAR(64),
            prep_time VARCHAR(64),
            cook_time VARCHAR(64),
            total_time VARCHAR(64),
            ingredients LONGTEXT,
            instructions LONGTEXT,
            archived_at TIMESTAMP NULL DEFAULT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    Migration {
        name: "add_archived_at",
        sql: "ALTER TABLE recipes ADD COLUMN IF NOT EXISTS archived_at TIMESTAMP NULL DEFAULT NULL",
    },
    Migration {
        name: "add_ingredients",
        sql: "ALTER TABLE recipes ADD COLUMN IF NOT EXISTS ingredients LONGTEXT",
    },
    Migration {
        name: "add_instructions",
        sql: "ALTER TABLE recipes ADD COLUMN IF NOT EXISTS instructions LONGTEXT",
    },
    Migration {
        name: "widen_ingredients",
        sql: "ALTER TABLE recipes MODIFY COLUMN ingredients LONGTEXT",
    },
    Migration {
        name: "widen_instructions",
        sql: "ALTER TABLE recipes MODIFY COLUMN instructions LONGTEXT",
    },
]);

/// Something that can run a single DDL statement.
#[async_trait]
pub trait SchemaExecutor: Send + Sync {
    async fn execute_statement(&self, sql: &str) -> Result<(), DbError>;
}

#[async_trait]
impl SchemaExecutor for DbPool {
    async fn execute_statement(&self, sql: &str) -> Result<(), DbError> {
        self.execute(sql).await.map(|_| ())
    }
}

/// Where a single startup's initialisation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    NotStarted,
    /// Running the statement list for the n-th time (1-based).
    Attempting(u32),
    /// Attempt n failed transiently; sleeping before attempt n + 1.
    Retrying(u32),
    Succeeded,
    /// Non-retryable error, or attempts exhausted.
    FatalFailure,
}

pub type InitError = RetryError<DbError>;

/// Applies a [`SchemaDefinition`] under a [`RetryExecutor`].
pub struct SchemaInitializer<'a, B = ExponentialBackoff, C = TransientClassifier> {
    definition: &'a SchemaDefinition,
    retry: &'a RetryExecutor<B, C>,
}

impl<'a, B, C> SchemaInitializer<'a, B, C>
where
    B: Backoff,
    C: Classifier<DbError>,
{
    pub fn new(definition: &'a SchemaDefinition, retry: &'a RetryExecutor<B, C>) -> Self {
        Self { definition, retry }
    }

    pub async fn run<X>(&self, executor: &X) -> Result<(), InitError>
    where
        X: SchemaExecutor + ?Sized,
    {
        self.run_observed(executor, |_| {}).await
    }

    /// Like [`run`](Self::run), reporting every state transition to
    /// `on_transition`.
    #[instrument(skip_all, fields(statements = self.definition.len()))]
    pub async fn run_observed<X, O>(&self, executor: &X, on_transition: O) -> Result<(), InitError>
    where
        X: SchemaExecutor + ?Sized,
        O: FnMut(InitState) + Send,
    {
        let observer = Mutex::new(on_transition);
        let notify = |state: InitState| {
            debug!(?state, "Schema initialization state");
            let mut observer = observer.lock().unwrap_or_else(PoisonError::into_inner);
            (*observer)(state);
        };
        let notify = &notify;
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        notify(InitState::NotStarted);
        let result = self
            .retry
            .run_observed(
                INIT_LABEL,
                move || async move {
                    let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    notify(InitState::Attempting(attempt));
                    self.apply_all(executor).await
                },
                |retry| notify(InitState::Retrying(retry.attempt + 1)),
            )
            .await;

        match &result {
            Ok(()) => {
                notify(InitState::Succeeded);
                info!(
                    attempts = attempts.load(Ordering::Relaxed),
                    "Database schema is up to date"
                );
            }
            Err(err) => {
                notify(InitState::FatalFailure);
                error!(error = %err, "Database initialization failed");
            }
        }
        result
    }

    async fn apply_all<X>(&self, executor: &X) -> Result<(), DbError>
    where
        X: SchemaExecutor + ?Sized,
    {
        for migration in self.definition.migrations() {
            debug!(migration = migration.name, "Applying schema statement");
            executor.execute_statement(migration.sql).await?;
        }
        Ok(())
    }
}

/// Bring the recipes schema up to date. Call once at startup, before
/// serving traffic.
pub async fn init_db(pool: &DbPool, retry: &RetryExecutor) -> Result<(), InitError> {
    SchemaInitializer::new(&RECIPES_SCHEMA, retry).run(pool).await
}
