//! `recipe-db` CLI entry-point.
//!
//! Available sub-commands:
//! - `init`: bring the schema up to date, retrying while the database boots.
//! - `health`: liveness probe; exits non-zero when the database is unreachable.
//! - `schema`: print the schema statements without connecting.
//! - `recipes`: list, archive and restore recipes.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use db::repository::recipes::{self, ListFilter};
use db::{init_db, DbPool, PoolConfig, RECIPES_SCHEMA};
use resilience::{RetryConfig, RetryExecutor};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "recipe-db",
    about = "Resilient data-access layer for the recipe box",
    version
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DbArgs {
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    host: String,
    #[arg(long, env = "DB_PORT", default_value_t = 3306)]
    port: u16,
    #[arg(long, env = "DB_USER", default_value = "recipes")]
    user: String,
    #[arg(long, env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,
    #[arg(long = "database", env = "DB_NAME", default_value = "recipes")]
    name: String,
    #[arg(long, default_value_t = 10)]
    max_connections: u32,
    /// Per-connection connect timeout, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    connect_timeout_ms: u64,
}

impl DbArgs {
    fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(&self.host, &self.user, &self.password, &self.name)
            .with_port(self.port)
            .with_max_connections(self.max_connections)
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the recipes schema.
    Init {
        #[command(flatten)]
        db: DbArgs,
        /// Total attempts before giving up.
        #[arg(long, default_value_t = 10)]
        max_attempts: u32,
    },
    /// Check that the database answers a ping.
    Health {
        #[command(flatten)]
        db: DbArgs,
    },
    /// Print the schema statements in execution order.
    Schema,
    /// Work with stored recipes.
    Recipes {
        #[command(flatten)]
        db: DbArgs,
        #[command(subcommand)]
        action: RecipeAction,
    },
}

#[derive(Subcommand)]
enum RecipeAction {
    /// Print recipes as JSON, newest first.
    List {
        /// List archived recipes instead of active ones.
        #[arg(long)]
        archived: bool,
        /// Only recipes whose title contains this text.
        #[arg(long, short)]
        query: Option<String>,
    },
    /// Soft-delete a recipe.
    Archive { id: i64 },
    /// Bring an archived recipe back.
    Restore { id: i64 },
}

fn init_tracing(debug: bool) -> Result<()> {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.debug)?;

    match cli.command {
        Command::Init { db, max_attempts } => {
            let pool = DbPool::connect(db.pool_config()).await?;
            let retry = RetryExecutor::new(&RetryConfig {
                max_attempts,
                ..RetryConfig::default()
            });
            let result = init_db(&pool, &retry).await;
            pool.shutdown().await;
            result.context("database initialization failed")?;
            info!("Schema initialised");
            Ok(ExitCode::SUCCESS)
        }
        Command::Health { db } => {
            let pool = DbPool::connect(db.pool_config()).await?;
            let healthy = pool.is_healthy().await;
            pool.shutdown().await;
            println!("{}", if healthy { "healthy" } else { "unhealthy" });
            Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Schema => {
            for migration in RECIPES_SCHEMA.migrations() {
                println!("-- {}\n{};\n", migration.name, migration.sql);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Recipes { db, action } => {
            let pool = DbPool::connect(db.pool_config()).await?;
            let result = run_recipe_action(&pool, action).await;
            pool.shutdown().await;
            result?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_recipe_action(pool: &DbPool, action: RecipeAction) -> Result<()> {
    let output = match action {
        RecipeAction::List { archived, query } => {
            let found = recipes::list_recipes(pool, &ListFilter { archived, query }).await?;
            serde_json::to_string_pretty(&found)?
        }
        RecipeAction::Archive { id } => {
            let recipe = recipes::archive_recipe(pool, id)
                .await
                .with_context(|| format!("cannot archive recipe {id}"))?;
            serde_json::to_string_pretty(&recipe)?
        }
        RecipeAction::Restore { id } => {
            let recipe = recipes::restore_recipe(pool, id)
                .await
                .with_context(|| format!("cannot restore recipe {id}"))?;
            serde_json::to_string_pretty(&recipe)?
        }
    };
    println!("{output}");
    Ok(())
}
