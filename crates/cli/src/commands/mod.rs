//! CLI command implementations.

pub mod migrate;
pub mod seed;
pub mod stock;

use sqlx::PgPool;
use thiserror::Error;

use tradepost_storefront::config::{ConfigError, database_url_from_env};
use tradepost_storefront::db::{self, RepositoryError};

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Database URL missing from the environment.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A repository operation failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The seed file could not be read.
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The seed file is not valid YAML for the expected shape.
    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The seed file parsed but holds unusable entries.
    #[error("{0} invalid product entries")]
    InvalidEntries(usize),

    /// No product with the given id.
    #[error("Product {0} not found")]
    ProductNotFound(i32),
}

/// Connect to the storefront database.
async fn connect() -> Result<PgPool, CommandError> {
    let database_url = database_url_from_env()?;
    tracing::info!("Connecting to storefront database...");
    Ok(db::create_pool(&database_url).await?)
}
