//! Command implementations.

pub mod migrate;
pub mod order;
pub mod rates;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use souq_storefront::pricing::RateTableError;
use souq_storefront::services::TrackingError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The rate table could not be loaded.
    #[error(transparent)]
    Rates(#[from] RateTableError),

    /// The order could not be found or updated.
    #[error(transparent)]
    Order(#[from] TrackingError),
}

/// Connect to the storefront database.
///
/// Reads `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| CommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    Ok(souq_storefront::db::create_pool(&SecretString::from(database_url)).await?)
}
