#![deny(warnings)]

//! Persistence layer: SQLite schema, catalog seeding, quote write path and
//! calculated-quote history.

mod rows;
mod store;

pub use store::{NewProductEntry, NewQuote, Store};

use cpq_core::{EntryId, ProductRole, QuoteId, QuoteStatus, ValidationError, VariationOptionId};
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Storage failures and write-path rejections.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt column {column}: {message}")]
    Decode {
        column: &'static str,
        message: String,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    /// Only draft quotes may change.
    #[error("quote {quote} is {status} and can no longer change")]
    Locked { quote: QuoteId, status: QuoteStatus },
    #[error("quote {quote} already has a {role} entry")]
    RoleTaken { quote: QuoteId, role: ProductRole },
    #[error("option {option} does not belong to the product of entry {entry}")]
    ForeignOption {
        entry: EntryId,
        option: VariationOptionId,
    },
    #[error("product quantity must be >= 0, got {0}")]
    NegativeQuantity(Decimal),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PersistenceError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        PersistenceError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Returns the default SQLite URL used for local quote storage.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./data/cpq.db"
}

/// Open (creating if missing) the database at `url` and run migrations.
pub async fn init_db(url: &str) -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    MIGRATOR.run(&pool).await?;
    info!(url, "database ready");
    Ok(pool)
}

/// Private in-memory database; one connection so every query sees the same data.
pub async fn init_memory_db() -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}
