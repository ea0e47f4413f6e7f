//! Command implementations and their shared plumbing.

pub mod migrate;
pub mod order;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use shopclub_core::{EmailError, OrderNumberError, PaymentStatus};
use shopclub_storefront::db::{self, RepositoryError};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Repository operation failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Malformed order number.
    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(#[from] OrderNumberError),

    /// Malformed email address.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// No order with this number.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// The order's payment status does not allow a refund.
    #[error("Order {order_number} is {status}; only paid orders can be refunded")]
    RefundNotAllowed {
        order_number: String,
        status: PaymentStatus,
    },

    /// The order changed status while the command ran.
    #[error("Order {0} changed status concurrently; retry")]
    ConcurrentUpdate(String),
}

/// Connect to the storefront database.
///
/// Reads `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    Ok(db::create_pool(&database_url).await?)
}
