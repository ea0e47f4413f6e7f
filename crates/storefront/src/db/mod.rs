//! Database operations for storefront `PostgreSQL`.
//!
//! # Schema: `storefront`
//!
//! ## Tables
//!
//! - `user` - Identity provider accounts known to the store
//! - `product` - Catalog (read here, stock decremented at checkout)
//! - `cart_line` - Per-user cart, unique per `(user_id, product_id)`
//! - `order` / `order_item` - The order ledger
//! - `shipping_address` - Address book, at most one default per user
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p shopclub-cli -- migrate
//! ```
//!
//! Queries are runtime-checked (`sqlx::query_as` into `FromRow` row structs)
//! so the crate builds without a live database.

pub mod addresses;
pub mod cart;
pub mod orders;
pub mod products;
pub mod users;

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use shopclub_core::{
    CartLine, CheckoutError, NewOrder, Order, OrderId, OrderNumberGenerator, PaymentStatus,
    UserId,
};

pub use addresses::AddressRepository;
pub use cart::CartRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use users::UserRepository;

use crate::services::checkout::CheckoutStore;
use crate::services::reconciler::{LedgerEntry, OrderLedger};

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate payment intent).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to [`RepositoryError::Conflict`].
    pub(crate) fn from_unique(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

impl From<RepositoryError> for CheckoutError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => Self::IntegrityViolation(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Convert a stored `INTEGER` count into `u32`.
pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

/// Convert a quantity into a bindable `INTEGER`.
pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("{column} out of range: {value}")))
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Postgres-backed implementation of the checkout and ledger ports.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CheckoutStore for PgStore {
    async fn load_cart(&self, user_id: UserId) -> Result<Vec<CartLine>, CheckoutError> {
        Ok(CartRepository::new(&self.pool).list(user_id).await?)
    }

    async fn commit_order(
        &self,
        order: NewOrder,
        numbers: &OrderNumberGenerator,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        OrderRepository::new(&self.pool)
            .commit(order, numbers, now)
            .await
    }
}

impl OrderLedger for PgStore {
    async fn find_by_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<LedgerEntry>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .find_by_payment_intent(intent_id)
            .await
    }

    async fn transition(
        &self,
        order_id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        OrderRepository::new(&self.pool)
            .transition(order_id, from, to, paid_at)
            .await
    }
}
