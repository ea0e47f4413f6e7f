//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use shopclub_core::{OrderNumberError, OrderNumberGenerator, ThreadRandom};

use crate::config::StorefrontConfig;
use crate::db::PgStore;
use crate::payments::{GatewayError, StripeClient, WebhookVerifier};
use crate::services::{CheckoutService, WebhookReconciler};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment gateway client: {0}")]
    Gateway(#[from] GatewayError),
    #[error("order number prefix: {0}")]
    OrderNumber(#[from] OrderNumberError),
}

/// Checkout flow as wired in production.
pub type Checkout = CheckoutService<PgStore, StripeClient>;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    checkout: Checkout,
    reconciler: WebhookReconciler<PgStore>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway client cannot be built or the order
    /// number prefix is invalid.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let stripe = &config.stripe;
        let gateway = StripeClient::new(stripe)?;
        let numbers =
            OrderNumberGenerator::new(&config.order_number_prefix, Arc::new(ThreadRandom))?;

        let checkout = CheckoutService::new(
            PgStore::new(pool.clone()),
            gateway,
            numbers,
            stripe.currency.clone(),
            stripe.timeout,
        );
        let reconciler = WebhookReconciler::new(
            PgStore::new(pool.clone()),
            WebhookVerifier::new(stripe.webhook_secret.clone(), stripe.webhook_tolerance),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                checkout,
                reconciler,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the checkout flow.
    #[must_use]
    pub fn checkout(&self) -> &Checkout {
        &self.inner.checkout
    }

    /// Get the webhook reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &WebhookReconciler<PgStore> {
        &self.inner.reconciler
    }
}
