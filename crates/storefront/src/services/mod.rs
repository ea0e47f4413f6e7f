//! Business logic services for storefront.
//!
//! # Services
//!
//! - [`checkout`] - Prices carts, creates payment intents and places orders
//! - [`reconciler`] - Applies gateway webhooks to the order ledger
//!
//! Both are generic over their storage and gateway ports so they can run
//! against in-memory fakes in tests and against `PgStore` / `StripeClient`
//! in the binary.

pub mod checkout;
pub mod reconciler;

pub use checkout::{CheckoutService, CheckoutStore, IntentCreated, confirm_intent};
pub use reconciler::{LedgerEntry, OrderLedger, ReconcileError, ReconcileOutcome, WebhookReconciler};
