//! Checkout error taxonomy.
//!
//! Every way an order-creation attempt can fail. None of these leave partial
//! effects behind: the storefront rolls back the whole unit before reporting
//! one of them.

use crate::{Money, ProductId};

/// Why a checkout attempt was refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// There is nothing to check out.
    #[error("your cart is empty")]
    EmptyCart,

    /// A line asks for more than the product has in stock.
    #[error("{product_name} has only {available} items in stock")]
    StockConflict {
        /// Offending product.
        product_id: ProductId,
        /// Its display name.
        product_name: String,
        /// Units in stock when checked.
        available: u32,
        /// Units the cart asked for.
        requested: u32,
    },

    /// Live prices moved between pricing the cart and committing the order,
    /// so the confirmed payment no longer matches.
    #[error("cart total changed from {expected} to {actual}")]
    CartChanged {
        /// Total the payment was created for.
        expected: Money,
        /// Total at commit time.
        actual: Money,
    },

    /// The payment gateway could not create or confirm the payment.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// A uniqueness rule would be broken, e.g. a payment intent that is
    /// already attached to another order.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// The store behind the ledger failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CheckoutError {
    /// The message shown to the customer.
    ///
    /// Internal failures collapse into one generic sentence.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCart => "Your cart is empty.".to_owned(),
            Self::StockConflict { .. } => self.to_string(),
            Self::CartChanged { .. } => {
                "Prices in your cart changed. Please review your cart and try again.".to_owned()
            }
            Self::Gateway(_) => "Payment failed. Please try again.".to_owned(),
            Self::IntegrityViolation(_) | Self::Storage(_) => {
                "We could not place your order. Please try again.".to_owned()
            }
        }
    }
}
