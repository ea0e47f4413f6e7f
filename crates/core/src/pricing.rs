//! Authoritative pricing and stock validation for a checkout attempt.
//!
//! Totals are always recomputed here from live product rows; nothing the
//! client submits is trusted. The same check runs when the checkout page is
//! rendered, when a payment intent is created, and again inside the
//! order-commit transaction.

use serde::Serialize;

use crate::{CartLine, CheckoutError, Money, ProductId};

/// One validated cart line with its price fixed for this attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

/// A cart that passed validation, with its totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    /// No tax or discounts apply, so this always equals `subtotal`.
    pub total: Money,
}

impl PricedCart {
    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// Validate a cart against live stock and compute its totals.
///
/// # Errors
///
/// - [`CheckoutError::EmptyCart`] if there are no lines.
/// - [`CheckoutError::StockConflict`] for the first line whose quantity
///   exceeds the product's stock.
pub fn price_cart(lines: &[CartLine]) -> Result<PricedCart, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity > line.product.stock {
            return Err(CheckoutError::StockConflict {
                product_id: line.product.id,
                product_name: line.product.name.clone(),
                available: line.product.stock,
                requested: line.quantity,
            });
        }

        priced.push(PricedLine {
            product_id: line.product.id,
            product_name: line.product.name.clone(),
            unit_price: line.product.price,
            quantity: line.quantity,
            line_total: line.line_total(),
        });
    }

    let subtotal: Money = priced.iter().map(|l| l.line_total).sum();

    Ok(PricedCart {
        lines: priced,
        subtotal,
        total: subtotal,
    })
}
