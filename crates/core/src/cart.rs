//! Cart lines and the rules applied when a cart changes.
//!
//! A cart line references a product and a quantity; it never freezes a price.
//! Prices and stock are read live whenever a cart is displayed or checked out.

use serde::{Deserialize, Serialize};

use crate::{CartLineId, Money, ProductId};

/// A catalog product as seen by the cart and checkout.
///
/// The catalog owns products; checkout only reads them and decrements stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub price: Money,
    pub stock: u32,
    pub available: bool,
}

/// One product in a user's cart, joined with the live product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    /// Line total at the product's current price.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.product.price.times(self.quantity)
    }
}

/// Reasons a cart change is refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Quantities start at one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    /// The product is switched off in the catalog.
    #[error("{name} is not available")]
    Unavailable {
        /// Product name.
        name: String,
    },
    /// More was requested than is in stock.
    #[error("only {available} items available in stock")]
    InsufficientStock {
        /// Units currently in stock.
        available: u32,
    },
}

/// The write a cart change resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartChange {
    /// Create a new line with this quantity.
    Insert(u32),
    /// Set an existing line's quantity. `clamped` is set when the requested
    /// quantity was cut down to the available stock.
    Update {
        /// New quantity.
        quantity: u32,
        /// Whether the request exceeded stock.
        clamped: bool,
    },
    /// Delete the line.
    Remove,
}

/// Decide what adding `requested` units of `product` does to a cart that
/// already holds `existing` units of it.
///
/// The requested amount alone must fit in stock; when it is merged into an
/// existing line the combined quantity is clamped to stock instead.
///
/// # Errors
///
/// Returns a [`CartError`] when the quantity is zero, the product is
/// unavailable, or the requested amount exceeds stock.
pub fn plan_add(
    product: &Product,
    existing: Option<u32>,
    requested: u32,
) -> Result<CartChange, CartError> {
    if requested == 0 {
        return Err(CartError::InvalidQuantity);
    }
    if !product.available {
        return Err(CartError::Unavailable {
            name: product.name.clone(),
        });
    }
    if requested > product.stock {
        return Err(CartError::InsufficientStock {
            available: product.stock,
        });
    }

    Ok(match existing {
        None => CartChange::Insert(requested),
        Some(current) => {
            let wanted = current.saturating_add(requested);
            CartChange::Update {
                quantity: wanted.min(product.stock),
                clamped: wanted > product.stock,
            }
        }
    })
}

/// Decide what setting a line to `requested` units does, given current stock.
///
/// Zero (or zero stock after clamping) removes the line.
#[must_use]
pub fn plan_update(stock: u32, requested: u32) -> CartChange {
    let quantity = requested.min(stock);
    if quantity == 0 {
        CartChange::Remove
    } else {
        CartChange::Update {
            quantity,
            clamped: requested > stock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(stock: u32) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Widget".to_owned(),
            slug: "widget".to_owned(),
            price: Money::from_minor_units(999),
            stock,
            available: true,
        }
    }

    #[test]
    fn test_add_new_line() {
        assert_eq!(plan_add(&widget(5), None, 3), Ok(CartChange::Insert(3)));
    }

    #[test]
    fn test_add_rejects_zero_and_overstock() {
        assert_eq!(
            plan_add(&widget(5), None, 0),
            Err(CartError::InvalidQuantity)
        );
        assert_eq!(
            plan_add(&widget(2), None, 3),
            Err(CartError::InsufficientStock { available: 2 })
        );
    }

    #[test]
    fn test_add_rejects_unavailable() {
        let product = Product {
            available: false,
            ..widget(5)
        };
        assert!(matches!(
            plan_add(&product, None, 1),
            Err(CartError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_add_merges_and_clamps() {
        assert_eq!(
            plan_add(&widget(5), Some(2), 2),
            Ok(CartChange::Update {
                quantity: 4,
                clamped: false
            })
        );
        assert_eq!(
            plan_add(&widget(5), Some(4), 3),
            Ok(CartChange::Update {
                quantity: 5,
                clamped: true
            })
        );
    }

    #[test]
    fn test_update() {
        assert_eq!(
            plan_update(5, 2),
            CartChange::Update {
                quantity: 2,
                clamped: false
            }
        );
        assert_eq!(
            plan_update(5, 9),
            CartChange::Update {
                quantity: 5,
                clamped: true
            }
        );
        assert_eq!(plan_update(5, 0), CartChange::Remove);
        assert_eq!(plan_update(0, 3), CartChange::Remove);
    }

    #[test]
    fn test_line_total_uses_live_price() {
        let line = CartLine {
            id: CartLineId::new(1),
            product: widget(5),
            quantity: 3,
        };
        assert_eq!(line.line_total().to_string(), "29.97");
    }
}
