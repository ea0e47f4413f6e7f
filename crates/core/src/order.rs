//! Orders and their line items.
//!
//! An [`Order`] snapshots everything it needs at checkout: the contact and
//! postal details, the total, and the unit price of every item. Later edits
//! to the catalog or the address book never reach an existing order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Money, OrderId, OrderItemId, OrderNumber, PaymentStatus, PricedCart, ProductId,
    ShippingDetails, UserId,
};

/// A line on a placed order, with its price frozen at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
}

impl OrderItem {
    /// `price * quantity`.
    #[must_use]
    pub fn total_price(&self) -> Money {
        self.price.times(self.quantity)
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: OrderNumber,
    pub details: ShippingDetails,
    pub total_amount: Money,
    pub payment_status: PaymentStatus,
    pub stripe_payment_intent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Internal-only; never rendered to the customer.
    pub admin_notes: String,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Sum of the frozen item totals.
    #[must_use]
    pub fn items_total(&self) -> Money {
        self.items.iter().map(OrderItem::total_price).sum()
    }

    /// Number of units across all items.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Everything the ledger needs to persist a new order.
///
/// Built by checkout once validation and payment verification have passed.
/// The ledger re-checks stock, freezes live prices and assigns the order
/// number inside its own transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub details: ShippingDetails,
    /// The cart as priced before the gateway was consulted. The ledger
    /// refuses to commit if live prices no longer add up to `cart.total`.
    pub cart: PricedCart,
    pub stripe_payment_intent: String,
    /// `Paid` for a confirmed intent, `Pending` while still processing.
    pub payment_status: PaymentStatus,
}

/// One row of a customer's order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub total_amount: Money,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub item_count: u32,
}
