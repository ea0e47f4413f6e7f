//! Order ledger persistence.
//!
//! [`OrderRepository::commit`] is the order-creation unit: stock re-check,
//! order number, order row, frozen items, stock decrement and cart clearing
//! all happen in one transaction, or not at all.
//!
//! Payment status only moves through [`OrderRepository::transition`], a
//! conditional update that succeeds only from the expected source status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use shopclub_core::{
    CheckoutError, Email, Money, NewOrder, Order, OrderId, OrderItem, OrderItemId, OrderNumber,
    OrderNumberGenerator, OrderSummary, PaymentStatus, PostalAddress, ProductId, ShippingDetails,
    UserId, price_cart,
};

use super::cart::{clear_lines, fetch_lines};
use super::{RepositoryError, to_i32, to_u32};
use crate::services::reconciler::LedgerEntry;

/// Attempts at drawing an unused order number before giving up.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    order_number: String,
    full_name: String,
    email: String,
    phone: String,
    address_line_1: String,
    address_line_2: String,
    city: String,
    state: String,
    postal_code: String,
    country: String,
    total_amount: Decimal,
    payment_status: PaymentStatus,
    stripe_payment_intent: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    customer_notes: String,
    admin_notes: String,
}

const ORDER_COLUMNS: &str = r"
    id, user_id, order_number, full_name, email, phone,
    address_line_1, address_line_2, city, state, postal_code, country,
    total_amount, payment_status, stripe_payment_intent,
    created_at, updated_at, paid_at, customer_notes, admin_notes
";

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let order_number = parse_number(&self.order_number)?;
        let email = Email::parse(&self.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email on order {}: {e}", self.id))
        })?;

        Ok(Order {
            id: OrderId::new(self.id),
            user_id: UserId::new(self.user_id),
            order_number,
            details: ShippingDetails {
                address: PostalAddress {
                    full_name: self.full_name,
                    phone: self.phone,
                    address_line_1: self.address_line_1,
                    address_line_2: self.address_line_2,
                    city: self.city,
                    state: self.state,
                    postal_code: self.postal_code,
                    country: self.country,
                },
                email,
                customer_notes: self.customer_notes,
            },
            total_amount: Money::new(self.total_amount),
            payment_status: self.payment_status,
            stripe_payment_intent: self.stripe_payment_intent,
            created_at: self.created_at,
            updated_at: self.updated_at,
            paid_at: self.paid_at,
            admin_notes: self.admin_notes,
            items,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    product_id: i32,
    product_name: String,
    quantity: i32,
    price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderItemId::new(row.id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            quantity: to_u32(row.quantity, "quantity")?,
            price: Money::new(row.price),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderSummaryRow {
    id: i32,
    order_number: String,
    total_amount: Decimal,
    payment_status: PaymentStatus,
    created_at: DateTime<Utc>,
    item_count: i64,
}

impl TryFrom<OrderSummaryRow> for OrderSummary {
    type Error = RepositoryError;

    fn try_from(row: OrderSummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.id),
            order_number: parse_number(&row.order_number)?,
            total_amount: Money::new(row.total_amount),
            payment_status: row.payment_status,
            created_at: row.created_at,
            item_count: u32::try_from(row.item_count).map_err(|_| {
                RepositoryError::DataCorruption(format!("item count out of range: {}", row.item_count))
            })?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: i32,
    order_number: String,
    payment_status: PaymentStatus,
}

fn parse_number(raw: &str) -> Result<OrderNumber, RepositoryError> {
    OrderNumber::parse(raw)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid order number: {e}")))
}

/// One page of a customer's order history.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<OrderSummary>,
    /// Total orders across all pages.
    pub total: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the order ledger.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist an order for the user's current cart.
    ///
    /// Inside one transaction: lock the cart and product rows, re-validate
    /// stock, check the live total still matches the paid total, insert the
    /// order under a fresh order number, freeze each line as an item while
    /// decrementing stock conditionally, then empty the cart.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::EmptyCart`] / [`CheckoutError::StockConflict`] from
    ///   the locked re-validation or the conditional decrement.
    /// - [`CheckoutError::CartChanged`] if live prices moved.
    /// - [`CheckoutError::IntegrityViolation`] if the payment intent already
    ///   belongs to an order, or no unused order number could be drawn.
    /// - [`CheckoutError::Storage`] for database failures.
    #[tracing::instrument(skip(self, order, numbers), fields(user_id = %order.user_id))]
    pub async fn commit(
        &self,
        order: NewOrder,
        numbers: &OrderNumberGenerator,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let lines = fetch_lines(&mut *tx, order.user_id, true).await?;
        let priced = price_cart(&lines)?;
        if priced.total != order.cart.total {
            return Err(CheckoutError::CartChanged {
                expected: order.cart.total,
                actual: priced.total,
            });
        }

        let paid_at = (order.payment_status == PaymentStatus::Paid).then_some(now);
        let row = insert_order(&mut tx, &order, priced.total, paid_at, now, numbers).await?;

        let mut items = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            let quantity = to_i32(line.quantity, "quantity")?;

            let decremented = sqlx::query(
                r"
                UPDATE storefront.product
                   SET stock = stock - $1, updated_at = NOW()
                 WHERE id = $2 AND stock >= $1
                ",
            )
            .bind(quantity)
            .bind(line.product_id)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

            if decremented.rows_affected() != 1 {
                let available: i32 =
                    sqlx::query_scalar("SELECT stock FROM storefront.product WHERE id = $1")
                        .bind(line.product_id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(RepositoryError::from)?;
                return Err(CheckoutError::StockConflict {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    available: to_u32(available, "stock")?,
                    requested: line.quantity,
                });
            }

            let item = sqlx::query_as::<_, OrderItemRow>(
                r"
                INSERT INTO storefront.order_item (order_id, product_id, product_name, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, product_id, product_name, quantity, price
                ",
            )
            .bind(row.id)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(quantity)
            .bind(line.unit_price)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

            items.push(OrderItem::try_from(item)?);
        }

        clear_lines(&mut *tx, order.user_id).await?;

        let placed = row.into_order(items)?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(
            order_number = %placed.order_number,
            total = %placed.total_amount,
            status = %placed.payment_status,
            "Order committed"
        );
        Ok(placed)
    }

    /// Get an order by number, only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_for_user(
        &self,
        user_id: UserId,
        number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.order WHERE order_number = $1 AND user_id = $2"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(number.as_str())
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;

        self.with_items(row).await
    }

    /// Get an order by number regardless of owner (operator tooling).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM storefront.order WHERE order_number = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(number.as_str())
            .fetch_optional(self.pool)
            .await?;

        self.with_items(row).await
    }

    async fn with_items(&self, row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, product_id, product_name, quantity, price
            FROM storefront.order_item
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(row.id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(OrderItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        row.into_order(items).map(Some)
    }

    /// A page of the user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: u32,
        per_page: u32,
    ) -> Result<OrderPage, RepositoryError> {
        let limit = i64::from(per_page);
        let offset = i64::from(page.saturating_sub(1)) * limit;

        let orders = sqlx::query_as::<_, OrderSummaryRow>(
            r"
            SELECT o.id, o.order_number, o.total_amount, o.payment_status, o.created_at,
                   COALESCE(SUM(i.quantity), 0)::BIGINT AS item_count
            FROM storefront.order o
            LEFT JOIN storefront.order_item i ON i.order_id = o.id
            WHERE o.user_id = $1
            GROUP BY o.id
            ORDER BY o.created_at DESC, o.id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(OrderSummary::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM storefront.order WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;

        Ok(OrderPage { orders, total })
    }

    /// Find the order carrying a payment intent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<LedgerEntry>, RepositoryError> {
        let row = sqlx::query_as::<_, LedgerRow>(
            r"
            SELECT id, order_number, payment_status
            FROM storefront.order
            WHERE stripe_payment_intent = $1
            ",
        )
        .bind(intent_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| {
            Ok(LedgerEntry {
                id: OrderId::new(r.id),
                order_number: parse_number(&r.order_number)?,
                payment_status: r.payment_status,
            })
        })
        .transpose()
    }

    /// Move an order from `from` to `to`, only if it is still in `from`.
    ///
    /// `paid_at` is written when given and left untouched otherwise. Returns
    /// whether the row changed; `false` means another writer got there first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a transition the status
    /// machine does not allow.
    #[tracing::instrument(skip(self))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        if !from.can_transition_to(to) {
            return Err(RepositoryError::Conflict(format!(
                "illegal payment status transition {from} -> {to}"
            )));
        }

        let result = sqlx::query(
            r"
            UPDATE storefront.order
               SET payment_status = $3,
                   paid_at = COALESCE($4, paid_at),
                   updated_at = NOW()
             WHERE id = $1 AND payment_status = $2
            ",
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .bind(paid_at)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Replace an order's internal admin notes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no order has this number.
    pub async fn set_admin_notes(
        &self,
        number: &OrderNumber,
        notes: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.order
               SET admin_notes = $2, updated_at = NOW()
             WHERE order_number = $1
            ",
        )
        .bind(number.as_str())
        .bind(notes)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Insert the order row, retrying with a fresh number on collision.
async fn insert_order(
    conn: &mut PgConnection,
    order: &NewOrder,
    total: Money,
    paid_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    numbers: &OrderNumberGenerator,
) -> Result<OrderRow, CheckoutError> {
    let address = &order.details.address;
    let sql = format!(
        r"
        INSERT INTO storefront.order (
            user_id, order_number, full_name, email, phone,
            address_line_1, address_line_2, city, state, postal_code, country,
            total_amount, payment_status, stripe_payment_intent,
            created_at, updated_at, paid_at, customer_notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15, $16, $17)
        ON CONFLICT (order_number) DO NOTHING
        RETURNING {ORDER_COLUMNS}
        "
    );

    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let number = numbers.next_number();

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.user_id)
            .bind(number.as_str())
            .bind(&address.full_name)
            .bind(order.details.email.as_str())
            .bind(&address.phone)
            .bind(&address.address_line_1)
            .bind(&address.address_line_2)
            .bind(&address.city)
            .bind(&address.state)
            .bind(&address.postal_code)
            .bind(&address.country)
            .bind(total)
            .bind(order.payment_status)
            .bind(&order.stripe_payment_intent)
            .bind(now)
            .bind(paid_at)
            .bind(&order.details.customer_notes)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "order for this payment"))?;

        match row {
            Some(row) => return Ok(row),
            None => tracing::warn!(%number, "Order number collision, drawing another"),
        }
    }

    Err(CheckoutError::IntegrityViolation(
        "could not allocate an unused order number".to_owned(),
    ))
}
