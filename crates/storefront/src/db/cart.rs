//! Cart store.
//!
//! A cart is the set of `cart_line` rows for a user, joined with live product
//! rows on every read so prices and stock are never stale.

use sqlx::{PgExecutor, PgPool};

use shopclub_core::{CartLine, CartLineId, Product, ProductId, UserId};

use super::products::ProductRow;
use super::{RepositoryError, to_i32, to_u32};

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    line_id: i32,
    quantity: i32,
    #[sqlx(flatten)]
    product: ProductRow,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CartLineId::new(row.line_id),
            quantity: to_u32(row.quantity, "quantity")?,
            product: Product::try_from(row.product)?,
        })
    }
}

const SELECT_LINES: &str = r"
    SELECT c.id AS line_id, c.quantity,
           p.id, p.name, p.slug, p.price, p.stock, p.available
    FROM storefront.cart_line c
    JOIN storefront.product p ON p.id = c.product_id
    WHERE c.user_id = $1
    ORDER BY p.id
";

/// Load a user's cart.
///
/// With `lock`, the cart and product rows are locked `FOR UPDATE` in product
/// id order, so concurrent checkouts touching the same products serialize.
pub(crate) async fn fetch_lines<'e>(
    executor: impl PgExecutor<'e>,
    user_id: UserId,
    lock: bool,
) -> Result<Vec<CartLine>, RepositoryError> {
    let sql = if lock {
        format!("{SELECT_LINES} FOR UPDATE OF c, p")
    } else {
        SELECT_LINES.to_owned()
    };

    sqlx::query_as::<_, CartLineRow>(&sql)
        .bind(user_id)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(CartLine::try_from)
        .collect()
}

/// Delete every line of a user's cart.
pub(crate) async fn clear_lines<'e>(
    executor: impl PgExecutor<'e>,
    user_id: UserId,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query("DELETE FROM storefront.cart_line WHERE user_id = $1")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Repository for cart operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All lines of a user's cart with live product data.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        fetch_lines(self.pool, user_id, false).await
    }

    /// One line of a user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_line(
        &self,
        user_id: UserId,
        line_id: CartLineId,
    ) -> Result<Option<CartLine>, RepositoryError> {
        let lines = self.list(user_id).await?;
        Ok(lines.into_iter().find(|line| line.id == line_id))
    }

    /// Quantity of `product_id` already in the cart, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn quantity_of(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<u32>, RepositoryError> {
        let quantity: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM storefront.cart_line WHERE user_id = $1 AND product_id = $2",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?;

        quantity.map(|q| to_u32(q, "quantity")).transpose()
    }

    /// Set the quantity of a product in the cart, creating the line if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn put(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.cart_line (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE
               SET quantity = EXCLUDED.quantity,
                   updated_at = NOW()
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(to_i32(quantity, "quantity")?)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Set the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this user's cart.
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.cart_line
               SET quantity = $3, updated_at = NOW()
             WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(line_id)
        .bind(user_id)
        .bind(to_i32(quantity, "quantity")?)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove a line from the cart.
    ///
    /// Returns whether a line was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove(&self, user_id: UserId, line_id: CartLineId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM storefront.cart_line WHERE id = $1 AND user_id = $2")
                .bind(line_id)
                .bind(user_id)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of lines in the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM storefront.cart_line WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        clear_lines(self.pool, user_id).await
    }
}
