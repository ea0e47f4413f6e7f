//! Catalog reads and the seed upsert.
//!
//! The catalog is owned outside checkout. The storefront only looks products
//! up when they are added to a cart; stock is decremented by the order ledger.

use rust_decimal::Decimal;
use sqlx::PgPool;

use shopclub_core::{Money, Product, ProductId};

use super::{RepositoryError, to_i32, to_u32};

/// Internal row type for product queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    pub(crate) id: i32,
    pub(crate) name: String,
    pub(crate) slug: String,
    pub(crate) price: Decimal,
    pub(crate) stock: i32,
    pub(crate) available: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            slug: row.slug,
            price: Money::new(row.price),
            stock: to_u32(row.stock, "stock")?,
            available: row.available,
        })
    }
}

/// Fields written by the seed command.
#[derive(Debug, Clone)]
pub struct ProductSeed {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
}

/// Repository for catalog reads.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, slug, price, stock, available
            FROM storefront.product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Insert a product, or refresh price and stock if the slug exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_by_slug(&self, seed: &ProductSeed) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO storefront.product (name, slug, description, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (slug) DO UPDATE
               SET name = EXCLUDED.name,
                   description = EXCLUDED.description,
                   price = EXCLUDED.price,
                   stock = EXCLUDED.stock,
                   available = TRUE,
                   updated_at = NOW()
            RETURNING id, name, slug, price, stock, available
            ",
        )
        .bind(&seed.name)
        .bind(&seed.slug)
        .bind(&seed.description)
        .bind(seed.price)
        .bind(to_i32(seed.stock, "stock")?)
        .fetch_one(self.pool)
        .await?;

        Product::try_from(row)
    }
}
