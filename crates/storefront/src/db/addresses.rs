//! Address book persistence.
//!
//! The partial unique index `idx_shipping_address_one_default` allows at most
//! one default per user, so every write that sets a default first clears the
//! old one inside the same transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use shopclub_core::{AddressId, PostalAddress, ShippingAddress, UserId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct AddressRow {
    id: i32,
    user_id: i32,
    full_name: String,
    phone: String,
    address_line_1: String,
    address_line_2: String,
    city: String,
    state: String,
    postal_code: String,
    country: String,
    is_default: bool,
    created_at: DateTime<Utc>,
}

impl From<AddressRow> for ShippingAddress {
    fn from(row: AddressRow) -> Self {
        Self {
            id: AddressId::new(row.id),
            user_id: UserId::new(row.user_id),
            address: PostalAddress {
                full_name: row.full_name,
                phone: row.phone,
                address_line_1: row.address_line_1,
                address_line_2: row.address_line_2,
                city: row.city,
                state: row.state,
                postal_code: row.postal_code,
                country: row.country,
            },
            is_default: row.is_default,
            created_at: row.created_at,
        }
    }
}

const ADDRESS_COLUMNS: &str = r"
    id, user_id, full_name, phone, address_line_1, address_line_2,
    city, state, postal_code, country, is_default, created_at
";

async fn clear_default<'e>(
    executor: impl PgExecutor<'e>,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE storefront.shipping_address SET is_default = FALSE WHERE user_id = $1 AND is_default",
    )
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Repository for saved shipping addresses.
pub struct AddressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AddressRepository<'a> {
    /// Create a new address repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All of a user's addresses, default first, then newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<ShippingAddress>, RepositoryError> {
        let sql = format!(
            "SELECT {ADDRESS_COLUMNS} FROM storefront.shipping_address
             WHERE user_id = $1
             ORDER BY is_default DESC, created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, AddressRow>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(ShippingAddress::from).collect())
    }

    /// The user's default address, if one is set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn default_for(
        &self,
        user_id: UserId,
    ) -> Result<Option<ShippingAddress>, RepositoryError> {
        let sql = format!(
            "SELECT {ADDRESS_COLUMNS} FROM storefront.shipping_address
             WHERE user_id = $1 AND is_default"
        );
        let row = sqlx::query_as::<_, AddressRow>(&sql)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(ShippingAddress::from))
    }

    /// Save a new address, optionally making it the default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a concurrent request set a
    /// different default first, `RepositoryError::Database` otherwise.
    pub async fn create(
        &self,
        user_id: UserId,
        address: &PostalAddress,
        make_default: bool,
    ) -> Result<ShippingAddress, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if make_default {
            clear_default(&mut *tx, user_id).await?;
        }

        let sql = format!(
            r"
            INSERT INTO storefront.shipping_address (
                user_id, full_name, phone, address_line_1, address_line_2,
                city, state, postal_code, country, is_default
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ADDRESS_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, AddressRow>(&sql)
            .bind(user_id)
            .bind(&address.full_name)
            .bind(&address.phone)
            .bind(&address.address_line_1)
            .bind(&address.address_line_2)
            .bind(&address.city)
            .bind(&address.state)
            .bind(&address.postal_code)
            .bind(&address.country)
            .bind(make_default)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "default address"))?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Make one of the user's addresses the default.
    ///
    /// Returns `false` if the address does not exist or belongs to someone
    /// else, leaving the current default untouched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a concurrent request set a
    /// different default first, `RepositoryError::Database` otherwise.
    pub async fn set_default(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        clear_default(&mut *tx, user_id).await?;

        let result = sqlx::query(
            "UPDATE storefront.shipping_address SET is_default = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(address_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "default address"))?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Delete one of the user's addresses. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM storefront.shipping_address WHERE id = $1 AND user_id = $2",
        )
        .bind(address_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
