//! User domain types.

use chrono::{DateTime, Utc};

use shopclub_core::{Email, UserId};

use super::CurrentUser;

/// A storefront user.
///
/// Identity (passwords, passkeys, social login) is held by the external
/// provider; the storefront keeps only the row its carts and orders hang off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}
