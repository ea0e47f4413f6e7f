//! Saved shipping addresses.
//!
//! A user keeps any number of addresses; at most one is flagged default and
//! pre-fills the checkout form. The database enforces the single default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AddressId, PostalAddress, UserId};

/// An address-book entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub id: AddressId,
    pub user_id: UserId,
    pub address: PostalAddress,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}
