//! Payment status of an order and the transitions between statuses.
//!
//! ```text
//!            succeeded
//!   pending ──────────▶ paid ──(admin refund)──▶ refunded
//!      │                 ▲
//!      └────failed────▶ failed
//!                 succeeded (retry on the same intent)
//! ```
//!
//! `refunded` is never left, and `paid` is only left by an explicit admin
//! refund. A `failed` order can still become `paid` when the customer retries
//! the same payment intent and it succeeds.

use serde::{Deserialize, Serialize};

/// Payment status stored on every order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.payment_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created, waiting for the gateway to confirm the charge.
    #[default]
    Pending,
    /// The gateway confirmed the charge.
    Paid,
    /// The gateway reported the charge failed.
    Failed,
    /// Flagged as refunded by an admin.
    Refunded,
}

/// A terminal payment event reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentEvent {
    /// The payment intent succeeded.
    Succeeded,
    /// The payment intent failed.
    Failed,
}

impl PaymentStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Failed)
                | (Self::Failed, Self::Paid)
                | (Self::Paid, Self::Refunded)
        )
    }

    /// The status a gateway event moves this status to.
    ///
    /// Returns `None` when the event does not apply, which covers duplicate
    /// deliveries (`paid` + succeeded), a late failure for a paid order and
    /// anything after a refund.
    #[must_use]
    pub const fn on_event(self, event: PaymentEvent) -> Option<Self> {
        match (self, event) {
            (Self::Pending | Self::Failed, PaymentEvent::Succeeded) => Some(Self::Paid),
            (Self::Pending, PaymentEvent::Failed) => Some(Self::Failed),
            _ => None,
        }
    }

    /// The status an admin refund moves this status to, if allowed.
    #[must_use]
    pub const fn on_refund(self) -> Option<Self> {
        match self {
            Self::Paid => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Human-readable label for templates.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Failed => "Failed",
            Self::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("invalid payment status: {s}")),
        }
    }
}
