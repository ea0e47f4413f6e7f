//! Core types for ShopClub.
//!
//! Type-safe wrappers for the values that flow through checkout.

pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyError};
pub use status::{PaymentEvent, PaymentStatus};
