//! Domain models owned by the storefront crate.
//!
//! Checkout and order types live in `shopclub-core`; these are the few types
//! that only make sense next to the HTTP layer.

pub mod session;
pub mod user;

pub use session::{CurrentUser, keys};
pub use user::User;
