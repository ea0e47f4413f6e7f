//! ShopClub Core - domain types and checkout rules.
//!
//! This crate holds everything about a purchase that can be decided without
//! touching the network or the database:
//!
//! - [`types`] - Newtype ids, money, email addresses and the payment status machine
//! - [`contact`] - Validation of checkout and address-book form input
//! - [`cart`] - Cart lines and the quantity rules applied when a cart changes
//! - [`pricing`] - Authoritative totals and stock checks for a checkout attempt
//! - [`order`] - Orders, order items and the record handed to the ledger
//! - [`order_number`] - Unguessable external order numbers
//! - [`address`] - Saved shipping addresses
//! - [`error`] - The checkout error taxonomy
//!
//! # Architecture
//!
//! The storefront crate owns every I/O boundary (Postgres, the payment gateway,
//! HTTP). It calls into this crate for the rules, so the rules can be tested
//! without any of those.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address;
pub mod cart;
pub mod contact;
pub mod error;
pub mod order;
pub mod order_number;
pub mod pricing;
pub mod types;

pub use address::ShippingAddress;
pub use cart::{CartChange, CartError, CartLine, Product, plan_add, plan_update};
pub use contact::{
    FieldError, FieldErrors, PostalAddress, PostalAddressInput, ShippingDetails,
    ShippingDetailsInput,
};
pub use error::CheckoutError;
pub use order::{NewOrder, Order, OrderItem, OrderSummary};
pub use order_number::{
    OrderNumber, OrderNumberError, OrderNumberGenerator, RandomSource, ThreadRandom,
};
pub use pricing::{PricedCart, PricedLine, price_cart};
pub use types::*;
