//! ShopClub Storefront library.
//!
//! The HTTP surface, Postgres repositories and payment gateway client around
//! the rules in `shopclub-core`. Exposed as a library so the CLI and the
//! integration tests can reuse the repositories and services.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
