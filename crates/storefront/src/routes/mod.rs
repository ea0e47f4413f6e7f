//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Health check
//! GET  /health/ready                    - Readiness check (database)
//!
//! # Cart (HTMX fragments)
//! GET  /cart                            - Cart page
//! POST /cart/add                        - Add to cart (returns count badge, triggers cart-updated)
//! POST /cart/update                     - Update quantity (returns cart_items fragment)
//! POST /cart/remove                     - Remove line (returns cart_items fragment)
//! POST /cart/clear                      - Empty the cart
//! GET  /cart/count                      - Cart count badge (fragment)
//!
//! # Orders (requires auth)
//! GET  /orders/checkout                 - Checkout page
//! POST /orders/checkout                 - Place order
//! POST /orders/create-payment-intent    - Create payment intent (JSON)
//! GET  /orders/success/{order_number}   - Order confirmation
//! GET  /orders/my-orders                - Order history (?page=N)
//! GET  /orders/order/{order_number}     - Order detail
//!
//! # Gateway (signature-authenticated, no session)
//! POST /orders/webhook                  - Payment webhook
//!
//! # Account (requires auth)
//! GET  /account/addresses               - Address book
//! POST /account/addresses               - Save address
//! POST /account/addresses/{id}/default  - Make default
//! POST /account/addresses/{id}/delete   - Delete address
//! ```

pub mod account;
pub mod cart;
pub mod orders;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post},
};

use shopclub_core::Money;

use crate::state::AppState;

/// Format a money amount for display.
pub(crate) fn format_price(money: Money) -> String {
    format!("${money}")
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/count", get(cart::count))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/checkout",
            get(orders::checkout_page).post(orders::place_order),
        )
        .route(
            "/create-payment-intent",
            post(orders::create_payment_intent),
        )
        .route("/success/{order_number}", get(orders::success))
        .route("/my-orders", get(orders::history))
        .route("/order/{order_number}", get(orders::detail))
        .route("/webhook", post(webhook::stripe_webhook))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/addresses",
            get(account::addresses).post(account::create_address),
        )
        .route("/addresses/{id}/default", post(account::set_default))
        .route("/addresses/{id}/delete", post(account::delete_address))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/account", account_routes())
}
