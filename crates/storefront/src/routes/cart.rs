//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Quantity rules live in `shopclub_core::cart`; these handlers load the
//! live product, ask the rules what to do, then write.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use shopclub_core::{
    CartChange, CartError, CartLine, CartLineId, Money, ProductId, UserId, plan_add, plan_update,
};

use super::format_price;
use crate::db::{CartRepository, ProductRepository, RepositoryError};
use crate::error::{AppError, add_breadcrumb};
use crate::middleware::{OptionalAuth, RequireAuth, take_flash};
use crate::state::AppState;

/// Cart line display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub id: i32,
    pub slug: String,
    pub name: String,
    pub quantity: u32,
    pub stock: u32,
    pub price: String,
    pub line_price: String,
    /// The line asks for more than is in stock right now.
    pub over_stock: bool,
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub total: String,
    pub item_count: u32,
}

impl CartView {
    /// Build the view from live cart lines.
    #[must_use]
    pub fn from_lines(lines: &[CartLine]) -> Self {
        let subtotal: Money = lines.iter().map(CartLine::line_total).sum();

        Self {
            items: lines.iter().map(CartItemView::from).collect(),
            subtotal: format_price(subtotal),
            total: format_price(subtotal),
            item_count: lines.iter().map(|l| l.quantity).sum(),
        }
    }
}

impl From<&CartLine> for CartItemView {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.id.as_i32(),
            slug: line.product.slug.clone(),
            name: line.product.name.clone(),
            quantity: line.quantity,
            stock: line.product.stock,
            price: format_price(line.product.price),
            line_price: format_price(line.line_total()),
            over_stock: line.quantity > line.product.stock,
        }
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: i32,
    pub quantity: Option<u32>,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub line_id: i32,
    pub quantity: u32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub line_id: i32,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub cart: CartView,
    pub flash: Option<String>,
    /// Shared with the items fragment; always empty on a full page load.
    pub notice: Option<String>,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
    pub notice: Option<String>,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: i64,
    pub notice: Option<String>,
}

fn clamp_notice(quantity: u32) -> String {
    format!("Only {quantity} available in stock. Quantity adjusted.")
}

/// Inline error fragment for failed HTMX cart actions.
fn error_fragment(status: StatusCode, message: &str) -> Response {
    (
        status,
        Html(format!("<span class=\"text-red-500\">{message}</span>")),
    )
        .into_response()
}

/// Refreshed cart items with the cart-updated trigger.
async fn items_fragment(state: &AppState, user_id: UserId, notice: Option<String>) -> Response {
    match CartRepository::new(state.pool()).list(user_id).await {
        Ok(lines) => (
            AppendHeaders([("HX-Trigger", "cart-updated")]),
            CartItemsTemplate {
                cart: CartView::from_lines(&lines),
                notice,
            },
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to reload cart: {e}");
            error_fragment(StatusCode::INTERNAL_SERVER_ERROR, "Error loading cart")
        }
    }
}

/// Display cart page.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<CartShowTemplate, AppError> {
    let lines = CartRepository::new(state.pool()).list(user.id).await?;

    Ok(CartShowTemplate {
        cart: CartView::from_lines(&lines),
        flash: take_flash(&session).await,
        notice: None,
    })
}

/// Why adding to the cart failed.
enum AddError {
    Cart(CartError),
    UnknownProduct,
    Repository(RepositoryError),
}

impl From<RepositoryError> for AddError {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err)
    }
}

/// Apply an add-to-cart request; returns the new line count and any clamp notice.
async fn add_line(
    state: &AppState,
    user_id: UserId,
    form: &AddToCartForm,
) -> Result<(i64, Option<String>), AddError> {
    let product_id = ProductId::new(form.product_id);
    let product = ProductRepository::new(state.pool())
        .get_by_id(product_id)
        .await?
        .ok_or(AddError::UnknownProduct)?;

    let carts = CartRepository::new(state.pool());
    let existing = carts.quantity_of(user_id, product_id).await?;
    let change =
        plan_add(&product, existing, form.quantity.unwrap_or(1)).map_err(AddError::Cart)?;

    let notice = match change {
        CartChange::Insert(quantity) | CartChange::Update { quantity, clamped: false } => {
            carts.put(user_id, product_id, quantity).await?;
            None
        }
        CartChange::Update { quantity, clamped: true } => {
            carts.put(user_id, product_id, quantity).await?;
            Some(clamp_notice(quantity))
        }
        // Adding never removes a line.
        CartChange::Remove => None,
    };

    Ok((carts.count(user_id).await?, notice))
}

/// Add item to cart (HTMX).
///
/// Returns the cart count badge with an HTMX trigger so other cart
/// fragments refresh.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<AddToCartForm>,
) -> Response {
    match add_line(&state, user.id, &form).await {
        Ok((count, notice)) => {
            add_breadcrumb(
                "cart",
                "Added to cart",
                Some(&[("product_id", &form.product_id.to_string())]),
            );
            (
                AppendHeaders([("HX-Trigger", "cart-updated")]),
                CartCountTemplate { count, notice },
            )
                .into_response()
        }
        Err(AddError::Cart(e)) => {
            let err = AppError::from(e);
            error_fragment(err.status(), &err.public_message())
        }
        Err(AddError::UnknownProduct) => error_fragment(StatusCode::NOT_FOUND, "Product not found"),
        Err(AddError::Repository(e)) => {
            tracing::error!("Failed to add item to cart: {e}");
            error_fragment(StatusCode::INTERNAL_SERVER_ERROR, "Error adding to cart")
        }
    }
}

/// Apply a quantity change; `None` if the line is not in this user's cart.
async fn update_line(
    carts: &CartRepository<'_>,
    user_id: UserId,
    form: &UpdateCartForm,
) -> Result<Option<Option<String>>, RepositoryError> {
    let line_id = CartLineId::new(form.line_id);
    let Some(line) = carts.get_line(user_id, line_id).await? else {
        return Ok(None);
    };

    let notice = match plan_update(line.product.stock, form.quantity) {
        CartChange::Remove => {
            carts.remove(user_id, line_id).await?;
            None
        }
        CartChange::Insert(quantity) | CartChange::Update { quantity, clamped: false } => {
            carts.update_quantity(user_id, line_id, quantity).await?;
            None
        }
        CartChange::Update { quantity, clamped: true } => {
            carts.update_quantity(user_id, line_id, quantity).await?;
            Some(clamp_notice(quantity))
        }
    };

    Ok(Some(notice))
}

/// Update cart line quantity (HTMX).
///
/// Quantities above stock are clamped; zero removes the line.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<UpdateCartForm>,
) -> Response {
    let carts = CartRepository::new(state.pool());

    match update_line(&carts, user.id, &form).await {
        Ok(Some(notice)) => items_fragment(&state, user.id, notice).await,
        Ok(None) => error_fragment(StatusCode::NOT_FOUND, "Item is no longer in your cart"),
        Err(e) => {
            tracing::error!("Failed to update cart: {e}");
            error_fragment(StatusCode::INTERNAL_SERVER_ERROR, "Error updating cart")
        }
    }
}

/// Remove line from cart (HTMX).
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<RemoveFromCartForm>,
) -> Response {
    let line_id = CartLineId::new(form.line_id);

    match CartRepository::new(state.pool()).remove(user.id, line_id).await {
        Ok(_) => items_fragment(&state, user.id, None).await,
        Err(e) => {
            tracing::error!("Failed to remove from cart: {e}");
            error_fragment(StatusCode::INTERNAL_SERVER_ERROR, "Error removing item")
        }
    }
}

/// Empty the cart.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Redirect, AppError> {
    CartRepository::new(state.pool()).clear(user.id).await?;
    Ok(Redirect::to("/cart"))
}

/// Cart count badge (HTMX). Guests always see zero.
#[instrument(skip(state, user))]
pub async fn count(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> CartCountTemplate {
    let count = match user {
        Some(user) => CartRepository::new(state.pool())
            .count(user.id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to count cart lines: {e}");
                0
            }),
        None => 0,
    };

    CartCountTemplate {
        count,
        notice: None,
    }
}

#[cfg(test)]
mod tests {
    use shopclub_core::Product;

    use super::*;

    fn line(id: i32, price_cents: i64, stock: u32, quantity: u32) -> CartLine {
        CartLine {
            id: CartLineId::new(id),
            product: Product {
                id: ProductId::new(id),
                name: format!("P{id}"),
                slug: format!("p{id}"),
                price: Money::from_minor_units(price_cents),
                stock,
                available: true,
            },
            quantity,
        }
    }

    #[test]
    fn test_cart_view_totals_use_live_prices() {
        let view = CartView::from_lines(&[line(1, 999, 5, 3), line(2, 250, 10, 2)]);
        assert_eq!(view.subtotal, "$34.97");
        assert_eq!(view.total, view.subtotal);
        assert_eq!(view.item_count, 5);
        assert_eq!(view.items.first().map(|i| i.line_price.as_str()), Some("$29.97"));
    }

    #[test]
    fn test_cart_view_flags_over_stock_lines() {
        let view = CartView::from_lines(&[line(1, 999, 2, 3)]);
        assert!(view.items.iter().all(|i| i.over_stock));
    }

    #[test]
    fn test_empty_cart_view() {
        let view = CartView::from_lines(&[]);
        assert!(view.items.is_empty());
        assert_eq!(view.total, "$0.00");
    }
}
