//! Checkout and order history route handlers.
//!
//! Checkout runs in two steps. The page posts to `create-payment-intent`,
//! confirms the card client-side with the returned secret, then submits the
//! checkout form with the intent id. Everything that decides whether an
//! order exists happens in [`crate::services::CheckoutService`].

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use shopclub_core::{
    CheckoutError, FieldErrors, Order, OrderNumber, OrderSummary, PostalAddressInput, PricedCart,
    PricedLine, ShippingDetailsInput, UserId,
};

use super::format_price;
use crate::db::{AddressRepository, OrderRepository};
use crate::error::{ApiError, AppError, add_breadcrumb, set_sentry_user};
use crate::middleware::{RequireAuth, set_flash, take_flash};
use crate::models::CurrentUser;
use crate::state::AppState;

/// Orders shown per history page.
const ORDERS_PER_PAGE: u32 = 10;

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y %H:%M UTC").to_string()
}

// =============================================================================
// Views
// =============================================================================

/// One priced checkout line.
#[derive(Clone)]
pub struct CheckoutLineView {
    pub name: String,
    pub quantity: u32,
    pub price: String,
    pub line_total: String,
}

impl From<&PricedLine> for CheckoutLineView {
    fn from(line: &PricedLine) -> Self {
        Self {
            name: line.product_name.clone(),
            quantity: line.quantity,
            price: format_price(line.unit_price),
            line_total: format_price(line.line_total),
        }
    }
}

/// Order summary shown beside the checkout form.
#[derive(Clone)]
pub struct CheckoutView {
    pub lines: Vec<CheckoutLineView>,
    pub subtotal: String,
    pub total: String,
    pub item_count: u32,
}

impl From<&PricedCart> for CheckoutView {
    fn from(cart: &PricedCart) -> Self {
        Self {
            lines: cart.lines.iter().map(CheckoutLineView::from).collect(),
            subtotal: format_price(cart.subtotal),
            total: format_price(cart.total),
            item_count: cart.item_count(),
        }
    }
}

/// Order item with its frozen price.
#[derive(Clone)]
pub struct OrderItemView {
    pub name: String,
    pub quantity: u32,
    pub price: String,
    pub total: String,
}

/// Full order for the confirmation and detail pages.
#[derive(Clone)]
pub struct OrderView {
    pub number: String,
    pub status: String,
    pub status_label: String,
    pub created_at: String,
    pub paid_at: Option<String>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub customer_notes: String,
    pub items: Vec<OrderItemView>,
    pub subtotal: String,
    pub total: String,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        let address = &order.details.address;

        Self {
            number: order.order_number.to_string(),
            status: order.payment_status.as_str().to_string(),
            status_label: order.payment_status.label().to_string(),
            created_at: format_timestamp(order.created_at),
            paid_at: order.paid_at.map(format_timestamp),
            full_name: address.full_name.clone(),
            email: order.details.email.to_string(),
            phone: address.phone.clone(),
            address_line_1: address.address_line_1.clone(),
            address_line_2: address.address_line_2.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
            customer_notes: order.details.customer_notes.clone(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemView {
                    name: item.product_name.clone(),
                    quantity: item.quantity,
                    price: format_price(item.price),
                    total: format_price(item.total_price()),
                })
                .collect(),
            subtotal: format_price(order.items_total()),
            total: format_price(order.total_amount),
        }
    }
}

/// One row of the order history.
#[derive(Clone)]
pub struct OrderSummaryView {
    pub number: String,
    pub created_at: String,
    pub total: String,
    pub status: String,
    pub status_label: String,
    pub item_count: u32,
}

impl From<&OrderSummary> for OrderSummaryView {
    fn from(order: &OrderSummary) -> Self {
        Self {
            number: order.order_number.to_string(),
            created_at: format_timestamp(order.created_at),
            total: format_price(order.total_amount),
            status: order.payment_status.as_str().to_string(),
            status_label: order.payment_status.label().to_string(),
            item_count: order.item_count,
        }
    }
}

// =============================================================================
// Forms
// =============================================================================

/// Checkout form data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    #[serde(flatten)]
    pub address: PostalAddressInput,
    pub email: String,
    pub customer_notes: String,
    pub payment_intent_id: String,
}

impl CheckoutForm {
    /// Pre-filled form for a user about to check out.
    fn prefilled(user: &CurrentUser, address: Option<PostalAddressInput>) -> Self {
        Self {
            address: address.unwrap_or_default(),
            email: user.email.to_string(),
            ..Self::default()
        }
    }

    fn details_input(&self) -> ShippingDetailsInput {
        ShippingDetailsInput {
            address: self.address.clone(),
            email: self.email.clone(),
            customer_notes: self.customer_notes.clone(),
        }
    }
}

/// Order history query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/checkout.html")]
pub struct CheckoutTemplate {
    pub cart: CheckoutView,
    pub form: CheckoutForm,
    pub errors: FieldErrors,
    pub error: Option<String>,
    pub publishable_key: String,
}

/// Order confirmation page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/success.html")]
pub struct OrderSuccessTemplate {
    pub order: OrderView,
}

/// Order detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/detail.html")]
pub struct OrderDetailTemplate {
    pub order: OrderView,
}

/// Order history page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/history.html")]
pub struct OrderHistoryTemplate {
    pub orders: Vec<OrderSummaryView>,
    pub page: u32,
    pub total_pages: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
    pub flash: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Cart problems send the customer back to the cart with a message.
const fn is_cart_problem(err: &CheckoutError) -> bool {
    matches!(
        err,
        CheckoutError::EmptyCart
            | CheckoutError::StockConflict { .. }
            | CheckoutError::CartChanged { .. }
    )
}

async fn back_to_cart(session: &Session, err: &CheckoutError) -> Response {
    set_flash(session, err.user_message()).await;
    Redirect::to("/cart").into_response()
}

/// Re-render the checkout page for a rejected submission.
async fn rerender_checkout(
    state: &AppState,
    session: &Session,
    user_id: UserId,
    form: CheckoutForm,
    errors: FieldErrors,
    error: Option<String>,
    status: StatusCode,
) -> Result<Response, AppError> {
    let cart = match state.checkout().review(user_id).await {
        Ok(cart) => cart,
        Err(e) if is_cart_problem(&e) => return Ok(back_to_cart(session, &e).await),
        Err(e) => return Err(e.into()),
    };

    let template = CheckoutTemplate {
        cart: CheckoutView::from(&cart),
        form: CheckoutForm {
            payment_intent_id: String::new(),
            ..form
        },
        errors,
        error,
        publishable_key: state.config().stripe.publishable_key.clone(),
    };
    Ok((status, template).into_response())
}

/// Display the checkout page.
///
/// The form is pre-filled from the default shipping address, falling back to
/// the account email.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn checkout_page(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<Response, AppError> {
    let cart = match state.checkout().review(user.id).await {
        Ok(cart) => cart,
        Err(e) if is_cart_problem(&e) => return Ok(back_to_cart(&session, &e).await),
        Err(e) => return Err(e.into()),
    };

    let default_address = AddressRepository::new(state.pool())
        .default_for(user.id)
        .await?
        .map(|saved| PostalAddressInput::from(&saved.address));

    Ok(CheckoutTemplate {
        cart: CheckoutView::from(&cart),
        form: CheckoutForm::prefilled(&user, default_address),
        errors: FieldErrors::new(),
        error: take_flash(&session).await,
        publishable_key: state.config().stripe.publishable_key.clone(),
    }
    .into_response())
}

/// Place the order for a confirmed payment.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<CheckoutForm>,
) -> Result<Response, AppError> {
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let details = match form.details_input().validate() {
        Ok(details) => details,
        Err(errors) => {
            return rerender_checkout(
                &state,
                &session,
                user.id,
                form,
                errors,
                None,
                StatusCode::UNPROCESSABLE_ENTITY,
            )
            .await;
        }
    };

    let intent_id = form.payment_intent_id.trim().to_owned();
    if intent_id.is_empty() {
        return rerender_checkout(
            &state,
            &session,
            user.id,
            form,
            FieldErrors::new(),
            Some(CheckoutError::Gateway(String::new()).user_message()),
            StatusCode::PAYMENT_REQUIRED,
        )
        .await;
    }

    match state
        .checkout()
        .place_order(user.id, details, &intent_id, Utc::now())
        .await
    {
        Ok(order) => {
            tracing::info!(
                order_number = %order.order_number,
                status = %order.payment_status,
                total = %order.total_amount,
                "Order placed"
            );
            add_breadcrumb(
                "checkout",
                "Order placed",
                Some(&[("order_number", order.order_number.as_str())]),
            );
            Ok(Redirect::to(&format!("/orders/success/{}", order.order_number)).into_response())
        }
        Err(e) if is_cart_problem(&e) => Ok(back_to_cart(&session, &e).await),
        Err(e @ CheckoutError::Gateway(_)) => {
            rerender_checkout(
                &state,
                &session,
                user.id,
                form,
                FieldErrors::new(),
                Some(e.user_message()),
                StatusCode::PAYMENT_REQUIRED,
            )
            .await
        }
        Err(e) => Err(e.into()),
    }
}

/// Create a payment intent for the current cart (JSON).
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state
        .checkout()
        .create_payment_intent(user.id, &user.email)
        .await
    {
        Ok(created) => {
            tracing::info!(
                payment_intent = %created.intent_id,
                total = %created.cart.total,
                "Payment intent created"
            );
            Ok(Json(
                serde_json::json!({ "client_secret": created.client_secret }),
            ))
        }
        Err(CheckoutError::EmptyCart) => Err(AppError::BadRequest("Cart is empty".to_string()).into()),
        Err(e) => Err(e.into()),
    }
}

/// Load one of the user's orders, or 404.
async fn owned_order(
    state: &AppState,
    user_id: UserId,
    order_number: &str,
) -> Result<Order, AppError> {
    let not_found = || AppError::NotFound(format!("order {order_number}"));
    let number = OrderNumber::parse(order_number).map_err(|_| not_found())?;

    OrderRepository::new(state.pool())
        .find_for_user(user_id, &number)
        .await?
        .ok_or_else(not_found)
}

/// Order confirmation page.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn success(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_number): Path<String>,
) -> Result<OrderSuccessTemplate, AppError> {
    let order = owned_order(&state, user.id, &order_number).await?;

    Ok(OrderSuccessTemplate {
        order: OrderView::from(&order),
    })
}

/// Order detail page.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn detail(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_number): Path<String>,
) -> Result<OrderDetailTemplate, AppError> {
    let order = owned_order(&state, user.id, &order_number).await?;

    Ok(OrderDetailTemplate {
        order: OrderView::from(&order),
    })
}

/// Requested page number; anything unparsable is the first page.
fn requested_page(raw: Option<&str>) -> u32 {
    raw.and_then(|p| p.trim().parse::<u32>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

/// Pages needed for `total` orders; at least one.
fn page_count(total: i64, per_page: u32) -> u32 {
    let total = u32::try_from(total.max(0)).unwrap_or(u32::MAX);
    total.div_ceil(per_page).max(1)
}

/// Order history, newest first.
///
/// A page past the end shows the last page.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn history(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Query(query): Query<HistoryQuery>,
) -> Result<OrderHistoryTemplate, AppError> {
    let repo = OrderRepository::new(state.pool());

    let mut page = requested_page(query.page.as_deref());
    let mut result = repo.list_for_user(user.id, page, ORDERS_PER_PAGE).await?;
    let total_pages = page_count(result.total, ORDERS_PER_PAGE);

    if page > total_pages {
        page = total_pages;
        result = repo.list_for_user(user.id, page, ORDERS_PER_PAGE).await?;
    }

    Ok(OrderHistoryTemplate {
        orders: result.orders.iter().map(OrderSummaryView::from).collect(),
        page,
        total_pages,
        prev_page: (page > 1).then(|| page - 1),
        next_page: (page < total_pages).then(|| page + 1),
        flash: take_flash(&session).await,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_page_falls_back_to_first() {
        assert_eq!(requested_page(None), 1);
        assert_eq!(requested_page(Some("abc")), 1);
        assert_eq!(requested_page(Some("0")), 1);
        assert_eq!(requested_page(Some("-2")), 1);
        assert_eq!(requested_page(Some(" 3 ")), 3);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(25, 10), 3);
    }

    #[test]
    fn test_checkout_form_reads_flat_fields() {
        let form: CheckoutForm = parse_form(
            "full_name=Ada+Lovelace&phone=555-0100&address_line_1=1+Main+St&city=Springfield\
             &state=IL&postal_code=62701&country=US&email=ada%40example.com\
             &payment_intent_id=pi_123",
        );

        assert_eq!(form.address.full_name, "Ada Lovelace");
        assert_eq!(form.address.address_line_2, "");
        assert_eq!(form.email, "ada@example.com");
        assert_eq!(form.payment_intent_id, "pi_123");
        assert!(form.details_input().validate().is_ok());
    }

    #[test]
    fn test_invalid_checkout_form_collects_field_errors() {
        let form: CheckoutForm = parse_form(
            "full_name=++&address_line_1=1+Main+St&city=Springfield&state=IL\
             &postal_code=62701&country=US&email=not-an-email&payment_intent_id=pi_123",
        );

        let errors = form.details_input().validate().unwrap_err();
        assert_eq!(errors.get("full_name"), Some("Full Name is required."));
        assert!(errors.get("email").is_some());
        assert!(errors.get("city").is_none());
    }

    #[test]
    fn test_cart_problems_return_to_cart() {
        assert!(is_cart_problem(&CheckoutError::EmptyCart));
        assert!(!is_cart_problem(&CheckoutError::Gateway("x".to_string())));
        assert!(!is_cart_problem(&CheckoutError::Storage("x".to_string())));
    }

    fn parse_form(body: &str) -> CheckoutForm {
        use axum::body::Body;
        use axum::extract::FromRequest;
        use axum::http::Request;

        let request = Request::builder()
            .method("POST")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let Form(form) = runtime
            .block_on(Form::<CheckoutForm>::from_request(request, &()))
            .unwrap();
        form
    }
}
