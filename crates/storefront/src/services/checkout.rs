//! Checkout orchestration.
//!
//! The flow is split across two requests:
//!
//! 1. [`CheckoutService::create_payment_intent`] prices the cart and asks the
//!    gateway for an intent; the browser completes payment with its secret.
//! 2. [`CheckoutService::place_order`] re-reads the intent from the gateway,
//!    checks it pays for this user's cart, then commits the order.
//!
//! Gateway calls never run inside a database transaction, and each one is
//! bounded by the configured timeout. A slow or failed gateway call leaves
//! the cart and stock untouched.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use shopclub_core::{
    CartLine, CheckoutError, Email, NewOrder, Order, OrderNumberGenerator, PaymentStatus,
    PricedCart, ShippingDetails, UserId, price_cart,
};

use crate::payments::{CreateIntent, GatewayError, IntentStatus, PaymentGateway, PaymentIntent};

/// Storage the checkout flow depends on.
pub trait CheckoutStore: Send + Sync {
    /// The user's cart with live product data.
    fn load_cart(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<CartLine>, CheckoutError>> + Send;

    /// Atomically re-validate the cart, persist the order and its items,
    /// decrement stock and empty the cart.
    fn commit_order(
        &self,
        order: NewOrder,
        numbers: &OrderNumberGenerator,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Order, CheckoutError>> + Send;
}

/// What the browser needs to collect payment.
#[derive(Debug, Clone)]
pub struct IntentCreated {
    pub intent_id: String,
    pub client_secret: String,
    pub cart: PricedCart,
}

/// Checkout flow over a store and a payment gateway.
pub struct CheckoutService<S, G> {
    store: S,
    gateway: G,
    numbers: OrderNumberGenerator,
    currency: String,
    gateway_timeout: Duration,
}

impl<S, G> CheckoutService<S, G>
where
    S: CheckoutStore,
    G: PaymentGateway,
{
    #[must_use]
    pub const fn new(
        store: S,
        gateway: G,
        numbers: OrderNumberGenerator,
        currency: String,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            numbers,
            currency,
            gateway_timeout,
        }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Price the user's cart against live stock and prices.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::EmptyCart`], [`CheckoutError::StockConflict`] or a
    /// storage failure.
    pub async fn review(&self, user_id: UserId) -> Result<PricedCart, CheckoutError> {
        let lines = self.store.load_cart(user_id).await?;
        price_cart(&lines)
    }

    /// Create a payment intent for the user's cart total.
    ///
    /// An empty or over-stocked cart is refused before the gateway is called.
    ///
    /// # Errors
    ///
    /// Cart errors from [`Self::review`], or [`CheckoutError::Gateway`].
    #[tracing::instrument(skip(self, email), fields(user_id = %user_id))]
    pub async fn create_payment_intent(
        &self,
        user_id: UserId,
        email: &Email,
    ) -> Result<IntentCreated, CheckoutError> {
        let cart = self.review(user_id).await?;

        let amount_minor = cart
            .total
            .to_minor_units()
            .map_err(|e| gateway_failure(&GatewayError::InvalidAmount(e)))?;

        let request = CreateIntent {
            amount_minor,
            currency: self.currency.clone(),
            metadata: BTreeMap::from([
                ("user_id".to_owned(), user_id.to_string()),
                ("user_email".to_owned(), email.as_str().to_owned()),
            ]),
        };

        let intent = self.call_gateway(self.gateway.create_intent(&request)).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| CheckoutError::Gateway("payment intent has no client secret".to_owned()))?;

        Ok(IntentCreated {
            intent_id: intent.id,
            client_secret,
            cart,
        })
    }

    /// Turn a confirmed payment into an order.
    ///
    /// # Errors
    ///
    /// - Cart errors from [`Self::review`] or from the commit's re-check.
    /// - [`CheckoutError::Gateway`] if the intent cannot be read, does not
    ///   match the cart, or has not been confirmed.
    /// - [`CheckoutError::IntegrityViolation`] if the intent already paid for
    ///   another order.
    #[tracing::instrument(skip(self, details), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        details: ShippingDetails,
        intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let cart = self.review(user_id).await?;

        let intent = self
            .call_gateway(self.gateway.retrieve_intent(intent_id))
            .await?;
        let payment_status = confirm_intent(&intent, user_id, &cart, &self.currency)?;

        let order = NewOrder {
            user_id,
            details,
            cart,
            stripe_payment_intent: intent.id,
            payment_status,
        };

        self.store.commit_order(order, &self.numbers, now).await
    }

    async fn call_gateway<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, CheckoutError> {
        match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(gateway_failure(&e)),
            Err(_) => Err(gateway_failure(&GatewayError::Timeout)),
        }
    }
}

fn gateway_failure(err: &GatewayError) -> CheckoutError {
    tracing::warn!(error = %err, "Payment gateway call failed");
    CheckoutError::Gateway(err.to_string())
}

/// Check that `intent` pays for exactly this cart, for this user, and return
/// the status the order starts in.
///
/// # Errors
///
/// Returns [`CheckoutError::Gateway`] on any mismatch or an unconfirmed intent.
pub fn confirm_intent(
    intent: &PaymentIntent,
    user_id: UserId,
    cart: &PricedCart,
    currency: &str,
) -> Result<PaymentStatus, CheckoutError> {
    let owner = intent.metadata.get("user_id").map(String::as_str);
    if owner != Some(user_id.to_string().as_str()) {
        return Err(CheckoutError::Gateway(
            "payment does not belong to this user".to_owned(),
        ));
    }

    let expected = cart
        .total
        .to_minor_units()
        .map_err(|e| CheckoutError::Gateway(e.to_string()))?;
    if intent.amount != expected || !intent.currency.eq_ignore_ascii_case(currency) {
        return Err(CheckoutError::Gateway(
            "payment amount does not match cart total".to_owned(),
        ));
    }

    match intent.status {
        IntentStatus::Succeeded => Ok(PaymentStatus::Paid),
        IntentStatus::Processing => Ok(PaymentStatus::Pending),
        _ => Err(CheckoutError::Gateway("payment not confirmed".to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use shopclub_core::{Money, PricedLine, ProductId};

    use super::*;

    fn cart(total_cents: i64) -> PricedCart {
        let total = Money::from_minor_units(total_cents);
        PricedCart {
            lines: vec![PricedLine {
                product_id: ProductId::new(1),
                product_name: "Widget".to_owned(),
                unit_price: total,
                quantity: 1,
                line_total: total,
            }],
            subtotal: total,
            total,
        }
    }

    fn intent(status: IntentStatus, amount: i64, owner: &str) -> PaymentIntent {
        PaymentIntent {
            id: "pi_1".to_owned(),
            client_secret: None,
            amount,
            currency: "usd".to_owned(),
            status,
            metadata: HashMap::from([("user_id".to_owned(), owner.to_owned())]),
        }
    }

    #[test]
    fn test_succeeded_intent_pays_order() {
        let result = confirm_intent(&intent(IntentStatus::Succeeded, 2997, "7"), UserId::new(7), &cart(2997), "usd");
        assert_eq!(result, Ok(PaymentStatus::Paid));
    }

    #[test]
    fn test_processing_intent_leaves_order_pending() {
        let result = confirm_intent(&intent(IntentStatus::Processing, 2997, "7"), UserId::new(7), &cart(2997), "usd");
        assert_eq!(result, Ok(PaymentStatus::Pending));
    }

    #[test]
    fn test_unconfirmed_intent_is_refused() {
        for status in [
            IntentStatus::RequiresPaymentMethod,
            IntentStatus::RequiresAction,
            IntentStatus::Canceled,
            IntentStatus::Unknown,
        ] {
            assert_eq!(
                confirm_intent(&intent(status, 2997, "7"), UserId::new(7), &cart(2997), "usd"),
                Err(CheckoutError::Gateway("payment not confirmed".to_owned()))
            );
        }
    }

    #[test]
    fn test_mismatches_are_refused() {
        let paid = |amount, owner| intent(IntentStatus::Succeeded, amount, owner);

        assert!(confirm_intent(&paid(2997, "8"), UserId::new(7), &cart(2997), "usd").is_err());
        assert!(confirm_intent(&paid(100, "7"), UserId::new(7), &cart(2997), "usd").is_err());
        assert!(confirm_intent(&paid(2997, "7"), UserId::new(7), &cart(2997), "eur").is_err());
    }
}
