//! Payment intent gateway.
//!
//! The storefront never sees card data. It asks the gateway for a payment
//! intent sized to the cart total, hands the intent's client secret to the
//! browser, and later learns the outcome either by retrieving the intent at
//! checkout or from a signed webhook.
//!
//! - [`PaymentGateway`] - The port the checkout service depends on
//! - [`stripe::StripeClient`] - Stripe REST implementation
//! - [`webhook`] - Webhook signature verification and event parsing

pub mod stripe;
pub mod webhook;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use serde::Deserialize;
use thiserror::Error;

use shopclub_core::MoneyError;

pub use stripe::StripeClient;
pub use webhook::{GatewayEvent, WebhookError, WebhookVerifier, parse_event};

/// Errors talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure.
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with an error status.
    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    /// No answer within the configured timeout.
    #[error("gateway did not respond in time")]
    Timeout,

    /// The amount cannot be expressed in minor units.
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),

    /// The response body was not what the gateway documents.
    #[error("unexpected gateway response: {0}")]
    Decode(String),

    /// The intent id contains characters no gateway id contains.
    #[error("invalid payment intent id: {0:?}")]
    InvalidIntentId(String),

    /// The configured API base cannot be joined with an endpoint path.
    #[error("invalid gateway endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl GatewayError {
    /// Classify a transport error, separating timeouts.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Parameters for creating a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntent {
    /// Amount in the currency's minor unit (cents).
    pub amount_minor: i64,
    /// Lowercase ISO 4217 code.
    pub currency: String,
    /// Attached to the intent for auditability.
    pub metadata: BTreeMap<String, String>,
}

/// Lifecycle status of a payment intent as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

/// A payment intent as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Absent when the intent is read with a restricted key.
    #[serde(default)]
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Port to the remote payment-capture service.
///
/// Implementations hold their own credentials; callers never pass keys.
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent.
    fn create_intent(
        &self,
        request: &CreateIntent,
    ) -> impl Future<Output = Result<PaymentIntent, GatewayError>> + Send;

    /// Fetch the current state of an intent.
    fn retrieve_intent(
        &self,
        intent_id: &str,
    ) -> impl Future<Output = Result<PaymentIntent, GatewayError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_deserializes_stripe_shape() {
        let json = r#"{
            "id": "pi_3Abc",
            "object": "payment_intent",
            "amount": 2997,
            "currency": "usd",
            "client_secret": "pi_3Abc_secret_xyz",
            "status": "requires_payment_method",
            "metadata": {"user_id": "7"}
        }"#;

        let intent: PaymentIntent = serde_json::from_str(json).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(intent.id, "pi_3Abc");
        assert_eq!(intent.amount, 2997);
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert_eq!(intent.metadata.get("user_id").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let json = r#"{"id":"pi_1","amount":1,"currency":"usd","status":"brand_new_state"}"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(intent.status, IntentStatus::Unknown);
        assert!(intent.client_secret.is_none());
        assert!(intent.metadata.is_empty());
    }
}
