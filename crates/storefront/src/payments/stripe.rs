//! Stripe REST client for payment intents.
//!
//! Form-encoded requests against `/v1/payment_intents`, authenticated with
//! the secret key as a bearer token.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use super::{CreateIntent, GatewayError, PaymentGateway, PaymentIntent};
use crate::config::StripeConfig;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Stripe implementation of [`PaymentGateway`].
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: SecretString,
    api_base: Url,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Build a client from explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Http` if the HTTP client cannot be built.
    pub fn new(config: &StripeConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("shopclub/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(self.api_base.join(path)?)
    }

    async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<PaymentIntent>()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message.or(b.error.kind))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned());

        tracing::error!(status = status.as_u16(), %message, "Stripe API error");
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Stripe ids are `prefix_` plus alphanumerics.
fn valid_intent_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PaymentGateway for StripeClient {
    #[tracing::instrument(skip(self, request), fields(amount = request.amount_minor, currency = %request.currency))]
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, GatewayError> {
        let mut params = vec![
            ("amount".to_owned(), request.amount_minor.to_string()),
            ("currency".to_owned(), request.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_owned(),
                "true".to_owned(),
            ),
        ];
        for (key, value) in &request.metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .http
            .post(self.endpoint("v1/payment_intents")?)
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .form(&params)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let intent = Self::read_intent(response).await?;
        tracing::info!(payment_intent = %intent.id, status = ?intent.status, "Payment intent created");
        Ok(intent)
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        if !valid_intent_id(intent_id) {
            return Err(GatewayError::InvalidIntentId(intent_id.to_owned()));
        }

        let response = self
            .http
            .get(self.endpoint(&format!("v1/payment_intents/{intent_id}"))?)
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        Self::read_intent(response).await
    }
}
