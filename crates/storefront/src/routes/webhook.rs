//! Payment gateway webhook endpoint.
//!
//! Authenticated by the `Stripe-Signature` header, not the session. The raw
//! body is read as bytes because the signature covers it verbatim.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use crate::payments::webhook::SIGNATURE_HEADER;
use crate::services::{ReconcileError, ReconcileOutcome};
use crate::state::AppState;

/// Receive a gateway event.
///
/// Every verified event is acknowledged with 200, including duplicates and
/// events for unknown intents. Only a storage failure returns 500 so the
/// gateway retries.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.reconciler().handle(&body, signature, Utc::now()).await {
        Ok(outcome) => {
            if let ReconcileOutcome::Transitioned { order_number, to, .. } = &outcome {
                crate::error::add_breadcrumb(
                    "webhook",
                    "Payment status updated",
                    Some(&[("order_number", order_number.as_str()), ("status", to.as_str())]),
                );
            }
            (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
        }
        Err(ReconcileError::InvalidSignature(e)) => {
            tracing::warn!(error = %e, "Rejected webhook signature");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid signature" })),
            )
                .into_response()
        }
        Err(ReconcileError::InvalidPayload(e)) => {
            tracing::warn!(error = %e, "Rejected webhook payload");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid payload" })),
            )
                .into_response()
        }
        Err(e @ ReconcileError::Storage(_)) => {
            let event_id = sentry::capture_error(&e);
            tracing::error!(error = %e, sentry_event_id = %event_id, "Webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use axum::{Router, body::Body, http::Request, routing::post};
    use sqlx::PgPool;
    use tower::ServiceExt;

    use super::*;
    use crate::config::StorefrontConfig;

    /// State over a lazy pool; rejected deliveries never reach the database.
    fn state() -> AppState {
        let vars = HashMap::from([
            ("STOREFRONT_DATABASE_URL", "postgres://localhost/shopclub"),
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("STOREFRONT_SESSION_SECRET", "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6"),
            ("STRIPE_SECRET_KEY", "sk_test_4eC39HqLyjWDarjtT1zdp7dc"),
            ("STRIPE_PUBLISHABLE_KEY", "pk_test_TYooMQauvdEDq54NiTphI7jx"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_8fQz1LmN3pR7tV2xK9cB4dH6"),
        ]);
        let config =
            StorefrontConfig::from_vars(&|key: &str| vars.get(key).map(|v| (*v).to_string()))
                .unwrap();
        let pool = PgPool::connect_lazy("postgres://localhost/shopclub").unwrap();
        AppState::new(config, pool).unwrap()
    }

    async fn deliver(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let app = Router::new()
            .route("/orders/webhook", post(stripe_webhook))
            .with_state(state());
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_unsigned_delivery_is_rejected() {
        let request = Request::post("/orders/webhook")
            .body(Body::from(r#"{"type":"payment_intent.succeeded"}"#))
            .unwrap();

        let (status, body) = deliver(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid signature");
    }

    #[tokio::test]
    async fn test_forged_signature_is_rejected() {
        let request = Request::post("/orders/webhook")
            .header(SIGNATURE_HEADER, format!("t={},v1=deadbeef", Utc::now().timestamp()))
            .body(Body::from(r#"{"type":"payment_intent.succeeded"}"#))
            .unwrap();

        let (status, body) = deliver(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid signature");
    }
}
