//! Gateway webhook authentication and event parsing.
//!
//! Deliveries carry a `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>]`
//! header. The signature is HMAC-SHA256 over `"{t}.{raw_body}"` keyed with
//! the endpoint's signing secret. Timestamps outside the tolerance window are
//! rejected to limit replay.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Why a webhook delivery was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Verifies webhook signatures with the endpoint's signing secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: SecretString, tolerance: Duration) -> Self {
        Self { secret, tolerance }
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// Check a delivery's signature header against its raw body.
    ///
    /// Any one matching `v1` entry is accepted, so deliveries signed during a
    /// secret rotation still verify.
    ///
    /// # Errors
    ///
    /// Returns a [`WebhookError`] describing why the delivery is not trusted.
    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| WebhookError::MalformedHeader)?,
                    );
                }
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        let age = now.timestamp().abs_diff(timestamp);
        if age > self.tolerance.as_secs() {
            return Err(WebhookError::TimestampOutOfTolerance);
        }

        let mac = self.mac(timestamp, payload)?;
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
        });

        if matched {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }

    /// Produce the header value the gateway would send for `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the HMAC cannot be keyed.
    pub fn signature_header(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let signature = hex::encode(self.mac(timestamp, payload)?.finalize().into_bytes());
        Ok(format!("t={timestamp},v1={signature}"))
    }
}

/// A verified webhook event, reduced to what the ledger cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// `payment_intent.succeeded`
    PaymentSucceeded { intent_id: String },
    /// `payment_intent.payment_failed`
    PaymentFailed { intent_id: String },
    /// Any other event type, acknowledged without action.
    Other(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: Option<RawData>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    id: Option<String>,
}

/// Parse a verified webhook body.
///
/// # Errors
///
/// Returns [`WebhookError::InvalidPayload`] if the body is not an event, or a
/// payment-intent event lacks the intent id.
pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, WebhookError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let intent_id = || {
        raw.data
            .as_ref()
            .and_then(|d| d.object.id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| WebhookError::InvalidPayload("event has no object id".to_owned()))
    };

    match raw.kind.as_str() {
        "payment_intent.succeeded" => Ok(GatewayEvent::PaymentSucceeded {
            intent_id: intent_id()?,
        }),
        "payment_intent.payment_failed" => Ok(GatewayEvent::PaymentFailed {
            intent_id: intent_id()?,
        }),
        _ => Ok(GatewayEvent::Other(raw.kind.clone())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const BODY: &[u8] =
        br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(
            SecretString::from("whsec_test_9f8e7d6c5b4a"),
            Duration::from_secs(300),
        )
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).single().unwrap_or_else(|| panic!("bad ts"))
    }

    fn header(ts: i64) -> String {
        verifier()
            .signature_header(BODY, ts)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn test_valid_signature() {
        let ts = 1_760_000_000;
        assert_eq!(verifier().verify(BODY, &header(ts), at(ts + 10)), Ok(()));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let ts = 1_760_000_000;
        let tampered = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_999"}}}"#;
        assert_eq!(
            verifier().verify(tampered, &header(ts), at(ts)),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let ts = 1_760_000_000;
        let other = WebhookVerifier::new(
            SecretString::from("whsec_other_1a2b3c4d5e6f"),
            Duration::from_secs(300),
        );
        assert_eq!(
            other.verify(BODY, &header(ts), at(ts)),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_stale_and_future_timestamps_are_rejected() {
        let ts = 1_760_000_000;
        assert_eq!(
            verifier().verify(BODY, &header(ts), at(ts + 301)),
            Err(WebhookError::TimestampOutOfTolerance)
        );
        assert_eq!(
            verifier().verify(BODY, &header(ts), at(ts - 301)),
            Err(WebhookError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn test_malformed_headers() {
        let now = at(1_760_000_000);
        for bad in ["", "v1=abcd", "t=1760000000", "t=soon,v1=abcd"] {
            assert_eq!(
                verifier().verify(BODY, bad, now),
                Err(WebhookError::MalformedHeader),
                "{bad:?}"
            );
        }
        assert_eq!(
            verifier().verify(BODY, "t=1760000000,v1=not-hex", now),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let ts = 1_760_000_000;
        let good = header(ts);
        let rotated = format!("t={ts},v1={},{}", "00".repeat(32), good.split_once(',').map_or("", |(_, v)| v));
        assert_eq!(verifier().verify(BODY, &rotated, at(ts)), Ok(()));
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(
            parse_event(BODY),
            Ok(GatewayEvent::PaymentSucceeded {
                intent_id: "pi_123".to_owned()
            })
        );
        assert_eq!(
            parse_event(br#"{"type":"payment_intent.payment_failed","data":{"object":{"id":"pi_9"}}}"#),
            Ok(GatewayEvent::PaymentFailed {
                intent_id: "pi_9".to_owned()
            })
        );
        assert_eq!(
            parse_event(br#"{"type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#),
            Ok(GatewayEvent::Other("charge.refunded".to_owned()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_payloads() {
        assert!(matches!(parse_event(b"not json"), Err(WebhookError::InvalidPayload(_))));
        assert!(matches!(
            parse_event(br#"{"type":"payment_intent.succeeded","data":{"object":{}}}"#),
            Err(WebhookError::InvalidPayload(_))
        ));
    }
}
