//! Webhook deliveries applied to the in-memory ledger.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use shopclub_core::{PaymentStatus, UserId};
use shopclub_integration_tests::{
    FakeGateway, MemoryStore, checkout, event_payload, reconciler, shipping_details,
    webhook_verifier,
};
use shopclub_storefront::payments::{IntentStatus, WebhookError};
use shopclub_storefront::services::{OrderLedger, ReconcileError, ReconcileOutcome};

const SUCCEEDED: &str = "payment_intent.succeeded";
const FAILED: &str = "payment_intent.payment_failed";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("valid time")
}

fn signed(payload: &[u8], at: DateTime<Utc>) -> String {
    webhook_verifier()
        .signature_header(payload, at.timestamp())
        .expect("header signs")
}

/// A store holding one order in `status`; returns the store and its intent id.
async fn store_with_order(status: IntentStatus) -> (MemoryStore, String) {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let service = checkout(store.clone(), gateway.clone(), Duration::from_secs(2));
    let user = UserId::new(1);

    let widget = store.add_product("Widget", 999, 5).await;
    store.set_cart(user, widget, 1).await;
    let created = service
        .create_payment_intent(user, &"ada@example.com".parse().expect("valid email"))
        .await
        .expect("intent created");
    gateway.set_status(&created.intent_id, status);
    service
        .place_order(user, shipping_details("ada@example.com"), &created.intent_id, now())
        .await
        .expect("order placed");

    (store, created.intent_id)
}

async fn deliver(
    store: &MemoryStore,
    event_type: &str,
    intent_id: &str,
) -> Result<ReconcileOutcome, ReconcileError> {
    let payload = event_payload(event_type, intent_id);
    let header = signed(&payload, now());
    reconciler(store.clone())
        .handle(&payload, Some(&header), now())
        .await
}

async fn status_of(store: &MemoryStore, intent_id: &str) -> PaymentStatus {
    store
        .order_by_intent(intent_id)
        .await
        .expect("order exists")
        .payment_status
}

// =============================================================================
// Transitions
// =============================================================================

#[tokio::test]
async fn test_succeeded_event_pays_pending_order() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;
    let later = now() + chrono::Duration::seconds(30);

    let payload = event_payload(SUCCEEDED, &intent);
    let header = signed(&payload, later);
    let outcome = reconciler(store.clone())
        .handle(&payload, Some(&header), later)
        .await
        .expect("delivery accepted");

    assert!(matches!(
        outcome,
        ReconcileOutcome::Transitioned {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Paid,
            ..
        }
    ));
    let order = store.order_by_intent(&intent).await.expect("order exists");
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.paid_at, Some(later));
}

#[tokio::test]
async fn test_failed_event_fails_pending_order() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;

    let outcome = deliver(&store, FAILED, &intent).await.expect("accepted");

    assert!(matches!(
        outcome,
        ReconcileOutcome::Transitioned {
            to: PaymentStatus::Failed,
            ..
        }
    ));
    assert_eq!(status_of(&store, &intent).await, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_duplicate_delivery_is_a_no_op() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;

    deliver(&store, SUCCEEDED, &intent).await.expect("first delivery");
    let paid_at = store.order_by_intent(&intent).await.and_then(|o| o.paid_at);

    let outcome = deliver(&store, SUCCEEDED, &intent).await.expect("second delivery");

    assert!(matches!(outcome, ReconcileOutcome::AlreadyApplied { .. }));
    let order = store.order_by_intent(&intent).await.expect("order exists");
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.paid_at, paid_at);
}

#[tokio::test]
async fn test_late_failure_does_not_unpay_order() {
    let (store, intent) = store_with_order(IntentStatus::Succeeded).await;

    let outcome = deliver(&store, FAILED, &intent).await.expect("accepted");

    assert!(matches!(outcome, ReconcileOutcome::AlreadyApplied { .. }));
    assert_eq!(status_of(&store, &intent).await, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_success_after_failure_pays_order() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;
    deliver(&store, FAILED, &intent).await.expect("failure applied");

    let outcome = deliver(&store, SUCCEEDED, &intent).await.expect("accepted");

    assert!(matches!(
        outcome,
        ReconcileOutcome::Transitioned {
            from: PaymentStatus::Failed,
            to: PaymentStatus::Paid,
            ..
        }
    ));
    let order = store.order_by_intent(&intent).await.expect("order exists");
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.paid_at, Some(now()));
}

#[tokio::test]
async fn test_refunded_order_ignores_success() {
    let (store, intent) = store_with_order(IntentStatus::Succeeded).await;
    let order = store.order_by_intent(&intent).await.expect("order exists");
    let refunded = store
        .transition(order.id, PaymentStatus::Paid, PaymentStatus::Refunded, None)
        .await
        .expect("refund allowed");
    assert!(refunded);

    let outcome = deliver(&store, SUCCEEDED, &intent).await.expect("accepted");

    assert!(matches!(outcome, ReconcileOutcome::AlreadyApplied { .. }));
    assert_eq!(status_of(&store, &intent).await, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_concurrent_duplicates_transition_once() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;

    let (a, b) = tokio::join!(
        deliver(&store, SUCCEEDED, &intent),
        deliver(&store, SUCCEEDED, &intent),
    );

    let outcomes = [a.expect("accepted"), b.expect("accepted")];
    let transitioned = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::Transitioned { .. }))
        .count();
    assert_eq!(transitioned, 1);
    assert_eq!(status_of(&store, &intent).await, PaymentStatus::Paid);
}

// =============================================================================
// Acknowledged without action
// =============================================================================

#[tokio::test]
async fn test_unknown_intent_is_acknowledged() {
    let store = MemoryStore::new();

    let outcome = deliver(&store, SUCCEEDED, "pi_nobody").await.expect("accepted");

    assert_eq!(
        outcome,
        ReconcileOutcome::UnknownIntent {
            intent_id: "pi_nobody".to_owned()
        }
    );
}

#[tokio::test]
async fn test_other_event_types_are_ignored() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;

    let outcome = deliver(&store, "charge.refunded", &intent).await.expect("accepted");

    assert_eq!(
        outcome,
        ReconcileOutcome::Ignored {
            event_type: "charge.refunded".to_owned()
        }
    );
    assert_eq!(status_of(&store, &intent).await, PaymentStatus::Pending);
}

// =============================================================================
// Rejected deliveries
// =============================================================================

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;
    let payload = event_payload(SUCCEEDED, &intent);

    let err = reconciler(store.clone())
        .handle(&payload, None, now())
        .await
        .expect_err("unsigned");

    assert!(matches!(
        err,
        ReconcileError::InvalidSignature(WebhookError::MissingSignature)
    ));
    assert_eq!(status_of(&store, &intent).await, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;
    let header = signed(&event_payload(FAILED, &intent), now());
    let tampered = event_payload(SUCCEEDED, &intent);

    let err = reconciler(store.clone())
        .handle(&tampered, Some(&header), now())
        .await
        .expect_err("tampered");

    assert!(matches!(
        err,
        ReconcileError::InvalidSignature(WebhookError::SignatureMismatch)
    ));
    assert_eq!(status_of(&store, &intent).await, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_stale_delivery_is_rejected() {
    let (store, intent) = store_with_order(IntentStatus::Processing).await;
    let payload = event_payload(SUCCEEDED, &intent);
    let header = signed(&payload, now() - chrono::Duration::minutes(10));

    let err = reconciler(store.clone())
        .handle(&payload, Some(&header), now())
        .await
        .expect_err("stale");

    assert!(matches!(
        err,
        ReconcileError::InvalidSignature(WebhookError::TimestampOutOfTolerance)
    ));
}

#[tokio::test]
async fn test_signed_garbage_is_invalid_payload() {
    let store = MemoryStore::new();
    let payload = b"not json".to_vec();
    let header = signed(&payload, now());

    let err = reconciler(store)
        .handle(&payload, Some(&header), now())
        .await
        .expect_err("garbage");

    assert!(matches!(err, ReconcileError::InvalidPayload(_)));
}
