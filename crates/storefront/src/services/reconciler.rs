//! Webhook reconciliation of the order ledger.
//!
//! The gateway reports terminal payment outcomes asynchronously, possibly
//! more than once and in any order. Each delivery is verified, mapped onto
//! the payment status machine, and applied with a conditional update, so a
//! duplicate or late delivery is a no-op rather than a second write.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use shopclub_core::{OrderId, OrderNumber, PaymentEvent, PaymentStatus};

use crate::db::RepositoryError;
use crate::payments::{GatewayEvent, WebhookError, WebhookVerifier, parse_event};

/// The slice of an order the reconciler reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub payment_status: PaymentStatus,
}

/// Ledger operations the reconciler depends on.
pub trait OrderLedger: Send + Sync {
    /// The order paid by this intent, if one was persisted.
    fn find_by_payment_intent(
        &self,
        intent_id: &str,
    ) -> impl Future<Output = Result<Option<LedgerEntry>, RepositoryError>> + Send;

    /// Move an order from `from` to `to` only if it is still in `from`.
    ///
    /// Returns `false` when the order has already moved on.
    fn transition(
        &self,
        order_id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// What a verified delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The order changed status.
    Transitioned {
        order_number: OrderNumber,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    /// The order was already past this event.
    AlreadyApplied { order_number: OrderNumber },
    /// No order carries this intent; expected when checkout stopped between
    /// creating the intent and committing the order.
    UnknownIntent { intent_id: String },
    /// Not an event the ledger tracks.
    Ignored { event_type: String },
}

/// Why a delivery was not acknowledged.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid signature: {0}")]
    InvalidSignature(WebhookError),

    #[error("invalid payload: {0}")]
    InvalidPayload(WebhookError),

    #[error("ledger unavailable: {0}")]
    Storage(#[from] RepositoryError),
}

/// Applies verified gateway events to the ledger.
pub struct WebhookReconciler<L> {
    ledger: L,
    verifier: WebhookVerifier,
}

impl<L: OrderLedger> WebhookReconciler<L> {
    #[must_use]
    pub const fn new(ledger: L, verifier: WebhookVerifier) -> Self {
        Self { ledger, verifier }
    }

    /// Verify and apply one delivery.
    ///
    /// `now` is the processing time; it becomes `paid_at` on a transition
    /// into `paid`.
    ///
    /// # Errors
    ///
    /// Signature and payload problems are client errors; only
    /// [`ReconcileError::Storage`] asks the gateway to retry.
    #[tracing::instrument(skip(self, payload, signature))]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let header = signature.ok_or(ReconcileError::InvalidSignature(
            WebhookError::MissingSignature,
        ))?;
        self.verifier
            .verify(payload, header, now)
            .map_err(ReconcileError::InvalidSignature)?;

        let (intent_id, payment_event) = match parse_event(payload)
            .map_err(ReconcileError::InvalidPayload)?
        {
            GatewayEvent::PaymentSucceeded { intent_id } => (intent_id, PaymentEvent::Succeeded),
            GatewayEvent::PaymentFailed { intent_id } => (intent_id, PaymentEvent::Failed),
            GatewayEvent::Other(event_type) => {
                tracing::debug!(%event_type, "Ignoring webhook event");
                return Ok(ReconcileOutcome::Ignored { event_type });
            }
        };

        let Some(entry) = self.ledger.find_by_payment_intent(&intent_id).await? else {
            tracing::warn!(payment_intent = %intent_id, "Webhook for unknown payment intent");
            return Ok(ReconcileOutcome::UnknownIntent { intent_id });
        };

        let Some(next) = entry.payment_status.on_event(payment_event) else {
            tracing::debug!(
                order_number = %entry.order_number,
                status = %entry.payment_status,
                "Webhook already applied"
            );
            return Ok(ReconcileOutcome::AlreadyApplied {
                order_number: entry.order_number,
            });
        };

        let paid_at = (next == PaymentStatus::Paid).then_some(now);
        let applied = self
            .ledger
            .transition(entry.id, entry.payment_status, next, paid_at)
            .await?;

        if !applied {
            tracing::debug!(order_number = %entry.order_number, "Concurrent delivery won the transition");
            return Ok(ReconcileOutcome::AlreadyApplied {
                order_number: entry.order_number,
            });
        }

        tracing::info!(
            order_number = %entry.order_number,
            from = %entry.payment_status,
            to = %next,
            "Order payment status updated"
        );
        Ok(ReconcileOutcome::Transitioned {
            order_number: entry.order_number,
            from: entry.payment_status,
            to: next,
        })
    }
}
