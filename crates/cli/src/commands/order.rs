//! Order management commands.
//!
//! Refunds are issued in the payment dashboard; `refund` only records the
//! outcome on the order, and only for orders that are currently paid.

use shopclub_core::OrderNumber;
use shopclub_storefront::db::{OrderRepository, RepositoryError};

use super::{CommandError, connect};

/// Mark a paid order as refunded.
///
/// # Errors
///
/// Returns an error if the order does not exist, is not paid, or changed
/// status while the command ran.
pub async fn refund(order_number: &str) -> Result<(), CommandError> {
    let number = OrderNumber::parse(order_number)?;
    let pool = connect().await?;
    let orders = OrderRepository::new(&pool);

    let order = orders
        .find_by_number(&number)
        .await?
        .ok_or_else(|| CommandError::OrderNotFound(number.to_string()))?;

    let Some(next) = order.payment_status.on_refund() else {
        return Err(CommandError::RefundNotAllowed {
            order_number: number.to_string(),
            status: order.payment_status,
        });
    };

    if !orders
        .transition(order.id, order.payment_status, next, None)
        .await?
    {
        return Err(CommandError::ConcurrentUpdate(number.to_string()));
    }

    tracing::info!(
        order_number = %number,
        from = %order.payment_status,
        to = %next,
        "Order refunded"
    );
    Ok(())
}

/// Replace an order's internal admin notes.
///
/// # Errors
///
/// Returns an error if the order does not exist.
pub async fn note(order_number: &str, text: &str) -> Result<(), CommandError> {
    let number = OrderNumber::parse(order_number)?;
    let pool = connect().await?;

    OrderRepository::new(&pool)
        .set_admin_notes(&number, text.trim())
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                CommandError::OrderNotFound(number.to_string())
            }
            other => other.into(),
        })?;

    tracing::info!(order_number = %number, "Admin notes updated");
    Ok(())
}
