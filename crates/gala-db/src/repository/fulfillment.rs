//! # Fulfillment Record Repository
//!
//! One row per fulfilled payment reference, for both cart kinds. The
//! primary key on `payment_intent_id` is the uniqueness constraint that
//! collapses concurrent duplicate fulfillments: the processor inserts
//! this row first inside its transaction, and the loser of a race gets
//! a unique violation instead of double-materializing.

use chrono::Utc;
use sqlx::{Executor, Sqlite};

use crate::error::DbResult;

/// Records a fulfillment for a payment reference.
///
/// ## Returns
/// * `Err(DbError::UniqueViolation)` when the reference was already
///   fulfilled; the caller returns the prior result unchanged.
pub async fn record_fulfillment<'e, E>(
    executor: E,
    payment_intent_id: &str,
    cart_kind: &str,
) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO fulfillments (payment_intent_id, cart_kind, created_at) VALUES (?1, ?2, ?3)",
    )
    .bind(payment_intent_id)
    .bind(cart_kind)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}

/// Looks up the cart kind recorded for a payment reference, if any.
pub async fn find_fulfillment<'e, E>(
    executor: E,
    payment_intent_id: &str,
) -> DbResult<Option<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let kind: Option<String> = sqlx::query_scalar(
        "SELECT cart_kind FROM fulfillments WHERE payment_intent_id = ?1",
    )
    .bind(payment_intent_id)
    .fetch_optional(executor)
    .await?;

    Ok(kind)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_reference_fulfills_at_most_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        record_fulfillment(db.pool(), "pi_once", "ticket_cart").await.unwrap();

        let err = record_fulfillment(db.pool(), "pi_once", "ticket_cart")
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        let kind = find_fulfillment(db.pool(), "pi_once").await.unwrap();
        assert_eq!(kind.as_deref(), Some("ticket_cart"));
        assert!(find_fulfillment(db.pool(), "pi_other").await.unwrap().is_none());
    }
}
