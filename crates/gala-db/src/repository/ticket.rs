//! # Ticket Repository
//!
//! Database operations for ticket types, orders, and sold tickets.
//!
//! Orders carry the payment reference under a UNIQUE constraint; the
//! fulfillment processor leans on that constraint (not application
//! locking) to collapse concurrent duplicate deliveries to one row.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use gala_core::types::{Order, Ticket, TicketType};

/// Repository for ticket-side database operations.
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    /// Creates a new TicketRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    // =========================================================================
    // Ticket Types
    // =========================================================================

    /// Inserts a ticket type.
    pub async fn insert_ticket_type(&self, tt: &TicketType) -> DbResult<()> {
        insert_ticket_type(&self.pool, tt).await
    }

    /// Gets a ticket type by ID.
    pub async fn get_ticket_type(&self, id: &str) -> DbResult<Option<TicketType>> {
        let tt = sqlx::query_as::<_, TicketType>(
            "SELECT * FROM ticket_types WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tt)
    }

    /// Lists the ticket types of an event.
    pub async fn list_ticket_types(&self, event_id: &str) -> DbResult<Vec<TicketType>> {
        let types = sqlx::query_as::<_, TicketType>(
            "SELECT * FROM ticket_types WHERE event_id = ?1 ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(types)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Inserts an order.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` when the payment reference (or
    ///   order number) already exists; the caller treats this as an
    ///   idempotent replay, not a failure.
    pub async fn insert_order(&self, order: &Order) -> DbResult<()> {
        insert_order(&self.pool, order).await
    }

    /// Looks up an order by its payment reference.
    pub async fn get_order_by_payment_intent(&self, reference: &str) -> DbResult<Option<Order>> {
        get_order_by_payment_intent(&self.pool, reference).await
    }

    /// Gets an order by ID.
    pub async fn get_order(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Records the resolved tracking-attribution link on an order.
    /// Post-commit side effect; the caller logs and swallows failures.
    pub async fn set_order_tracking_link(&self, order_id: &str, link_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE orders SET tracking_link_id = ?2 WHERE id = ?1")
            .bind(order_id)
            .bind(link_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        Ok(())
    }

    // =========================================================================
    // Tickets
    // =========================================================================

    /// Inserts a sold ticket.
    pub async fn insert_ticket(&self, ticket: &Ticket) -> DbResult<()> {
        insert_ticket(&self.pool, ticket).await
    }

    /// Lists the tickets of an order, oldest first.
    pub async fn list_tickets_by_order(&self, order_id: &str) -> DbResult<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE order_id = ?1 ORDER BY created_at, ticket_number",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    /// Checks a ticket in by its shareable number. Guarded on `valid`
    /// status so a second scan is rejected.
    pub async fn check_in(&self, ticket_number: &str, at: DateTime<Utc>) -> DbResult<()> {
        debug!(ticket_number = %ticket_number, "Checking in ticket");

        let result = sqlx::query(
            r#"
            UPDATE tickets SET
                status = 'used',
                checked_in_at = ?2
            WHERE ticket_number = ?1 AND status = 'valid'
            "#,
        )
        .bind(ticket_number)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Ticket (valid)", ticket_number));
        }

        Ok(())
    }

    /// Cancels a ticket. Callers releasing inventory pair this with the
    /// ledger's `release_ticket_type`; the row itself stays (cancellation
    /// is a status transition, not a deletion).
    pub async fn cancel_ticket(&self, ticket_number: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE tickets SET status = 'cancelled' \
             WHERE ticket_number = ?1 AND status != 'cancelled'",
        )
        .bind(ticket_number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Ticket", ticket_number));
        }

        Ok(())
    }

    /// Counts non-cancelled tickets a customer already holds for an
    /// event, optionally narrowed to one ticket type. Backs the
    /// per-customer purchase limit.
    pub async fn count_held_by_customer(
        &self,
        event_id: &str,
        ticket_type_id: Option<&str>,
        email: &str,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM tickets t
            JOIN orders o ON o.id = t.order_id
            WHERE t.event_id = ?1
              AND t.status != 'cancelled'
              AND o.customer_email = ?2
              AND (?3 IS NULL OR t.ticket_type_id = ?3)
            "#,
        )
        .bind(event_id)
        .bind(email)
        .bind(ticket_type_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Executor-generic operations
// =============================================================================
// The fulfillment processor writes orders and tickets inside one
// transaction together with its counter decrements.

pub async fn insert_ticket_type<'e, E>(executor: E, tt: &TicketType) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    debug!(id = %tt.id, name = %tt.name, "Inserting ticket type");

    sqlx::query(
        r#"
        INSERT INTO ticket_types (
            id, event_id, name, price_cents, total_quantity, available_quantity,
            max_per_customer, is_active, sale_starts_at, sale_ends_at,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&tt.id)
    .bind(&tt.event_id)
    .bind(&tt.name)
    .bind(tt.price_cents)
    .bind(tt.total_quantity)
    .bind(tt.available_quantity)
    .bind(tt.max_per_customer)
    .bind(tt.is_active)
    .bind(tt.sale_starts_at)
    .bind(tt.sale_ends_at)
    .bind(tt.created_at)
    .bind(tt.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_order<'e, E>(executor: E, order: &Order) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    debug!(
        id = %order.id,
        order_number = %order.order_number,
        payment_intent = %order.payment_intent_id,
        "Inserting order"
    );

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, event_id,
            customer_name, customer_email, customer_phone,
            subtotal_cents, discount_cents, tax_cents,
            platform_fee_cents, processor_fee_cents, total_cents,
            payment_intent_id, promo_code, tracking_link_id, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.event_id)
    .bind(&order.customer_name)
    .bind(&order.customer_email)
    .bind(&order.customer_phone)
    .bind(order.subtotal_cents)
    .bind(order.discount_cents)
    .bind(order.tax_cents)
    .bind(order.platform_fee_cents)
    .bind(order.processor_fee_cents)
    .bind(order.total_cents)
    .bind(&order.payment_intent_id)
    .bind(&order.promo_code)
    .bind(&order.tracking_link_id)
    .bind(order.status)
    .bind(order.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_order_by_payment_intent<'e, E>(
    executor: E,
    reference: &str,
) -> DbResult<Option<Order>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE payment_intent_id = ?1",
    )
    .bind(reference)
    .fetch_optional(executor)
    .await?;

    Ok(order)
}

pub async fn insert_ticket<'e, E>(executor: E, ticket: &Ticket) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO tickets (
            id, ticket_number, order_id, event_id, ticket_type_id,
            price_cents, status, qr_payload, checked_in_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&ticket.id)
    .bind(&ticket.ticket_number)
    .bind(&ticket.order_id)
    .bind(&ticket.event_id)
    .bind(&ticket.ticket_type_id)
    .bind(ticket.price_cents)
    .bind(ticket.status)
    .bind(&ticket.qr_payload)
    .bind(ticket.checked_in_at)
    .bind(ticket.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
