//! # Inventory Ledger
//!
//! Derives live availability for ticket types and table sections, and
//! performs the atomic decrement/increment when inventory is consumed
//! or released.
//!
//! ## Two Allocation Models
//! ```text
//! Ticket types / paid sections (Enforced policy)
//!   persisted counter, decremented at commit time by a single
//!   conditional UPDATE:
//!       available = available - n  WHERE available >= n
//!   Zero rows affected means the inventory was short; the caller
//!   re-reads availability to report the exact shortfall.
//!
//! Free sections (Advisory policy)
//!   availability is derived at read time:
//!       effective = total - |closed| - |linked pairs|
//!       available = max(0, effective - occupying)
//!   Requests are never capacity-blocked; staff triage overflow.
//! ```
//!
//! Decide-and-decrement is one statement, never read-then-write from
//! application code; two concurrent checkouts for the last unit cannot
//! both win.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::table::count_occupying;
use gala_core::types::EventTableSection;

// =============================================================================
// Outcomes
// =============================================================================

/// The result of a conditional inventory reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The counter was decremented by the requested quantity.
    Granted,
    /// The counter held fewer than requested; nothing changed.
    Short { available: i64 },
}

impl Reservation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Reservation::Granted)
    }
}

/// What kind of revenue an event carries, if any. Gates every
/// destructive series operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoldState {
    /// At least one non-cancelled ticket exists.
    pub ticket_sales: bool,
    /// At least one non-cancelled table booking exists.
    pub table_bookings: bool,
}

impl SoldState {
    pub fn any(&self) -> bool {
        self.ticket_sales || self.table_bookings
    }
}

/// Read-time check-in aggregate for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TicketScanStats {
    pub total: i64,
    pub scanned: i64,
    pub unscanned: i64,
}

// =============================================================================
// Ledger
// =============================================================================

/// The inventory ledger. The only component allowed to mutate counters
/// under contention.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
}

impl InventoryLedger {
    /// Creates a new InventoryLedger.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryLedger { pool }
    }

    /// Atomically reserves `quantity` units of a ticket type.
    pub async fn reserve_ticket_type(&self, id: &str, quantity: i64) -> DbResult<Reservation> {
        let mut conn = self.pool.acquire().await?;
        reserve_ticket_type(&mut conn, id, quantity).await
    }

    /// Atomically reserves `quantity` units of an event's legacy
    /// admission counter (events without ticket types).
    pub async fn reserve_event_tickets(
        &self,
        event_id: &str,
        quantity: i64,
    ) -> DbResult<Reservation> {
        let mut conn = self.pool.acquire().await?;
        reserve_event_tickets(&mut conn, event_id, quantity).await
    }

    /// Atomically reserves `quantity` tables in a capacity-enforced
    /// section.
    pub async fn reserve_tables(&self, section_id: &str, quantity: i64) -> DbResult<Reservation> {
        let mut conn = self.pool.acquire().await?;
        reserve_tables(&mut conn, section_id, quantity).await
    }

    /// Releases ticket-type inventory (cancellation, refund). Clamped
    /// at the total so the counter invariant holds.
    pub async fn release_ticket_type(&self, id: &str, quantity: i64) -> DbResult<()> {
        debug!(id = %id, quantity = %quantity, "Releasing ticket type inventory");

        sqlx::query(
            "UPDATE ticket_types SET \
                 available_quantity = MIN(total_quantity, available_quantity + ?2) \
             WHERE id = ?1",
        )
        .bind(id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Releases table inventory in a capacity-enforced section.
    pub async fn release_tables(&self, section_id: &str, quantity: i64) -> DbResult<()> {
        debug!(section_id = %section_id, quantity = %quantity, "Releasing table inventory");

        sqlx::query(
            "UPDATE event_table_sections SET \
                 available_tables = MIN(total_tables, available_tables + ?2) \
             WHERE id = ?1",
        )
        .bind(section_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Derives a section's live availability from closures, linked
    /// pairs, and occupying bookings.
    ///
    /// This is the display figure for every section, and the only
    /// figure for `Advisory` (free) sections. `Enforced` sections
    /// settle against their persisted counter instead.
    pub async fn section_availability(&self, section: &EventTableSection) -> DbResult<i64> {
        let occupying = count_occupying(&self.pool, &section.id).await?;
        Ok((section.effective_capacity() - occupying).max(0))
    }

    /// Whether an event carries revenue: ≥1 non-cancelled ticket or
    /// ≥1 non-cancelled table booking.
    pub async fn has_been_sold(&self, event_id: &str) -> DbResult<SoldState> {
        let mut conn = self.pool.acquire().await?;
        has_been_sold(&mut conn, event_id).await
    }

    /// Scanned/unscanned counts for an event, derived from ticket
    /// check-in timestamps at read time.
    pub async fn event_ticket_stats(&self, event_id: &str) -> DbResult<TicketScanStats> {
        let (total, scanned): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(checked_in_at)
            FROM tickets
            WHERE event_id = ?1 AND status != 'cancelled'
            "#,
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(TicketScanStats {
            total,
            scanned,
            unscanned: total - scanned,
        })
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================
// The fulfillment processor and the recurrence lifecycle call these on
// their own transaction connections, so a short reservation rolls back
// together with everything else in the transaction.

pub async fn reserve_ticket_type(
    conn: &mut SqliteConnection,
    id: &str,
    quantity: i64,
) -> DbResult<Reservation> {
    let result = sqlx::query(
        r#"
        UPDATE ticket_types SET
            available_quantity = available_quantity - ?2
        WHERE id = ?1
          AND is_active = 1
          AND available_quantity >= ?2
        "#,
    )
    .bind(id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        debug!(id = %id, quantity = %quantity, "Ticket type inventory reserved");
        return Ok(Reservation::Granted);
    }

    let available: i64 =
        sqlx::query_scalar("SELECT available_quantity FROM ticket_types WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(0);

    Ok(Reservation::Short { available })
}

pub async fn reserve_event_tickets(
    conn: &mut SqliteConnection,
    event_id: &str,
    quantity: i64,
) -> DbResult<Reservation> {
    let result = sqlx::query(
        r#"
        UPDATE events SET
            available_tickets = available_tickets - ?2
        WHERE id = ?1
          AND available_tickets >= ?2
        "#,
    )
    .bind(event_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(Reservation::Granted);
    }

    let available: i64 =
        sqlx::query_scalar("SELECT available_tickets FROM events WHERE id = ?1")
            .bind(event_id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(0);

    Ok(Reservation::Short { available })
}

pub async fn reserve_tables(
    conn: &mut SqliteConnection,
    section_id: &str,
    quantity: i64,
) -> DbResult<Reservation> {
    let result = sqlx::query(
        r#"
        UPDATE event_table_sections SET
            available_tables = available_tables - ?2
        WHERE id = ?1
          AND is_active = 1
          AND capacity_policy = 'enforced'
          AND available_tables >= ?2
        "#,
    )
    .bind(section_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        debug!(section_id = %section_id, quantity = %quantity, "Table inventory reserved");
        return Ok(Reservation::Granted);
    }

    let available: i64 =
        sqlx::query_scalar("SELECT available_tables FROM event_table_sections WHERE id = ?1")
            .bind(section_id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(0);

    Ok(Reservation::Short { available })
}

pub async fn has_been_sold(conn: &mut SqliteConnection, event_id: &str) -> DbResult<SoldState> {
    let tickets: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tickets WHERE event_id = ?1 AND status != 'cancelled'",
    )
    .bind(event_id)
    .fetch_one(&mut *conn)
    .await?;

    let bookings: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM table_bookings WHERE event_id = ?1 AND status != 'cancelled'",
    )
    .bind(event_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(SoldState {
        ticket_sales: tickets > 0,
        table_bookings: bookings > 0,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
