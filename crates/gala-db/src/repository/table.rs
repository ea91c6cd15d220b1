//! # Table Repository
//!
//! Database operations for section templates, event table sections, and
//! table bookings.
//!
//! Booking status changes are guarded UPDATEs: the WHERE clause pins the
//! expected current status, so a concurrent transition loses cleanly
//! (zero rows affected) instead of clobbering.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use gala_core::booking::BookingStatus;
use gala_core::types::{
    CapacityPolicy, EventTableSection, TableBooking, TableSectionTemplate,
};

/// Repository for table-side database operations.
#[derive(Debug, Clone)]
pub struct TableRepository {
    pool: SqlitePool,
}

const SECTION_COLUMNS: &str = "id, event_id, template_id, name, price_cents, total_tables, \
     closed_tables, linked_table_pairs, available_tables, capacity_policy, \
     max_per_customer, min_spend_cents, is_active, created_at, updated_at";

impl TableRepository {
    /// Creates a new TableRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TableRepository { pool }
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// Inserts a business-level section template.
    pub async fn insert_template(&self, template: &TableSectionTemplate) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO table_section_templates (
                id, business_id, name, price_cents, total_tables,
                max_per_customer, min_spend_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&template.id)
        .bind(&template.business_id)
        .bind(&template.name)
        .bind(template.price_cents)
        .bind(template.total_tables)
        .bind(template.max_per_customer)
        .bind(template.min_spend_cents)
        .bind(template.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists a business's section templates.
    pub async fn list_templates(&self, business_id: &str) -> DbResult<Vec<TableSectionTemplate>> {
        let templates = sqlx::query_as::<_, TableSectionTemplate>(
            "SELECT * FROM table_section_templates WHERE business_id = ?1 ORDER BY name",
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(templates)
    }

    // =========================================================================
    // Sections
    // =========================================================================

    /// Inserts an event table section.
    pub async fn insert_section(&self, section: &EventTableSection) -> DbResult<()> {
        debug!(id = %section.id, name = %section.name, "Inserting section");

        sqlx::query(
            r#"
            INSERT INTO event_table_sections (
                id, event_id, template_id, name, price_cents, total_tables,
                closed_tables, linked_table_pairs, available_tables,
                capacity_policy, max_per_customer, min_spend_cents, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&section.id)
        .bind(&section.event_id)
        .bind(&section.template_id)
        .bind(&section.name)
        .bind(section.price_cents)
        .bind(section.total_tables)
        .bind(encode_json(&section.closed_tables)?)
        .bind(encode_json(&section.linked_table_pairs)?)
        .bind(section.available_tables)
        .bind(section.capacity_policy)
        .bind(section.max_per_customer)
        .bind(section.min_spend_cents)
        .bind(section.is_active)
        .bind(section.created_at)
        .bind(section.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a section by ID.
    pub async fn get_section(&self, id: &str) -> DbResult<Option<EventTableSection>> {
        let row = sqlx::query(&format!(
            "SELECT {SECTION_COLUMNS} FROM event_table_sections WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(section_from_row).transpose()
    }

    /// Gets a section by ID, erroring when absent.
    pub async fn require_section(&self, id: &str) -> DbResult<EventTableSection> {
        self.get_section(id)
            .await?
            .ok_or_else(|| DbError::not_found("Table section", id))
    }

    /// Lists the sections of an event.
    pub async fn list_sections(&self, event_id: &str) -> DbResult<Vec<EventTableSection>> {
        let rows = sqlx::query(&format!(
            "SELECT {SECTION_COLUMNS} FROM event_table_sections \
             WHERE event_id = ?1 ORDER BY created_at"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(section_from_row).collect()
    }

    /// Replaces a section's closures and linked pairs, then reconciles
    /// the persisted counter against the new effective capacity and the
    /// current occupancy, all in one transaction.
    pub async fn update_section_layout(
        &self,
        section_id: &str,
        closed_tables: &[String],
        linked_table_pairs: &[(String, String)],
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let occupying = count_occupying(&mut *tx, section_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE event_table_sections SET
                closed_tables = ?2,
                linked_table_pairs = ?3,
                available_tables = MAX(
                    0,
                    total_tables - ?4 - ?5 - ?6
                ),
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(section_id)
        .bind(encode_json(&closed_tables)?)
        .bind(encode_json(&linked_table_pairs)?)
        .bind(closed_tables.len() as i64)
        .bind(linked_table_pairs.len() as i64)
        .bind(occupying)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Table section", section_id));
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Bookings
    // =========================================================================

    /// Inserts a table booking.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` when the booking carries a
    ///   table number already held by a live booking in the section.
    pub async fn insert_booking(&self, booking: &TableBooking) -> DbResult<()> {
        insert_booking(&self.pool, booking).await
    }

    /// Gets a booking by ID.
    pub async fn get_booking(&self, id: &str) -> DbResult<Option<TableBooking>> {
        let booking = sqlx::query_as::<_, TableBooking>(
            "SELECT * FROM table_bookings WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// Gets a booking by ID, erroring when absent.
    pub async fn require_booking(&self, id: &str) -> DbResult<TableBooking> {
        self.get_booking(id)
            .await?
            .ok_or_else(|| DbError::not_found("Table booking", id))
    }

    /// Lists the bookings created under one payment reference.
    pub async fn list_bookings_by_order(&self, order_id: &str) -> DbResult<Vec<TableBooking>> {
        let bookings = sqlx::query_as::<_, TableBooking>(
            "SELECT * FROM table_bookings WHERE order_id = ?1 ORDER BY created_at, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    /// Lists the bookings of a section, newest first.
    pub async fn list_bookings_by_section(&self, section_id: &str) -> DbResult<Vec<TableBooking>> {
        let bookings = sqlx::query_as::<_, TableBooking>(
            "SELECT * FROM table_bookings WHERE section_id = ?1 ORDER BY created_at DESC",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    /// Moves a booking from an expected status to the next one, with an
    /// optional table assignment in the same statement.
    ///
    /// The WHERE clause pins the expected current status; zero rows
    /// affected means a concurrent writer got there first (or the
    /// booking is gone) and the caller's view was stale.
    pub async fn transition_booking(
        &self,
        booking_id: &str,
        from: BookingStatus,
        to: BookingStatus,
        table_number: Option<&str>,
    ) -> DbResult<()> {
        debug!(booking_id = %booking_id, from = %from, to = %to, "Booking transition");

        let result = sqlx::query(
            r#"
            UPDATE table_bookings SET
                status = ?3,
                table_number = COALESCE(?4, table_number),
                updated_at = ?5
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(booking_id)
        .bind(from)
        .bind(to)
        .bind(table_number)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Table booking (in expected status)", booking_id));
        }

        Ok(())
    }

    /// Completes a booking, archiving the table number actually used
    /// into `completed_table_number`.
    pub async fn complete_booking(
        &self,
        booking_id: &str,
        from: BookingStatus,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE table_bookings SET
                status = 'completed',
                completed_table_number = table_number,
                updated_at = ?3
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(booking_id)
        .bind(from)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Table booking (in expected status)", booking_id));
        }

        Ok(())
    }

    /// Cancels a booking, recording any refund on its cumulative trail.
    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        from: BookingStatus,
        refund_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE table_bookings SET
                status = 'cancelled',
                refunded_cents = refunded_cents + ?3,
                updated_at = ?4
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(booking_id)
        .bind(from)
        .bind(refund_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Table booking (in expected status)", booking_id));
        }

        Ok(())
    }

    /// Counts the bookings occupying a table in a section.
    pub async fn count_occupying(&self, section_id: &str) -> DbResult<i64> {
        count_occupying(&self.pool, section_id).await
    }
}

// =============================================================================
// Executor-generic operations
// =============================================================================

pub async fn insert_booking<'e, E>(executor: E, booking: &TableBooking) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    debug!(
        id = %booking.id,
        section_id = %booking.section_id,
        status = %booking.status,
        "Inserting booking"
    );

    sqlx::query(
        r#"
        INSERT INTO table_bookings (
            id, section_id, event_id, order_id,
            table_number, completed_table_number,
            customer_name, customer_email, customer_phone, party_size,
            amount_cents, tax_cents, refunded_cents, status, notes,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(&booking.id)
    .bind(&booking.section_id)
    .bind(&booking.event_id)
    .bind(&booking.order_id)
    .bind(&booking.table_number)
    .bind(&booking.completed_table_number)
    .bind(&booking.customer_name)
    .bind(&booking.customer_email)
    .bind(&booking.customer_phone)
    .bind(booking.party_size)
    .bind(booking.amount_cents)
    .bind(booking.tax_cents)
    .bind(booking.refunded_cents)
    .bind(booking.status)
    .bind(&booking.notes)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Occupying = non-cancelled, non-completed bookings holding a table.
pub async fn count_occupying<'e, E>(executor: E, section_id: &str) -> DbResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM table_bookings
        WHERE section_id = ?1
          AND status NOT IN ('cancelled', 'completed')
          AND table_number IS NOT NULL
        "#,
    )
    .bind(section_id)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

// =============================================================================
// Row Mapping & Construction
// =============================================================================

fn encode_json<T: serde::Serialize>(value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::Internal(format!("json encode: {e}")))
}

fn section_from_row(row: SqliteRow) -> DbResult<EventTableSection> {
    let id: String = row.try_get("id")?;

    let closed_json: String = row.try_get("closed_tables")?;
    let closed_tables: Vec<String> = serde_json::from_str(&closed_json)
        .map_err(|e| DbError::corrupt_column("Table section", &id, "closed_tables", e))?;

    let pairs_json: String = row.try_get("linked_table_pairs")?;
    let linked_table_pairs: Vec<(String, String)> = serde_json::from_str(&pairs_json)
        .map_err(|e| DbError::corrupt_column("Table section", &id, "linked_table_pairs", e))?;

    Ok(EventTableSection {
        event_id: row.try_get("event_id")?,
        template_id: row.try_get("template_id")?,
        name: row.try_get("name")?,
        price_cents: row.try_get("price_cents")?,
        total_tables: row.try_get("total_tables")?,
        closed_tables,
        linked_table_pairs,
        available_tables: row.try_get("available_tables")?,
        capacity_policy: row.try_get::<CapacityPolicy, _>("capacity_policy")?,
        max_per_customer: row.try_get("max_per_customer")?,
        min_spend_cents: row.try_get("min_spend_cents")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        id,
    })
}

/// Derives an event section from a business-level template.
///
/// Paid templates get the `Enforced` capacity policy (the persisted
/// counter is authoritative); free templates get `Advisory` (derived
/// live, requests may overflow for staff triage).
pub fn derive_section_from_template(
    template: &TableSectionTemplate,
    event_id: &str,
) -> EventTableSection {
    let now = Utc::now();
    let capacity_policy = if template.price_cents > 0 {
        CapacityPolicy::Enforced
    } else {
        CapacityPolicy::Advisory
    };

    EventTableSection {
        id: Uuid::new_v4().to_string(),
        event_id: event_id.to_string(),
        template_id: Some(template.id.clone()),
        name: template.name.clone(),
        price_cents: template.price_cents,
        total_tables: template.total_tables,
        closed_tables: Vec::new(),
        linked_table_pairs: Vec::new(),
        available_tables: template.total_tables,
        capacity_policy,
        max_per_customer: template.max_per_customer,
        min_spend_cents: template.min_spend_cents,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::event::new_event;
    use chrono::NaiveDate;

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO businesses (id, name, created_at, updated_at) VALUES ('biz-1', 'Venue', ?1, ?1)",
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let mut event = new_event("biz-1", "Show", NaiveDate::from_ymd_opt(2026, 9, 4).unwrap());
        event.id = "ev-1".to_string();
        db.events().insert(&event).await.unwrap();
        db
    }

    fn template(price_cents: i64) -> TableSectionTemplate {
        TableSectionTemplate {
            id: Uuid::new_v4().to_string(),
            business_id: "biz-1".to_string(),
            name: "VIP".to_string(),
            price_cents,
            total_tables: 10,
            max_per_customer: 2,
            min_spend_cents: 0,
            created_at: Utc::now(),
        }
    }

    fn booking(section_id: &str, table: Option<&str>, status: BookingStatus) -> TableBooking {
        let now = Utc::now();
        TableBooking {
            id: Uuid::new_v4().to_string(),
            section_id: section_id.to_string(),
            event_id: "ev-1".to_string(),
            order_id: None,
            table_number: table.map(str::to_string),
            completed_table_number: None,
            customer_name: "Ada".to_string(),
            customer_email: None,
            customer_phone: None,
            party_size: 4,
            amount_cents: 0,
            tax_cents: 0,
            refunded_cents: 0,
            status,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_template_derivation_sets_capacity_policy() {
        let paid = derive_section_from_template(&template(10_000), "ev-1");
        assert_eq!(paid.capacity_policy, CapacityPolicy::Enforced);
        assert_eq!(paid.available_tables, 10);

        let free = derive_section_from_template(&template(0), "ev-1");
        assert_eq!(free.capacity_policy, CapacityPolicy::Advisory);
    }

    #[tokio::test]
    async fn test_section_json_round_trip() {
        let db = test_db().await;
        let tables = db.tables();

        let mut section = derive_section_from_template(&template(10_000), "ev-1");
        section.closed_tables = vec!["T7".to_string()];
        section.linked_table_pairs = vec![("T1".to_string(), "T2".to_string())];
        tables.insert_section(&section).await.unwrap();

        let loaded = tables.require_section(&section.id).await.unwrap();
        assert_eq!(loaded.closed_tables, vec!["T7".to_string()]);
        assert_eq!(
            loaded.linked_table_pairs,
            vec![("T1".to_string(), "T2".to_string())]
        );
        assert_eq!(loaded.effective_capacity(), 8);
    }

    #[tokio::test]
    async fn test_two_live_bookings_cannot_hold_one_table() {
        let db = test_db().await;
        let tables = db.tables();

        let section = derive_section_from_template(&template(10_000), "ev-1");
        tables.insert_section(&section).await.unwrap();

        tables
            .insert_booking(&booking(&section.id, Some("T1"), BookingStatus::Confirmed))
            .await
            .unwrap();

        let err = tables
            .insert_booking(&booking(&section.id, Some("T1"), BookingStatus::Confirmed))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // A cancelled booking releases the table name.
        let third = booking(&section.id, Some("T2"), BookingStatus::Confirmed);
        tables.insert_booking(&third).await.unwrap();
        tables
            .cancel_booking(&third.id, BookingStatus::Confirmed, 0)
            .await
            .unwrap();
        tables
            .insert_booking(&booking(&section.id, Some("T2"), BookingStatus::Confirmed))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_guarded_transition_rejects_stale_status() {
        let db = test_db().await;
        let tables = db.tables();

        let section = derive_section_from_template(&template(0), "ev-1");
        tables.insert_section(&section).await.unwrap();

        let b = booking(&section.id, None, BookingStatus::Requested);
        tables.insert_booking(&b).await.unwrap();

        tables
            .transition_booking(&b.id, BookingStatus::Requested, BookingStatus::Approved, None)
            .await
            .unwrap();

        // Stale expectation: the booking is no longer 'requested'.
        assert!(tables
            .transition_booking(&b.id, BookingStatus::Requested, BookingStatus::Approved, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_complete_archives_table_number() {
        let db = test_db().await;
        let tables = db.tables();

        let section = derive_section_from_template(&template(10_000), "ev-1");
        tables.insert_section(&section).await.unwrap();

        let b = booking(&section.id, Some("T5"), BookingStatus::Seated);
        tables.insert_booking(&b).await.unwrap();

        tables.complete_booking(&b.id, BookingStatus::Seated).await.unwrap();

        let done = tables.require_booking(&b.id).await.unwrap();
        assert_eq!(done.status, BookingStatus::Completed);
        assert_eq!(done.completed_table_number.as_deref(), Some("T5"));
        // Completed bookings stop occupying.
        assert_eq!(tables.count_occupying(&section.id).await.unwrap(), 0);
    }
}
