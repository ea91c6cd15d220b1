//! # Event Repository
//!
//! Database operations for events and recurring-series membership.
//!
//! A series is a flat set of rows sharing one `series_root_id`, each
//! tagged with a role (`root`, `instance`, `detached`, `standalone`).
//! Generation, propagation, and deletion are set operations over that
//! key; nothing walks a tree.

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use gala_core::recurrence::RecurrenceRule;
use gala_core::types::{Event, EventStatus, SeriesRole};

/// Non-date, non-capacity fields pushed to every series member by an
/// "all events in series" edit. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SeriesPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<String>,
    pub status: Option<EventStatus>,
}

/// Repository for event database operations.
#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

const EVENT_COLUMNS: &str = "id, business_id, title, description, event_date, start_time, \
     status, series_root_id, series_role, recurrence_rule, \
     total_tickets, available_tickets, created_at, updated_at";

impl EventRepository {
    /// Creates a new EventRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EventRepository { pool }
    }

    /// Inserts an event row.
    pub async fn insert(&self, event: &Event) -> DbResult<()> {
        insert_event(&self.pool, event).await
    }

    /// Gets an event by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Event>> {
        fetch_event(&self.pool, id).await
    }

    /// Gets an event by ID, erroring when absent.
    pub async fn require(&self, id: &str) -> DbResult<Event> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Event", id))
    }

    /// Updates the mutable fields of a single event row.
    pub async fn update(&self, event: &Event) -> DbResult<()> {
        let now = Utc::now();
        let rule_json = encode_rule(event.recurrence_rule.as_ref())?;

        let result = sqlx::query(
            r#"
            UPDATE events SET
                title = ?2,
                description = ?3,
                event_date = ?4,
                start_time = ?5,
                status = ?6,
                series_root_id = ?7,
                series_role = ?8,
                recurrence_rule = ?9,
                total_tickets = ?10,
                available_tickets = ?11,
                updated_at = ?12
            WHERE id = ?1
            "#,
        )
        .bind(&event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.event_date)
        .bind(&event.start_time)
        .bind(event.status)
        .bind(&event.series_root_id)
        .bind(event.series_role)
        .bind(rule_json)
        .bind(event.total_tickets)
        .bind(event.available_tickets)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Event", &event.id));
        }

        Ok(())
    }

    /// Lists the generated instances attached to a series root, ordered
    /// by date.
    pub async fn list_instances(&self, root_id: &str) -> DbResult<Vec<Event>> {
        list_instances(&self.pool, root_id).await
    }

    /// Pushes non-date, non-capacity fields to the root and every
    /// attached instance of a series. Each member keeps its own
    /// date/time/capacity.
    pub async fn propagate_series_fields(
        &self,
        root_id: &str,
        patch: &SeriesPatch,
    ) -> DbResult<u64> {
        let now = Utc::now();

        debug!(root_id = %root_id, "Propagating series fields");

        let result = sqlx::query(
            r#"
            UPDATE events SET
                title = COALESCE(?2, title),
                description = COALESCE(?3, description),
                start_time = COALESCE(?4, start_time),
                status = COALESCE(?5, status),
                updated_at = ?6
            WHERE id = ?1
               OR (series_root_id = ?1 AND series_role = 'instance')
            "#,
        )
        .bind(root_id)
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(&patch.start_time)
        .bind(patch.status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Replaces (or clears) a root's recurrence rule.
    pub async fn set_recurrence_rule(
        &self,
        root_id: &str,
        rule: Option<&RecurrenceRule>,
    ) -> DbResult<()> {
        set_recurrence_rule(&self.pool, root_id, rule).await
    }

    /// Detaches an event from its series, leaving it as a standalone
    /// row that keeps its sales history.
    pub async fn detach(&self, id: &str) -> DbResult<()> {
        detach_event(&self.pool, id).await
    }

    /// Hard-deletes an event together with its owned relational
    /// children. Callers gate this on the sold/booked predicate.
    pub async fn hard_delete(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        hard_delete_event(&mut *conn, id).await
    }
}

// =============================================================================
// Executor-generic operations
// =============================================================================
// The recurrence lifecycle runs deletion partitions inside a single
// transaction; these functions accept any executor so they work both on
// the pool and on a transaction connection.

pub async fn insert_event<'e, E>(executor: E, event: &Event) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    debug!(id = %event.id, title = %event.title, "Inserting event");

    let rule_json = encode_rule(event.recurrence_rule.as_ref())?;

    sqlx::query(
        r#"
        INSERT INTO events (
            id, business_id, title, description, event_date, start_time,
            status, series_root_id, series_role, recurrence_rule,
            total_tickets, available_tickets, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&event.id)
    .bind(&event.business_id)
    .bind(&event.title)
    .bind(&event.description)
    .bind(event.event_date)
    .bind(&event.start_time)
    .bind(event.status)
    .bind(&event.series_root_id)
    .bind(event.series_role)
    .bind(rule_json)
    .bind(event.total_tickets)
    .bind(event.available_tickets)
    .bind(event.created_at)
    .bind(event.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn fetch_event<'e, E>(executor: E, id: &str) -> DbResult<Option<Event>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.map(event_from_row).transpose()
}

pub async fn list_instances<'e, E>(executor: E, root_id: &str) -> DbResult<Vec<Event>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM events \
         WHERE series_root_id = ?1 AND series_role = 'instance' \
         ORDER BY event_date"
    ))
    .bind(root_id)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(event_from_row).collect()
}

pub async fn detach_event<'e, E>(executor: E, id: &str) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    debug!(id = %id, "Detaching event from series");

    let result = sqlx::query(
        r#"
        UPDATE events SET
            series_root_id = NULL,
            recurrence_rule = NULL,
            series_role = 'detached',
            updated_at = ?2
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Event", id));
    }

    Ok(())
}

pub async fn set_recurrence_rule<'e, E>(
    executor: E,
    root_id: &str,
    rule: Option<&RecurrenceRule>,
) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rule_json = encode_rule(rule)?;

    let result = sqlx::query(
        "UPDATE events SET recurrence_rule = ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(root_id)
    .bind(rule_json)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Event", root_id));
    }

    Ok(())
}

/// Demotes a sold series root to a standalone event: the rule is
/// cleared and the role tag drops to `standalone`. Its detached former
/// instances live on independently.
pub async fn demote_root<'e, E>(executor: E, root_id: &str) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    debug!(id = %root_id, "Demoting series root to standalone");

    let result = sqlx::query(
        r#"
        UPDATE events SET
            recurrence_rule = NULL,
            series_role = 'standalone',
            updated_at = ?2
        WHERE id = ?1
        "#,
    )
    .bind(root_id)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Event", root_id));
    }

    Ok(())
}

/// Deletes an event and its owned children. Ticket types and sections
/// cascade; any remaining ticket/order/booking rows are removed
/// explicitly (the sold/booked gate guarantees they are all cancelled
/// by the time this runs).
pub async fn hard_delete_event(
    conn: &mut sqlx::SqliteConnection,
    id: &str,
) -> DbResult<()> {
    debug!(id = %id, "Hard-deleting event");

    sqlx::query("DELETE FROM tickets WHERE event_id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM orders WHERE event_id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM table_bookings WHERE event_id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM events WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Event", id));
    }

    Ok(())
}

// =============================================================================
// Row Mapping
// =============================================================================

fn encode_rule(rule: Option<&RecurrenceRule>) -> DbResult<Option<String>> {
    rule.map(|r| serde_json::to_string(r))
        .transpose()
        .map_err(|e| DbError::Internal(format!("recurrence rule encode: {e}")))
}

fn event_from_row(row: SqliteRow) -> DbResult<Event> {
    let id: String = row.try_get("id")?;

    let rule_json: Option<String> = row.try_get("recurrence_rule")?;
    let recurrence_rule = rule_json
        .as_deref()
        .map(serde_json::from_str::<RecurrenceRule>)
        .transpose()
        .map_err(|e| DbError::corrupt_column("Event", &id, "recurrence_rule", e))?;

    Ok(Event {
        business_id: row.try_get("business_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        event_date: row.try_get::<NaiveDate, _>("event_date")?,
        start_time: row.try_get("start_time")?,
        status: row.try_get::<EventStatus, _>("status")?,
        series_root_id: row.try_get("series_root_id")?,
        series_role: row.try_get::<SeriesRole, _>("series_role")?,
        recurrence_rule,
        total_tickets: row.try_get("total_tickets")?,
        available_tickets: row.try_get("available_tickets")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        id,
    })
}

// =============================================================================
// Helpers
// =============================================================================

/// Builds a fresh standalone event with sensible defaults.
pub fn new_event(business_id: &str, title: &str, event_date: NaiveDate) -> Event {
    let now = Utc::now();
    Event {
        id: uuid::Uuid::new_v4().to_string(),
        business_id: business_id.to_string(),
        title: title.to_string(),
        description: None,
        event_date,
        start_time: None,
        status: EventStatus::Draft,
        series_root_id: None,
        series_role: SeriesRole::Standalone,
        recurrence_rule: None,
        total_tickets: 0,
        available_tickets: 0,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
