//! # Recurrence Lifecycle Manager
//!
//! Creates, edits, and deletes the instances of a repeating event
//! series. Every destructive action is gated on the inventory ledger's
//! sold/booked predicate: revenue-carrying instances are never deleted,
//! only detached.
//!
//! ## Deletion
//! ```text
//! delete(event, mode)
//!     │
//!     ├─ single, plain event ──► sold? reject : hard-delete
//!     │
//!     ├─ future, instance ─────► partition members with date ≥ target:
//!     │                            unsold → hard-delete (with children)
//!     │                            sold   → detach, keep standalone
//!     │                          then shrink or clear the root's rule
//!     │
//!     └─ series root ──────────► same partition over all instances;
//!                                root deleted only if itself unsold,
//!                                else its rule is cleared
//! ```
//!
//! The whole partition runs inside one transaction, and `has_been_sold`
//! is re-checked immediately before each hard delete, so a booking
//! landing mid-deletion cannot be destroyed.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use gala_core::error::CoreError;
use gala_core::recurrence::occurrences;
use gala_core::types::{Event, SeriesRole, TicketType};
use gala_db::ledger::has_been_sold;
use gala_db::repository::event::{
    demote_root, detach_event, fetch_event, hard_delete_event, insert_event, list_instances,
    set_recurrence_rule, SeriesPatch,
};
use gala_db::repository::ticket::insert_ticket_type;
use gala_db::{Database, DbError};

use crate::error::EngineResult;

// =============================================================================
// Summaries
// =============================================================================

/// What a deletion did: counts plus a human-readable message. A series
/// with mixed sold/unsold members is a success-with-skips, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionSummary {
    pub deleted: usize,
    pub skipped: usize,
    pub message: String,
}

/// What a (re)generation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSummary {
    pub created: usize,
    pub removed: usize,
    pub preserved: usize,
}

/// Deletion endpoint surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionMode {
    /// Delete one occurrence (or a standalone event).
    Single,
    /// Delete this occurrence and everything after it in the series.
    Future,
}

// =============================================================================
// Manager
// =============================================================================

/// Orchestrates series generation, edit propagation, and deletion.
pub struct RecurrenceManager {
    db: Database,
}

impl RecurrenceManager {
    /// Creates a new RecurrenceManager.
    pub fn new(db: Database) -> Self {
        RecurrenceManager { db }
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Expands the root's rule and materializes one instance per
    /// occurrence date, copying non-date fields and ticket types from
    /// the root.
    ///
    /// Regeneration first removes previously generated *unsold*
    /// instances and recreates them; instances with sales are never
    /// touched, and their dates are not re-created.
    pub async fn generate(&self, root_id: &str) -> EngineResult<GenerationSummary> {
        let mut root = self.db.events().require(root_id).await?;
        let rule = root
            .recurrence_rule
            .clone()
            .ok_or_else(|| CoreError::NotASeriesRoot(root_id.to_string()))?;

        if root.series_role != SeriesRole::Root {
            root.series_role = SeriesRole::Root;
            self.db.events().update(&root).await?;
        }

        let dates = occurrences(&rule, root.event_date);
        let root_ticket_types = self.db.tickets().list_ticket_types(root_id).await?;

        let mut tx = self.db.pool().begin().await?;

        let mut removed = 0;
        let mut preserved = 0;
        let mut occupied_dates = HashSet::new();
        occupied_dates.insert(root.event_date);

        for instance in list_instances(&mut *tx, root_id).await? {
            if has_been_sold(&mut tx, &instance.id).await?.any() {
                preserved += 1;
                occupied_dates.insert(instance.event_date);
            } else {
                hard_delete_event(&mut tx, &instance.id).await?;
                removed += 1;
            }
        }

        let now = Utc::now();
        let mut created = 0;
        for date in dates.into_iter().filter(|d| !occupied_dates.contains(d)) {
            let instance = Event {
                id: Uuid::new_v4().to_string(),
                business_id: root.business_id.clone(),
                title: root.title.clone(),
                description: root.description.clone(),
                event_date: date,
                start_time: root.start_time.clone(),
                status: root.status,
                series_root_id: Some(root.id.clone()),
                series_role: SeriesRole::Instance,
                recurrence_rule: None,
                total_tickets: root.total_tickets,
                // A fresh occurrence starts with full capacity.
                available_tickets: root.total_tickets,
                created_at: now,
                updated_at: now,
            };
            insert_event(&mut *tx, &instance).await?;

            for tt in &root_ticket_types {
                let copy = TicketType {
                    id: Uuid::new_v4().to_string(),
                    event_id: instance.id.clone(),
                    available_quantity: tt.total_quantity,
                    created_at: now,
                    updated_at: now,
                    ..tt.clone()
                };
                insert_ticket_type(&mut *tx, &copy).await?;
            }

            created += 1;
        }

        tx.commit().await?;

        info!(
            root_id = %root_id,
            created = created,
            removed = removed,
            preserved = preserved,
            "Series generated"
        );

        Ok(GenerationSummary {
            created,
            removed,
            preserved,
        })
    }

    // =========================================================================
    // Edit Propagation
    // =========================================================================

    /// Edits a single occurrence: updates only that row.
    pub async fn edit_occurrence(&self, event: &Event) -> EngineResult<()> {
        self.db.events().update(event).await?;
        Ok(())
    }

    /// Pushes non-date, non-capacity fields to the root and every
    /// attached instance.
    pub async fn propagate(&self, root_id: &str, patch: &SeriesPatch) -> EngineResult<u64> {
        let root = self.db.events().require(root_id).await?;
        if root.series_role != SeriesRole::Root {
            return Err(CoreError::NotASeriesRoot(root_id.to_string()).into());
        }

        Ok(self.db.events().propagate_series_fields(root_id, patch).await?)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Deletes an event (or series members) under the sold/booked gate,
    /// returning counts of deleted and skipped-and-detached members.
    pub async fn delete(&self, event_id: &str, mode: DeletionMode) -> EngineResult<DeletionSummary> {
        let event = self.db.events().require(event_id).await?;

        let mut tx = self.db.pool().begin().await?;

        let summary = match (mode, event.series_role) {
            // Deleting the root means deleting the whole series, in
            // either mode.
            (_, SeriesRole::Root) => self.delete_series(&mut tx, &event).await?,

            (DeletionMode::Future, SeriesRole::Instance) => {
                let root_id = event.series_root_id.clone().ok_or_else(|| {
                    DbError::Internal(format!("instance {} has no series root", event.id))
                })?;
                self.delete_future(&mut tx, &root_id, &event).await?
            }

            // Standalone, detached, or a single occurrence.
            _ => {
                Self::delete_one_gated(&mut tx, &event).await?;
                DeletionSummary {
                    deleted: 1,
                    skipped: 0,
                    message: format!("Deleted \"{}\" ({})", event.title, event.event_date),
                }
            }
        };

        tx.commit().await?;

        info!(
            event_id = %event_id,
            deleted = summary.deleted,
            skipped = summary.skipped,
            "Deletion finished"
        );

        Ok(summary)
    }

    /// Deletes one event, or fails with the specific revenue reason.
    /// Nothing changes on rejection.
    async fn delete_one_gated(
        tx: &mut Transaction<'_, Sqlite>,
        event: &Event,
    ) -> EngineResult<()> {
        let sold = has_been_sold(tx, &event.id).await?;
        if sold.ticket_sales {
            return Err(CoreError::EventHasTicketSales(event.id.clone()).into());
        }
        if sold.table_bookings {
            return Err(CoreError::EventHasTableBookings(event.id.clone()).into());
        }

        hard_delete_event(tx, &event.id).await?;
        Ok(())
    }

    /// "This and future": partitions members with `date ≥ target` into
    /// deletable and protected, then fixes up the root's rule so
    /// regeneration cannot resurrect the deleted dates.
    async fn delete_future(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        root_id: &str,
        target: &Event,
    ) -> EngineResult<DeletionSummary> {
        let boundary = target.event_date;
        let members = list_instances(&mut **tx, root_id).await?;

        let mut deleted = 0;
        let mut skipped = 0;
        for member in members.iter().filter(|m| m.event_date >= boundary) {
            // Re-checked right before the destructive action: a booking
            // arriving mid-deletion protects its instance.
            if has_been_sold(tx, &member.id).await?.any() {
                detach_event(&mut **tx, &member.id).await?;
                skipped += 1;
            } else {
                hard_delete_event(tx, &member.id).await?;
                deleted += 1;
            }
        }

        let remaining = list_instances(&mut **tx, root_id).await?;
        if remaining.is_empty() {
            set_recurrence_rule(&mut **tx, root_id, None).await?;
        } else if let Some(mut rule) = fetch_event(&mut **tx, root_id)
            .await?
            .and_then(|root| root.recurrence_rule)
        {
            rule.shrink_end_before(boundary);
            set_recurrence_rule(&mut **tx, root_id, Some(&rule)).await?;
        }

        debug!(root_id = %root_id, boundary = %boundary, deleted, skipped, "Future deletion partition done");

        Ok(DeletionSummary {
            deleted,
            skipped,
            message: summary_message(deleted, skipped),
        })
    }

    /// Deletes a whole series: partitions every instance, then the root
    /// itself, which survives (rule cleared, standalone) only when it
    /// carries revenue.
    async fn delete_series(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        root: &Event,
    ) -> EngineResult<DeletionSummary> {
        let members = list_instances(&mut **tx, &root.id).await?;

        let mut deleted = 0;
        let mut skipped = 0;
        for member in &members {
            if has_been_sold(tx, &member.id).await?.any() {
                detach_event(&mut **tx, &member.id).await?;
                skipped += 1;
            } else {
                hard_delete_event(tx, &member.id).await?;
                deleted += 1;
            }
        }

        if has_been_sold(tx, &root.id).await?.any() {
            demote_root(&mut **tx, &root.id).await?;
            skipped += 1;
        } else {
            hard_delete_event(tx, &root.id).await?;
            deleted += 1;
        }

        Ok(DeletionSummary {
            deleted,
            skipped,
            message: summary_message(deleted, skipped),
        })
    }
}

fn summary_message(deleted: usize, skipped: usize) -> String {
    if skipped == 0 {
        format!("Deleted {deleted} event(s)")
    } else {
        format!(
            "Deleted {deleted} event(s); {skipped} with ticket sales or table bookings were kept as standalone events"
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gala_core::recurrence::{Frequency, RecurrenceEnd, RecurrenceRule};
    use gala_core::types::{
        generate_order_number, Order, OrderStatus, Ticket, TicketStatus,
    };
    use gala_db::repository::event::new_event;
    use gala_db::DbConfig;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO businesses (id, name, created_at, updated_at) VALUES ('biz-1', 'Venue', ?1, ?1)",
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();
        db
    }

    /// A weekly root on 2026-09-04 with five occurrences total.
    async fn seed_series(db: &Database) -> (Event, Vec<Event>) {
        let mut root = new_event("biz-1", "Friday Jazz", date(2026, 9, 4));
        root.series_role = SeriesRole::Root;
        root.recurrence_rule = Some(RecurrenceRule {
            frequency: Frequency::Weekly,
            interval: 1,
            by_weekday: vec![],
            day_of_month: None,
            week_of_month: None,
            end: RecurrenceEnd::AfterCount { count: 5 },
        });
        db.events().insert(&root).await.unwrap();

        let manager = RecurrenceManager::new(db.clone());
        let summary = manager.generate(&root.id).await.unwrap();
        assert_eq!(summary.created, 4);

        let instances = db.events().list_instances(&root.id).await.unwrap();
        assert_eq!(instances.len(), 4);
        (root, instances)
    }

    /// Gives an event one non-cancelled ticket sale.
    async fn sell_ticket(db: &Database, event_id: &str) {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_number: generate_order_number(now),
            event_id: event_id.to_string(),
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            customer_phone: None,
            subtotal_cents: 2500,
            discount_cents: 0,
            tax_cents: 0,
            platform_fee_cents: 0,
            processor_fee_cents: 0,
            total_cents: 2500,
            payment_intent_id: format!("pi_{}", Uuid::new_v4().simple()),
            promo_code: None,
            tracking_link_id: None,
            status: OrderStatus::Completed,
            created_at: now,
        };
        db.tickets().insert_order(&order).await.unwrap();

        let number = format!("TKT-{}", Uuid::new_v4().simple());
        db.tickets()
            .insert_ticket(&Ticket {
                id: Uuid::new_v4().to_string(),
                qr_payload: format!("{number}|{event_id}|{}", order.id),
                ticket_number: number,
                order_id: order.id.clone(),
                event_id: event_id.to_string(),
                ticket_type_id: None,
                price_cents: 2500,
                status: TicketStatus::Valid,
                checked_in_at: None,
                created_at: now,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_generation_copies_fields_and_ticket_types() {
        let db = test_db().await;

        let mut root = new_event("biz-1", "Friday Jazz", date(2026, 9, 4));
        root.series_role = SeriesRole::Root;
        root.start_time = Some("19:30".to_string());
        root.recurrence_rule = Some(RecurrenceRule {
            frequency: Frequency::Weekly,
            interval: 1,
            by_weekday: vec![],
            day_of_month: None,
            week_of_month: None,
            end: RecurrenceEnd::AfterCount { count: 3 },
        });
        db.events().insert(&root).await.unwrap();

        let now = Utc::now();
        db.tickets()
            .insert_ticket_type(&TicketType {
                id: "tt-root".to_string(),
                event_id: root.id.clone(),
                name: "GA".to_string(),
                price_cents: 2500,
                total_quantity: 80,
                available_quantity: 20, // partially sold on the root
                max_per_customer: 4,
                is_active: true,
                sale_starts_at: None,
                sale_ends_at: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let manager = RecurrenceManager::new(db.clone());
        let summary = manager.generate(&root.id).await.unwrap();
        assert_eq!(summary.created, 2);

        let instances = db.events().list_instances(&root.id).await.unwrap();
        assert_eq!(
            instances.iter().map(|i| i.event_date).collect::<Vec<_>>(),
            vec![date(2026, 9, 11), date(2026, 9, 18)]
        );

        for instance in &instances {
            assert_eq!(instance.title, "Friday Jazz");
            assert_eq!(instance.start_time.as_deref(), Some("19:30"));
            assert_eq!(instance.series_role, SeriesRole::Instance);
            assert!(instance.recurrence_rule.is_none());

            let types = db.tickets().list_ticket_types(&instance.id).await.unwrap();
            assert_eq!(types.len(), 1);
            // Fresh instances start with full capacity.
            assert_eq!(types[0].available_quantity, 80);
        }
    }

    #[tokio::test]
    async fn test_regeneration_never_touches_sold_instances() {
        let db = test_db().await;
        let (root, instances) = seed_series(&db).await;

        sell_ticket(&db, &instances[1].id).await;

        let manager = RecurrenceManager::new(db.clone());
        let summary = manager.generate(&root.id).await.unwrap();

        assert_eq!(summary.preserved, 1);
        assert_eq!(summary.removed, 3);
        assert_eq!(summary.created, 3);

        // The sold instance is the same row, not a recreation.
        let survivors = db.events().list_instances(&root.id).await.unwrap();
        assert!(survivors.iter().any(|i| i.id == instances[1].id));
    }

    #[tokio::test]
    async fn test_single_delete_blocked_by_ticket_sales() {
        let db = test_db().await;
        let (_, instances) = seed_series(&db).await;

        sell_ticket(&db, &instances[0].id).await;

        let manager = RecurrenceManager::new(db.clone());
        let err = manager
            .delete(&instances[0].id, DeletionMode::Single)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ticket sales"));

        // Nothing changed.
        assert!(db.events().get_by_id(&instances[0].id).await.unwrap().is_some());
        let stats = db.ledger().event_ticket_stats(&instances[0].id).await.unwrap();
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn test_single_delete_of_unsold_instance() {
        let db = test_db().await;
        let (root, instances) = seed_series(&db).await;

        let manager = RecurrenceManager::new(db.clone());
        let summary = manager
            .delete(&instances[0].id, DeletionMode::Single)
            .await
            .unwrap();

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.skipped, 0);
        assert!(db.events().get_by_id(&instances[0].id).await.unwrap().is_none());
        assert_eq!(db.events().list_instances(&root.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_future_delete_partitions_and_detaches() {
        let db = test_db().await;
        let (root, instances) = seed_series(&db).await;
        // Occurrences: root 9/4, instances 9/11, 9/18, 9/25, 10/2.
        // "#3" of the series is the 9/18 instance.
        let third = &instances[1];
        sell_ticket(&db, &third.id).await;

        let manager = RecurrenceManager::new(db.clone());
        let summary = manager
            .delete(&instances[0].id, DeletionMode::Future)
            .await
            .unwrap();

        // 9/11, 9/25, 10/2 deleted; 9/18 detached.
        assert_eq!(summary.deleted, 3);
        assert_eq!(summary.skipped, 1);
        assert!(summary.message.contains("kept as standalone"));

        let detached = db.events().require(&third.id).await.unwrap();
        assert_eq!(detached.series_role, SeriesRole::Detached);
        assert!(detached.series_root_id.is_none());
        assert!(detached.recurrence_rule.is_none());

        // No instances remain attached: the root's rule is cleared.
        assert!(db.events().list_instances(&root.id).await.unwrap().is_empty());
        let root_after = db.events().require(&root.id).await.unwrap();
        assert!(root_after.recurrence_rule.is_none());
    }

    #[tokio::test]
    async fn test_future_delete_shrinks_rule_when_instances_remain() {
        let db = test_db().await;
        let (root, instances) = seed_series(&db).await;
        let boundary = instances[1].clone(); // 9/18
        let boundary_date = boundary.event_date;

        let manager = RecurrenceManager::new(db.clone());
        let summary = manager
            .delete(&boundary.id, DeletionMode::Future)
            .await
            .unwrap();

        assert_eq!(summary.deleted, 3);
        assert_eq!(summary.skipped, 0);

        // 9/11 survives; the rule now ends the day before 9/18, so
        // regeneration cannot recreate the deleted dates.
        let remaining = db.events().list_instances(&root.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_date, date(2026, 9, 11));

        let root_after = db.events().require(&root.id).await.unwrap();
        let rule = root_after.recurrence_rule.unwrap();
        assert_eq!(
            rule.end,
            RecurrenceEnd::OnDate { date: boundary_date.pred_opt().unwrap() }
        );

        let regen = manager.generate(&root.id).await.unwrap();
        assert_eq!(regen.created, 1); // only 9/11 comes back
        let regen_dates: Vec<_> = db
            .events()
            .list_instances(&root.id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.event_date)
            .collect();
        assert_eq!(regen_dates, vec![date(2026, 9, 11)]);
    }

    #[tokio::test]
    async fn test_root_delete_demotes_sold_root() {
        let db = test_db().await;
        let (root, instances) = seed_series(&db).await;
        sell_ticket(&db, &root.id).await;
        sell_ticket(&db, &instances[2].id).await;

        let manager = RecurrenceManager::new(db.clone());
        let summary = manager.delete(&root.id, DeletionMode::Single).await.unwrap();

        // Three unsold instances deleted; one detached; root demoted.
        assert_eq!(summary.deleted, 3);
        assert_eq!(summary.skipped, 2);

        let root_after = db.events().require(&root.id).await.unwrap();
        assert_eq!(root_after.series_role, SeriesRole::Standalone);
        assert!(root_after.recurrence_rule.is_none());

        let detached = db.events().require(&instances[2].id).await.unwrap();
        assert_eq!(detached.series_role, SeriesRole::Detached);
    }

    #[tokio::test]
    async fn test_root_delete_removes_unsold_series_entirely() {
        let db = test_db().await;
        let (root, instances) = seed_series(&db).await;

        let manager = RecurrenceManager::new(db.clone());
        let summary = manager.delete(&root.id, DeletionMode::Future).await.unwrap();

        assert_eq!(summary.deleted, 5);
        assert_eq!(summary.skipped, 0);
        assert!(db.events().get_by_id(&root.id).await.unwrap().is_none());
        for instance in &instances {
            assert!(db.events().get_by_id(&instance.id).await.unwrap().is_none());
        }
    }
}
