//! # Booking Service
//!
//! Drives table reservations through their lifecycle. Every transition
//! is checked by the pure state machine first, then persisted with a
//! status-guarded UPDATE so concurrent staff actions cannot clobber
//! each other.
//!
//! Three entry channels:
//! - free requests (`Advisory` sections, never capacity-blocked)
//! - manual staff entries (consume inventory in `Enforced` sections)
//! - paid reservations (created by the fulfillment processor)

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use gala_core::booking::BookingStatus;
use gala_core::error::CoreError;
use gala_core::types::{
    generate_free_order_id, CapacityPolicy, CustomerInfo, EventTableSection, TableBooking,
};
use gala_core::validation::{validate_customer, validate_party_size, validate_quantity};
use gala_db::ledger::Reservation;
use gala_db::Database;

use crate::error::EngineResult;

/// Service over the booking state machine and the table repositories.
pub struct BookingService {
    db: Database,
}

impl BookingService {
    /// Creates a new BookingService.
    pub fn new(db: Database) -> Self {
        BookingService { db }
    }

    // =========================================================================
    // Entry Channels
    // =========================================================================

    /// Creates `quantity` free reservation requests in an advisory
    /// (free) section under one synthetic `FREE-...` order id.
    ///
    /// Requests are deliberately not capacity-checked: a free section
    /// may over-book as `requested`, and staff triage the overflow.
    pub async fn request_free_tables(
        &self,
        section_id: &str,
        quantity: i64,
        party_size: i64,
        customer: &CustomerInfo,
        notes: Option<&str>,
    ) -> EngineResult<Vec<TableBooking>> {
        validate_quantity(quantity)?;
        validate_party_size(party_size)?;
        validate_customer(customer)?;

        let section = self.require_active_section(section_id).await?;
        if section.capacity_policy != CapacityPolicy::Advisory {
            return Err(CoreError::SectionRequiresPayment(section.name).into());
        }

        let derived = self.db.ledger().section_availability(&section).await?;
        if quantity > derived {
            // Allowed by policy; flagged for staff.
            info!(
                section = %section.name,
                requested = quantity,
                derived_available = derived,
                "Free requests exceed derived availability"
            );
        }

        let order_id = generate_free_order_id();
        let now = Utc::now();
        let mut bookings = Vec::new();

        for _ in 0..quantity {
            let booking = TableBooking {
                id: Uuid::new_v4().to_string(),
                section_id: section_id.to_string(),
                event_id: section.event_id.clone(),
                order_id: Some(order_id.clone()),
                table_number: None,
                completed_table_number: None,
                customer_name: customer.name.clone(),
                customer_email: Some(customer.email.clone()),
                customer_phone: customer.phone.clone(),
                party_size,
                amount_cents: 0,
                tax_cents: 0,
                refunded_cents: 0,
                status: BookingStatus::Requested,
                notes: notes.map(str::to_string),
                created_at: now,
                updated_at: now,
            };
            self.db.tables().insert_booking(&booking).await?;
            bookings.push(booking);
        }

        info!(section = %section.name, count = bookings.len(), order_id = %order_id, "Free table requests created");
        Ok(bookings)
    }

    /// Creates a staff-entered booking, already confirmed, optionally
    /// with a table assigned. Enforced sections consume one unit of
    /// inventory; a duplicate table assignment surfaces as a conflict
    /// from the live-table unique index.
    pub async fn create_manual_booking(
        &self,
        section_id: &str,
        customer: &CustomerInfo,
        party_size: i64,
        table_number: Option<&str>,
        amount_cents: i64,
        notes: Option<&str>,
    ) -> EngineResult<TableBooking> {
        validate_party_size(party_size)?;
        validate_customer(customer)?;

        let section = self.require_active_section(section_id).await?;

        if section.capacity_policy == CapacityPolicy::Enforced {
            let outcome = self.db.ledger().reserve_tables(section_id, 1).await?;
            if let Reservation::Short { available } = outcome {
                return Err(CoreError::InsufficientTables {
                    section: section.name,
                    available,
                    requested: 1,
                }
                .into());
            }
        }

        let now = Utc::now();
        let booking = TableBooking {
            id: Uuid::new_v4().to_string(),
            section_id: section_id.to_string(),
            event_id: section.event_id.clone(),
            // Manual entries carry no payment reference.
            order_id: None,
            table_number: table_number.map(str::to_string),
            completed_table_number: None,
            customer_name: customer.name.clone(),
            customer_email: Some(customer.email.clone()),
            customer_phone: customer.phone.clone(),
            party_size,
            amount_cents,
            tax_cents: 0,
            refunded_cents: 0,
            status: BookingStatus::Confirmed,
            notes: notes.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.db.tables().insert_booking(&booking).await {
            // The table was taken while we held a reserved unit; give
            // the unit back before surfacing the conflict.
            if section.capacity_policy == CapacityPolicy::Enforced {
                self.db.ledger().release_tables(section_id, 1).await?;
            }
            return Err(err.into());
        }

        info!(booking_id = %booking.id, section_id = %section_id, "Manual booking created");
        Ok(booking)
    }

    // =========================================================================
    // Lifecycle Transitions
    // =========================================================================

    /// Staff accepts a `requested` booking without assigning a table.
    pub async fn approve(&self, booking_id: &str) -> EngineResult<TableBooking> {
        self.step(booking_id, BookingStatus::Approved, None, false).await
    }

    /// Confirms a booking, optionally assigning a table in the same
    /// action. `requested → confirmed` is the staff approval shortcut.
    pub async fn confirm(
        &self,
        booking_id: &str,
        table_number: Option<&str>,
    ) -> EngineResult<TableBooking> {
        self.step(booking_id, BookingStatus::Confirmed, table_number, false)
            .await
    }

    /// Assigns (or reassigns) a concrete table without changing status.
    pub async fn assign_table(&self, booking_id: &str, table_number: &str) -> EngineResult<TableBooking> {
        let booking = self.db.tables().require_booking(booking_id).await?;
        if booking.status.is_terminal() {
            return Err(CoreError::InvalidBookingTransition {
                from: booking.status,
                to: booking.status,
            }
            .into());
        }

        self.db
            .tables()
            .transition_booking(booking_id, booking.status, booking.status, Some(table_number))
            .await?;

        Ok(self.db.tables().require_booking(booking_id).await?)
    }

    /// Front-of-house: the party showed up.
    pub async fn mark_arrived(&self, booking_id: &str) -> EngineResult<TableBooking> {
        self.step(booking_id, BookingStatus::Arrived, None, false).await
    }

    /// Front-of-house: the party is at the table.
    pub async fn mark_seated(&self, booking_id: &str) -> EngineResult<TableBooking> {
        self.step(booking_id, BookingStatus::Seated, None, false).await
    }

    /// Ends the engagement: archives the table number used and stops
    /// the booking counting toward occupancy.
    pub async fn complete(&self, booking_id: &str) -> EngineResult<TableBooking> {
        let booking = self.db.tables().require_booking(booking_id).await?;
        booking
            .status
            .validate_transition(BookingStatus::Completed, false)?;

        self.db
            .tables()
            .complete_booking(booking_id, booking.status)
            .await?;

        info!(booking_id = %booking_id, "Booking completed");
        Ok(self.db.tables().require_booking(booking_id).await?)
    }

    /// Cancels a booking, recording an optional refund and releasing
    /// inventory in capacity-enforced sections.
    pub async fn cancel(&self, booking_id: &str, refund_cents: i64) -> EngineResult<TableBooking> {
        let booking = self.db.tables().require_booking(booking_id).await?;
        booking
            .status
            .validate_transition(BookingStatus::Cancelled, false)?;

        self.db
            .tables()
            .cancel_booking(booking_id, booking.status, refund_cents)
            .await?;

        let section = self.db.tables().require_section(&booking.section_id).await?;
        if section.capacity_policy == CapacityPolicy::Enforced {
            self.db.ledger().release_tables(&booking.section_id, 1).await?;
        }

        info!(booking_id = %booking_id, refund_cents = refund_cents, "Booking cancelled");
        Ok(self.db.tables().require_booking(booking_id).await?)
    }

    /// Explicit-override transition for staff who need to skip
    /// intermediate states. Terminal states still admit nothing.
    pub async fn force_transition(
        &self,
        booking_id: &str,
        to: BookingStatus,
    ) -> EngineResult<TableBooking> {
        self.step(booking_id, to, None, true).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn step(
        &self,
        booking_id: &str,
        to: BookingStatus,
        table_number: Option<&str>,
        allow_skip: bool,
    ) -> EngineResult<TableBooking> {
        let booking = self.db.tables().require_booking(booking_id).await?;
        booking.status.validate_transition(to, allow_skip)?;

        debug!(booking_id = %booking_id, from = %booking.status, to = %to, "Applying booking transition");

        self.db
            .tables()
            .transition_booking(booking_id, booking.status, to, table_number)
            .await?;

        Ok(self.db.tables().require_booking(booking_id).await?)
    }

    async fn require_active_section(&self, section_id: &str) -> EngineResult<EventTableSection> {
        let section = self
            .db
            .tables()
            .get_section(section_id)
            .await?
            .ok_or_else(|| CoreError::SectionNotFound(section_id.to_string()))?;

        if !section.is_active {
            return Err(CoreError::SectionDisabled(section.name).into());
        }

        Ok(section)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gala_core::types::TableSectionTemplate;
    use gala_db::repository::event::new_event;
    use gala_db::repository::table::derive_section_from_template;
    use gala_db::{DbConfig, Reservation};

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

    async fn seed_section(db: &Database, price_cents: i64, total: i64) -> EventTableSection {
        let template = TableSectionTemplate {
            id: Uuid::new_v4().to_string(),
            business_id: "biz-1".to_string(),
            name: if price_cents > 0 { "VIP" } else { "Main Floor" }.to_string(),
            price_cents,
            total_tables: total,
            max_per_customer: 0,
            min_spend_cents: 0,
            created_at: Utc::now(),
        };
        let section = derive_section_from_template(&template, "ev-1");
        db.tables().insert_section(&section).await.unwrap();
        section
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_free_requests_may_exceed_capacity() {
        let db = test_db().await;
        let service = BookingService::new(db.clone());
        let section = seed_section(&db, 0, 2).await;

        // Five requests against two tables: all accepted as 'requested'.
        let bookings = service
            .request_free_tables(&section.id, 5, 2, &customer(), None)
            .await
            .unwrap();
        assert_eq!(bookings.len(), 5);
        assert!(bookings.iter().all(|b| b.status == BookingStatus::Requested));
        assert!(bookings.iter().all(|b| b.table_number.is_none()));

        let order_id = bookings[0].order_id.clone().unwrap();
        assert!(order_id.starts_with("FREE-"));
        assert!(bookings.iter().all(|b| b.order_id.as_deref() == Some(order_id.as_str())));
    }

    #[tokio::test]
    async fn test_free_requests_rejected_on_paid_section() {
        let db = test_db().await;
        let service = BookingService::new(db.clone());
        let section = seed_section(&db, 10_000, 2).await;

        let err = service
            .request_free_tables(&section.id, 1, 2, &customer(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires payment"));
    }

    #[tokio::test]
    async fn test_manual_booking_consumes_enforced_inventory() {
        let db = test_db().await;
        let service = BookingService::new(db.clone());
        let section = seed_section(&db, 10_000, 2).await;

        service
            .create_manual_booking(&section.id, &customer(), 4, Some("T1"), 10_000, None)
            .await
            .unwrap();
        service
            .create_manual_booking(&section.id, &customer(), 2, None, 10_000, None)
            .await
            .unwrap();

        // Counter exhausted.
        let err = service
            .create_manual_booking(&section.id, &customer(), 2, None, 10_000, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Insufficient tables"));
    }

    #[tokio::test]
    async fn test_duplicate_table_assignment_releases_reserved_unit() {
        let db = test_db().await;
        let service = BookingService::new(db.clone());
        let section = seed_section(&db, 10_000, 3).await;

        service
            .create_manual_booking(&section.id, &customer(), 4, Some("T1"), 10_000, None)
            .await
            .unwrap();

        // Same table again: conflict, and the reserved unit flows back.
        assert!(service
            .create_manual_booking(&section.id, &customer(), 4, Some("T1"), 10_000, None)
            .await
            .is_err());

        assert_eq!(
            db.ledger().reserve_tables(&section.id, 2).await.unwrap(),
            Reservation::Granted
        );
    }

    #[tokio::test]
    async fn test_full_lifecycle_walk() {
        let db = test_db().await;
        let service = BookingService::new(db.clone());
        let section = seed_section(&db, 0, 5).await;

        let booking = service
            .request_free_tables(&section.id, 1, 2, &customer(), Some("window seat"))
            .await
            .unwrap()
            .remove(0);

        let b = service.approve(&booking.id).await.unwrap();
        assert_eq!(b.status, BookingStatus::Approved);

        let b = service.confirm(&booking.id, Some("T3")).await.unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.table_number.as_deref(), Some("T3"));

        let b = service.mark_arrived(&booking.id).await.unwrap();
        assert_eq!(b.status, BookingStatus::Arrived);

        let b = service.mark_seated(&booking.id).await.unwrap();
        assert_eq!(b.status, BookingStatus::Seated);

        let b = service.complete(&booking.id).await.unwrap();
        assert_eq!(b.status, BookingStatus::Completed);
        assert_eq!(b.completed_table_number.as_deref(), Some("T3"));

        // Terminal: nothing else is allowed.
        assert!(service.cancel(&booking.id, 0).await.is_err());
        assert!(service.force_transition(&booking.id, BookingStatus::Seated).await.is_err());
    }

    #[tokio::test]
    async fn test_skip_rejected_without_override() {
        let db = test_db().await;
        let service = BookingService::new(db.clone());
        let section = seed_section(&db, 0, 5).await;

        let booking = service
            .request_free_tables(&section.id, 1, 2, &customer(), None)
            .await
            .unwrap()
            .remove(0);

        // requested → seated skips approved/confirmed/arrived.
        assert!(service.mark_seated(&booking.id).await.is_err());

        let b = service
            .force_transition(&booking.id, BookingStatus::Seated)
            .await
            .unwrap();
        assert_eq!(b.status, BookingStatus::Seated);
    }

    #[tokio::test]
    async fn test_cancel_releases_enforced_inventory_and_records_refund() {
        let db = test_db().await;
        let service = BookingService::new(db.clone());
        let section = seed_section(&db, 10_000, 1).await;

        let booking = service
            .create_manual_booking(&section.id, &customer(), 4, Some("T1"), 10_000, None)
            .await
            .unwrap();

        // Section is now exhausted.
        assert!(matches!(
            db.ledger().reserve_tables(&section.id, 1).await.unwrap(),
            Reservation::Short { .. }
        ));

        let cancelled = service.cancel(&booking.id, 2_500).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.refunded_cents, 2_500);

        // The table unit is sellable again.
        assert_eq!(
            db.ledger().reserve_tables(&section.id, 1).await.unwrap(),
            Reservation::Granted
        );
    }
}
