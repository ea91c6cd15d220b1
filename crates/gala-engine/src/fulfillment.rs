//! # Order Fulfillment Processor
//!
//! Turns a settled payment reference into exactly one order and one set
//! of tickets or table bookings, even under retries.
//!
//! ## Idempotency
//! ```text
//! fulfill(reference)
//!     │
//!     ▼
//! retrieve intent ── not settled? ──► reject, nothing written
//!     │
//!     ▼
//! prior fulfillment row? ──► return the prior result unchanged
//!     │
//!     ▼
//! ┌──────────────── SINGLE TRANSACTION ────────────────┐
//! │ 1. INSERT fulfillments(reference)   ← unique key   │
//! │    loser of a concurrent race stops right here     │
//! │ 2. conditional counter decrements (ledger)         │
//! │    short inventory rolls the whole thing back      │
//! │ 3. INSERT order / tickets / bookings               │
//! └────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! post-commit side effects (promo usage, attribution,
//! notifications): logged on failure, never surfaced -
//! the payment has already settled.
//! ```
//!
//! The endpoint is reached from a client-side redirect that may retry
//! on refresh; replays return the same order id and decrement nothing.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use gala_core::booking::BookingStatus;
use gala_core::error::CoreError;
use gala_core::types::{
    generate_order_number, generate_ticket_number, qr_payload, CapacityPolicy, CartMetadata,
    CustomerInfo, Order, OrderStatus, PricingBreakdown, TableBooking, TableSelection, Ticket,
    TicketLine, TicketStatus,
};
use gala_core::validation::{validate_customer, validate_table_cart, validate_ticket_cart};
use gala_db::ledger::{reserve_event_tickets, reserve_ticket_type, reserve_tables, Reservation};
use gala_db::repository::fulfillment::{find_fulfillment, record_fulfillment};
use gala_db::repository::table::insert_booking;
use gala_db::repository::ticket::{insert_order, insert_ticket};
use gala_db::Database;

use crate::error::{EngineError, EngineResult};
use crate::providers::{AttributionLookup, NotificationDispatch, PaymentGateway, PaymentStatus};

// =============================================================================
// Outcomes
// =============================================================================

/// Everything materialized under one payment reference.
#[derive(Debug, Clone, Default)]
pub struct FulfillmentBundle {
    /// The order row. Table carts have no order; their bookings carry
    /// the payment reference directly.
    pub order: Option<Order>,
    pub tickets: Vec<Ticket>,
    pub bookings: Vec<TableBooking>,
}

/// Whether this invocation did the work or found it already done.
#[derive(Debug, Clone)]
pub enum FulfillmentOutcome {
    Created(FulfillmentBundle),
    Replayed(FulfillmentBundle),
}

impl FulfillmentOutcome {
    pub fn bundle(&self) -> &FulfillmentBundle {
        match self {
            FulfillmentOutcome::Created(b) | FulfillmentOutcome::Replayed(b) => b,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, FulfillmentOutcome::Replayed(_))
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Materializes settled payments. All collaborators are injected so
/// tests can substitute fakes.
pub struct FulfillmentProcessor {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatch>,
    attribution: Arc<dyn AttributionLookup>,
}

impl FulfillmentProcessor {
    /// Creates a new FulfillmentProcessor.
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatch>,
        attribution: Arc<dyn AttributionLookup>,
    ) -> Self {
        FulfillmentProcessor {
            db,
            gateway,
            notifier,
            attribution,
        }
    }

    /// Fulfills a payment reference: at most one order (or booking set)
    /// is ever created for it.
    pub async fn fulfill(&self, reference: &str) -> EngineResult<FulfillmentOutcome> {
        let intent = self.gateway.retrieve_intent(reference).await?;

        if intent.status != PaymentStatus::Settled {
            return Err(CoreError::PaymentNotSettled(reference.to_string()).into());
        }

        // Fast-path replay: the reference was already fulfilled.
        if let Some(bundle) = self.load_existing(reference).await? {
            info!(reference = %reference, "Replaying prior fulfillment");
            return Ok(FulfillmentOutcome::Replayed(bundle));
        }

        match intent.metadata {
            CartMetadata::TicketCart {
                event_id,
                items,
                pricing,
                customer,
                promo_code,
                tracking_ref,
            } => {
                self.fulfill_ticket_cart(
                    reference,
                    &event_id,
                    &items,
                    &pricing,
                    &customer,
                    promo_code.as_deref(),
                    tracking_ref.as_deref(),
                )
                .await
            }
            CartMetadata::TableCart {
                event_id,
                selections,
                pricing,
                customer,
            } => {
                self.fulfill_table_cart(reference, &event_id, &selections, &pricing, &customer)
                    .await
            }
        }
    }

    /// Loads the bundle a previously fulfilled reference produced.
    async fn load_existing(&self, reference: &str) -> EngineResult<Option<FulfillmentBundle>> {
        if find_fulfillment(self.db.pool(), reference).await?.is_none() {
            return Ok(None);
        }

        let order = self
            .db
            .tickets()
            .get_order_by_payment_intent(reference)
            .await?;
        let tickets = match &order {
            Some(order) => self.db.tickets().list_tickets_by_order(&order.id).await?,
            None => Vec::new(),
        };
        let bookings = self.db.tables().list_bookings_by_order(reference).await?;

        Ok(Some(FulfillmentBundle {
            order,
            tickets,
            bookings,
        }))
    }

    // =========================================================================
    // Ticket Carts
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    async fn fulfill_ticket_cart(
        &self,
        reference: &str,
        event_id: &str,
        items: &[TicketLine],
        pricing: &PricingBreakdown,
        customer: &CustomerInfo,
        promo_code: Option<&str>,
        tracking_ref: Option<&str>,
    ) -> EngineResult<FulfillmentOutcome> {
        validate_ticket_cart(items)?;
        validate_customer(customer)?;

        let event = self.db.events().require(event_id).await?;

        // Snapshot names before the transaction so capacity rejections
        // can name the offending line.
        let mut line_names = Vec::with_capacity(items.len());
        for line in items {
            let name = match &line.ticket_type_id {
                Some(id) => {
                    self.db
                        .tickets()
                        .get_ticket_type(id)
                        .await?
                        .ok_or_else(|| CoreError::TicketTypeNotFound(id.clone()))?
                        .name
                }
                None => event.title.clone(),
            };
            line_names.push(name);
        }

        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        // The uniqueness guard. A concurrent duplicate delivery loses
        // here and replays the winner's result.
        match record_fulfillment(&mut *tx, reference, "ticket_cart").await {
            Err(err) if err.is_unique_violation() => {
                drop(tx);
                return self.replay_after_race(reference).await;
            }
            other => other?,
        }

        for (line, name) in items.iter().zip(&line_names) {
            let outcome = match &line.ticket_type_id {
                Some(id) => reserve_ticket_type(&mut tx, id, line.quantity).await?,
                None => reserve_event_tickets(&mut tx, event_id, line.quantity).await?,
            };

            if let Reservation::Short { available } = outcome {
                return Err(CoreError::InsufficientTickets {
                    name: name.clone(),
                    available,
                    requested: line.quantity,
                }
                .into());
            }
        }

        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_number: generate_order_number(now),
            event_id: event_id.to_string(),
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            customer_phone: customer.phone.clone(),
            subtotal_cents: pricing.subtotal_cents,
            discount_cents: pricing.discount_cents,
            tax_cents: pricing.tax_cents,
            platform_fee_cents: pricing.platform_fee_cents,
            processor_fee_cents: pricing.processor_fee_cents,
            total_cents: pricing.total_cents,
            payment_intent_id: reference.to_string(),
            promo_code: promo_code.map(str::to_string),
            tracking_link_id: None,
            status: OrderStatus::Completed,
            created_at: now,
        };

        match insert_order(&mut *tx, &order).await {
            Err(err) if err.is_unique_violation() => {
                drop(tx);
                return self.replay_after_race(reference).await;
            }
            other => other?,
        }

        let mut tickets = Vec::new();
        for line in items {
            for _ in 0..line.quantity {
                let ticket_number = generate_ticket_number(now);
                let ticket = Ticket {
                    id: Uuid::new_v4().to_string(),
                    qr_payload: qr_payload(&ticket_number, event_id, &order.id),
                    ticket_number,
                    order_id: order.id.clone(),
                    event_id: event_id.to_string(),
                    ticket_type_id: line.ticket_type_id.clone(),
                    price_cents: line.unit_price_cents,
                    status: TicketStatus::Valid,
                    checked_in_at: None,
                    created_at: now,
                };
                insert_ticket(&mut *tx, &ticket).await?;
                tickets.push(ticket);
            }
        }

        tx.commit().await?;

        info!(
            reference = %reference,
            order_number = %order.order_number,
            tickets = tickets.len(),
            "Ticket order fulfilled"
        );

        let order = self
            .ticket_post_commit(order, &tickets, &event.business_id, promo_code, tracking_ref)
            .await;

        Ok(FulfillmentOutcome::Created(FulfillmentBundle {
            order: Some(order),
            tickets,
            bookings: Vec::new(),
        }))
    }

    /// Post-commit side effects for a ticket order. The commit is the
    /// source of truth; anything failing here is logged and swallowed.
    async fn ticket_post_commit(
        &self,
        mut order: Order,
        tickets: &[Ticket],
        business_id: &str,
        promo_code: Option<&str>,
        tracking_ref: Option<&str>,
    ) -> Order {
        if let Some(code) = promo_code {
            if let Err(err) = self.db.promos().increment_usage(business_id, code).await {
                warn!(code = %code, error = %err, "Promo usage increment failed after commit");
            }
        }

        if let Some(ref_code) = tracking_ref {
            match self.attribution.resolve(ref_code).await {
                Ok(Some(link_id)) => {
                    if let Err(err) = self
                        .db
                        .tickets()
                        .set_order_tracking_link(&order.id, &link_id)
                        .await
                    {
                        warn!(error = %err, "Tracking link update failed after commit");
                    } else {
                        order.tracking_link_id = Some(link_id);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(ref_code = %ref_code, error = %err, "Attribution lookup failed");
                }
            }
        }

        if let Err(err) = self.notifier.order_confirmation(&order, tickets).await {
            warn!(order = %order.order_number, error = %err, "Order confirmation dispatch failed");
        }

        order
    }

    // =========================================================================
    // Table Carts
    // =========================================================================

    async fn fulfill_table_cart(
        &self,
        reference: &str,
        event_id: &str,
        selections: &[TableSelection],
        pricing: &PricingBreakdown,
        customer: &CustomerInfo,
    ) -> EngineResult<FulfillmentOutcome> {
        validate_table_cart(selections)?;
        validate_customer(customer)?;

        // Snapshot the sections before the transaction: existence,
        // active flag, and capacity policy.
        let mut sections = Vec::with_capacity(selections.len());
        for selection in selections {
            let section = self
                .db
                .tables()
                .get_section(&selection.section_id)
                .await?
                .ok_or_else(|| CoreError::SectionNotFound(selection.section_id.clone()))?;
            if !section.is_active {
                return Err(CoreError::SectionDisabled(section.name).into());
            }
            sections.push(section);
        }

        let now = Utc::now();
        let total_units: i64 = selections.iter().map(|s| s.quantity).sum();
        let tax_per_unit = pricing.tax_cents / total_units.max(1);
        let mut tax_remainder = pricing.tax_cents - tax_per_unit * total_units.max(1);

        let mut tx = self.db.pool().begin().await?;

        match record_fulfillment(&mut *tx, reference, "table_cart").await {
            Err(err) if err.is_unique_violation() => {
                drop(tx);
                return self.replay_after_race(reference).await;
            }
            other => other?,
        }

        let mut bookings = Vec::new();
        for (selection, section) in selections.iter().zip(&sections) {
            // Paid sections settle against the persisted counter; free
            // sections never reach a paid cart.
            if section.capacity_policy == CapacityPolicy::Enforced {
                let outcome =
                    reserve_tables(&mut tx, &selection.section_id, selection.quantity).await?;
                if let Reservation::Short { available } = outcome {
                    return Err(CoreError::InsufficientTables {
                        section: section.name.clone(),
                        available,
                        requested: selection.quantity,
                    }
                    .into());
                }
            }

            for _ in 0..selection.quantity {
                let booking = TableBooking {
                    id: Uuid::new_v4().to_string(),
                    section_id: selection.section_id.clone(),
                    event_id: event_id.to_string(),
                    order_id: Some(reference.to_string()),
                    // Physical assignment is deferred to staff.
                    table_number: None,
                    completed_table_number: None,
                    customer_name: customer.name.clone(),
                    customer_email: Some(customer.email.clone()),
                    customer_phone: customer.phone.clone(),
                    party_size: selection.party_size,
                    amount_cents: selection.unit_price_cents,
                    tax_cents: tax_per_unit + std::mem::take(&mut tax_remainder),
                    refunded_cents: 0,
                    status: BookingStatus::Confirmed,
                    notes: None,
                    created_at: now,
                    updated_at: now,
                };
                insert_booking(&mut *tx, &booking).await?;
                bookings.push(booking);
            }
        }

        tx.commit().await?;

        info!(
            reference = %reference,
            bookings = bookings.len(),
            "Table reservation fulfilled"
        );

        if let Err(err) = self.notifier.booking_confirmation(&bookings).await {
            warn!(reference = %reference, error = %err, "Booking confirmation dispatch failed");
        }

        Ok(FulfillmentOutcome::Created(FulfillmentBundle {
            order: None,
            tickets: Vec::new(),
            bookings,
        }))
    }

    /// A concurrent duplicate lost the uniqueness race; the winner's
    /// rows must exist by now.
    async fn replay_after_race(&self, reference: &str) -> EngineResult<FulfillmentOutcome> {
        info!(reference = %reference, "Lost fulfillment race, replaying winner's result");
        match self.load_existing(reference).await? {
            Some(bundle) => Ok(FulfillmentOutcome::Replayed(bundle)),
            None => Err(EngineError::Db(gala_db::DbError::Internal(
                format!("fulfillment row for {reference} exists but no rows were found"),
            ))),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gala_core::fees::{FeeKind, FeePayer};
    use gala_core::money::Money;
    use gala_core::types::{Business, PromoCode, PromoKind, TableSectionTemplate, TicketType};
    use gala_db::repository::event::new_event;
    use gala_db::repository::table::derive_section_from_template;
    use gala_db::DbConfig;

    use crate::providers::fakes::{FakeGateway, FixedAttribution, RecordingNotifier};

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        db.businesses()
            .insert(&Business {
                id: "biz-1".to_string(),
                name: "The Blue Room".to_string(),
                fee_type: FeeKind::Percentage,
                flat_fee_cents: 0,
                fee_rate_bps: 300,
                tax_rate_bps: 0,
                platform_fee_payer: FeePayer::Business,
                processor_fee_payer: FeePayer::Business,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let mut event = new_event("biz-1", "Show", NaiveDate::from_ymd_opt(2026, 9, 4).unwrap());
        event.id = "ev-1".to_string();
        db.events().insert(&event).await.unwrap();
        db
    }

    async fn seed_ticket_type(db: &Database, id: &str, available: i64) {
        let now = Utc::now();
        db.tickets()
            .insert_ticket_type(&TicketType {
                id: id.to_string(),
                event_id: "ev-1".to_string(),
                name: "GA".to_string(),
                price_cents: 2_500,
                total_quantity: available,
                available_quantity: available,
                max_per_customer: 0,
                is_active: true,
                sale_starts_at: None,
                sale_ends_at: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
        }
    }

    fn pricing(subtotal: i64) -> PricingBreakdown {
        PricingBreakdown {
            subtotal_cents: subtotal,
            discount_cents: 0,
            tax_cents: 0,
            platform_fee_cents: 0,
            processor_fee_cents: 0,
            total_cents: subtotal,
        }
    }

    fn ticket_metadata(quantity: i64) -> CartMetadata {
        CartMetadata::TicketCart {
            event_id: "ev-1".to_string(),
            items: vec![TicketLine {
                ticket_type_id: Some("tt-1".to_string()),
                quantity,
                unit_price_cents: 2_500,
            }],
            pricing: pricing(2_500 * quantity),
            customer: customer(),
            promo_code: None,
            tracking_ref: None,
        }
    }

    struct Harness {
        db: Database,
        gateway: Arc<FakeGateway>,
        notifier: Arc<RecordingNotifier>,
        processor: FulfillmentProcessor,
    }

    async fn harness_with(notifier: RecordingNotifier, attribution: FixedAttribution) -> Harness {
        let db = test_db().await;
        let gateway = Arc::new(FakeGateway::new());
        let notifier = Arc::new(notifier);
        let processor = FulfillmentProcessor::new(
            db.clone(),
            gateway.clone(),
            notifier.clone(),
            Arc::new(attribution),
        );
        Harness {
            db,
            gateway,
            notifier,
            processor,
        }
    }

    async fn harness() -> Harness {
        harness_with(RecordingNotifier::new(), FixedAttribution::default()).await
    }

    #[tokio::test]
    async fn test_ticket_cart_fulfillment() {
        let h = harness().await;
        seed_ticket_type(&h.db, "tt-1", 10).await;

        let reference = h
            .gateway
            .settled(Money::from_cents(5_000), ticket_metadata(2));
        let outcome = h.processor.fulfill(&reference).await.unwrap();

        assert!(!outcome.is_replay());
        let bundle = outcome.bundle();
        let order = bundle.order.as_ref().unwrap();
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.payment_intent_id, reference);
        assert_eq!(bundle.tickets.len(), 2);

        for ticket in &bundle.tickets {
            assert!(ticket.ticket_number.starts_with("TKT-"));
            assert_eq!(
                ticket.qr_payload,
                format!("{}|ev-1|{}", ticket.ticket_number, order.id)
            );
            assert_eq!(ticket.status, TicketStatus::Valid);
        }

        let tt = h.db.tickets().get_ticket_type("tt-1").await.unwrap().unwrap();
        assert_eq!(tt.available_quantity, 8);

        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fulfillment_is_idempotent() {
        let h = harness().await;
        seed_ticket_type(&h.db, "tt-1", 10).await;

        let reference = h
            .gateway
            .settled(Money::from_cents(5_000), ticket_metadata(2));

        let first = h.processor.fulfill(&reference).await.unwrap();
        let second = h.processor.fulfill(&reference).await.unwrap();

        assert!(second.is_replay());
        assert_eq!(
            first.bundle().order.as_ref().unwrap().id,
            second.bundle().order.as_ref().unwrap().id
        );
        assert_eq!(first.bundle().tickets.len(), second.bundle().tickets.len());

        // No double decrement.
        let tt = h.db.tickets().get_ticket_type("tt-1").await.unwrap().unwrap();
        assert_eq!(tt.available_quantity, 8);
    }

    #[tokio::test]
    async fn test_insufficient_inventory_rolls_everything_back() {
        let h = harness().await;
        seed_ticket_type(&h.db, "tt-1", 1).await;

        let reference = h
            .gateway
            .settled(Money::from_cents(5_000), ticket_metadata(2));
        let err = h.processor.fulfill(&reference).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Insufficient tickets"), "{msg}");
        assert!(msg.contains("available 1"), "{msg}");

        // The rejection left no footprint: no order, no guard row, the
        // counter untouched.
        assert!(h
            .db
            .tickets()
            .get_order_by_payment_intent(&reference)
            .await
            .unwrap()
            .is_none());
        let tt = h.db.tickets().get_ticket_type("tt-1").await.unwrap().unwrap();
        assert_eq!(tt.available_quantity, 1);

        // Restock, retry the same reference: now it succeeds.
        sqlx::query("UPDATE ticket_types SET total_quantity = 2, available_quantity = 2 WHERE id = 'tt-1'")
            .execute(h.db.pool())
            .await
            .unwrap();
        let outcome = h.processor.fulfill(&reference).await.unwrap();
        assert!(!outcome.is_replay());
    }

    #[tokio::test]
    async fn test_unsettled_payment_is_rejected() {
        let h = harness().await;
        seed_ticket_type(&h.db, "tt-1", 10).await;

        let reference = h
            .gateway
            .create_intent(Money::from_cents(5_000), &ticket_metadata(2))
            .await
            .unwrap();

        let err = h.processor.fulfill(&reference).await.unwrap_err();
        assert!(err.to_string().contains("not settled"));

        // Settle, then it goes through.
        h.gateway.settle(&reference);
        assert!(h.processor.fulfill(&reference).await.is_ok());
    }

    #[tokio::test]
    async fn test_table_cart_fulfillment_defers_assignment() {
        let h = harness().await;

        let template = TableSectionTemplate {
            id: Uuid::new_v4().to_string(),
            business_id: "biz-1".to_string(),
            name: "VIP".to_string(),
            price_cents: 10_000,
            total_tables: 5,
            max_per_customer: 0,
            min_spend_cents: 0,
            created_at: Utc::now(),
        };
        let section = derive_section_from_template(&template, "ev-1");
        h.db.tables().insert_section(&section).await.unwrap();

        let metadata = CartMetadata::TableCart {
            event_id: "ev-1".to_string(),
            selections: vec![TableSelection {
                section_id: section.id.clone(),
                quantity: 2,
                unit_price_cents: 10_000,
                party_size: 4,
            }],
            pricing: pricing(20_000),
            customer: customer(),
        };
        let reference = h.gateway.settled(Money::from_cents(20_000), metadata);

        let outcome = h.processor.fulfill(&reference).await.unwrap();
        let bundle = outcome.bundle();
        assert!(bundle.order.is_none());
        assert_eq!(bundle.bookings.len(), 2);
        for booking in &bundle.bookings {
            assert_eq!(booking.status, BookingStatus::Confirmed);
            assert!(booking.table_number.is_none());
            assert_eq!(booking.order_id.as_deref(), Some(reference.as_str()));
        }

        let after = h.db.tables().require_section(&section.id).await.unwrap();
        assert_eq!(after.available_tables, 3);

        // Replay: same booking set, no further decrement.
        let replay = h.processor.fulfill(&reference).await.unwrap();
        assert!(replay.is_replay());
        assert_eq!(replay.bundle().bookings.len(), 2);
        let after = h.db.tables().require_section(&section.id).await.unwrap();
        assert_eq!(after.available_tables, 3);
    }

    #[tokio::test]
    async fn test_post_commit_failures_are_swallowed() {
        let h = harness_with(
            RecordingNotifier::failing(),
            FixedAttribution {
                link_id: None,
                fail: true,
            },
        )
        .await;
        seed_ticket_type(&h.db, "tt-1", 10).await;

        let metadata = CartMetadata::TicketCart {
            event_id: "ev-1".to_string(),
            items: vec![TicketLine {
                ticket_type_id: Some("tt-1".to_string()),
                quantity: 1,
                unit_price_cents: 2_500,
            }],
            pricing: pricing(2_500),
            customer: customer(),
            promo_code: None,
            tracking_ref: Some("ref-123".to_string()),
        };
        let reference = h.gateway.settled(Money::from_cents(2_500), metadata);

        // Notifier and attribution both fail; the payer still gets
        // their order.
        let outcome = h.processor.fulfill(&reference).await.unwrap();
        assert!(outcome.bundle().order.is_some());
        assert!(h
            .db
            .tickets()
            .get_order_by_payment_intent(&reference)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_promo_and_attribution_post_commit() {
        let h = harness_with(
            RecordingNotifier::new(),
            FixedAttribution {
                link_id: Some("link-42".to_string()),
                fail: false,
            },
        )
        .await;
        seed_ticket_type(&h.db, "tt-1", 10).await;
        h.db.promos()
            .insert(&PromoCode {
                id: "promo-1".to_string(),
                business_id: "biz-1".to_string(),
                code: "EARLYBIRD".to_string(),
                kind: PromoKind::Fixed,
                value: 500,
                usage_count: 0,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let metadata = CartMetadata::TicketCart {
            event_id: "ev-1".to_string(),
            items: vec![TicketLine {
                ticket_type_id: Some("tt-1".to_string()),
                quantity: 1,
                unit_price_cents: 2_500,
            }],
            pricing: pricing(2_000),
            customer: customer(),
            promo_code: Some("EARLYBIRD".to_string()),
            tracking_ref: Some("ref-123".to_string()),
        };
        let reference = h.gateway.settled(Money::from_cents(2_000), metadata);

        let outcome = h.processor.fulfill(&reference).await.unwrap();
        let order = outcome.bundle().order.as_ref().unwrap();
        assert_eq!(order.tracking_link_id.as_deref(), Some("link-42"));

        let promo = h
            .db
            .promos()
            .get_active("biz-1", "EARLYBIRD")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(promo.usage_count, 1);
    }
}
