//! # Domain Types
//!
//! Core domain types for the Gala booking engine.
//!
//! ## Type Hierarchy
//! ```text
//! Business ──┬── Event ──┬── TicketType ── Ticket
//!            │           └── EventTableSection ── TableBooking
//!            ├── TableSectionTemplate
//!            └── PromoCode
//!
//! Order ── Ticket (1:N), keyed by a unique payment reference
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every sellable entity has:
//! - `id`: UUID v4, immutable, used for database relations
//! - Business identifier (order_number, ticket_number): human-shareable

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::BookingStatus;
use crate::money::Money;
use crate::recurrence::RecurrenceRule;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01% = 1/10000, so 825 bps = 8.25%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Business
// =============================================================================

/// A business selling events. Carries the fee policy used to price every
/// cart it sells.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Business {
    pub id: String,
    pub name: String,
    pub fee_type: crate::fees::FeeKind,
    pub flat_fee_cents: i64,
    pub fee_rate_bps: i64,
    pub tax_rate_bps: i64,
    pub platform_fee_payer: crate::fees::FeePayer,
    pub processor_fee_payer: crate::fees::FeePayer,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    /// Assembles the full fee configuration for this business.
    pub fn fee_config(&self) -> crate::fees::FeeConfig {
        crate::fees::FeeConfig {
            policy: crate::fees::FeePolicy {
                kind: self.fee_type,
                flat: Money::from_cents(self.flat_fee_cents),
                rate_bps: self.fee_rate_bps as u32,
            },
            tax_rate: TaxRate::from_bps(self.tax_rate_bps as u32),
            platform_fee_payer: self.platform_fee_payer,
            processor_fee_payer: self.processor_fee_payer,
            processor: crate::fees::ProcessorRate::default(),
        }
    }
}

// =============================================================================
// Event
// =============================================================================

/// Publication status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
}

/// Role of an event inside (or outside) a recurring series.
///
/// Series membership is a flat set keyed by `series_root_id`; the role
/// tag replaces parent/instance branching in the callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SeriesRole {
    /// A plain event with no series involvement.
    Standalone,
    /// The series root; sole carrier of the recurrence rule.
    Root,
    /// A generated occurrence of a series.
    Instance,
    /// A former instance released from its series because it carries
    /// revenue history.
    Detached,
}

/// One dated occurrence sellable to the public.
///
/// Invariants:
/// - `recurrence_rule` is `Some` only when `series_role == Root`
/// - `series_root_id` is `Some` only when `series_role == Instance`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub business_id: String,
    pub title: String,
    pub description: Option<String>,
    pub event_date: NaiveDate,
    /// Wall-clock start, "HH:MM".
    pub start_time: Option<String>,
    pub status: EventStatus,
    pub series_root_id: Option<String>,
    pub series_role: SeriesRole,
    pub recurrence_rule: Option<RecurrenceRule>,
    /// Legacy per-event admission counter, used when the event has no
    /// ticket types.
    pub total_tickets: i64,
    pub available_tickets: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Ticket Types & Tickets
// =============================================================================

/// A priced category of admission for one event, with its own capacity
/// counter. Invariant: `0 ≤ available_quantity ≤ total_quantity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TicketType {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub price_cents: i64,
    pub total_quantity: i64,
    pub available_quantity: i64,
    /// 0 means unlimited.
    pub max_per_customer: i64,
    pub is_active: bool,
    pub sale_starts_at: Option<DateTime<Utc>>,
    pub sale_ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Whether the type is active and inside its sale window at `now`.
    pub fn on_sale(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(start) = self.sale_starts_at {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.sale_ends_at {
            if now > end {
                return false;
            }
        }
        true
    }
}

/// Status of one sold ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Valid,
    Used,
    Cancelled,
}

/// One sold admission unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Ticket {
    pub id: String,
    /// Globally unique, human-shareable (`TKT-...`).
    pub ticket_number: String,
    pub order_id: String,
    pub event_id: String,
    pub ticket_type_id: Option<String>,
    /// Price actually paid, frozen at purchase time.
    pub price_cents: i64,
    pub status: TicketStatus,
    pub qr_payload: String,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Status of a ticket order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Completed,
    Refunded,
    Cancelled,
}

/// The durable record of one completed purchase, keyed by a unique
/// payment reference for idempotency. At most one order exists per
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    /// Globally unique, human-shareable (`ORD-...`).
    pub order_number: String,
    pub event_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub platform_fee_cents: i64,
    pub processor_fee_cents: i64,
    pub total_cents: i64,
    /// The idempotency key.
    pub payment_intent_id: String,
    pub promo_code: Option<String>,
    pub tracking_link_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Table Sections & Bookings
// =============================================================================

/// Capacity-check policy for one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// The persisted `available_tables` counter is authoritative and
    /// decremented atomically at commit time. Paid sections.
    Enforced,
    /// Availability is derived live and requests may exceed it, to be
    /// triaged by staff. Free sections.
    Advisory,
}

/// A business-level template from which event sections are derived at
/// event-creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TableSectionTemplate {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub price_cents: i64,
    pub total_tables: i64,
    pub max_per_customer: i64,
    pub min_spend_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// A bookable table category for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTableSection {
    pub id: String,
    pub event_id: String,
    pub template_id: Option<String>,
    pub name: String,
    pub price_cents: i64,
    pub total_tables: i64,
    /// Table names temporarily unsellable.
    pub closed_tables: Vec<String>,
    /// Adjacent tables merged into one sellable unit; each pair reduces
    /// effective capacity by one.
    pub linked_table_pairs: Vec<(String, String)>,
    /// Persisted counter, authoritative only under `Enforced` policy.
    pub available_tables: i64,
    pub capacity_policy: CapacityPolicy,
    pub max_per_customer: i64,
    pub min_spend_cents: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventTableSection {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Capacity after closures and linked pairs, before occupancy.
    pub fn effective_capacity(&self) -> i64 {
        self.total_tables - self.closed_tables.len() as i64 - self.linked_table_pairs.len() as i64
    }
}

/// One reservation occupying (or requesting) one table within a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TableBooking {
    pub id: String,
    pub section_id: String,
    pub event_id: String,
    /// A payment reference, a `FREE-...` synthetic id, or None for
    /// manual staff entries.
    pub order_id: Option<String>,
    /// Null until staff assigns a concrete table.
    pub table_number: Option<String>,
    /// Archived at completion; table numbers are not recycled within
    /// one event.
    pub completed_table_number: Option<String>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub party_size: i64,
    pub amount_cents: i64,
    pub tax_cents: i64,
    pub refunded_cents: i64,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TableBooking {
    /// Whether this booking counts against section capacity.
    pub fn occupies_table(&self) -> bool {
        self.status.occupies_table() && self.table_number.is_some()
    }
}

// =============================================================================
// Promo Codes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PromoKind {
    /// `value` is a discount in basis points.
    Percentage,
    /// `value` is a discount in cents.
    Fixed,
}

/// A discount code owned by a business. Usage is counted at fulfillment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PromoCode {
    pub id: String,
    pub business_id: String,
    pub code: String,
    pub kind: PromoKind,
    pub value: i64,
    pub usage_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Cart Metadata
// =============================================================================

/// Customer identity captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// One ticket-type line in a ticket cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLine {
    /// None selects the event's legacy admission counter.
    pub ticket_type_id: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// One section/quantity pair in a table cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSelection {
    pub section_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default = "default_party_size")]
    pub party_size: i64,
}

fn default_party_size() -> i64 {
    1
}

/// Pricing breakdown frozen into the metadata bag at intent creation,
/// re-derived and recorded verbatim at fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub platform_fee_cents: i64,
    pub processor_fee_cents: i64,
    pub total_cents: i64,
}

/// The metadata bag attached to a payment intent: a tagged schema,
/// validated at the boundary before fulfillment touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cart", rename_all = "snake_case")]
pub enum CartMetadata {
    TicketCart {
        event_id: String,
        items: Vec<TicketLine>,
        pricing: PricingBreakdown,
        customer: CustomerInfo,
        #[serde(default)]
        promo_code: Option<String>,
        #[serde(default)]
        tracking_ref: Option<String>,
    },
    TableCart {
        event_id: String,
        selections: Vec<TableSelection>,
        pricing: PricingBreakdown,
        customer: CustomerInfo,
    },
}

impl CartMetadata {
    pub fn event_id(&self) -> &str {
        match self {
            CartMetadata::TicketCart { event_id, .. } => event_id,
            CartMetadata::TableCart { event_id, .. } => event_id,
        }
    }

    pub fn customer(&self) -> &CustomerInfo {
        match self {
            CartMetadata::TicketCart { customer, .. } => customer,
            CartMetadata::TableCart { customer, .. } => customer,
        }
    }

    pub fn pricing(&self) -> &PricingBreakdown {
        match self {
            CartMetadata::TicketCart { pricing, .. } => pricing,
            CartMetadata::TableCart { pricing, .. } => pricing,
        }
    }
}

// =============================================================================
// Identifier Formats
// =============================================================================

fn random_suffix(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_uppercase()
}

/// Generates an order number: `ORD-<timestamp>-<random>`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", now.timestamp_millis(), random_suffix(6))
}

/// Generates a ticket number: `TKT-<timestamp>-<random>`.
pub fn generate_ticket_number(now: DateTime<Utc>) -> String {
    format!("TKT-{}-{}", now.timestamp_millis(), random_suffix(6))
}

/// Generates a synthetic order id for free reservations:
/// `FREE-<12-char-random>`.
pub fn generate_free_order_id() -> String {
    format!("FREE-{}", random_suffix(12))
}

/// Builds the QR payload encoded on a ticket:
/// `ticketNumber|eventId|orderId`.
pub fn qr_payload(ticket_number: &str, event_id: &str, order_id: &str) -> String {
    format!("{ticket_number}|{event_id}|{order_id}")
}

// =============================================================================
// Unit Tests
// =============================================================================
