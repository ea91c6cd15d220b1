//! # gala-engine: Orchestration for the Gala Booking Engine
//!
//! Composes the pure business logic of `gala-core` with the persistence
//! layer of `gala-db` into the engine's five flows:
//!
//! - [`checkout`] - prices a cart under the business fee policy and
//!   opens a payment intent with the metadata bag attached
//! - [`fulfillment`] - idempotently turns a settled payment reference
//!   into exactly one order and its tickets or table bookings
//! - [`booking_service`] - drives table reservations through the
//!   requested → ... → completed lifecycle
//! - [`lifecycle`] - generates, propagates edits across, and deletes
//!   recurring event series under the sold/booked gate
//! - [`providers`] - the injected traits for the payment gateway,
//!   notification dispatch, and attribution lookup
//!
//! ## Wiring
//! ```rust,ignore
//! use std::sync::Arc;
//! use gala_db::{Database, DbConfig};
//! use gala_engine::fulfillment::FulfillmentProcessor;
//!
//! let db = Database::new(DbConfig::new("./gala.db")).await?;
//! let processor = FulfillmentProcessor::new(
//!     db.clone(),
//!     stripe_gateway,   // Arc<dyn PaymentGateway>
//!     email_dispatch,   // Arc<dyn NotificationDispatch>
//!     ref_code_lookup,  // Arc<dyn AttributionLookup>
//! );
//!
//! // Called from the payment-confirmed redirect; safe to retry.
//! let outcome = processor.fulfill(&payment_intent_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod booking_service;
pub mod checkout;
pub mod error;
pub mod fulfillment;
pub mod lifecycle;
pub mod providers;

// =============================================================================
// Re-exports
// =============================================================================

pub use booking_service::BookingService;
pub use checkout::{CheckoutService, CheckoutSession};
pub use error::{EngineError, EngineResult};
pub use fulfillment::{FulfillmentBundle, FulfillmentOutcome, FulfillmentProcessor};
pub use lifecycle::{DeletionMode, DeletionSummary, GenerationSummary, RecurrenceManager};
pub use providers::{
    AttributionLookup, NotificationDispatch, PaymentGateway, PaymentIntent, PaymentStatus,
    ProviderError,
};
