//! # gala-core: Pure Business Logic for the Gala Booking Engine
//!
//! This crate is the heart of the engine. It contains all business logic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  gala-engine (orchestration)                    │
//! │   checkout · fulfillment · booking service · recurrence mgr     │
//! └───────────────┬─────────────────────────────┬───────────────────┘
//!                 │                             │
//! ┌───────────────▼───────────────┐  ┌──────────▼──────────────────┐
//! │   ★ gala-core (THIS CRATE) ★  │  │   gala-db (persistence)     │
//! │                               │  │   pool · repositories ·     │
//! │  money · fees · booking ·     │  │   ledger · migrations       │
//! │  recurrence · types ·         │  └─────────────────────────────┘
//! │  validation                   │
//! │                               │
//! │  NO I/O · PURE FUNCTIONS      │
//! └───────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Event, TicketType, Order, TableBooking, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`fees`] - Platform fee, tax, and processor-fee calculator
//! - [`booking`] - Table reservation state machine
//! - [`recurrence`] - Recurrence rules and occurrence expansion
//! - [`error`] - Domain error types
//! - [`validation`] - Pre-side-effect input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output, every time
//! 2. **No I/O**: database, network, and clock access stay outside
//! 3. **Integer Money**: all monetary values are cents (i64)
//! 4. **Explicit Errors**: typed enums, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod booking;
pub mod error;
pub mod fees;
pub mod money;
pub mod recurrence;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use booking::BookingStatus;
pub use error::{CoreError, CoreResult, ValidationError};
pub use fees::{price_cart, FeeBreakdown, FeeConfig, FeeKind, FeePayer, FeePolicy, ProcessorRate};
pub use money::Money;
pub use recurrence::{occurrences, Frequency, RecurrenceEnd, RecurrenceRule};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 50;

/// Maximum quantity of a single line in a cart. Prevents accidental
/// over-ordering (e.g. typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 100;
