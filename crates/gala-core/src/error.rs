//! # Error Types
//!
//! Domain-specific error types for gala-core.
//!
//! ## Error Taxonomy
//! ```text
//! validation        → rejected before any side effect
//! capacity conflict → rejected with the specific numeric shortfall
//! blocking rule     → rejected with a reason naming the revenue kind
//! invalid transition → rejected with the offending from/to pair
//! ```
//!
//! Capacity and validation errors are surfaced verbatim to the caller:
//! they are actionable by the end user or staff, so each one names the
//! offending ticket type or section and the shortfall where applicable.

use thiserror::Error;

use crate::booking::BookingStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Event cannot be found.
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// Ticket type cannot be found.
    #[error("Ticket type not found: {0}")]
    TicketTypeNotFound(String),

    /// Table section cannot be found.
    #[error("Table section not found: {0}")]
    SectionNotFound(String),

    /// Not enough tickets left for the requested quantity.
    #[error("Insufficient tickets for {name}: available {available}, requested {requested}")]
    InsufficientTickets {
        name: String,
        available: i64,
        requested: i64,
    },

    /// Not enough tables left in a capacity-enforced section.
    #[error("Insufficient tables in {section}: available {available}, requested {requested}")]
    InsufficientTables {
        section: String,
        available: i64,
        requested: i64,
    },

    /// The section is disabled for sale.
    #[error("Table section {0} is not open for booking")]
    SectionDisabled(String),

    /// A free reservation request was aimed at a paid section.
    #[error("Table section {0} requires payment and does not take free requests")]
    SectionRequiresPayment(String),

    /// The ticket type is inactive or outside its sale window.
    #[error("Ticket type {0} is not on sale")]
    TicketTypeNotOnSale(String),

    /// The requested quantity exceeds the per-customer limit.
    #[error("Per-customer limit exceeded: limit {limit}, requested {requested}")]
    PerCustomerLimitExceeded { limit: i64, requested: i64 },

    /// A booking lifecycle transition the state machine forbids.
    #[error("Invalid booking transition: {from:?} -> {to:?}")]
    InvalidBookingTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    /// Deletion blocked: the event has non-cancelled ticket sales.
    #[error("Event {0} has ticket sales and cannot be deleted")]
    EventHasTicketSales(String),

    /// Deletion blocked: the event has non-cancelled table bookings.
    #[error("Event {0} has table bookings and cannot be deleted")]
    EventHasTableBookings(String),

    /// The event is not a series root.
    #[error("Event {0} has no recurrence rule")]
    NotASeriesRoot(String),

    /// The payment has not settled, so nothing may be fulfilled.
    #[error("Payment {0} is not settled")]
    PaymentNotSettled(String),

    /// The metadata bag attached to a payment failed schema validation.
    #[error("Malformed cart metadata: {0}")]
    MalformedMetadata(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. malformed email, bad date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The cart contains no sellable lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Too many distinct lines in one cart.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_names_the_shortfall() {
        let err = CoreError::InsufficientTickets {
            name: "General Admission".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient tickets for General Admission: available 3, requested 5"
        );
    }

    #[test]
    fn test_blocking_errors_distinguish_revenue_kind() {
        let tickets = CoreError::EventHasTicketSales("ev-1".to_string());
        let tables = CoreError::EventHasTableBookings("ev-1".to_string());
        assert!(tickets.to_string().contains("ticket sales"));
        assert!(tables.to_string().contains("table bookings"));
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::EmptyCart.into();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
