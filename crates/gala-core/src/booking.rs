//! # Booking State Machine
//!
//! Governs the lifecycle of a single table reservation, whether it was
//! created manually by staff or derived from a settled payment.
//!
//! ## Lifecycle
//! ```text
//! requested → approved → confirmed → arrived → seated → completed
//!     │           │          │          │         │
//!     └───────────┴──────────┴──────────┴─────────┴──→ cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. A `requested` booking may
//! jump straight to `confirmed` when staff approve it with a table
//! assignment in one step. Any other skip of an intermediate state is
//! rejected unless the caller passes an explicit override.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Status
// =============================================================================

/// The lifecycle status of a table booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Created by a free/unconfirmed reservation attempt. Does not
    /// guarantee a physical table.
    Requested,
    /// Staff accepted a request but have not yet assigned a table.
    Approved,
    /// Created directly by a successful paid reservation, or by staff
    /// approving a request with a table assignment.
    Confirmed,
    /// The party showed up.
    Arrived,
    /// The party is at the table.
    Seated,
    /// The engagement ended. Terminal.
    Completed,
    /// Released the table. Terminal.
    Cancelled,
}

impl BookingStatus {
    /// Position in the forward chain, if this status is part of it.
    fn rank(self) -> Option<u8> {
        match self {
            BookingStatus::Requested => Some(0),
            BookingStatus::Approved => Some(1),
            BookingStatus::Confirmed => Some(2),
            BookingStatus::Arrived => Some(3),
            BookingStatus::Seated => Some(4),
            BookingStatus::Completed => Some(5),
            BookingStatus::Cancelled => None,
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Whether a booking in this status counts against section capacity
    /// (when it also holds an assigned table number).
    pub fn occupies_table(self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// Checks whether moving from `self` to `next` is legal.
    ///
    /// ## Arguments
    /// * `next` - the requested target status
    /// * `allow_skip` - explicit override permitting non-adjacent moves
    ///
    /// ## Rules
    /// - nothing leaves a terminal status, override or not
    /// - `cancelled` is reachable from any non-terminal status
    /// - one step forward along the chain is always legal
    /// - `requested → confirmed` is legal (approval with table assignment)
    /// - any other move requires `allow_skip`
    pub fn validate_transition(self, next: BookingStatus, allow_skip: bool) -> CoreResult<()> {
        let reject = || {
            Err(CoreError::InvalidBookingTransition {
                from: self,
                to: next,
            })
        };

        if self.is_terminal() || next == self {
            return reject();
        }

        if next == BookingStatus::Cancelled {
            return Ok(());
        }

        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) if to == from + 1 => Ok(()),
            // Staff approving a request with a table in one step.
            _ if self == BookingStatus::Requested && next == BookingStatus::Confirmed => Ok(()),
            _ if allow_skip => Ok(()),
            _ => reject(),
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Approved => "approved",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Arrived => "arrived",
            BookingStatus::Seated => "seated",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::BookingStatus::*;

    #[test]
    fn test_forward_chain_is_legal() {
        assert!(Requested.validate_transition(Approved, false).is_ok());
        assert!(Approved.validate_transition(Confirmed, false).is_ok());
        assert!(Confirmed.validate_transition(Arrived, false).is_ok());
        assert!(Arrived.validate_transition(Seated, false).is_ok());
        assert!(Seated.validate_transition(Completed, false).is_ok());
    }

    #[test]
    fn test_request_to_confirmed_shortcut() {
        assert!(Requested.validate_transition(Confirmed, false).is_ok());
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for status in [Requested, Approved, Confirmed, Arrived, Seated] {
            assert!(status.validate_transition(Cancelled, false).is_ok());
        }
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        for target in [Requested, Approved, Confirmed, Arrived, Seated, Completed, Cancelled] {
            assert!(Completed.validate_transition(target, false).is_err());
            assert!(Cancelled.validate_transition(target, false).is_err());
            // Even with an override.
            assert!(Completed.validate_transition(target, true).is_err());
            assert!(Cancelled.validate_transition(target, true).is_err());
        }
    }

    #[test]
    fn test_skip_requires_override() {
        assert!(Requested.validate_transition(Seated, false).is_err());
        assert!(Requested.validate_transition(Seated, true).is_ok());
        assert!(Confirmed.validate_transition(Completed, false).is_err());
        assert!(Confirmed.validate_transition(Completed, true).is_ok());
    }

    #[test]
    fn test_self_transition_rejected() {
        assert!(Confirmed.validate_transition(Confirmed, false).is_err());
        assert!(Confirmed.validate_transition(Confirmed, true).is_err());
    }

    #[test]
    fn test_occupancy() {
        assert!(Requested.occupies_table());
        assert!(Confirmed.occupies_table());
        assert!(Seated.occupies_table());
        assert!(!Completed.occupies_table());
        assert!(!Cancelled.occupies_table());
    }
}
