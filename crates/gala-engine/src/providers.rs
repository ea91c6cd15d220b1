//! # External Provider Traits
//!
//! The engine consumes the payment provider, notification dispatch, and
//! attribution lookup only through these traits, injected as
//! constructor dependencies. Tests substitute in-memory fakes; nothing
//! reaches for a process-wide client.
//!
//! All monetary amounts cross the payment boundary as integer minor
//! units.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gala_core::money::Money;
use gala_core::types::{CartMetadata, Order, TableBooking, Ticket};

// =============================================================================
// Errors
// =============================================================================

/// Failures from an external provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not be reached or refused the call.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// No payment intent exists under the given reference.
    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),
}

// =============================================================================
// Payment Gateway
// =============================================================================

/// Settlement status of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Funds are captured; fulfillment may proceed.
    Settled,
    /// Still awaiting the payer.
    Pending,
    /// The payment failed or was abandoned.
    Failed,
}

/// A payment intent as the gateway reports it, metadata bag included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentStatus,
    pub amount_cents: i64,
    pub metadata: CartMetadata,
}

/// The payment provider boundary.
///
/// This engine never captures payments itself; it opens intents with a
/// metadata bag at checkout and reacts to already-settled confirmations
/// at fulfillment.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent for `amount` with the cart metadata
    /// attached, returning the intent reference.
    async fn create_intent(
        &self,
        amount: Money,
        metadata: &CartMetadata,
    ) -> Result<String, ProviderError>;

    /// Retrieves an intent by reference to confirm settlement and
    /// re-read its metadata.
    async fn retrieve_intent(&self, reference: &str) -> Result<PaymentIntent, ProviderError>;
}

// =============================================================================
// Notification Dispatch
// =============================================================================

/// Outbound confirmation dispatch (email/SMS). Called fire-and-forget
/// after commit; failures are logged, never surfaced to the payer.
#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    async fn order_confirmation(
        &self,
        order: &Order,
        tickets: &[Ticket],
    ) -> Result<(), ProviderError>;

    async fn booking_confirmation(&self, bookings: &[TableBooking]) -> Result<(), ProviderError>;
}

// =============================================================================
// Attribution Lookup
// =============================================================================

/// Resolves a marketing ref code to a tracking-link id. Fire-and-forget
/// after commit; failures are non-fatal.
#[async_trait]
pub trait AttributionLookup: Send + Sync {
    async fn resolve(&self, ref_code: &str) -> Result<Option<String>, ProviderError>;
}

// =============================================================================
// Test Fakes
// =============================================================================
