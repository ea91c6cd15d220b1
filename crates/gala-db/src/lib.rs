//! # gala-db: Database Layer for the Gala Booking Engine
//!
//! This crate provides database access for the engine. It uses SQLite
//! with sqlx for async operations.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (events, tickets, tables, promos)
//! - [`ledger`] - The inventory ledger's atomic counter primitives and
//!   derived-availability reads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gala_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/gala.db")).await?;
//!
//! let event = db.events().require("event-id").await?;
//! let stats = db.ledger().event_ticket_stats(&event.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use ledger::{InventoryLedger, Reservation, SoldState, TicketScanStats};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::business::BusinessRepository;
pub use repository::event::{EventRepository, SeriesPatch};
pub use repository::promo::PromoRepository;
pub use repository::table::TableRepository;
pub use repository::ticket::TicketRepository;
