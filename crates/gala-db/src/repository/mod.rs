//! # Repository Module
//!
//! Repository implementations for database operations.
//!
//! ## The Repository Pattern
//! Each repository wraps the connection pool and owns the SQL for one
//! aggregate: events (and series membership), the ticket side (types,
//! orders, tickets), the table side (templates, sections, bookings),
//! and promo codes.
//!
//! Counter mutations under contention do NOT live here; those belong to
//! the inventory ledger.

pub mod business;
pub mod event;
pub mod fulfillment;
pub mod promo;
pub mod table;
pub mod ticket;

pub use business::BusinessRepository;
pub use event::{EventRepository, SeriesPatch};
pub use promo::PromoRepository;
pub use table::{derive_section_from_template, TableRepository};
pub use ticket::TicketRepository;
