//! # Engine Error Types
//!
//! The orchestration layer joins domain errors, database errors, and
//! provider failures into one surface for callers.
//!
//! Capacity and validation errors pass through verbatim: they are
//! actionable by the end user or staff. Provider failures after a
//! committed payment never reach this type; the fulfillment processor
//! logs and swallows them.

use thiserror::Error;

use gala_core::error::CoreError;
use gala_db::DbError;

use crate::providers::ProviderError;

/// Errors surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule, capacity conflict, or validation failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database operation failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The payment gateway (or another provider) failed before any
    /// commit was made.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl From<gala_core::error::ValidationError> for EngineError {
    fn from(err: gala_core::error::ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Db(DbError::from(err))
    }
}

/// Convenience type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
