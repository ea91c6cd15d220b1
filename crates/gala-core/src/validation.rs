//! # Validation Module
//!
//! Pre-side-effect validation for carts and reservation requests.
//!
//! Validation runs before any counter is touched or any row is written;
//! a rejected cart has no footprint. Capacity checks are NOT here; those
//! belong to the inventory ledger, which must decide atomically.

use crate::error::ValidationError;
use crate::types::{CustomerInfo, TableSelection, TicketLine};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Customer
// =============================================================================

/// Validates customer identity captured at checkout.
///
/// ## Rules
/// - Name required, at most 200 characters
/// - Email required, must contain `@`
pub fn validate_customer(customer: &CustomerInfo) -> ValidationResult<()> {
    let name = customer.name.trim();
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "customer name".to_string(),
        });
    }
    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "customer name".to_string(),
            max: 200,
        });
    }

    let email = customer.email.trim();
    if email.is_empty() {
        return Err(ValidationError::Required {
            field: "customer email".to_string(),
        });
    }
    if !email.contains('@') {
        return Err(ValidationError::InvalidFormat {
            field: "customer email".to_string(),
            reason: "missing @".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Quantities
// =============================================================================

/// Validates a single line quantity.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a party size for a table reservation.
pub fn validate_party_size(party_size: i64) -> ValidationResult<()> {
    if party_size <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "party size".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Carts
// =============================================================================

/// Validates the shape of a ticket cart before pricing.
pub fn validate_ticket_cart(items: &[TicketLine]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::EmptyCart);
    }
    if items.len() > MAX_CART_LINES {
        return Err(ValidationError::CartTooLarge {
            max: MAX_CART_LINES,
        });
    }
    for item in items {
        validate_quantity(item.quantity)?;
        if item.unit_price_cents < 0 {
            return Err(ValidationError::MustBePositive {
                field: "unit price".to_string(),
            });
        }
    }
    Ok(())
}

/// Validates the shape of a table cart before pricing.
pub fn validate_table_cart(selections: &[TableSelection]) -> ValidationResult<()> {
    if selections.is_empty() {
        return Err(ValidationError::EmptyCart);
    }
    if selections.len() > MAX_CART_LINES {
        return Err(ValidationError::CartTooLarge {
            max: MAX_CART_LINES,
        });
    }
    for selection in selections {
        validate_quantity(selection.quantity)?;
        validate_party_size(selection.party_size)?;
        if selection.unit_price_cents < 0 {
            return Err(ValidationError::MustBePositive {
                field: "unit price".to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
