//! # Checkout Service
//!
//! Prices a cart under the business's fee policy and opens a payment
//! intent with the full metadata bag attached. Nothing is reserved
//! here: inventory is decremented only at fulfillment, after the
//! payment settles.
//!
//! Prices come from the database, not the client. A typed line's unit
//! price is read from its ticket type (or section) and frozen into the
//! metadata; the fulfillment processor re-reads the same numbers from
//! the stored bag.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use gala_core::error::CoreError;
use gala_core::fees::price_cart;
use gala_core::money::Money;
use gala_core::types::{
    CartMetadata, CustomerInfo, PricingBreakdown, PromoCode, PromoKind, TableSelection, TicketLine,
};
use gala_core::validation::{validate_customer, validate_table_cart, validate_ticket_cart};
use gala_db::Database;

use crate::error::EngineResult;
use crate::providers::PaymentGateway;

// =============================================================================
// Session
// =============================================================================

/// What checkout hands back to the caller: the opened intent and the
/// numbers the customer will be charged.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub payment_intent_id: String,
    pub pricing: PricingBreakdown,
}

// =============================================================================
// Service
// =============================================================================

/// Prices carts and opens payment intents.
pub struct CheckoutService {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutService {
    /// Creates a new CheckoutService.
    pub fn new(db: Database, gateway: Arc<dyn PaymentGateway>) -> Self {
        CheckoutService { db, gateway }
    }

    /// Opens a payment intent for a ticket cart.
    ///
    /// Typed lines take their price from the ticket type row; legacy
    /// lines (no ticket type) keep the caller-supplied event-level
    /// price. Sale windows and per-customer limits are checked here,
    /// before any payment exists.
    pub async fn begin_ticket_checkout(
        &self,
        event_id: &str,
        mut items: Vec<TicketLine>,
        customer: &CustomerInfo,
        promo_code: Option<&str>,
        tracking_ref: Option<&str>,
    ) -> EngineResult<CheckoutSession> {
        validate_customer(customer)?;

        let event = self.db.events().require(event_id).await?;
        let business = self.db.businesses().require(&event.business_id).await?;
        let now = Utc::now();

        for line in &mut items {
            if let Some(type_id) = &line.ticket_type_id {
                let tt = self
                    .db
                    .tickets()
                    .get_ticket_type(type_id)
                    .await?
                    .ok_or_else(|| CoreError::TicketTypeNotFound(type_id.clone()))?;

                if !tt.on_sale(now) {
                    return Err(CoreError::TicketTypeNotOnSale(tt.name).into());
                }

                if tt.max_per_customer > 0 {
                    let held = self
                        .db
                        .tickets()
                        .count_held_by_customer(event_id, Some(type_id), &customer.email)
                        .await?;
                    if held + line.quantity > tt.max_per_customer {
                        return Err(CoreError::PerCustomerLimitExceeded {
                            limit: tt.max_per_customer,
                            requested: held + line.quantity,
                        }
                        .into());
                    }
                }

                line.unit_price_cents = tt.price_cents;
            }
        }

        validate_ticket_cart(&items)?;

        let gross_subtotal: Money = items
            .iter()
            .map(|line| Money::from_cents(line.unit_price_cents).multiply_quantity(line.quantity))
            .sum();

        let discount = match promo_code {
            Some(code) => {
                let promo = self
                    .db
                    .promos()
                    .get_active(&business.id, code)
                    .await?
                    .ok_or_else(|| CoreError::Validation(
                        gala_core::error::ValidationError::InvalidFormat {
                            field: "promo code".to_string(),
                            reason: format!("'{code}' is not active"),
                        },
                    ))?;
                promo_discount(&promo, gross_subtotal)
            }
            None => Money::zero(),
        };

        let breakdown = price_cart(gross_subtotal - discount, &business.fee_config());
        let pricing = PricingBreakdown {
            subtotal_cents: gross_subtotal.cents(),
            discount_cents: discount.cents(),
            tax_cents: breakdown.tax.cents(),
            platform_fee_cents: breakdown.platform_fee.cents(),
            processor_fee_cents: breakdown.processor_fee.cents(),
            total_cents: breakdown.customer_total.cents(),
        };

        let metadata = CartMetadata::TicketCart {
            event_id: event_id.to_string(),
            items,
            pricing,
            customer: customer.clone(),
            promo_code: promo_code.map(str::to_string),
            tracking_ref: tracking_ref.map(str::to_string),
        };

        let payment_intent_id = self
            .gateway
            .create_intent(breakdown.customer_total, &metadata)
            .await?;

        info!(
            event_id = %event_id,
            intent = %payment_intent_id,
            total = %breakdown.customer_total,
            "Ticket checkout opened"
        );

        Ok(CheckoutSession {
            payment_intent_id,
            pricing,
        })
    }

    /// Opens a payment intent for a table cart over paid sections.
    pub async fn begin_table_checkout(
        &self,
        event_id: &str,
        mut selections: Vec<TableSelection>,
        customer: &CustomerInfo,
    ) -> EngineResult<CheckoutSession> {
        validate_customer(customer)?;

        let event = self.db.events().require(event_id).await?;
        let business = self.db.businesses().require(&event.business_id).await?;

        for selection in &mut selections {
            let section = self
                .db
                .tables()
                .get_section(&selection.section_id)
                .await?
                .ok_or_else(|| CoreError::SectionNotFound(selection.section_id.clone()))?;

            if !section.is_active {
                return Err(CoreError::SectionDisabled(section.name).into());
            }

            if section.max_per_customer > 0 && selection.quantity > section.max_per_customer {
                return Err(CoreError::PerCustomerLimitExceeded {
                    limit: section.max_per_customer,
                    requested: selection.quantity,
                }
                .into());
            }

            selection.unit_price_cents = section.price_cents;
        }

        validate_table_cart(&selections)?;

        let subtotal: Money = selections
            .iter()
            .map(|s| Money::from_cents(s.unit_price_cents).multiply_quantity(s.quantity))
            .sum();

        let breakdown = price_cart(subtotal, &business.fee_config());
        let pricing = PricingBreakdown {
            subtotal_cents: subtotal.cents(),
            discount_cents: 0,
            tax_cents: breakdown.tax.cents(),
            platform_fee_cents: breakdown.platform_fee.cents(),
            processor_fee_cents: breakdown.processor_fee.cents(),
            total_cents: breakdown.customer_total.cents(),
        };

        let metadata = CartMetadata::TableCart {
            event_id: event_id.to_string(),
            selections,
            pricing,
            customer: customer.clone(),
        };

        let payment_intent_id = self
            .gateway
            .create_intent(breakdown.customer_total, &metadata)
            .await?;

        info!(
            event_id = %event_id,
            intent = %payment_intent_id,
            total = %breakdown.customer_total,
            "Table checkout opened"
        );

        Ok(CheckoutSession {
            payment_intent_id,
            pricing,
        })
    }
}

/// Discount for a promo code, clamped at the subtotal.
fn promo_discount(promo: &PromoCode, subtotal: Money) -> Money {
    let raw = match promo.kind {
        PromoKind::Percentage => subtotal.mul_rate_bps(promo.value as u32),
        PromoKind::Fixed => Money::from_cents(promo.value),
    };
    if raw > subtotal {
        subtotal
    } else {
        raw
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
