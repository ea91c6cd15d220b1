//! # Fee & Tax Calculator
//!
//! Pure pricing math for a cart subtotal under a business's fee policy.
//!
//! ## Pricing Pipeline
//! ```text
//! subtotal
//!    │
//!    ▼
//! tax = subtotal × tax_rate                    (rounded)
//!    │
//!    ▼
//! platform_fee = policy(subtotal + tax)        (flat / percentage / higher-of-both)
//!    │
//!    ▼
//! charge = subtotal + tax [+ platform_fee if customer pays it]
//!    │
//!    ▼
//! processor fee:
//!   customer-paid → gross-up: charge' = (charge + f) / (1 - r)
//!   business-paid → fee = charge × r + f, absorbed
//!    │
//!    ▼
//! business_payout = customer_total − platform_fee − processor_fee
//! ```
//!
//! The platform fee is always computed against the taxable amount
//! (subtotal + tax); see DESIGN.md for the rationale. Every step rounds
//! half away from zero before the next step runs.

use serde::{Deserialize, Serialize};

use crate::money::{div_round_half_away, Money};
use crate::types::TaxRate;

// =============================================================================
// Policy Types
// =============================================================================

/// How the platform's own commission is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    /// Fixed amount per transaction.
    Flat,
    /// Percentage of the fee basis.
    Percentage,
    /// `max(flat, percentage)` of the fee basis.
    HigherOfBoth,
}

/// Who absorbs a given fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum FeePayer {
    /// The fee is deducted from the business payout.
    Business,
    /// The fee is added onto the customer's charge.
    Customer,
}

/// A business's configured platform-fee policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    pub kind: FeeKind,
    pub flat: Money,
    pub rate_bps: u32,
}

impl FeePolicy {
    /// Computes the platform fee against the given basis.
    pub fn fee_on(&self, basis: Money) -> Money {
        match self.kind {
            FeeKind::Flat => self.flat,
            FeeKind::Percentage => basis.mul_rate_bps(self.rate_bps),
            FeeKind::HigherOfBoth => self.flat.max(basis.mul_rate_bps(self.rate_bps)),
        }
    }
}

/// The payment processor's transaction cost: a flat amount plus a
/// proportional rate (e.g. $0.30 + 2.9%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorRate {
    pub flat: Money,
    pub rate_bps: u32,
}

impl Default for ProcessorRate {
    fn default() -> Self {
        ProcessorRate {
            flat: Money::from_cents(30),
            rate_bps: 290,
        }
    }
}

/// Full pricing configuration for one business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub policy: FeePolicy,
    pub tax_rate: TaxRate,
    pub platform_fee_payer: FeePayer,
    pub processor_fee_payer: FeePayer,
    pub processor: ProcessorRate,
}

// =============================================================================
// Breakdown
// =============================================================================

/// The result of pricing one cart.
///
/// Invariant: `business_payout = customer_total − platform_fee − processor_fee`,
/// regardless of who nominally pays each fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub subtotal: Money,
    pub tax: Money,
    pub platform_fee: Money,
    pub processor_fee: Money,
    /// The final amount charged to the customer.
    pub customer_total: Money,
    /// What the business receives after all fees.
    pub business_payout: Money,
}

// =============================================================================
// Calculator
// =============================================================================

/// Prices a cart subtotal under the given configuration.
///
/// ## Example
/// ```rust
/// use gala_core::fees::{price_cart, FeeConfig, FeeKind, FeePayer, FeePolicy, ProcessorRate};
/// use gala_core::money::Money;
/// use gala_core::types::TaxRate;
///
/// let config = FeeConfig {
///     policy: FeePolicy {
///         kind: FeeKind::HigherOfBoth,
///         flat: Money::from_cents(200),
///         rate_bps: 300,
///     },
///     tax_rate: TaxRate::zero(),
///     platform_fee_payer: FeePayer::Business,
///     processor_fee_payer: FeePayer::Business,
///     processor: ProcessorRate::default(),
/// };
///
/// let breakdown = price_cart(Money::from_cents(10_000), &config);
/// assert_eq!(breakdown.platform_fee.cents(), 300); // 3% of $100 > $2.00
/// ```
pub fn price_cart(subtotal: Money, config: &FeeConfig) -> FeeBreakdown {
    let tax = subtotal.calculate_tax(config.tax_rate);
    let taxable = subtotal + tax;

    // Platform fee basis is the taxable amount, per documented policy.
    let platform_fee = config.policy.fee_on(taxable);

    let mut charge = subtotal + tax;
    if config.platform_fee_payer == FeePayer::Customer {
        charge += platform_fee;
    }

    let processor_fee;
    match config.processor_fee_payer {
        FeePayer::Customer => {
            // Gross up so that after the processor takes its cut of the
            // grossed total, the intended charge remains.
            let grossed = gross_up(charge, config.processor);
            processor_fee = grossed - charge;
            charge = grossed;
        }
        FeePayer::Business => {
            processor_fee = charge.mul_rate_bps(config.processor.rate_bps) + config.processor.flat;
        }
    }

    FeeBreakdown {
        subtotal,
        tax,
        platform_fee,
        processor_fee,
        customer_total: charge,
        business_payout: charge - platform_fee - processor_fee,
    }
}

/// Solves `charge' = (charge + f) / (1 - r)` in integer cents, rounding
/// half away from zero.
///
/// ## Example
/// ```rust
/// use gala_core::fees::{gross_up, ProcessorRate};
/// use gala_core::money::Money;
///
/// // $100.00 base, $0.30 + 2.9% → $103.30
/// let grossed = gross_up(Money::from_cents(10_000), ProcessorRate::default());
/// assert_eq!(grossed.cents(), 10_330);
/// ```
pub fn gross_up(charge: Money, processor: ProcessorRate) -> Money {
    let numerator = (charge + processor.flat).cents() as i128 * 10_000;
    let denominator = 10_000 - processor.rate_bps as i128;
    Money::from_cents(div_round_half_away(numerator, denominator) as i64)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: FeeKind, flat: i64, rate_bps: u32) -> FeeConfig {
        FeeConfig {
            policy: FeePolicy {
                kind,
                flat: Money::from_cents(flat),
                rate_bps,
            },
            tax_rate: TaxRate::zero(),
            platform_fee_payer: FeePayer::Business,
            processor_fee_payer: FeePayer::Business,
            processor: ProcessorRate::default(),
        }
    }

    #[test]
    fn test_higher_of_both_picks_percentage_on_large_cart() {
        // flat=$2.00, rate=3%, subtotal=$100.00 → 3% wins: $3.00
        let breakdown = price_cart(Money::from_cents(10_000), &config(FeeKind::HigherOfBoth, 200, 300));
        assert_eq!(breakdown.platform_fee.cents(), 300);
    }

    #[test]
    fn test_higher_of_both_picks_flat_on_small_cart() {
        // flat=$2.00, rate=3%, subtotal=$50.00 → $1.50 < $2.00: flat wins
        let breakdown = price_cart(Money::from_cents(5_000), &config(FeeKind::HigherOfBoth, 200, 300));
        assert_eq!(breakdown.platform_fee.cents(), 200);
    }

    #[test]
    fn test_flat_and_percentage_kinds() {
        let breakdown = price_cart(Money::from_cents(10_000), &config(FeeKind::Flat, 250, 300));
        assert_eq!(breakdown.platform_fee.cents(), 250);

        let breakdown = price_cart(Money::from_cents(10_000), &config(FeeKind::Percentage, 250, 300));
        assert_eq!(breakdown.platform_fee.cents(), 300);
    }

    #[test]
    fn test_platform_fee_basis_includes_tax() {
        // 10% tax: basis is $110.00, so 3% yields $3.30 not $3.00
        let mut cfg = config(FeeKind::Percentage, 0, 300);
        cfg.tax_rate = TaxRate::from_bps(1000);
        let breakdown = price_cart(Money::from_cents(10_000), &cfg);
        assert_eq!(breakdown.tax.cents(), 1_000);
        assert_eq!(breakdown.platform_fee.cents(), 330);
    }

    #[test]
    fn test_processor_gross_up() {
        // f=$0.30, r=2.9%, base charge $100.00 → (100.30)/(0.971) = $103.30
        let mut cfg = config(FeeKind::Flat, 0, 0);
        cfg.processor_fee_payer = FeePayer::Customer;
        let breakdown = price_cart(Money::from_cents(10_000), &cfg);
        assert_eq!(breakdown.customer_total.cents(), 10_330);
        assert_eq!(breakdown.processor_fee.cents(), 330);
    }

    #[test]
    fn test_business_absorbed_processor_fee() {
        // charge stays $100.00; fee = $100 × 2.9% + $0.30 = $3.20
        let breakdown = price_cart(Money::from_cents(10_000), &config(FeeKind::Flat, 0, 0));
        assert_eq!(breakdown.customer_total.cents(), 10_000);
        assert_eq!(breakdown.processor_fee.cents(), 320);
        assert_eq!(breakdown.business_payout.cents(), 9_680);
    }

    #[test]
    fn test_customer_paid_platform_fee_raises_charge() {
        let mut cfg = config(FeeKind::Flat, 200, 0);
        cfg.platform_fee_payer = FeePayer::Customer;
        cfg.processor = ProcessorRate {
            flat: Money::zero(),
            rate_bps: 0,
        };
        let breakdown = price_cart(Money::from_cents(10_000), &cfg);
        assert_eq!(breakdown.customer_total.cents(), 10_200);
        assert_eq!(breakdown.business_payout.cents(), 10_000);
    }

    #[test]
    fn test_payout_invariant_holds_for_all_payer_combinations() {
        for platform_payer in [FeePayer::Business, FeePayer::Customer] {
            for processor_payer in [FeePayer::Business, FeePayer::Customer] {
                let mut cfg = config(FeeKind::HigherOfBoth, 200, 300);
                cfg.tax_rate = TaxRate::from_bps(825);
                cfg.platform_fee_payer = platform_payer;
                cfg.processor_fee_payer = processor_payer;

                let b = price_cart(Money::from_cents(12_345), &cfg);
                assert_eq!(
                    b.business_payout,
                    b.customer_total - b.platform_fee - b.processor_fee,
                );
            }
        }
    }

    #[test]
    fn test_zero_subtotal() {
        let breakdown = price_cart(Money::zero(), &config(FeeKind::Percentage, 0, 300));
        assert_eq!(breakdown.platform_fee.cents(), 0);
        assert_eq!(breakdown.tax.cents(), 0);
        assert_eq!(breakdown.customer_total.cents(), 0);
    }
}
