//! General functions related to finance.
use crate::units::{Dimensionless, MoneyPerCapacity};

/// Calculates the capital recovery factor (CRF) for a given lifetime and discount rate.
///
/// The CRF is used to annualise capital costs over the lifetime of an asset.
pub fn capital_recovery_factor(lifetime: u32, discount_rate: Dimensionless) -> Dimensionless {
    if lifetime == 0 {
        return Dimensionless(0.0);
    }
    if discount_rate == Dimensionless(0.0) {
        return Dimensionless(1.0) / Dimensionless(lifetime as f64);
    }
    let factor = (Dimensionless(1.0) + discount_rate).powi(lifetime as i32);
    (discount_rate * factor) / (factor - Dimensionless(1.0))
}

/// Calculates the annual capital cost for a technology per unit of capacity
pub fn annual_capital_cost(
    capital_cost: MoneyPerCapacity,
    lifetime: u32,
    discount_rate: Dimensionless,
) -> MoneyPerCapacity {
    let crf = capital_recovery_factor(lifetime, discount_rate);
    capital_cost * crf
}

/// The factor by which a cost incurred in `year` is multiplied to express it in `base_year` terms.
///
/// Years before the base year are not discounted.
pub fn discount_factor(discount_rate: Dimensionless, base_year: u32, year: u32) -> Dimensionless {
    let elapsed = year.saturating_sub(base_year);
    (Dimensionless(1.0) + discount_rate).powi(-(elapsed as i32))
}

/// Sum of the discount factors for each year in `[first_year, first_year + num_years)`.
///
/// Multiplying an annual cost by this gives the present value of paying it every year in the span.
pub fn annuity_discount_sum(
    discount_rate: Dimensionless,
    base_year: u32,
    first_year: u32,
    num_years: u32,
) -> Dimensionless {
    (first_year..first_year + num_years)
        .map(|year| discount_factor(discount_rate, base_year, year))
        .sum()
}
