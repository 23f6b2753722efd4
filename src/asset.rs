//! Assets are technologies installed (or installable) at a particular node.
//!
//! Assets and network arcs both carry a capacity which can be expanded over the investment
//! periods. Their investment-related parameters share the [`CapacityParameters`] type so that the
//! capacity accounting can treat them uniformly.
use crate::error::{ModelResult, ensure_valid};
use crate::parameter::PeriodTable;
use crate::period::PeriodInfo;
use crate::technology::{Technology, TechnologyID};
use crate::time_series::SeriesID;
use crate::units::{Capacity, Dimensionless, MoneyPerCapacity, MoneyPerCapacityPerYear};
use serde::Deserialize;

/// A technology at a node as described in the input
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InstallationDescription {
    /// The technology installed
    pub technology: TechnologyID,
    /// Capacity already installed at the start of the first period
    #[serde(default)]
    pub existing_capacity: Capacity,
    /// Remaining lifetime of the existing capacity in years
    #[serde(default)]
    pub existing_lifetime: u32,
    /// The maximum total installed capacity (unlimited if absent)
    #[serde(default)]
    pub max_capacity: Option<Capacity>,
    /// The capacity-factor profile for technologies which follow one
    #[serde(default)]
    pub capacity_factor: Option<SeriesID>,
}

/// Investment-related parameters of anything with an expandable capacity
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityParameters {
    /// Capacity already installed at the start of the first period
    pub existing_capacity: Capacity,
    /// Remaining lifetime of the existing capacity in years
    pub existing_lifetime: u32,
    /// Lifetime of newly built capacity in years
    pub lifetime: u32,
    /// The maximum total installed capacity (may be infinite)
    pub max_capacity: Capacity,
    /// The minimum installed capacity if built at all (discrete commissioning only)
    pub min_capacity: Capacity,
    /// The maximum capacity which can be added in each period (may be infinite)
    pub max_addition: PeriodTable<Capacity>,
    /// Whether capacity is commissioned as a whole
    pub discrete: bool,
    /// Overnight capital cost per unit of capacity
    pub capital_cost: PeriodTable<MoneyPerCapacity>,
    /// Annual fixed operating cost per unit of installed capacity
    pub fixed_operating_cost: PeriodTable<MoneyPerCapacityPerYear>,
    /// Discount rate used to annualise capital cost, if different from the model's
    pub discount_rate: Option<Dimensionless>,
}

impl CapacityParameters {
    /// Check the existing capacity against the limits
    pub fn validate(&self, entity: &str) -> ModelResult<()> {
        let existing = self.existing_capacity.0;
        ensure_valid!(
            existing.is_finite() && existing >= 0.0,
            entity,
            "`existing_capacity` must be a non-negative number"
        );
        ensure_valid!(
            existing == 0.0 || self.existing_lifetime > 0,
            entity,
            "`existing_lifetime` must be greater than zero when there is existing capacity"
        );
        ensure_valid!(
            self.max_capacity.0 >= 0.0,
            entity,
            "`max_capacity` must be non-negative"
        );
        ensure_valid!(
            existing <= self.max_capacity.0,
            entity,
            "`existing_capacity` exceeds `max_capacity`"
        );
        ensure_valid!(
            self.min_capacity <= self.max_capacity,
            entity,
            "`min_capacity` exceeds `max_capacity`"
        );
        ensure_valid!(
            self.max_addition.iter().all(|value| value.0 >= 0.0),
            entity,
            "`max_addition` must be non-negative"
        );

        Ok(())
    }

    /// Existing capacity still in service in the given period
    pub fn existing_in_period(&self, periods: &PeriodInfo, period: usize) -> Capacity {
        let retirement_year = periods.base_year() + self.existing_lifetime;
        if periods.get(period).start_year < retirement_year {
            self.existing_capacity
        } else {
            Capacity(0.0)
        }
    }

    /// The period in which existing capacity retires, if within the horizon
    pub fn existing_retirement_period(&self, periods: &PeriodInfo) -> Option<usize> {
        periods.first_starting_at_or_after(periods.base_year() + self.existing_lifetime)
    }

    /// The period in which capacity built in `period` retires, if within the horizon
    pub fn retirement_period(&self, periods: &PeriodInfo, period: usize) -> Option<usize> {
        periods.first_starting_at_or_after(periods.get(period).start_year + self.lifetime)
    }

    /// Whether capacity never survives past the period in which it is built.
    ///
    /// In this case installed capacity and new investment are the same quantity and no carry-over
    /// between periods is needed.
    pub fn is_single_period(&self, periods: &PeriodInfo) -> bool {
        let num_periods = periods.len();
        let existing_ok = self.existing_capacity.0 == 0.0
            || num_periods == 1
            || self.existing_retirement_period(periods) == Some(1);
        existing_ok
            && (0..num_periods).all(|period| {
                if period + 1 < num_periods {
                    self.retirement_period(periods, period) == Some(period + 1)
                } else {
                    self.lifetime <= periods.get(period).length
                }
            })
    }

    /// Whether no capacity can ever exist
    pub fn is_degenerate(&self) -> bool {
        self.max_capacity.0 == 0.0 && self.existing_capacity.0 == 0.0
    }
}

/// A technology at a node
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Position of the node in the registry
    pub node: usize,
    /// Position of the technology in the registry
    pub technology: usize,
    /// Capacity and investment parameters
    pub capacity: CapacityParameters,
    /// Position of the capacity-factor series, if the technology follows one
    pub capacity_factor: Option<usize>,
}

impl Asset {
    /// Resolve the capacity parameters of an installation of a technology
    pub fn capacity_parameters(
        installation: &InstallationDescription,
        technology: &Technology,
    ) -> CapacityParameters {
        CapacityParameters {
            existing_capacity: installation.existing_capacity,
            existing_lifetime: installation.existing_lifetime,
            lifetime: technology.lifetime,
            max_capacity: installation
                .max_capacity
                .unwrap_or(Capacity(f64::INFINITY)),
            min_capacity: technology.min_capacity,
            max_addition: technology.max_addition.clone(),
            discrete: technology.discrete,
            capital_cost: technology.capital_cost.clone(),
            fixed_operating_cost: technology.fixed_operating_cost.clone(),
            discount_rate: technology.discount_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::fixture::capacity_parameters;
    use rstest::rstest;

    #[rstest]
    fn test_existing_in_period(mut capacity_parameters: CapacityParameters) {
        let periods = PeriodInfo::new(&[2020, 2030, 2040], 10).unwrap();
        capacity_parameters.existing_capacity = Capacity(5.0);
        capacity_parameters.existing_lifetime = 15;
        assert_eq!(
            capacity_parameters.existing_in_period(&periods, 0),
            Capacity(5.0)
        );
        assert_eq!(
            capacity_parameters.existing_in_period(&periods, 1),
            Capacity(5.0)
        );
        assert_eq!(
            capacity_parameters.existing_in_period(&periods, 2),
            Capacity(0.0)
        );
        assert_eq!(capacity_parameters.existing_retirement_period(&periods), Some(2));
    }

    #[rstest]
    #[case(10, true)]
    #[case(5, true)]
    #[case(11, false)]
    #[case(30, false)]
    fn test_is_single_period(
        mut capacity_parameters: CapacityParameters,
        #[case] lifetime: u32,
        #[case] expected: bool,
    ) {
        let periods = PeriodInfo::new(&[2020, 2030, 2040], 10).unwrap();
        capacity_parameters.lifetime = lifetime;
        assert_eq!(capacity_parameters.is_single_period(&periods), expected);
    }

    #[rstest]
    fn test_validate(mut capacity_parameters: CapacityParameters) {
        assert!(capacity_parameters.validate("asset").is_ok());

        capacity_parameters.existing_capacity = Capacity(5.0);
        assert_eq!(
            capacity_parameters.validate("asset").unwrap_err(),
            ModelError::validation(
                "asset",
                "`existing_lifetime` must be greater than zero when there is existing capacity"
            )
        );

        capacity_parameters.existing_lifetime = 10;
        capacity_parameters.max_capacity = Capacity(1.0);
        assert_eq!(
            capacity_parameters.validate("asset").unwrap_err(),
            ModelError::validation("asset", "`existing_capacity` exceeds `max_capacity`")
        );
    }

    #[rstest]
    fn test_is_degenerate(mut capacity_parameters: CapacityParameters) {
        assert!(!capacity_parameters.is_degenerate());
        capacity_parameters.max_capacity = Capacity(0.0);
        assert!(capacity_parameters.is_degenerate());
    }
}
