//! Investment periods.
//!
//! A model horizon is split into a sequence of multi-year investment periods. Capacity decisions
//! are taken at the start of each period and the operation of the system within a period is
//! represented by a single representative year.
use crate::error::{ModelResult, ensure_config};
use crate::finance::annuity_discount_sum;
use crate::units::Dimensionless;
use itertools::Itertools;

/// A single investment period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvestmentPeriod {
    /// Position of the period in the horizon
    pub index: usize,
    /// First calendar year of the period
    pub start_year: u32,
    /// Number of years in the period
    pub length: u32,
}

impl InvestmentPeriod {
    /// The first year after the end of this period
    pub fn end_year(&self) -> u32 {
        self.start_year + self.length
    }

    /// Whether the given year falls within this period
    pub fn contains(&self, year: u32) -> bool {
        (self.start_year..self.end_year()).contains(&year)
    }
}

/// The ordered, non-overlapping investment periods of a model
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodInfo {
    periods: Vec<InvestmentPeriod>,
}

impl PeriodInfo {
    /// Create periods from their start years and the length of the final period.
    ///
    /// The length of every other period is the gap to the next start year.
    pub fn new(start_years: &[u32], final_period_length: u32) -> ModelResult<Self> {
        ensure_config!(!start_years.is_empty(), "`periods` is empty");
        ensure_config!(
            start_years.iter().tuple_windows().all(|(a, b)| a < b),
            "`periods` must be composed of unique values in order"
        );
        ensure_config!(
            final_period_length > 0,
            "`final_period_length` must be greater than zero"
        );

        let periods = start_years
            .iter()
            .enumerate()
            .map(|(index, &start_year)| {
                let length = start_years
                    .get(index + 1)
                    .map_or(final_period_length, |next| next - start_year);
                InvestmentPeriod {
                    index,
                    start_year,
                    length,
                }
            })
            .collect();

        Ok(Self { periods })
    }

    /// The number of periods
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    /// Whether there are no periods (never true for a validated model)
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Get the period at the given position
    pub fn get(&self, index: usize) -> &InvestmentPeriod {
        &self.periods[index]
    }

    /// Iterate over the periods in order
    pub fn iter(&self) -> impl Iterator<Item = &InvestmentPeriod> {
        self.periods.iter()
    }

    /// The base year for discounting, i.e. the start of the first period
    pub fn base_year(&self) -> u32 {
        self.periods[0].start_year
    }

    /// The first year after the end of the horizon
    pub fn horizon_end(&self) -> u32 {
        self.periods[self.periods.len() - 1].end_year()
    }

    /// The first period whose start year is at least `year`, if any.
    ///
    /// Capacity built or existing until `year` is retired at the start of this period.
    pub fn first_starting_at_or_after(&self, year: u32) -> Option<usize> {
        self.periods.iter().position(|p| p.start_year >= year)
    }

    /// Present value of paying one unit of money every year of the given period
    pub fn annual_discount_sum(&self, index: usize, discount_rate: Dimensionless) -> Dimensionless {
        let period = self.get(index);
        annuity_discount_sum(
            discount_rate,
            self.base_year(),
            period.start_year,
            period.length,
        )
    }
}
