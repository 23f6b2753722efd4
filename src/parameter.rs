//! Period-indexed parameters.
//!
//! Inputs may specify a parameter for only some years. These are normalised into dense
//! [`PeriodTable`]s with one value per investment period, so that the formulation can index them
//! by period position.
use crate::error::{ModelError, ModelResult};
use crate::period::PeriodInfo;
use crate::units::UnitType;
use serde::de::{Deserialize, Deserializer, Error as _};
use serde_string_enum::DeserializeLabeledStringEnum;
use std::collections::BTreeMap;

/// How to fill periods which start between two specified years
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Use the value of the most recent specified year
    #[default]
    #[string = "step"]
    Step,
    /// Interpolate linearly between the surrounding specified years
    #[string = "linear"]
    Linear,
}

/// A parameter which is either constant or specified for some years only
#[derive(Debug, Clone, PartialEq)]
pub enum SparseParameter<T> {
    /// The same value for every period
    Constant(T),
    /// Values for particular years
    ByYear(BTreeMap<u32, T>),
}

impl<T: UnitType> From<T> for SparseParameter<T> {
    fn from(value: T) -> Self {
        Self::Constant(value)
    }
}

impl<T: UnitType> SparseParameter<T> {
    /// Create a parameter from `(year, value)` pairs
    pub fn by_year<I: IntoIterator<Item = (u32, T)>>(values: I) -> Self {
        Self::ByYear(values.into_iter().collect())
    }

    /// Iterate over the specified values
    fn iter_values(&self) -> Box<dyn Iterator<Item = T> + '_> {
        match self {
            Self::Constant(value) => Box::new(std::iter::once(*value)),
            Self::ByYear(map) => Box::new(map.values().copied()),
        }
    }

    /// Check that every specified value satisfies a predicate
    pub fn all<F: Fn(T) -> bool>(&self, predicate: F) -> bool {
        self.iter_values().all(predicate)
    }

    /// Get the value for a given year
    fn value_for_year(&self, year: u32, interpolation: Interpolation) -> Option<T> {
        let map = match self {
            Self::Constant(value) => return Some(*value),
            Self::ByYear(map) => map,
        };

        let (&prev_year, &prev) = map.range(..=year).next_back()?;
        if prev_year == year || interpolation == Interpolation::Step {
            return Some(prev);
        }

        // Past the last specified year, fill forward
        let Some((&next_year, &next)) = map.range(year..).next() else {
            return Some(prev);
        };

        let frac = f64::from(year - prev_year) / f64::from(next_year - prev_year);
        Some(T::new(prev.value() + frac * (next.value() - prev.value())))
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawSparseParameter<T> {
    Constant(T),
    ByYear(BTreeMap<String, T>),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for SparseParameter<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawSparseParameter::deserialize(deserializer)? {
            RawSparseParameter::Constant(value) => Ok(Self::Constant(value)),
            RawSparseParameter::ByYear(map) => {
                let map = map
                    .into_iter()
                    .map(|(year, value)| {
                        year.trim()
                            .parse()
                            .map(|year| (year, value))
                            .map_err(|_| D::Error::custom(format!("Invalid year: {year}")))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Self::ByYear(map))
            }
        }
    }
}

/// A value for each investment period
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTable<T>(Vec<T>);

impl<T: UnitType> PeriodTable<T> {
    /// Create a table with the same value for every period
    pub fn constant(num_periods: usize, value: T) -> Self {
        Self(vec![value; num_periods])
    }

    /// Create a table from one value per period
    pub fn from_values(values: Vec<T>) -> Self {
        Self(values)
    }

    /// Get the value for the period at the given position
    pub fn get(&self, period: usize) -> T {
        self.0[period]
    }

    /// Iterate over the values in period order
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.0.iter().copied()
    }

    /// Normalise an optional sparse parameter into a dense table.
    ///
    /// Periods before the first specified year take the default, if there is one. Periods after
    /// the last specified year take the last value.
    ///
    /// # Arguments
    ///
    /// * `parameter` - The parameter as specified in the input, if at all
    /// * `default` - The value to use where nothing was specified
    /// * `periods` - The investment periods
    /// * `interpolation` - How to fill gaps between specified years
    /// * `entity` - The entity the parameter belongs to, for error messages
    /// * `name` - The name of the parameter, for error messages
    pub fn normalise(
        parameter: Option<&SparseParameter<T>>,
        default: Option<T>,
        periods: &PeriodInfo,
        interpolation: Interpolation,
        entity: &str,
        name: &str,
    ) -> ModelResult<Self> {
        periods
            .iter()
            .map(|period| {
                parameter
                    .and_then(|p| p.value_for_year(period.start_year, interpolation))
                    .or(default)
                    .ok_or_else(|| {
                        ModelError::validation(
                            format!("{entity} (period starting {})", period.start_year),
                            format!("Missing value for `{name}` and no default exists"),
                        )
                    })
            })
            .collect::<ModelResult<_>>()
            .map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::MoneyPerCapacity;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn periods() -> PeriodInfo {
        PeriodInfo::new(&[2020, 2030, 2040, 2050], 10).unwrap()
    }

    fn sparse() -> SparseParameter<MoneyPerCapacity> {
        SparseParameter::by_year([
            (2030, MoneyPerCapacity(100.0)),
            (2050, MoneyPerCapacity(50.0)),
        ])
    }

    #[rstest]
    #[case(Interpolation::Step, [1.0, 100.0, 100.0, 50.0])]
    #[case(Interpolation::Linear, [1.0, 100.0, 75.0, 50.0])]
    fn test_normalise(
        periods: PeriodInfo,
        #[case] interpolation: Interpolation,
        #[case] expected: [f64; 4],
    ) {
        let table = PeriodTable::normalise(
            Some(&sparse()),
            Some(MoneyPerCapacity(1.0)),
            &periods,
            interpolation,
            "CCGT",
            "capital_cost",
        )
        .unwrap();
        for (value, expected) in table.iter().zip(expected) {
            assert_approx_eq!(f64, value.0, expected);
        }
    }

    #[rstest]
    fn test_normalise_fill_forward(periods: PeriodInfo) {
        let parameter = SparseParameter::by_year([(2020, MoneyPerCapacity(3.0))]);
        let table = PeriodTable::normalise(
            Some(&parameter),
            None,
            &periods,
            Interpolation::Linear,
            "CCGT",
            "capital_cost",
        )
        .unwrap();
        assert!(table.iter().all(|value| value == MoneyPerCapacity(3.0)));
    }

    #[rstest]
    fn test_normalise_missing(periods: PeriodInfo) {
        let result = PeriodTable::normalise(
            Some(&sparse()),
            None,
            &periods,
            Interpolation::Step,
            "CCGT",
            "capital_cost",
        );
        assert_eq!(
            result.unwrap_err(),
            ModelError::validation(
                "CCGT (period starting 2020)",
                "Missing value for `capital_cost` and no default exists"
            )
        );
    }

    #[rstest]
    fn test_normalise_constant(periods: PeriodInfo) {
        let table = PeriodTable::normalise(
            Some(&MoneyPerCapacity(7.0).into()),
            None,
            &periods,
            Interpolation::Step,
            "CCGT",
            "capital_cost",
        )
        .unwrap();
        assert_eq!(table, PeriodTable::constant(4, MoneyPerCapacity(7.0)));
    }

    #[test]
    fn test_deserialise() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            value: SparseParameter<MoneyPerCapacity>,
        }

        let wrapper: Wrapper = toml::from_str("value = 5.0").unwrap();
        assert_eq!(wrapper.value, SparseParameter::Constant(MoneyPerCapacity(5.0)));

        let wrapper: Wrapper = toml::from_str("value = {2030 = 100.0, 2050 = 50.0}").unwrap();
        assert_eq!(wrapper.value, sparse());

        assert!(toml::from_str::<Wrapper>("value = {twenty = 1.0}").is_err());
    }
}
