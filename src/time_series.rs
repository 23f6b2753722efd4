//! Raw chronological time series.
//!
//! Demand profiles, capacity factors and any other time-varying inputs are provided as named
//! series covering one representative year at a fixed resolution. The
//! [`aggregation`](crate::aggregation) module reduces these to representative time blocks.
use crate::error::{ModelResult, ensure_config};
use crate::id::define_id_type;
use indexmap::IndexMap;
use std::borrow::Borrow;

define_id_type! {SeriesID}

/// A set of named, equal-length chronological time series
#[derive(Debug, Clone, PartialEq)]
pub struct RawTimeSeries {
    step_hours: f64,
    len: usize,
    series: IndexMap<SeriesID, Vec<f64>>,
}

impl RawTimeSeries {
    /// Create a new set of time series.
    ///
    /// # Arguments
    ///
    /// * `step_hours` - The duration of each step in hours (e.g. 1.0 for hourly data)
    /// * `series` - The values of each series
    pub fn new(step_hours: f64, series: IndexMap<SeriesID, Vec<f64>>) -> ModelResult<Self> {
        ensure_config!(
            step_hours.is_finite() && step_hours > 0.0,
            "Time series step length must be a positive number of hours"
        );
        let len = series.values().next().map_or(0, Vec::len);
        for (id, values) in &series {
            ensure_config!(
                values.len() == len,
                "Time series {id} has {} steps but expected {len}",
                values.len()
            );
            ensure_config!(
                values.iter().all(|value| value.is_finite()),
                "Time series {id} contains non-finite values"
            );
        }

        Ok(Self {
            step_hours,
            len,
            series,
        })
    }

    /// The duration of each step in hours
    pub fn step_hours(&self) -> f64 {
        self.step_hours
    }

    /// The number of steps in each series
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the series have no steps
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The total number of hours covered by the data
    pub fn total_hours(&self) -> f64 {
        self.len as f64 * self.step_hours
    }

    /// The number of series
    pub fn num_series(&self) -> usize {
        self.series.len()
    }

    /// Get the values of a series by ID
    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.series.get(id).map(Vec::as_slice)
    }

    /// The position of a series, if present
    pub fn index_of(&self, id: &SeriesID) -> Option<usize> {
        let key: &str = id.borrow();
        self.series.get_index_of(key)
    }

    /// Iterate over the series IDs
    pub fn ids(&self) -> impl Iterator<Item = &SeriesID> {
        self.series.keys()
    }

    /// Iterate over all series
    pub fn iter(&self) -> impl Iterator<Item = (&SeriesID, &[f64])> {
        self.series.iter().map(|(id, values)| (id, values.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use indexmap::indexmap;

    #[test]
    fn test_raw_time_series_new() {
        let series = RawTimeSeries::new(
            1.0,
            indexmap! {"demand".into() => vec![1.0, 2.0], "wind".into() => vec![0.5, 0.0]},
        )
        .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.total_hours(), 2.0);
        assert_eq!(series.get("wind"), Some([0.5, 0.0].as_slice()));
        assert_eq!(series.index_of(&"wind".into()), Some(1));
    }

    #[test]
    fn test_raw_time_series_bad_length() {
        let result = RawTimeSeries::new(
            1.0,
            indexmap! {"demand".into() => vec![1.0, 2.0], "wind".into() => vec![0.5]},
        );
        assert_eq!(
            result.unwrap_err(),
            ModelError::Configuration("Time series wind has 1 steps but expected 2".into())
        );
    }

    #[test]
    fn test_raw_time_series_bad_step() {
        assert!(RawTimeSeries::new(0.0, IndexMap::new()).is_err());
    }
}
