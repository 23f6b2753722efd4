//! Common routines for loading a model directory.
use crate::aggregation::TimeStructure;
use crate::parameters::ModelParameters;
use crate::registry::{EntityRegistry, SystemDescription};
use crate::time_series::{RawTimeSeries, SeriesID};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use log::info;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

const SYSTEM_FILE_NAME: &str = "system.toml";
const TIME_SERIES_FILE_NAME: &str = "time_series.csv";

/// A model loaded from disk, validated and ready to be formulated
#[derive(Debug)]
pub struct Model {
    /// Run configuration from `model.toml`
    pub parameters: ModelParameters,
    /// The validated entities of the system
    pub registry: EntityRegistry,
    /// The representative time blocks
    pub time_structure: TimeStructure,
}

/// Format an error message to include the file path.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Read named time series from a CSV file.
///
/// Each column holds one series, with the series ID in the header row. Each subsequent row is
/// one time step.
pub fn read_time_series(file_path: &Path, step_hours: f64) -> Result<RawTimeSeries> {
    let mut reader = csv::Reader::from_path(file_path).with_context(|| input_err_msg(file_path))?;
    let ids: Vec<SeriesID> = reader
        .headers()
        .with_context(|| input_err_msg(file_path))?
        .iter()
        .map(|header| header.trim().into())
        .collect();
    ensure!(!ids.is_empty(), "{} contains no series", file_path.display());

    let mut series: IndexMap<SeriesID, Vec<f64>> = IndexMap::new();
    for id in &ids {
        ensure!(
            series.insert(id.clone(), Vec::new()).is_none(),
            "Duplicate time series {id} in {}",
            file_path.display()
        );
    }
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| input_err_msg(file_path))?;
        for (field, values) in record.iter().zip(series.values_mut()) {
            let value: f64 = field.trim().parse().with_context(|| {
                format!(
                    "Invalid value '{field}' in row {} of {}",
                    row + 1,
                    file_path.display()
                )
            })?;
            values.push(value);
        }
    }

    let time_series = RawTimeSeries::new(step_hours, series).with_context(|| input_err_msg(file_path))?;
    ensure!(
        !time_series.is_empty(),
        "{} contains no time steps",
        file_path.display()
    );

    Ok(time_series)
}

/// Load a model from the specified directory.
///
/// The entities are validated against the run configuration and the time series are aggregated
/// into representative blocks.
///
/// # Arguments
///
/// * `model_dir` - Folder containing `model.toml`, `system.toml` and `time_series.csv`
///
/// # Returns
///
/// The loaded model or an error.
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
    let model_dir = model_dir.as_ref();
    let parameters = ModelParameters::from_path(model_dir)?;

    let system_path = model_dir.join(SYSTEM_FILE_NAME);
    let system: SystemDescription = read_toml(&system_path)?;

    let time_series_path = model_dir.join(TIME_SERIES_FILE_NAME);
    let time_series =
        read_time_series(&time_series_path, parameters.aggregation.step_hours.0)?;
    info!(
        "Read {} time series of {} steps",
        time_series.num_series(),
        time_series.len()
    );

    let registry = EntityRegistry::build(
        &system,
        parameters.period_info()?,
        &time_series,
        parameters.interpolation,
    )
    .with_context(|| input_err_msg(&system_path))?;
    let time_structure = TimeStructure::aggregate(
        &time_series,
        &parameters.aggregation,
        parameters.hours_per_year,
    )
    .context("Failed to aggregate time series")?;

    Ok(Model {
        parameters,
        registry,
        time_structure,
    })
}
