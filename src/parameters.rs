//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::error::{ModelResult, ensure_config};
use crate::input::{input_err_msg, read_toml};
use crate::optimisation::SolverOptions;
use crate::parameter::{Interpolation, SparseParameter};
use crate::period::PeriodInfo;
use crate::time_series::SeriesID;
use crate::units::{
    Capacity, Dimensionless, Emissions, Hours, MoneyPerEmissions, MoneyPerEnergy, UnitType,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_unit_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            <$type>::new($value)
        }
    };
}

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_final_period_length, u32, 1);
define_unit_param_default!(default_discount_rate, Dimensionless, 0.05);
define_unit_param_default!(default_hours_per_year, Hours, 8760.0);
define_unit_param_default!(default_big_m, Capacity, 1e6);
define_param_default!(default_num_blocks, usize, 12);
define_param_default!(default_block_length, usize, 24);
define_unit_param_default!(default_step_hours, Hours, 1.0);
define_param_default!(default_aggregation_tolerance, f64, 1e-6);
define_param_default!(default_max_iterations, u32, 300);
define_unit_param_default!(default_value_of_lost_load, MoneyPerEnergy, 1e5);

/// Represents the contents of the entire model file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// Start years of the investment periods
    pub periods: Vec<u32>,
    /// Length of the final period in years
    #[serde(default = "default_final_period_length")]
    pub final_period_length: u32,
    /// Discount rate for costs and for annualising capital costs
    #[serde(default = "default_discount_rate")]
    pub discount_rate: Dimensionless,
    /// Number of hours in a year. Block weights are scaled to sum to this.
    #[serde(default = "default_hours_per_year")]
    pub hours_per_year: Hours,
    /// How to fill gaps in sparse period-indexed parameters
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Big-M used in disjunctive constraints where capacity is otherwise unbounded.
    ///
    /// Don't change unless you know what you're doing.
    #[serde(default = "default_big_m")]
    pub big_m: Capacity,
    /// Time aggregation settings
    #[serde(default)]
    pub aggregation: AggregationSettings,
    /// Energy balance settings
    #[serde(default)]
    pub balance: BalanceSettings,
    /// Emission accounting settings
    #[serde(default)]
    pub emissions: EmissionSettings,
    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,
    /// Solver settings
    #[serde(default)]
    pub solver: SolverOptions,
}

/// The method used to pick representative blocks
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMethod {
    /// Every block of the raw data is kept
    #[default]
    #[string = "full"]
    Full,
    /// Blocks are the centroids of k-means clusters
    #[string = "k_means"]
    KMeans,
    /// Blocks are the most central historical block of each cluster
    #[string = "k_medoids"]
    KMedoids,
}

/// Settings for the time aggregator
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AggregationSettings {
    /// Clustering method
    #[serde(default)]
    pub method: AggregationMethod,
    /// Number of representative blocks (including the peak block, if any)
    #[serde(default = "default_num_blocks")]
    pub num_blocks: usize,
    /// Number of raw time steps in each block (e.g. 24 for days of hourly data)
    #[serde(default = "default_block_length")]
    pub block_length: usize,
    /// Duration of each raw time step in hours
    #[serde(default = "default_step_hours")]
    pub step_hours: Hours,
    /// Series whose maximum identifies a block to keep as-is
    #[serde(default)]
    pub peak_series: Option<SeriesID>,
    /// Maximum relative deviation of reconstructed totals from raw totals
    #[serde(default = "default_aggregation_tolerance")]
    pub tolerance: f64,
    /// Maximum number of clustering iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            method: AggregationMethod::default(),
            num_blocks: default_num_blocks(),
            block_length: default_block_length(),
            step_hours: default_step_hours(),
            peak_series: None,
            tolerance: default_aggregation_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Settings for energy balances
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BalanceSettings {
    /// Whether demand may go unmet at a cost
    #[serde(default)]
    pub allow_unmet_demand: bool,
    /// The cost applied to unmet demand
    #[serde(default = "default_value_of_lost_load")]
    pub value_of_lost_load: MoneyPerEnergy,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            allow_unmet_demand: false,
            value_of_lost_load: default_value_of_lost_load(),
        }
    }
}

/// Whether an emission cap applies to each period or to the whole horizon
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmissionCapKind {
    /// Annual emissions in each period are capped
    #[default]
    #[string = "per_period"]
    PerPeriod,
    /// Total emissions over the horizon are capped
    #[string = "cumulative"]
    Cumulative,
}

/// Settings for emission accounting
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EmissionSettings {
    /// The emission cap (annual for per-period caps, total for cumulative caps)
    #[serde(default)]
    pub cap: Option<SparseParameter<Emissions>>,
    /// How the cap applies
    #[serde(default)]
    pub cap_kind: EmissionCapKind,
    /// Price paid per unit of emissions
    #[serde(default)]
    pub price: Option<SparseParameter<MoneyPerEmissions>>,
    /// If present, the cap may be exceeded at this cost per unit of emissions
    #[serde(default)]
    pub violation_penalty: Option<MoneyPerEmissions>,
}

/// Settings for storage technologies
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// Whether storage is prevented from charging and discharging in the same time step
    #[serde(default)]
    pub exclusive_charging: bool,
}

/// Check that the `periods` parameter is valid
fn check_periods(periods: &[u32], final_period_length: u32) -> ModelResult<PeriodInfo> {
    PeriodInfo::new(periods, final_period_length)
}

/// Check that the `discount_rate` parameter is valid
fn check_discount_rate(value: Dimensionless) -> ModelResult<()> {
    ensure_config!(
        value.is_finite() && value >= Dimensionless(0.0),
        "`discount_rate` must be a finite number no less than zero"
    );

    Ok(())
}

/// Check that the `hours_per_year` parameter is valid
fn check_hours_per_year(value: Hours) -> ModelResult<()> {
    ensure_config!(
        value.is_finite() && value > Hours(0.0),
        "`hours_per_year` must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that the `big_m` parameter is valid
fn check_big_m(value: Capacity) -> ModelResult<()> {
    ensure_config!(
        value.is_finite() && value > Capacity(0.0),
        "`big_m` must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that the aggregation settings are valid
fn check_aggregation(settings: &AggregationSettings) -> ModelResult<()> {
    ensure_config!(settings.num_blocks > 0, "`num_blocks` cannot be zero");
    ensure_config!(settings.block_length > 0, "`block_length` cannot be zero");
    ensure_config!(
        settings.step_hours.is_finite() && settings.step_hours > Hours(0.0),
        "`step_hours` must be a finite number greater than zero"
    );
    ensure_config!(
        settings.tolerance.is_finite() && settings.tolerance >= 0.0,
        "Aggregation `tolerance` must be a finite number no less than zero"
    );
    ensure_config!(
        settings.max_iterations > 0,
        "`max_iterations` cannot be zero"
    );

    Ok(())
}

/// Check that the `value_of_lost_load` parameter is valid
fn check_value_of_lost_load(value: MoneyPerEnergy) -> ModelResult<()> {
    ensure_config!(
        value.is_finite() && value > MoneyPerEnergy(0.0),
        "`value_of_lost_load` must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that the emission settings are valid
fn check_emissions(settings: &EmissionSettings) -> ModelResult<()> {
    if let Some(cap) = &settings.cap {
        ensure_config!(
            cap.all(|value| value.is_finite()),
            "Emission `cap` must be finite"
        );
        ensure_config!(
            settings.cap_kind == EmissionCapKind::PerPeriod
                || matches!(cap, SparseParameter::Constant(_)),
            "A cumulative emission `cap` must be a single value"
        );
    }
    if let Some(penalty) = settings.violation_penalty {
        ensure_config!(
            penalty.is_finite() && penalty > MoneyPerEmissions(0.0),
            "Emission `violation_penalty` must be a finite number greater than zero"
        );
    }

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters
    pub fn validate(&self) -> ModelResult<()> {
        check_periods(&self.periods, self.final_period_length)?;
        check_discount_rate(self.discount_rate)?;
        check_hours_per_year(self.hours_per_year)?;
        check_big_m(self.big_m)?;
        check_aggregation(&self.aggregation)?;
        check_value_of_lost_load(self.balance.value_of_lost_load)?;
        check_emissions(&self.emissions)?;
        self.solver.validate()?;

        Ok(())
    }

    /// The investment periods
    pub fn period_info(&self) -> ModelResult<PeriodInfo> {
        check_periods(&self.periods, self.final_period_length)
    }
}
