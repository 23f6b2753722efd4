//! The module responsible for writing output data to disk.
use crate::aggregation::TimeStructure;
use crate::carrier::CarrierID;
use crate::network::ArcID;
use crate::node::NodeID;
use crate::optimisation::solution::CapacityValues;
use crate::optimisation::{Solution, SolveOutcome};
use crate::technology::TechnologyID;
use crate::units::{
    Capacity, Emissions, EmissionsPerHour, Energy, Flow, Hours, Money, MoneyPerEnergy,
};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "hubplan_results";

/// The output file name for installed capacities
const CAPACITIES_FILE_NAME: &str = "capacities.csv";

/// The output file name for asset activity
const DISPATCH_FILE_NAME: &str = "dispatch.csv";

/// The output file name for storage operation
const STORAGE_FILE_NAME: &str = "storage.csv";

/// The output file name for carrier flows of assets
const FLOWS_FILE_NAME: &str = "flows.csv";

/// The output file name for emissions captured by assets
const CAPTURE_FILE_NAME: &str = "capture.csv";

/// The output file name for flows along network arcs
const NETWORK_FILE_NAME: &str = "network.csv";

/// The output file name for imports, exports and unmet demand
const EXCHANGES_FILE_NAME: &str = "exchanges.csv";

/// The output file name for carrier prices
const PRICES_FILE_NAME: &str = "prices.csv";

/// The output file name for the representative blocks
const AGGREGATION_FILE_NAME: &str = "aggregation.csv";

/// The output file name for the run summary
const SUMMARY_FILE_NAME: &str = "summary.toml";

/// Get the output folder for the model in the specified directory
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory, if it doesn't already exist.
///
/// A non-empty directory is only replaced if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether an existing directory was overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut entries) = fs::read_dir(output_dir) {
        if entries.next().is_none() {
            // Already exists and is empty
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace it."
        );
        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Whether a row of the capacities file is for an asset or a network arc
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
enum CapacityOwner {
    Asset,
    Arc,
}

/// Represents a row of the capacities CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CapacityRow {
    period: u32,
    owner: CapacityOwner,
    id: String,
    installed: Capacity,
    new: Capacity,
    retired: Capacity,
}

impl CapacityRow {
    fn new(period: u32, owner: CapacityOwner, id: String, values: CapacityValues) -> Self {
        Self {
            period,
            owner,
            id,
            installed: values.installed,
            new: values.new,
            retired: values.retired,
        }
    }
}

/// Represents the asset columns of the dispatch, storage and flows CSV files
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct AssetColumns {
    node: NodeID,
    technology: TechnologyID,
}

/// Represents the value column of the dispatch CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ActivityColumns {
    activity: Flow,
}

/// Represents the value columns of the storage CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct StorageColumns {
    charge: Flow,
    discharge: Flow,
    level: Energy,
}

/// Represents the value column of the capture CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CaptureColumns {
    captured: EmissionsPerHour,
}

/// Represents the value columns of the flows CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct FlowColumns {
    carrier: CarrierID,
    flow: Flow,
}

/// Represents the arc columns of the network CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ArcFlowColumns {
    arc: ArcID,
    forward: Flow,
    reverse: Flow,
}

/// Represents the columns of the exchanges CSV file which follow the time columns
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ExchangeColumns {
    node: NodeID,
    carrier: CarrierID,
    import: Flow,
    export: Flow,
    unmet_demand: Flow,
}

/// Represents the columns of the prices CSV file which follow the time columns
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct PriceColumns {
    node: NodeID,
    carrier: CarrierID,
    price: MoneyPerEnergy,
}

/// Represents a row of the aggregation CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct AggregationRow {
    raw_block: usize,
    block: usize,
    weight: Hours,
    is_peak: bool,
}

/// Contents of the summary file
#[derive(Serialize, Debug)]
struct Summary {
    solver: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    objective: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emission_violation: Option<Emissions>,
    costs: BTreeMap<String, Money>,
    emissions: BTreeMap<String, Emissions>,
    captured: BTreeMap<String, Emissions>,
    fidelity: BTreeMap<String, FidelitySummary>,
}

/// How well the representative blocks reproduce a series
#[derive(Serialize, Debug)]
struct FidelitySummary {
    raw_total: f64,
    aggregated_total: f64,
    nrmse: f64,
}

/// An object for writing results to file
pub struct DataWriter {
    output_path: PathBuf,
    capacities_writer: csv::Writer<File>,
    dispatch_writer: csv::Writer<File>,
    storage_writer: csv::Writer<File>,
    flows_writer: csv::Writer<File>,
    capture_writer: csv::Writer<File>,
    network_writer: csv::Writer<File>,
    exchanges_writer: csv::Writer<File>,
    prices_writer: csv::Writer<File>,
    aggregation_writer: csv::Writer<File>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    pub fn create(output_path: &Path) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        Ok(Self {
            output_path: output_path.to_path_buf(),
            capacities_writer: new_writer(CAPACITIES_FILE_NAME)?,
            dispatch_writer: new_writer(DISPATCH_FILE_NAME)?,
            storage_writer: new_writer(STORAGE_FILE_NAME)?,
            flows_writer: new_writer(FLOWS_FILE_NAME)?,
            capture_writer: new_writer(CAPTURE_FILE_NAME)?,
            network_writer: new_writer(NETWORK_FILE_NAME)?,
            exchanges_writer: new_writer(EXCHANGES_FILE_NAME)?,
            prices_writer: new_writer(PRICES_FILE_NAME)?,
            aggregation_writer: new_writer(AGGREGATION_FILE_NAME)?,
        })
    }

    /// Write all solved values to CSV files
    pub fn write_solution(&mut self, solution: &Solution) -> Result<()> {
        self.write_capacities(solution)?;
        self.write_operation(solution)?;

        for (node, carrier, key, values) in solution.iter_exchanges() {
            let row = ExchangeColumns {
                node: node.clone(),
                carrier: carrier.clone(),
                import: values.import,
                export: values.export,
                unmet_demand: values.unmet_demand,
            };
            self.exchanges_writer.serialize((key, row))?;
        }

        for (node, carrier, key, price) in solution.iter_prices() {
            let row = PriceColumns {
                node: node.clone(),
                carrier: carrier.clone(),
                price,
            };
            self.prices_writer.serialize((key, row))?;
        }

        Ok(())
    }

    /// Write capacities of assets and arcs
    fn write_capacities(&mut self, solution: &Solution) -> Result<()> {
        for (node, technology, period, values) in solution.iter_asset_capacities() {
            let id = format!("{node}/{technology}");
            let row = CapacityRow::new(period, CapacityOwner::Asset, id, values);
            self.capacities_writer.serialize(row)?;
        }
        for (arc, period, values) in solution.iter_arc_capacities() {
            let row = CapacityRow::new(period, CapacityOwner::Arc, arc.to_string(), values);
            self.capacities_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Write activity, storage operation, flows and capture
    fn write_operation(&mut self, solution: &Solution) -> Result<()> {
        let asset_columns = |node: &NodeID, technology: &TechnologyID| AssetColumns {
            node: node.clone(),
            technology: technology.clone(),
        };

        for (node, technology, key, activity) in solution.iter_activity() {
            self.dispatch_writer.serialize((
                key,
                asset_columns(node, technology),
                ActivityColumns { activity },
            ))?;
        }
        for (node, technology, key, values) in solution.iter_storage() {
            let row = StorageColumns {
                charge: values.charge,
                discharge: values.discharge,
                level: values.level,
            };
            self.storage_writer
                .serialize((key, asset_columns(node, technology), row))?;
        }
        for (node, technology, carrier, key, flow) in solution.iter_carrier_flows() {
            let row = FlowColumns {
                carrier: carrier.clone(),
                flow,
            };
            self.flows_writer
                .serialize((key, asset_columns(node, technology), row))?;
        }
        for (node, technology, key, captured) in solution.iter_capture() {
            self.capture_writer.serialize((
                key,
                asset_columns(node, technology),
                CaptureColumns { captured },
            ))?;
        }
        for (arc, key, forward, reverse) in solution.iter_arc_flows() {
            let row = ArcFlowColumns {
                arc: arc.clone(),
                forward,
                reverse,
            };
            self.network_writer.serialize((key, row))?;
        }

        Ok(())
    }

    /// Write the assignment of raw blocks to representative blocks
    pub fn write_aggregation(&mut self, time_structure: &TimeStructure) -> Result<()> {
        let blocks = time_structure.blocks();
        for (raw_block, &block) in time_structure.assignment().iter().enumerate() {
            let row = AggregationRow {
                raw_block,
                block,
                weight: blocks[block].weight,
                is_peak: blocks[block].is_peak,
            };
            self.aggregation_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Write the solve status, costs, emissions and aggregation error to a TOML file
    pub fn write_summary(
        &self,
        solver_name: &str,
        outcome: &SolveOutcome,
        time_structure: &TimeStructure,
    ) -> Result<()> {
        let solution = outcome.solution.as_ref();
        let summary = Summary {
            solver: solver_name.to_string(),
            status: outcome.status.to_string(),
            objective: outcome.objective,
            gap: outcome.gap,
            emission_violation: solution.map(Solution::emission_violation),
            costs: solution
                .map(|solution| {
                    solution
                        .cost_totals()
                        .into_iter()
                        .map(|(category, cost)| (category.to_string(), cost))
                        .collect()
                })
                .unwrap_or_default(),
            emissions: solution
                .map(|solution| {
                    solution
                        .iter_emissions()
                        .map(|(year, emissions)| (year.to_string(), emissions))
                        .collect()
                })
                .unwrap_or_default(),
            captured: solution
                .map(|solution| {
                    solution
                        .captured_emissions()
                        .into_iter()
                        .map(|(year, captured)| (year.to_string(), captured))
                        .collect()
                })
                .unwrap_or_default(),
            fidelity: time_structure
                .fidelity()
                .iter()
                .map(|fidelity| {
                    (
                        fidelity.id.to_string(),
                        FidelitySummary {
                            raw_total: fidelity.raw_total,
                            aggregated_total: fidelity.aggregated_total,
                            nrmse: fidelity.nrmse,
                        },
                    )
                })
                .collect(),
        };

        let file_path = self.output_path.join(SUMMARY_FILE_NAME);
        let contents = toml::to_string(&summary)?;
        fs::write(&file_path, contents)
            .with_context(|| format!("Could not write {}", file_path.display()))?;

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.capacities_writer.flush()?;
        self.dispatch_writer.flush()?;
        self.storage_writer.flush()?;
        self.flows_writer.flush()?;
        self.capture_writer.flush()?;
        self.network_writer.flush()?;
        self.exchanges_writer.flush()?;
        self.prices_writer.flush()?;
        self.aggregation_writer.flush()?;

        Ok(())
    }
}
