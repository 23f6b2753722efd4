//! The time aggregator reduces raw chronological time series to representative blocks.
//!
//! The raw data is split into consecutive blocks of equal length (e.g. days of hourly data). Each
//! block is described by a feature vector of its min-max normalised values across all series and
//! similar blocks are clustered together. Every cluster is then represented by a single block whose
//! weight is the number of hours per year it stands for.
//!
//! Aggregation is lossy. After clustering, the non-peak blocks of every series are rescaled so
//! that annual totals are preserved and the remaining approximation error is reported per series
//! as a normalised root-mean-square error (NRMSE).
use crate::error::{ModelError, ModelResult, ensure_config};
use crate::parameters::{AggregationMethod, AggregationSettings};
use crate::time_series::{RawTimeSeries, SeriesID};
use crate::units::Hours;
use itertools::Itertools;
use log::{debug, info, warn};

/// Values smaller than this are treated as zero when rescaling
const RESCALE_EPSILON: f64 = 1e-12;

/// A representative time block
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBlock {
    /// Number of hours per year represented by this block
    pub weight: Hours,
    /// Positions of the raw blocks which this block represents, in chronological order
    pub members: Vec<usize>,
    /// Whether this block was kept as-is because it contains the peak
    pub is_peak: bool,
}

/// How faithfully the representative blocks reproduce a raw series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFidelity {
    /// The series
    pub id: SeriesID,
    /// Annual total of the raw series
    pub raw_total: f64,
    /// Annual total reconstructed from the representative blocks and their weights
    pub aggregated_total: f64,
    /// Root-mean-square error of the reconstructed chronological series, normalised by the range
    /// of the raw series
    pub nrmse: f64,
}

impl SeriesFidelity {
    /// Relative deviation of the reconstructed total from the raw total
    pub fn relative_error(&self) -> f64 {
        let difference = (self.aggregated_total - self.raw_total).abs();
        if self.raw_total.abs() > RESCALE_EPSILON {
            difference / self.raw_total.abs()
        } else {
            difference
        }
    }
}

/// The reduced time representation used by the formulation.
///
/// Every block has the same number of sub-steps. Operational quantities are indexed by *slot*,
/// where `slot = block * steps_per_block + step`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStructure {
    step_hours: Hours,
    steps_per_block: usize,
    blocks: Vec<TimeBlock>,
    series_ids: Vec<SeriesID>,
    values: Vec<Vec<f64>>,
    assignment: Vec<usize>,
    fidelity: Vec<SeriesFidelity>,
}

/// A group of raw blocks and the raw block chosen to represent them, if any
struct Cluster {
    members: Vec<usize>,
    medoid: Option<usize>,
}

impl TimeStructure {
    /// Reduce raw time series to representative blocks.
    ///
    /// # Arguments
    ///
    /// * `series` - The raw chronological time series
    /// * `settings` - Aggregation settings
    /// * `hours_per_year` - The total weight of all blocks
    ///
    /// # Returns
    ///
    /// The representative blocks or a configuration error if the settings are incompatible with
    /// the data.
    pub fn aggregate(
        series: &RawTimeSeries,
        settings: &AggregationSettings,
        hours_per_year: Hours,
    ) -> ModelResult<Self> {
        ensure_config!(!series.is_empty(), "There is no time series data to aggregate");
        let block_length = settings.block_length;
        ensure_config!(
            block_length > 0 && series.len() % block_length == 0,
            "Time series of {} steps cannot be split into blocks of {block_length} steps",
            series.len()
        );
        let num_raw_blocks = series.len() / block_length;
        let raw: Vec<&[f64]> = series.iter().map(|(_, values)| values).collect();

        let clustering = settings.method != AggregationMethod::Full;
        if clustering {
            ensure_config!(
                settings.num_blocks <= num_raw_blocks,
                "Requested {} representative blocks but the data only contains {num_raw_blocks} \
                blocks of {block_length} steps",
                settings.num_blocks
            );
        }
        let peak_block = match (&settings.peak_series, clustering) {
            (Some(id), true) => Some(find_peak_block(series, id, settings.num_blocks, block_length)?),
            (Some(_), false) => {
                debug!("Every block is kept, so there is no need to preserve the peak separately");
                None
            }
            (None, _) => None,
        };

        let candidates: Vec<usize> = (0..num_raw_blocks)
            .filter(|block| Some(*block) != peak_block)
            .collect();
        let mut clusters = if clustering {
            let features = block_features(&raw, block_length, num_raw_blocks);
            let k = settings.num_blocks - usize::from(peak_block.is_some());
            let seeds = farthest_point_seeds(&features, &candidates, k);
            if settings.method == AggregationMethod::KMeans {
                k_means(&features, &candidates, &seeds, settings.max_iterations)
            } else {
                k_medoids(&features, &candidates, &seeds, settings.max_iterations)
            }
        } else {
            candidates
                .iter()
                .map(|&block| Cluster {
                    members: vec![block],
                    medoid: Some(block),
                })
                .collect()
        };
        clusters.retain(|cluster| !cluster.members.is_empty());
        if let Some(peak) = peak_block {
            clusters.push(Cluster {
                members: vec![peak],
                medoid: Some(peak),
            });
        }
        for cluster in &mut clusters {
            cluster.members.sort_unstable();
        }
        clusters.sort_by_key(|cluster| cluster.members[0]);

        let structure = Self::from_clusters(
            series,
            &raw,
            &clusters,
            peak_block,
            block_length,
            hours_per_year,
        );
        structure.check_fidelity(settings.tolerance)?;

        let worst = structure
            .fidelity
            .iter()
            .max_by(|a, b| a.nrmse.total_cmp(&b.nrmse));
        if let Some(worst) = worst {
            info!(
                "Aggregated {num_raw_blocks} blocks of {block_length} steps into {} representative \
                blocks (worst NRMSE {:.4} for series {})",
                structure.blocks.len(),
                worst.nrmse,
                worst.id
            );
        }

        Ok(structure)
    }

    /// Build the representative blocks from the clusters and compute their fidelity
    fn from_clusters(
        series: &RawTimeSeries,
        raw: &[&[f64]],
        clusters: &[Cluster],
        peak_block: Option<usize>,
        block_length: usize,
        hours_per_year: Hours,
    ) -> Self {
        let num_raw_blocks = series.len() / block_length;
        let step_hours = series.step_hours();
        let annual_scale = hours_per_year.0 / series.total_hours();

        let mut assignment = vec![0; num_raw_blocks];
        for (index, cluster) in clusters.iter().enumerate() {
            for &member in &cluster.members {
                assignment[member] = index;
            }
        }

        let mut values: Vec<Vec<f64>> = raw
            .iter()
            .map(|values| {
                clusters
                    .iter()
                    .flat_map(|cluster| representative_values(values, cluster, block_length))
                    .collect()
            })
            .collect();

        for ((id, raw_values), series_values) in series.ids().zip(raw).zip(values.iter_mut()) {
            rescale_to_raw_total(id, raw_values, series_values, clusters, peak_block, block_length);
        }

        let blocks = clusters
            .iter()
            .map(|cluster| TimeBlock {
                weight: Hours(
                    cluster.members.len() as f64 * block_length as f64 * step_hours * annual_scale,
                ),
                is_peak: Some(cluster.members[0]) == peak_block,
                members: cluster.members.clone(),
            })
            .collect_vec();

        let fidelity = series
            .ids()
            .zip(raw)
            .zip(&values)
            .map(|((id, raw_values), values)| {
                let raw_total = raw_values.iter().sum::<f64>() * step_hours * annual_scale;
                let aggregated_total = blocks
                    .iter()
                    .zip(values.chunks(block_length))
                    .map(|(block, block_values)| {
                        block.members.len() as f64 * block_values.iter().sum::<f64>()
                    })
                    .sum::<f64>()
                    * step_hours
                    * annual_scale;
                SeriesFidelity {
                    id: id.clone(),
                    raw_total,
                    aggregated_total,
                    nrmse: nrmse(raw_values, values, &assignment, block_length),
                }
            })
            .collect();

        Self {
            step_hours: Hours(step_hours),
            steps_per_block: block_length,
            blocks,
            series_ids: series.ids().cloned().collect(),
            values,
            assignment,
            fidelity,
        }
    }

    /// Check that reconstructed totals match the raw totals
    fn check_fidelity(&self, tolerance: f64) -> ModelResult<()> {
        for fidelity in &self.fidelity {
            let error = fidelity.relative_error();
            ensure_config!(
                error <= tolerance,
                "The representative blocks reproduce the total of series {} with a relative error \
                of {error:.3e}, which exceeds the tolerance of {tolerance:e}. Try using more blocks.",
                fidelity.id
            );
        }

        Ok(())
    }

    /// Duration of each sub-step
    pub fn step_hours(&self) -> Hours {
        self.step_hours
    }

    /// Number of sub-steps in each block
    pub fn steps_per_block(&self) -> usize {
        self.steps_per_block
    }

    /// Number of representative blocks
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of (block, sub-step) slots
    pub fn num_slots(&self) -> usize {
        self.blocks.len() * self.steps_per_block
    }

    /// The representative blocks
    pub fn blocks(&self) -> &[TimeBlock] {
        &self.blocks
    }

    /// The position of a sub-step of a block in slot order
    pub fn slot(&self, block: usize, step: usize) -> usize {
        block * self.steps_per_block + step
    }

    /// Iterate over all slots as `(slot, block, step)`
    pub fn iter_slots(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.blocks.len()).flat_map(move |block| {
            (0..self.steps_per_block).map(move |step| (self.slot(block, step), block, step))
        })
    }

    /// The slot before this one in the same block, wrapping around at the start of the block
    pub fn previous_in_block(&self, slot: usize) -> usize {
        let block_start = slot - slot % self.steps_per_block;
        block_start + (slot + self.steps_per_block - 1 - block_start) % self.steps_per_block
    }

    /// Number of times a block occurs per year
    pub fn occurrences(&self, block: usize) -> f64 {
        self.blocks[block].weight.0 / (self.steps_per_block as f64 * self.step_hours.0)
    }

    /// Number of hours per year represented by each sub-step of the slot's block
    pub fn slot_hours(&self, slot: usize) -> Hours {
        Hours(self.occurrences(slot / self.steps_per_block) * self.step_hours.0)
    }

    /// Total weight of all blocks
    pub fn total_weight(&self) -> Hours {
        self.blocks.iter().map(|block| block.weight).sum()
    }

    /// The representative values of a series, in slot order
    pub fn series(&self, series: usize) -> &[f64] {
        &self.values[series]
    }

    /// The representative value of a series in a slot
    pub fn value(&self, series: usize, slot: usize) -> f64 {
        self.values[series][slot]
    }

    /// The IDs of the series, in the same order as the raw data
    pub fn series_ids(&self) -> &[SeriesID] {
        &self.series_ids
    }

    /// The representative block of each raw block
    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    /// The approximation error of each series
    pub fn fidelity(&self) -> &[SeriesFidelity] {
        &self.fidelity
    }
}

/// Find the raw block containing the maximum of the peak series
fn find_peak_block(
    series: &RawTimeSeries,
    id: &SeriesID,
    num_blocks: usize,
    block_length: usize,
) -> ModelResult<usize> {
    let values = series
        .get(&id.0)
        .ok_or_else(|| ModelError::configuration(format!("Unknown peak series {id}")))?;
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &value| {
            (min.min(value), max.max(value))
        });
    ensure_config!(
        max > min,
        "Peak series {id} is flat, so no peak step can be isolated"
    );
    ensure_config!(
        num_blocks >= 2,
        "Preserving the peak of series {id} needs at least two representative blocks"
    );

    // First occurrence of the maximum
    let peak_step = values.iter().position(|&value| value == max).unwrap_or(0);

    Ok(peak_step / block_length)
}

/// Feature vectors for each raw block.
///
/// Each series is min-max normalised over the whole year so that series with large magnitudes do
/// not dominate the distance.
fn block_features(raw: &[&[f64]], block_length: usize, num_raw_blocks: usize) -> Vec<Vec<f64>> {
    let normalised: Vec<Vec<f64>> = raw
        .iter()
        .map(|values| {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            values
                .iter()
                .map(|value| {
                    if range > 0.0 {
                        (value - min) / range
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();

    (0..num_raw_blocks)
        .map(|block| {
            let steps = block * block_length..(block + 1) * block_length;
            normalised
                .iter()
                .flat_map(|values| values[steps.clone()].iter().copied())
                .collect()
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// The mean of a set of feature vectors
fn mean_feature<'a, I>(features: I, dimension: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Vec<f64>>,
{
    let mut sum = vec![0.0; dimension];
    let mut count = 0_u32;
    for feature in features {
        for (total, value) in sum.iter_mut().zip(feature) {
            *total += value;
        }
        count += 1;
    }
    if count > 0 {
        for total in &mut sum {
            *total /= f64::from(count);
        }
    }

    sum
}

/// Choose initial cluster centres deterministically.
///
/// The first seed is the block closest to the mean of all blocks; each further seed is the block
/// farthest from all seeds chosen so far. Ties go to the earliest block.
fn farthest_point_seeds(features: &[Vec<f64>], candidates: &[usize], k: usize) -> Vec<usize> {
    let dimension = features.first().map_or(0, Vec::len);
    let mean = mean_feature(candidates.iter().map(|&block| &features[block]), dimension);
    let Some(&first) = candidates.iter().min_by(|&&a, &&b| {
        squared_distance(&features[a], &mean).total_cmp(&squared_distance(&features[b], &mean))
    }) else {
        return Vec::new();
    };

    let mut seeds = vec![first];
    let mut nearest: Vec<f64> = candidates
        .iter()
        .map(|&block| squared_distance(&features[block], &features[first]))
        .collect();
    while seeds.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for (&block, &distance) in candidates.iter().zip(&nearest) {
            if seeds.contains(&block) {
                continue;
            }
            if best.is_none_or(|(_, best_distance)| distance > best_distance) {
                best = Some((block, distance));
            }
        }
        let Some((seed, _)) = best else {
            break;
        };

        seeds.push(seed);
        for (&block, distance) in candidates.iter().zip(nearest.iter_mut()) {
            *distance = distance.min(squared_distance(&features[block], &features[seed]));
        }
    }

    seeds
}

/// The position of the nearest centre to a feature vector (earliest on ties)
fn nearest_centre(feature: &[f64], centres: &[Vec<f64>]) -> usize {
    let mut best = (0, f64::INFINITY);
    for (index, centre) in centres.iter().enumerate() {
        let distance = squared_distance(feature, centre);
        if distance < best.1 {
            best = (index, distance);
        }
    }

    best.0
}

/// Group candidates by label
fn group(candidates: &[usize], labels: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); k];
    for (&block, &label) in candidates.iter().zip(labels) {
        members[label].push(block);
    }

    members
}

/// Cluster blocks around centroids
fn k_means(
    features: &[Vec<f64>],
    candidates: &[usize],
    seeds: &[usize],
    max_iterations: u32,
) -> Vec<Cluster> {
    let dimension = features.first().map_or(0, Vec::len);
    let mut centres: Vec<Vec<f64>> = seeds.iter().map(|&seed| features[seed].clone()).collect();
    let mut labels: Vec<usize> = Vec::new();
    for iteration in 0..max_iterations {
        let new_labels: Vec<usize> = candidates
            .iter()
            .map(|&block| nearest_centre(&features[block], &centres))
            .collect();
        if new_labels == labels {
            debug!("k-means converged after {iteration} iterations");
            break;
        }
        labels = new_labels;

        for (centre, members) in centres
            .iter_mut()
            .zip(group(candidates, &labels, seeds.len()))
        {
            // Empty clusters keep their previous centre
            if !members.is_empty() {
                *centre = mean_feature(members.iter().map(|&block| &features[block]), dimension);
            }
        }
    }

    group(candidates, &labels, seeds.len())
        .into_iter()
        .map(|members| Cluster {
            members,
            medoid: None,
        })
        .collect()
}

/// Cluster blocks around representative historical blocks
fn k_medoids(
    features: &[Vec<f64>],
    candidates: &[usize],
    seeds: &[usize],
    max_iterations: u32,
) -> Vec<Cluster> {
    let mut medoids = seeds.to_vec();
    let mut labels = Vec::new();
    for iteration in 0..max_iterations {
        let centres: Vec<Vec<f64>> = medoids.iter().map(|&m| features[m].clone()).collect();
        labels = candidates
            .iter()
            .map(|&block| nearest_centre(&features[block], &centres))
            .collect();

        let new_medoids: Vec<usize> = group(candidates, &labels, medoids.len())
            .iter()
            .zip(&medoids)
            .map(|(members, &medoid)| {
                members
                    .iter()
                    .copied()
                    .min_by(|&a, &b| {
                        let cost = |x: usize| -> f64 {
                            members
                                .iter()
                                .map(|&other| squared_distance(&features[x], &features[other]))
                                .sum()
                        };
                        cost(a).total_cmp(&cost(b))
                    })
                    .unwrap_or(medoid)
            })
            .collect();
        if new_medoids == medoids {
            debug!("k-medoids converged after {iteration} iterations");
            break;
        }
        medoids = new_medoids;
    }

    group(candidates, &labels, medoids.len())
        .into_iter()
        .zip(medoids)
        .map(|(members, medoid)| Cluster {
            members,
            medoid: Some(medoid),
        })
        .collect()
}

/// The values of a series within a raw block
fn block_slice(values: &[f64], block: usize, block_length: usize) -> &[f64] {
    &values[block * block_length..(block + 1) * block_length]
}

/// The representative values of one series for a cluster
fn representative_values(values: &[f64], cluster: &Cluster, block_length: usize) -> Vec<f64> {
    match cluster.medoid {
        Some(medoid) => block_slice(values, medoid, block_length).to_vec(),
        None => {
            let count = cluster.members.len() as f64;
            (0..block_length)
                .map(|step| {
                    cluster
                        .members
                        .iter()
                        .map(|&block| block_slice(values, block, block_length)[step])
                        .sum::<f64>()
                        / count
                })
                .collect()
        }
    }
}

/// Scale the non-peak blocks of a series so that the reconstructed total matches the raw total
fn rescale_to_raw_total(
    id: &SeriesID,
    raw_values: &[f64],
    values: &mut [f64],
    clusters: &[Cluster],
    peak_block: Option<usize>,
    block_length: usize,
) {
    let mut fixed_total = 0.0;
    let mut scalable_total = 0.0;
    for (cluster, block_values) in clusters.iter().zip(values.chunks(block_length)) {
        let total = cluster.members.len() as f64 * block_values.iter().sum::<f64>();
        if Some(cluster.members[0]) == peak_block {
            fixed_total += total;
        } else {
            scalable_total += total;
        }
    }
    if scalable_total.abs() <= RESCALE_EPSILON {
        return;
    }

    let factor = (raw_values.iter().sum::<f64>() - fixed_total) / scalable_total;
    for (cluster, block_values) in clusters.iter().zip(values.chunks_mut(block_length)) {
        if Some(cluster.members[0]) != peak_block {
            for value in block_values {
                *value *= factor;
            }
        }
    }

    let raw_max = raw_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let new_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if new_max > raw_max + RESCALE_EPSILON {
        warn!(
            "Rescaling series {id} to preserve its total raised its maximum from {raw_max} to \
            {new_max}"
        );
    }
}

/// Normalised root-mean-square error of the chronological series rebuilt from the blocks
fn nrmse(raw_values: &[f64], values: &[f64], assignment: &[usize], block_length: usize) -> f64 {
    let squared_error: f64 = raw_values
        .iter()
        .enumerate()
        .map(|(step, raw)| {
            let block = assignment[step / block_length];
            let rebuilt = values[block * block_length + step % block_length];
            (rebuilt - raw).powi(2)
        })
        .sum();
    let rmse = (squared_error / raw_values.len() as f64).sqrt();

    let min = raw_values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = raw_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > min { rmse / (max - min) } else { rmse }
}
