//! Technologies convert, store or generate energy carriers.
//!
//! The behaviour of a technology is one of a closed set of variants (see [`TechnologyKind`]).
//! The optimisation treats every variant through the same small interface: each technology has one
//! *activity* variable per time step which is bounded by its installed capacity, and the variant
//! determines how activity maps to carrier flows and whether any extra state is needed.
use crate::carrier::{CarrierID, CarrierMap};
use crate::error::{ModelError, ModelResult, ensure_valid};
use crate::id::{IDIndex, define_id_getter, define_id_type};
use crate::parameter::{Interpolation, PeriodTable, SparseParameter};
use crate::period::PeriodInfo;
use crate::units::{
    Capacity, Dimensionless, EmissionsPerEnergy, EnergyPerEmissions, MoneyPerCapacity,
    MoneyPerCapacityPerYear, MoneyPerEmissions, MoneyPerEnergy,
};
use float_cmp::approx_eq;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Deserialize;

define_id_type! {TechnologyID}

/// A map of [`Technology`]s, keyed by technology ID
pub type TechnologyMap = IndexMap<TechnologyID, Technology>;

/// A technology as described in the input
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TechnologyDescription {
    /// A unique identifier for the technology (e.g. "CCGT")
    pub id: TechnologyID,
    /// A text description of the technology
    #[serde(default)]
    pub description: String,
    /// Variant-specific parameters
    #[serde(flatten)]
    pub kind: TechnologyKindDescription,
    /// Technical lifetime in years
    pub lifetime: u32,
    /// Discount rate used to annualise capital cost. Defaults to the model's discount rate.
    #[serde(default)]
    pub discount_rate: Option<Dimensionless>,
    /// Overnight capital cost per unit of capacity
    pub capital_cost: SparseParameter<MoneyPerCapacity>,
    /// Annual fixed operating cost per unit of installed capacity
    #[serde(default)]
    pub fixed_operating_cost: Option<SparseParameter<MoneyPerCapacityPerYear>>,
    /// Cost per unit of activity
    #[serde(default)]
    pub variable_operating_cost: Option<SparseParameter<MoneyPerEnergy>>,
    /// Fraction of capacity available in each period
    #[serde(default)]
    pub availability: Option<SparseParameter<Dimensionless>>,
    /// The maximum capacity which can be added in a single period (unlimited if absent)
    #[serde(default)]
    pub max_addition: Option<SparseParameter<Capacity>>,
    /// First year in which the technology can be built
    #[serde(default)]
    pub available_from: Option<u32>,
    /// Emissions per unit of activity
    #[serde(default)]
    pub emission_factor: EmissionsPerEnergy,
    /// Maximum change in activity per hour, as a fraction of installed capacity
    #[serde(default)]
    pub ramp_rate: Option<Dimensionless>,
    /// Whether capacity is commissioned as a whole, i.e. either zero or at least `min_capacity`
    #[serde(default)]
    pub discrete: bool,
    /// The minimum capacity if the technology is built at all (only for discrete technologies)
    #[serde(default)]
    pub min_capacity: Capacity,
}

/// A segment of a piecewise performance curve as described in the input
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct SegmentDescription {
    /// Lower end of the segment as a fraction of installed capacity
    pub from: Dimensionless,
    /// Upper end of the segment as a fraction of installed capacity
    pub to: Dimensionless,
    /// Output per unit of activity in this segment
    pub slope: Dimensionless,
    /// Output per unit of installed capacity while operating in this segment
    #[serde(default)]
    pub intercept: Dimensionless,
}

/// Carbon capture fitted to a conversion technology as described in the input
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CaptureDescription {
    /// The largest fraction of the technology's emissions which can be captured
    pub rate: Dimensionless,
    /// Energy consumed per unit of emissions captured, by carrier
    #[serde(default)]
    pub inputs: IndexMap<CarrierID, EnergyPerEmissions>,
    /// Cost per unit of emissions captured (transport and storage)
    #[serde(default)]
    pub cost: Option<SparseParameter<MoneyPerEmissions>>,
}

/// Variant-specific parameters as described in the input
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TechnologyKindDescription {
    /// Converts input carriers into output carriers
    #[serde(rename = "conversion")]
    Conversion {
        /// The share of each input carrier in total activity
        #[serde(default)]
        inputs: IndexMap<CarrierID, Dimensionless>,
        /// Output per unit of activity (linear) or share of total output (piecewise)
        outputs: IndexMap<CarrierID, Dimensionless>,
        /// Piecewise performance curve. If absent, performance is linear.
        #[serde(default)]
        segments: Option<Vec<SegmentDescription>>,
        /// Carbon capture, if fitted
        #[serde(default)]
        capture: Option<CaptureDescription>,
    },
    /// Generates output carriers following a capacity-factor profile
    #[serde(rename = "renewable")]
    Renewable {
        /// Output per unit of activity
        outputs: IndexMap<CarrierID, Dimensionless>,
        /// Whether output may be below the available resource
        #[serde(default)]
        curtailable: bool,
        /// If set, output is curtailed by switching off whole modules of this capacity
        #[serde(default)]
        module_size: Option<Capacity>,
    },
    /// Stores a single carrier
    #[serde(rename = "storage")]
    Storage {
        /// The stored carrier
        carrier: CarrierID,
        /// Fraction of charged energy which reaches the store
        charge_efficiency: Dimensionless,
        /// Fraction of energy leaving the store which is delivered
        discharge_efficiency: Dimensionless,
        /// Fraction of stored energy lost per hour
        #[serde(default)]
        self_discharge: Dimensionless,
        /// Maximum charging rate as a fraction of energy capacity per hour
        #[serde(default = "default_storage_rate")]
        max_charge_rate: Dimensionless,
        /// Maximum discharging rate as a fraction of energy capacity per hour
        #[serde(default = "default_storage_rate")]
        max_discharge_rate: Dimensionless,
    },
}

fn default_storage_rate() -> Dimensionless {
    Dimensionless(1.0)
}

/// The coefficient linking a carrier flow to a technology's activity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarrierShare {
    /// Position of the carrier in the registry
    pub carrier: usize,
    /// Flow of the carrier per unit of activity (or share of output for piecewise curves)
    pub coefficient: Dimensionless,
}

/// A segment of a piecewise-linear performance curve.
///
/// While operating in the segment, total output is `slope * activity + intercept * capacity` and
/// activity lies within `[from * capacity, to * capacity]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Lower end of the segment as a fraction of installed capacity
    pub from: Dimensionless,
    /// Upper end of the segment as a fraction of installed capacity
    pub to: Dimensionless,
    /// Output per unit of activity
    pub slope: Dimensionless,
    /// Output per unit of installed capacity
    pub intercept: Dimensionless,
}

/// How total output relates to activity for a conversion technology
#[derive(Debug, Clone, PartialEq)]
pub enum PerformanceCurve {
    /// Output of each carrier is a fixed multiple of activity
    Linear,
    /// Total output is piecewise linear in activity; the technology may also be switched off.
    ///
    /// The start of the first segment is the minimum part load.
    Piecewise(Vec<Segment>),
}

/// Carbon capture on a conversion technology.
///
/// The amount captured in each time step is a decision, up to `rate` times the emissions of the
/// activity. Captured emissions are not emitted but consume energy and incur a cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    /// The largest fraction of emissions which can be captured
    pub rate: Dimensionless,
    /// Carriers consumed, with the energy needed per unit of emissions captured
    pub inputs: Vec<(usize, EnergyPerEmissions)>,
    /// Cost per unit of emissions captured
    pub cost: PeriodTable<MoneyPerEmissions>,
}

/// Parameters of a conversion technology
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionParameters {
    /// Input carriers with their share of activity
    pub inputs: Vec<CarrierShare>,
    /// Output carriers with their efficiency (linear) or share of total output (piecewise)
    pub outputs: Vec<CarrierShare>,
    /// The performance curve
    pub performance: PerformanceCurve,
    /// Carbon capture, if fitted
    pub capture: Option<Capture>,
}

/// How the output of a renewable technology may fall short of the available resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curtailment {
    /// Output always equals the available resource
    None,
    /// Output may be anywhere below the available resource
    Continuous,
    /// Output is curtailed by switching off whole modules of the given capacity
    Modules(Capacity),
}

/// Parameters of a variable renewable technology
#[derive(Debug, Clone, PartialEq)]
pub struct RenewableParameters {
    /// Output carriers per unit of activity
    pub outputs: Vec<CarrierShare>,
    /// How output may be curtailed
    pub curtailment: Curtailment,
}

/// Parameters of a storage technology.
///
/// Capacity is energy capacity; activity is the discharge rate.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageParameters {
    /// Position of the stored carrier in the registry
    pub carrier: usize,
    /// Fraction of charged energy which reaches the store
    pub charge_efficiency: Dimensionless,
    /// Fraction of energy leaving the store which is delivered
    pub discharge_efficiency: Dimensionless,
    /// Fraction of stored energy lost per hour
    pub self_discharge: Dimensionless,
    /// Maximum charging rate as a fraction of energy capacity per hour
    pub max_charge_rate: Dimensionless,
    /// Maximum discharging rate as a fraction of energy capacity per hour
    pub max_discharge_rate: Dimensionless,
}

impl StorageParameters {
    /// Fraction of the stored energy retained after the given number of hours
    pub fn retention(&self, hours: f64) -> Dimensionless {
        (Dimensionless(1.0) - self.self_discharge).powf(hours)
    }

    /// The fraction of charged energy which is eventually delivered
    pub fn round_trip_efficiency(&self) -> Dimensionless {
        self.charge_efficiency * self.discharge_efficiency
    }
}

/// The behaviour of a technology
#[derive(Debug, Clone, PartialEq)]
pub enum TechnologyKind {
    /// Fixed-ratio or piecewise conversion of inputs to outputs
    Conversion(ConversionParameters),
    /// Variable renewable generation
    Renewable(RenewableParameters),
    /// Storage of a single carrier
    Storage(StorageParameters),
}

/// How a technology's activity is bounded by its available capacity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivityBound {
    /// Activity may be anywhere between zero and the available capacity
    UpTo,
    /// Activity must equal the available capacity
    Exactly,
    /// Activity equals the available output of the modules switched on, whose total capacity
    /// cannot exceed installed capacity
    Modules(Capacity),
}

impl TechnologyKind {
    /// How activity is bounded by available capacity
    pub fn activity_bound(&self) -> ActivityBound {
        match self {
            Self::Renewable(renewable) => match renewable.curtailment {
                Curtailment::None => ActivityBound::Exactly,
                Curtailment::Continuous => ActivityBound::UpTo,
                Curtailment::Modules(size) => ActivityBound::Modules(size),
            },
            _ => ActivityBound::UpTo,
        }
    }

    /// Maximum activity per unit of installed capacity
    pub fn activity_per_capacity(&self) -> Dimensionless {
        match self {
            Self::Storage(storage) => storage.max_discharge_rate,
            _ => Dimensionless(1.0),
        }
    }

    /// The carrier flows per unit of activity which are linear in activity.
    ///
    /// Outputs are positive and inputs negative. Outputs of piecewise conversion technologies are
    /// not linear in activity and are therefore excluded, as is charging of storage.
    pub fn linear_flows(&self) -> Vec<CarrierShare> {
        let negate = |share: &CarrierShare| CarrierShare {
            carrier: share.carrier,
            coefficient: Dimensionless(-share.coefficient.0),
        };

        match self {
            Self::Conversion(conversion) => {
                let inputs = conversion.inputs.iter().map(negate);
                match conversion.performance {
                    PerformanceCurve::Linear => inputs
                        .chain(conversion.outputs.iter().copied())
                        .collect(),
                    PerformanceCurve::Piecewise(_) => inputs.collect(),
                }
            }
            Self::Renewable(renewable) => renewable.outputs.clone(),
            Self::Storage(storage) => vec![CarrierShare {
                carrier: storage.carrier,
                coefficient: Dimensionless(1.0),
            }],
        }
    }

    /// The segments of a piecewise performance curve, if there is one
    pub fn segments(&self) -> Option<&[Segment]> {
        match self {
            Self::Conversion(ConversionParameters {
                performance: PerformanceCurve::Piecewise(segments),
                ..
            }) => Some(segments),
            _ => None,
        }
    }

    /// The carbon capture unit, if one is fitted
    pub fn capture(&self) -> Option<&Capture> {
        match self {
            Self::Conversion(conversion) => conversion.capture.as_ref(),
            _ => None,
        }
    }

    /// The storage parameters, if this is a storage technology
    pub fn storage(&self) -> Option<&StorageParameters> {
        match self {
            Self::Storage(storage) => Some(storage),
            _ => None,
        }
    }

    /// Whether the technology's availability follows a capacity-factor profile
    pub fn uses_capacity_factor(&self) -> bool {
        matches!(self, Self::Renewable(_))
    }

    /// Iterate over the positions of all carriers this technology touches
    pub fn iter_carriers(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            Self::Conversion(conversion) => Box::new(
                conversion
                    .inputs
                    .iter()
                    .chain(conversion.outputs.iter())
                    .map(|share| share.carrier)
                    .chain(
                        conversion
                            .capture
                            .iter()
                            .flat_map(|capture| capture.inputs.iter().map(|&(carrier, _)| carrier)),
                    ),
            ),
            Self::Renewable(renewable) => {
                Box::new(renewable.outputs.iter().map(|share| share.carrier))
            }
            Self::Storage(storage) => Box::new(std::iter::once(storage.carrier)),
        }
    }
}

/// A technology which can be installed at nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Technology {
    /// A unique identifier for the technology (e.g. "CCGT")
    pub id: TechnologyID,
    /// A text description of the technology
    pub description: String,
    /// The behaviour of the technology
    pub kind: TechnologyKind,
    /// Technical lifetime in years
    pub lifetime: u32,
    /// Discount rate used to annualise capital cost, if different from the model's
    pub discount_rate: Option<Dimensionless>,
    /// Overnight capital cost per unit of capacity
    pub capital_cost: PeriodTable<MoneyPerCapacity>,
    /// Annual fixed operating cost per unit of installed capacity
    pub fixed_operating_cost: PeriodTable<MoneyPerCapacityPerYear>,
    /// Cost per unit of activity
    pub variable_operating_cost: PeriodTable<MoneyPerEnergy>,
    /// Fraction of capacity available in each period
    pub availability: PeriodTable<Dimensionless>,
    /// The maximum capacity which can be added in each period
    pub max_addition: PeriodTable<Capacity>,
    /// Emissions per unit of activity
    pub emission_factor: EmissionsPerEnergy,
    /// Maximum change in activity per hour, as a fraction of installed capacity
    pub ramp_rate: Option<Dimensionless>,
    /// Whether capacity is commissioned as a whole
    pub discrete: bool,
    /// The minimum capacity if the technology is built at all
    pub min_capacity: Capacity,
}
define_id_getter! {Technology, TechnologyID}

/// Convert a map of carrier IDs to coefficients into [`CarrierShare`]s
fn resolve_shares(
    shares: &IndexMap<CarrierID, Dimensionless>,
    carriers: &CarrierMap,
    id: &TechnologyID,
) -> ModelResult<Vec<CarrierShare>> {
    shares
        .iter()
        .map(|(carrier_id, &coefficient)| {
            ensure_valid!(
                coefficient.0.is_finite() && coefficient.0 > 0.0,
                id,
                "Coefficient for carrier {carrier_id} must be a positive number"
            );
            Ok(CarrierShare {
                carrier: carriers.index_of(carrier_id, &id.to_string())?,
                coefficient,
            })
        })
        .collect()
}

/// Check that a value lies in the half-open unit interval `(0, 1]`
fn check_fraction_nonzero(value: Dimensionless, id: &TechnologyID, name: &str) -> ModelResult<()> {
    ensure_valid!(
        value.0 > 0.0 && value.0 <= 1.0,
        id,
        "`{name}` must be greater than zero and no greater than one"
    );
    Ok(())
}

/// Validate the segments of a piecewise performance curve
fn resolve_segments(segments: &[SegmentDescription], id: &TechnologyID) -> ModelResult<Vec<Segment>> {
    ensure_valid!(!segments.is_empty(), id, "Piecewise performance needs segments");
    for segment in segments {
        ensure_valid!(
            segment.from.0 >= 0.0 && segment.from < segment.to && segment.to.0 <= 1.0,
            id,
            "Segment bounds must satisfy 0 <= from < to <= 1"
        );
        ensure_valid!(
            segment.slope.0 >= 0.0 && segment.intercept.0.is_finite(),
            id,
            "Segment slope must be non-negative"
        );
    }
    ensure_valid!(
        segments
            .iter()
            .tuple_windows()
            .all(|(a, b)| approx_eq!(f64, a.to.0, b.from.0, epsilon = 1e-9)),
        id,
        "Segments must be contiguous and in increasing order"
    );

    Ok(segments
        .iter()
        .map(|s| Segment {
            from: s.from,
            to: s.to,
            slope: s.slope,
            intercept: s.intercept,
        })
        .collect())
}

/// Validate a carbon capture unit and resolve its carriers
fn resolve_capture(
    description: &CaptureDescription,
    carriers: &CarrierMap,
    periods: &PeriodInfo,
    interpolation: Interpolation,
    id: &TechnologyID,
) -> ModelResult<Capture> {
    check_fraction_nonzero(description.rate, id, "capture.rate")?;
    let inputs = description
        .inputs
        .iter()
        .map(|(carrier_id, &energy)| {
            ensure_valid!(
                energy.0.is_finite() && energy.0 >= 0.0,
                id,
                "Capture input for carrier {carrier_id} must be non-negative"
            );
            Ok((carriers.index_of(carrier_id, &id.to_string())?, energy))
        })
        .collect::<ModelResult<_>>()?;
    let cost = PeriodTable::normalise(
        description.cost.as_ref(),
        Some(MoneyPerEmissions(0.0)),
        periods,
        interpolation,
        &id.to_string(),
        "capture.cost",
    )?;
    ensure_valid!(
        cost.iter().all(|cost| cost.0.is_finite() && cost.0 >= 0.0),
        id,
        "`capture.cost` must be non-negative"
    );

    Ok(Capture {
        rate: description.rate,
        inputs,
        cost,
    })
}

impl TechnologyKind {
    /// Validate a variant description and resolve carrier references
    fn from_description(
        description: &TechnologyKindDescription,
        carriers: &CarrierMap,
        periods: &PeriodInfo,
        interpolation: Interpolation,
        id: &TechnologyID,
    ) -> ModelResult<Self> {
        Ok(match description {
            TechnologyKindDescription::Conversion {
                inputs,
                outputs,
                segments,
                capture,
            } => {
                ensure_valid!(!outputs.is_empty(), id, "Technology must have outputs");
                let inputs = resolve_shares(inputs, carriers, id)?;
                if !inputs.is_empty() {
                    let total: f64 = inputs.iter().map(|share| share.coefficient.0).sum();
                    ensure_valid!(
                        approx_eq!(f64, total, 1.0, epsilon = 1e-6),
                        id,
                        "Input shares must sum to one"
                    );
                }
                let performance = match segments {
                    None => PerformanceCurve::Linear,
                    Some(segments) => PerformanceCurve::Piecewise(resolve_segments(segments, id)?),
                };
                let capture = capture
                    .as_ref()
                    .map(|capture| resolve_capture(capture, carriers, periods, interpolation, id))
                    .transpose()?;
                Self::Conversion(ConversionParameters {
                    inputs,
                    outputs: resolve_shares(outputs, carriers, id)?,
                    performance,
                    capture,
                })
            }
            TechnologyKindDescription::Renewable {
                outputs,
                curtailable,
                module_size,
            } => {
                ensure_valid!(!outputs.is_empty(), id, "Technology must have outputs");
                let curtailment = match (*curtailable, *module_size) {
                    (false, None) => Curtailment::None,
                    (true, None) => Curtailment::Continuous,
                    (true, Some(size)) => {
                        ensure_valid!(
                            size.0.is_finite() && size.0 > 0.0,
                            id,
                            "`module_size` must be a positive number"
                        );
                        Curtailment::Modules(size)
                    }
                    (false, Some(_)) => {
                        return Err(ModelError::validation(
                            id,
                            "`module_size` is only valid for curtailable technologies",
                        ));
                    }
                };
                Self::Renewable(RenewableParameters {
                    outputs: resolve_shares(outputs, carriers, id)?,
                    curtailment,
                })
            }
            TechnologyKindDescription::Storage {
                carrier,
                charge_efficiency,
                discharge_efficiency,
                self_discharge,
                max_charge_rate,
                max_discharge_rate,
            } => {
                check_fraction_nonzero(*charge_efficiency, id, "charge_efficiency")?;
                check_fraction_nonzero(*discharge_efficiency, id, "discharge_efficiency")?;
                ensure_valid!(
                    self_discharge.0 >= 0.0 && self_discharge.0 < 1.0,
                    id,
                    "`self_discharge` must be at least zero and less than one"
                );
                for (rate, name) in [
                    (max_charge_rate, "max_charge_rate"),
                    (max_discharge_rate, "max_discharge_rate"),
                ] {
                    ensure_valid!(
                        rate.0.is_finite() && rate.0 > 0.0,
                        id,
                        "`{name}` must be a positive number"
                    );
                }
                Self::Storage(StorageParameters {
                    carrier: carriers.index_of(carrier, &id.to_string())?,
                    charge_efficiency: *charge_efficiency,
                    discharge_efficiency: *discharge_efficiency,
                    self_discharge: *self_discharge,
                    max_charge_rate: *max_charge_rate,
                    max_discharge_rate: *max_discharge_rate,
                })
            }
        })
    }
}

impl Technology {
    /// Validate a technology description and normalise its period-indexed parameters.
    ///
    /// # Arguments
    ///
    /// * `description` - The technology as described in the input
    /// * `carriers` - All carriers in the model
    /// * `periods` - The investment periods
    /// * `interpolation` - How to fill gaps in sparse parameters
    pub fn from_description(
        description: &TechnologyDescription,
        carriers: &CarrierMap,
        periods: &PeriodInfo,
        interpolation: Interpolation,
    ) -> ModelResult<Self> {
        let id = &description.id;
        let entity = id.to_string();
        let kind = TechnologyKind::from_description(
            &description.kind,
            carriers,
            periods,
            interpolation,
            id,
        )?;

        ensure_valid!(description.lifetime > 0, id, "`lifetime` must be greater than zero");
        if let Some(rate) = description.discount_rate {
            ensure_valid!(
                rate.0.is_finite() && rate.0 >= 0.0,
                id,
                "`discount_rate` must be a non-negative number"
            );
        }
        ensure_valid!(
            description.capital_cost.all(|cost| cost.0.is_finite() && cost.0 >= 0.0),
            id,
            "`capital_cost` must be non-negative"
        );
        if let Some(availability) = &description.availability {
            ensure_valid!(
                availability.all(|value| (0.0..=1.0).contains(&value.0)),
                id,
                "`availability` must be between zero and one"
            );
        }
        if let Some(ramp_rate) = description.ramp_rate {
            ensure_valid!(ramp_rate.0 > 0.0, id, "`ramp_rate` must be positive");
        }
        ensure_valid!(
            description.min_capacity.0 >= 0.0,
            id,
            "`min_capacity` must be non-negative"
        );
        ensure_valid!(
            description.discrete || description.min_capacity.0 == 0.0,
            id,
            "`min_capacity` is only valid for discrete technologies"
        );
        ensure_valid!(
            kind.capture().is_none() || description.emission_factor.0 > 0.0,
            id,
            "Carbon capture needs a positive `emission_factor`"
        );

        let mut max_addition = PeriodTable::normalise(
            description.max_addition.as_ref(),
            Some(Capacity(f64::INFINITY)),
            periods,
            interpolation,
            &entity,
            "max_addition",
        )?;
        if let Some(available_from) = description.available_from {
            max_addition = PeriodTable::from_values(
                periods
                    .iter()
                    .zip(max_addition.iter())
                    .map(|(period, value)| {
                        if period.start_year < available_from {
                            Capacity(0.0)
                        } else {
                            value
                        }
                    })
                    .collect(),
            );
        }

        Ok(Self {
            id: id.clone(),
            description: description.description.clone(),
            kind,
            lifetime: description.lifetime,
            discount_rate: description.discount_rate,
            capital_cost: PeriodTable::normalise(
                Some(&description.capital_cost),
                None,
                periods,
                interpolation,
                &entity,
                "capital_cost",
            )?,
            fixed_operating_cost: PeriodTable::normalise(
                description.fixed_operating_cost.as_ref(),
                Some(MoneyPerCapacityPerYear(0.0)),
                periods,
                interpolation,
                &entity,
                "fixed_operating_cost",
            )?,
            variable_operating_cost: PeriodTable::normalise(
                description.variable_operating_cost.as_ref(),
                Some(MoneyPerEnergy(0.0)),
                periods,
                interpolation,
                &entity,
                "variable_operating_cost",
            )?,
            availability: PeriodTable::normalise(
                description.availability.as_ref(),
                Some(Dimensionless(1.0)),
                periods,
                interpolation,
                &entity,
                "availability",
            )?,
            max_addition,
            emission_factor: description.emission_factor,
            ramp_rate: description.ramp_rate,
            discrete: description.discrete,
            min_capacity: description.min_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_validation_error, carriers, periods, technology_description};
    use float_cmp::assert_approx_eq;
    use indexmap::indexmap;
    use rstest::rstest;

    #[rstest]
    fn test_from_description_linear(
        technology_description: TechnologyDescription,
        carriers: CarrierMap,
        periods: PeriodInfo,
    ) {
        let technology = Technology::from_description(
            &technology_description,
            &carriers,
            &periods,
            Interpolation::Step,
        )
        .unwrap();
        assert_eq!(technology.kind.activity_bound(), ActivityBound::UpTo);
        assert_eq!(
            technology.kind.linear_flows(),
            vec![
                CarrierShare {
                    carrier: 1,
                    coefficient: Dimensionless(-1.0)
                },
                CarrierShare {
                    carrier: 0,
                    coefficient: Dimensionless(0.5)
                }
            ]
        );
        assert!(technology.max_addition.iter().all(|c| c.0.is_infinite()));
        assert_eq!(technology.variable_operating_cost.get(0), MoneyPerEnergy(0.0));
    }

    #[rstest]
    fn test_available_from(
        mut technology_description: TechnologyDescription,
        carriers: CarrierMap,
        periods: PeriodInfo,
    ) {
        technology_description.available_from = Some(2030);
        let technology = Technology::from_description(
            &technology_description,
            &carriers,
            &periods,
            Interpolation::Step,
        )
        .unwrap();
        assert_eq!(technology.max_addition.get(0), Capacity(0.0));
        assert!(technology.max_addition.get(1).0.is_infinite());
    }

    #[rstest]
    fn test_unknown_carrier(
        mut technology_description: TechnologyDescription,
        carriers: CarrierMap,
        periods: PeriodInfo,
    ) {
        technology_description.kind = TechnologyKindDescription::Renewable {
            outputs: indexmap! {"steam".into() => Dimensionless(1.0)},
            curtailable: true,
            module_size: None,
        };
        assert_validation_error!(
            Technology::from_description(
                &technology_description,
                &carriers,
                &periods,
                Interpolation::Step
            ),
            "CCGT",
            "Unknown ID steam found"
        );
    }

    #[rstest]
    #[case(vec![(0.0, 0.5), (0.5, 1.0)], true)]
    #[case(vec![(0.3, 1.0)], true)]
    #[case(vec![(0.0, 0.4), (0.5, 1.0)], false)] // gap
    #[case(vec![(0.5, 0.2)], false)]
    #[case(vec![(0.0, 1.2)], false)]
    #[case(vec![], false)]
    fn test_segments(
        mut technology_description: TechnologyDescription,
        carriers: CarrierMap,
        periods: PeriodInfo,
        #[case] bounds: Vec<(f64, f64)>,
        #[case] valid: bool,
    ) {
        let segments = bounds
            .into_iter()
            .map(|(from, to)| SegmentDescription {
                from: Dimensionless(from),
                to: Dimensionless(to),
                slope: Dimensionless(0.5),
                intercept: Dimensionless(0.0),
            })
            .collect();
        technology_description.kind = TechnologyKindDescription::Conversion {
            inputs: indexmap! {"gas".into() => Dimensionless(1.0)},
            outputs: indexmap! {"electricity".into() => Dimensionless(1.0)},
            segments: Some(segments),
            capture: None,
        };
        let result = Technology::from_description(
            &technology_description,
            &carriers,
            &periods,
            Interpolation::Step,
        );
        assert_eq!(result.is_ok(), valid);
        if let Ok(technology) = result {
            assert!(technology.kind.segments().is_some());
            // Piecewise outputs are not linear in activity
            assert_eq!(technology.kind.linear_flows().len(), 1);
        }
    }

    #[rstest]
    fn test_storage(carriers: CarrierMap, periods: PeriodInfo) {
        let description: TechnologyDescription = toml::from_str(
            r#"
            id = "battery"
            type = "storage"
            carrier = "electricity"
            charge_efficiency = 0.9
            discharge_efficiency = 1.0
            self_discharge = 0.01
            lifetime = 15
            capital_cost = 100.0
            "#,
        )
        .unwrap();
        let technology =
            Technology::from_description(&description, &carriers, &periods, Interpolation::Step)
                .unwrap();
        let storage = technology.kind.storage().unwrap();
        assert_approx_eq!(f64, storage.round_trip_efficiency().0, 0.9);
        assert_approx_eq!(f64, storage.retention(2.0).0, 0.99 * 0.99, epsilon = 1e-12);
        assert_eq!(storage.max_charge_rate, Dimensionless(1.0));
    }

    #[rstest]
    fn test_bad_input_shares(
        mut technology_description: TechnologyDescription,
        carriers: CarrierMap,
        periods: PeriodInfo,
    ) {
        technology_description.kind = TechnologyKindDescription::Conversion {
            inputs: indexmap! {"gas".into() => Dimensionless(0.5)},
            outputs: indexmap! {"electricity".into() => Dimensionless(0.5)},
            segments: None,
            capture: None,
        };
        assert_validation_error!(
            Technology::from_description(
                &technology_description,
                &carriers,
                &periods,
                Interpolation::Step
            ),
            "CCGT",
            "Input shares must sum to one"
        );
    }

    #[rstest]
    fn test_capture(carriers: CarrierMap, periods: PeriodInfo) {
        let description: TechnologyDescription = toml::from_str(
            r#"
            id = "CCGT-CCS"
            type = "conversion"
            inputs = { gas = 1.0 }
            outputs = { electricity = 0.45 }
            emission_factor = 0.2
            capture = { rate = 0.9, inputs = { electricity = 0.3 }, cost = 15.0 }
            lifetime = 30
            capital_cost = 900.0
            "#,
        )
        .unwrap();
        let technology =
            Technology::from_description(&description, &carriers, &periods, Interpolation::Step)
                .unwrap();
        let capture = technology.kind.capture().unwrap();
        assert_eq!(capture.rate, Dimensionless(0.9));
        assert_eq!(capture.inputs, vec![(0, EnergyPerEmissions(0.3))]);
        assert!(capture.cost.iter().all(|cost| cost == MoneyPerEmissions(15.0)));
        assert_eq!(technology.kind.iter_carriers().collect_vec(), vec![1, 0, 0]);
    }

    #[rstest]
    fn test_capture_needs_emissions(
        mut technology_description: TechnologyDescription,
        carriers: CarrierMap,
        periods: PeriodInfo,
    ) {
        technology_description.kind = TechnologyKindDescription::Conversion {
            inputs: indexmap! {"gas".into() => Dimensionless(1.0)},
            outputs: indexmap! {"electricity".into() => Dimensionless(0.5)},
            segments: None,
            capture: Some(CaptureDescription {
                rate: Dimensionless(0.9),
                inputs: IndexMap::new(),
                cost: None,
            }),
        };
        assert_validation_error!(
            Technology::from_description(
                &technology_description,
                &carriers,
                &periods,
                Interpolation::Step
            ),
            "CCGT",
            "Carbon capture needs a positive `emission_factor`"
        );
    }

    #[rstest]
    #[case(false, None, Some(ActivityBound::Exactly))]
    #[case(true, None, Some(ActivityBound::UpTo))]
    #[case(true, Some(2.5), Some(ActivityBound::Modules(Capacity(2.5))))]
    #[case(true, Some(0.0), None)]
    #[case(false, Some(2.5), None)]
    fn test_curtailment(
        mut technology_description: TechnologyDescription,
        carriers: CarrierMap,
        periods: PeriodInfo,
        #[case] curtailable: bool,
        #[case] module_size: Option<f64>,
        #[case] expected: Option<ActivityBound>,
    ) {
        technology_description.kind = TechnologyKindDescription::Renewable {
            outputs: indexmap! {"electricity".into() => Dimensionless(1.0)},
            curtailable,
            module_size: module_size.map(Capacity),
        };
        let result = Technology::from_description(
            &technology_description,
            &carriers,
            &periods,
            Interpolation::Step,
        );
        assert_eq!(
            result.ok().map(|technology| technology.kind.activity_bound()),
            expected
        );
    }
}
