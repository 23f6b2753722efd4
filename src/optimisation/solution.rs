//! Solved values, mapped back onto the entities of the system.
use super::objective::CostCategory;
use super::problem::Variable;
use super::solver::SolveStatus;
use super::variables::{CapacityLayout, CapacityVariables, SlotVariables};
use super::{Formulation, FormulationContext};
use crate::carrier::CarrierID;
use crate::network::ArcID;
use crate::node::NodeID;
use crate::technology::{TechnologyID, TechnologyKind};
use crate::units::{
    Capacity, Emissions, EmissionsPerHour, Energy, Flow, Money, MoneyPerEnergy,
};
use serde::Serialize;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

/// The result of a solve
#[derive(Debug)]
pub struct SolveOutcome<'a> {
    /// What the solver reported
    pub status: SolveStatus,
    /// Total discounted system cost, if there is a solution
    pub objective: Option<f64>,
    /// Relative optimality gap, if known
    pub gap: Option<f64>,
    /// The solved values, if there is a solution
    pub solution: Option<Solution<'a>>,
}

impl SolveOutcome<'_> {
    /// An outcome with no values populated
    pub fn without_solution(status: SolveStatus) -> Self {
        Self {
            status,
            objective: None,
            gap: None,
            solution: None,
        }
    }
}

/// Identifies a slot of a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimeKey {
    /// Start year of the investment period
    pub period: u32,
    /// Representative block
    pub block: usize,
    /// Sub-step within the block
    pub step: usize,
}

impl TimeKey {
    fn new(context: &FormulationContext, period: usize, slot: usize) -> Self {
        let steps_per_block = context.time.steps_per_block();
        Self {
            period: context.registry.periods.get(period).start_year,
            block: slot / steps_per_block,
            step: slot % steps_per_block,
        }
    }
}

/// Capacity of an asset or arc in a period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityValues {
    /// Total installed capacity
    pub installed: Capacity,
    /// Capacity built at the start of the period
    pub new: Capacity,
    /// Capacity retired at the start of the period
    pub retired: Capacity,
}

/// Operation of a storage asset in a slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageValues {
    /// Charging rate
    pub charge: Flow,
    /// Discharging rate
    pub discharge: Flow,
    /// Stored energy at the end of the slot
    pub level: Energy,
}

/// Exchanges at a node-carrier balance in a slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeValues {
    /// Imports
    pub import: Flow,
    /// Exports
    pub export: Flow,
    /// Demand which was not met
    pub unmet_demand: Flow,
}

/// The solved values of a formulation
#[derive(Debug)]
pub struct Solution<'a> {
    formulation: &'a Formulation<'a>,
    values: Vec<f64>,
    row_duals: Option<Vec<f64>>,
}

impl<'a> Solution<'a> {
    pub(super) fn new(
        formulation: &'a Formulation<'a>,
        values: Vec<f64>,
        row_duals: Option<Vec<f64>>,
    ) -> Self {
        Self {
            formulation,
            values,
            row_duals,
        }
    }

    fn context(&self) -> &'a FormulationContext<'a> {
        &self.formulation.context
    }

    /// The value of a variable
    pub fn value(&self, var: Variable) -> f64 {
        self.values[var.index()]
    }

    /// The values of all columns, in column order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Total discounted system cost
    pub fn objective(&self) -> f64 {
        self.formulation.problem.evaluate_objective(&self.values)
    }

    /// Installed capacity of an asset in a period
    pub fn asset_capacity(&self, asset: usize, period: usize) -> Capacity {
        let vars = &self.formulation.variables.asset_capacity;
        Capacity(self.value(vars.installed(asset, period)))
    }

    fn capacity_values(
        &self,
        vars: &CapacityVariables,
        owner: usize,
        period: usize,
        existing: Capacity,
    ) -> CapacityValues {
        let installed = Capacity(self.value(vars.installed(owner, period)));
        let new = match vars.layout(owner) {
            CapacityLayout::Degenerate => Capacity(0.0),
            CapacityLayout::SinglePeriod => installed - existing,
            CapacityLayout::Chain => Capacity(self.value(vars.investment(owner, period))),
        };
        let retired = vars
            .retirement(owner, period)
            .map_or(Capacity(0.0), |var| Capacity(self.value(var)));

        CapacityValues {
            installed,
            new,
            retired,
        }
    }

    /// Iterate over the capacity of every asset in every period.
    ///
    /// # Returns
    ///
    /// An iterator of tuples containing a node ID, technology ID, period start year and capacities.
    pub fn iter_asset_capacities(
        &self,
    ) -> impl Iterator<Item = (&'a NodeID, &'a TechnologyID, u32, CapacityValues)> + '_ {
        let registry = self.context().registry;
        let vars = &self.formulation.variables.asset_capacity;
        registry
            .assets
            .iter()
            .enumerate()
            .flat_map(move |(index, asset)| {
                registry.periods.iter().map(move |period| {
                    let existing = asset
                        .capacity
                        .existing_in_period(&registry.periods, period.index);
                    (
                        &registry.nodes[asset.node].id,
                        &registry.technology_of(asset).id,
                        period.start_year,
                        self.capacity_values(vars, index, period.index, existing),
                    )
                })
            })
    }

    /// Iterate over the capacity of every arc in every period
    pub fn iter_arc_capacities(
        &self,
    ) -> impl Iterator<Item = (&'a ArcID, u32, CapacityValues)> + '_ {
        let registry = self.context().registry;
        let vars = &self.formulation.variables.arc_capacity;
        registry
            .arcs
            .values()
            .enumerate()
            .flat_map(move |(index, arc)| {
                registry.periods.iter().map(move |period| {
                    let existing = arc
                        .capacity
                        .existing_in_period(&registry.periods, period.index);
                    (
                        &arc.id,
                        period.start_year,
                        self.capacity_values(vars, index, period.index, existing),
                    )
                })
            })
    }

    /// Iterate over the activity of every asset.
    ///
    /// Activity is measured in the asset's input carrier if it has inputs, its output otherwise.
    /// For storage, it is the discharge rate.
    pub fn iter_activity(
        &self,
    ) -> impl Iterator<Item = (&'a NodeID, &'a TechnologyID, TimeKey, Flow)> + '_ {
        let context = self.context();
        let registry = context.registry;
        self.formulation
            .variables
            .activity
            .iter()
            .map(move |(asset, period, slot, var)| {
                let asset = &registry.assets[asset];
                (
                    &registry.nodes[asset.node].id,
                    &registry.technology_of(asset).id,
                    TimeKey::new(context, period, slot),
                    Flow(self.value(var)),
                )
            })
    }

    /// The flow of each carrier into (negative) or out of (positive) an asset in a slot
    fn asset_carrier_flows(&self, asset: usize, period: usize, slot: usize) -> Vec<(usize, Flow)> {
        let registry = self.context().registry;
        let variables = &self.formulation.variables;
        let kind = &registry.technology_of(&registry.assets[asset]).kind;
        let activity = variables
            .activity
            .get(asset, period, slot)
            .map_or(0.0, |var| self.value(var));

        let mut flows: Vec<(usize, Flow)> = kind
            .linear_flows()
            .into_iter()
            .map(|share| (share.carrier, Flow(share.coefficient.0 * activity)))
            .collect();
        if let (TechnologyKind::Conversion(conversion), Some(curve), Some(segments)) = (
            kind,
            kind.segments(),
            variables.segments.get(asset, period, slot),
        ) {
            let output: f64 = curve
                .iter()
                .zip(segments)
                .map(|(segment, vars)| {
                    segment.slope.0 * self.value(vars.activity)
                        + segment.intercept.0 * self.value(vars.capacity)
                })
                .sum();
            flows.extend(
                conversion
                    .outputs
                    .iter()
                    .map(|share| (share.carrier, Flow(share.coefficient.0 * output))),
            );
        }
        if let (Some(storage), Some(charge)) =
            (kind.storage(), variables.charge.get(asset, period, slot))
        {
            flows.push((storage.carrier, -Flow(self.value(charge))));
        }
        if let (Some(capture), Some(captured)) =
            (kind.capture(), variables.captured.get(asset, period, slot))
        {
            let captured = self.value(captured);
            flows.extend(
                capture
                    .inputs
                    .iter()
                    .map(|&(carrier, energy)| (carrier, Flow(-energy.0 * captured))),
            );
        }

        flows
    }

    /// Iterate over carrier flows of every asset.
    ///
    /// Inputs and charging are negative, outputs and discharging positive.
    pub fn iter_carrier_flows(
        &self,
    ) -> impl Iterator<Item = (&'a NodeID, &'a TechnologyID, &'a CarrierID, TimeKey, Flow)> + '_
    {
        let context = self.context();
        let registry = context.registry;
        self.formulation
            .variables
            .activity
            .iter()
            .flat_map(move |(asset, period, slot, _)| {
                let asset_ref = &registry.assets[asset];
                let node = &registry.nodes[asset_ref.node].id;
                let technology = &registry.technology_of(asset_ref).id;
                let key = TimeKey::new(context, period, slot);
                self.asset_carrier_flows(asset, period, slot)
                    .into_iter()
                    .map(move |(carrier, flow)| {
                        (node, technology, carrier_id(context, carrier), key, flow)
                    })
            })
    }

    /// Iterate over the operation of every storage asset
    pub fn iter_storage(
        &self,
    ) -> impl Iterator<Item = (&'a NodeID, &'a TechnologyID, TimeKey, StorageValues)> + '_ {
        let context = self.context();
        let registry = context.registry;
        let variables = &self.formulation.variables;
        variables
            .level
            .iter()
            .map(move |(asset, period, slot, level)| {
                let value = |vars: &SlotVariables| {
                    vars.get(asset, period, slot)
                        .map_or(0.0, |var| self.value(var))
                };
                let asset_ref = &registry.assets[asset];
                (
                    &registry.nodes[asset_ref.node].id,
                    &registry.technology_of(asset_ref).id,
                    TimeKey::new(context, period, slot),
                    StorageValues {
                        charge: Flow(value(&variables.charge)),
                        discharge: Flow(value(&variables.activity)),
                        level: Energy(self.value(level)),
                    },
                )
            })
    }

    /// Iterate over the flow sent in each direction along every arc.
    ///
    /// # Returns
    ///
    /// An iterator of tuples containing an arc ID, time key, forward flow and reverse flow.
    pub fn iter_arc_flows(
        &self,
    ) -> impl Iterator<Item = (&'a ArcID, TimeKey, Flow, Flow)> + '_ {
        let context = self.context();
        let registry = context.registry;
        let variables = &self.formulation.variables;
        variables
            .forward_flow
            .iter()
            .map(move |(arc, period, slot, forward)| {
                let reverse = variables
                    .reverse_flow
                    .get(arc, period, slot)
                    .map_or(0.0, |var| self.value(var));
                (
                    &registry.arcs[arc].id,
                    TimeKey::new(context, period, slot),
                    Flow(self.value(forward)),
                    Flow(reverse),
                )
            })
    }

    /// Iterate over imports, exports and unmet demand at every node-carrier balance
    pub fn iter_exchanges(
        &self,
    ) -> impl Iterator<Item = (&'a NodeID, &'a CarrierID, TimeKey, ExchangeValues)> + '_ {
        let context = self.context();
        let registry = context.registry;
        let variables = &self.formulation.variables;
        let num_slots = context.num_slots();
        registry
            .node_carriers
            .iter()
            .enumerate()
            .filter(move |(index, _)| {
                variables.import.contains(*index)
                    || variables.export.contains(*index)
                    || variables.unmet_demand.contains(*index)
            })
            .flat_map(move |(index, balance)| {
                (0..context.num_periods()).flat_map(move |period| {
                    (0..num_slots).map(move |slot| {
                        let value = |vars: &SlotVariables| {
                            Flow(
                                vars.get(index, period, slot)
                                    .map_or(0.0, |var| self.value(var)),
                            )
                        };
                        (
                            &registry.nodes[balance.node].id,
                            carrier_id(context, balance.carrier),
                            TimeKey::new(context, period, slot),
                            ExchangeValues {
                                import: value(&variables.import),
                                export: value(&variables.export),
                                unmet_demand: value(&variables.unmet_demand),
                            },
                        )
                    })
                })
            })
    }

    /// Iterate over carrier prices at every node-carrier balance.
    ///
    /// Prices are the duals of the energy balances, undiscounted and divided by the hours each slot
    /// represents. They are only available for LPs solved to optimality; otherwise the iterator is
    /// empty.
    pub fn iter_prices(
        &self,
    ) -> impl Iterator<Item = (&'a NodeID, &'a CarrierID, TimeKey, MoneyPerEnergy)> + '_ {
        let context = self.context();
        let registry = context.registry;
        let keys = &self.formulation.constraint_keys.balance_keys;
        self.row_duals.iter().flat_map(move |duals| {
            keys.zip_duals(duals)
                .map(move |(&(balance, period, slot), dual)| {
                    let weight =
                        context.time.slot_hours(slot).0 * context.annual_discount(period).0;
                    let balance = &registry.node_carriers[balance];
                    (
                        &registry.nodes[balance.node].id,
                        carrier_id(context, balance.carrier),
                        TimeKey::new(context, period, slot),
                        MoneyPerEnergy(dual / weight),
                    )
                })
        })
    }

    /// Annual emissions in each period, keyed by start year
    pub fn iter_emissions(&self) -> impl Iterator<Item = (u32, Emissions)> + '_ {
        let periods = &self.context().registry.periods;
        periods
            .iter()
            .zip(&self.formulation.variables.emissions)
            .map(|(period, &var)| (period.start_year, Emissions(self.value(var))))
    }

    /// Iterate over the emissions captured by every asset fitted with carbon capture
    pub fn iter_capture(
        &self,
    ) -> impl Iterator<Item = (&'a NodeID, &'a TechnologyID, TimeKey, EmissionsPerHour)> + '_ {
        let context = self.context();
        let registry = context.registry;
        self.formulation
            .variables
            .captured
            .iter()
            .map(move |(asset, period, slot, var)| {
                let asset = &registry.assets[asset];
                (
                    &registry.nodes[asset.node].id,
                    &registry.technology_of(asset).id,
                    TimeKey::new(context, period, slot),
                    EmissionsPerHour(self.value(var)),
                )
            })
    }

    /// Annual emissions captured in each period, keyed by start year
    pub fn captured_emissions(&self) -> BTreeMap<u32, Emissions> {
        let context = self.context();
        let periods = &context.registry.periods;
        let mut totals: BTreeMap<_, _> = periods
            .iter()
            .map(|period| (period.start_year, Emissions(0.0)))
            .collect();
        for (_, period, slot, var) in self.formulation.variables.captured.iter() {
            let captured = EmissionsPerHour(self.value(var)) * context.time.slot_hours(slot);
            if let Some(total) = totals.get_mut(&periods.get(period).start_year) {
                *total += captured;
            }
        }

        totals
    }

    /// Total emissions above the cap (zero unless the cap may be violated)
    pub fn emission_violation(&self) -> Emissions {
        self.formulation
            .variables
            .emission_slack
            .iter()
            .map(|&var| Emissions(self.value(var)))
            .sum()
    }

    /// The discounted cost of each category in each period, keyed by period start year
    pub fn cost_breakdown(&self) -> Vec<(u32, CostCategory, Money)> {
        let periods = &self.context().registry.periods;
        self.formulation
            .costs
            .breakdown(&self.values)
            .into_iter()
            .map(|((period, category), cost)| (periods.get(period).start_year, category, cost))
            .collect()
    }

    /// The discounted cost of each category summed over all periods
    pub fn cost_totals(&self) -> BTreeMap<CostCategory, Money> {
        let mut totals: BTreeMap<_, _> = CostCategory::iter()
            .map(|category| (category, Money(0.0)))
            .collect();
        for (_, category, cost) in self.cost_breakdown() {
            if let Some(total) = totals.get_mut(&category) {
                *total += cost;
            }
        }

        totals
    }
}

fn carrier_id<'a>(context: &FormulationContext<'a>, carrier: usize) -> &'a CarrierID {
    &context.registry.carriers[carrier].id
}
