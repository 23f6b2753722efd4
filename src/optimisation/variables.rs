//! Allocation of decision variables.
//!
//! Variables are stored in flat arrays addressed by dense index arithmetic. Investment-related
//! variables are indexed by `owner * num_periods + period`; operational variables by
//! `(entity * num_periods + period) * num_slots + slot`, where an entity is an asset, arc or
//! node-carrier balance.
//!
//! All variables are created with a zero objective coefficient; costs are added by the
//! [`objective`](super::objective) module.
use super::FormulationContext;
use super::problem::{Problem, Variable};
use crate::asset::CapacityParameters;
use crate::period::PeriodInfo;
use crate::technology::ActivityBound;
use crate::units::Capacity;

/// How the capacity of an owner evolves across periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityLayout {
    /// No capacity can ever exist; all variables are fixed at zero
    Degenerate,
    /// Capacity never outlives the period in which it is built, so installed capacity and
    /// investment are the same variable and no carry-over is needed
    SinglePeriod,
    /// Installed capacity is carried over from one period to the next
    Chain,
}

impl CapacityLayout {
    /// Pick the layout for an owner's capacity
    pub fn for_parameters(capacity: &CapacityParameters, periods: &PeriodInfo) -> Self {
        if capacity.is_degenerate() {
            Self::Degenerate
        } else if capacity.is_single_period(periods) {
            Self::SinglePeriod
        } else {
            Self::Chain
        }
    }
}

/// Whether any capacity retires at the start of the given period
pub fn retires_in(capacity: &CapacityParameters, periods: &PeriodInfo, period: usize) -> bool {
    (capacity.existing_capacity.0 > 0.0 && capacity.existing_retirement_period(periods) == Some(period))
        || (0..period).any(|built| capacity.retirement_period(periods, built) == Some(period))
}

/// Investment-related variables for a set of capacity owners (assets or arcs)
#[derive(Debug, Clone, Default)]
pub struct CapacityVariables {
    num_periods: usize,
    layouts: Vec<CapacityLayout>,
    installed: Vec<Variable>,
    investment: Vec<Variable>,
    retirement: Vec<Option<Variable>>,
    existence: Vec<Option<Variable>>,
}

impl CapacityVariables {
    /// Allocate investment variables for every owner and period.
    ///
    /// Bounds on installed capacity and investment are applied here; the linking rows are added
    /// by the constraint generator.
    pub fn add<'a, I>(problem: &mut Problem, owners: I, periods: &PeriodInfo) -> Self
    where
        I: IntoIterator<Item = &'a CapacityParameters>,
    {
        let mut vars = Self {
            num_periods: periods.len(),
            ..Self::default()
        };

        for capacity in owners {
            let layout = CapacityLayout::for_parameters(capacity, periods);
            vars.layouts.push(layout);
            for period in 0..periods.len() {
                let max_addition = capacity.max_addition.get(period);
                let (installed, investment, retirement) = match layout {
                    CapacityLayout::Degenerate => {
                        let var = problem.add_column(0.0, 0.0..=0.0);
                        (var, var, None)
                    }
                    CapacityLayout::SinglePeriod => {
                        let existing = capacity.existing_in_period(periods, period);
                        let upper = (existing + max_addition).0.min(capacity.max_capacity.0);
                        let var = problem.add_column(0.0, existing.0..=upper.max(existing.0));
                        (var, var, None)
                    }
                    CapacityLayout::Chain => {
                        let installed = problem.add_column(0.0, 0.0..=capacity.max_capacity.0);
                        let investment = problem.add_column(0.0, 0.0..=max_addition.0);
                        let retirement = retires_in(capacity, periods, period)
                            .then(|| problem.add_column(0.0, 0.0..));
                        (installed, investment, retirement)
                    }
                };
                let existence = (capacity.discrete && layout != CapacityLayout::Degenerate)
                    .then(|| problem.add_binary_column(0.0));

                vars.installed.push(installed);
                vars.investment.push(investment);
                vars.retirement.push(retirement);
                vars.existence.push(existence);
            }
        }

        vars
    }

    fn index(&self, owner: usize, period: usize) -> usize {
        owner * self.num_periods + period
    }

    /// The number of owners
    pub fn num_owners(&self) -> usize {
        self.layouts.len()
    }

    /// The capacity layout of an owner
    pub fn layout(&self, owner: usize) -> CapacityLayout {
        self.layouts[owner]
    }

    /// Installed capacity of an owner in a period
    pub fn installed(&self, owner: usize, period: usize) -> Variable {
        self.installed[self.index(owner, period)]
    }

    /// Newly built capacity of an owner in a period.
    ///
    /// For [`CapacityLayout::SinglePeriod`] owners this is the same variable as the installed
    /// capacity, which includes any existing capacity.
    pub fn investment(&self, owner: usize, period: usize) -> Variable {
        self.investment[self.index(owner, period)]
    }

    /// Capacity retired at the start of a period, if any can retire then
    pub fn retirement(&self, owner: usize, period: usize) -> Option<Variable> {
        self.retirement[self.index(owner, period)]
    }

    /// Whether new capacity is commissioned in a period (discrete owners only)
    pub fn existence(&self, owner: usize, period: usize) -> Option<Variable> {
        self.existence[self.index(owner, period)]
    }
}

/// One variable per entity, period and slot for a subset of entities
#[derive(Debug, Clone)]
pub struct SlotVariables {
    num_periods: usize,
    num_slots: usize,
    lookup: Vec<Option<usize>>,
    entities: Vec<usize>,
    vars: Vec<Variable>,
}

impl SlotVariables {
    /// Create an empty set for up to `num_entities` entities
    pub fn new(num_entities: usize, num_periods: usize, num_slots: usize) -> Self {
        Self {
            num_periods,
            num_slots,
            lookup: vec![None; num_entities],
            entities: Vec::new(),
            vars: Vec::new(),
        }
    }

    /// Add variables for an entity, in period then slot order
    pub fn add_entity<F>(&mut self, entity: usize, mut add_var: F)
    where
        F: FnMut(usize, usize) -> Variable,
    {
        self.lookup[entity] = Some(self.entities.len());
        self.entities.push(entity);
        for period in 0..self.num_periods {
            for slot in 0..self.num_slots {
                self.vars.push(add_var(period, slot));
            }
        }
    }

    /// The variable for an entity in a period and slot, if the entity has variables
    pub fn get(&self, entity: usize, period: usize, slot: usize) -> Option<Variable> {
        let position = self.lookup.get(entity).copied().flatten()?;
        Some(self.vars[(position * self.num_periods + period) * self.num_slots + slot])
    }

    /// Whether the entity has variables
    pub fn contains(&self, entity: usize) -> bool {
        self.lookup.get(entity).copied().flatten().is_some()
    }

    /// The number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether there are no variables
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over the entities which have variables
    pub fn entities(&self) -> impl Iterator<Item = usize> + '_ {
        self.entities.iter().copied()
    }

    /// Iterate over all variables as `(entity, period, slot, variable)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize, Variable)> + '_ {
        let per_entity = self.num_periods * self.num_slots;
        self.vars.iter().enumerate().map(move |(index, &var)| {
            let entity = self.entities[index / per_entity];
            let within = index % per_entity;
            (entity, within / self.num_slots, within % self.num_slots, var)
        })
    }
}

/// Variables for one segment of a piecewise performance curve in one slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentVariables {
    /// Activity within the segment
    pub activity: Variable,
    /// Whether the segment is the operating one
    pub on: Variable,
    /// Installed capacity if the segment is operating, zero otherwise
    pub capacity: Variable,
}

/// Segment variables for every asset with a piecewise performance curve
#[derive(Debug, Clone)]
pub struct PiecewiseVariables {
    num_periods: usize,
    num_slots: usize,
    lookup: Vec<Option<(usize, usize)>>,
    vars: Vec<SegmentVariables>,
}

impl PiecewiseVariables {
    fn new(num_assets: usize, num_periods: usize, num_slots: usize) -> Self {
        Self {
            num_periods,
            num_slots,
            lookup: vec![None; num_assets],
            vars: Vec::new(),
        }
    }

    fn add_asset(&mut self, problem: &mut Problem, asset: usize, num_segments: usize) {
        self.lookup[asset] = Some((self.vars.len(), num_segments));
        for _ in 0..self.num_periods * self.num_slots * num_segments {
            self.vars.push(SegmentVariables {
                activity: problem.add_column(0.0, 0.0..),
                on: problem.add_binary_column(0.0),
                capacity: problem.add_column(0.0, 0.0..),
            });
        }
    }

    /// The segment variables of an asset in a period and slot, if it has a piecewise curve
    pub fn get(&self, asset: usize, period: usize, slot: usize) -> Option<&[SegmentVariables]> {
        let (start, num_segments) = self.lookup.get(asset).copied().flatten()?;
        let offset = start + (period * self.num_slots + slot) * num_segments;
        Some(&self.vars[offset..offset + num_segments])
    }

    /// The total number of segment variable groups
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no asset has a piecewise curve
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// All decision variables of a formulation.
///
/// Created once per run by [`VariableSet::add`] and read-only afterwards.
#[derive(Debug, Clone)]
pub struct VariableSet {
    /// Installed capacity, investment, retirement and existence of assets
    pub asset_capacity: CapacityVariables,
    /// Installed capacity, investment and retirement of network arcs
    pub arc_capacity: CapacityVariables,
    /// Activity of every asset (discharge for storage)
    pub activity: SlotVariables,
    /// Charging of storage assets
    pub charge: SlotVariables,
    /// State of charge of storage assets at the end of each slot
    pub level: SlotVariables,
    /// Whether a storage asset is charging (exclusive charging only)
    pub charging: SlotVariables,
    /// Segment variables of piecewise conversion assets
    pub segments: PiecewiseVariables,
    /// Emissions captured per hour by assets fitted with carbon capture
    pub captured: SlotVariables,
    /// Number of modules switched on for renewables curtailed in whole modules
    pub modules_online: SlotVariables,
    /// Flow from the start to the end node of every arc
    pub forward_flow: SlotVariables,
    /// Flow from the end to the start node of bidirectional arcs
    pub reverse_flow: SlotVariables,
    /// Imports at node-carrier balances
    pub import: SlotVariables,
    /// Exports at node-carrier balances
    pub export: SlotVariables,
    /// Unmet demand at node-carrier balances (only if allowed)
    pub unmet_demand: SlotVariables,
    /// Annual emissions in each period
    pub emissions: Vec<Variable>,
    /// Emissions above the cap (per period or a single cumulative value), if the cap may be
    /// violated
    pub emission_slack: Vec<Variable>,
}

impl VariableSet {
    /// Add all decision variables to the problem
    pub fn add(problem: &mut Problem, context: &FormulationContext) -> Self {
        let registry = context.registry;
        let periods = &registry.periods;
        let num_periods = periods.len();
        let num_slots = context.time.num_slots();
        let num_assets = registry.assets.len();
        let num_arcs = registry.arcs.len();
        let num_balances = registry.node_carriers.len();

        let asset_capacity = CapacityVariables::add(
            problem,
            registry.assets.iter().map(|asset| &asset.capacity),
            periods,
        );
        let arc_capacity = CapacityVariables::add(
            problem,
            registry.arcs.values().map(|arc| &arc.capacity),
            periods,
        );

        let mut activity = SlotVariables::new(num_assets, num_periods, num_slots);
        let mut charge = SlotVariables::new(num_assets, num_periods, num_slots);
        let mut level = SlotVariables::new(num_assets, num_periods, num_slots);
        let mut charging = SlotVariables::new(num_assets, num_periods, num_slots);
        let mut segments = PiecewiseVariables::new(num_assets, num_periods, num_slots);
        let mut captured = SlotVariables::new(num_assets, num_periods, num_slots);
        let mut modules_online = SlotVariables::new(num_assets, num_periods, num_slots);
        for (index, asset) in registry.assets.iter().enumerate() {
            let degenerate = asset_capacity.layout(index) == CapacityLayout::Degenerate;
            let upper = if degenerate { 0.0 } else { f64::INFINITY };
            activity.add_entity(index, |_, _| problem.add_column(0.0, 0.0..=upper));

            let kind = &registry.technology_of(asset).kind;
            if kind.storage().is_some() {
                charge.add_entity(index, |_, _| problem.add_column(0.0, 0.0..=upper));
                level.add_entity(index, |_, _| problem.add_column(0.0, 0.0..=upper));
                if context.parameters.storage.exclusive_charging && !degenerate {
                    charging.add_entity(index, |_, _| problem.add_binary_column(0.0));
                }
            }
            if let Some(curve) = kind.segments() {
                if !degenerate {
                    segments.add_asset(problem, index, curve.len());
                }
            }
            if kind.capture().is_some() {
                captured.add_entity(index, |_, _| problem.add_column(0.0, 0.0..=upper));
            }
            if matches!(kind.activity_bound(), ActivityBound::Modules(_)) {
                modules_online
                    .add_entity(index, |_, _| problem.add_integer_column(0.0, 0.0..=upper));
            }
        }

        let mut forward_flow = SlotVariables::new(num_arcs, num_periods, num_slots);
        let mut reverse_flow = SlotVariables::new(num_arcs, num_periods, num_slots);
        for (index, arc) in registry.arcs.values().enumerate() {
            let degenerate = arc_capacity.layout(index) == CapacityLayout::Degenerate;
            let upper = if degenerate { 0.0 } else { f64::INFINITY };
            forward_flow.add_entity(index, |_, _| problem.add_column(0.0, 0.0..=upper));
            if arc.bidirectional {
                reverse_flow.add_entity(index, |_, _| problem.add_column(0.0, 0.0..=upper));
            }
        }

        let mut import = SlotVariables::new(num_balances, num_periods, num_slots);
        let mut export = SlotVariables::new(num_balances, num_periods, num_slots);
        let mut unmet_demand = SlotVariables::new(num_balances, num_periods, num_slots);
        for (index, balance) in registry.node_carriers.iter().enumerate() {
            if let Some(exchange) = &balance.import {
                import.add_entity(index, |_, _| problem.add_column(0.0, 0.0..=exchange.limit.0));
            }
            if let Some(exchange) = &balance.export {
                export.add_entity(index, |_, _| problem.add_column(0.0, 0.0..=exchange.limit.0));
            }
            if context.parameters.balance.allow_unmet_demand && balance.demand.is_some() {
                unmet_demand.add_entity(index, |_, _| problem.add_column(0.0, 0.0..));
            }
        }

        let emissions = (0..num_periods)
            .map(|_| problem.add_column(0.0, ..))
            .collect();
        let emission_slack = context.emission_slack_count();
        let emission_slack = (0..emission_slack)
            .map(|_| problem.add_column(0.0, 0.0..))
            .collect();

        Self {
            asset_capacity,
            arc_capacity,
            activity,
            charge,
            level,
            charging,
            segments,
            captured,
            modules_online,
            forward_flow,
            reverse_flow,
            import,
            export,
            unmet_demand,
            emissions,
            emission_slack,
        }
    }

    /// The number of operational (per-slot) variables
    pub fn num_operational(&self) -> usize {
        [
            &self.activity,
            &self.charge,
            &self.level,
            &self.charging,
            &self.captured,
            &self.modules_online,
            &self.forward_flow,
            &self.reverse_flow,
            &self.import,
            &self.export,
            &self.unmet_demand,
        ]
        .iter()
        .map(|vars| vars.len())
        .sum::<usize>()
            + self.segments.len() * 3
    }
}

/// A finite upper bound on capacity for disjunctive constraints
pub fn capacity_big_m(capacity: &CapacityParameters, big_m: Capacity) -> Capacity {
    if capacity.max_capacity.0.is_finite() {
        capacity.max_capacity
    } else {
        big_m
    }
}
