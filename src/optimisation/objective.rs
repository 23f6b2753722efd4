//! The objective: total discounted system cost.
//!
//! Every cost term is recorded in a [`CostLedger`] as well as being added to the problem, so that
//! the solved objective can be broken down by category and period.
use super::FormulationContext;
use super::problem::{Problem, Variable};
use super::variables::{CapacityLayout, CapacityVariables, SlotVariables, VariableSet};
use crate::asset::CapacityParameters;
use crate::finance::{capital_recovery_factor, discount_factor};
use crate::parameter::PeriodTable;
use crate::parameters::EmissionCapKind;
use crate::period::PeriodInfo;
use crate::units::{Dimensionless, Money, MoneyPerEnergy};
use std::collections::BTreeMap;
use strum::{Display, EnumIter};

/// The kind of cost a term of the objective represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CostCategory {
    /// Annualised capital cost of new capacity
    Investment,
    /// Fixed operating cost of installed capacity
    FixedOperation,
    /// Variable operating cost of asset activity
    VariableOperation,
    /// Transport and storage of captured emissions
    CarbonCapture,
    /// Cost of imports
    Imports,
    /// Revenue from exports (negative)
    ExportRevenue,
    /// Variable cost of network flows
    Network,
    /// Carbon price on emissions
    EmissionPrice,
    /// Penalty for unmet demand
    UnmetDemand,
    /// Penalty for emissions above the cap
    EmissionPenalty,
}

#[derive(Debug, Clone, Copy)]
struct CostTerm {
    category: CostCategory,
    period: usize,
    var: Variable,
    coefficient: f64,
}

/// A record of the terms in the objective
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    terms: Vec<CostTerm>,
    constants: Vec<(CostCategory, usize, f64)>,
}

impl CostLedger {
    fn add(
        &mut self,
        problem: &mut Problem,
        category: CostCategory,
        period: usize,
        var: Variable,
        coefficient: f64,
    ) {
        if coefficient == 0.0 {
            return;
        }

        problem.add_cost(var, coefficient);
        self.terms.push(CostTerm {
            category,
            period,
            var,
            coefficient,
        });
    }

    fn add_constant(
        &mut self,
        problem: &mut Problem,
        category: CostCategory,
        period: usize,
        value: f64,
    ) {
        if value == 0.0 {
            return;
        }

        problem.add_objective_offset(value);
        self.constants.push((category, period, value));
    }

    /// Add a cost per hour of a slot variable for every period and slot
    fn add_hourly<F>(
        &mut self,
        problem: &mut Problem,
        context: &FormulationContext,
        category: CostCategory,
        vars: &SlotVariables,
        cost: F,
    ) where
        F: Fn(usize, usize) -> MoneyPerEnergy,
    {
        for (entity, period, slot, var) in vars.iter() {
            let weight = context.time.slot_hours(slot).0 * context.annual_discount(period).0;
            self.add(
                problem,
                category,
                period,
                var,
                cost(entity, period).0 * weight,
            );
        }
    }

    /// Sum the cost terms for the given column values by period and category
    pub fn breakdown(&self, values: &[f64]) -> BTreeMap<(usize, CostCategory), Money> {
        let mut totals = BTreeMap::new();
        for term in &self.terms {
            *totals
                .entry((term.period, term.category))
                .or_insert(Money(0.0)) += Money(term.coefficient * values[term.var.index()]);
        }
        for &(category, period, value) in &self.constants {
            *totals.entry((period, category)).or_insert(Money(0.0)) += Money(value);
        }

        totals
    }
}

/// The present value of the capital cost of one unit of capacity built in a period.
///
/// Capital cost is annualised over the lifetime. Only the annuities paid before the end of the
/// horizon are counted.
pub fn capital_cost_coefficient(
    capacity: &CapacityParameters,
    periods: &PeriodInfo,
    period: usize,
    discount_rate: Dimensionless,
) -> f64 {
    let crf = capital_recovery_factor(
        capacity.lifetime,
        capacity.discount_rate.unwrap_or(discount_rate),
    );
    let start = periods.get(period).start_year;
    let end = (start + capacity.lifetime).min(periods.horizon_end());
    let discount: Dimensionless = (start..end)
        .map(|year| discount_factor(discount_rate, periods.base_year(), year))
        .sum();

    (capacity.capital_cost.get(period) * crf).0 * discount.0
}

/// Add investment and fixed operating costs for a set of capacity owners
fn add_capacity_costs<'a, I>(
    problem: &mut Problem,
    ledger: &mut CostLedger,
    context: &FormulationContext,
    vars: &CapacityVariables,
    owners: I,
) where
    I: IntoIterator<Item = &'a CapacityParameters>,
{
    let periods = &context.registry.periods;
    let discount_rate = context.parameters.discount_rate;
    for (owner, capacity) in owners.into_iter().enumerate() {
        let layout = vars.layout(owner);
        if layout == CapacityLayout::Degenerate {
            continue;
        }

        for period in 0..periods.len() {
            let capex = capital_cost_coefficient(capacity, periods, period, discount_rate);
            ledger.add(
                problem,
                CostCategory::Investment,
                period,
                vars.investment(owner, period),
                capex,
            );
            if layout == CapacityLayout::SinglePeriod {
                // The investment variable includes existing capacity, which costs nothing to build
                let existing = capacity.existing_in_period(periods, period).0;
                ledger.add_constant(problem, CostCategory::Investment, period, -capex * existing);
            }

            let fixed = capacity.fixed_operating_cost.get(period).0
                * context.annual_discount(period).0;
            ledger.add(
                problem,
                CostCategory::FixedOperation,
                period,
                vars.installed(owner, period),
                fixed,
            );
        }
    }
}

/// Add all cost terms to the objective.
///
/// Costs of each period are discounted to the start of the first period. Annual operating costs are
/// weighted by the hours each slot represents and multiplied by the sum of the discount factors of
/// the years in the period.
///
/// # Returns
///
/// A record of every cost term
pub fn add_objective(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) -> CostLedger {
    let registry = context.registry;
    let mut ledger = CostLedger::default();

    add_capacity_costs(
        problem,
        &mut ledger,
        context,
        &variables.asset_capacity,
        registry.assets.iter().map(|asset| &asset.capacity),
    );
    add_capacity_costs(
        problem,
        &mut ledger,
        context,
        &variables.arc_capacity,
        registry.arcs.values().map(|arc| &arc.capacity),
    );

    ledger.add_hourly(
        problem,
        context,
        CostCategory::VariableOperation,
        &variables.activity,
        |asset, period| {
            registry
                .technology_of(&registry.assets[asset])
                .variable_operating_cost
                .get(period)
        },
    );
    for (asset, period, slot, var) in variables.captured.iter() {
        let Some(capture) = registry.technology_of(&registry.assets[asset]).kind.capture() else {
            continue;
        };
        let weight = context.time.slot_hours(slot).0 * context.annual_discount(period).0;
        ledger.add(
            problem,
            CostCategory::CarbonCapture,
            period,
            var,
            capture.cost.get(period).0 * weight,
        );
    }
    let exchange_price = |table: Option<&PeriodTable<MoneyPerEnergy>>, period| {
        table.map_or(MoneyPerEnergy(0.0), |table| table.get(period))
    };
    ledger.add_hourly(
        problem,
        context,
        CostCategory::Imports,
        &variables.import,
        |balance, period| {
            let import = registry.node_carriers[balance].import.as_ref();
            exchange_price(import.map(|exchange| &exchange.price), period)
        },
    );
    ledger.add_hourly(
        problem,
        context,
        CostCategory::ExportRevenue,
        &variables.export,
        |balance, period| {
            let export = registry.node_carriers[balance].export.as_ref();
            -exchange_price(export.map(|exchange| &exchange.price), period)
        },
    );
    for flows in [&variables.forward_flow, &variables.reverse_flow] {
        ledger.add_hourly(
            problem,
            context,
            CostCategory::Network,
            flows,
            |arc, period| registry.arcs[arc].flow_cost.get(period),
        );
    }
    let value_of_lost_load = context.parameters.balance.value_of_lost_load;
    ledger.add_hourly(
        problem,
        context,
        CostCategory::UnmetDemand,
        &variables.unmet_demand,
        |_, _| value_of_lost_load,
    );

    for (period, &var) in variables.emissions.iter().enumerate() {
        let price = context.emission_price(period).0 * context.annual_discount(period).0;
        ledger.add(problem, CostCategory::EmissionPrice, period, var, price);
    }
    if let Some(penalty) = context.parameters.emissions.violation_penalty {
        match context.parameters.emissions.cap_kind {
            EmissionCapKind::PerPeriod => {
                for (period, &var) in variables.emission_slack.iter().enumerate() {
                    let cost = penalty.0 * context.annual_discount(period).0;
                    ledger.add(problem, CostCategory::EmissionPenalty, period, var, cost);
                }
            }
            EmissionCapKind::Cumulative => {
                // A cumulative slack is not tied to any one period
                if let Some(&var) = variables.emission_slack.first() {
                    ledger.add(problem, CostCategory::EmissionPenalty, 0, var, penalty.0);
                }
            }
        }
    }

    ledger
}
