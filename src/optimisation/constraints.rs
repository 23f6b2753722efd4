//! Code for adding constraints to the optimisation problem.
//!
//! Energy balances are added first so that their dual values can be found by position; the other
//! constraint families follow in a fixed order.
use super::FormulationContext;
use super::problem::Problem;
use super::variables::VariableSet;
use crate::technology::{ConversionParameters, TechnologyKind};
use log::debug;

mod capacity;
mod emissions;
mod operation;

/// Corresponding variables for a constraint along with the row offset in the solution
#[derive(Debug, Clone)]
pub struct KeysWithOffset<T> {
    offset: usize,
    keys: Vec<T>,
}

impl<T> KeysWithOffset<T> {
    /// Zip the keys with the corresponding dual values in the solution, accounting for the offset
    pub fn zip_duals<'a>(&'a self, duals: &'a [f64]) -> impl Iterator<Item = (&'a T, f64)> {
        assert!(
            self.offset + self.keys.len() <= duals.len(),
            "Bad constraint keys: dual rows out of range"
        );

        self.keys.iter().zip(duals[self.offset..].iter().copied())
    }

    /// The number of constraints
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether there are no constraints
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Indicates the node-carrier balance, period and slot covered by each energy balance constraint
pub type BalanceKeys = KeysWithOffset<(usize, usize, usize)>;

/// The keys for constraints whose duals are of interest
#[derive(Debug, Clone)]
pub struct ConstraintKeys {
    /// Keys for energy balance constraints
    pub balance_keys: BalanceKeys,
}

/// Add all constraints.
///
/// Note: the ordering of constraints is important, as the dual values of the balance constraints
/// must later be retrieved to calculate carrier prices.
///
/// # Arguments
///
/// * `problem` - The optimisation problem
/// * `variables` - The variables in the problem
/// * `context` - The inputs of the formulation
///
/// # Returns
///
/// Keys for the energy balance constraints
pub fn add_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) -> ConstraintKeys {
    let balance_keys = add_balance_constraints(problem, variables, context);
    debug!("Added {} balance constraints", balance_keys.len());

    let mut rows_before = problem.num_rows();
    let mut log_family = |problem: &Problem, family: &str| {
        debug!("Added {} {family} constraints", problem.num_rows() - rows_before);
        rows_before = problem.num_rows();
    };

    capacity::add_capacity_constraints(problem, variables, context);
    log_family(problem, "capacity");
    operation::add_activity_constraints(problem, variables, context);
    log_family(problem, "activity");
    operation::add_piecewise_constraints(problem, variables, context);
    log_family(problem, "piecewise performance");
    operation::add_storage_constraints(problem, variables, context);
    log_family(problem, "storage");
    operation::add_capture_constraints(problem, variables, context);
    log_family(problem, "carbon capture");
    operation::add_ramping_constraints(problem, variables, context);
    log_family(problem, "ramping");
    operation::add_arc_constraints(problem, variables, context);
    log_family(problem, "network flow");
    emissions::add_emission_constraints(problem, variables, context);
    log_family(problem, "emission");

    ConstraintKeys { balance_keys }
}

/// A variable which contributes to a node-carrier balance in every period and slot
#[derive(Debug, Clone, Copy, PartialEq)]
enum Contribution {
    Activity(usize),
    SegmentActivity(usize, usize),
    SegmentCapacity(usize, usize),
    Charge(usize),
    Captured(usize),
    ForwardFlow(usize),
    ReverseFlow(usize),
}

/// The outputs of a piecewise conversion technology, if it is one
fn piecewise_outputs(kind: &TechnologyKind) -> Option<&ConversionParameters> {
    match kind {
        TechnologyKind::Conversion(conversion) if kind.segments().is_some() => Some(conversion),
        _ => None,
    }
}

/// Collect the variables which contribute to the balance of a carrier at a node
fn balance_contributions(
    context: &FormulationContext,
    node: usize,
    carrier: usize,
) -> Vec<(Contribution, f64)> {
    let registry = context.registry;
    let mut contributions = Vec::new();

    for &asset_index in &registry.nodes[node].assets {
        let kind = &registry.technology_of(&registry.assets[asset_index]).kind;
        for share in kind.linear_flows() {
            if share.carrier == carrier {
                contributions.push((Contribution::Activity(asset_index), share.coefficient.0));
            }
        }
        if let (Some(conversion), Some(segments)) = (piecewise_outputs(kind), kind.segments()) {
            for share in conversion.outputs.iter().filter(|s| s.carrier == carrier) {
                for (k, segment) in segments.iter().enumerate() {
                    let share = share.coefficient.0;
                    contributions.push((
                        Contribution::SegmentActivity(asset_index, k),
                        share * segment.slope.0,
                    ));
                    contributions.push((
                        Contribution::SegmentCapacity(asset_index, k),
                        share * segment.intercept.0,
                    ));
                }
            }
        }
        if kind.storage().is_some_and(|storage| storage.carrier == carrier) {
            contributions.push((Contribution::Charge(asset_index), -1.0));
        }
        if let Some(capture) = kind.capture() {
            for &(_, energy) in capture.inputs.iter().filter(|(c, _)| *c == carrier) {
                contributions.push((Contribution::Captured(asset_index), -energy.0));
            }
        }
    }

    for &arc_index in &registry.nodes[node].arcs {
        let arc = &registry.arcs[arc_index];
        if arc.carrier != carrier {
            continue;
        }
        let delivery = arc.delivery_factor().0;
        if arc.from == node {
            contributions.push((Contribution::ForwardFlow(arc_index), -1.0));
            contributions.push((Contribution::ReverseFlow(arc_index), delivery));
        } else {
            contributions.push((Contribution::ForwardFlow(arc_index), delivery));
            contributions.push((Contribution::ReverseFlow(arc_index), -1.0));
        }
    }

    contributions
}

/// Add energy balance constraints.
///
/// For every node, carrier, period and slot, production plus inbound flow (net of losses) plus
/// imports and unmet demand, minus consumption (including energy used for carbon capture),
/// charging, outbound flow and exports, equals demand.
fn add_balance_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) -> BalanceKeys {
    // Row offset in problem. This line **must** come before we add more constraints.
    let offset = problem.num_rows();

    let mut keys = Vec::new();
    for (balance_index, balance) in context.registry.node_carriers.iter().enumerate() {
        let contributions = balance_contributions(context, balance.node, balance.carrier);
        for period in 0..context.num_periods() {
            let scale = balance.demand_scale.get(period).0;
            for slot in 0..context.num_slots() {
                let mut terms = Vec::with_capacity(contributions.len() + 3);
                for &(contribution, coeff) in &contributions {
                    let var = match contribution {
                        Contribution::Activity(asset) => {
                            variables.activity.get(asset, period, slot)
                        }
                        Contribution::SegmentActivity(asset, k) => variables
                            .segments
                            .get(asset, period, slot)
                            .map(|segments| segments[k].activity),
                        Contribution::SegmentCapacity(asset, k) => variables
                            .segments
                            .get(asset, period, slot)
                            .map(|segments| segments[k].capacity),
                        Contribution::Charge(asset) => variables.charge.get(asset, period, slot),
                        Contribution::Captured(asset) => {
                            variables.captured.get(asset, period, slot)
                        }
                        Contribution::ForwardFlow(arc) => {
                            variables.forward_flow.get(arc, period, slot)
                        }
                        Contribution::ReverseFlow(arc) => {
                            variables.reverse_flow.get(arc, period, slot)
                        }
                    };
                    if let Some(var) = var {
                        terms.push((var, coeff));
                    }
                }
                let exchange_terms = [
                    (variables.import.get(balance_index, period, slot), 1.0),
                    (variables.export.get(balance_index, period, slot), -1.0),
                    (variables.unmet_demand.get(balance_index, period, slot), 1.0),
                ];
                terms.extend(
                    exchange_terms
                        .into_iter()
                        .filter_map(|(var, coeff)| var.map(|var| (var, coeff))),
                );

                let demand = balance
                    .demand
                    .map_or(0.0, |series| context.time.value(series, slot) * scale);
                problem.add_row(demand..=demand, terms);
                keys.push((balance_index, period, slot));
            }
        }
    }

    BalanceKeys { offset, keys }
}
