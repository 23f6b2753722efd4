//! Emission accounting and caps.
use crate::optimisation::FormulationContext;
use crate::optimisation::problem::Problem;
use crate::optimisation::variables::VariableSet;
use crate::parameters::EmissionCapKind;

/// Define annual emissions in each period and apply the cap, if there is one.
///
/// Emissions come from asset activity, imports and exports, weighted by the hours each slot
/// represents, less any emissions captured. A negative exchange factor credits the system for the
/// energy exchanged.
/// If the cap is violated without a slack variable, the problem is infeasible and the solver
/// reports it as such.
pub fn add_emission_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) {
    let registry = context.registry;
    let time = context.time;

    for period in 0..context.num_periods() {
        let mut terms = vec![(variables.emissions[period], 1.0)];
        for (asset_index, asset) in registry.assets.iter().enumerate() {
            let factor = registry.technology_of(asset).emission_factor.0;
            if factor == 0.0 {
                continue;
            }
            terms.extend((0..context.num_slots()).filter_map(|slot| {
                variables
                    .activity
                    .get(asset_index, period, slot)
                    .map(|var| (var, -factor * time.slot_hours(slot).0))
            }));
        }
        terms.extend(
            variables
                .captured
                .iter()
                .filter(|&(_, captured_period, _, _)| captured_period == period)
                .map(|(_, _, slot, var)| (var, time.slot_hours(slot).0)),
        );
        for (balance_index, balance) in registry.node_carriers.iter().enumerate() {
            let exchanges = [
                (balance.import.as_ref(), &variables.import),
                (balance.export.as_ref(), &variables.export),
            ];
            for (exchange, exchange_vars) in exchanges {
                let Some(factor) = exchange.map(|exchange| exchange.emission_factor.0) else {
                    continue;
                };
                if factor == 0.0 {
                    continue;
                }
                terms.extend((0..context.num_slots()).filter_map(|slot| {
                    exchange_vars
                        .get(balance_index, period, slot)
                        .map(|var| (var, -factor * time.slot_hours(slot).0))
                }));
            }
        }
        problem.add_row(0.0..=0.0, terms);
    }

    if context.emission_cap(0).is_none() {
        return;
    }
    match context.parameters.emissions.cap_kind {
        EmissionCapKind::PerPeriod => {
            for period in 0..context.num_periods() {
                let Some(cap) = context.emission_cap(period) else {
                    continue;
                };
                let mut terms = vec![(variables.emissions[period], 1.0)];
                terms.extend(
                    variables
                        .emission_slack
                        .get(period)
                        .map(|&slack| (slack, -1.0)),
                );
                problem.add_row(..=cap.0, terms);
            }
        }
        EmissionCapKind::Cumulative => {
            let Some(cap) = context.emission_cap(0) else {
                return;
            };
            let mut terms: Vec<_> = registry
                .periods
                .iter()
                .map(|period| {
                    (
                        variables.emissions[period.index],
                        f64::from(period.length),
                    )
                })
                .collect();
            terms.extend(variables.emission_slack.first().map(|&slack| (slack, -1.0)));
            problem.add_row(..=cap.0, terms);
        }
    }
}
