//! Constraints on the operation of assets and arcs within each period.
//!
//! Every technology variant is bounded through the same activity constraint; the variant decides
//! which extra constraints (piecewise performance, storage continuity) are added on top.
use crate::optimisation::FormulationContext;
use crate::optimisation::problem::Problem;
use crate::optimisation::variables::{VariableSet, capacity_big_m};
use crate::technology::ActivityBound;

/// Activity cannot exceed available capacity.
///
/// Available capacity is installed capacity scaled by the period availability, the capacity-factor
/// profile (if any) and the maximum activity per unit of capacity. Non-curtailable renewables must
/// produce exactly their available output. Renewables curtailed in whole modules produce exactly
/// the available output of the modules switched on.
pub fn add_activity_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) {
    let registry = context.registry;
    for (asset_index, asset) in registry.assets.iter().enumerate() {
        let technology = registry.technology_of(asset);
        let per_capacity = technology.kind.activity_per_capacity().0;
        let bound = technology.kind.activity_bound();

        for period in 0..context.num_periods() {
            let installed = variables.asset_capacity.installed(asset_index, period);
            let availability = technology.availability.get(period).0;
            for slot in 0..context.num_slots() {
                let Some(activity) = variables.activity.get(asset_index, period, slot) else {
                    continue;
                };
                let capacity_factor = asset
                    .capacity_factor
                    .map_or(1.0, |series| context.time.value(series, slot));
                let factor = availability * capacity_factor * per_capacity;
                match bound {
                    ActivityBound::UpTo => {
                        problem.add_row(..=0.0, [(activity, 1.0), (installed, -factor)]);
                    }
                    ActivityBound::Exactly => {
                        problem.add_row(0.0..=0.0, [(activity, 1.0), (installed, -factor)]);
                    }
                    ActivityBound::Modules(size) => {
                        let Some(online) = variables.modules_online.get(asset_index, period, slot)
                        else {
                            continue;
                        };
                        problem.add_row(0.0..=0.0, [(activity, 1.0), (online, -factor * size.0)]);
                        problem.add_row(..=0.0, [(online, size.0), (installed, -1.0)]);
                    }
                }
            }
        }
    }
}

/// Captured emissions cannot exceed the capture rate times the emissions of the activity
pub fn add_capture_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) {
    let registry = context.registry;
    for (asset, period, slot, captured) in variables.captured.iter() {
        let technology = registry.technology_of(&registry.assets[asset]);
        let (Some(capture), Some(activity)) = (
            technology.kind.capture(),
            variables.activity.get(asset, period, slot),
        ) else {
            continue;
        };
        let limit = capture.rate.0 * technology.emission_factor.0;
        problem.add_row(..=0.0, [(captured, 1.0), (activity, -limit)]);
    }
}

/// Piecewise performance curves.
///
/// At most one segment is active in each slot. Activity is the sum of the segment activities, each
/// of which lies within its segment's share of installed capacity. The segment capacity variable
/// equals installed capacity when its segment is active and zero otherwise, so the intercept term
/// of the output is linear.
pub fn add_piecewise_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) {
    let registry = context.registry;
    let big_m = context.parameters.big_m;
    for (asset_index, asset) in registry.assets.iter().enumerate() {
        let Some(curve) = registry.technology_of(asset).kind.segments() else {
            continue;
        };
        let m = capacity_big_m(&asset.capacity, big_m).0;

        for period in 0..context.num_periods() {
            let installed = variables.asset_capacity.installed(asset_index, period);
            for slot in 0..context.num_slots() {
                let (Some(segments), Some(activity)) = (
                    variables.segments.get(asset_index, period, slot),
                    variables.activity.get(asset_index, period, slot),
                ) else {
                    continue;
                };

                problem.add_row(..=1.0, segments.iter().map(|vars| (vars.on, 1.0)));
                problem.add_row(
                    0.0..=0.0,
                    std::iter::once((activity, 1.0))
                        .chain(segments.iter().map(|vars| (vars.activity, -1.0))),
                );
                for (segment, vars) in curve.iter().zip(segments) {
                    problem.add_row(..=0.0, [(vars.activity, 1.0), (vars.capacity, -segment.to.0)]);
                    problem.add_row(
                        0.0..,
                        [(vars.activity, 1.0), (vars.capacity, -segment.from.0)],
                    );
                    problem.add_row(..=0.0, [(vars.capacity, 1.0), (installed, -1.0)]);
                    problem.add_row(..=0.0, [(vars.capacity, 1.0), (vars.on, -m)]);
                    problem.add_row(
                        -m..,
                        [(vars.capacity, 1.0), (installed, -1.0), (vars.on, -m)],
                    );
                }
            }
        }
    }
}

/// Storage charging limits and state-of-charge continuity.
///
/// The state of charge is cyclic within each representative block: the level at the end of the
/// last sub-step is the starting level of the first.
pub fn add_storage_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) {
    let registry = context.registry;
    let time = context.time;
    let hours = time.step_hours().0;
    let big_m = context.parameters.big_m;
    for (asset_index, asset) in registry.assets.iter().enumerate() {
        let Some(storage) = registry.technology_of(asset).kind.storage() else {
            continue;
        };
        let retention = storage.retention(hours).0;
        let charge_rate = storage.max_charge_rate.0;
        let discharge_rate = storage.max_discharge_rate.0;
        let m = capacity_big_m(&asset.capacity, big_m).0;

        for period in 0..context.num_periods() {
            let installed = variables.asset_capacity.installed(asset_index, period);
            for slot in 0..context.num_slots() {
                let (Some(charge), Some(level), Some(level_before), Some(discharge)) = (
                    variables.charge.get(asset_index, period, slot),
                    variables.level.get(asset_index, period, slot),
                    variables
                        .level
                        .get(asset_index, period, time.previous_in_block(slot)),
                    variables.activity.get(asset_index, period, slot),
                ) else {
                    continue;
                };

                problem.add_row(..=0.0, [(charge, 1.0), (installed, -charge_rate)]);
                problem.add_row(..=0.0, [(level, 1.0), (installed, -1.0)]);
                problem.add_row(
                    0.0..=0.0,
                    [
                        (level, 1.0),
                        (level_before, -retention),
                        (charge, -hours * storage.charge_efficiency.0),
                        (discharge, hours / storage.discharge_efficiency.0),
                    ],
                );

                if let Some(charging) = variables.charging.get(asset_index, period, slot) {
                    problem.add_row(..=0.0, [(charge, 1.0), (charging, -charge_rate * m)]);
                    problem.add_row(
                        ..=discharge_rate * m,
                        [(discharge, 1.0), (charging, discharge_rate * m)],
                    );
                }
            }
        }
    }
}

/// Activity can change between consecutive sub-steps of a block by at most the ramp rate times
/// installed capacity per hour.
///
/// Ramping is not constrained across block boundaries, as consecutive blocks are not chronological.
pub fn add_ramping_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) {
    let registry = context.registry;
    let time = context.time;
    let hours = time.step_hours().0;
    for (asset_index, asset) in registry.assets.iter().enumerate() {
        let Some(ramp_rate) = registry.technology_of(asset).ramp_rate else {
            continue;
        };
        let limit = ramp_rate.0 * hours;

        for period in 0..context.num_periods() {
            let installed = variables.asset_capacity.installed(asset_index, period);
            for (slot, _, step) in time.iter_slots() {
                if step == 0 {
                    continue;
                }
                let (Some(current), Some(previous)) = (
                    variables.activity.get(asset_index, period, slot),
                    variables.activity.get(asset_index, period, slot - 1),
                ) else {
                    continue;
                };

                problem.add_row(
                    ..=0.0,
                    [(current, 1.0), (previous, -1.0), (installed, -limit)],
                );
                problem.add_row(
                    0.0..,
                    [(current, 1.0), (previous, -1.0), (installed, limit)],
                );
            }
        }
    }
}

/// Flow in each direction of an arc cannot exceed its installed capacity
pub fn add_arc_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) {
    for arc_index in 0..context.registry.arcs.len() {
        for period in 0..context.num_periods() {
            let installed = variables.arc_capacity.installed(arc_index, period);
            for slot in 0..context.num_slots() {
                let flows = [
                    variables.forward_flow.get(arc_index, period, slot),
                    variables.reverse_flow.get(arc_index, period, slot),
                ];
                for flow in flows.into_iter().flatten() {
                    problem.add_row(..=0.0, [(flow, 1.0), (installed, -1.0)]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::TimeStructure;
    use crate::fixture::{model_parameters, registry, time_structure};
    use crate::parameters::ModelParameters;
    use crate::registry::EntityRegistry;
    use rstest::rstest;

    fn rows_added<F>(
        registry: &EntityRegistry,
        time_structure: &TimeStructure,
        model_parameters: &ModelParameters,
        add: F,
    ) -> usize
    where
        F: Fn(&mut Problem, &VariableSet, &FormulationContext),
    {
        let context =
            FormulationContext::new(registry, time_structure, model_parameters).unwrap();
        let mut problem = Problem::default();
        let variables = VariableSet::add(&mut problem, &context);
        add(&mut problem, &variables, &context);
        problem.num_rows()
    }

    #[rstest]
    fn test_activity_rows_per_asset_and_slot(
        registry: EntityRegistry,
        time_structure: TimeStructure,
        model_parameters: ModelParameters,
    ) {
        let rows = rows_added(
            &registry,
            &time_structure,
            &model_parameters,
            add_activity_constraints,
        );
        assert_eq!(
            rows,
            registry.assets.len() * registry.periods.len() * time_structure.num_slots()
        );
    }

    #[rstest]
    fn test_storage_rows(
        registry: EntityRegistry,
        time_structure: TimeStructure,
        mut model_parameters: ModelParameters,
    ) {
        let per_slot = registry.periods.len() * time_structure.num_slots();
        let rows = rows_added(
            &registry,
            &time_structure,
            &model_parameters,
            add_storage_constraints,
        );
        assert_eq!(rows, 3 * per_slot);

        model_parameters.storage.exclusive_charging = true;
        let rows = rows_added(
            &registry,
            &time_structure,
            &model_parameters,
            add_storage_constraints,
        );
        assert_eq!(rows, 5 * per_slot);
    }

    #[rstest]
    fn test_arc_rows(
        registry: EntityRegistry,
        time_structure: TimeStructure,
        model_parameters: ModelParameters,
    ) {
        // One bidirectional arc
        let rows = rows_added(
            &registry,
            &time_structure,
            &model_parameters,
            add_arc_constraints,
        );
        assert_eq!(rows, 2 * registry.periods.len() * time_structure.num_slots());
    }
}
