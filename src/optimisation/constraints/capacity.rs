//! Capacity carry-over, retirement and discrete commissioning.
use crate::asset::CapacityParameters;
use crate::optimisation::FormulationContext;
use crate::optimisation::problem::Problem;
use crate::optimisation::variables::{
    CapacityLayout, CapacityVariables, VariableSet, capacity_big_m,
};
use crate::period::PeriodInfo;
use crate::units::Capacity;

/// Add capacity accounting constraints for assets and arcs
pub fn add_capacity_constraints(
    problem: &mut Problem,
    variables: &VariableSet,
    context: &FormulationContext,
) {
    let registry = context.registry;
    let big_m = context.parameters.big_m;
    add_owner_constraints(
        problem,
        &variables.asset_capacity,
        registry.assets.iter().map(|asset| &asset.capacity),
        &registry.periods,
        big_m,
    );
    add_owner_constraints(
        problem,
        &variables.arc_capacity,
        registry.arcs.values().map(|arc| &arc.capacity),
        &registry.periods,
        big_m,
    );
}

fn add_owner_constraints<'a, I>(
    problem: &mut Problem,
    vars: &CapacityVariables,
    owners: I,
    periods: &PeriodInfo,
    big_m: Capacity,
) where
    I: IntoIterator<Item = &'a CapacityParameters>,
{
    for (owner, capacity) in owners.into_iter().enumerate() {
        match vars.layout(owner) {
            CapacityLayout::Degenerate => {}
            CapacityLayout::SinglePeriod => {
                add_discrete_constraints(problem, vars, owner, capacity, periods, big_m);
            }
            CapacityLayout::Chain => {
                add_carry_over_constraints(problem, vars, owner, capacity, periods);
                add_discrete_constraints(problem, vars, owner, capacity, periods, big_m);
            }
        }
    }
}

/// Installed capacity in each period is that of the previous period plus new investment minus
/// retirements.
///
/// The chain starts from the existing capacity in the first period. Retirements are tied to the
/// investments (or existing capacity) whose lifetime ends at the start of the period.
fn add_carry_over_constraints(
    problem: &mut Problem,
    vars: &CapacityVariables,
    owner: usize,
    capacity: &CapacityParameters,
    periods: &PeriodInfo,
) {
    for period in 0..periods.len() {
        let installed = vars.installed(owner, period);
        let investment = vars.investment(owner, period);
        let retirement = vars.retirement(owner, period);

        if period == 0 {
            let existing = capacity.existing_in_period(periods, 0).0;
            problem.add_row(
                existing..=existing,
                [(installed, 1.0), (investment, -1.0)],
            );
        } else {
            let mut terms = vec![
                (installed, 1.0),
                (vars.installed(owner, period - 1), -1.0),
                (investment, -1.0),
            ];
            terms.extend(retirement.map(|var| (var, 1.0)));
            problem.add_row(0.0..=0.0, terms);
        }

        if let Some(retirement) = retirement {
            let existing = if capacity.existing_retirement_period(periods) == Some(period) {
                capacity.existing_capacity.0
            } else {
                0.0
            };
            let mut terms = vec![(retirement, 1.0)];
            terms.extend(
                (0..period)
                    .filter(|&built| capacity.retirement_period(periods, built) == Some(period))
                    .map(|built| (vars.investment(owner, built), -1.0)),
            );
            problem.add_row(existing..=existing, terms);
        }
    }
}

/// New capacity is either zero or between the minimum capacity and the largest possible addition.
///
/// For single-period owners, the investment variable includes existing capacity, which is moved
/// to the right-hand side.
fn add_discrete_constraints(
    problem: &mut Problem,
    vars: &CapacityVariables,
    owner: usize,
    capacity: &CapacityParameters,
    periods: &PeriodInfo,
    big_m: Capacity,
) {
    let single_period = vars.layout(owner) == CapacityLayout::SinglePeriod;
    for period in 0..periods.len() {
        let Some(existence) = vars.existence(owner, period) else {
            continue;
        };
        let investment = vars.investment(owner, period);
        let existing = if single_period {
            capacity.existing_in_period(periods, period).0
        } else {
            0.0
        };
        let max_addition = capacity.max_addition.get(period);
        let upper = if max_addition.0.is_finite() {
            max_addition
        } else {
            capacity_big_m(capacity, big_m)
        };

        problem.add_row(..=existing, [(investment, 1.0), (existence, -upper.0)]);
        problem.add_row(
            existing..,
            [(investment, 1.0), (existence, -capacity.min_capacity.0)],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::capacity_parameters;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn periods() -> PeriodInfo {
        PeriodInfo::new(&[2020, 2030, 2040], 10).unwrap()
    }

    #[rstest]
    fn test_carry_over(mut capacity_parameters: CapacityParameters) {
        let periods = periods();
        capacity_parameters.lifetime = 15;
        capacity_parameters.existing_capacity = Capacity(4.0);
        capacity_parameters.existing_lifetime = 10;

        let mut problem = Problem::default();
        let vars = CapacityVariables::add(&mut problem, [&capacity_parameters], &periods);
        add_owner_constraints(
            &mut problem,
            &vars,
            [&capacity_parameters],
            &periods,
            Capacity(1e6),
        );

        // Build 3 in 2020 and 2 in 2030; existing retires in 2030, the 2020 build in 2040
        let mut values = vec![0.0; problem.num_columns()];
        let mut set = |var: crate::optimisation::problem::Variable, value| values[var.index()] = value;
        set(vars.investment(0, 0), 3.0);
        set(vars.installed(0, 0), 7.0);
        set(vars.investment(0, 1), 2.0);
        set(vars.retirement(0, 1).unwrap(), 4.0);
        set(vars.installed(0, 1), 5.0);
        set(vars.retirement(0, 2).unwrap(), 3.0);
        set(vars.installed(0, 2), 2.0);
        assert!(problem.is_feasible(&values, 1e-9));

        // Keeping the 2020 build beyond its lifetime is not allowed
        values[vars.installed(0, 2).index()] = 5.0;
        assert!(!problem.is_feasible(&values, 1e-9));
    }

    #[rstest]
    fn test_single_period_discrete(mut capacity_parameters: CapacityParameters) {
        let periods = periods();
        capacity_parameters.discrete = true;
        capacity_parameters.min_capacity = Capacity(10.0);
        capacity_parameters.max_capacity = Capacity(50.0);

        let mut problem = Problem::default();
        let vars = CapacityVariables::add(&mut problem, [&capacity_parameters], &periods);
        add_owner_constraints(
            &mut problem,
            &vars,
            [&capacity_parameters],
            &periods,
            Capacity(1e6),
        );

        // Two rows per period, no carry-over rows
        assert_eq!(problem.num_rows(), 6);
        let upper_row = &problem.rows()[0];
        assert_approx_eq!(f64, upper_row.terms[1].1, -50.0);

        let mut values = vec![0.0; problem.num_columns()];
        values[vars.installed(0, 0).index()] = 5.0;
        values[vars.existence(0, 0).unwrap().index()] = 1.0;
        assert!(!problem.is_feasible(&values, 1e-9));
        values[vars.installed(0, 0).index()] = 10.0;
        assert!(problem.is_feasible(&values, 1e-9));
    }
}
