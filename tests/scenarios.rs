//! Small end-to-end planning problems solved with HiGHS
use float_cmp::assert_approx_eq;
use hubplan::aggregation::TimeStructure;
use hubplan::optimisation::objective::CostCategory;
use hubplan::optimisation::solver::SolveStatus;
use hubplan::optimisation::variables::CapacityLayout;
use hubplan::optimisation::{CancelToken, Formulation, HighsSolver, Solution};
use hubplan::parameters::ModelParameters;
use hubplan::registry::{EntityRegistry, SystemDescription};
use hubplan::time_series::RawTimeSeries;
use indexmap::IndexMap;
use rstest::rstest;

/// A single node with a generator which can meet all demand from existing capacity
const GENERATOR_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[technologies]]
id = "generator"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0
variable_operating_cost = 1.0

[[nodes]]
id = "hub"
technologies = [{ technology = "generator", existing_capacity = 1000.0, existing_lifetime = 30 }]
carriers.electricity.demand = "demand"
"#;

/// Solar output is only available in the first step and demand only occurs in the second
const STORAGE_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[technologies]]
id = "solar"
type = "renewable"
outputs = { electricity = 1.0 }
lifetime = 25
capital_cost = 1000.0

[[technologies]]
id = "battery"
type = "storage"
carrier = "electricity"
charge_efficiency = 0.9
discharge_efficiency = 1.0
lifetime = 15
capital_cost = 0.0

[[nodes]]
id = "hub"
technologies = [
    { technology = "solar", existing_capacity = 100.0, existing_lifetime = 25, max_capacity = 100.0, capacity_factor = "sun" },
    { technology = "battery", existing_capacity = 1000.0, existing_lifetime = 15, max_capacity = 1000.0 },
]
carriers.electricity.demand = "demand"
"#;

/// Demand which can never be met
const UNDERSIZED_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[technologies]]
id = "generator"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0

[[nodes]]
id = "hub"
technologies = [{ technology = "generator", max_capacity = 5.0 }]
carriers.electricity.demand = "demand"
"#;

/// Existing capacity which retires part-way through the horizon
const RETIRING_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[technologies]]
id = "generator"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 10
capital_cost = 500.0
fixed_operating_cost = 5.0
variable_operating_cost = 1.0

[[nodes]]
id = "hub"
technologies = [{ technology = "generator", existing_capacity = 50.0, existing_lifetime = 15 }]
carriers.electricity.demand = "demand"
"#;

/// A cheap generator which can only ramp by 10 per hour, backed by an expensive peaker
const RAMPING_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[technologies]]
id = "base"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0
variable_operating_cost = 1.0
ramp_rate = 0.1

[[technologies]]
id = "peaker"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0
variable_operating_cost = 50.0

[[nodes]]
id = "hub"
technologies = [
    { technology = "base", existing_capacity = 100.0, existing_lifetime = 30, max_capacity = 100.0 },
    { technology = "peaker", existing_capacity = 100.0, existing_lifetime = 30, max_capacity = 100.0 },
]
carriers.electricity.demand = "demand"
"#;

/// A gas turbine which cannot run below 40% load, backed by an expensive generator
const PART_LOAD_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[carriers]]
id = "gas"

[[technologies]]
id = "turbine"
type = "conversion"
inputs = { gas = 1.0 }
outputs = { electricity = 1.0 }
segments = [{ from = 0.4, to = 1.0, slope = 0.5 }]
lifetime = 30
capital_cost = 500.0

[[technologies]]
id = "backup"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0
variable_operating_cost = 100.0

[[nodes]]
id = "hub"
technologies = [
    { technology = "turbine", existing_capacity = 100.0, existing_lifetime = 30, max_capacity = 100.0 },
    { technology = "backup", existing_capacity = 100.0, existing_lifetime = 30, max_capacity = 100.0 },
]
carriers.gas.import = { price = 10.0 }
carriers.electricity.demand = "demand"
"#;

/// Generation in the north supplies demand in the south over a line which loses 10%
const LOSSY_LINE_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[technologies]]
id = "generator"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0
variable_operating_cost = 1.0

[[nodes]]
id = "north"
technologies = [{ technology = "generator", existing_capacity = 100.0, existing_lifetime = 30 }]

[[nodes]]
id = "south"
carriers.electricity.demand = "demand"

[[arcs]]
id = "line"
from = "north"
to = "south"
carrier = "electricity"
loss_factor = 0.1
existing_capacity = 100.0
existing_lifetime = 40
lifetime = 40
"#;

/// Coal is cheap but emits; clean generation is limited to half of the demand
const EMITTING_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[technologies]]
id = "coal"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0
variable_operating_cost = 1.0
emission_factor = 1.0

[[technologies]]
id = "clean"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0
variable_operating_cost = 5.0

[[nodes]]
id = "hub"
technologies = [
    { technology = "coal", existing_capacity = 100.0, existing_lifetime = 30 },
    { technology = "clean", existing_capacity = 5.0, existing_lifetime = 30, max_capacity = 5.0 },
]
carriers.electricity.demand = "demand"
"#;

/// A gas plant whose emissions can be captured at the cost of some of its own output
const CAPTURE_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[carriers]]
id = "gas"

[[technologies]]
id = "CCGT"
type = "conversion"
inputs = { gas = 1.0 }
outputs = { electricity = 0.5 }
emission_factor = 0.2
capture = { rate = 0.9, inputs = { electricity = 0.5 }, cost = 10.0 }
lifetime = 30
capital_cost = 500.0

[[nodes]]
id = "hub"
technologies = [
    { technology = "CCGT", existing_capacity = 100.0, existing_lifetime = 30, max_capacity = 100.0 },
]
carriers.gas.import = { price = 10.0 }
carriers.electricity.demand = "demand"
"#;

/// Solar made of 10-unit modules which can only be curtailed a whole module at a time
const MODULAR_SOLAR_SYSTEM: &str = r#"
[[carriers]]
id = "electricity"

[[technologies]]
id = "solar"
type = "renewable"
outputs = { electricity = 1.0 }
curtailable = true
module_size = 10.0
lifetime = 25
capital_cost = 1000.0

[[technologies]]
id = "backup"
type = "conversion"
outputs = { electricity = 1.0 }
lifetime = 30
capital_cost = 500.0
variable_operating_cost = 50.0

[[nodes]]
id = "hub"
technologies = [
    { technology = "solar", existing_capacity = 30.0, existing_lifetime = 25, max_capacity = 30.0, capacity_factor = "sun" },
    { technology = "backup", existing_capacity = 100.0, existing_lifetime = 30, max_capacity = 100.0 },
]
carriers.electricity.demand = "demand"
"#;

/// Everything needed to formulate a problem
struct Case {
    parameters: ModelParameters,
    registry: EntityRegistry,
    time: TimeStructure,
}

impl Case {
    fn new(system: &str, parameters: &str, series: IndexMap<&str, Vec<f64>>) -> Self {
        let parameters: ModelParameters = toml::from_str(parameters).unwrap();
        let system: SystemDescription = toml::from_str(system).unwrap();
        let series = RawTimeSeries::new(
            parameters.aggregation.step_hours.0,
            series
                .into_iter()
                .map(|(id, values)| (id.into(), values))
                .collect(),
        )
        .unwrap();
        let registry = EntityRegistry::build(
            &system,
            parameters.period_info().unwrap(),
            &series,
            parameters.interpolation,
        )
        .unwrap();
        let time = TimeStructure::aggregate(
            &series,
            &parameters.aggregation,
            parameters.hours_per_year,
        )
        .unwrap();

        Self {
            parameters,
            registry,
            time,
        }
    }

    fn formulate(&self) -> Formulation<'_> {
        Formulation::build(&self.registry, &self.time, &self.parameters).unwrap()
    }
}

/// One year-long period represented by a single day
const ONE_PERIOD: &str = r#"
periods = [2020]
final_period_length = 1
discount_rate = 0.0

[aggregation]
method = "full"
block_length = 24
"#;

fn constant_demand() -> IndexMap<&'static str, Vec<f64>> {
    IndexMap::from([("demand", vec![10.0; 24])])
}

/// Low demand for the first half of the day and high demand for the second
fn step_demand(low: f64, high: f64) -> IndexMap<&'static str, Vec<f64>> {
    let demand = (0..24).map(|hour| if hour < 12 { low } else { high }).collect();
    IndexMap::from([("demand", demand)])
}

/// Solve a case which must have an optimal solution
fn solve_optimal<'a>(formulation: &'a Formulation<'a>) -> (f64, Solution<'a>) {
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    (outcome.objective.unwrap(), outcome.solution.unwrap())
}

/// The activity of a technology in each step of a single-period, single-block case
fn activity_of(solution: &Solution, technology: &str) -> Vec<f64> {
    solution
        .iter_activity()
        .filter(|(_, id, _, _)| &*id.0 == technology)
        .map(|(_, _, _, activity)| activity.0)
        .collect()
}

#[test]
fn test_constant_demand_operating_cost() {
    let case = Case::new(GENERATOR_SYSTEM, ONE_PERIOD, constant_demand());
    assert_eq!(case.time.num_blocks(), 1);
    assert_approx_eq!(f64, case.time.total_weight().0, 8760.0);

    let formulation = case.formulate();
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    // 10 units per hour for a year at a cost of 1 per unit
    assert_approx_eq!(f64, outcome.objective.unwrap(), 87_600.0, epsilon = 1e-3);
    let solution = outcome.solution.unwrap();
    let totals = solution.cost_totals();
    assert_approx_eq!(
        f64,
        totals[&CostCategory::VariableOperation].0,
        87_600.0,
        epsilon = 1e-3
    );
    assert_approx_eq!(f64, totals[&CostCategory::Investment].0, 0.0, epsilon = 1e-3);
    assert!(
        solution
            .iter_activity()
            .all(|(_, _, _, activity)| (activity.0 - 10.0).abs() < 1e-6)
    );
}

#[test]
fn test_storage_losses() {
    let series = IndexMap::from([("sun", vec![1.0, 0.0]), ("demand", vec![0.0, 90.0])]);
    let parameters = r#"
        periods = [2020]
        final_period_length = 1

        [aggregation]
        block_length = 2
        "#;
    let case = Case::new(STORAGE_SYSTEM, parameters, series);
    let formulation = case.formulate();
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    let solution = outcome.solution.unwrap();

    let storage: Vec<_> = solution.iter_storage().collect();
    assert_eq!(storage.len(), 2);
    let (_, _, first, charging) = storage[0];
    let (_, _, second, discharging) = storage[1];
    assert_eq!((first.step, second.step), (0, 1));

    // All of the solar output is stored, but only 90% of it comes back out
    assert_approx_eq!(f64, charging.charge.0, 100.0, epsilon = 1e-6);
    assert_approx_eq!(f64, charging.discharge.0, 0.0, epsilon = 1e-6);
    assert_approx_eq!(f64, discharging.charge.0, 0.0, epsilon = 1e-6);
    assert_approx_eq!(f64, discharging.discharge.0, 90.0, epsilon = 1e-6);
    assert_approx_eq!(
        f64,
        charging.level.0 - discharging.level.0,
        90.0,
        epsilon = 1e-6
    );
}

#[test]
fn test_unmet_demand_is_infeasible() {
    let case = Case::new(UNDERSIZED_SYSTEM, ONE_PERIOD, constant_demand());
    let formulation = case.formulate();
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert!(matches!(
        outcome.status,
        SolveStatus::Infeasible | SolveStatus::InfeasibleOrUnbounded
    ));
    assert!(outcome.solution.is_none());
    assert!(outcome.objective.is_none());
}

#[test]
fn test_unmet_demand_allowed() {
    let parameters =
        format!("{ONE_PERIOD}\n[balance]\nallow_unmet_demand = true\nvalue_of_lost_load = 1000.0\n");
    let case = Case::new(UNDERSIZED_SYSTEM, &parameters, constant_demand());
    let formulation = case.formulate();
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    // At most 5 of the 10 units can be supplied
    let solution = outcome.solution.unwrap();
    assert!(
        solution
            .iter_exchanges()
            .all(|(_, _, _, values)| (values.unmet_demand.0 - 5.0).abs() < 1e-6)
    );
}

#[test]
fn test_formulation_is_deterministic() {
    let case = Case::new(GENERATOR_SYSTEM, ONE_PERIOD, constant_demand());
    let first = case.formulate();
    let second = case.formulate();
    assert_eq!(first.problem().num_rows(), second.problem().num_rows());
    assert_eq!(first.problem().num_columns(), second.problem().num_columns());
    assert_eq!(first.problem(), second.problem());

    let cancel = CancelToken::new();
    let first = first.solve(&HighsSolver, &cancel).unwrap();
    let second = second.solve(&HighsSolver, &cancel).unwrap();
    assert_eq!(first.objective, second.objective);
}

#[test]
fn test_operational_variable_count() {
    let parameters = r#"
        periods = [2020, 2030]

        [aggregation]
        block_length = 12
        "#;
    let series = IndexMap::from([
        ("sun", (0..24_u32).map(|hour| f64::from(hour % 12) / 12.0).collect()),
        ("demand", vec![20.0; 24]),
    ]);
    let case = Case::new(STORAGE_SYSTEM, parameters, series);
    assert_eq!(case.time.num_slots(), 24);

    let formulation = case.formulate();
    let variables = formulation.variables();
    let expected = case.registry.assets.len() * case.time.num_slots() * case.registry.periods.len();
    assert_eq!(variables.activity.len(), expected);
    assert_eq!(
        variables.level.len(),
        case.time.num_slots() * case.registry.periods.len()
    );
}

#[test]
fn test_solution_satisfies_constraints() {
    let parameters = r#"
        periods = [2020, 2030, 2040]
        discount_rate = 0.05
        "#;
    let case = Case::new(RETIRING_SYSTEM, parameters, constant_demand());
    let formulation = case.formulate();
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    let solution = outcome.solution.unwrap();
    assert!(formulation.problem().is_feasible(solution.values(), 1e-5));

    // Costs by category add up to the objective
    let total: f64 = solution.cost_totals().values().map(|cost| cost.0).sum();
    assert_approx_eq!(f64, total, outcome.objective.unwrap(), epsilon = 1e-6);
}

#[test]
fn test_capacity_accounting() {
    let parameters = r#"
        periods = [2020, 2030, 2040]
        "#;
    let case = Case::new(RETIRING_SYSTEM, parameters, constant_demand());
    let formulation = case.formulate();
    assert_eq!(
        formulation.variables().asset_capacity.layout(0),
        CapacityLayout::Chain
    );
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    let solution = outcome.solution.unwrap();

    let capacities: Vec<_> = solution
        .iter_asset_capacities()
        .map(|(_, _, year, values)| (year, values))
        .collect();
    assert_eq!(capacities.len(), 3);

    let (_, first) = capacities[0];
    assert_approx_eq!(f64, first.installed.0, 50.0 + first.new.0, epsilon = 1e-6);
    for window in capacities.windows(2) {
        let (_, previous) = window[0];
        let (_, current) = window[1];
        assert_approx_eq!(
            f64,
            current.installed.0,
            previous.installed.0 + current.new.0 - current.retired.0,
            epsilon = 1e-6
        );
    }

    // The existing capacity retires at the start of the first period after 2035
    let (year, last) = capacities[2];
    assert_eq!(year, 2040);
    assert!(last.retired.0 >= 50.0 - 1e-6);
    assert!(last.installed.0 >= 10.0 - 1e-6);
}

#[test]
fn test_aggregation_preserves_totals() {
    let parameters = r#"
        periods = [2020]

        [aggregation]
        method = "k_means"
        num_blocks = 3
        block_length = 24
        "#;
    let demand: Vec<f64> = (0..24 * 8_u32)
        .map(|hour| {
            let day = hour / 24;
            let phase = f64::from(hour % 24) / 24.0 * std::f64::consts::TAU;
            10.0 + f64::from(day % 3) - 3.0 * phase.cos()
        })
        .collect();
    let case = Case::new(
        GENERATOR_SYSTEM,
        parameters,
        IndexMap::from([("demand", demand.clone())]),
    );
    let time = &case.time;
    assert_eq!(time.num_blocks(), 3);
    assert_eq!(time.assignment().len(), 8);
    assert!(time.assignment().iter().all(|&block| block < time.num_blocks()));
    assert_approx_eq!(f64, time.total_weight().0, 8760.0, epsilon = 1e-6);

    // Every raw day is represented by exactly one block
    let mut members: Vec<usize> = time
        .blocks()
        .iter()
        .flat_map(|block| block.members.iter().copied())
        .collect();
    members.sort_unstable();
    assert_eq!(members, (0..8).collect::<Vec<_>>());

    // The weighted representative values reproduce the annual total of the raw series
    let raw_total = demand.iter().sum::<f64>() * 8760.0 / 192.0;
    let aggregated_total: f64 = time
        .iter_slots()
        .map(|(slot, _, _)| time.value(0, slot) * time.slot_hours(slot).0)
        .sum();
    assert_approx_eq!(f64, aggregated_total, raw_total, epsilon = 1e-6 * raw_total);
    assert!(time.fidelity()[0].relative_error() <= 1e-6);
}

#[test]
fn test_ramp_limit_binds() {
    let case = Case::new(RAMPING_SYSTEM, ONE_PERIOD, step_demand(10.0, 50.0));
    let formulation = case.formulate();
    let (_, solution) = solve_optimal(&formulation);

    // The base generator climbs by 10 per hour and the peaker fills the gap
    let base = activity_of(&solution, "base");
    let peaker = activity_of(&solution, "peaker");
    assert_eq!(base.len(), 24);
    let expected_base = [10.0, 20.0, 30.0, 40.0, 50.0];
    for (hour, expected) in (11..16).zip(expected_base) {
        assert_approx_eq!(f64, base[hour], expected, epsilon = 1e-6);
    }
    let expected_peaker = [0.0, 30.0, 20.0, 10.0, 0.0];
    for (hour, expected) in (11..16).zip(expected_peaker) {
        assert_approx_eq!(f64, peaker[hour], expected, epsilon = 1e-6);
    }
    for pair in base.windows(2) {
        assert!((pair[1] - pair[0]).abs() <= 10.0 + 1e-6);
    }
}

#[test]
fn test_min_part_load() {
    let case = Case::new(PART_LOAD_SYSTEM, ONE_PERIOD, step_demand(10.0, 40.0));
    let formulation = case.formulate();
    assert!(formulation.problem().is_mip());
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    let gap = outcome.gap.unwrap();
    assert!(gap <= case.parameters.solver.mip_gap);
    let solution = outcome.solution.unwrap();

    // Producing 10 would need the turbine below its minimum load, so it is switched off
    let turbine = activity_of(&solution, "turbine");
    let backup = activity_of(&solution, "backup");
    assert_eq!(turbine.len(), 24);
    for (hour, (&turbine, &backup)) in turbine.iter().zip(&backup).enumerate() {
        // Producing 40 at half efficiency takes 80 units of gas, within the 40-100 operating range
        let (expected_turbine, expected_backup) = if hour < 12 { (0.0, 10.0) } else { (80.0, 0.0) };
        assert_approx_eq!(f64, turbine, expected_turbine, epsilon = 1e-6);
        assert_approx_eq!(f64, backup, expected_backup, epsilon = 1e-6);
    }
    assert!(
        solution
            .iter_carrier_flows()
            .filter(|(_, technology, carrier, key, _)| {
                &*technology.0 == "turbine" && &*carrier.0 == "electricity" && key.step >= 12
            })
            .all(|(_, _, _, _, flow)| (flow.0 - 40.0).abs() < 1e-6)
    );
}

#[test]
fn test_line_losses() {
    let series = IndexMap::from([("demand", vec![9.0; 24])]);
    let case = Case::new(LOSSY_LINE_SYSTEM, ONE_PERIOD, series);
    let formulation = case.formulate();
    let (objective, solution) = solve_optimal(&formulation);

    // 10 must be sent for 9 to arrive
    let flows: Vec<_> = solution.iter_arc_flows().collect();
    assert_eq!(flows.len(), 24);
    for (_, _, forward, reverse) in flows {
        assert_approx_eq!(f64, forward.0, 10.0, epsilon = 1e-6);
        assert_approx_eq!(f64, reverse.0, 0.0);
    }
    assert!(
        activity_of(&solution, "generator")
            .iter()
            .all(|activity| (activity - 10.0).abs() < 1e-6)
    );
    assert_approx_eq!(f64, objective, 87_600.0, epsilon = 1e-3);
}

#[test]
fn test_emission_cap_without_slack_is_infeasible() {
    let parameters = format!("{ONE_PERIOD}\n[emissions]\ncap = 20000.0\n");
    let case = Case::new(EMITTING_SYSTEM, &parameters, constant_demand());
    let formulation = case.formulate();
    assert!(formulation.variables().emission_slack.is_empty());
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert!(matches!(
        outcome.status,
        SolveStatus::Infeasible | SolveStatus::InfeasibleOrUnbounded
    ));
}

#[test]
fn test_emission_cap_violation_is_penalised() {
    let parameters =
        format!("{ONE_PERIOD}\n[emissions]\ncap = 20000.0\nviolation_penalty = 100.0\n");
    let case = Case::new(EMITTING_SYSTEM, &parameters, constant_demand());
    let formulation = case.formulate();
    let (objective, solution) = solve_optimal(&formulation);

    // Clean generation runs flat out, so coal supplies 5 per hour all year
    let (_, emissions) = solution.iter_emissions().next().unwrap();
    assert_approx_eq!(f64, emissions.0, 43_800.0, epsilon = 1e-3);
    assert_approx_eq!(
        f64,
        solution.emission_violation().0,
        23_800.0,
        epsilon = 1e-3
    );
    let totals = solution.cost_totals();
    assert_approx_eq!(
        f64,
        totals[&CostCategory::EmissionPenalty].0,
        2_380_000.0,
        epsilon = 1e-2
    );
    let operation = 5.0 * 8760.0 * 1.0 + 5.0 * 8760.0 * 5.0;
    assert_approx_eq!(f64, objective, 2_380_000.0 + operation, epsilon = 1e-2);
}

#[rstest]
#[case(0.0, 50.0)]
#[case(10.0, 0.0)]
fn test_discrete_commissioning(#[case] old_capacity: f64, #[case] expected: f64) {
    let system = format!(
        r#"
        [[carriers]]
        id = "electricity"

        [[technologies]]
        id = "old"
        type = "conversion"
        outputs = {{ electricity = 1.0 }}
        lifetime = 30
        capital_cost = 500.0
        variable_operating_cost = 1.0

        [[technologies]]
        id = "unit"
        type = "conversion"
        outputs = {{ electricity = 1.0 }}
        lifetime = 10
        capital_cost = 100.0
        variable_operating_cost = 1.0
        discrete = true
        min_capacity = 50.0

        [[nodes]]
        id = "hub"
        technologies = [
            {{ technology = "old", existing_capacity = {old_capacity:.1}, existing_lifetime = 30, max_capacity = {old_capacity:.1} }},
            {{ technology = "unit" }},
        ]
        carriers.electricity.demand = "demand"
        "#
    );
    let case = Case::new(&system, ONE_PERIOD, constant_demand());
    let formulation = case.formulate();
    assert!(formulation.problem().is_mip());
    let outcome = formulation
        .solve(&HighsSolver, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert!(outcome.gap.is_some_and(|gap| gap <= case.parameters.solver.mip_gap));

    // The unit is either not built or built at its minimum size, never at the 10 needed
    let solution = outcome.solution.unwrap();
    let (_, _, _, unit) = solution
        .iter_asset_capacities()
        .find(|(_, technology, _, _)| &*technology.0 == "unit")
        .unwrap();
    assert_approx_eq!(f64, unit.installed.0, expected, epsilon = 1e-6);
}

#[test]
fn test_carbon_capture() {
    let parameters = format!("{ONE_PERIOD}\n[emissions]\nprice = 100.0\n");
    let case = Case::new(CAPTURE_SYSTEM, &parameters, constant_demand());
    let formulation = case.formulate();
    let (_, solution) = solve_optimal(&formulation);

    // With a high carbon price all that can be captured is, and the capture unit's own
    // electricity use raises gas burn: 0.5a - 0.5 * 0.18a = 10
    let activity = 10.0 / 0.41;
    let captured = 0.18 * activity;
    assert!(
        activity_of(&solution, "CCGT")
            .iter()
            .all(|&value| (value - activity).abs() < 1e-6)
    );
    assert!(
        solution
            .iter_capture()
            .all(|(_, _, _, value)| (value.0 - captured).abs() < 1e-6)
    );

    let (_, emissions) = solution.iter_emissions().next().unwrap();
    assert_approx_eq!(f64, emissions.0, 0.02 * activity * 8760.0, epsilon = 1e-3);
    let captured_total = solution.captured_emissions()[&2020];
    assert_approx_eq!(f64, captured_total.0, captured * 8760.0, epsilon = 1e-3);
    assert_approx_eq!(
        f64,
        solution.cost_totals()[&CostCategory::CarbonCapture].0,
        10.0 * captured * 8760.0,
        epsilon = 1e-2
    );
}

#[test]
fn test_modular_curtailment() {
    let series = IndexMap::from([("sun", vec![1.0; 24]), ("demand", vec![25.0; 24])]);
    let case = Case::new(MODULAR_SOLAR_SYSTEM, ONE_PERIOD, series);
    let formulation = case.formulate();
    assert!(formulation.problem().is_mip());
    assert_eq!(formulation.variables().modules_online.len(), 24);
    let (_, solution) = solve_optimal(&formulation);

    // Only two of the three modules fit under a demand of 25
    assert!(
        activity_of(&solution, "solar")
            .iter()
            .all(|activity| (activity - 20.0).abs() < 1e-6)
    );
    assert!(
        activity_of(&solution, "backup")
            .iter()
            .all(|activity| (activity - 5.0).abs() < 1e-6)
    );
}
