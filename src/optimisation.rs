//! The optimisation problem: formulation and solution.
//!
//! A [`Formulation`] is assembled from an [`EntityRegistry`], a [`TimeStructure`] and the model
//! parameters in a fixed order: variables, then constraints, then the objective. Assembly is
//! all-or-nothing; if anything is wrong, an error is returned and nothing reaches the solver.
//!
//! [`Formulation::solve`] is the only place where a solver is invoked.
use crate::aggregation::TimeStructure;
use crate::error::{ModelError, ModelResult};
use crate::parameter::PeriodTable;
use crate::parameters::{EmissionCapKind, ModelParameters};
use crate::registry::EntityRegistry;
use crate::units::{Dimensionless, Emissions, MoneyPerEmissions};
use log::{debug, info, warn};

pub mod constraints;
pub mod objective;
pub mod problem;
pub mod solution;
pub mod solver;
pub mod variables;

use constraints::ConstraintKeys;
use objective::CostLedger;
use problem::Problem;
pub use solution::{Solution, SolveOutcome};
pub use solver::{
    CancelToken, HighsSolver, RawSolution, SolveLimit, SolveStatus, Solver, SolverAlgorithm,
    SolverOptions,
};
use variables::VariableSet;

/// Tolerance used when checking an incumbent returned by a solver which stopped early
const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Everything the formulation is built from, plus values derived from it once
#[derive(Debug)]
pub struct FormulationContext<'a> {
    /// The entities of the system
    pub registry: &'a EntityRegistry,
    /// The representative time blocks
    pub time: &'a TimeStructure,
    /// Run configuration
    pub parameters: &'a ModelParameters,
    annual_discount: Vec<Dimensionless>,
    emission_cap: Option<PeriodTable<Emissions>>,
    emission_price: PeriodTable<MoneyPerEmissions>,
}

impl<'a> FormulationContext<'a> {
    /// Check that the inputs fit together and derive per-period values
    pub fn new(
        registry: &'a EntityRegistry,
        time: &'a TimeStructure,
        parameters: &'a ModelParameters,
    ) -> ModelResult<Self> {
        let periods = &registry.periods;
        let num_series = time.series_ids().len();
        let series_in_range = registry
            .assets
            .iter()
            .filter_map(|asset| asset.capacity_factor)
            .chain(registry.node_carriers.iter().filter_map(|nc| nc.demand))
            .all(|series| series < num_series);
        if !series_in_range {
            return Err(ModelError::formulation(
                "The entity registry refers to a time series which is not in the time structure",
            ));
        }

        let annual_discount = (0..periods.len())
            .map(|period| periods.annual_discount_sum(period, parameters.discount_rate))
            .collect();
        let settings = &parameters.emissions;
        let emission_cap = settings
            .cap
            .as_ref()
            .map(|cap| {
                PeriodTable::normalise(
                    Some(cap),
                    None,
                    periods,
                    parameters.interpolation,
                    "emissions",
                    "cap",
                )
            })
            .transpose()?;
        let emission_price = PeriodTable::normalise(
            settings.price.as_ref(),
            Some(MoneyPerEmissions(0.0)),
            periods,
            parameters.interpolation,
            "emissions",
            "price",
        )?;

        Ok(Self {
            registry,
            time,
            parameters,
            annual_discount,
            emission_cap,
            emission_price,
        })
    }

    /// The number of investment periods
    pub fn num_periods(&self) -> usize {
        self.registry.periods.len()
    }

    /// The number of (block, sub-step) slots
    pub fn num_slots(&self) -> usize {
        self.time.num_slots()
    }

    /// Present value of one unit of money paid in every year of a period
    pub fn annual_discount(&self, period: usize) -> Dimensionless {
        self.annual_discount[period]
    }

    /// The emission cap for a period, if there is one.
    ///
    /// For a cumulative cap, this is the cap on the whole horizon.
    pub fn emission_cap(&self, period: usize) -> Option<Emissions> {
        self.emission_cap.as_ref().map(|cap| cap.get(period))
    }

    /// The carbon price in a period
    pub fn emission_price(&self, period: usize) -> MoneyPerEmissions {
        self.emission_price.get(period)
    }

    /// How many emission slack variables are needed
    pub fn emission_slack_count(&self) -> usize {
        let settings = &self.parameters.emissions;
        if settings.cap.is_none() || settings.violation_penalty.is_none() {
            return 0;
        }

        match settings.cap_kind {
            EmissionCapKind::PerPeriod => self.num_periods(),
            EmissionCapKind::Cumulative => 1,
        }
    }
}

/// A fully assembled optimisation problem with the bookkeeping needed to interpret its solution
#[derive(Debug)]
pub struct Formulation<'a> {
    context: FormulationContext<'a>,
    problem: Problem,
    variables: VariableSet,
    constraint_keys: ConstraintKeys,
    costs: CostLedger,
}

impl<'a> Formulation<'a> {
    /// Assemble the problem.
    ///
    /// # Arguments
    ///
    /// * `registry` - The entities of the system
    /// * `time` - The representative time blocks
    /// * `parameters` - Run configuration
    ///
    /// # Returns
    ///
    /// The assembled formulation, or an error if the inputs are inconsistent. No partial
    /// formulation is ever returned.
    pub fn build(
        registry: &'a EntityRegistry,
        time: &'a TimeStructure,
        parameters: &'a ModelParameters,
    ) -> ModelResult<Self> {
        let context = FormulationContext::new(registry, time, parameters)?;

        let mut problem = Problem::default();
        let variables = VariableSet::add(&mut problem, &context);
        let constraint_keys = constraints::add_constraints(&mut problem, &variables, &context);
        let costs = objective::add_objective(&mut problem, &variables, &context);
        problem.validate()?;

        info!(
            "Formulation has {} variables ({} operational, {} integer) and {} constraints",
            problem.num_columns(),
            variables.num_operational(),
            problem.num_integer_columns(),
            problem.num_rows()
        );

        Ok(Self {
            context,
            problem,
            variables,
            constraint_keys,
            costs,
        })
    }

    /// The problem handed to the solver
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// The decision variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    /// The inputs the problem was built from
    pub fn context(&self) -> &FormulationContext<'a> {
        &self.context
    }

    /// Solve the problem.
    ///
    /// Infeasibility, unboundedness, timeouts and cancellation are reported through the status of
    /// the returned [`SolveOutcome`]; only a failure of the solver itself is an error.
    ///
    /// # Arguments
    ///
    /// * `solver` - The solver backend
    /// * `cancel` - Token for stopping the run early
    pub fn solve(&self, solver: &dyn Solver, cancel: &CancelToken) -> ModelResult<SolveOutcome<'_>> {
        if cancel.is_cancelled() {
            info!("Run cancelled before the problem was submitted");
            return Ok(SolveOutcome::without_solution(SolveStatus::Cancelled));
        }

        let options = &self.context.parameters.solver;
        let time_limit = cancel.time_limit(options.time_limit);
        info!(
            "Solving with {} (time limit {time_limit:.0}s, {})",
            solver.name(),
            if self.problem.is_mip() { "MIP" } else { "LP" }
        );
        let raw = solver.solve(&self.problem, options, time_limit)?;

        let mut status = raw.status;
        if status == SolveStatus::Feasible
            && !self
                .problem
                .is_feasible(&raw.columns, FEASIBILITY_TOLERANCE)
        {
            debug!("Solver stopped without a feasible incumbent");
            status = raw
                .limit
                .unwrap_or(SolveLimit::Time)
                .status_without_incumbent();
        }
        if !status.has_solution() {
            if cancel.is_cancelled() {
                status = SolveStatus::Cancelled;
            }
            warn!("No solution: {status}");
            return Ok(SolveOutcome::without_solution(status));
        }
        if raw.columns.len() != self.problem.num_columns() {
            return Err(ModelError::Solver(format!(
                "{} returned {} values for {} variables",
                solver.name(),
                raw.columns.len(),
                self.problem.num_columns()
            )));
        }

        let objective = self.problem.evaluate_objective(&raw.columns);
        match (raw.limit, raw.gap) {
            (Some(limit), Some(gap)) => {
                warn!("Solver stopped at its {limit} limit with a gap of {gap:.3e}");
            }
            (Some(limit), None) => warn!("Solver stopped at its {limit} limit"),
            (None, _) => {}
        }
        info!("Solve finished: {status}, objective {objective:.6e}");

        Ok(SolveOutcome {
            status,
            objective: Some(objective),
            gap: raw.gap,
            solution: Some(Solution::new(self, raw.columns, raw.row_duals)),
        })
    }
}
