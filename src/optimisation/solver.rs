//! The boundary between the formulation and a numerical solver.
//!
//! The formulation is handed over as a [`Problem`] and comes back as a [`RawSolution`]. The only
//! backend shipped is [`HighsSolver`], but anything implementing [`Solver`] can be used.
use super::problem::{Domain, Problem};
use crate::error::{ModelError, ModelResult, ensure_config};
use highs::{HighsModelStatus, RowProblem, Sense};
use log::{debug, log_enabled};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use strum::Display;

/// The outcome of a solve.
///
/// These are expected results rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SolveStatus {
    /// A proven optimal solution was found
    Optimal,
    /// A feasible solution was found but could not be proven optimal in time
    Feasible,
    /// The problem has no feasible solution
    Infeasible,
    /// The objective can be decreased without limit
    Unbounded,
    /// The solver could not tell whether the problem is infeasible or unbounded
    InfeasibleOrUnbounded,
    /// The time limit was reached without a feasible solution
    TimedOut,
    /// The iteration limit was reached without a feasible solution
    IterationLimit,
    /// The run was cancelled before it finished
    Cancelled,
}

impl SolveStatus {
    /// Whether variable values are available
    pub fn has_solution(self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

/// A limit which stopped the solver before it could prove optimality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SolveLimit {
    /// Wall-clock time
    Time,
    /// Simplex, barrier or branch-and-bound iterations
    Iterations,
}

impl SolveLimit {
    /// The status to report when the solver stopped without a usable incumbent
    pub fn status_without_incumbent(self) -> SolveStatus {
        match self {
            Self::Time => SolveStatus::TimedOut,
            Self::Iterations => SolveStatus::IterationLimit,
        }
    }
}

/// Which algorithm the solver should use for LPs
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverAlgorithm {
    /// Let the solver decide
    #[default]
    #[string = "choose"]
    Choose,
    /// Dual or primal simplex
    #[string = "simplex"]
    Simplex,
    /// Interior point
    #[string = "ipm"]
    Ipm,
}

impl SolverAlgorithm {
    /// The name of the algorithm as understood by HiGHS
    fn highs_name(self) -> &'static str {
        match self {
            Self::Choose => "choose",
            Self::Simplex => "simplex",
            Self::Ipm => "ipm",
        }
    }
}

const fn default_time_limit() -> f64 {
    3600.0
}

const fn default_mip_gap() -> f64 {
    1e-4
}

/// Solver settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SolverOptions {
    /// Wall-clock limit for a solve in seconds
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,
    /// Relative optimality gap at which a MIP is considered solved
    #[serde(default = "default_mip_gap")]
    pub mip_gap: f64,
    /// The LP algorithm
    #[serde(default)]
    pub algorithm: SolverAlgorithm,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            time_limit: default_time_limit(),
            mip_gap: default_mip_gap(),
            algorithm: SolverAlgorithm::default(),
        }
    }
}

impl SolverOptions {
    /// Check the settings
    pub fn validate(&self) -> ModelResult<()> {
        ensure_config!(
            self.time_limit.is_finite() && self.time_limit > 0.0,
            "Solver `time_limit` must be a positive number of seconds"
        );
        ensure_config!(
            (0.0..1.0).contains(&self.mip_gap),
            "Solver `mip_gap` must be at least zero and less than one"
        );

        Ok(())
    }
}

/// A handle for stopping a run early.
///
/// Clones share the same flag, so a token can be handed to another thread and triggered from
/// there. A deadline additionally caps the time limit of any solve started with the token.
///
/// The flag is checked before the problem is submitted and again once the solver returns. A solve
/// already in progress is not interrupted by [`CancelToken::cancel`]; it runs until it finishes or
/// reaches its time limit. Use [`CancelToken::with_timeout`] to bound how long that can take.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Create a token which is only triggered by [`CancelToken::cancel`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token which also expires after the given duration
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Ask for the run to stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the run should stop
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The time limit for a solve started now, in seconds
    pub fn time_limit(&self, configured: f64) -> f64 {
        match self.deadline {
            Some(deadline) => configured.min(
                deadline
                    .saturating_duration_since(Instant::now())
                    .as_secs_f64(),
            ),
            None => configured,
        }
    }
}

/// What a solver returns
#[derive(Debug, Clone, PartialEq)]
pub struct RawSolution {
    /// The outcome
    pub status: SolveStatus,
    /// Column values, in column order (empty unless the status has a solution)
    pub columns: Vec<f64>,
    /// Row duals, in row order (only for LPs solved to optimality)
    pub row_duals: Option<Vec<f64>>,
    /// Relative optimality gap reported by the solver, if it knows one
    pub gap: Option<f64>,
    /// The limit which stopped the solver early, if any
    pub limit: Option<SolveLimit>,
}

impl RawSolution {
    /// A result with no values
    pub fn without_values(status: SolveStatus) -> Self {
        Self {
            status,
            columns: Vec::new(),
            row_duals: None,
            gap: None,
            limit: None,
        }
    }
}

/// A numerical backend which can solve a [`Problem`]
pub trait Solver {
    /// A name for log messages
    fn name(&self) -> &str;

    /// Minimise the problem.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `options` - Solver settings
    /// * `time_limit` - Wall-clock limit in seconds, which may be tighter than the configured one
    fn solve(
        &self,
        problem: &Problem,
        options: &SolverOptions,
        time_limit: f64,
    ) -> ModelResult<RawSolution>;
}

/// The HiGHS solver
#[derive(Debug, Clone, Copy, Default)]
pub struct HighsSolver;

impl HighsSolver {
    fn to_highs(problem: &Problem) -> RowProblem {
        let mut highs_problem = RowProblem::default();
        let cols: Vec<_> = problem
            .columns()
            .iter()
            .map(|col| match col.domain {
                Domain::Continuous => highs_problem.add_column(col.cost, col.lower..=col.upper),
                Domain::Integer | Domain::Binary => {
                    highs_problem.add_integer_column(col.cost, col.lower..=col.upper)
                }
            })
            .collect();
        for row in problem.rows() {
            highs_problem.add_row(
                row.lower..=row.upper,
                row.terms.iter().map(|(var, coeff)| (cols[var.index()], *coeff)),
            );
        }

        highs_problem
    }
}

/// Enable console output for the HiGHS solver if we are logging verbosely
fn enable_highs_logging(model: &mut highs::Model) {
    let enabled = log_enabled!(log::Level::Debug);
    model.set_option("log_to_console", enabled);
    model.set_option("output_flag", enabled);
}

impl Solver for HighsSolver {
    fn name(&self) -> &str {
        "HiGHS"
    }

    fn solve(
        &self,
        problem: &Problem,
        options: &SolverOptions,
        time_limit: f64,
    ) -> ModelResult<RawSolution> {
        let mut model = Self::to_highs(problem).optimise(Sense::Minimise);
        enable_highs_logging(&mut model);
        model.set_option("time_limit", time_limit);
        model.set_option("mip_rel_gap", options.mip_gap);
        model.set_option("solver", options.algorithm.highs_name());

        let solved = model
            .try_solve()
            .map_err(|status| ModelError::Solver(format!("HiGHS failed: {status:?}")))?;
        let highs_status = solved.status();
        debug!("HiGHS finished with status {highs_status:?}");

        // On hitting a limit there may be an incumbent, which the caller checks for feasibility
        let (status, limit) = match highs_status {
            HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty => (SolveStatus::Optimal, None),
            HighsModelStatus::Infeasible => (SolveStatus::Infeasible, None),
            HighsModelStatus::Unbounded => (SolveStatus::Unbounded, None),
            HighsModelStatus::UnboundedOrInfeasible => (SolveStatus::InfeasibleOrUnbounded, None),
            HighsModelStatus::ReachedTimeLimit => (SolveStatus::Feasible, Some(SolveLimit::Time)),
            HighsModelStatus::ReachedIterationLimit => {
                (SolveStatus::Feasible, Some(SolveLimit::Iterations))
            }
            status => {
                return Err(ModelError::Solver(format!(
                    "HiGHS returned an unexpected status: {status:?}"
                )));
            }
        };
        if !status.has_solution() {
            return Ok(RawSolution::without_values(status));
        }

        let solution = solved.get_solution();
        let (row_duals, gap) = if problem.is_mip() {
            (None, reported_gap(solved.mip_gap()))
        } else if status == SolveStatus::Optimal {
            (Some(solution.dual_rows().to_vec()), Some(0.0))
        } else {
            (None, None)
        };
        Ok(RawSolution {
            status,
            columns: solution.columns().to_vec(),
            row_duals,
            gap,
            limit,
        })
    }
}

/// HiGHS reports an infinite gap when it has no bound to compare against
fn reported_gap(gap: f64) -> Option<f64> {
    (gap.is_finite() && gap >= 0.0).then_some(gap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(3600.0, 1e-4, true)]
    #[case(0.0, 1e-4, false)]
    #[case(f64::INFINITY, 1e-4, false)]
    #[case(10.0, -0.1, false)]
    #[case(10.0, 1.0, false)]
    fn test_solver_options_validate(
        #[case] time_limit: f64,
        #[case] mip_gap: f64,
        #[case] valid: bool,
    ) {
        let options = SolverOptions {
            time_limit,
            mip_gap,
            ..SolverOptions::default()
        };
        assert_eq!(options.validate().is_ok(), valid);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
        assert_approx_eq!(f64, token.time_limit(60.0), 60.0);

        let expired = CancelToken::with_timeout(Duration::ZERO);
        assert!(expired.is_cancelled());
        assert_approx_eq!(f64, expired.time_limit(60.0), 0.0);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SolveStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(SolveStatus::Optimal.to_string(), "optimal");
        assert_eq!(SolveStatus::IterationLimit.to_string(), "iteration_limit");
    }

    #[rstest]
    #[case(SolveLimit::Time, SolveStatus::TimedOut)]
    #[case(SolveLimit::Iterations, SolveStatus::IterationLimit)]
    fn test_status_without_incumbent(#[case] limit: SolveLimit, #[case] expected: SolveStatus) {
        assert_eq!(limit.status_without_incumbent(), expected);
    }

    #[rstest]
    #[case(0.0, Some(0.0))]
    #[case(0.02, Some(0.02))]
    #[case(f64::INFINITY, None)]
    #[case(f64::NAN, None)]
    fn test_reported_gap(#[case] gap: f64, #[case] expected: Option<f64>) {
        assert_eq!(reported_gap(gap), expected);
    }

    #[test]
    fn test_highs_mip_gap() {
        // Minimise 3x + 2y subject to x + y >= 2.5 with x, y integer
        let mut problem = Problem::default();
        let x = problem.add_integer_column(3.0, 0.0..=10.0);
        let y = problem.add_integer_column(2.0, 0.0..=10.0);
        problem.add_row(2.5.., [(x, 1.0), (y, 1.0)]);

        let options = SolverOptions::default();
        let solution = HighsSolver.solve(&problem, &options, 60.0).unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_approx_eq!(f64, solution.columns[1], 3.0, epsilon = 1e-7);
        assert!(solution.row_duals.is_none());
        assert!(solution.limit.is_none());

        // The gap achieved, not the one asked for
        let gap = solution.gap.unwrap();
        assert!(gap <= options.mip_gap);
        assert_approx_eq!(f64, gap, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_highs_lp() {
        let mut problem = Problem::default();
        let x = problem.add_column(1.0, 0.0..);
        let y = problem.add_column(2.0, 0.0..);
        problem.add_row(10.0..=10.0, [(x, 1.0), (y, 1.0)]);
        problem.add_row(..=4.0, [(x, 1.0)]);

        let solution = HighsSolver
            .solve(&problem, &SolverOptions::default(), 60.0)
            .unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_approx_eq!(f64, solution.columns[0], 4.0, epsilon = 1e-7);
        assert_approx_eq!(f64, solution.columns[1], 6.0, epsilon = 1e-7);
        assert!(solution.row_duals.is_some());
        assert_eq!(solution.gap, Some(0.0));
    }

    #[test]
    fn test_highs_infeasible() {
        let mut problem = Problem::default();
        let x = problem.add_column(1.0, 0.0..=1.0);
        problem.add_row(2.0.., [(x, 1.0)]);

        let solution = HighsSolver
            .solve(&problem, &SolverOptions::default(), 60.0)
            .unwrap();
        assert!(matches!(
            solution.status,
            SolveStatus::Infeasible | SolveStatus::InfeasibleOrUnbounded
        ));
        assert!(solution.columns.is_empty());
    }
}
