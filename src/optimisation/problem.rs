//! A solver-agnostic description of a mixed-integer linear programme.
//!
//! Columns and rows are appended in order and referred to by position. The problem is always
//! minimised.
use crate::error::{ModelError, ModelResult};
use std::ops::{Bound, RangeBounds};

/// A decision variable in the optimisation
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(usize);

impl Variable {
    /// The position of the column in the problem
    pub fn index(self) -> usize {
        self.0
    }
}

/// The values a variable may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Any real value within the bounds
    Continuous,
    /// Any integer within the bounds
    Integer,
    /// Zero or one
    Binary,
}

/// A column of the problem
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Coefficient in the objective
    pub cost: f64,
    /// Lower bound (may be negative infinity)
    pub lower: f64,
    /// Upper bound (may be infinity)
    pub upper: f64,
    /// The values the variable may take
    pub domain: Domain,
}

/// A linear constraint `lower <= sum(coefficient * variable) <= upper`
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Lower bound (may be negative infinity)
    pub lower: f64,
    /// Upper bound (may be infinity)
    pub upper: f64,
    /// Non-zero coefficients, ordered by variable with no duplicates
    pub terms: Vec<(Variable, f64)>,
}

impl Row {
    /// The value of the row's linear expression for the given column values
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[var.index()])
            .sum()
    }
}

/// A linear optimisation problem to be minimised
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Problem {
    columns: Vec<Column>,
    rows: Vec<Row>,
    objective_offset: f64,
}

/// Convert range bounds into a `(lower, upper)` pair
fn bounds_to_pair<B: RangeBounds<f64>>(bounds: &B) -> (f64, f64) {
    let lower = match bounds.start_bound() {
        Bound::Included(&value) | Bound::Excluded(&value) => value,
        Bound::Unbounded => f64::NEG_INFINITY,
    };
    let upper = match bounds.end_bound() {
        Bound::Included(&value) | Bound::Excluded(&value) => value,
        Bound::Unbounded => f64::INFINITY,
    };

    (lower, upper)
}

impl Problem {
    fn push_column(&mut self, cost: f64, (lower, upper): (f64, f64), domain: Domain) -> Variable {
        self.columns.push(Column {
            cost,
            lower,
            upper,
            domain,
        });

        Variable(self.columns.len() - 1)
    }

    /// Add a continuous column
    pub fn add_column<B: RangeBounds<f64>>(&mut self, cost: f64, bounds: B) -> Variable {
        self.push_column(cost, bounds_to_pair(&bounds), Domain::Continuous)
    }

    /// Add an integer column
    pub fn add_integer_column<B: RangeBounds<f64>>(&mut self, cost: f64, bounds: B) -> Variable {
        self.push_column(cost, bounds_to_pair(&bounds), Domain::Integer)
    }

    /// Add a binary column
    pub fn add_binary_column(&mut self, cost: f64) -> Variable {
        self.push_column(cost, (0.0, 1.0), Domain::Binary)
    }

    /// Add a row.
    ///
    /// Repeated variables have their coefficients summed and zero coefficients are dropped.
    pub fn add_row<B, I>(&mut self, bounds: B, terms: I)
    where
        B: RangeBounds<f64>,
        I: IntoIterator<Item = (Variable, f64)>,
    {
        let (lower, upper) = bounds_to_pair(&bounds);
        let mut terms: Vec<_> = terms.into_iter().collect();
        terms.sort_by_key(|(var, _)| *var);

        let mut merged: Vec<(Variable, f64)> = Vec::with_capacity(terms.len());
        for (var, coeff) in terms {
            match merged.last_mut() {
                Some((last, total)) if *last == var => *total += coeff,
                _ => merged.push((var, coeff)),
            }
        }
        merged.retain(|(_, coeff)| *coeff != 0.0);

        self.rows.push(Row {
            lower,
            upper,
            terms: merged,
        });
    }

    /// Add to the objective coefficient of a column
    pub fn add_cost(&mut self, var: Variable, cost: f64) {
        self.columns[var.0].cost += cost;
    }

    /// Add a constant to the objective
    pub fn add_objective_offset(&mut self, value: f64) {
        self.objective_offset += value;
    }

    /// The number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// The number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// The number of integer or binary columns
    pub fn num_integer_columns(&self) -> usize {
        self.columns
            .iter()
            .filter(|col| col.domain != Domain::Continuous)
            .count()
    }

    /// Whether any column is restricted to integer values
    pub fn is_mip(&self) -> bool {
        self.columns
            .iter()
            .any(|col| col.domain != Domain::Continuous)
    }

    /// The columns in order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The rows in order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The constant term of the objective
    pub fn objective_offset(&self) -> f64 {
        self.objective_offset
    }

    /// The objective value for the given column values
    pub fn evaluate_objective(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(col, value)| col.cost * value)
            .sum::<f64>()
            + self.objective_offset
    }

    /// Whether the given column values satisfy all bounds, rows and integrality requirements
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        if values.len() != self.columns.len() {
            return false;
        }

        let columns_ok = self.columns.iter().zip(values).all(|(col, &value)| {
            value >= col.lower - tolerance
                && value <= col.upper + tolerance
                && (col.domain == Domain::Continuous || (value - value.round()).abs() <= tolerance)
        });

        columns_ok
            && self.rows.iter().all(|row| {
                let activity = row.activity(values);
                let scale = 1.0 + row.lower.abs().max(row.upper.abs()).min(activity.abs());
                activity >= row.lower - tolerance * scale
                    && activity <= row.upper + tolerance * scale
            })
    }

    /// Check the problem for internal inconsistencies before it is handed to a solver.
    ///
    /// Any failure here indicates a defect in the formulation rather than a problem with the input.
    pub fn validate(&self) -> ModelResult<()> {
        for (index, col) in self.columns.iter().enumerate() {
            if !col.cost.is_finite() {
                return Err(ModelError::formulation(format!(
                    "Column {index} has a non-finite objective coefficient"
                )));
            }
            if col.lower.is_nan() || col.upper.is_nan() || col.lower > col.upper {
                return Err(ModelError::formulation(format!(
                    "Column {index} has inconsistent bounds [{}, {}]",
                    col.lower, col.upper
                )));
            }
        }
        for (index, row) in self.rows.iter().enumerate() {
            if row.lower.is_nan() || row.upper.is_nan() || row.lower > row.upper {
                return Err(ModelError::formulation(format!(
                    "Row {index} has inconsistent bounds [{}, {}]",
                    row.lower, row.upper
                )));
            }
            for (var, coeff) in &row.terms {
                if var.0 >= self.columns.len() || !coeff.is_finite() {
                    return Err(ModelError::formulation(format!(
                        "Row {index} has an invalid term for column {}",
                        var.0
                    )));
                }
            }
        }
        if !self.objective_offset.is_finite() {
            return Err(ModelError::formulation("The objective offset is not finite"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_add_row_merges_terms() {
        let mut problem = Problem::default();
        let x = problem.add_column(1.0, 0.0..);
        let y = problem.add_column(2.0, 0.0..=5.0);
        problem.add_row(1.0..=1.0, [(y, 1.0), (x, 2.0), (x, -1.0), (y, -1.0)]);

        assert_eq!(problem.rows()[0].terms, vec![(x, 1.0)]);
        assert_eq!(problem.columns()[0].upper, f64::INFINITY);
        assert_eq!(problem.columns()[1].upper, 5.0);
    }

    #[test]
    fn test_evaluate_and_feasibility() {
        let mut problem = Problem::default();
        let x = problem.add_column(3.0, 0.0..);
        let on = problem.add_binary_column(1.0);
        problem.add_row(..=0.0, [(x, 1.0), (on, -10.0)]);
        problem.add_objective_offset(-2.0);

        assert!(problem.is_mip());
        assert_approx_eq!(f64, problem.evaluate_objective(&[2.0, 1.0]), 5.0);
        assert!(problem.is_feasible(&[2.0, 1.0], 1e-9));
        assert!(!problem.is_feasible(&[2.0, 0.0], 1e-9));
        assert!(!problem.is_feasible(&[2.0, 0.5], 1e-9));
    }

    #[test]
    fn test_validate() {
        let mut problem = Problem::default();
        let x = problem.add_column(1.0, 0.0..=1.0);
        problem.add_row(0.0..=1.0, [(x, 1.0)]);
        assert!(problem.validate().is_ok());

        problem.add_column(f64::NAN, 0.0..);
        assert!(matches!(
            problem.validate(),
            Err(ModelError::Formulation(_))
        ));
    }
}
