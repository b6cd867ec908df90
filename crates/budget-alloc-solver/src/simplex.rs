use std::time::{Duration, Instant};

use crate::backend::LpBackend;
use crate::problem::{ConstraintOp, LpProblem};
use crate::solution::Solution;

/// Consecutive degenerate pivots tolerated before switching to Bland's rule
const DEGENERATE_PIVOT_LIMIT: usize = 50;

/// Relative tolerance used to report a constraint as binding
const BINDING_TOLERANCE: f64 = 1e-7;

/// Simplex solver for linear programming problems
#[derive(Debug, Clone)]
pub struct Solver {
    /// Maximum pivots (both phases) before giving up
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
    /// Wall-clock budget for a single solve
    time_limit: Option<Duration>,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 50_000,
            tolerance: 1e-9,
            time_limit: None,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Solve the LP problem using the two-phase simplex method
    pub fn solve(&self, problem: &LpProblem) -> Solution {
        if let Err(message) = self.validate(problem) {
            return Solution::error(message, 0);
        }

        let mut tableau = self.build_tableau(problem);
        let mut budget = IterationBudget {
            iterations: 0,
            max_iterations: self.max_iterations,
            deadline: self.time_limit.map(|limit| Instant::now() + limit),
        };

        // Phase 1: Find initial basic feasible solution
        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau, &mut budget) {
                Ok(true) => {}
                Ok(false) => return Solution::infeasible(budget.iterations),
                Err(stop) => return Solution::error(stop.as_str(), budget.iterations),
            }
        }

        // Phase 2: Optimize
        match self.phase2(&mut tableau, &mut budget) {
            Ok(SimplexResult::Optimal) => {}
            Ok(SimplexResult::Unbounded) => return Solution::unbounded(budget.iterations),
            Err(stop) => return Solution::error(stop.as_str(), budget.iterations),
        }

        self.extract_solution(&tableau, problem, budget.iterations)
    }

    fn validate(&self, problem: &LpProblem) -> Result<(), String> {
        let n = problem.num_variables();

        if problem.objective.coefficients.len() != n {
            return Err(format!(
                "objective has {} coefficients, expected {}",
                problem.objective.coefficients.len(),
                n
            ));
        }
        if problem.upper_bounds.len() != n {
            return Err(format!("{} upper bounds for {} variables", problem.upper_bounds.len(), n));
        }
        if problem.objective.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("objective has a non-finite coefficient".to_string());
        }
        for (name, ub) in problem.variables.iter().zip(&problem.upper_bounds) {
            if ub.is_nan() || *ub == f64::NEG_INFINITY {
                return Err(format!("variable {} has an invalid upper bound", name));
            }
        }
        for c in &problem.constraints {
            if c.coefficients.len() != n {
                return Err(format!(
                    "constraint {} has {} coefficients, expected {}",
                    c.name,
                    c.coefficients.len(),
                    n
                ));
            }
            if !c.rhs.is_finite() || c.coefficients.iter().any(|x| !x.is_finite()) {
                return Err(format!("constraint {} has a non-finite value", c.name));
            }
        }
        Ok(())
    }

    fn build_tableau(&self, problem: &LpProblem) -> Tableau {
        let n_vars = problem.num_variables();

        // Constraint rows first, then one row per finite upper bound
        let mut rows: Vec<(Vec<f64>, ConstraintOp, f64)> = problem
            .constraints
            .iter()
            .map(|c| (c.coefficients.clone(), c.op, c.rhs))
            .collect();
        for (j, &ub) in problem.upper_bounds.iter().enumerate() {
            if ub.is_finite() {
                let mut coeffs = vec![0.0; n_vars];
                coeffs[j] = 1.0;
                rows.push((coeffs, ConstraintOp::Le, ub));
            }
        }

        // Keep every RHS non-negative
        for (coeffs, op, rhs) in rows.iter_mut() {
            if *rhs < 0.0 {
                *rhs = -*rhs;
                coeffs.iter_mut().for_each(|x| *x = -*x);
                *op = match *op {
                    ConstraintOp::Le => ConstraintOp::Ge,
                    ConstraintOp::Ge => ConstraintOp::Le,
                    ConstraintOp::Eq => ConstraintOp::Eq,
                };
            }
        }

        let n_constraints = rows.len();
        let n_slack = rows.iter().filter(|(_, op, _)| *op != ConstraintOp::Eq).count();
        let n_artificial = rows.iter().filter(|(_, op, _)| *op != ConstraintOp::Le).count();

        let total_cols = n_vars + n_slack + n_artificial + 1; // +1 for RHS
        let total_rows = n_constraints + 1; // +1 for objective

        let rhs_scale = 1.0 + rows.iter().map(|(_, _, rhs)| *rhs).fold(0.0, f64::max);

        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; total_rows],
            basic_vars: vec![0; n_constraints],
            n_vars,
            n_slack,
            n_artificial,
            rhs_scale,
        };

        let mut slack_idx = n_vars;
        let mut artificial_idx = n_vars + n_slack;

        for (i, (coeffs, op, rhs)) in rows.into_iter().enumerate() {
            tableau.data[i][..n_vars].copy_from_slice(&coeffs);
            tableau.data[i][total_cols - 1] = rhs;

            match op {
                ConstraintOp::Le => {
                    tableau.data[i][slack_idx] = 1.0;
                    tableau.basic_vars[i] = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    tableau.data[i][slack_idx] = -1.0; // surplus
                    slack_idx += 1;
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        // Objective row (last row). Simplex maximizes, so minimization negates.
        let obj_row = n_constraints;
        for (j, &coef) in problem.objective.coefficients.iter().enumerate() {
            tableau.data[obj_row][j] = if problem.objective.minimize { -coef } else { coef };
        }

        tableau
    }

    /// Returns `Ok(false)` when no feasible point exists.
    fn phase1(&self, tableau: &mut Tableau, budget: &mut IterationBudget) -> Result<bool, Stop> {
        let obj_row = tableau.obj_row();
        let n_cols = tableau.n_cols();
        let art_start = tableau.art_start();

        let orig_obj = tableau.data[obj_row].clone();

        // Maximize -sum(artificials)
        tableau.data[obj_row].iter_mut().for_each(|x| *x = 0.0);
        for j in art_start..(art_start + tableau.n_artificial) {
            tableau.data[obj_row][j] = -1.0;
        }
        for i in 0..obj_row {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[obj_row][j] += tableau.data[i][j];
                }
            }
        }

        if !self.iterate(tableau, n_cols - 1, budget)? {
            // Phase 1 objective is bounded by zero; an unbounded ray means a broken tableau
            return Ok(false);
        }

        let rhs_col = n_cols - 1;
        let infeasibility: f64 = (0..obj_row)
            .filter(|&i| tableau.basic_vars[i] >= art_start)
            .map(|i| tableau.data[i][rhs_col].abs())
            .sum();
        if infeasibility > self.tolerance * tableau.rhs_scale {
            return Ok(false);
        }

        // Drive zero-level artificials out of the basis
        for i in 0..obj_row {
            if tableau.basic_vars[i] < art_start {
                continue;
            }
            tableau.data[i][rhs_col] = 0.0;
            if let Some(j) = (0..art_start).find(|&j| tableau.data[i][j].abs() > self.tolerance) {
                self.pivot(tableau, i, j);
            }
            // Otherwise the row is redundant: zero in every structural column
        }

        // Restore original objective and price out the basis
        tableau.data[obj_row] = orig_obj;
        for i in 0..obj_row {
            let basic = tableau.basic_vars[i];
            let ratio = tableau.data[obj_row][basic];
            if ratio.abs() > self.tolerance {
                for j in 0..n_cols {
                    tableau.data[obj_row][j] -= ratio * tableau.data[i][j];
                }
            }
        }

        Ok(true)
    }

    fn phase2(&self, tableau: &mut Tableau, budget: &mut IterationBudget) -> Result<SimplexResult, Stop> {
        // Artificial columns never re-enter
        let limit = tableau.art_start();
        if self.iterate(tableau, limit, budget)? {
            Ok(SimplexResult::Optimal)
        } else {
            Ok(SimplexResult::Unbounded)
        }
    }

    /// Pivot until no column below `limit` improves the objective.
    /// Returns `Ok(false)` if an improving column has no leaving row.
    fn iterate(&self, tableau: &mut Tableau, limit: usize, budget: &mut IterationBudget) -> Result<bool, Stop> {
        let rhs_col = tableau.n_cols() - 1;
        let mut bland = false;
        let mut degenerate_run = 0;

        loop {
            let Some(pivot_col) = self.find_pivot_column(tableau, limit, bland) else {
                return Ok(true);
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return Ok(false);
            };
            budget.tick()?;

            let step = tableau.data[pivot_row][rhs_col] / tableau.data[pivot_row][pivot_col];
            if step <= self.tolerance {
                degenerate_run += 1;
                if degenerate_run > DEGENERATE_PIVOT_LIMIT {
                    bland = true;
                }
            } else {
                degenerate_run = 0;
            }

            self.pivot(tableau, pivot_row, pivot_col);
        }
    }

    fn find_pivot_column(&self, tableau: &Tableau, limit: usize, bland: bool) -> Option<usize> {
        let obj = &tableau.data[tableau.obj_row()];

        if bland {
            return (0..limit).find(|&j| obj[j] > self.tolerance);
        }

        // Most positive reduced cost
        let mut max_val = self.tolerance;
        let mut max_col = None;
        for (j, &val) in obj.iter().enumerate().take(limit) {
            if val > max_val {
                max_val = val;
                max_col = Some(j);
            }
        }
        max_col
    }

    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let rhs_col = tableau.n_cols() - 1;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..tableau.obj_row() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = tableau.data[i][rhs_col].max(0.0) / val;
            let better = match min_row {
                None => true,
                Some(current) => {
                    ratio < min_ratio - self.tolerance
                        || ((ratio - min_ratio).abs() <= self.tolerance
                            && tableau.basic_vars[i] < tableau.basic_vars[current])
                }
            };
            if better {
                min_ratio = ratio;
                min_row = Some(i);
            }
        }

        min_row
    }

    fn pivot(&self, tableau: &mut Tableau, row: usize, col: usize) {
        let n_rows = tableau.data.len();

        tableau.basic_vars[row] = col;

        let pivot_val = tableau.data[row][col];
        for x in tableau.data[row].iter_mut() {
            *x /= pivot_val;
        }

        let pivot_row = tableau.data[row].clone();
        for i in 0..n_rows {
            if i == row {
                continue;
            }
            let factor = tableau.data[i][col];
            if factor == 0.0 {
                continue;
            }
            for (x, p) in tableau.data[i].iter_mut().zip(&pivot_row) {
                *x -= factor * p;
            }
        }
    }

    fn extract_solution(&self, tableau: &Tableau, problem: &LpProblem, iterations: usize) -> Solution {
        let n_vars = problem.num_variables();
        let rhs_col = tableau.n_cols() - 1;

        let mut values = vec![0.0; n_vars];
        for i in 0..tableau.obj_row() {
            let basic = tableau.basic_vars[i];
            if basic < n_vars {
                values[basic] = tableau.data[i][rhs_col];
            }
        }

        // Snap round-off back into [0, ub]
        for (value, &ub) in values.iter_mut().zip(&problem.upper_bounds) {
            *value = value.max(0.0).min(ub);
        }

        let objective_value = problem.objective_value(&values);
        let binding_constraints = binding_constraints(problem, &values);

        Solution::optimal(values, objective_value, iterations, binding_constraints)
    }
}

impl LpBackend for Solver {
    fn solve(&self, problem: &LpProblem) -> Solution {
        Solver::solve(self, problem)
    }

    fn name(&self) -> &str {
        "simplex"
    }
}

fn binding_constraints(problem: &LpProblem, values: &[f64]) -> Vec<String> {
    let tight = |lhs: f64, rhs: f64| (lhs - rhs).abs() <= BINDING_TOLERANCE * rhs.abs().max(1.0);

    let mut binding: Vec<String> = problem
        .constraints
        .iter()
        .filter(|c| tight(c.lhs(values), c.rhs))
        .map(|c| c.name.clone())
        .collect();

    for ((name, &ub), &value) in problem.variables.iter().zip(&problem.upper_bounds).zip(values) {
        if ub.is_finite() && ub > 0.0 && tight(value, ub) {
            binding.push(format!("{}_ub", name));
        }
    }

    binding
}

struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    n_vars: usize,
    n_slack: usize,
    n_artificial: usize,
    /// 1 + largest RHS, scales the phase 1 feasibility check
    rhs_scale: f64,
}

impl Tableau {
    fn obj_row(&self) -> usize {
        self.data.len() - 1
    }

    fn n_cols(&self) -> usize {
        self.data[0].len()
    }

    fn art_start(&self) -> usize {
        self.n_vars + self.n_slack
    }
}

struct IterationBudget {
    iterations: usize,
    max_iterations: usize,
    deadline: Option<Instant>,
}

impl IterationBudget {
    fn tick(&mut self) -> Result<(), Stop> {
        if self.iterations >= self.max_iterations {
            return Err(Stop::IterationLimit);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Stop::Timeout);
            }
        }
        self.iterations += 1;
        Ok(())
    }
}

enum Stop {
    IterationLimit,
    Timeout,
}

impl Stop {
    fn as_str(&self) -> &'static str {
        match self {
            Stop::IterationLimit => "iteration limit",
            Stop::Timeout => "timeout",
        }
    }
}

enum SimplexResult {
    Optimal,
    Unbounded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::LpProblem;
    use crate::solution::SolutionStatus;
    use proptest::prelude::*;

    #[test]
    fn test_simple_maximization() {
        // Maximize: 3x + 2y
        // Subject to:
        //   x + y <= 4
        //   x <= 3 (bound)
        //   y <= 3 (bound)
        // Optimal: x=3, y=1, obj=11
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![3.0, 2.0], false);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Le, 4.0);
        problem.set_upper_bound(0, 3.0);
        problem.set_upper_bound(1, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 11.0).abs() < 1e-6, "obj = {} (expected 11)", solution.objective_value);
        assert!(solution.binding_constraints.contains(&"sum".to_string()));
        assert!(solution.binding_constraints.contains(&"x_ub".to_string()));
    }

    #[test]
    fn test_minimization_with_ge() {
        // Minimize: 2x + 3y
        // Subject to:
        //   x + y >= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=9
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![2.0, 3.0], true);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Ge, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 9.0).abs() < 1e-6, "obj = {} (expected 9)", solution.objective_value);
    }

    #[test]
    fn test_equality_constraint() {
        // Maximize x subject to x + y = 5, y >= 2
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 0.0], false);
        problem.add_constraint("total", vec![1.0, 1.0], ConstraintOp::Eq, 5.0);
        problem.add_constraint("y_min", vec![0.0, 1.0], ConstraintOp::Ge, 2.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6);
        assert!((solution.values[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_rhs_is_normalized() {
        // -x <= -2 is x >= 2; minimize x
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], true);
        problem.add_constraint("neg", vec![-1.0], ConstraintOp::Le, -2.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible() {
        // x >= 5
        // x <= 3
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], true);
        problem.add_constraint("lower", vec![1.0], ConstraintOp::Ge, 5.0);
        problem.add_constraint("upper", vec![1.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Infeasible);
        assert!(solution.values.is_empty());
    }

    #[test]
    fn test_lower_bound_above_upper_bound_is_infeasible() {
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], false);
        problem.set_upper_bound(0, 3.0);
        problem.add_constraint("floor", vec![1.0], ConstraintOp::Ge, 5.0);

        assert_eq!(Solver::new().solve(&problem).status, SolutionStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], false);

        let solution = Solver::new().solve(&problem);
        assert_eq!(solution.status, SolutionStatus::Unbounded);
        assert!(solution.values.is_empty());
    }

    #[test]
    fn test_empty_problem_is_optimal() {
        let problem = LpProblem::new(Vec::new());
        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!(solution.values.is_empty());
        assert_eq!(solution.objective_value, 0.0);
    }

    #[test]
    fn test_iteration_limit_is_an_error() {
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 1.0], false);
        problem.set_upper_bound(0, 1.0);
        problem.set_upper_bound(1, 1.0);

        let solution = Solver::new().with_max_iterations(0).solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Error);
        assert_eq!(solution.message.as_deref(), Some("iteration limit"));
        assert!(solution.values.is_empty());
    }

    #[test]
    fn test_mismatched_coefficients_is_an_error() {
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 1.0], false);
        problem.add_constraint("short", vec![1.0], ConstraintOp::Le, 1.0);

        let solution = Solver::new().solve(&problem);
        assert_eq!(solution.status, SolutionStatus::Error);
        assert!(solution.message.unwrap_or_default().contains("short"));
    }

    #[test]
    fn test_redundant_equalities_are_handled() {
        // Two copies of the same equality leave a redundant artificial row
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 2.0], false);
        problem.add_constraint("a", vec![1.0, 1.0], ConstraintOp::Eq, 4.0);
        problem.add_constraint("b", vec![1.0, 1.0], ConstraintOp::Eq, 4.0);
        problem.set_upper_bound(1, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 1.0).abs() < 1e-6);
        assert!((solution.values[1] - 3.0).abs() < 1e-6);
        assert!(problem.violations(&solution.values, 1e-9).is_empty());
    }

    #[test]
    fn test_budget_scale_values() {
        // Maximize spend across three lines capped at 25M total
        let mut problem = LpProblem::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        problem.set_objective(vec![1.0, 1.0, 1.0], false);
        problem.set_upper_bound(0, 12_500_000.0);
        problem.set_upper_bound(1, 9_750_000.5);
        problem.set_upper_bound(2, 8_000_000.0);
        problem.add_constraint("total", vec![1.0, 1.0, 1.0], ConstraintOp::Le, 25_000_000.0);
        problem.add_constraint("a_floor", vec![1.0, 0.0, 0.0], ConstraintOp::Ge, 6_000_000.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.objective_value - 25_000_000.0).abs() < 1e-3);
        assert!(solution.values[0] >= 6_000_000.0 - 1e-3);
        assert!(problem.violations(&solution.values, 1e-9).is_empty());
    }

    proptest! {
        #[test]
        fn prop_capped_sum_reaches_min_of_cap_and_bounds(
            bounds in prop::collection::vec(0.0f64..1000.0, 1..12),
            share in 0.0f64..1.5,
        ) {
            let n = bounds.len();
            let names = (0..n).map(|i| format!("v{}", i)).collect();
            let mut problem = LpProblem::new(names);
            problem.set_objective(vec![1.0; n], false);
            for (j, &ub) in bounds.iter().enumerate() {
                problem.set_upper_bound(j, ub);
            }
            let total: f64 = bounds.iter().sum();
            problem.add_constraint("cap", vec![1.0; n], ConstraintOp::Le, share * total);

            let solution = Solver::new().solve(&problem);

            prop_assert_eq!(solution.status, SolutionStatus::Optimal);
            let expected = (share * total).min(total);
            prop_assert!((solution.objective_value - expected).abs() <= 1e-6 * expected.max(1.0));
            prop_assert!(problem.violations(&solution.values, 1e-9).is_empty());
        }
    }
}
