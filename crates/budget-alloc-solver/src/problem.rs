use crate::solution::ConstraintViolation;

/// Represents a linear programming problem.
///
/// Every variable is implicitly bounded below by zero. An optional finite
/// upper bound per variable is stored separately from the constraint rows so
/// that callers can inspect and report it by variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LpProblem {
    /// Variable names
    pub variables: Vec<String>,
    /// Upper bound for each variable (`f64::INFINITY` when unbounded above)
    pub upper_bounds: Vec<f64>,
    /// Objective function coefficients
    pub objective: Objective,
    /// Constraints
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Objective {
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Whether to minimize or maximize
    pub minimize: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl Constraint {
    /// Left-hand side evaluated at `values`. Missing values count as zero.
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(values.iter())
            .map(|(coef, value)| coef * value)
            .sum()
    }
}

impl LpProblem {
    pub fn new(variables: Vec<String>) -> Self {
        let n = variables.len();
        Self {
            variables,
            upper_bounds: vec![f64::INFINITY; n],
            objective: Objective {
                coefficients: vec![0.0; n],
                minimize: true,
            },
            constraints: Vec::new(),
        }
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, minimize: bool) {
        self.objective = Objective { coefficients, minimize };
    }

    /// Set the upper bound of variable `index`. Out-of-range indices are ignored.
    pub fn set_upper_bound(&mut self, index: usize, bound: f64) {
        if let Some(slot) = self.upper_bounds.get_mut(index) {
            *slot = bound;
        }
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, coefficients: Vec<f64>, op: ConstraintOp, rhs: f64) {
        self.constraints.push(Constraint {
            name: name.into(),
            coefficients,
            op,
            rhs,
        });
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Number of variables carrying a finite upper bound.
    pub fn num_bounded(&self) -> usize {
        self.upper_bounds.iter().filter(|b| b.is_finite()).count()
    }

    /// Objective value at `values`.
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .coefficients
            .iter()
            .zip(values.iter())
            .map(|(coef, value)| coef * value)
            .sum()
    }

    /// Check an assignment against every bound and constraint.
    ///
    /// `tolerance` is relative: a constraint with right-hand side `b` is allowed
    /// to miss by `tolerance * max(1, |b|)`. Violations are sorted worst first.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        let slack = |rhs: f64| tolerance * rhs.abs().max(1.0);

        for (j, name) in self.variables.iter().enumerate() {
            let value = values.get(j).copied().unwrap_or(0.0);
            if value < -slack(0.0) {
                violations.push(ConstraintViolation {
                    constraint: format!("{}_nonneg", name),
                    required: 0.0,
                    actual: value,
                    violation_amount: -value,
                    description: format!("{} is negative ({:.2})", name, value),
                });
            }
            let ub = self.upper_bounds[j];
            if ub.is_finite() && value > ub + slack(ub) {
                let amt = value - ub;
                violations.push(ConstraintViolation {
                    constraint: format!("{}_ub", name),
                    required: ub,
                    actual: value,
                    violation_amount: amt,
                    description: format!("{} exceeds upper bound of {:.2} by {:.2}", name, ub, amt),
                });
            }
        }

        for c in &self.constraints {
            let lhs = c.lhs(values);
            let tol = slack(c.rhs);

            let violated = match c.op {
                ConstraintOp::Le if lhs > c.rhs + tol => {
                    let amt = lhs - c.rhs;
                    Some((amt, format!("{} exceeds maximum of {:.2} by {:.2}", c.name, c.rhs, amt)))
                }
                ConstraintOp::Ge if lhs < c.rhs - tol => {
                    let amt = c.rhs - lhs;
                    Some((amt, format!("{} is below minimum of {:.2} by {:.2}", c.name, c.rhs, amt)))
                }
                ConstraintOp::Eq if (lhs - c.rhs).abs() > tol => {
                    let diff = (lhs - c.rhs).abs();
                    Some((diff, format!("{} requires exactly {:.2} but got {:.2}", c.name, c.rhs, lhs)))
                }
                _ => None,
            };

            if let Some((violation_amount, description)) = violated {
                violations.push(ConstraintViolation {
                    constraint: c.name.clone(),
                    required: c.rhs,
                    actual: lhs,
                    violation_amount,
                    description,
                });
            }
        }

        // Worst first
        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));
        violations
    }
}
