use crate::problem::LpProblem;
use crate::solution::Solution;

/// Common interface for LP backends.
///
/// A backend performs a single deterministic solve attempt. It never relaxes
/// the problem: non-optimal outcomes are reported through
/// [`Solution::status`] and carry no values.
pub trait LpBackend: Send + Sync {
    /// Solve the problem
    fn solve(&self, problem: &LpProblem) -> Solution;

    /// Backend name for logging
    fn name(&self) -> &str;
}

impl<B: LpBackend + ?Sized> LpBackend for &B {
    fn solve(&self, problem: &LpProblem) -> Solution {
        (**self).solve(problem)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
