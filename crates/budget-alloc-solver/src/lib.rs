mod backend;
mod problem;
mod simplex;
mod solution;

pub use backend::LpBackend;
pub use problem::{Constraint, ConstraintOp, LpProblem, Objective};
pub use simplex::Solver;
pub use solution::{ConstraintViolation, Solution, SolutionStatus};
