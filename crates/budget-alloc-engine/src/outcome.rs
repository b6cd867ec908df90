//! Outcome classification around an LP backend.

use std::collections::BTreeMap;
use std::fmt;

use budget_alloc_solver::{LpBackend, SolutionStatus};
use serde::Serialize;

use crate::builder::BuiltScenario;
use crate::ledger::LineKey;

/// Typed result of one solve attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Optimal {
        values: BTreeMap<LineKey, f64>,
        objective: f64,
        /// Constraints holding with equality at the optimum
        binding: Vec<String>,
    },
    Infeasible,
    Unbounded,
    SolverError {
        message: String,
    },
}

impl SolveOutcome {
    pub fn status(&self) -> ScenarioStatus {
        match self {
            SolveOutcome::Optimal { .. } => ScenarioStatus::Optimal,
            SolveOutcome::Infeasible => ScenarioStatus::Infeasible,
            SolveOutcome::Unbounded => ScenarioStatus::Unbounded,
            SolveOutcome::SolverError { .. } => ScenarioStatus::Error,
        }
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveOutcome::Optimal { .. })
    }
}

/// Per-scenario status as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Error,
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioStatus::Optimal => "optimal",
            ScenarioStatus::Infeasible => "infeasible",
            ScenarioStatus::Unbounded => "unbounded",
            ScenarioStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Run one deterministic solve and classify it. No retries, no relaxation.
pub fn solve<B: LpBackend + ?Sized>(backend: &B, built: &BuiltScenario) -> SolveOutcome {
    let solution = backend.solve(&built.problem);

    match solution.status {
        SolutionStatus::Optimal if solution.values.len() == built.keys.len() => SolveOutcome::Optimal {
            values: built
                .keys
                .iter()
                .cloned()
                .zip(solution.values.iter().map(|v| v.max(0.0)))
                .collect(),
            objective: solution.objective_value,
            binding: solution.binding_constraints,
        },
        SolutionStatus::Optimal => SolveOutcome::SolverError {
            message: format!(
                "{} returned {} values for {} variables",
                backend.name(),
                solution.values.len(),
                built.keys.len()
            ),
        },
        SolutionStatus::Infeasible => SolveOutcome::Infeasible,
        SolutionStatus::Unbounded => SolveOutcome::Unbounded,
        SolutionStatus::Error => SolveOutcome::SolverError {
            message: solution.message.unwrap_or_else(|| "unknown solver error".to_string()),
        },
    }
}
