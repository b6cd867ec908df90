//! Scenario runner: build, solve and report, one scenario or a batch.

use std::fmt::Write as _;

use budget_alloc_solver::LpBackend;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::builder::{BuiltScenario, ScenarioBuilder};
use crate::catalog::Limits;
use crate::error::ScenarioError;
use crate::ledger::Ledger;
use crate::outcome::{self, ScenarioStatus};
use crate::result::ResultSet;
use crate::scenario::ScenarioSet;

/// Runs scenarios from a [`ScenarioSet`] against one ledger.
///
/// Limits are derived once on construction and shared by every scenario.
/// Each scenario gets its own LP instance, so runs share nothing mutable
/// and can go in parallel.
pub struct Engine<'a, B: LpBackend> {
    ledger: &'a Ledger,
    scenarios: &'a ScenarioSet,
    backend: B,
    limits: Limits,
}

impl<'a, B: LpBackend> Engine<'a, B> {
    pub fn new(ledger: &'a Ledger, scenarios: &'a ScenarioSet, backend: B) -> Self {
        Self {
            ledger,
            scenarios,
            backend,
            limits: Limits::from_ledger(ledger),
        }
    }

    /// Limits shared by every scenario this engine builds
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn build(&self, name: &str) -> Result<BuiltScenario, ScenarioError> {
        ScenarioBuilder::with_limits(self.ledger, &self.limits).build_scenario(self.scenarios, name)
    }

    /// Build, solve and extract one scenario
    pub fn run_scenario(&self, name: &str) -> Result<ResultSet, ScenarioError> {
        let built = self.build(name)?;
        let outcome = outcome::solve(&self.backend, &built);
        ResultSet::from_outcome(name, outcome, &built.keys)
    }

    /// Run one scenario and capture any failure as a report
    pub fn report(&self, name: &str) -> ScenarioReport {
        let report = ScenarioReport::from_result(name, self.run_scenario(name));
        match &report.result {
            Some(result) => info!(
                scenario = name,
                status = %report.status,
                total = result.total_allocated(),
                "scenario solved"
            ),
            None => warn!(
                scenario = name,
                status = %report.status,
                message = report.message.as_deref().unwrap_or(""),
                "scenario not solved"
            ),
        }
        report
    }

    pub fn run_batch<S: AsRef<str>>(&self, names: &[S]) -> BatchReport {
        BatchReport {
            reports: names.iter().map(|n| self.report(n.as_ref())).collect(),
        }
    }

    /// Same as [`Engine::run_batch`], one rayon task per scenario. Report order follows `names`.
    pub fn run_batch_parallel<S: AsRef<str> + Sync>(&self, names: &[S]) -> BatchReport {
        BatchReport {
            reports: names.par_iter().map(|n| self.report(n.as_ref())).collect(),
        }
    }

    /// Every scenario in declaration order
    pub fn run_all(&self, parallel: bool) -> BatchReport {
        let names = self.scenarios.names();
        if parallel {
            self.run_batch_parallel(&names)
        } else {
            self.run_batch(&names)
        }
    }
}

/// Structured per-scenario record; failures never abort a batch
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub status: ScenarioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScenarioReport {
    pub fn from_result(name: &str, result: Result<ResultSet, ScenarioError>) -> Self {
        match result {
            Ok(result) => Self {
                scenario: name.to_string(),
                status: ScenarioStatus::Optimal,
                result: Some(result),
                message: None,
            },
            Err(e) => {
                let status = match e {
                    ScenarioError::Infeasible(_) => ScenarioStatus::Infeasible,
                    ScenarioError::Unbounded(_) => ScenarioStatus::Unbounded,
                    _ => ScenarioStatus::Error,
                };
                Self {
                    scenario: name.to_string(),
                    status,
                    result: None,
                    message: Some(e.to_string()),
                }
            }
        }
    }

    pub fn total_allocated(&self) -> Option<f64> {
        self.result.as_ref().map(|r| r.total_allocated())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reports: Vec<ScenarioReport>,
}

impl BatchReport {
    pub fn get(&self, scenario: &str) -> Option<&ScenarioReport> {
        self.reports.iter().find(|r| r.scenario == scenario)
    }

    pub fn optimal(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.reports.iter().filter(|r| r.status == ScenarioStatus::Optimal)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.reports.iter().filter(|r| r.status != ScenarioStatus::Optimal)
    }

    pub fn all_optimal(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Total allocated per solved scenario, in run order
    pub fn totals(&self) -> Vec<(&str, f64)> {
        self.reports
            .iter()
            .filter_map(|r| r.total_allocated().map(|t| (r.scenario.as_str(), t)))
            .collect()
    }

    /// Plain-text status and total table
    pub fn summary(&self) -> String {
        let width = self
            .reports
            .iter()
            .map(|r| r.scenario.len())
            .max()
            .unwrap_or(0)
            .max("Scenario".len());

        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}  {:<10}  {:>18}", "Scenario", "Status", "Total Allocated");
        for report in &self.reports {
            let total = match report.total_allocated() {
                Some(t) => format!("{:.2}", t),
                None => "-".to_string(),
            };
            let _ = writeln!(out, "{:<width$}  {:<10}  {:>18}", report.scenario, report.status.to_string(), total);
        }
        let _ = write!(
            out,
            "{} of {} scenarios optimal",
            self.optimal().count(),
            self.reports.len()
        );
        out
    }
}
