//! Allocation results and their tabular sink.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::error::ScenarioError;
use crate::ledger::LineKey;
use crate::outcome::SolveOutcome;

/// Amounts at or below this are reported as unfunded
pub const ALLOCATION_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub program: String,
    pub expense_category: String,
    pub allocated_amount: f64,
}

/// Optimal allocation for one scenario, one row per decision variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    scenario: String,
    rows: Vec<ResultRow>,
    binding_constraints: Vec<String>,
}

impl ResultSet {
    /// Rows follow `keys` order; non-optimal outcomes become the matching error
    pub fn from_outcome(scenario: &str, outcome: SolveOutcome, keys: &[LineKey]) -> Result<Self, ScenarioError> {
        match outcome {
            SolveOutcome::Optimal { values, binding, .. } => {
                let rows = keys
                    .iter()
                    .map(|key| ResultRow {
                        program: key.program.clone(),
                        expense_category: key.category.clone(),
                        allocated_amount: values.get(key).copied().unwrap_or(0.0),
                    })
                    .collect();
                Ok(Self {
                    scenario: scenario.to_string(),
                    rows,
                    binding_constraints: binding,
                })
            }
            SolveOutcome::Infeasible => Err(ScenarioError::Infeasible(scenario.to_string())),
            SolveOutcome::Unbounded => Err(ScenarioError::Unbounded(scenario.to_string())),
            SolveOutcome::SolverError { message } => Err(ScenarioError::Solver {
                scenario: scenario.to_string(),
                message,
            }),
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn binding_constraints(&self) -> &[String] {
        &self.binding_constraints
    }

    pub fn total_allocated(&self) -> f64 {
        self.rows.iter().map(|r| r.allocated_amount).sum()
    }

    pub fn by_program(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for row in &self.rows {
            *out.entry(row.program.clone()).or_insert(0.0) += row.allocated_amount;
        }
        out
    }

    pub fn by_category(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for row in &self.rows {
            *out.entry(row.expense_category.clone()).or_insert(0.0) += row.allocated_amount;
        }
        out
    }

    /// Rows that received funding
    pub fn nonzero_rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(|r| r.allocated_amount > ALLOCATION_EPSILON)
    }

    /// Write `Program,ExpenseCategory,AllocatedBudget` with a header row
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "Program,ExpenseCategory,AllocatedBudget")?;
        for row in &self.rows {
            writeln!(
                writer,
                "{},{},{}",
                csv_field(&row.program),
                csv_field(&row.expense_category),
                row.allocated_amount
            )?;
        }
        writer.flush()
    }

    pub fn file_name(&self) -> String {
        output_file_name(&self.scenario)
    }
}

/// Sink file name for a scenario's result table
pub fn output_file_name(scenario: &str) -> String {
    let safe: String = scenario
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("optimized_budget_allocation_{}.csv", safe)
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}
