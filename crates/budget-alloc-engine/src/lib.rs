pub mod builder;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod library;
pub mod outcome;
pub mod result;
pub mod scenario;
pub mod source;

#[cfg(feature = "wasm")]
pub mod wasm;

#[cfg(test)]
mod props;

pub use builder::{BuiltScenario, ScenarioBuilder};
pub use catalog::{ConstraintCatalog, Limits};
pub use config::{EngineConfig, LedgerConfig, LedgerFormat, OutputConfig, SolverConfig};
pub use engine::{BatchReport, Engine, ScenarioReport};
pub use error::{ConfigError, LedgerError, ScenarioError};
pub use ledger::{DuplicatePolicy, GroupBy, Ledger, LineItem, LineKey, Totals};
pub use library::{analysis_scenarios, default_scenario_set, reference_scenarios};
pub use outcome::{ScenarioStatus, SolveOutcome, solve};
pub use result::{ResultRow, ResultSet, output_file_name};
pub use scenario::{CategoryLimit, ConstraintFamily, ConstraintSpec, DepartmentLimit, Scenario, ScenarioSet, Selection};
pub use source::{Column, DelimitedSource, JsonSource, LedgerSource, RawRow};
