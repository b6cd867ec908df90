//! TOML run configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use budget_alloc_solver::Solver;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LedgerError, ScenarioError};
use crate::ledger::{DuplicatePolicy, Ledger};
use crate::library::default_scenario_set;
use crate::scenario::{Scenario, ScenarioSet};
use crate::source::{DelimitedSource, JsonSource, LedgerSource};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    pub solver: SolverConfig,
    pub output: OutputConfig,
    /// `[[scenario]]` tables; the built-in library is used when empty
    #[serde(rename = "scenario", skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: Option<PathBuf>,
    /// Inferred from the file extension when unset
    pub format: Option<LedgerFormat>,
    pub delimiter: char,
    pub duplicates: DuplicatePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            format: None,
            delimiter: ',',
            duplicates: DuplicatePolicy::Aggregate,
        }
    }
}

impl LedgerConfig {
    pub fn format_for(&self, path: &Path) -> LedgerFormat {
        self.format.unwrap_or_else(|| match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => LedgerFormat::Json,
            _ => LedgerFormat::Csv,
        })
    }

    pub fn source(&self, path: &Path) -> Box<dyn LedgerSource> {
        match self.format_for(path) {
            LedgerFormat::Csv => Box::new(DelimitedSource::from_path(path).with_delimiter(self.delimiter)),
            LedgerFormat::Json => Box::new(JsonSource::from_path(path)),
        }
    }

    /// Load from `path`, or from the configured path when `None`
    pub fn load(&self, path: Option<&Path>) -> Result<Ledger, LedgerError> {
        let path = path
            .or(self.path.as_deref())
            .ok_or_else(|| LedgerError::DataSource("no ledger path given".to_string()))?;
        Ledger::load_with(&*self.source(path), self.duplicates)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub time_limit_ms: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50_000,
            tolerance: 1e-9,
            time_limit_ms: None,
        }
    }
}

impl SolverConfig {
    pub fn solver(&self) -> Solver {
        let solver = Solver::new()
            .with_max_iterations(self.max_iterations)
            .with_tolerance(self.tolerance);
        match self.time_limit_ms {
            Some(ms) => solver.with_time_limit(Duration::from_millis(ms)),
            None => solver,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub parallel: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            parallel: false,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults when no file is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn scenario_set(&self) -> Result<ScenarioSet, ScenarioError> {
        if self.scenarios.is_empty() {
            Ok(default_scenario_set())
        } else {
            ScenarioSet::new(self.scenarios.clone())
        }
    }
}
