use thiserror::Error;

/// Failures while loading a ledger. All of them abort a run before any
/// scenario is built.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Data source error: {0}")]
    DataSource(String),
    #[error("Missing required column(s): {}", .missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("Duplicate line item for program '{program}' / category '{category}'")]
    DuplicateKey { program: String, category: String },
}

/// Failures scoped to a single scenario. A batch keeps going after any of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
    #[error("Scenario defined more than once: {0}")]
    DuplicateScenario(String),
    #[error("Circular extends chain: {0}")]
    CircularExtends(String),
    #[error("Scenario '{0}' is infeasible: no allocation satisfies every constraint")]
    Infeasible(String),
    #[error("Scenario '{0}' is unbounded")]
    Unbounded(String),
    #[error("Solver error in scenario '{scenario}': {message}")]
    Solver { scenario: String, message: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {message}")]
    Io { path: String, message: String },
    #[error("Invalid config: {0}")]
    Parse(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::DataSource(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::DataSource(format!("malformed JSON: {}", e))
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}
