//! WASM bindings for a web front end
//!
//! Every entry point takes the ledger as CSV text and an optional TOML
//! config (empty string for defaults), and returns plain JSON values.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::ledger::Ledger;
use crate::scenario::ScenarioSet;
use crate::source::DelimitedSource;

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(js_err)
}

fn prepare(ledger_csv: &str, config_toml: &str) -> Result<(EngineConfig, Ledger, ScenarioSet), JsValue> {
    let config = EngineConfig::from_toml(config_toml).map_err(js_err)?;
    let source = DelimitedSource::from_text(ledger_csv).with_delimiter(config.ledger.delimiter);
    let ledger = Ledger::load_with(&source, config.ledger.duplicates).map_err(js_err)?;
    let scenarios = config.scenario_set().map_err(js_err)?;
    Ok((config, ledger, scenarios))
}

/// Solve one scenario and return its result set
#[wasm_bindgen]
pub fn run_scenario(ledger_csv: &str, config_toml: &str, name: &str) -> Result<JsValue, JsValue> {
    let (config, ledger, scenarios) = prepare(ledger_csv, config_toml)?;
    let engine = Engine::new(&ledger, &scenarios, config.solver.solver());
    let result = engine.run_scenario(name).map_err(js_err)?;
    to_js(&result)
}

/// Solve every scenario; failures are reported per scenario, not thrown
#[wasm_bindgen]
pub fn run_all(ledger_csv: &str, config_toml: &str) -> Result<JsValue, JsValue> {
    let (config, ledger, scenarios) = prepare(ledger_csv, config_toml)?;
    let engine = Engine::new(&ledger, &scenarios, config.solver.solver());
    to_js(&engine.run_all(false))
}

#[derive(Serialize)]
struct ScenarioInfo {
    name: String,
    description: Option<String>,
    extends: Option<String>,
    constraints: Vec<String>,
}

/// List configured scenarios with their resolved constraints
#[wasm_bindgen]
pub fn list_scenarios(config_toml: &str) -> Result<JsValue, JsValue> {
    let config = EngineConfig::from_toml(config_toml).map_err(js_err)?;
    let set = config.scenario_set().map_err(js_err)?;

    let mut infos = Vec::with_capacity(set.len());
    for scenario in set.iter() {
        let constraints = set
            .resolve(&scenario.name)
            .map_err(js_err)?
            .iter()
            .map(|spec| spec.to_string())
            .collect();
        infos.push(ScenarioInfo {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            extends: scenario.extends.clone(),
            constraints,
        });
    }
    to_js(&infos)
}
