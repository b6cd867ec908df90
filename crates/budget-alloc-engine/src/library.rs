//! Built-in scenario definitions.

use crate::scenario::{CategoryLimit, ConstraintSpec, DepartmentLimit, Scenario, ScenarioSet};

/// Programs protected by the analysis floor scenarios
pub const KEY_PROGRAMS: [&str; 2] = ["Mayor's Administration", "Public Safety"];

/// The six allocation policies, each layered on `Scenario_1`
pub fn reference_scenarios() -> Vec<Scenario> {
    let base = "Scenario_1";
    vec![
        Scenario::new(base)
            .described("Total allocation capped at the total proposed budget")
            .with(ConstraintSpec::total_cap(1.0)),
        Scenario::new("Scenario_2")
            .described("Departments capped at 110% of appropriation")
            .extending(base)
            .with(ConstraintSpec::department_cap(DepartmentLimit::Appropriation, 1.10)),
        Scenario::new("Scenario_3")
            .described("Each category capped at 10% of the total proposed budget")
            .extending(base)
            .with(ConstraintSpec::category_cap(CategoryLimit::ShareOfTotal, 0.10)),
        Scenario::new("Scenario_4")
            .described("Departments capped at their appropriation")
            .extending(base)
            .with(ConstraintSpec::department_cap(DepartmentLimit::Appropriation, 1.00)),
        Scenario::new("Scenario_5")
            .described("Departments capped at 105% of appropriation")
            .extending(base)
            .with(ConstraintSpec::department_cap(DepartmentLimit::Appropriation, 1.05)),
        Scenario::new("Scenario_6")
            .described("Each category capped at 30% of the total proposed budget")
            .extending(base)
            .with(ConstraintSpec::category_cap(CategoryLimit::ShareOfTotal, 0.30)),
    ]
}

/// The four analysis policies
pub fn analysis_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("Basic")
            .described("Total cap plus departments capped at prior-year actuals")
            .with(ConstraintSpec::total_cap(1.0))
            .with(ConstraintSpec::department_cap(DepartmentLimit::PriorActual, 1.0)),
        Scenario::new("Category Limits")
            .described("Basic plus categories capped at their mean prior-year actual")
            .extending("Basic")
            .with(ConstraintSpec::category_cap(CategoryLimit::ActualMean, 1.0)),
        Scenario::new("Key Programs")
            .described("Basic plus a 50% appropriation floor for key programs")
            .extending("Basic")
            .with(ConstraintSpec::funding_floor(KEY_PROGRAMS, 0.5)),
        Scenario::new("Combined")
            .described("Category Limits plus the key program floor")
            .extending("Category Limits")
            .with(ConstraintSpec::funding_floor(KEY_PROGRAMS, 0.5)),
    ]
}

/// Reference and analysis scenarios together
pub fn default_scenario_set() -> ScenarioSet {
    ScenarioSet::from_distinct(builtin_scenarios())
}

fn builtin_scenarios() -> Vec<Scenario> {
    reference_scenarios().into_iter().chain(analysis_scenarios()).collect()
}
