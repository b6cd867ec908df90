//! Scenario definitions and `extends` composition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;

fn one() -> f64 {
    1.0
}

/// Which groups a cap applies to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum Selection {
    /// Every group present in the ledger
    #[default]
    All,
    /// Only the named groups; names with no decision variables are skipped
    Only(Vec<String>),
}

impl Selection {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::from(names.into_iter().map(Into::into).collect::<Vec<String>>())
    }

    pub fn includes(&self, name: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

impl From<Vec<String>> for Selection {
    fn from(names: Vec<String>) -> Self {
        if names.is_empty() {
            Selection::All
        } else {
            Selection::Only(names)
        }
    }
}

impl From<Selection> for Vec<String> {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::All => Vec::new(),
            Selection::Only(names) => names,
        }
    }
}

/// Basis for a department cap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartmentLimit {
    /// Sum of prior-year actuals for the department
    PriorActual,
    /// Sum of current appropriations for the department
    Appropriation,
    /// The same fixed amount for every selected department
    Fixed(f64),
}

/// Basis for a category cap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryLimit {
    /// Mean prior-year actual per row in the category
    ActualMean,
    /// Sum of proposed budgets in the category
    ProposedTotal,
    /// The ledger's total proposed budget; use the multiplier as the share
    ShareOfTotal,
    /// The same fixed amount for every selected category
    Fixed(f64),
}

/// One family of constraints, parameterized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintFamily {
    /// Sum of all allocations <= multiplier * total proposed budget
    TotalCap {
        #[serde(default = "one")]
        multiplier: f64,
    },
    /// Per department: sum of its allocations <= multiplier * limit
    DepartmentCap {
        #[serde(default)]
        departments: Selection,
        limit: DepartmentLimit,
        #[serde(default = "one")]
        multiplier: f64,
    },
    /// Per category: sum of its allocations <= multiplier * limit
    CategoryCap {
        #[serde(default)]
        categories: Selection,
        limit: CategoryLimit,
        #[serde(default = "one")]
        multiplier: f64,
    },
    /// Every line of the named programs >= percent * its current appropriation
    FundingFloor { programs: Vec<String>, percent: f64 },
}

/// A named, composable constraint unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    /// Prefix for generated constraint names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub family: ConstraintFamily,
}

impl ConstraintSpec {
    pub fn new(family: ConstraintFamily) -> Self {
        Self { label: None, family }
    }

    pub fn total_cap(multiplier: f64) -> Self {
        Self::new(ConstraintFamily::TotalCap { multiplier })
    }

    pub fn department_cap(limit: DepartmentLimit, multiplier: f64) -> Self {
        Self::department_cap_for(Selection::All, limit, multiplier)
    }

    pub fn department_cap_for(departments: Selection, limit: DepartmentLimit, multiplier: f64) -> Self {
        Self::new(ConstraintFamily::DepartmentCap {
            departments,
            limit,
            multiplier,
        })
    }

    pub fn category_cap(limit: CategoryLimit, multiplier: f64) -> Self {
        Self::category_cap_for(Selection::All, limit, multiplier)
    }

    pub fn category_cap_for(categories: Selection, limit: CategoryLimit, multiplier: f64) -> Self {
        Self::new(ConstraintFamily::CategoryCap {
            categories,
            limit,
            multiplier,
        })
    }

    pub fn funding_floor<I, S>(programs: I, percent: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ConstraintFamily::FundingFloor {
            programs: programs.into_iter().map(Into::into).collect(),
            percent,
        })
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Display for ConstraintSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "[{}] ", label)?;
        }
        match &self.family {
            ConstraintFamily::TotalCap { multiplier } => {
                write!(f, "total <= {} x total proposed", multiplier)
            }
            ConstraintFamily::DepartmentCap { departments, limit, multiplier } => {
                write!(f, "each department{} <= {} x {}", selection_suffix(departments), multiplier, limit_name_dept(limit))
            }
            ConstraintFamily::CategoryCap { categories, limit, multiplier } => {
                write!(f, "each category{} <= {} x {}", selection_suffix(categories), multiplier, limit_name_cat(limit))
            }
            ConstraintFamily::FundingFloor { programs, percent } => {
                write!(f, "lines of {} >= {} x appropriation", programs.join(", "), percent)
            }
        }
    }
}

fn selection_suffix(selection: &Selection) -> String {
    match selection {
        Selection::All => String::new(),
        Selection::Only(names) => format!(" in [{}]", names.join(", ")),
    }
}

fn limit_name_dept(limit: &DepartmentLimit) -> String {
    match limit {
        DepartmentLimit::PriorActual => "prior actual".to_string(),
        DepartmentLimit::Appropriation => "appropriation".to_string(),
        DepartmentLimit::Fixed(v) => format!("{:.2}", v),
    }
}

fn limit_name_cat(limit: &CategoryLimit) -> String {
    match limit {
        CategoryLimit::ActualMean => "mean prior actual".to_string(),
        CategoryLimit::ProposedTotal => "proposed total".to_string(),
        CategoryLimit::ShareOfTotal => "grand total".to_string(),
        CategoryLimit::Fixed(v) => format!("{:.2}", v),
    }
}

/// A named LP definition over the ledger's decision variables.
///
/// The objective is fixed (maximize total allocation); a scenario only
/// contributes constraints, optionally on top of a base scenario's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            extends: None,
            constraints: Vec::new(),
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn extending(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    pub fn with(mut self, spec: ConstraintSpec) -> Self {
        self.constraints.push(spec);
        self
    }
}

/// Scenarios in declaration order, resolvable through `extends`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioSet {
    scenarios: Vec<Scenario>,
}

impl ScenarioSet {
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, ScenarioError> {
        let mut set = Self::default();
        for scenario in scenarios {
            set.add(scenario)?;
        }
        Ok(set)
    }

    /// Built-in lists only: skips the duplicate-name check
    pub(crate) fn from_distinct(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }

    pub fn add(&mut self, scenario: Scenario) -> Result<(), ScenarioError> {
        if self.get(&scenario.name).is_some() {
            return Err(ScenarioError::DuplicateScenario(scenario.name));
        }
        self.scenarios.push(scenario);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Scenario names from the root base down to `name`
    pub fn chain(&self, name: &str) -> Result<Vec<&Scenario>, ScenarioError> {
        let mut chain: Vec<&Scenario> = Vec::new();
        let mut current = Some(name);

        while let Some(n) = current {
            let scenario = self
                .get(n)
                .ok_or_else(|| ScenarioError::UnknownScenario(n.to_string()))?;
            if chain.iter().any(|s| s.name == scenario.name) {
                let mut names: Vec<&str> = chain.iter().map(|s| s.name.as_str()).collect();
                names.push(n);
                return Err(ScenarioError::CircularExtends(names.join(" -> ")));
            }
            chain.push(scenario);
            current = scenario.extends.as_deref();
        }

        chain.reverse();
        Ok(chain)
    }

    /// Full constraint list: the base's constraints first, then each extension's
    pub fn resolve(&self, name: &str) -> Result<Vec<ConstraintSpec>, ScenarioError> {
        Ok(self
            .chain(name)?
            .into_iter()
            .flat_map(|s| s.constraints.iter().cloned())
            .collect())
    }
}
