//! Aggregate limits derived from a ledger.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ledger::{GroupBy, Ledger};

/// Pure derivations over a [`Ledger`].
///
/// Nothing is cached: every call re-reads the ledger. Groups with no rows are
/// absent from the returned maps rather than zero-filled.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintCatalog<'a> {
    ledger: &'a Ledger,
}

impl<'a> ConstraintCatalog<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger }
    }

    /// Sum of prior-year actuals by department
    pub fn department_actual_totals(&self) -> BTreeMap<String, f64> {
        self.ledger
            .aggregate_by(GroupBy::Department)
            .into_iter()
            .map(|(dept, t)| (dept, t.prior_actual))
            .collect()
    }

    /// Sum of current appropriations by department
    pub fn department_appropriation_totals(&self) -> BTreeMap<String, f64> {
        self.ledger
            .aggregate_by(GroupBy::Department)
            .into_iter()
            .map(|(dept, t)| (dept, t.current_appropriation))
            .collect()
    }

    /// Mean prior-year actual per row, by expense category
    pub fn category_actual_means(&self) -> BTreeMap<String, f64> {
        self.ledger
            .aggregate_by(GroupBy::Category)
            .into_iter()
            .filter(|(_, t)| t.rows > 0)
            .map(|(category, t)| (category, t.prior_actual / t.rows as f64))
            .collect()
    }

    /// Sum of proposed budgets by expense category
    pub fn category_proposed_totals(&self) -> BTreeMap<String, f64> {
        self.ledger
            .aggregate_by(GroupBy::Category)
            .into_iter()
            .map(|(category, t)| (category, t.proposed_budget))
            .collect()
    }

    /// Sum of proposed budgets across the whole ledger
    pub fn total_proposed_budget(&self) -> f64 {
        self.ledger.items().iter().map(|item| item.proposed_budget).sum()
    }
}

/// Snapshot of every catalog derivation.
///
/// Taken once per build (or once per batch) and shared by every constraint
/// that needs a limit, so composed scenarios never derive the same limits twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Limits {
    pub department_actual: BTreeMap<String, f64>,
    pub department_appropriation: BTreeMap<String, f64>,
    pub category_actual_mean: BTreeMap<String, f64>,
    pub category_proposed: BTreeMap<String, f64>,
    pub total_proposed: f64,
}

impl Limits {
    pub fn derive(catalog: &ConstraintCatalog<'_>) -> Self {
        Self {
            department_actual: catalog.department_actual_totals(),
            department_appropriation: catalog.department_appropriation_totals(),
            category_actual_mean: catalog.category_actual_means(),
            category_proposed: catalog.category_proposed_totals(),
            total_proposed: catalog.total_proposed_budget(),
        }
    }

    pub fn from_ledger(ledger: &Ledger) -> Self {
        Self::derive(&ConstraintCatalog::new(ledger))
    }
}
