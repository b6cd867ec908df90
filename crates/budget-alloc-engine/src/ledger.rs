use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::source::{LedgerSource, RawRow};

/// One budget line: a (program, expense category, department) row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub cabinet: String,
    pub department: String,
    pub program: String,
    pub expense_category: String,
    #[serde(default)]
    pub fy22_actual: f64,
    /// Previous fiscal year actual spend
    pub prior_actual: f64,
    pub current_appropriation: f64,
    /// Proposed next-year budget, the upper bound candidate for allocation
    pub proposed_budget: f64,
}

impl LineItem {
    pub fn new(
        program: impl Into<String>,
        expense_category: impl Into<String>,
        department: impl Into<String>,
        prior_actual: f64,
        current_appropriation: f64,
        proposed_budget: f64,
    ) -> Self {
        Self {
            cabinet: String::new(),
            department: department.into(),
            program: program.into(),
            expense_category: expense_category.into(),
            fy22_actual: 0.0,
            prior_actual,
            current_appropriation,
            proposed_budget,
        }
    }

    pub fn key(&self) -> LineKey {
        LineKey::new(&self.program, &self.expense_category)
    }
}

/// Decision-variable identity: one per distinct (program, expense category)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub program: String,
    pub category: String,
}

impl LineKey {
    pub fn new(program: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            category: category.into(),
        }
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.program, self.category)
    }
}

/// Summed numeric fields over a set of rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub fy22_actual: f64,
    pub prior_actual: f64,
    pub current_appropriation: f64,
    pub proposed_budget: f64,
    /// Number of rows summed
    pub rows: usize,
}

impl Totals {
    fn add(&mut self, item: &LineItem) {
        self.fy22_actual += item.fy22_actual;
        self.prior_actual += item.prior_actual;
        self.current_appropriation += item.current_appropriation;
        self.proposed_budget += item.proposed_budget;
        self.rows += 1;
    }
}

/// Grouping dimension for [`Ledger::aggregate_by`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Department,
    Category,
    Program,
    Cabinet,
}

impl GroupBy {
    fn key<'a>(&self, item: &'a LineItem) -> &'a str {
        match self {
            GroupBy::Department => &item.department,
            GroupBy::Category => &item.expense_category,
            GroupBy::Program => &item.program,
            GroupBy::Cabinet => &item.cabinet,
        }
    }
}

/// What to do when two rows share a (program, category) key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Sum numeric fields into one decision variable
    #[default]
    Aggregate,
    /// Fail with [`LedgerError::DuplicateKey`]
    Reject,
}

/// Immutable table of budget line items.
///
/// Built once from a source. Besides the raw rows it keeps the per-key
/// aggregates that bound decision variables and a key → department index,
/// so the builder never scans rows to find a variable's department.
#[derive(Debug, Clone)]
pub struct Ledger {
    items: Vec<LineItem>,
    keys: Vec<LineKey>,
    key_index: HashMap<LineKey, usize>,
    aggregates: Vec<Totals>,
    departments: Vec<String>,
    coerced_cells: usize,
}

impl Ledger {
    /// Load with the default duplicate policy (aggregate)
    pub fn load(source: &dyn LedgerSource) -> Result<Self, LedgerError> {
        Self::load_with(source, DuplicatePolicy::default())
    }

    pub fn load_with(source: &dyn LedgerSource, duplicates: DuplicatePolicy) -> Result<Self, LedgerError> {
        let rows = source.read_rows()?;
        let ledger = Self::from_rows(rows, duplicates)?;
        debug!(
            source = %source.describe(),
            rows = ledger.items.len(),
            keys = ledger.keys.len(),
            "ledger loaded"
        );
        Ok(ledger)
    }

    /// Build from raw text rows, coercing numeric cells
    pub fn from_rows(rows: Vec<RawRow>, duplicates: DuplicatePolicy) -> Result<Self, LedgerError> {
        let mut coerced = 0;
        let mut amount = |text: &str| {
            let (value, was_coerced) = parse_amount(text);
            if was_coerced {
                coerced += 1;
            }
            value
        };

        let items: Vec<LineItem> = rows
            .into_iter()
            .map(|row| LineItem {
                // Optional column; absent or blank is not worth a warning
                fy22_actual: parse_amount(&row.fy22_actual).0,
                prior_actual: amount(&row.prior_actual),
                current_appropriation: amount(&row.current_appropriation),
                proposed_budget: amount(&row.proposed_budget),
                cabinet: row.cabinet.trim().to_string(),
                department: row.department.trim().to_string(),
                program: row.program.trim().to_string(),
                expense_category: row.expense_category.trim().to_string(),
            })
            .collect();

        if coerced > 0 {
            warn!(cells = coerced, "non-numeric or missing amounts treated as 0");
        }

        let mut ledger = Self::from_items(items, duplicates)?;
        ledger.coerced_cells += coerced;
        Ok(ledger)
    }

    /// Build from already-typed items. Negative or non-finite amounts become 0.
    pub fn from_items(items: Vec<LineItem>, duplicates: DuplicatePolicy) -> Result<Self, LedgerError> {
        let mut ledger = Ledger {
            items: Vec::with_capacity(items.len()),
            keys: Vec::new(),
            key_index: HashMap::new(),
            aggregates: Vec::new(),
            departments: Vec::new(),
            coerced_cells: 0,
        };

        for mut item in items {
            for value in [
                &mut item.fy22_actual,
                &mut item.prior_actual,
                &mut item.current_appropriation,
                &mut item.proposed_budget,
            ] {
                if !value.is_finite() || *value < 0.0 {
                    *value = 0.0;
                    ledger.coerced_cells += 1;
                }
            }

            let key = item.key();
            match ledger.key_index.get(&key) {
                Some(&idx) => {
                    if duplicates == DuplicatePolicy::Reject {
                        return Err(LedgerError::DuplicateKey {
                            program: key.program,
                            category: key.category,
                        });
                    }
                    if ledger.departments[idx] != item.department {
                        debug!(
                            key = %key,
                            kept = %ledger.departments[idx],
                            ignored = %item.department,
                            "duplicate key spans departments; keeping the first"
                        );
                    }
                    ledger.aggregates[idx].add(&item);
                }
                None => {
                    let mut totals = Totals::default();
                    totals.add(&item);
                    ledger.key_index.insert(key.clone(), ledger.keys.len());
                    ledger.keys.push(key);
                    ledger.aggregates.push(totals);
                    ledger.departments.push(item.department.clone());
                }
            }
            ledger.items.push(item);
        }

        Ok(ledger)
    }

    /// Raw rows in source order
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Decision-variable keys in first-seen order
    pub fn keys(&self) -> &[LineKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cells that were missing, non-numeric, negative or non-finite and read as 0
    pub fn coerced_cells(&self) -> usize {
        self.coerced_cells
    }

    pub fn index_of(&self, key: &LineKey) -> Option<usize> {
        self.key_index.get(key).copied()
    }

    /// Summed figures for one decision-variable key
    pub fn aggregate(&self, key: &LineKey) -> Option<&Totals> {
        self.index_of(key).map(|idx| &self.aggregates[idx])
    }

    /// Aggregate for the key at `index` in [`Ledger::keys`]
    pub fn aggregate_at(&self, index: usize) -> &Totals {
        &self.aggregates[index]
    }

    pub fn department_of(&self, key: &LineKey) -> Option<&str> {
        self.index_of(key).map(|idx| self.departments[idx].as_str())
    }

    /// Department of the key at `index` in [`Ledger::keys`]
    pub fn department_at(&self, index: usize) -> &str {
        &self.departments[index]
    }

    /// Sum every numeric field grouped by `group`
    pub fn aggregate_by(&self, group: GroupBy) -> BTreeMap<String, Totals> {
        let mut out: BTreeMap<String, Totals> = BTreeMap::new();
        for item in &self.items {
            out.entry(group.key(item).to_string()).or_default().add(item);
        }
        out
    }
}

/// Parse a money cell. Returns the value and whether it was replaced by 0.
///
/// Accepts surrounding whitespace, a leading `$` and thousands separators.
/// Empty cells, `#Missing` style markers, anything unparsable and non-finite
/// values are coerced to 0. Negative amounts parse fine but are clamped to 0
/// as a policy, since line items are non-negative; they are counted with the
/// coerced cells so [`Ledger::coerced_cells`] reports every replaced value.
pub fn parse_amount(text: &str) -> (f64, bool) {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => (v, false),
        _ => (0.0, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DelimitedSource;

    fn sample() -> Ledger {
        Ledger::from_items(
            vec![
                LineItem::new("ProgA", "Personnel", "DeptX", 100.0, 120.0, 150.0),
                LineItem::new("ProgB", "Supplies", "DeptX", 50.0, 60.0, 80.0),
                LineItem::new("ProgC", "Personnel", "DeptY", 30.0, 40.0, 45.0),
            ],
            DuplicatePolicy::Aggregate,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("150"), (150.0, false));
        assert_eq!(parse_amount(" $1,234.50 "), (1234.5, false));
        assert_eq!(parse_amount("#Missing"), (0.0, true));
        assert_eq!(parse_amount("###Missing"), (0.0, true));
        assert_eq!(parse_amount(""), (0.0, true));
        assert_eq!(parse_amount("NaN"), (0.0, true));
        assert_eq!(parse_amount("inf"), (0.0, true));
        assert_eq!(parse_amount("-5"), (0.0, true));
    }

    #[test]
    fn test_keys_and_index() {
        let ledger = sample();

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.keys().len(), 3);
        assert_eq!(ledger.keys()[0], LineKey::new("ProgA", "Personnel"));
        assert_eq!(ledger.department_of(&LineKey::new("ProgC", "Personnel")), Some("DeptY"));
        assert_eq!(ledger.department_of(&LineKey::new("ProgZ", "Personnel")), None);
        assert_eq!(ledger.aggregate(&LineKey::new("ProgB", "Supplies")).map(|t| t.proposed_budget), Some(80.0));
    }

    #[test]
    fn test_duplicates_are_summed() {
        let ledger = Ledger::from_items(
            vec![
                LineItem::new("ProgA", "Personnel", "DeptX", 100.0, 120.0, 150.0),
                LineItem::new("ProgA", "Personnel", "DeptY", 10.0, 20.0, 30.0),
            ],
            DuplicatePolicy::Aggregate,
        )
        .unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.keys().len(), 1);
        let totals = ledger.aggregate_at(0);
        assert_eq!(totals.proposed_budget, 180.0);
        assert_eq!(totals.current_appropriation, 140.0);
        assert_eq!(totals.rows, 2);
        // First-seen department wins
        assert_eq!(ledger.department_at(0), "DeptX");
    }

    #[test]
    fn test_duplicates_rejected_in_strict_mode() {
        let err = Ledger::from_items(
            vec![
                LineItem::new("ProgA", "Personnel", "DeptX", 1.0, 1.0, 1.0),
                LineItem::new("ProgA", "Personnel", "DeptX", 1.0, 1.0, 1.0),
            ],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::DuplicateKey { program, category } if program == "ProgA" && category == "Personnel"));
    }

    #[test]
    fn test_aggregate_by_department() {
        let ledger = sample();
        let by_dept = ledger.aggregate_by(GroupBy::Department);

        assert_eq!(by_dept.len(), 2);
        assert_eq!(by_dept["DeptX"].current_appropriation, 180.0);
        assert_eq!(by_dept["DeptX"].rows, 2);
        assert_eq!(by_dept["DeptY"].prior_actual, 30.0);
    }

    #[test]
    fn test_load_coerces_missing_markers() {
        let text = "Dept,Program,ExpenseCategory,FY23ActualExpense,FY24Appropriation,FY25Budget\n\
                    DeptX, ProgA ,Personnel,#Missing,120,150\n\
                    DeptX,ProgB,Supplies,50,,abc\n";
        let ledger = Ledger::load(&DelimitedSource::from_text(text)).unwrap();

        assert_eq!(ledger.coerced_cells(), 3);
        assert_eq!(ledger.items()[0].program, "ProgA");
        assert_eq!(ledger.items()[0].prior_actual, 0.0);
        assert_eq!(ledger.items()[1].current_appropriation, 0.0);
        assert_eq!(ledger.items()[1].proposed_budget, 0.0);
    }

    #[test]
    fn test_negative_items_are_clamped() {
        let ledger = Ledger::from_items(
            vec![LineItem::new("P", "C", "D", -1.0, f64::NAN, 5.0)],
            DuplicatePolicy::Aggregate,
        )
        .unwrap();

        assert_eq!(ledger.items()[0].prior_actual, 0.0);
        assert_eq!(ledger.items()[0].current_appropriation, 0.0);
        assert_eq!(ledger.coerced_cells(), 2);
    }

    #[test]
    fn test_load_counts_clamped_negatives() {
        let text = "Dept,Program,ExpenseCategory,FY23ActualExpense,FY24Appropriation,FY25Budget\n\
                    DeptX,ProgA,Personnel,-40,120,\"-1,500\"\n";
        let ledger = Ledger::load(&DelimitedSource::from_text(text)).unwrap();

        assert_eq!(ledger.coerced_cells(), 2);
        assert_eq!(ledger.items()[0].prior_actual, 0.0);
        assert_eq!(ledger.items()[0].current_appropriation, 120.0);
        assert_eq!(ledger.items()[0].proposed_budget, 0.0);
    }
}
