//! Linear program construction for a scenario.

use std::borrow::Cow;
use std::collections::BTreeMap;

use budget_alloc_solver::{ConstraintOp, LpProblem};
use tracing::debug;

use crate::catalog::Limits;
use crate::error::ScenarioError;
use crate::ledger::{Ledger, LineKey};
use crate::scenario::{CategoryLimit, ConstraintFamily, ConstraintSpec, DepartmentLimit, ScenarioSet, Selection};

/// An assembled, not yet solved, linear program
#[derive(Debug, Clone)]
pub struct BuiltScenario {
    pub name: String,
    /// Variable keys, in the same order as the problem's variables
    pub keys: Vec<LineKey>,
    pub problem: LpProblem,
    /// Specs or selected groups that contributed no constraint
    pub skipped: usize,
}

/// Builds one [`LpProblem`] per scenario over a shared ledger and limit snapshot
pub struct ScenarioBuilder<'a> {
    ledger: &'a Ledger,
    limits: Cow<'a, Limits>,
}

impl<'a> ScenarioBuilder<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        Self {
            ledger,
            limits: Cow::Owned(Limits::from_ledger(ledger)),
        }
    }

    /// Reuse limits already derived from `ledger`
    pub fn with_limits(ledger: &'a Ledger, limits: &'a Limits) -> Self {
        Self {
            ledger,
            limits: Cow::Borrowed(limits),
        }
    }

    /// Resolve `name` through its `extends` chain and build it
    pub fn build_scenario(&self, scenarios: &ScenarioSet, name: &str) -> Result<BuiltScenario, ScenarioError> {
        let specs = scenarios.resolve(name)?;
        Ok(self.build(name, &specs))
    }

    pub fn build(&self, name: &str, specs: &[ConstraintSpec]) -> BuiltScenario {
        let keys = self.ledger.keys().to_vec();
        let n = keys.len();

        let mut problem = LpProblem::new(keys.iter().map(|k| k.to_string()).collect());
        for idx in 0..n {
            problem.set_upper_bound(idx, self.ledger.aggregate_at(idx).proposed_budget);
        }
        problem.set_objective(vec![1.0; n], false);

        let mut skipped = 0;
        for spec in specs {
            skipped += self.apply(&mut problem, &keys, spec);
        }

        debug!(
            scenario = name,
            variables = n,
            constraints = problem.num_constraints(),
            skipped,
            "built scenario"
        );

        BuiltScenario {
            name: name.to_string(),
            keys,
            problem,
            skipped,
        }
    }

    /// Add the constraints for one spec, returning how many groups were skipped
    fn apply(&self, problem: &mut LpProblem, keys: &[LineKey], spec: &ConstraintSpec) -> usize {
        let n = keys.len();
        let name = |base: String| match &spec.label {
            Some(label) => format!("{}:{}", label, base),
            None => base,
        };

        match &spec.family {
            ConstraintFamily::TotalCap { multiplier } => {
                if n == 0 {
                    return 1;
                }
                problem.add_constraint(
                    name("total_cap".to_string()),
                    vec![1.0; n],
                    ConstraintOp::Le,
                    multiplier * self.limits.total_proposed,
                );
                0
            }
            ConstraintFamily::DepartmentCap { departments, limit, multiplier } => {
                let groups = group_indices(n, |idx| self.ledger.department_at(idx));
                self.add_caps(problem, n, &groups, departments, "dept_cap", &name, |dept| match limit {
                    DepartmentLimit::PriorActual => self.limits.department_actual.get(dept).map(|v| v * multiplier),
                    DepartmentLimit::Appropriation => {
                        self.limits.department_appropriation.get(dept).map(|v| v * multiplier)
                    }
                    DepartmentLimit::Fixed(v) => Some(v * multiplier),
                })
            }
            ConstraintFamily::CategoryCap { categories, limit, multiplier } => {
                let groups = group_indices(n, |idx| keys[idx].category.as_str());
                self.add_caps(problem, n, &groups, categories, "category_cap", &name, |category| match limit {
                    CategoryLimit::ActualMean => self.limits.category_actual_mean.get(category).map(|v| v * multiplier),
                    CategoryLimit::ProposedTotal => self.limits.category_proposed.get(category).map(|v| v * multiplier),
                    CategoryLimit::ShareOfTotal => Some(self.limits.total_proposed * multiplier),
                    CategoryLimit::Fixed(v) => Some(v * multiplier),
                })
            }
            ConstraintFamily::FundingFloor { programs, percent } => {
                let mut skipped = 0;
                for program in programs {
                    let indices: Vec<usize> = (0..n).filter(|&idx| keys[idx].program == *program).collect();
                    if indices.is_empty() {
                        debug!(program = %program, "funding floor names no decision variable");
                        skipped += 1;
                        continue;
                    }
                    for idx in indices {
                        let rhs = percent * self.ledger.aggregate_at(idx).current_appropriation;
                        // x >= 0 already holds
                        if rhs <= 0.0 {
                            continue;
                        }
                        let mut coefficients = vec![0.0; n];
                        coefficients[idx] = 1.0;
                        problem.add_constraint(
                            name(format!("floor[{}]", keys[idx])),
                            coefficients,
                            ConstraintOp::Ge,
                            rhs,
                        );
                    }
                }
                skipped
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_caps(
        &self,
        problem: &mut LpProblem,
        n: usize,
        groups: &BTreeMap<&str, Vec<usize>>,
        selection: &Selection,
        prefix: &str,
        name: &dyn Fn(String) -> String,
        rhs_for: impl Fn(&str) -> Option<f64>,
    ) -> usize {
        let mut skipped = 0;

        if let Selection::Only(names) = selection {
            for missing in names.iter().filter(|g| !groups.contains_key(g.as_str())) {
                debug!(group = %missing, constraint = prefix, "selected group has no decision variables");
                skipped += 1;
            }
        }

        for (group, indices) in groups {
            if !selection.includes(group) {
                continue;
            }
            let Some(rhs) = rhs_for(*group) else {
                debug!(group = %group, constraint = prefix, "no catalog limit for group");
                skipped += 1;
                continue;
            };
            let mut coefficients = vec![0.0; n];
            for &idx in indices {
                coefficients[idx] = 1.0;
            }
            problem.add_constraint(name(format!("{}[{}]", prefix, group)), coefficients, ConstraintOp::Le, rhs);
        }

        skipped
    }
}

/// Variable indices grouped by a label, in label order
fn group_indices<'k>(n: usize, label: impl Fn(usize) -> &'k str) -> BTreeMap<&'k str, Vec<usize>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for idx in 0..n {
        groups.entry(label(idx)).or_default().push(idx);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{DuplicatePolicy, LineItem};
    use crate::scenario::Scenario;
    use budget_alloc_solver::{Solver, SolutionStatus};

    fn two_line_ledger() -> Ledger {
        Ledger::from_items(
            vec![
                LineItem::new("ProgA", "Personnel", "DeptX", 100.0, 120.0, 150.0),
                LineItem::new("ProgB", "Supplies", "DeptX", 50.0, 60.0, 80.0),
            ],
            DuplicatePolicy::Aggregate,
        )
        .unwrap()
    }

    fn three_line_ledger() -> Ledger {
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

    fn names(built: &BuiltScenario) -> Vec<&str> {
        built.problem.constraints.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_variables_bounded_by_proposed_budget() {
        let ledger = two_line_ledger();
        let built = ScenarioBuilder::new(&ledger).build("empty", &[]);

        assert_eq!(built.problem.variables, vec!["ProgA/Personnel", "ProgB/Supplies"]);
        assert_eq!(built.problem.upper_bounds, vec![150.0, 80.0]);
        assert_eq!(built.problem.objective.coefficients, vec![1.0, 1.0]);
        assert!(!built.problem.objective.minimize);
        assert_eq!(built.keys, ledger.keys());
    }

    #[test]
    fn test_total_cap_only() {
        let ledger = two_line_ledger();
        let built = ScenarioBuilder::new(&ledger).build("s", &[ConstraintSpec::total_cap(1.0)]);
        let solution = Solver::new().solve(&built.problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 150.0).abs() < 1e-6);
        assert!((solution.values[1] - 80.0).abs() < 1e-6);
        assert!((solution.objective_value - 230.0).abs() < 1e-6);
    }

    #[test]
    fn test_department_cap_on_appropriation() {
        let ledger = two_line_ledger();
        let built = ScenarioBuilder::new(&ledger).build(
            "s",
            &[
                ConstraintSpec::total_cap(1.0),
                ConstraintSpec::department_cap(DepartmentLimit::Appropriation, 1.0),
            ],
        );
        assert_eq!(names(&built), vec!["total_cap", "dept_cap[DeptX]"]);
        assert_eq!(built.problem.constraints[1].rhs, 180.0);

        let solution = Solver::new().solve(&built.problem);
        assert_eq!(solution.status, SolutionStatus::Optimal);
        let sum: f64 = solution.values.iter().sum();
        assert!((sum - 180.0).abs() < 1e-6);
        assert!(solution.values[0] <= 150.0 + 1e-9);
        assert!(solution.values[1] <= 80.0 + 1e-9);
    }

    #[test]
    fn test_floor_above_fixed_department_cap_is_infeasible() {
        let ledger = two_line_ledger();
        let built = ScenarioBuilder::new(&ledger).build(
            "s",
            &[
                ConstraintSpec::funding_floor(["ProgA"], 0.5),
                ConstraintSpec::department_cap_for(Selection::only(["DeptX"]), DepartmentLimit::Fixed(50.0), 1.0),
            ],
        );
        assert_eq!(names(&built), vec!["floor[ProgA/Personnel]", "dept_cap[DeptX]"]);
        assert_eq!(built.problem.constraints[0].rhs, 60.0);

        let solution = Solver::new().solve(&built.problem);
        assert_eq!(solution.status, SolutionStatus::Infeasible);
        assert!(solution.values.is_empty());
    }

    #[test]
    fn test_department_basis_is_selectable() {
        let ledger = three_line_ledger();
        let builder = ScenarioBuilder::new(&ledger);

        let actual = builder.build("a", &[ConstraintSpec::department_cap(DepartmentLimit::PriorActual, 1.0)]);
        let approp = builder.build("b", &[ConstraintSpec::department_cap(DepartmentLimit::Appropriation, 1.1)]);

        assert_eq!(names(&actual), vec!["dept_cap[DeptX]", "dept_cap[DeptY]"]);
        assert_eq!(actual.problem.constraints[0].rhs, 150.0);
        assert_eq!(actual.problem.constraints[1].rhs, 30.0);
        assert!((approp.problem.constraints[0].rhs - 198.0).abs() < 1e-9);
        assert_eq!(approp.problem.constraints[0].coefficients, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_category_cap_selects_only_its_category() {
        let ledger = three_line_ledger();
        let built = ScenarioBuilder::new(&ledger).build(
            "s",
            &[ConstraintSpec::category_cap(CategoryLimit::ActualMean, 1.0)],
        );

        assert_eq!(names(&built), vec!["category_cap[Personnel]", "category_cap[Supplies]"]);
        let personnel = &built.problem.constraints[0];
        assert_eq!(personnel.coefficients, vec![1.0, 0.0, 1.0]);
        assert_eq!(personnel.rhs, 65.0);
        assert_eq!(built.problem.constraints[1].coefficients, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_category_share_of_total() {
        let ledger = three_line_ledger();
        let built = ScenarioBuilder::new(&ledger).build(
            "s",
            &[ConstraintSpec::category_cap(CategoryLimit::ShareOfTotal, 0.1)],
        );
        for constraint in &built.problem.constraints {
            assert!((constraint.rhs - 27.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_absent_groups_contribute_nothing() {
        let ledger = two_line_ledger();
        let built = ScenarioBuilder::new(&ledger).build(
            "s",
            &[
                ConstraintSpec::department_cap_for(Selection::only(["Nowhere"]), DepartmentLimit::Appropriation, 1.0),
                ConstraintSpec::category_cap_for(Selection::only(["Travel"]), CategoryLimit::ActualMean, 1.0),
                ConstraintSpec::funding_floor(["ProgZ"], 0.5),
            ],
        );

        assert_eq!(built.problem.num_constraints(), 0);
        assert_eq!(built.skipped, 3);
    }

    #[test]
    fn test_zero_floor_adds_no_constraint() {
        let ledger = Ledger::from_items(
            vec![LineItem::new("ProgA", "Personnel", "DeptX", 100.0, 0.0, 150.0)],
            DuplicatePolicy::Aggregate,
        )
        .unwrap();
        let built = ScenarioBuilder::new(&ledger).build("s", &[ConstraintSpec::funding_floor(["ProgA"], 0.5)]);

        assert_eq!(built.problem.num_constraints(), 0);
        assert_eq!(built.skipped, 0);
    }

    #[test]
    fn test_labels_prefix_constraint_names() {
        let ledger = two_line_ledger();
        let built = ScenarioBuilder::new(&ledger).build(
            "s",
            &[ConstraintSpec::total_cap(0.9).labeled("austerity")],
        );
        assert_eq!(names(&built), vec!["austerity:total_cap"]);
        assert!((built.problem.constraints[0].rhs - 207.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_ledger_skips_total_cap() {
        let ledger = Ledger::from_items(Vec::new(), DuplicatePolicy::Aggregate).unwrap();
        let built = ScenarioBuilder::new(&ledger).build("s", &[ConstraintSpec::total_cap(1.0)]);

        assert_eq!(built.problem.num_variables(), 0);
        assert_eq!(built.skipped, 1);
    }

    #[test]
    fn test_build_scenario_resolves_extends() {
        let ledger = two_line_ledger();
        let set = ScenarioSet::new(vec![
            Scenario::new("base").with(ConstraintSpec::total_cap(1.0)),
            Scenario::new("child")
                .extending("base")
                .with(ConstraintSpec::department_cap(DepartmentLimit::Appropriation, 1.0)),
        ])
        .unwrap();

        let limits = Limits::from_ledger(&ledger);
        let builder = ScenarioBuilder::with_limits(&ledger, &limits);
        let built = builder.build_scenario(&set, "child").unwrap();

        assert_eq!(built.name, "child");
        assert_eq!(names(&built), vec!["total_cap", "dept_cap[DeptX]"]);
        assert!(builder.build_scenario(&set, "missing").is_err());
    }
}
