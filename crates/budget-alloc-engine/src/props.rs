//! Property tests over randomly generated ledgers.

use budget_alloc_solver::Solver;
use proptest::prelude::*;

use crate::builder::ScenarioBuilder;
use crate::catalog::Limits;
use crate::ledger::{DuplicatePolicy, Ledger, LineItem};
use crate::outcome::{self, SolveOutcome};
use crate::scenario::{CategoryLimit, ConstraintSpec, DepartmentLimit, Selection};

const CATEGORIES: [&str; 3] = ["Personnel", "Supplies", "Equipment"];

fn line_item() -> impl Strategy<Value = LineItem> {
    (0..5usize, 0..3usize, 0u32..1000, 0u32..1000, 0u32..1000).prop_map(|(p, c, prior, approp, proposed)| {
        LineItem::new(
            format!("Prog{}", p),
            CATEGORIES[c],
            format!("Dept{}", p % 2),
            prior as f64,
            approp as f64,
            proposed as f64,
        )
    })
}

fn ledger() -> impl Strategy<Value = Ledger> {
    prop::collection::vec(line_item(), 1..12)
        .prop_map(|items| Ledger::from_items(items, DuplicatePolicy::Aggregate).unwrap())
}

fn dept_limit() -> impl Strategy<Value = DepartmentLimit> {
    prop_oneof![Just(DepartmentLimit::PriorActual), Just(DepartmentLimit::Appropriation)]
}

fn optimal_values(ledger: &Ledger, specs: &[ConstraintSpec]) -> (Vec<f64>, f64) {
    let built = ScenarioBuilder::new(ledger).build("prop", specs);
    match outcome::solve(&Solver::new(), &built) {
        SolveOutcome::Optimal { values, objective, .. } => (built.keys.iter().map(|k| values[k]).collect(), objective),
        other => panic!("expected optimal, got {:?}", other),
    }
}

fn tolerance(scale: f64) -> f64 {
    1e-6 * scale.max(1.0)
}

proptest! {
    #[test]
    fn prop_total_cap_is_reached(ledger in ledger(), m in 0.1f64..1.0) {
        let total = Limits::from_ledger(&ledger).total_proposed;
        let (values, objective) = optimal_values(&ledger, &[ConstraintSpec::total_cap(m)]);

        let allocated: f64 = values.iter().sum();
        prop_assert!((allocated - m * total).abs() <= tolerance(total));
        prop_assert!((objective - allocated).abs() <= tolerance(total));
        prop_assert!(allocated <= total + tolerance(total));
    }

    #[test]
    fn prop_department_caps_hold(ledger in ledger(), limit in dept_limit(), m in 0.5f64..1.5) {
        let limits = Limits::from_ledger(&ledger);
        let (values, _) = optimal_values(
            &ledger,
            &[ConstraintSpec::total_cap(1.0), ConstraintSpec::department_cap(limit, m)],
        );

        let by_dept = match limit {
            DepartmentLimit::PriorActual => &limits.department_actual,
            _ => &limits.department_appropriation,
        };
        for (dept, cap) in by_dept {
            let spent: f64 = (0..ledger.keys().len())
                .filter(|&idx| ledger.department_at(idx) == dept)
                .map(|idx| values[idx])
                .sum();
            prop_assert!(spent <= m * cap + tolerance(m * cap), "{} spent {} over {}", dept, spent, m * cap);
        }
    }

    #[test]
    fn prop_constraint_order_does_not_change_objective(
        ledger in ledger(),
        m_dept in 0.5f64..1.5,
        share in 0.1f64..0.6,
        rotate in 0usize..3,
    ) {
        let mut specs = vec![
            ConstraintSpec::total_cap(0.9),
            ConstraintSpec::department_cap(DepartmentLimit::Appropriation, m_dept),
            ConstraintSpec::category_cap(CategoryLimit::ShareOfTotal, share),
        ];
        let (_, forward) = optimal_values(&ledger, &specs);
        specs.rotate_left(rotate);
        specs.reverse();
        let (_, shuffled) = optimal_values(&ledger, &specs);

        prop_assert!((forward - shuffled).abs() <= tolerance(forward));
    }

    #[test]
    fn prop_extension_is_feasible_for_base(ledger in ledger(), limit in dept_limit(), m in 0.5f64..1.5) {
        let base = vec![ConstraintSpec::total_cap(1.0)];
        let mut extended = base.clone();
        extended.push(ConstraintSpec::department_cap(limit, m));
        extended.push(ConstraintSpec::category_cap(CategoryLimit::ActualMean, 1.0));

        let (values, extended_objective) = optimal_values(&ledger, &extended);
        let (_, base_objective) = optimal_values(&ledger, &base);

        let base_problem = ScenarioBuilder::new(&ledger).build("base", &base).problem;
        prop_assert!(base_problem.violations(&values, 1e-6).is_empty());
        prop_assert!(extended_objective <= base_objective + tolerance(base_objective));
    }

    #[test]
    fn prop_unrelated_catalog_entry_changes_nothing(ledger in ledger(), ghost in 0.0f64..1e6) {
        let limits = Limits::from_ledger(&ledger);
        let mut padded = limits.clone();
        padded.department_appropriation.insert("Ghost Department".to_string(), ghost);
        padded.category_actual_mean.insert("Ghost Category".to_string(), ghost);

        let specs = [
            ConstraintSpec::total_cap(1.0),
            ConstraintSpec::department_cap_for(Selection::only(["Dept0"]), DepartmentLimit::Appropriation, 1.0),
            ConstraintSpec::category_cap(CategoryLimit::ActualMean, 1.0),
        ];
        let plain = ScenarioBuilder::with_limits(&ledger, &limits).build("s", &specs);
        let with_ghost = ScenarioBuilder::with_limits(&ledger, &padded).build("s", &specs);

        prop_assert_eq!(&plain.problem.constraints, &with_ghost.problem.constraints);
        prop_assert_eq!(plain.skipped, with_ghost.skipped);

        let a = outcome::solve(&Solver::new(), &plain);
        let b = outcome::solve(&Solver::new(), &with_ghost);
        prop_assert_eq!(a, b);
    }
}
