use std::fmt::Display;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use budget_alloc_engine::{BatchReport, ConstraintCatalog, Engine, EngineConfig, GroupBy, Ledger, ResultSet};
use budget_alloc_solver::LpBackend;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "budget-alloc")]
#[command(about = "Solve budget allocation scenarios as linear programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a ledger and summarize it
    Check {
        /// Ledger file (CSV or JSON)
        ledger: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the aggregate limits derived from a ledger
    Limits {
        ledger: PathBuf,
        /// Grouping to print
        #[arg(long, value_enum, default_value = "dept")]
        by: LimitView,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List scenarios with their resolved constraints
    Scenarios {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Solve one scenario
    Solve {
        ledger: PathBuf,
        /// Scenario name
        scenario: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory to write the allocation CSV into
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the result set as JSON
        #[arg(long)]
        json: bool,
    },
    /// Solve every scenario and write one CSV per optimal scenario
    Run {
        ledger: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output directory (defaults to the config's output.dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Solve scenarios in parallel
        #[arg(long)]
        parallel: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LimitView {
    Dept,
    Category,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "budget_alloc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { ledger, config } => {
            let config = load_config(config.as_deref());
            let ledger = load_ledger(&config, &ledger);

            let departments = ledger.aggregate_by(GroupBy::Department);
            let categories = ledger.aggregate_by(GroupBy::Category);
            let programs = ledger.aggregate_by(GroupBy::Program);

            println!("Rows: {}", ledger.len());
            println!("Decision variables: {}", ledger.keys().len());
            println!("Departments: {}", departments.len());
            println!("Programs: {}", programs.len());
            println!("Expense categories: {}", categories.len());
            println!("Coerced cells: {}", ledger.coerced_cells());
            println!();

            let (actual, approp, proposed) = ledger.items().iter().fold((0.0, 0.0, 0.0), |acc, item| {
                (
                    acc.0 + item.prior_actual,
                    acc.1 + item.current_appropriation,
                    acc.2 + item.proposed_budget,
                )
            });
            println!("Prior actual total:   {:>18.2}", actual);
            println!("Appropriation total:  {:>18.2}", approp);
            println!("Proposed total:       {:>18.2}", proposed);
        }
        Commands::Limits { ledger, by, config } => {
            let config = load_config(config.as_deref());
            let ledger = load_ledger(&config, &ledger);
            let catalog = ConstraintCatalog::new(&ledger);

            match by {
                LimitView::Dept => {
                    let approp = catalog.department_appropriation_totals();
                    println!("{:40} {:>18} {:>18}", "Department", "Prior Actual", "Appropriation");
                    for (dept, actual) in catalog.department_actual_totals() {
                        let a = approp.get(&dept).copied().unwrap_or(0.0);
                        println!("{:40} {:>18.2} {:>18.2}", dept, actual, a);
                    }
                }
                LimitView::Category => {
                    let proposed = catalog.category_proposed_totals();
                    println!("{:40} {:>18} {:>18}", "Expense Category", "Mean Actual", "Proposed");
                    for (category, mean) in catalog.category_actual_means() {
                        let p = proposed.get(&category).copied().unwrap_or(0.0);
                        println!("{:40} {:>18.2} {:>18.2}", category, mean, p);
                    }
                }
            }
            println!();
            println!("Total proposed budget: {:.2}", catalog.total_proposed_budget());
        }
        Commands::Scenarios { config } => {
            let config = load_config(config.as_deref());
            let set = config
                .scenario_set()
                .unwrap_or_else(|e| exit_with("Scenario error", e));

            for scenario in set.iter() {
                match &scenario.extends {
                    Some(base) => println!("{} (extends {})", scenario.name, base),
                    None => println!("{}", scenario.name),
                }
                if let Some(desc) = &scenario.description {
                    println!("  {}", desc);
                }
                match set.resolve(&scenario.name) {
                    Ok(specs) => {
                        for spec in specs {
                            println!("  - {}", spec);
                        }
                    }
                    Err(e) => println!("  ! {}", e),
                }
                println!();
            }
        }
        Commands::Solve { ledger, scenario, config, output, json } => {
            let config = load_config(config.as_deref());
            let ledger = load_ledger(&config, &ledger);
            let set = config
                .scenario_set()
                .unwrap_or_else(|e| exit_with("Scenario error", e));
            let engine = Engine::new(&ledger, &set, config.solver.solver());

            let result = engine
                .run_scenario(&scenario)
                .unwrap_or_else(|e| exit_with("Solve failed", e));

            if let Some(dir) = output {
                if let Err(e) = write_result(&dir, &result) {
                    exit_with("Output error", e);
                }
            }

            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(text) => println!("{}", text),
                    Err(e) => exit_with("Cannot serialize result", e),
                }
                return;
            }

            println!("Scenario: {}", result.scenario());
            if let Some(desc) = set.get(&scenario).and_then(|s| s.description.as_deref()) {
                println!("Description: {}", desc);
            }
            println!("Backend: {}", config.solver.solver().name());
            println!("Status: OPTIMAL");
            println!("Total allocated: {:.2}", result.total_allocated());
            println!();

            println!("Allocations:");
            for row in result.nonzero_rows() {
                println!("  {:40} {:30} {:>16.2}", row.program, row.expense_category, row.allocated_amount);
            }

            if !result.binding_constraints().is_empty() {
                println!();
                println!("Binding constraints:");
                for name in result.binding_constraints() {
                    println!("  - {}", name);
                }
            }
        }
        Commands::Run { ledger, config, output, parallel } => {
            let config = load_config(config.as_deref());
            let ledger = load_ledger(&config, &ledger);
            let set = config
                .scenario_set()
                .unwrap_or_else(|e| exit_with("Scenario error", e));
            let engine = Engine::new(&ledger, &set, config.solver.solver());

            let batch = engine.run_all(parallel || config.output.parallel);

            let dir = output.unwrap_or_else(|| config.output.dir.clone());
            let write_errors = write_results(&dir, &batch);

            println!("{}", batch.summary());
            for e in &write_errors {
                eprintln!("Output error: {}", e);
            }

            if !batch.all_optimal() || !write_errors.is_empty() {
                std::process::exit(1);
            }
        }
    }
}

fn exit_with(context: &str, err: impl Display) -> ! {
    eprintln!("{}: {}", context, err);
    std::process::exit(1);
}

fn load_config(path: Option<&Path>) -> EngineConfig {
    EngineConfig::load_or_default(path).unwrap_or_else(|e| exit_with("Config error", e))
}

fn load_ledger(config: &EngineConfig, path: &Path) -> Ledger {
    config
        .ledger
        .load(Some(path))
        .unwrap_or_else(|e| exit_with("Ledger error", e))
}

fn write_result(dir: &Path, result: &ResultSet) -> Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|e| format!("Cannot create {}: {}", dir.display(), e))?;
    let path = dir.join(result.file_name());
    let file = File::create(&path).map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
    result
        .write_csv(BufWriter::new(file))
        .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
    info!(scenario = result.scenario(), path = %path.display(), "wrote allocation");
    Ok(path)
}

/// Write every solved scenario, collecting failures instead of stopping at the first
fn write_results(dir: &Path, batch: &BatchReport) -> Vec<String> {
    batch
        .reports
        .iter()
        .filter_map(|report| report.result.as_ref())
        .filter_map(|result| write_result(dir, result).err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use budget_alloc_engine::{ConstraintSpec, DuplicatePolicy, LineItem, Scenario, ScenarioSet, output_file_name};
    use budget_alloc_solver::Solver;

    fn batch() -> BatchReport {
        let ledger = Ledger::from_items(
            vec![
                LineItem::new("ProgA", "Personnel", "DeptX", 100.0, 120.0, 150.0),
                LineItem::new("ProgB", "Supplies", "DeptX", 50.0, 60.0, 80.0),
            ],
            DuplicatePolicy::Aggregate,
        )
        .unwrap();
        let set = ScenarioSet::new(vec![
            Scenario::new("Full").with(ConstraintSpec::total_cap(1.0)),
            Scenario::new("Half").with(ConstraintSpec::total_cap(0.5)),
            Scenario::new("Broken").extending("Missing"),
        ])
        .unwrap();
        Engine::new(&ledger, &set, Solver::new()).run_all(false)
    }

    fn scratch(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("budget-alloc-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&path);
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn test_write_results_writes_every_optimal_scenario() {
        let batch = batch();
        let dir = scratch("out");

        let errors = write_results(&dir, &batch);
        assert!(errors.is_empty(), "{:?}", errors);
        assert!(dir.join(output_file_name("Full")).is_file());
        assert!(dir.join(output_file_name("Half")).is_file());
        assert!(!dir.join(output_file_name("Broken")).exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_results_keeps_going_after_a_failure() {
        let batch = batch();
        assert!(!batch.all_optimal());

        // A regular file where the output directory should be
        let blocked = scratch("blocked");
        fs::write(&blocked, "").unwrap();

        let errors = write_results(&blocked, &batch);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.starts_with("Cannot create")));

        fs::remove_file(&blocked).unwrap();
    }
}
