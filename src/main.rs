//! Money Sim CLI
//!
//! Loads a scenario document, derives every scenario and prints a summary per scenario

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, ValueEnum, ValueHint};

use money_sim::output::save_datasets_csv;
use money_sim::scenario::{load_scenarios, save_scenarios, DEFAULT_SCENARIOS_PATH};
use money_sim::{chart_datasets, Coordinator, FitMethod, PropagationMode, SimulationConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    /// Gradient descent
    Gd,
    /// Levenberg-Marquardt
    Lm,
}

impl From<Method> for FitMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Gd => FitMethod::GradientDescent,
            Method::Lm => FitMethod::LevenbergMarquardt,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Net worth scenario simulator", long_about = None)]
struct Cli {
    /// Scenario document (JSON array of scenarios)
    #[arg(default_value = DEFAULT_SCENARIOS_PATH, value_hint = ValueHint::FilePath)]
    scenarios: PathBuf,

    /// Simulation horizon in years
    #[arg(long)]
    years: Option<u32>,

    /// First simulated day (YYYY-MM-DD); today when omitted
    #[arg(long)]
    start: Option<NaiveDate>,

    /// JSON file with configuration overrides
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Only re-derive direct dependents on edits
    #[arg(long, action = ArgAction::SetTrue)]
    single_hop: bool,

    /// Project fits from their stored parameters instead of refitting
    #[arg(long, action = ArgAction::SetTrue)]
    use_cached_fits: bool,

    /// Fitting method
    #[arg(long, value_enum)]
    method: Option<Method>,

    /// Write the derived series as CSV
    #[arg(long, value_hint = ValueHint::FilePath)]
    csv: Option<PathBuf>,

    /// Save the scenario document, including fitted parameters
    #[arg(long, value_hint = ValueHint::FilePath)]
    save: Option<PathBuf>,
}

fn build_config(cli: &Cli) -> Result<SimulationConfig> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_json_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SimulationConfig::default(),
    };

    if let Some(years) = cli.years {
        config.simulation_years = years;
    }
    if cli.start.is_some() {
        config.start_date = cli.start;
    }
    if cli.single_hop {
        config.propagation = PropagationMode::SingleHop;
    }
    if let Some(method) = cli.method {
        config.fit.method = method.into();
    }

    config.validate().context("invalid simulation settings")?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("Money Sim v{}", env!("CARGO_PKG_VERSION"));
    println!("==============\n");

    let config = build_config(&cli)?;
    let start = Instant::now();
    let store = load_scenarios(&cli.scenarios)
        .with_context(|| format!("failed to load scenarios from {}", cli.scenarios.display()))?;
    println!("Loaded {} scenarios in {:?}", store.len(), start.elapsed());

    let compute_start = Instant::now();
    let mut coordinator = Coordinator::new(store, config)?;
    let report = if cli.use_cached_fits {
        coordinator.refresh()
    } else {
        coordinator.recompute_all(true)
    };
    println!(
        "Derived {} scenarios ({} refitted) in {:?}\n",
        report.recomputed.len(),
        report.refitted.len(),
        compute_start.elapsed()
    );

    println!(
        "{:<20} {:<9} {:>11} {:>11} {:>14} {:>14}",
        "Scenario", "Kind", "Start", "End", "Start value", "Final value"
    );
    println!("{}", "-".repeat(84));

    for scenario in coordinator.store().iter() {
        match coordinator.series(&scenario.id) {
            Some(series) => {
                let summary = series.summary();
                println!(
                    "{:<20} {:<9} {:>11} {:>11} {:>14.2} {:>14.2}",
                    scenario.id.as_str(),
                    scenario.kind_tag().to_string(),
                    summary.start_date.map(|d| d.to_string()).unwrap_or_default(),
                    summary.end_date.map(|d| d.to_string()).unwrap_or_default(),
                    summary.start_value,
                    summary.final_value
                );
            }
            None => {
                let reason = coordinator
                    .failure(&scenario.id)
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                println!("{:<20} {:<9} FAILED: {}", scenario.id.as_str(), scenario.kind_tag().to_string(), reason);
            }
        }
    }

    for id in &report.refitted {
        let parameters = coordinator.effective_parameters(id)?;
        println!(
            "\nFit '{}': P={:.2} r={:.6} C={:.2}",
            id, parameters.initial_money, parameters.rate, parameters.yearly_contribution
        );
    }

    if let Some(path) = &cli.csv {
        let datasets = chart_datasets(&coordinator);
        save_datasets_csv(path, &datasets).with_context(|| format!("failed to write {}", path.display()))?;
        println!("\nWrote {} series to {}", datasets.len(), path.display());
    }

    if let Some(path) = &cli.save {
        save_scenarios(path, coordinator.store()).with_context(|| format!("failed to save {}", path.display()))?;
        println!("Saved scenarios to {}", path.display());
    }

    Ok(())
}
