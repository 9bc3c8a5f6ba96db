//! Fit the compounding model to a net worth series from CSV
//!
//! Input columns: `date,value`, dates as YYYY/MM/DD or YYYY-MM-DD

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum, ValueHint};

use money_sim::projection::model_value;
use money_sim::scenario::load_observations_csv;
use money_sim::{FitConfig, FitMethod, Fitter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    /// Gradient descent
    Gd,
    /// Levenberg-Marquardt
    Lm,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Fit P, r and C to an observed net worth series", long_about = None)]
struct Cli {
    /// CSV file with `date,value` rows
    #[arg(value_hint = ValueHint::FilePath)]
    series: PathBuf,

    /// Fitting method
    #[arg(long, value_enum, default_value = "gd")]
    method: Method,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let observations = load_observations_csv(&cli.series)
        .with_context(|| format!("failed to read series from {}", cli.series.display()))?;
    println!("Loaded {} observations from {}", observations.len(), cli.series.display());

    let config = FitConfig {
        method: match cli.method {
            Method::Gd => FitMethod::GradientDescent,
            Method::Lm => FitMethod::LevenbergMarquardt,
        },
        ..FitConfig::default()
    };

    let start = Instant::now();
    let parameters = Fitter::with_config(config).fit(&observations)?;
    println!("Fit complete in {:?}\n", start.elapsed());

    println!("Initial money (P):       {:>14.2}", parameters.initial_money);
    println!("Rate (r):                {:>14.6}", parameters.rate);
    println!("Yearly contribution (C): {:>14.2}", parameters.yearly_contribution);

    if let Some(first) = observations.first() {
        let worst = observations
            .iter()
            .map(|o| {
                let years = (o.date - first.date).num_days() as f64 / config.days_per_year;
                (model_value(&parameters, years) - o.value).abs()
            })
            .fold(0.0, f64::max);
        println!("Largest absolute residual: {:>12.2}", worst);
    }

    Ok(())
}
