//! Parameter fitting of the continuous-compounding-with-contributions model
//!
//! The default method is batch gradient descent with fixed priors, a fixed
//! learning rate and per-step clipping. Levenberg-Marquardt is available
//! behind [`FitMethod::LevenbergMarquardt`] but never chosen implicitly.
//!
//! # Example
//!
//! ```ignore
//! let fitter = Fitter::new();
//! let parameters = fitter.fit(&observations)?;
//! println!("P={:.2} r={:.4} C={:.2}", parameters.initial_money, parameters.rate, parameters.yearly_contribution);
//! ```

mod gradient;
mod levenberg_marquardt;
mod worker;

pub use gradient::GradientDescentConfig;
pub use levenberg_marquardt::LevenbergMarquardtConfig;
pub use worker::{FitOutcome, FitScheduler, PendingFit};

use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::projection::RATE_FLOOR;
use crate::scenario::{FitParameters, Observation};

/// Fitting algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FitMethod {
    #[default]
    GradientDescent,
    LevenbergMarquardt,
}

/// Configuration shared by both fitting methods
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FitConfig {
    pub method: FitMethod,

    /// Starting point (P, r, C); fixed priors, not derived from data
    pub initial_guess: FitParameters,

    /// Length of a year when converting observation dates to elapsed time
    pub days_per_year: f64,

    /// Rates closer to zero than this are snapped to ±floor
    pub rate_floor: f64,

    pub gradient_descent: GradientDescentConfig,

    pub levenberg_marquardt: LevenbergMarquardtConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            method: FitMethod::GradientDescent,
            initial_guess: FitParameters::new(80_000.0, 0.03, 200_000.0),
            days_per_year: 365.25,
            rate_floor: RATE_FLOOR,
            gradient_descent: GradientDescentConfig::default(),
            levenberg_marquardt: LevenbergMarquardtConfig::default(),
        }
    }
}

/// One observation as (elapsed years, observed value)
#[derive(Debug, Clone, Copy)]
pub(crate) struct SamplePoint {
    pub years: f64,
    pub value: f64,
}

/// Partial derivatives of the model at one point
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModelPartials {
    pub value: f64,
    pub d_initial_money: f64,
    pub d_rate: f64,
    pub d_yearly_contribution: f64,
}

impl ModelPartials {
    pub fn at(parameters: &FitParameters, years: f64) -> Self {
        let p = parameters.initial_money;
        let r = parameters.rate;
        let c = parameters.yearly_contribution;
        let t = years;
        let growth = (r * t).exp();

        Self {
            value: p * growth + c / r * (growth - 1.0),
            d_initial_money: growth,
            d_rate: p * t * growth + c * t * growth / r - c * (growth - 1.0) / (r * r),
            d_yearly_contribution: (growth - 1.0) / r,
        }
    }
}

/// Reject series the fitter cannot handle
///
/// Dates must be non-decreasing and values finite.
pub fn validate_series(observations: &[Observation]) -> Result<(), FitError> {
    if observations.is_empty() {
        return Err(FitError::EmptySeries);
    }

    for (index, observation) in observations.iter().enumerate() {
        if !observation.value.is_finite() {
            return Err(FitError::NonFiniteObservation { index });
        }
        if index > 0 && observation.date < observations[index - 1].date {
            return Err(FitError::UnsortedSeries { index });
        }
    }

    Ok(())
}

/// Convert observations to elapsed years since the first one
pub(crate) fn sample_points(observations: &[Observation], days_per_year: f64) -> Vec<SamplePoint> {
    let Some(first) = observations.first() else {
        return Vec::new();
    };

    observations
        .iter()
        .map(|o| SamplePoint {
            years: (o.date - first.date).num_days() as f64 / days_per_year,
            value: o.value,
        })
        .collect()
}

pub(crate) fn check_cancelled(cancel: Option<&AtomicBool>) -> Result<(), FitError> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(FitError::Cancelled),
        _ => Ok(()),
    }
}

/// Estimates (P, r, C) from an observed series
#[derive(Debug, Clone, Default)]
pub struct Fitter {
    config: FitConfig,
}

impl Fitter {
    /// Create a fitter with the default gradient descent configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit the model to a chronologically ordered series
    ///
    /// Returns the final parameters whether or not the method converged
    /// within its iteration budget.
    pub fn fit(&self, observations: &[Observation]) -> Result<FitParameters, FitError> {
        self.run(observations, None)
    }

    /// Like [`Fitter::fit`], giving up with [`FitError::Cancelled`] once `cancel` is set
    pub fn fit_cancellable(&self, observations: &[Observation], cancel: &AtomicBool) -> Result<FitParameters, FitError> {
        self.run(observations, Some(cancel))
    }

    fn run(&self, observations: &[Observation], cancel: Option<&AtomicBool>) -> Result<FitParameters, FitError> {
        validate_series(observations)?;
        let points = sample_points(observations, self.config.days_per_year);

        let parameters = match self.config.method {
            FitMethod::GradientDescent => gradient::fit(&self.config, &points, cancel)?,
            FitMethod::LevenbergMarquardt => levenberg_marquardt::fit(&self.config, &points, cancel)?,
        };

        debug!(
            "Fitted {} points: P={:.2} r={:.6} C={:.2}",
            points.len(),
            parameters.initial_money,
            parameters.rate,
            parameters.yearly_contribution
        );

        Ok(parameters)
    }
}
