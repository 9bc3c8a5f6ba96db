//! Analytic projection of the continuous-compounding-with-contributions model
//!
//! `f(t) = P·e^(rt) + (C/r)·(e^(rt) − 1)` with `t` in years. Projection uses
//! 365-day years; fitting uses 365.25-day years. The two differ on purpose.

use chrono::NaiveDate;

use super::series::NetWorthSeries;
use super::simulator::{horizon_for_years, DAYS_PER_YEAR};
use crate::scenario::FitParameters;

/// Smallest rate magnitude the model is evaluated at
pub const RATE_FLOOR: f64 = 1e-8;

/// Keep a rate away from zero, preserving its sign (zero snaps positive)
pub fn clamp_rate(rate: f64, floor: f64) -> f64 {
    if rate.abs() < floor {
        if rate < 0.0 {
            -floor
        } else {
            floor
        }
    } else {
        rate
    }
}

/// Model value after `years` years
pub fn model_value(parameters: &FitParameters, years: f64) -> f64 {
    let rate = parameters.rate;
    let growth = (rate * years).exp();
    parameters.initial_money * growth + parameters.yearly_contribution / rate * (growth - 1.0)
}

/// Daily sampler of the closed-form model
#[derive(Debug, Clone, Copy)]
pub struct ClosedFormProjector {
    horizon_days: u32,
}

impl ClosedFormProjector {
    pub fn new(horizon_days: u32) -> Self {
        Self { horizon_days }
    }

    pub fn for_years(years: u32) -> Option<Self> {
        horizon_for_years(years).map(Self::new)
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    /// Sample the model once per day from `start`
    pub fn project(&self, parameters: &FitParameters, start: NaiveDate) -> NetWorthSeries {
        let parameters = FitParameters {
            rate: clamp_rate(parameters.rate, RATE_FLOOR),
            ..*parameters
        };

        let mut series = NetWorthSeries::with_capacity(self.horizon_days as usize);
        for (day, date) in start.iter_days().take(self.horizon_days as usize).enumerate() {
            let years = day as f64 / DAYS_PER_YEAR as f64;
            series.add_point(date, model_value(&parameters, years));
        }
        series
    }
}
