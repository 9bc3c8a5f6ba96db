//! Batch gradient descent on the sum of squared errors

use std::sync::atomic::AtomicBool;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{check_cancelled, FitConfig, ModelPartials, SamplePoint};
use crate::error::FitError;
use crate::projection::clamp_rate;
use crate::scenario::FitParameters;

/// Hyperparameters of the gradient descent fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GradientDescentConfig {
    /// Step size applied to the mean gradient
    pub learning_rate: f64,

    /// Iteration budget
    pub max_iterations: usize,

    /// Stop once the error changes by less than this between iterations
    pub tolerance: f64,

    /// Largest step per iteration as a fraction of the parameter's magnitude
    pub max_step_ratio: f64,
}

impl Default for GradientDescentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-2,
            max_iterations: 100_000,
            tolerance: 1e-6,
            max_step_ratio: 0.1,
        }
    }
}

/// Limit a step to `ratio` of the parameter's magnitude, keeping its sign
pub(crate) fn clip_step(step: f64, parameter: f64, ratio: f64) -> f64 {
    let limit = ratio * parameter.abs();
    if step.abs() > limit {
        limit.copysign(step)
    } else {
        step
    }
}

/// Run gradient descent from the configured priors
pub(crate) fn fit(
    config: &FitConfig,
    points: &[SamplePoint],
    cancel: Option<&AtomicBool>,
) -> Result<FitParameters, FitError> {
    let settings = &config.gradient_descent;
    let n = points.len() as f64;
    let mut parameters = config.initial_guess;
    let mut previous_error = f64::INFINITY;

    for iteration in 0..settings.max_iterations {
        check_cancelled(cancel)?;

        let mut error = 0.0;
        let mut grad_p = 0.0;
        let mut grad_r = 0.0;
        let mut grad_c = 0.0;

        for point in points {
            let partials = ModelPartials::at(&parameters, point.years);
            let diff = partials.value - point.value;
            error += diff * diff;

            grad_p += 2.0 * diff * partials.d_initial_money;
            grad_r += 2.0 * diff * partials.d_rate;
            grad_c += 2.0 * diff * partials.d_yearly_contribution;
        }

        if !error.is_finite() {
            return Err(FitError::Diverged { iteration });
        }

        if (previous_error - error).abs() < settings.tolerance {
            debug!("Gradient descent converged after {} iterations (sse {:.6e})", iteration, error);
            return Ok(parameters);
        }
        previous_error = error;

        let step_p = clip_step(settings.learning_rate * grad_p / n, parameters.initial_money, settings.max_step_ratio);
        let step_r = clip_step(settings.learning_rate * grad_r / n, parameters.rate, settings.max_step_ratio);
        let step_c = clip_step(
            settings.learning_rate * grad_c / n,
            parameters.yearly_contribution,
            settings.max_step_ratio,
        );

        parameters.initial_money -= step_p;
        parameters.rate = clamp_rate(parameters.rate - step_r, config.rate_floor);
        parameters.yearly_contribution -= step_c;

        if !parameters.is_finite() {
            return Err(FitError::Diverged { iteration });
        }
    }

    debug!(
        "Gradient descent stopped at the {} iteration cap (sse {:.6e})",
        settings.max_iterations, previous_error
    );
    Ok(parameters)
}
