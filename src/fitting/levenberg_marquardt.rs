//! Levenberg-Marquardt least squares with the analytic model Jacobian

use std::sync::atomic::AtomicBool;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{check_cancelled, FitConfig, ModelPartials, SamplePoint};
use crate::error::FitError;
use crate::projection::clamp_rate;
use crate::scenario::FitParameters;

/// Diagonal entries below this are lifted before damping
const DIAGONAL_FLOOR: f64 = 1e-12;

/// Configuration for the Levenberg-Marquardt fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LevenbergMarquardtConfig {
    /// Maximum outer iterations
    pub max_iterations: usize,
    /// Stop when the relative drop in squared error falls below this
    pub residual_tolerance: f64,
    /// Stop when every relative parameter step falls below this
    pub parameter_tolerance: f64,
    /// Initial damping parameter (λ)
    pub initial_lambda: f64,
    /// Damping increase factor on a rejected step
    pub lambda_increase: f64,
    /// Damping decrease factor on an accepted step
    pub lambda_decrease: f64,
    /// Give up once damping grows past this
    pub max_lambda: f64,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            residual_tolerance: 1e-12,
            parameter_tolerance: 1e-10,
            initial_lambda: 1e-3,
            lambda_increase: 10.0,
            lambda_decrease: 0.1,
            max_lambda: 1e12,
        }
    }
}

type Matrix3 = [[f64; 3]; 3];

fn to_array(parameters: &FitParameters) -> [f64; 3] {
    [parameters.initial_money, parameters.rate, parameters.yearly_contribution]
}

fn sum_squared_error(parameters: &FitParameters, points: &[SamplePoint]) -> f64 {
    points
        .iter()
        .map(|p| {
            let diff = ModelPartials::at(parameters, p.years).value - p.value;
            diff * diff
        })
        .sum()
}

/// Squared error, JᵀJ and Jᵀr at the current parameters
fn normal_equations(parameters: &FitParameters, points: &[SamplePoint]) -> (f64, Matrix3, [f64; 3]) {
    let mut ssr = 0.0;
    let mut jtj = [[0.0; 3]; 3];
    let mut jtr = [0.0; 3];

    for point in points {
        let partials = ModelPartials::at(parameters, point.years);
        let residual = partials.value - point.value;
        let row = [partials.d_initial_money, partials.d_rate, partials.d_yearly_contribution];

        ssr += residual * residual;
        for i in 0..3 {
            for k in 0..3 {
                jtj[i][k] += row[i] * row[k];
            }
            jtr[i] += row[i] * residual;
        }
    }

    (ssr, jtj, jtr)
}

/// Gaussian elimination with partial pivoting
fn solve(a: Matrix3, b: [f64; 3]) -> Option<[f64; 3]> {
    let mut aug = [[0.0; 4]; 3];
    for i in 0..3 {
        aug[i][..3].copy_from_slice(&a[i]);
        aug[i][3] = b[i];
    }

    for i in 0..3 {
        let pivot = (i..3)
            .max_by(|&x, &y| aug[x][i].abs().total_cmp(&aug[y][i].abs()))
            .unwrap_or(i);
        aug.swap(i, pivot);

        if aug[i][i].abs() < f64::MIN_POSITIVE || !aug[i][i].is_finite() {
            return None;
        }

        for k in (i + 1)..3 {
            let factor = aug[k][i] / aug[i][i];
            for j in i..4 {
                aug[k][j] -= factor * aug[i][j];
            }
        }
    }

    let mut x = [0.0; 3];
    for i in (0..3).rev() {
        x[i] = aug[i][3];
        for j in (i + 1)..3 {
            x[i] -= aug[i][j] * x[j];
        }
        x[i] /= aug[i][i];
    }

    Some(x)
}

/// Run Levenberg-Marquardt from the configured priors
pub(crate) fn fit(
    config: &FitConfig,
    points: &[SamplePoint],
    cancel: Option<&AtomicBool>,
) -> Result<FitParameters, FitError> {
    let settings = &config.levenberg_marquardt;
    let mut parameters = config.initial_guess;
    let mut lambda = settings.initial_lambda;

    for iteration in 0..settings.max_iterations {
        check_cancelled(cancel)?;

        let (ssr, jtj, jtr) = normal_equations(&parameters, points);
        if !ssr.is_finite() {
            return Err(FitError::Diverged { iteration });
        }
        if ssr == 0.0 {
            return Ok(parameters);
        }

        // Marquardt scaling: (JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr
        let accepted = loop {
            let mut damped = jtj;
            for (i, row) in damped.iter_mut().enumerate() {
                row[i] += lambda * jtj[i][i].max(DIAGONAL_FLOOR);
            }

            if let Some(step) = solve(damped, [-jtr[0], -jtr[1], -jtr[2]]) {
                let candidate = FitParameters {
                    initial_money: parameters.initial_money + step[0],
                    rate: clamp_rate(parameters.rate + step[1], config.rate_floor),
                    yearly_contribution: parameters.yearly_contribution + step[2],
                };
                let candidate_ssr = sum_squared_error(&candidate, points);

                if candidate.is_finite() && candidate_ssr < ssr {
                    lambda *= settings.lambda_decrease;
                    break Some((candidate, candidate_ssr, step));
                }
            }

            lambda *= settings.lambda_increase;
            if lambda > settings.max_lambda {
                break None;
            }
        };

        let Some((candidate, candidate_ssr, step)) = accepted else {
            debug!("Levenberg-Marquardt found no improving step at iteration {}", iteration);
            return Ok(parameters);
        };

        let current = to_array(&parameters);
        let largest_relative_step = step
            .iter()
            .zip(current.iter())
            .map(|(s, x)| s.abs() / x.abs().max(DIAGONAL_FLOOR))
            .fold(0.0, f64::max);

        parameters = candidate;

        if ssr - candidate_ssr <= settings.residual_tolerance * ssr
            || largest_relative_step < settings.parameter_tolerance
        {
            debug!("Levenberg-Marquardt converged after {} iterations (sse {:.6e})", iteration + 1, candidate_ssr);
            return Ok(parameters);
        }
    }

    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::tests::synthetic_series;
    use crate::fitting::{FitMethod, Fitter};
    use approx::assert_relative_eq;

    fn lm_fitter() -> Fitter {
        Fitter::with_config(FitConfig {
            method: FitMethod::LevenbergMarquardt,
            ..FitConfig::default()
        })
    }

    #[test]
    fn test_linear_system() {
        let a = [[2.0, 1.0, 0.0], [1.0, 3.0, 0.0], [0.0, 0.0, 4.0]];
        let x = solve(a, [5.0, 5.0, 8.0]).unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], 2.0, epsilon = 1e-12);

        assert!(solve([[0.0; 3]; 3], [1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn test_recovers_known_parameters() {
        for truth in [
            FitParameters::new(50_000.0, 0.05, 10_000.0),
            FitParameters::new(100_000.0, 0.04, 20_000.0),
            FitParameters::new(5_000.0, -0.02, 3_000.0),
        ] {
            let series = synthetic_series(&truth, 60);
            let fitted = lm_fitter().fit(&series).unwrap();

            assert_relative_eq!(fitted.initial_money, truth.initial_money, max_relative = 0.01);
            assert_relative_eq!(fitted.rate, truth.rate, max_relative = 0.01);
            assert_relative_eq!(fitted.yearly_contribution, truth.yearly_contribution, max_relative = 0.01);
        }
    }

    #[test]
    fn test_exact_priors_stop_immediately() {
        let priors = FitConfig::default().initial_guess;
        let series = synthetic_series(&priors, 12);
        assert_eq!(lm_fitter().fit(&series).unwrap(), priors);
    }
}
