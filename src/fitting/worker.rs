//! Background fitting so long fits never block the caller
//!
//! At most one fit per scenario is in flight. Submitting a new fit for the
//! same scenario raises the previous one's cancellation flag, and only the
//! latest generation's outcome is ever accepted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::task::JoinHandle;

use super::{FitConfig, Fitter};
use crate::error::FitError;
use crate::scenario::{FitParameters, Observation, ScenarioId};

#[derive(Debug)]
struct InFlight {
    generation: u64,
    cancel: Arc<AtomicBool>,
}

/// Result of a background fit, tagged with the submission it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub scenario: ScenarioId,
    pub generation: u64,
    pub result: Result<FitParameters, FitError>,
}

/// Handle to a fit running on the blocking pool
#[derive(Debug)]
pub struct PendingFit {
    scenario: ScenarioId,
    generation: u64,
    handle: JoinHandle<Result<FitParameters, FitError>>,
}

impl PendingFit {
    pub fn scenario(&self) -> &ScenarioId {
        &self.scenario
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the fit to finish
    pub async fn wait(self) -> FitOutcome {
        let result = match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(FitError::WorkerStopped { reason: e.to_string() }),
        };

        FitOutcome {
            scenario: self.scenario,
            generation: self.generation,
            result,
        }
    }
}

/// Tracks in-flight fits per scenario
#[derive(Debug)]
pub struct FitScheduler {
    fitter: Arc<Fitter>,
    next_generation: u64,
    in_flight: HashMap<ScenarioId, InFlight>,
}

impl FitScheduler {
    pub fn new(config: FitConfig) -> Self {
        Self {
            fitter: Arc::new(Fitter::with_config(config)),
            next_generation: 0,
            in_flight: HashMap::new(),
        }
    }

    /// Start fitting `observations` for `scenario`, superseding any earlier fit
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&mut self, scenario: ScenarioId, observations: Vec<Observation>) -> PendingFit {
        self.cancel(&scenario);

        let generation = self.next_generation;
        self.next_generation += 1;

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let fitter = Arc::clone(&self.fitter);
        let handle = tokio::task::spawn_blocking(move || fitter.fit_cancellable(&observations, &flag));

        debug!("Submitted fit for scenario '{}' (generation {})", scenario, generation);
        self.in_flight.insert(scenario.clone(), InFlight { generation, cancel });

        PendingFit {
            scenario,
            generation,
            handle,
        }
    }

    /// Cancel the in-flight fit of a scenario, if any
    pub fn cancel(&mut self, scenario: &ScenarioId) -> bool {
        match self.in_flight.remove(scenario) {
            Some(previous) => {
                previous.cancel.store(true, Ordering::Relaxed);
                debug!(
                    "Cancelled fit for scenario '{}' (generation {})",
                    scenario, previous.generation
                );
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight fit
    pub fn cancel_all(&mut self) {
        for (scenario, previous) in self.in_flight.drain() {
            previous.cancel.store(true, Ordering::Relaxed);
            debug!(
                "Cancelled fit for scenario '{}' (generation {})",
                scenario, previous.generation
            );
        }
    }

    pub fn is_in_flight(&self, scenario: &ScenarioId) -> bool {
        self.in_flight.contains_key(scenario)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Take the result of a finished fit if it is still the latest for its scenario
    ///
    /// Stale or cancelled submissions yield `None` and must be discarded.
    pub fn accept(&mut self, outcome: FitOutcome) -> Option<Result<FitParameters, FitError>> {
        let current = self
            .in_flight
            .get(&outcome.scenario)
            .is_some_and(|f| f.generation == outcome.generation);

        if !current {
            debug!(
                "Discarding stale fit for scenario '{}' (generation {})",
                outcome.scenario, outcome.generation
            );
            return None;
        }

        self.in_flight.remove(&outcome.scenario);
        Some(outcome.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::tests::synthetic_series;

    fn scenario() -> ScenarioId {
        ScenarioId::from("trend")
    }

    #[tokio::test]
    async fn test_submit_and_accept() {
        let mut scheduler = FitScheduler::new(FitConfig::default());
        let series = synthetic_series(&FitConfig::default().initial_guess, 12);

        let pending = scheduler.submit(scenario(), series);
        assert!(scheduler.is_in_flight(&scenario()));

        let outcome = pending.wait().await;
        let accepted = scheduler.accept(outcome).expect("latest fit is accepted");
        assert_eq!(accepted, Ok(FitConfig::default().initial_guess));
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_resubmit_supersedes_earlier_fit() {
        let mut scheduler = FitScheduler::new(FitConfig::default());
        let slow = synthetic_series(&FitParameters::new(50_000.0, 0.05, 10_000.0), 60);
        let quick = synthetic_series(&FitConfig::default().initial_guess, 12);

        let first = scheduler.submit(scenario(), slow);
        let second = scheduler.submit(scenario(), quick);
        assert!(second.generation() > first.generation());
        assert_eq!(scheduler.in_flight_count(), 1);

        let first_outcome = first.wait().await;
        assert!(scheduler.accept(first_outcome).is_none());

        let second_outcome = second.wait().await;
        assert!(scheduler.accept(second_outcome).is_some());
    }

    #[tokio::test]
    async fn test_cancelled_fit_reports_cancellation() {
        let mut scheduler = FitScheduler::new(FitConfig::default());
        let slow = synthetic_series(&FitParameters::new(50_000.0, 0.05, 10_000.0), 60);

        let pending = scheduler.submit(scenario(), slow);
        assert!(scheduler.cancel(&scenario()));
        assert!(!scheduler.cancel(&scenario()));

        let outcome = pending.wait().await;
        assert_eq!(outcome.result, Err(FitError::Cancelled));
        assert!(scheduler.accept(outcome).is_none());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let mut scheduler = FitScheduler::new(FitConfig::default());
        let slow = synthetic_series(&FitParameters::new(50_000.0, 0.05, 10_000.0), 60);

        let first = scheduler.submit(ScenarioId::from("a"), slow.clone());
        let second = scheduler.submit(ScenarioId::from("b"), slow);
        scheduler.cancel_all();
        assert_eq!(scheduler.in_flight_count(), 0);

        for pending in [first, second] {
            let outcome = pending.wait().await;
            assert_eq!(outcome.result, Err(FitError::Cancelled));
            assert!(scheduler.accept(outcome).is_none());
        }
    }
}
