//! Recomputation of derived series when scenarios change
//!
//! The coordinator owns the scenario store and the derived net worth series.
//! Every edit goes through it, re-derives the edited scenario and then the
//! scenarios downstream of it. A failure in one scenario is recorded against
//! that scenario and never stops its siblings from being derived.
//!
//! Background fits go through the coordinator's own [`FitScheduler`]. Any
//! synchronous refit or failed derivation of a fit cancels its in-flight
//! background fit, so a later edit always wins over an earlier submission.

use std::collections::HashMap;

use chrono::NaiveDate;
use log::{info, warn};
use rayon::prelude::*;
use serde_json::Value;

use crate::config::{PropagationMode, SimulationConfig};
use crate::error::{ConfigError, FitError, ScenarioError};
use crate::fitting::{FitOutcome, FitScheduler, Fitter, PendingFit};
use crate::projection::{ClosedFormProjector, CompoundingSimulator, NetWorthSeries};
use crate::scenario::{
    DataScenario, FitParameters, FitType, Scenario, ScenarioEdit, ScenarioId, ScenarioKind, ScenarioKindTag,
    ScenarioStore,
};

/// Series derived for one scenario, plus parameters if a fit ran
#[derive(Debug, Clone)]
struct Derivation {
    series: NetWorthSeries,
    fitted: Option<FitParameters>,
}

/// What a recomputation touched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecomputeReport {
    /// Scenarios derived successfully, in derivation order
    pub recomputed: Vec<ScenarioId>,

    /// Fit scenarios whose parameters were re-estimated
    pub refitted: Vec<ScenarioId>,

    /// Scenarios that could not be derived
    pub failures: Vec<(ScenarioId, ScenarioError)>,
}

impl RecomputeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the scenario was derived (successfully or not)
    pub fn touched(&self, id: &ScenarioId) -> bool {
        self.recomputed.contains(id) || self.failure(id).is_some()
    }

    pub fn failure(&self, id: &ScenarioId) -> Option<&ScenarioError> {
        self.failures.iter().find(|(f, _)| f == id).map(|(_, e)| e)
    }
}

fn ensure_supported(scenario: &ScenarioId, fit_type: &FitType) -> Result<(), ScenarioError> {
    match fit_type {
        FitType::ContinuousCompoundingWithContributions => Ok(()),
        FitType::Unsupported(tag) => Err(ScenarioError::UnsupportedFitType {
            scenario: scenario.clone(),
            fit_type: tag.clone(),
        }),
    }
}

/// First observation date of the data a fitted model is anchored to
fn anchor_date(scenario: &ScenarioId, data: &DataScenario) -> Result<NaiveDate, ScenarioError> {
    data.data.first().map(|o| o.date).ok_or_else(|| ScenarioError::Fit {
        scenario: scenario.clone(),
        source: FitError::EmptySeries,
    })
}

/// Owns the scenario store and keeps derived series consistent with it
#[derive(Debug)]
pub struct Coordinator {
    store: ScenarioStore,
    config: SimulationConfig,
    start_date: NaiveDate,
    horizon_days: u32,
    fitter: Fitter,
    scheduler: FitScheduler,
    series: HashMap<ScenarioId, NetWorthSeries>,
    failures: HashMap<ScenarioId, ScenarioError>,
}

impl Coordinator {
    /// Create a coordinator; nothing is derived until the first recompute
    pub fn new(store: ScenarioStore, config: SimulationConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            store,
            start_date: config.resolved_start_date(),
            horizon_days: config.horizon_days()?,
            fitter: Fitter::with_config(config.fit),
            scheduler: FitScheduler::new(config.fit),
            config,
            series: HashMap::new(),
            failures: HashMap::new(),
        })
    }

    pub fn store(&self) -> &ScenarioStore {
        &self.store
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Background fits submitted through [`Coordinator::schedule_fit`]
    pub fn scheduler(&self) -> &FitScheduler {
        &self.scheduler
    }

    /// First simulated day of sources scenarios
    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Latest derived series of a scenario
    pub fn series(&self, id: &ScenarioId) -> Option<&NetWorthSeries> {
        self.series.get(id)
    }

    /// Latest derivation error of a scenario
    pub fn failure(&self, id: &ScenarioId) -> Option<&ScenarioError> {
        self.failures.get(id)
    }

    /// Parameters a fit or modified scenario is projected with
    pub fn effective_parameters(&self, id: &ScenarioId) -> Result<FitParameters, ScenarioError> {
        let scenario = self.store.require(id)?;
        match scenario.kind_tag() {
            ScenarioKindTag::Fit => {
                let resolved = self.store.resolve_fit(id)?;
                resolved
                    .fit
                    .parameters
                    .ok_or_else(|| ScenarioError::MissingFitParameters { scenario: id.clone() })
            }
            ScenarioKindTag::Modified => {
                let resolved = self.store.resolve_modified(id)?;
                let base = resolved.fit.parameters.ok_or_else(|| ScenarioError::MissingFitParameters {
                    scenario: resolved.fit_id.clone(),
                })?;
                Ok(base.offset_by(&resolved.modified.diff()))
            }
            found => Err(ScenarioError::WrongReferenceKind {
                scenario: id.clone(),
                reference: id.clone(),
                expected: ScenarioKindTag::Fit,
                found,
            }),
        }
    }

    /// Replace the whole store and recompute everything, refitting every fit
    pub fn import(&mut self, scenarios: Vec<Scenario>) -> Result<RecomputeReport, ScenarioError> {
        self.store.replace_all(scenarios)?;
        info!("Imported {} scenarios", self.store.len());
        Ok(self.recompute_all(true))
    }

    /// Re-derive every scenario, reusing cached fits
    pub fn refresh(&mut self) -> RecomputeReport {
        self.recompute_all(false)
    }

    /// Swap the configuration and re-derive with cached fits
    ///
    /// In-flight background fits ran with the old settings and are cancelled.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<RecomputeReport, ConfigError> {
        self.horizon_days = config.horizon_days()?;
        self.start_date = config.resolved_start_date();
        self.fitter = Fitter::with_config(config.fit);
        self.scheduler.cancel_all();
        self.scheduler = FitScheduler::new(config.fit);
        self.config = config;
        Ok(self.refresh())
    }

    /// Re-derive every scenario, upstream strata first
    ///
    /// Scenarios in the same stratum are independent and derived in parallel;
    /// results are applied in store order.
    pub fn recompute_all(&mut self, force_fits: bool) -> RecomputeReport {
        self.series.clear();
        self.failures.clear();

        let mut report = RecomputeReport::default();
        for stratum in 0..=2 {
            let ids: Vec<ScenarioId> = self
                .store
                .iter()
                .filter(|s| s.kind_tag().stratum() == stratum)
                .map(|s| s.id.clone())
                .collect();

            let results: Vec<(ScenarioId, Result<Derivation, ScenarioError>)> = ids
                .into_par_iter()
                .map(|id| {
                    let result = self.derive(&id, force_fits);
                    (id, result)
                })
                .collect();

            for (id, result) in results {
                self.record(id, result, &mut report);
            }
        }

        info!(
            "Recomputed {} scenarios ({} refitted, {} failed)",
            report.recomputed.len(),
            report.refitted.len(),
            report.failures.len()
        );
        report
    }

    /// Add a scenario and derive it along with anything that was waiting on its id
    pub fn insert(&mut self, scenario: Scenario) -> Result<RecomputeReport, ScenarioError> {
        let id = scenario.id.clone();
        let is_data = scenario.kind_tag() == ScenarioKindTag::Data;
        self.store.insert(scenario)?;

        let mut report = RecomputeReport::default();
        let result = self.derive(&id, false);
        self.record(id.clone(), result, &mut report);
        self.propagate(&id, is_data, Vec::new(), &mut report);
        Ok(report)
    }

    /// Replace a scenario record wholesale
    pub fn replace(&mut self, id: &ScenarioId, scenario: Scenario) -> Result<RecomputeReport, ScenarioError> {
        let edit = self.store.replace(id, scenario)?;
        Ok(self.on_edit(edit))
    }

    /// Apply an editor patch to a scenario record
    pub fn apply_patch(&mut self, id: &ScenarioId, patch: &Value) -> Result<RecomputeReport, ScenarioError> {
        let edit = self.store.apply_patch(id, patch)?;
        Ok(self.on_edit(edit))
    }

    /// Apply an editor patch to one source of a sources scenario
    pub fn patch_source(
        &mut self,
        id: &ScenarioId,
        source_index: usize,
        patch: &Value,
    ) -> Result<RecomputeReport, ScenarioError> {
        let edit = self.store.patch_source(id, source_index, patch)?;
        Ok(self.on_edit(edit))
    }

    /// Delete a scenario; its dependents are re-derived and report the broken link
    pub fn remove(&mut self, id: &ScenarioId) -> Result<RecomputeReport, ScenarioError> {
        self.store.remove(id)?;
        self.scheduler.cancel(id);
        self.series.remove(id);
        self.failures.remove(id);

        let mut report = RecomputeReport::default();
        self.propagate(id, false, Vec::new(), &mut report);
        Ok(report)
    }

    /// Re-derive after an edit that already went through the store
    ///
    /// A fit is refitted when its link or model family changed, or when the
    /// data it is fitted to changed. Cosmetic edits reuse cached parameters.
    pub fn on_edit(&mut self, edit: ScenarioEdit) -> RecomputeReport {
        let id = edit.id().clone();
        let mut report = RecomputeReport::default();

        let mut orphaned = Vec::new();
        if edit.before.id != edit.after.id {
            self.scheduler.cancel(&edit.before.id);
            self.series.remove(&edit.before.id);
            self.failures.remove(&edit.before.id);
            orphaned = self.propagation_targets(&edit.before.id);
        }

        let result = self.derive(&id, edit.invalidates_fit());
        self.record(id.clone(), result, &mut report);
        self.propagate(&id, edit.data_changed(), orphaned, &mut report);
        report
    }

    /// Fit a scenario in the background, superseding any earlier submission
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule_fit(&mut self, id: &ScenarioId) -> Result<PendingFit, ScenarioError> {
        let resolved = self.store.resolve_fit(id)?;
        ensure_supported(id, &resolved.fit.fit_type)?;
        let observations = resolved.data.data.clone();
        Ok(self.scheduler.submit(id.clone(), observations))
    }

    /// Apply a finished background fit if it is still current
    ///
    /// The parameter triple is stored in one step, then the fit and its
    /// downstream scenarios are re-derived. Outcomes superseded by a later
    /// submission or edit return `None`.
    pub fn apply_fit_outcome(&mut self, outcome: FitOutcome) -> Option<RecomputeReport> {
        let id = outcome.scenario.clone();
        let result = self.scheduler.accept(outcome)?;
        let mut report = RecomputeReport::default();

        let derived = result
            .map_err(|source| ScenarioError::Fit {
                scenario: id.clone(),
                source,
            })
            .and_then(|parameters| {
                self.store.set_fit_parameters(&id, parameters)?;
                report.refitted.push(id.clone());
                self.derive(&id, false)
            });

        self.record(id.clone(), derived, &mut report);
        self.propagate(&id, false, Vec::new(), &mut report);
        Some(report)
    }

    fn propagation_targets(&self, id: &ScenarioId) -> Vec<ScenarioId> {
        match self.config.propagation {
            PropagationMode::SingleHop => self.store.dependents(id),
            PropagationMode::Transitive => self.store.descendants(id),
        }
    }

    /// Re-derive the scenarios downstream of `id`
    ///
    /// Direct fit dependents are refitted when `data_changed` is set.
    fn propagate(
        &mut self,
        id: &ScenarioId,
        data_changed: bool,
        mut targets: Vec<ScenarioId>,
        report: &mut RecomputeReport,
    ) {
        for target in self.propagation_targets(id) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        for target in targets {
            let force_fit = data_changed
                && self.store.get(&target).is_some_and(|s| {
                    s.kind_tag() == ScenarioKindTag::Fit && s.reference_id() == Some(id)
                });

            let result = self.derive(&target, force_fit);
            self.record(target, result, report);
        }
    }

    fn record(&mut self, id: ScenarioId, result: Result<Derivation, ScenarioError>, report: &mut RecomputeReport) {
        // Fresh parameters or broken inputs make any in-flight fit stale
        let supersedes_fit = match &result {
            Ok(derivation) => derivation.fitted.is_some(),
            Err(_) => true,
        };
        if supersedes_fit {
            self.scheduler.cancel(&id);
        }

        let outcome = result.and_then(|derivation| {
            if let Some(parameters) = derivation.fitted {
                self.store.set_fit_parameters(&id, parameters)?;
                report.refitted.push(id.clone());
            }
            Ok(derivation.series)
        });

        match outcome {
            Ok(series) => {
                self.failures.remove(&id);
                self.series.insert(id.clone(), series);
                report.recomputed.push(id);
            }
            Err(e) => {
                warn!("Scenario '{}' could not be derived: {}", id, e);
                self.series.remove(&id);
                self.failures.insert(id.clone(), e.clone());
                report.failures.push((id, e));
            }
        }
    }

    /// Compute the series of one scenario from the current store
    fn derive(&self, id: &ScenarioId, force_fit: bool) -> Result<Derivation, ScenarioError> {
        let scenario = self.store.require(id)?;
        let horizon = self.horizon_days;

        match &scenario.kind {
            ScenarioKind::Sources(sources) => {
                let series = CompoundingSimulator::new(horizon)
                    .simulate(sources, self.start_date)
                    .map_err(|source| ScenarioError::Simulation {
                        scenario: id.clone(),
                        source,
                    })?;
                Ok(Derivation { series, fitted: None })
            }
            ScenarioKind::Data(data) => Ok(Derivation {
                series: NetWorthSeries::from_observations(&data.data),
                fitted: None,
            }),
            ScenarioKind::Fit(_) => {
                let resolved = self.store.resolve_fit(id)?;
                ensure_supported(id, &resolved.fit.fit_type)?;

                let (parameters, fitted) = match resolved.fit.parameters {
                    Some(cached) if !force_fit => (cached, None),
                    _ => {
                        let parameters = self.fitter.fit(&resolved.data.data).map_err(|source| ScenarioError::Fit {
                            scenario: id.clone(),
                            source,
                        })?;
                        (parameters, Some(parameters))
                    }
                };

                let start = anchor_date(id, resolved.data)?;
                Ok(Derivation {
                    series: ClosedFormProjector::new(horizon).project(&parameters, start),
                    fitted,
                })
            }
            ScenarioKind::Modified(modified) => {
                if self.failures.contains_key(&modified.reference_id) {
                    return Err(ScenarioError::UpstreamFailed {
                        scenario: id.clone(),
                        upstream: modified.reference_id.clone(),
                    });
                }

                let resolved = self.store.resolve_modified(id)?;
                ensure_supported(id, &resolved.fit.fit_type)?;

                let parameters = self.effective_parameters(id)?;
                let start = anchor_date(id, resolved.data)?;
                Ok(Derivation {
                    series: ClosedFormProjector::new(horizon).project(&parameters, start),
                    fitted: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::{FitConfig, FitMethod};
    use crate::projection::model_value;
    use crate::scenario::{Observation, ParameterDiff, Source, SourceType};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::Days;
    use serde_json::json;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn config(propagation: PropagationMode) -> SimulationConfig {
        SimulationConfig {
            simulation_years: 1,
            start_date: Some(start()),
            propagation,
            fit: FitConfig {
                method: FitMethod::LevenbergMarquardt,
                ..FitConfig::default()
            },
        }
    }

    fn observed(parameters: FitParameters) -> Vec<Observation> {
        let first = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..=24u64)
            .map(|i| {
                let days = 30 * i;
                Observation::new(first + Days::new(days), model_value(&parameters, days as f64 / 365.25))
            })
            .collect()
    }

    fn scenarios() -> Vec<Scenario> {
        vec![
            Scenario::sources(
                "plan",
                "Plan",
                vec![
                    Source::new("Portfolio", SourceType::Income, 0.0, 0.0).as_portfolio(),
                    Source::new("Fund", SourceType::Asset, 1000.0, 0.05),
                ],
            ),
            Scenario::data("history", "History", observed(FitParameters::new(10_000.0, 0.05, 2_000.0))),
            Scenario::data("other", "Other", observed(FitParameters::new(30_000.0, 0.02, 500.0))),
            Scenario::fit("trend", "Trend", "history"),
            Scenario::modified(
                "better",
                "Better",
                "trend",
                ParameterDiff {
                    initial_money_diff: 1_000.0,
                    rate_diff: 0.01,
                    yearly_contribution_diff: 500.0,
                },
            ),
        ]
    }

    fn coordinator(propagation: PropagationMode) -> Coordinator {
        let mut coordinator = Coordinator::new(ScenarioStore::new(), config(propagation)).unwrap();
        let report = coordinator.import(scenarios()).unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);
        coordinator
    }

    fn id(s: &str) -> ScenarioId {
        ScenarioId::from(s)
    }

    #[test]
    fn test_import_derives_every_scenario() {
        let coordinator = coordinator(PropagationMode::Transitive);

        assert_eq!(coordinator.series(&id("plan")).unwrap().len(), 365);
        assert_eq!(coordinator.series(&id("history")).unwrap().len(), 25);
        assert_eq!(coordinator.series(&id("trend")).unwrap().len(), 365);
        assert_eq!(coordinator.series(&id("better")).unwrap().len(), 365);

        let plan = coordinator.series(&id("plan")).unwrap();
        assert_relative_eq!(plan.points[364].value, 1051.27, epsilon = 0.01);

        // Fitted models are anchored at the first observation
        let trend = coordinator.series(&id("trend")).unwrap();
        assert_eq!(trend.points[0].date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());

        let fitted = coordinator.effective_parameters(&id("trend")).unwrap();
        assert_relative_eq!(fitted.rate, 0.05, max_relative = 0.01);
    }

    #[test]
    fn test_modified_offsets_fit_parameters_exactly() {
        let coordinator = coordinator(PropagationMode::Transitive);
        let base = coordinator.effective_parameters(&id("trend")).unwrap();
        let modified = coordinator.effective_parameters(&id("better")).unwrap();

        assert_eq!(modified.initial_money, base.initial_money + 1_000.0);
        assert_eq!(modified.rate, base.rate + 0.01);
        assert_eq!(modified.yearly_contribution, base.yearly_contribution + 500.0);
        assert_eq!(coordinator.series(&id("better")).unwrap().points[0].value, modified.initial_money);
    }

    #[test]
    fn test_cosmetic_edit_reuses_cached_fit() {
        let mut scenarios = scenarios();
        let cached = FitParameters::new(1.0, 0.01, 1.0);
        if let ScenarioKind::Fit(fit) = &mut scenarios[3].kind {
            fit.parameters = Some(cached);
        }

        let store = ScenarioStore::from_scenarios(scenarios).unwrap();
        let mut coordinator = Coordinator::new(store, config(PropagationMode::Transitive)).unwrap();
        let report = coordinator.refresh();
        assert!(report.refitted.is_empty());

        let report = coordinator.apply_patch(&id("trend"), &json!({ "name": "Renamed" })).unwrap();
        assert!(report.refitted.is_empty());
        assert!(report.touched(&id("trend")));
        assert_eq!(coordinator.effective_parameters(&id("trend")).unwrap(), cached);
    }

    #[test]
    fn test_reference_change_forces_refit() {
        let mut coordinator = coordinator(PropagationMode::Transitive);
        let stale = coordinator.effective_parameters(&id("trend")).unwrap();

        let report = coordinator
            .apply_patch(&id("trend"), &json!({ "referenceId": "other" }))
            .unwrap();
        assert_eq!(report.refitted, vec![id("trend")]);

        let refitted = coordinator.effective_parameters(&id("trend")).unwrap();
        assert_ne!(refitted, stale);

        let other = match &coordinator.store().get(&id("other")).unwrap().kind {
            ScenarioKind::Data(data) => data.data.clone(),
            other => panic!("expected data, got {:?}", other),
        };
        assert_eq!(refitted, coordinator.fitter.fit(&other).unwrap());
    }

    #[test]
    fn test_data_edit_refits_dependents() {
        let mut coordinator = coordinator(PropagationMode::Transitive);
        let new_data = observed(FitParameters::new(20_000.0, 0.03, 1_000.0));

        let report = coordinator
            .apply_patch(&id("history"), &json!({ "data": new_data }))
            .unwrap();
        assert_eq!(report.refitted, vec![id("trend")]);
        assert_eq!(report.recomputed, vec![id("history"), id("trend"), id("better")]);

        let fitted = coordinator.effective_parameters(&id("trend")).unwrap();
        assert_relative_eq!(fitted.initial_money, 20_000.0, max_relative = 0.01);
    }

    #[test]
    fn test_propagation_scope() {
        let mut transitive = coordinator(PropagationMode::Transitive);
        let report = transitive
            .apply_patch(&id("history"), &json!({ "color": "blue" }))
            .unwrap();

        assert!(report.touched(&id("history")));
        assert!(report.touched(&id("trend")));
        assert!(report.touched(&id("better")));
        assert!(!report.touched(&id("plan")));
        assert!(!report.touched(&id("other")));
        assert!(report.refitted.is_empty());

        let mut single_hop = coordinator(PropagationMode::SingleHop);
        let report = single_hop
            .apply_patch(&id("history"), &json!({ "color": "blue" }))
            .unwrap();

        assert!(report.touched(&id("trend")));
        assert!(!report.touched(&id("better")));
        assert!(!report.touched(&id("plan")));
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut scenarios = scenarios();
        scenarios.push(Scenario::fit("lost", "Lost", "missing"));
        scenarios.push(Scenario::modified("lost-better", "Lost better", "lost", ParameterDiff::default()));
        scenarios.push(Scenario::sources(
            "no-portfolio",
            "No portfolio",
            vec![Source::new("Salary", SourceType::Income, 1000.0, 0.0)],
        ));

        let mut coordinator = Coordinator::new(ScenarioStore::new(), config(PropagationMode::Transitive)).unwrap();
        let report = coordinator.import(scenarios).unwrap();

        assert_eq!(report.failures.len(), 3);
        assert!(matches!(
            report.failure(&id("lost")),
            Some(ScenarioError::UnresolvedReference { .. })
        ));
        assert!(matches!(
            report.failure(&id("lost-better")),
            Some(ScenarioError::UpstreamFailed { .. })
        ));
        assert!(matches!(
            coordinator.failure(&id("no-portfolio")),
            Some(ScenarioError::Simulation {
                source: crate::error::SimulationError::MissingPortfolio { .. },
                ..
            })
        ));

        for ok in ["plan", "history", "other", "trend", "better"] {
            assert!(coordinator.series(&id(ok)).is_some(), "{} should be derived", ok);
        }
        assert!(coordinator.series(&id("lost")).is_none());
    }

    #[test]
    fn test_unsupported_fit_type_is_reported() {
        let mut coordinator = coordinator(PropagationMode::Transitive);
        let report = coordinator
            .apply_patch(&id("trend"), &json!({ "fitType": "logistic" }))
            .unwrap();

        assert_eq!(
            report.failure(&id("trend")),
            Some(&ScenarioError::UnsupportedFitType {
                scenario: id("trend"),
                fit_type: "logistic".into(),
            })
        );
        assert!(report.failure(&id("better")).is_some());
    }

    #[test]
    fn test_remove_breaks_dependents() {
        let mut coordinator = coordinator(PropagationMode::Transitive);
        let report = coordinator.remove(&id("history")).unwrap();

        assert!(matches!(
            report.failure(&id("trend")),
            Some(ScenarioError::UnresolvedReference { .. })
        ));
        assert!(coordinator.series(&id("history")).is_none());
        assert!(coordinator.series(&id("better")).is_none());
    }

    #[test]
    fn test_insert_resolves_waiting_scenarios() {
        let mut coordinator = coordinator(PropagationMode::Transitive);
        coordinator.remove(&id("history")).unwrap();

        let report = coordinator
            .insert(Scenario::data("history", "History", observed(FitParameters::new(10_000.0, 0.05, 2_000.0))))
            .unwrap();

        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.refitted, vec![id("trend")]);
        assert!(coordinator.series(&id("better")).is_some());
    }

    #[test]
    fn test_default_descent_refits_on_reference_change() {
        let priors = FitConfig::default().initial_guess;
        let single_date = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        let scenarios = vec![
            Scenario::data("at-priors", "At priors", observed(priors)),
            Scenario::data("single", "Single", vec![Observation::new(single_date, 1000.0)]),
            Scenario::fit("trend", "Trend", "at-priors"),
            Scenario::modified(
                "better",
                "Better",
                "trend",
                ParameterDiff {
                    initial_money_diff: 500.0,
                    rate_diff: 0.0,
                    yearly_contribution_diff: -1_000.0,
                },
            ),
        ];

        let config = SimulationConfig {
            fit: FitConfig::default(),
            ..config(PropagationMode::Transitive)
        };
        let mut coordinator = Coordinator::new(ScenarioStore::new(), config).unwrap();
        let report = coordinator.import(scenarios).unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(coordinator.effective_parameters(&id("trend")).unwrap(), priors);

        let report = coordinator
            .apply_patch(&id("trend"), &json!({ "referenceId": "single" }))
            .unwrap();
        assert_eq!(report.refitted, vec![id("trend")]);
        assert!(report.touched(&id("better")));

        let fitted = coordinator.effective_parameters(&id("trend")).unwrap();
        assert_abs_diff_eq!(fitted.initial_money, 1000.0, epsilon = 0.01);
        assert_eq!(fitted.rate, priors.rate);
        assert_eq!(fitted.yearly_contribution, priors.yearly_contribution);

        let trend = coordinator.series(&id("trend")).unwrap();
        assert_eq!(trend.points[0].date, single_date);

        let better = coordinator.series(&id("better")).unwrap();
        assert_eq!(better.points[0].value, fitted.initial_money + 500.0);
    }

    #[tokio::test]
    async fn test_background_fit_updates_dependents() {
        let mut coordinator = coordinator(PropagationMode::Transitive);

        coordinator
            .apply_patch(&id("history"), &json!({ "data": observed(FitParameters::new(5_000.0, 0.04, 3_000.0)) }))
            .unwrap();

        let pending = coordinator.schedule_fit(&id("trend")).unwrap();
        assert!(coordinator.scheduler().is_in_flight(&id("trend")));
        let outcome = pending.wait().await;
        let report = coordinator.apply_fit_outcome(outcome).unwrap();

        assert_eq!(report.refitted, vec![id("trend")]);
        assert!(report.touched(&id("better")));
        assert!(!coordinator.scheduler().is_in_flight(&id("trend")));
        let fitted = coordinator.effective_parameters(&id("trend")).unwrap();
        assert_relative_eq!(fitted.initial_money, 5_000.0, max_relative = 0.01);
    }

    #[tokio::test]
    async fn test_reference_edit_supersedes_background_fit() {
        let mut coordinator = coordinator(PropagationMode::Transitive);
        let pending = coordinator.schedule_fit(&id("trend")).unwrap();

        coordinator
            .apply_patch(&id("trend"), &json!({ "referenceId": "other" }))
            .unwrap();
        assert!(!coordinator.scheduler().is_in_flight(&id("trend")));

        let fresh = coordinator.effective_parameters(&id("trend")).unwrap();
        assert_relative_eq!(fresh.initial_money, 30_000.0, max_relative = 0.01);
        let fresh_series = coordinator.series(&id("trend")).unwrap().clone();

        let outcome = pending.wait().await;
        assert!(coordinator.apply_fit_outcome(outcome).is_none());

        assert_eq!(coordinator.effective_parameters(&id("trend")).unwrap(), fresh);
        assert_eq!(coordinator.series(&id("trend")), Some(&fresh_series));
    }

    #[tokio::test]
    async fn test_data_edit_supersedes_background_fit() {
        let mut coordinator = coordinator(PropagationMode::SingleHop);
        let pending = coordinator.schedule_fit(&id("trend")).unwrap();

        let new_data = observed(FitParameters::new(20_000.0, 0.03, 1_000.0));
        coordinator
            .apply_patch(&id("history"), &json!({ "data": new_data }))
            .unwrap();
        assert!(!coordinator.scheduler().is_in_flight(&id("trend")));
        let fresh = coordinator.effective_parameters(&id("trend")).unwrap();

        let outcome = pending.wait().await;
        assert!(coordinator.apply_fit_outcome(outcome).is_none());
        assert_eq!(coordinator.effective_parameters(&id("trend")).unwrap(), fresh);
        assert_relative_eq!(fresh.initial_money, 20_000.0, max_relative = 0.01);
    }

    #[tokio::test]
    async fn test_cosmetic_edit_keeps_background_fit() {
        let mut coordinator = coordinator(PropagationMode::Transitive);
        let pending = coordinator.schedule_fit(&id("trend")).unwrap();

        coordinator
            .apply_patch(&id("trend"), &json!({ "name": "Renamed" }))
            .unwrap();
        assert!(coordinator.scheduler().is_in_flight(&id("trend")));

        let outcome = pending.wait().await;
        assert!(coordinator.apply_fit_outcome(outcome).is_some());
    }
}
