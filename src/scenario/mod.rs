//! Scenario records, the scenario store and document loading

mod data;
mod store;
pub mod loader;

pub use data::{
    DataScenario, FitParameters, FitScenario, FitType, ModifiedScenario, Observation, ParameterDiff,
    Scenario, ScenarioId, ScenarioKind, ScenarioKindTag, Source, SourceType, SourcesScenario,
};
pub use store::{ResolvedFit, ResolvedModified, ScenarioEdit, ScenarioStore};
pub use loader::{
    load_default_scenarios, load_observations_csv, load_scenarios, save_scenarios, DEFAULT_SCENARIOS_PATH,
};
