//! Error types for scenario loading, simulation and fitting

use thiserror::Error;

use crate::scenario::{ScenarioId, ScenarioKindTag};

/// Errors raised by the parameter fitter
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("cannot fit an empty series")]
    EmptySeries,

    #[error("series is not in chronological order at point {index}")]
    UnsortedSeries { index: usize },

    #[error("observation {index} has a non-finite value")]
    NonFiniteObservation { index: usize },

    #[error("parameters became non-finite at iteration {iteration}")]
    Diverged { iteration: usize },

    #[error("fit was superseded before it finished")]
    Cancelled,

    #[error("fit worker stopped: {reason}")]
    WorkerStopped { reason: String },
}

/// Errors raised by the compounding simulator
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("income or cost source '{source_name}' needs a portfolio source to settle into")]
    MissingPortfolio { source_name: String },

    #[error("{count} sources are flagged as portfolio, expected at most one")]
    MultiplePortfolios { count: usize },
}

/// Errors raised by an invalid run configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("a horizon of {years} years does not fit in a day count")]
    HorizonTooLong { years: u32 },
}

/// Errors tied to one scenario of the store
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("duplicate scenario id '{0}'")]
    DuplicateId(ScenarioId),

    #[error("scenario '{0}' not found")]
    NotFound(ScenarioId),

    #[error("scenario '{scenario}' references unknown scenario '{reference}'")]
    UnresolvedReference {
        scenario: ScenarioId,
        reference: ScenarioId,
    },

    #[error("scenario '{scenario}' references '{reference}' which is a {found} scenario, expected {expected}")]
    WrongReferenceKind {
        scenario: ScenarioId,
        reference: ScenarioId,
        expected: ScenarioKindTag,
        found: ScenarioKindTag,
    },

    #[error("scenario '{scenario}' uses unsupported fit type '{fit_type}'")]
    UnsupportedFitType { scenario: ScenarioId, fit_type: String },

    #[error("scenario '{scenario}' has no cached fit parameters")]
    MissingFitParameters { scenario: ScenarioId },

    #[error("scenario '{scenario}' depends on '{upstream}', which failed to derive")]
    UpstreamFailed {
        scenario: ScenarioId,
        upstream: ScenarioId,
    },

    #[error("scenario '{scenario}' has no source at index {index}")]
    SourceNotFound { scenario: ScenarioId, index: usize },

    #[error("invalid patch for scenario '{scenario}': {reason}")]
    InvalidPatch { scenario: ScenarioId, reason: String },

    #[error("simulation of scenario '{scenario}' failed")]
    Simulation {
        scenario: ScenarioId,
        #[source]
        source: SimulationError,
    },

    #[error("fit of scenario '{scenario}' failed")]
    Fit {
        scenario: ScenarioId,
        #[source]
        source: FitError,
    },
}

impl ScenarioError {
    /// Id of the scenario the error is reported against
    pub fn scenario(&self) -> &ScenarioId {
        match self {
            ScenarioError::DuplicateId(id) | ScenarioError::NotFound(id) => id,
            ScenarioError::UnresolvedReference { scenario, .. }
            | ScenarioError::WrongReferenceKind { scenario, .. }
            | ScenarioError::UnsupportedFitType { scenario, .. }
            | ScenarioError::MissingFitParameters { scenario }
            | ScenarioError::UpstreamFailed { scenario, .. }
            | ScenarioError::SourceNotFound { scenario, .. }
            | ScenarioError::InvalidPatch { scenario, .. }
            | ScenarioError::Simulation { scenario, .. }
            | ScenarioError::Fit { scenario, .. } => scenario,
        }
    }
}

/// Errors raised while reading or writing scenario documents and series files
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed scenario document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("row {row}: cannot parse date '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}
