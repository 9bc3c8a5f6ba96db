//! Money Sim - Net worth scenario simulation and trend fitting
//!
//! This library provides:
//! - Daily compounding simulation of income, cost, asset and debt sources
//! - Closed-form projection of the continuous-compounding-with-contributions model
//! - Parameter fitting of that model to observed net worth
//! - A scenario store with validated references between scenarios
//! - Recomputation of derived series when scenarios change

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fitting;
pub mod output;
pub mod projection;
pub mod scenario;

// Re-export commonly used types
pub use config::{PropagationMode, SimulationConfig};
pub use coordinator::{Coordinator, RecomputeReport};
pub use error::{ConfigError, FitError, LoadError, ScenarioError, SimulationError};
pub use fitting::{FitConfig, FitMethod, FitScheduler, Fitter};
pub use output::{chart_datasets, ChartDataset};
pub use projection::{ClosedFormProjector, CompoundingSimulator, NetWorthSeries};
pub use scenario::{FitParameters, Observation, Scenario, ScenarioId, ScenarioStore};
