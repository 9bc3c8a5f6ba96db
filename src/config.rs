//! Run configuration for simulation, projection and fitting

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LoadError};
use crate::fitting::FitConfig;
use crate::projection::horizon_for_years;

/// How far an edit propagates through the scenario graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropagationMode {
    /// Re-derive only scenarios whose `referenceId` is the edited scenario
    SingleHop,
    /// Re-derive every downstream scenario, parents before children
    #[default]
    Transitive,
}

/// Configuration for a recomputation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Horizon in 365-day years
    pub simulation_years: u32,

    /// First simulated day of sources scenarios; today when unset
    pub start_date: Option<NaiveDate>,

    pub propagation: PropagationMode,

    pub fit: FitConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_years: 10,
            start_date: None,
            propagation: PropagationMode::default(),
            fit: FitConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration overrides from a JSON file; missing keys keep defaults
    pub fn from_json_path<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run can be built from
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.horizon_days().map(|_| ())
    }

    /// Number of simulated days
    pub fn horizon_days(&self) -> Result<u32, ConfigError> {
        horizon_for_years(self.simulation_years).ok_or(ConfigError::HorizonTooLong {
            years: self.simulation_years,
        })
    }

    /// Start date, falling back to today's local date
    pub fn resolved_start_date(&self) -> NaiveDate {
        self.start_date.unwrap_or_else(|| Local::now().date_naive())
    }
}
