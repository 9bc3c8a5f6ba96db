//! Load and save scenario documents, and read observed series from CSV

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::NaiveDate;
use csv::Reader;
use log::{info, warn};

use super::data::{Observation, Scenario, ScenarioKind};
use super::store::ScenarioStore;
use crate::error::LoadError;

/// Default location of the bundled scenario document
pub const DEFAULT_SCENARIOS_PATH: &str = "data/scenarios.json";

/// Date formats accepted in series CSV files
const DATE_FORMATS: [&str; 2] = ["%Y/%m/%d", "%Y-%m-%d"];

/// Parse a scenario document from a JSON string
pub fn parse_scenarios(json: &str) -> Result<ScenarioStore, LoadError> {
    let scenarios: Vec<Scenario> = serde_json::from_str(json)?;
    into_store(scenarios)
}

/// Load a scenario document from any reader
pub fn load_scenarios_from_reader<R: Read>(reader: R) -> Result<ScenarioStore, LoadError> {
    let scenarios: Vec<Scenario> = serde_json::from_reader(reader)?;
    into_store(scenarios)
}

/// Load a scenario document from a file
pub fn load_scenarios<P: AsRef<Path>>(path: P) -> Result<ScenarioStore, LoadError> {
    let file = File::open(path.as_ref())?;
    let store = load_scenarios_from_reader(BufReader::new(file))?;
    info!("Loaded {} scenarios from {}", store.len(), path.as_ref().display());
    Ok(store)
}

/// Load the bundled scenario document
pub fn load_default_scenarios() -> Result<ScenarioStore, LoadError> {
    load_scenarios(DEFAULT_SCENARIOS_PATH)
}

/// Serialize the store to the persisted document format
pub fn to_json_string(store: &ScenarioStore) -> Result<String, LoadError> {
    let mut json = serde_json::to_string_pretty(store.scenarios())?;
    json.push('\n');
    Ok(json)
}

/// Write the store to any writer
pub fn write_scenarios<W: Write>(mut writer: W, store: &ScenarioStore) -> Result<(), LoadError> {
    writer.write_all(to_json_string(store)?.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Save the store to a file
pub fn save_scenarios<P: AsRef<Path>>(path: P, store: &ScenarioStore) -> Result<(), LoadError> {
    let file = File::create(path.as_ref())?;
    write_scenarios(BufWriter::new(file), store)?;
    info!("Saved {} scenarios to {}", store.len(), path.as_ref().display());
    Ok(())
}

fn into_store(mut scenarios: Vec<Scenario>) -> Result<ScenarioStore, LoadError> {
    migrate_legacy_portfolios(&mut scenarios);
    Ok(ScenarioStore::from_scenarios(scenarios)?)
}

/// Flag the first source as portfolio where a document predates the flag
///
/// Only scenarios that have income/cost flows and no flagged source are
/// touched. Returns the number of scenarios migrated.
pub fn migrate_legacy_portfolios(scenarios: &mut [Scenario]) -> usize {
    let mut migrated = 0;

    for scenario in scenarios.iter_mut() {
        let ScenarioKind::Sources(set) = &mut scenario.kind else {
            continue;
        };

        let has_flows = set.sources.iter().any(|s| s.source_type.is_flow());
        if !has_flows || set.portfolio_index().is_some() {
            continue;
        }

        if let Some(first) = set.sources.first_mut() {
            warn!(
                "Scenario '{}' has no portfolio source, using first source '{}'",
                scenario.id, first.name
            );
            first.is_portfolio = true;
            migrated += 1;
        }
    }

    migrated
}

/// Raw CSV row of an observed series
#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    date: String,
    value: f64,
}

fn parse_date(row: usize, value: &str) -> Result<NaiveDate, LoadError> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| LoadError::InvalidDate {
            row,
            value: value.to_string(),
        })
}

/// Load an observed series (`date,value` columns) from any reader
pub fn load_observations_from_reader<R: Read>(reader: R) -> Result<Vec<Observation>, LoadError> {
    let mut csv_reader = Reader::from_reader(reader);
    let mut observations = Vec::new();

    for (row, result) in csv_reader.deserialize().enumerate() {
        let record: CsvRow = result?;
        let date = parse_date(row + 1, &record.date)?;
        observations.push(Observation::new(date, record.value));
    }

    Ok(observations)
}

/// Load an observed series from a CSV file
pub fn load_observations_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Observation>, LoadError> {
    let file = File::open(path)?;
    load_observations_from_reader(BufReader::new(file))
}
