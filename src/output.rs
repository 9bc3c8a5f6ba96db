//! Data handed to the chart renderer, and CSV export of the same
//!
//! The renderer gets one dataset per visible scenario: a label, a colour and
//! the (date, value) points. Axis scaling and styling are its business.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::coordinator::Coordinator;
use crate::error::LoadError;
use crate::scenario::ScenarioId;

/// Colours for scenarios that do not carry one, cycled by store position
pub const DEFAULT_PALETTE: [&str; 3] = ["rgb(255,99,132)", "rgb(99,132,255)", "rgb(132,255,99)"];

/// One renderable series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDataset {
    pub id: ScenarioId,
    pub label: String,
    pub color: String,
    /// `(YYYY/MM/DD, value)` pairs in date order
    pub points: Vec<(String, f64)>,
}

#[derive(Debug, Serialize)]
struct DatasetRow<'a> {
    scenario: &'a str,
    date: &'a str,
    value: f64,
}

pub fn palette_color(position: usize) -> &'static str {
    DEFAULT_PALETTE[position % DEFAULT_PALETTE.len()]
}

/// Datasets for every visible scenario with a derived series, in store order
///
/// Hidden scenarios and scenarios that failed to derive are left out.
pub fn chart_datasets(coordinator: &Coordinator) -> Vec<ChartDataset> {
    coordinator
        .store()
        .iter()
        .enumerate()
        .filter(|(_, scenario)| !scenario.hidden)
        .filter_map(|(position, scenario)| {
            let series = coordinator.series(&scenario.id)?;
            Some(ChartDataset {
                id: scenario.id.clone(),
                label: scenario.name.clone(),
                color: scenario
                    .color
                    .clone()
                    .unwrap_or_else(|| palette_color(position).to_string()),
                points: series.labelled(),
            })
        })
        .collect()
}

/// Write datasets as `scenario,date,value` rows
pub fn write_datasets_csv<W: Write>(writer: W, datasets: &[ChartDataset]) -> Result<(), LoadError> {
    let mut writer = csv::Writer::from_writer(writer);
    for dataset in datasets {
        for (date, value) in &dataset.points {
            writer.serialize(DatasetRow {
                scenario: dataset.id.as_str(),
                date,
                value: *value,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn save_datasets_csv<P: AsRef<Path>>(path: P, datasets: &[ChartDataset]) -> Result<(), LoadError> {
    let file = File::create(path)?;
    write_datasets_csv(file, datasets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::scenario::{Observation, Scenario, ScenarioStore, Source, SourceType};
    use chrono::NaiveDate;

    fn coordinator() -> Coordinator {
        let date = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let scenarios = vec![
            Scenario::data(
                "history",
                "History",
                vec![Observation::new(date(1), 100.0), Observation::new(date(2), 110.5)],
            ),
            Scenario::data("hidden", "Hidden", vec![Observation::new(date(1), 1.0)]),
            Scenario::sources(
                "plan",
                "Plan",
                vec![Source::new("Portfolio", SourceType::Asset, 500.0, 0.0).as_portfolio()],
            )
            .with_color("#123456"),
            Scenario::fit("broken", "Broken", "nowhere"),
        ];

        let mut scenarios = scenarios;
        scenarios[1].hidden = true;

        let config = SimulationConfig {
            simulation_years: 1,
            start_date: Some(date(1)),
            ..SimulationConfig::default()
        };
        let mut coordinator = Coordinator::new(ScenarioStore::from_scenarios(scenarios).unwrap(), config).unwrap();
        coordinator.refresh();
        coordinator
    }

    #[test]
    fn test_datasets_skip_hidden_and_failed() {
        let datasets = chart_datasets(&coordinator());
        let ids: Vec<&str> = datasets.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["history", "plan"]);

        assert_eq!(datasets[0].label, "History");
        assert_eq!(datasets[0].color, "rgb(255,99,132)");
        assert_eq!(datasets[0].points[1], ("2024/01/02".to_string(), 110.5));

        assert_eq!(datasets[1].color, "#123456");
        assert_eq!(datasets[1].points.len(), 365);
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(palette_color(1), "rgb(99,132,255)");
        assert_eq!(palette_color(2), "rgb(132,255,99)");
        assert_eq!(palette_color(3), palette_color(0));
    }

    #[test]
    fn test_csv_export() {
        let datasets = chart_datasets(&coordinator());
        let mut buffer = Vec::new();
        write_datasets_csv(&mut buffer, &datasets[..1]).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "scenario,date,value\nhistory,2024/01/01,100.0\nhistory,2024/01/02,110.5\n");
    }
}
