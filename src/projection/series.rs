//! Net worth series produced by simulation and projection

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::scenario::Observation;

/// Date format handed to the chart renderer and CSV export
pub const SERIES_DATE_FORMAT: &str = "%Y/%m/%d";

/// Net worth on a single day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetWorthPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl NetWorthPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }

    /// Date rendered as `YYYY/MM/DD`
    pub fn date_label(&self) -> String {
        self.date.format(SERIES_DATE_FORMAT).to_string()
    }
}

/// Ordered (date, net worth) points for one scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetWorthSeries {
    pub points: Vec<NetWorthPoint>,
}

impl NetWorthSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Passthrough series of a data scenario
    pub fn from_observations(observations: &[Observation]) -> Self {
        Self {
            points: observations
                .iter()
                .map(|o| NetWorthPoint::new(o.date, o.value))
                .collect(),
        }
    }

    /// Add a point
    pub fn add_point(&mut self, date: NaiveDate, value: f64) {
        self.points.push(NetWorthPoint::new(date, value));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&NetWorthPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&NetWorthPoint> {
        self.points.last()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    /// Points as (`YYYY/MM/DD`, value) pairs for the renderer
    pub fn labelled(&self) -> Vec<(String, f64)> {
        self.points.iter().map(|p| (p.date_label(), p.value)).collect()
    }

    /// Get summary statistics
    pub fn summary(&self) -> SeriesSummary {
        let min_value = self.values().fold(f64::INFINITY, f64::min);
        let max_value = self.values().fold(f64::NEG_INFINITY, f64::max);

        SeriesSummary {
            points: self.points.len(),
            start_date: self.first().map(|p| p.date),
            end_date: self.last().map(|p| p.date),
            start_value: self.first().map(|p| p.value).unwrap_or(0.0),
            final_value: self.last().map(|p| p.value).unwrap_or(0.0),
            min_value: if self.is_empty() { 0.0 } else { min_value },
            max_value: if self.is_empty() { 0.0 } else { max_value },
        }
    }
}

/// Summary statistics for a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub points: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_value: f64,
    pub final_value: f64,
    pub min_value: f64,
    pub max_value: f64,
}
