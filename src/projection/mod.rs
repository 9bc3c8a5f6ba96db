//! Net worth projection: daily source simulation and closed-form model sampling

mod series;
mod simulator;
mod closed_form;

pub use series::{NetWorthPoint, NetWorthSeries, SeriesSummary, SERIES_DATE_FORMAT};
pub use simulator::{horizon_for_years, CompoundingSimulator, DAYS_PER_YEAR};
pub use closed_form::{clamp_rate, model_value, ClosedFormProjector, RATE_FLOOR};
