//! Daily compounding simulation of a sources scenario

use chrono::NaiveDate;

use super::series::NetWorthSeries;
use crate::error::SimulationError;
use crate::scenario::{Source, SourcesScenario};

/// Days in a simulated year; rates and flows are spread over this many days
pub const DAYS_PER_YEAR: u32 = 365;

/// Number of simulated days in `years` 365-day years, `None` on overflow
pub fn horizon_for_years(years: u32) -> Option<u32> {
    DAYS_PER_YEAR.checked_mul(years)
}

/// Running state of one simulation
#[derive(Debug, Clone)]
struct SimulationState {
    /// Private copy of the sources, grown in place
    sources: Vec<Source>,

    /// Index of the portfolio accumulator, if any
    portfolio: Option<usize>,

    /// Signed sum of asset/debt valuations
    net_worth: f64,
}

impl SimulationState {
    /// Initialize state from a scenario's sources, validating the portfolio
    fn from_scenario(scenario: &SourcesScenario) -> Result<Self, SimulationError> {
        let portfolio_count = scenario.sources.iter().filter(|s| s.is_portfolio).count();
        if portfolio_count > 1 {
            return Err(SimulationError::MultiplePortfolios { count: portfolio_count });
        }

        let portfolio = scenario.portfolio_index();
        if portfolio.is_none() {
            if let Some(flow) = scenario.sources.iter().find(|s| s.source_type.is_flow()) {
                return Err(SimulationError::MissingPortfolio {
                    source_name: flow.name.clone(),
                });
            }
        }

        let sources = scenario.sources.clone();
        let net_worth = sources.iter().map(Source::net_worth_contribution).sum();

        Ok(Self {
            sources,
            portfolio,
            net_worth,
        })
    }

    /// Advance every source by one day, in source order
    fn step_day(&mut self) {
        for index in 0..self.sources.len() {
            // Stale valuation comes out before growth
            self.net_worth -= self.sources[index].net_worth_contribution();

            self.settle_flow(index);

            let source = &mut self.sources[index];
            source.value *= (source.interest_rate / DAYS_PER_YEAR as f64).exp();

            self.net_worth += self.sources[index].net_worth_contribution();
        }
    }

    /// Move one day of an income/cost source into the portfolio
    fn settle_flow(&mut self, index: usize) {
        let Some(portfolio) = self.portfolio else {
            return;
        };
        if index == portfolio {
            return;
        }

        let source = &self.sources[index];
        let flow = source.source_type.flow_sign() * source.value / DAYS_PER_YEAR as f64;
        if flow == 0.0 {
            return;
        }

        let target = &mut self.sources[portfolio];
        target.value += flow;
        // Keep net worth equal to the signed sum of current valuations
        self.net_worth += target.source_type.net_worth_sign() * flow;
    }
}

/// Day-stepped simulator for sources scenarios
#[derive(Debug, Clone, Copy)]
pub struct CompoundingSimulator {
    horizon_days: u32,
}

impl CompoundingSimulator {
    /// Create a simulator covering `horizon_days` days
    pub fn new(horizon_days: u32) -> Self {
        Self { horizon_days }
    }

    /// Create a simulator covering whole 365-day years
    ///
    /// `None` when the day count overflows.
    pub fn for_years(years: u32) -> Option<Self> {
        horizon_for_years(years).map(Self::new)
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    /// Simulate a scenario starting on `start`, one point per day
    ///
    /// The scenario itself is never mutated.
    pub fn simulate(&self, scenario: &SourcesScenario, start: NaiveDate) -> Result<NetWorthSeries, SimulationError> {
        let mut state = SimulationState::from_scenario(scenario)?;
        let mut series = NetWorthSeries::with_capacity(self.horizon_days as usize);

        for date in start.iter_days().take(self.horizon_days as usize) {
            state.step_day();
            series.add_point(date, state.net_worth);
        }

        Ok(series)
    }
}
