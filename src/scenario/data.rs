//! Scenario and source records matching the persisted scenario document

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Unique identifier of a scenario within the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub String);

impl ScenarioId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScenarioId {
    fn from(id: &str) -> Self {
        ScenarioId(id.to_string())
    }
}

impl From<String> for ScenarioId {
    fn from(id: String) -> Self {
        ScenarioId(id)
    }
}

/// Category of a source within a sources scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Yearly inflow settled daily into the portfolio
    Income,
    /// Yearly outflow settled daily out of the portfolio
    Cost,
    /// Valuation counted positively in net worth
    Asset,
    /// Valuation counted negatively in net worth
    Debt,
}

impl SourceType {
    /// Weight of the source's value in net worth
    pub fn net_worth_sign(self) -> f64 {
        match self {
            SourceType::Asset => 1.0,
            SourceType::Debt => -1.0,
            SourceType::Income | SourceType::Cost => 0.0,
        }
    }

    /// Weight of the source's daily flow into the portfolio
    pub fn flow_sign(self) -> f64 {
        match self {
            SourceType::Income => 1.0,
            SourceType::Cost => -1.0,
            SourceType::Asset | SourceType::Debt => 0.0,
        }
    }

    pub fn is_flow(self) -> bool {
        matches!(self, SourceType::Income | SourceType::Cost)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One cash-flow, asset or debt component of a sources scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,

    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// Current valuation (asset/debt) or yearly amount (income/cost)
    pub value: f64,

    /// Annual continuously compounded rate
    #[serde(default)]
    pub interest_rate: f64,

    /// Accumulator that absorbs the daily income/cost flow
    #[serde(rename = "isPortfolio", default, skip_serializing_if = "is_false")]
    pub is_portfolio: bool,
}

impl Source {
    pub fn new(name: impl Into<String>, source_type: SourceType, value: f64, interest_rate: f64) -> Self {
        Self {
            name: name.into(),
            source_type,
            value,
            interest_rate,
            is_portfolio: false,
        }
    }

    /// Mark this source as the portfolio accumulator
    pub fn as_portfolio(mut self) -> Self {
        self.is_portfolio = true;
        self
    }

    /// Signed contribution of this source to net worth
    pub fn net_worth_contribution(&self) -> f64 {
        self.source_type.net_worth_sign() * self.value
    }
}

/// A single observed (date, value) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Parameters of the continuous-compounding-with-contributions model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitParameters {
    /// Initial money P
    pub initial_money: f64,
    /// Annual rate r
    pub rate: f64,
    /// Yearly contribution C
    pub yearly_contribution: f64,
}

impl FitParameters {
    pub fn new(initial_money: f64, rate: f64, yearly_contribution: f64) -> Self {
        Self {
            initial_money,
            rate,
            yearly_contribution,
        }
    }

    /// Parameters shifted by a modified scenario's offsets
    pub fn offset_by(&self, diff: &ParameterDiff) -> Self {
        Self {
            initial_money: self.initial_money + diff.initial_money_diff,
            rate: self.rate + diff.rate_diff,
            yearly_contribution: self.yearly_contribution + diff.yearly_contribution_diff,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.initial_money.is_finite() && self.rate.is_finite() && self.yearly_contribution.is_finite()
    }
}

/// Offsets a modified scenario adds to its fit's parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDiff {
    #[serde(default)]
    pub initial_money_diff: f64,
    #[serde(default)]
    pub rate_diff: f64,
    #[serde(default)]
    pub yearly_contribution_diff: f64,
}

const CONTINUOUS_COMPOUNDING_TAG: &str = "continuousCompoundingWithContributions";

/// Model family a fit scenario estimates
///
/// Unknown tags are kept verbatim so they can be reported instead of being
/// read as the one supported model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FitType {
    #[default]
    ContinuousCompoundingWithContributions,
    Unsupported(String),
}

impl From<String> for FitType {
    fn from(tag: String) -> Self {
        if tag == CONTINUOUS_COMPOUNDING_TAG {
            FitType::ContinuousCompoundingWithContributions
        } else {
            FitType::Unsupported(tag)
        }
    }
}

impl From<FitType> for String {
    fn from(fit_type: FitType) -> Self {
        match fit_type {
            FitType::ContinuousCompoundingWithContributions => CONTINUOUS_COMPOUNDING_TAG.to_string(),
            FitType::Unsupported(tag) => tag,
        }
    }
}

/// Scenario simulated day by day from its sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesScenario {
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl SourcesScenario {
    pub fn portfolio_index(&self) -> Option<usize> {
        self.sources.iter().position(|s| s.is_portfolio)
    }
}

/// Scenario carrying a literal observed series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataScenario {
    #[serde(default)]
    pub data: Vec<Observation>,
}

/// Scenario fitted to a data scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitScenario {
    pub reference_id: ScenarioId,

    #[serde(default)]
    pub fit_type: FitType,

    /// Cached result of the last fit; absent until first fitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<FitParameters>,
}

/// Scenario offsetting the parameters of a fit scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedScenario {
    pub reference_id: ScenarioId,

    #[serde(default)]
    pub initial_money_diff: f64,

    #[serde(default)]
    pub rate_diff: f64,

    #[serde(default)]
    pub yearly_contribution_diff: f64,
}

impl ModifiedScenario {
    pub fn diff(&self) -> ParameterDiff {
        ParameterDiff {
            initial_money_diff: self.initial_money_diff,
            rate_diff: self.rate_diff,
            yearly_contribution_diff: self.yearly_contribution_diff,
        }
    }
}

/// Variant payload of a scenario, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScenarioKind {
    Sources(SourcesScenario),
    Data(DataScenario),
    Fit(FitScenario),
    Modified(ModifiedScenario),
}

/// Discriminant of [`ScenarioKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKindTag {
    Sources,
    Data,
    Fit,
    Modified,
}

impl ScenarioKindTag {
    /// Dependency stratum: a scenario only references a lower stratum
    pub fn stratum(self) -> u8 {
        match self {
            ScenarioKindTag::Sources | ScenarioKindTag::Data => 0,
            ScenarioKindTag::Fit => 1,
            ScenarioKindTag::Modified => 2,
        }
    }
}

impl fmt::Display for ScenarioKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioKindTag::Sources => "sources",
            ScenarioKindTag::Data => "data",
            ScenarioKindTag::Fit => "fit",
            ScenarioKindTag::Modified => "modified",
        };
        f.write_str(name)
    }
}

/// A named financial projection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default)]
    pub hidden: bool,

    #[serde(flatten)]
    pub kind: ScenarioKind,
}

impl Scenario {
    pub fn new(id: impl Into<ScenarioId>, name: impl Into<String>, kind: ScenarioKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
            hidden: false,
            kind,
        }
    }

    pub fn sources(id: impl Into<ScenarioId>, name: impl Into<String>, sources: Vec<Source>) -> Self {
        Self::new(id, name, ScenarioKind::Sources(SourcesScenario { sources }))
    }

    pub fn data(id: impl Into<ScenarioId>, name: impl Into<String>, data: Vec<Observation>) -> Self {
        Self::new(id, name, ScenarioKind::Data(DataScenario { data }))
    }

    pub fn fit(id: impl Into<ScenarioId>, name: impl Into<String>, reference_id: impl Into<ScenarioId>) -> Self {
        Self::new(
            id,
            name,
            ScenarioKind::Fit(FitScenario {
                reference_id: reference_id.into(),
                fit_type: FitType::default(),
                parameters: None,
            }),
        )
    }

    pub fn modified(
        id: impl Into<ScenarioId>,
        name: impl Into<String>,
        reference_id: impl Into<ScenarioId>,
        diff: ParameterDiff,
    ) -> Self {
        Self::new(
            id,
            name,
            ScenarioKind::Modified(ModifiedScenario {
                reference_id: reference_id.into(),
                initial_money_diff: diff.initial_money_diff,
                rate_diff: diff.rate_diff,
                yearly_contribution_diff: diff.yearly_contribution_diff,
            }),
        )
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn kind_tag(&self) -> ScenarioKindTag {
        match &self.kind {
            ScenarioKind::Sources(_) => ScenarioKindTag::Sources,
            ScenarioKind::Data(_) => ScenarioKindTag::Data,
            ScenarioKind::Fit(_) => ScenarioKindTag::Fit,
            ScenarioKind::Modified(_) => ScenarioKindTag::Modified,
        }
    }

    /// Upstream scenario this one is derived from, if any
    pub fn reference_id(&self) -> Option<&ScenarioId> {
        match &self.kind {
            ScenarioKind::Fit(fit) => Some(&fit.reference_id),
            ScenarioKind::Modified(modified) => Some(&modified.reference_id),
            ScenarioKind::Sources(_) | ScenarioKind::Data(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_json_shape() {
        let json = r#"{
            "id": "fit-1",
            "name": "Fitted",
            "type": "fit",
            "referenceId": "history",
            "fitType": "continuousCompoundingWithContributions",
            "parameters": { "initialMoney": 1000.0, "rate": 0.05, "yearlyContribution": 12000.0 }
        }"#;

        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.kind_tag(), ScenarioKindTag::Fit);
        assert_eq!(scenario.reference_id(), Some(&ScenarioId::from("history")));
        assert!(!scenario.hidden);

        match &scenario.kind {
            ScenarioKind::Fit(fit) => {
                assert_eq!(fit.fit_type, FitType::ContinuousCompoundingWithContributions);
                assert_eq!(fit.parameters, Some(FitParameters::new(1000.0, 0.05, 12000.0)));
            }
            other => panic!("expected fit scenario, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_fit_type_is_kept() {
        let json = r#"{"id": "f", "name": "F", "type": "fit", "referenceId": "d", "fitType": "logistic"}"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();

        match scenario.kind {
            ScenarioKind::Fit(fit) => assert_eq!(fit.fit_type, FitType::Unsupported("logistic".into())),
            other => panic!("expected fit scenario, got {:?}", other),
        }
    }

    #[test]
    fn test_source_fields() {
        let json = r#"{"name": "Salary", "type": "income", "value": 60000, "interest_rate": 0.02}"#;
        let source: Source = serde_json::from_str(json).unwrap();
        assert_eq!(source.source_type, SourceType::Income);
        assert!(!source.is_portfolio);
        assert_eq!(source.net_worth_contribution(), 0.0);

        let out = serde_json::to_string(&source).unwrap();
        assert!(!out.contains("isPortfolio"));
    }

    #[test]
    fn test_offset_by_adds_each_diff() {
        let base = FitParameters::new(1000.0, 0.04, 500.0);
        let diff = ParameterDiff {
            initial_money_diff: 250.0,
            rate_diff: -0.01,
            yearly_contribution_diff: 100.0,
        };

        let shifted = base.offset_by(&diff);
        assert_eq!(shifted.initial_money, 1000.0 + 250.0);
        assert_eq!(shifted.rate, 0.04 + -0.01);
        assert_eq!(shifted.yearly_contribution, 500.0 + 100.0);
    }
}
