//! Ordered scenario collection with id-based reference resolution
//!
//! All mutations go through the store and hand back a before/after
//! [`ScenarioEdit`], so callers never observe a half-applied record.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::{Map, Value};

use super::data::{
    DataScenario, FitParameters, FitScenario, ModifiedScenario, Scenario, ScenarioId, ScenarioKind,
    ScenarioKindTag, Source,
};
use crate::error::ScenarioError;

/// Snapshot of a single scenario before and after an edit
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioEdit {
    pub before: Scenario,
    pub after: Scenario,
}

impl ScenarioEdit {
    /// Id of the scenario after the edit
    pub fn id(&self) -> &ScenarioId {
        &self.after.id
    }

    /// Whether the upstream link of a fit/modified scenario moved
    pub fn reference_changed(&self) -> bool {
        self.before.reference_id() != self.after.reference_id()
    }

    /// Whether the edit touched anything a fit depends on (link or model family)
    pub fn invalidates_fit(&self) -> bool {
        match (&self.before.kind, &self.after.kind) {
            (ScenarioKind::Fit(before), ScenarioKind::Fit(after)) => {
                before.reference_id != after.reference_id || before.fit_type != after.fit_type
            }
            (_, ScenarioKind::Fit(_)) => true,
            _ => false,
        }
    }

    /// Whether the observed series of a data scenario changed
    pub fn data_changed(&self) -> bool {
        match (&self.before.kind, &self.after.kind) {
            (ScenarioKind::Data(before), ScenarioKind::Data(after)) => before != after,
            (_, ScenarioKind::Data(_)) => true,
            _ => false,
        }
    }
}

/// Fit scenario resolved together with the data it is fitted to
#[derive(Debug, Clone, Copy)]
pub struct ResolvedFit<'a> {
    pub fit: &'a FitScenario,
    pub data: &'a DataScenario,
}

/// Modified scenario resolved through its fit down to the data
#[derive(Debug, Clone, Copy)]
pub struct ResolvedModified<'a> {
    pub modified: &'a ModifiedScenario,
    pub fit_id: &'a ScenarioId,
    pub fit: &'a FitScenario,
    pub data: &'a DataScenario,
}

/// Ordered collection of scenarios keyed by unique id
#[derive(Debug, Clone, Default)]
pub struct ScenarioStore {
    scenarios: Vec<Scenario>,
    index: HashMap<ScenarioId, usize>,
}

impl ScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, rejecting duplicate ids
    pub fn from_scenarios(scenarios: Vec<Scenario>) -> Result<Self, ScenarioError> {
        let index = build_index(&scenarios)?;
        Ok(Self { scenarios, index })
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn ids(&self) -> Vec<ScenarioId> {
        self.scenarios.iter().map(|s| s.id.clone()).collect()
    }

    pub fn get(&self, id: &ScenarioId) -> Option<&Scenario> {
        self.index.get(id).map(|&i| &self.scenarios[i])
    }

    /// Position of the scenario in store order
    pub fn position(&self, id: &ScenarioId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn require(&self, id: &ScenarioId) -> Result<&Scenario, ScenarioError> {
        self.get(id).ok_or_else(|| ScenarioError::NotFound(id.clone()))
    }

    /// Append a new scenario
    pub fn insert(&mut self, scenario: Scenario) -> Result<(), ScenarioError> {
        if self.index.contains_key(&scenario.id) {
            return Err(ScenarioError::DuplicateId(scenario.id));
        }
        self.index.insert(scenario.id.clone(), self.scenarios.len());
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Replace the record stored under `id` with a new value
    pub fn replace(&mut self, id: &ScenarioId, scenario: Scenario) -> Result<ScenarioEdit, ScenarioError> {
        let position = self.position(id).ok_or_else(|| ScenarioError::NotFound(id.clone()))?;

        if scenario.id != *id && self.index.contains_key(&scenario.id) {
            return Err(ScenarioError::DuplicateId(scenario.id));
        }

        let before = std::mem::replace(&mut self.scenarios[position], scenario.clone());
        if before.id != scenario.id {
            self.index.remove(&before.id);
            self.index.insert(scenario.id.clone(), position);
        }

        Ok(ScenarioEdit { before, after: scenario })
    }

    /// Apply a top-level merge patch to a scenario record
    ///
    /// Keys present in the patch overwrite the record's keys, `null` removes them.
    pub fn apply_patch(&mut self, id: &ScenarioId, patch: &Value) -> Result<ScenarioEdit, ScenarioError> {
        let current = self.require(id)?;
        let patched = patch_record(id, current, patch)?;
        self.replace(id, patched)
    }

    /// Apply a top-level merge patch to one source of a sources scenario
    pub fn patch_source(
        &mut self,
        id: &ScenarioId,
        source_index: usize,
        patch: &Value,
    ) -> Result<ScenarioEdit, ScenarioError> {
        let mut updated = self.require(id)?.clone();
        let kind_tag = updated.kind_tag();

        let ScenarioKind::Sources(sources) = &mut updated.kind else {
            return Err(ScenarioError::InvalidPatch {
                scenario: id.clone(),
                reason: format!("{} scenario has no sources", kind_tag),
            });
        };

        let source = sources
            .sources
            .get_mut(source_index)
            .ok_or_else(|| ScenarioError::SourceNotFound {
                scenario: id.clone(),
                index: source_index,
            })?;

        let patched: Source = patch_record(id, &*source, patch)?;
        *source = patched;

        self.replace(id, updated)
    }

    /// Store freshly fitted parameters on a fit scenario
    pub fn set_fit_parameters(
        &mut self,
        id: &ScenarioId,
        parameters: FitParameters,
    ) -> Result<ScenarioEdit, ScenarioError> {
        let mut updated = self.require(id)?.clone();
        let found = updated.kind_tag();
        match &mut updated.kind {
            ScenarioKind::Fit(fit) => fit.parameters = Some(parameters),
            _ => {
                return Err(ScenarioError::WrongReferenceKind {
                    scenario: id.clone(),
                    reference: id.clone(),
                    expected: ScenarioKindTag::Fit,
                    found,
                })
            }
        }
        self.replace(id, updated)
    }

    /// Delete a scenario, returning it and the scenarios left pointing at it
    pub fn remove(&mut self, id: &ScenarioId) -> Result<(Scenario, Vec<ScenarioId>), ScenarioError> {
        let position = self.position(id).ok_or_else(|| ScenarioError::NotFound(id.clone()))?;
        let removed = self.scenarios.remove(position);
        self.index = build_index(&self.scenarios)?;
        let dangling = self.dependents(id);
        Ok((removed, dangling))
    }

    /// Replace the whole collection (import)
    pub fn replace_all(&mut self, scenarios: Vec<Scenario>) -> Result<(), ScenarioError> {
        let index = build_index(&scenarios)?;
        self.scenarios = scenarios;
        self.index = index;
        Ok(())
    }

    /// Scenarios whose `referenceId` is exactly `id`, in store order
    pub fn dependents(&self, id: &ScenarioId) -> Vec<ScenarioId> {
        self.scenarios
            .iter()
            .filter(|s| s.reference_id() == Some(id))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Every scenario reachable downstream of `id`, breadth first
    ///
    /// Parents always come before their children. `id` itself is excluded.
    pub fn descendants(&self, id: &ScenarioId) -> Vec<ScenarioId> {
        let mut visited: HashSet<ScenarioId> = HashSet::new();
        visited.insert(id.clone());

        let mut queue = VecDeque::from([id.clone()]);
        let mut ordered = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in self.dependents(&current) {
                if visited.insert(child.clone()) {
                    ordered.push(child.clone());
                    queue.push_back(child);
                }
            }
        }

        ordered
    }

    /// Look up the upstream scenario of `scenario`, checking its kind
    pub fn resolve_reference(
        &self,
        scenario: &ScenarioId,
        reference: &ScenarioId,
        expected: ScenarioKindTag,
    ) -> Result<&Scenario, ScenarioError> {
        let upstream = self.get(reference).ok_or_else(|| ScenarioError::UnresolvedReference {
            scenario: scenario.clone(),
            reference: reference.clone(),
        })?;

        let found = upstream.kind_tag();
        if found != expected {
            return Err(ScenarioError::WrongReferenceKind {
                scenario: scenario.clone(),
                reference: reference.clone(),
                expected,
                found,
            });
        }

        Ok(upstream)
    }

    /// Resolve a fit scenario to the data scenario it is fitted to
    pub fn resolve_fit(&self, id: &ScenarioId) -> Result<ResolvedFit<'_>, ScenarioError> {
        let scenario = self.require(id)?;
        let ScenarioKind::Fit(fit) = &scenario.kind else {
            return Err(ScenarioError::WrongReferenceKind {
                scenario: id.clone(),
                reference: id.clone(),
                expected: ScenarioKindTag::Fit,
                found: scenario.kind_tag(),
            });
        };

        let upstream = self.resolve_reference(id, &fit.reference_id, ScenarioKindTag::Data)?;
        match &upstream.kind {
            ScenarioKind::Data(data) => Ok(ResolvedFit { fit, data }),
            _ => Err(ScenarioError::WrongReferenceKind {
                scenario: id.clone(),
                reference: fit.reference_id.clone(),
                expected: ScenarioKindTag::Data,
                found: upstream.kind_tag(),
            }),
        }
    }

    /// Resolve a modified scenario through its fit to the anchoring data
    pub fn resolve_modified(&self, id: &ScenarioId) -> Result<ResolvedModified<'_>, ScenarioError> {
        let scenario = self.require(id)?;
        let ScenarioKind::Modified(modified) = &scenario.kind else {
            return Err(ScenarioError::WrongReferenceKind {
                scenario: id.clone(),
                reference: id.clone(),
                expected: ScenarioKindTag::Modified,
                found: scenario.kind_tag(),
            });
        };

        let fit_scenario = self.resolve_reference(id, &modified.reference_id, ScenarioKindTag::Fit)?;
        let resolved = self.resolve_fit(&fit_scenario.id)?;

        Ok(ResolvedModified {
            modified,
            fit_id: &fit_scenario.id,
            fit: resolved.fit,
            data: resolved.data,
        })
    }
}

fn build_index(scenarios: &[Scenario]) -> Result<HashMap<ScenarioId, usize>, ScenarioError> {
    let mut index = HashMap::with_capacity(scenarios.len());
    for (i, scenario) in scenarios.iter().enumerate() {
        if index.insert(scenario.id.clone(), i).is_some() {
            return Err(ScenarioError::DuplicateId(scenario.id.clone()));
        }
    }
    Ok(index)
}

/// Round-trip a record through JSON with a merge patch applied on top
fn patch_record<T>(id: &ScenarioId, record: &T, patch: &Value) -> Result<T, ScenarioError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let invalid = |reason: String| ScenarioError::InvalidPatch {
        scenario: id.clone(),
        reason,
    };

    let Value::Object(changes) = patch else {
        return Err(invalid("patch must be a JSON object".to_string()));
    };

    let mut fields: Map<String, Value> = match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Err(invalid("record is not a JSON object".to_string())),
        Err(e) => return Err(invalid(e.to_string())),
    };

    for (key, value) in changes {
        if value.is_null() {
            fields.remove(key);
        } else {
            fields.insert(key.clone(), value.clone());
        }
    }

    serde_json::from_value(Value::Object(fields)).map_err(|e| invalid(e.to_string()))
}
