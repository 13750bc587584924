use serde::Serialize;

use crate::models::change::{ChangeRecord, ChangeSet, ObjectType};
use crate::models::references::ReferenceGraph;
use crate::models::workflow::WorkflowDefinition;

/// Operator-controlled subset of a change set. Every record starts enabled.
#[derive(Serialize, Clone, Debug, Default)]
pub struct ChangeSelection {
    records: Vec<ChangeRecord>,
}

/// An enabled change whose reverted payload references an entity that won't exist after the run.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DependencyWarning {
    #[serde(rename = "changeId")]
    pub change_id: String,

    #[serde(rename = "displayName")]
    pub display_name: String,

    #[serde(rename = "missingId")]
    pub missing_id: String,
}

impl ChangeSelection {
    pub fn new(change_set: &ChangeSet) -> Self {
        let mut selection = Self::default();
        selection.set_all(change_set.records.clone());

        selection
    }

    /// Replaces the selection, enabling every record.
    pub fn set_all(&mut self, records: Vec<ChangeRecord>) {
        self.records = records
            .into_iter()
            .map(|mut record| {
                record.enabled = true;
                record
            })
            .collect();
    }

    /// Flips the record with `id`. Returns its new state, `None` when no record has that id.
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let record = self.records.iter_mut().find(|record| record.id == id)?;
        record.enabled = !record.enabled;

        Some(record.enabled)
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.records.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn disable<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            if !self.set_enabled(id.as_ref(), false) {
                log::debug!("Selection::ignoring unknown change id {}", id.as_ref());
            }
        }
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Enabled records in change set order. This is what a revert run applies.
    pub fn enabled_changes(&self) -> Vec<ChangeRecord> {
        self.records.iter().filter(|record| record.enabled).cloned().collect()
    }

    /// Warns about enabled records that, once reverted, would reference an entity whose own change is disabled and
    /// which is absent from the target snapshot.
    pub fn dependency_warnings(&self, source: &WorkflowDefinition) -> Vec<DependencyWarning> {
        let graph = ReferenceGraph::from_definition(source);

        self.records
            .iter()
            .filter(|record| record.enabled && record.object_type != ObjectType::Workflow)
            .filter(|record| record.source_state.is_some())
            .flat_map(|record| {
                graph
                    .chase(&record.id)
                    .into_iter()
                    .filter(|referenced| {
                        self.records.iter().any(|dependency| {
                            &dependency.id == referenced && !dependency.enabled && dependency.target_state.is_none()
                        })
                    })
                    .map(|missing_id| DependencyWarning {
                        change_id: record.id.clone(),
                        display_name: record.display_name.clone(),
                        missing_id,
                    })
                    .collect::<Vec<DependencyWarning>>()
            })
            .collect()
    }
}
