use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::FlowHistoryError;
use crate::models::workflow::WorkflowDefinition;

/// Immutable capture of a workflow definition.
///
/// `version` increases monotonically per workflow and doubles as the optimistic-concurrency token.
/// Exactly one snapshot of a workflow is the current one.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VersionSnapshot {
    pub version: i64,

    #[serde(rename = "isCurrentVersion")]
    pub is_current_version: bool,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    pub data: WorkflowDefinition,
}

impl VersionSnapshot {
    pub fn workflow_id(&self) -> &str {
        &self.data.id
    }
}

pub trait CurrentVersion {
    fn current_version(&self) -> Option<&VersionSnapshot>;
    fn find_version(&self, version: i64) -> Result<&VersionSnapshot, FlowHistoryError>;
}

impl CurrentVersion for [VersionSnapshot] {
    fn current_version(&self) -> Option<&VersionSnapshot> {
        self.iter()
            .find(|snapshot| snapshot.is_current_version)
            .or_else(|| self.iter().max_by_key(|snapshot| snapshot.version))
    }

    fn find_version(&self, version: i64) -> Result<&VersionSnapshot, FlowHistoryError> {
        self.iter()
            .find(|snapshot| snapshot.version == version)
            .ok_or_else(|| FlowHistoryError::NotFound(format!("version {} not found", version)))
    }
}
