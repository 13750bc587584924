use async_trait::async_trait;
use serde_json::Value;

use crate::errors::FlowHistoryError;
use crate::models::version::VersionSnapshot;
use crate::models::workflow::EntityType;
use crate::resources::concurrency_guard::LastVersionToken;

/// Version store and sub-entity writes of the workflow backend.
///
/// Every mutating call carries the operator's [`LastVersionToken`]. A store must reject a write made with a stale
/// token with `VersionConflict` and leave the workflow untouched. Writes are idempotent: creating an existing id
/// overwrites it and deleting a missing id succeeds.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn list_versions(&self, workflow_id: &str) -> Result<Vec<VersionSnapshot>, FlowHistoryError>;

    async fn get_version(&self, workflow_id: &str, version: i64) -> Result<VersionSnapshot, FlowHistoryError>;

    /// Snapshots the working copy as the new current version.
    async fn create_version(
        &self,
        workflow_id: &str,
        token: &LastVersionToken,
    ) -> Result<VersionSnapshot, FlowHistoryError>;

    async fn update_workflow(
        &self,
        workflow_id: &str,
        fields: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError>;

    async fn create_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        payload: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError>;

    async fn upsert_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        payload: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError>;

    async fn delete_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError>;
}
