use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use log::{info, warn};
use serde_json::Value;

use crate::errors::FlowHistoryError;
use crate::models::version::{CurrentVersion, VersionSnapshot};
use crate::models::workflow::{EntityType, SubEntity, WorkflowDefinition};
use crate::resources::concurrency_guard::LastVersionToken;
use crate::resources::workflow_api::WorkflowApi;

/// Versions plus the working copy that sub-entity writes go to until the next version is created.
struct WorkflowHistory {
    versions: Vec<VersionSnapshot>,
    draft: WorkflowDefinition,
}

impl WorkflowHistory {
    fn current_version(&self) -> i64 {
        self.versions
            .current_version()
            .map(|snapshot| snapshot.version)
            .unwrap_or_default()
    }

    fn check(&self, workflow_id: &str, token: &LastVersionToken) -> Result<(), FlowHistoryError> {
        let current = self.current_version();

        if token.version() != current {
            return Err(FlowHistoryError::VersionConflict {
                workflow_id: workflow_id.to_string(),
                provided: token.version(),
                current,
            });
        }

        Ok(())
    }
}

/// In-process version store with the same contract as the workflow backend.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: DashMap<String, WorkflowHistory>,
    journal: Mutex<Vec<String>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON array of version snapshots, possibly of several workflows.
    pub fn from_seed_file(path: &str) -> Result<Self, FlowHistoryError> {
        let contents = fs::read_to_string(path).with_context(|| format!("Unable to read seed file {}", path))?;
        let snapshots: Vec<VersionSnapshot> =
            serde_json::from_str(&contents).with_context(|| format!("Unable to parse seed file {}", path))?;

        let mut by_workflow: HashMap<String, Vec<VersionSnapshot>> = HashMap::new();
        for snapshot in snapshots {
            by_workflow
                .entry(snapshot.workflow_id().to_string())
                .or_default()
                .push(snapshot);
        }

        let store = Self::new();
        for versions in by_workflow.into_values() {
            store.insert_history(versions)?;
        }

        info!("MemoryWorkflowStore::seeded {} workflows from {}", store.workflows.len(), path);

        Ok(store)
    }

    /// Replaces the history of one workflow. The current snapshot becomes the working copy.
    pub fn insert_history(&self, mut versions: Vec<VersionSnapshot>) -> Result<(), FlowHistoryError> {
        versions.sort_by_key(|snapshot| snapshot.version);

        let current = versions
            .current_version()
            .map(|snapshot| snapshot.version)
            .ok_or_else(|| FlowHistoryError::BadRequest("workflow history must not be empty".to_string()))?;

        for snapshot in versions.iter_mut() {
            snapshot.is_current_version = snapshot.version == current;
        }

        let current = versions.find_version(current)?;
        let workflow_id = current.workflow_id().to_string();
        let draft = current.data.clone();

        if versions.iter().any(|snapshot| snapshot.workflow_id() != workflow_id) {
            return Err(FlowHistoryError::BadRequest(format!(
                "history of workflow {} contains snapshots of other workflows",
                workflow_id
            )));
        }

        self.workflows.insert(workflow_id, WorkflowHistory { versions, draft });

        Ok(())
    }

    /// Working copy of a workflow, including writes not yet captured in a version.
    pub fn draft(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.workflows.get(workflow_id).map(|history| history.draft.clone())
    }

    /// Accepted writes, oldest first.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().map(|journal| journal.clone()).unwrap_or_default()
    }

    fn record(&self, entry: String) {
        match self.journal.lock() {
            Ok(mut journal) => journal.push(entry),
            Err(e) => warn!("MemoryWorkflowStore::journal unavailable: {}", e),
        }
    }

    fn write<F>(
        &self,
        workflow_id: &str,
        token: &LastVersionToken,
        entry: String,
        mutation: F,
    ) -> Result<(), FlowHistoryError>
    where
        F: FnOnce(&mut WorkflowDefinition) -> Result<(), FlowHistoryError>,
    {
        let mut history = self
            .workflows
            .get_mut(workflow_id)
            .ok_or_else(|| not_found(workflow_id))?;

        history.check(workflow_id, token)?;
        mutation(&mut history.draft)?;
        drop(history);

        self.record(entry);

        Ok(())
    }

    fn put_entity(draft: &mut WorkflowDefinition, entity_type: EntityType, entity_id: &str, payload: &Value) {
        let collection = draft.collection_mut(entity_type);

        match collection.iter_mut().find(|entity| entity.id == entity_id) {
            Some(entity) => entity.payload = payload.clone(),
            None => collection.push(SubEntity {
                id: entity_id.to_string(),
                entity_type,
                payload: payload.clone(),
            }),
        }
    }
}

fn not_found(workflow_id: &str) -> FlowHistoryError {
    FlowHistoryError::NotFound(format!("workflow {} not found", workflow_id))
}

#[async_trait]
impl WorkflowApi for MemoryWorkflowStore {
    async fn list_versions(&self, workflow_id: &str) -> Result<Vec<VersionSnapshot>, FlowHistoryError> {
        self.workflows
            .get(workflow_id)
            .map(|history| history.versions.clone())
            .ok_or_else(|| not_found(workflow_id))
    }

    async fn get_version(&self, workflow_id: &str, version: i64) -> Result<VersionSnapshot, FlowHistoryError> {
        let history = self.workflows.get(workflow_id).ok_or_else(|| not_found(workflow_id))?;
        let snapshot = history.versions.find_version(version)?.clone();

        Ok(snapshot)
    }

    async fn create_version(
        &self,
        workflow_id: &str,
        token: &LastVersionToken,
    ) -> Result<VersionSnapshot, FlowHistoryError> {
        let mut history = self
            .workflows
            .get_mut(workflow_id)
            .ok_or_else(|| not_found(workflow_id))?;

        history.check(workflow_id, token)?;

        let snapshot = VersionSnapshot {
            version: history.current_version() + 1,
            is_current_version: true,
            created_at: Utc::now(),
            data: history.draft.clone(),
        };

        for existing in history.versions.iter_mut() {
            existing.is_current_version = false;
        }
        history.versions.push(snapshot.clone());
        drop(history);

        self.record(format!("create version {}", snapshot.version));

        Ok(snapshot)
    }

    async fn update_workflow(
        &self,
        workflow_id: &str,
        fields: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        self.write(workflow_id, token, "update workflow".to_string(), |draft| {
            draft.apply_root_state(fields)
        })
    }

    async fn create_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        payload: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        let entry = format!("create {}/{}", entity_type.collection(), entity_id);

        self.write(workflow_id, token, entry, |draft| {
            Self::put_entity(draft, entity_type, entity_id, payload);

            Ok(())
        })
    }

    async fn upsert_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        payload: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        let entry = format!("upsert {}/{}", entity_type.collection(), entity_id);

        self.write(workflow_id, token, entry, |draft| {
            Self::put_entity(draft, entity_type, entity_id, payload);

            Ok(())
        })
    }

    async fn delete_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        let entry = format!("delete {}/{}", entity_type.collection(), entity_id);

        self.write(workflow_id, token, entry, |draft| {
            draft.collection_mut(entity_type).retain(|entity| entity.id != entity_id);

            Ok(())
        })
    }
}
