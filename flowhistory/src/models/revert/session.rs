use std::sync::Arc;

use log::{debug, info, warn};

use crate::errors::FlowHistoryError;
use crate::models::change::ChangeSet;
use crate::models::diff::diff;
use crate::models::revert::queue::{QueueKey, QueueTask, RevertRun};
use crate::models::revert::resolver::RevertOperation;
use crate::models::selection::{ChangeSelection, DependencyWarning};
use crate::models::version::VersionSnapshot;
use crate::models::workflow::WorkflowDefinition;
use crate::resources::concurrency_guard::{ConcurrencyGuard, LastVersionToken};
use crate::resources::queue_registry::QueueRegistry;
use crate::resources::workflow_api::WorkflowApi;

/// Revert of one workflow from a target snapshot back to a source snapshot.
pub struct RevertSession {
    workflow_id: String,
    key: QueueKey,
    change_set: ChangeSet,
    selection: ChangeSelection,
    source: WorkflowDefinition,
}

impl RevertSession {
    pub fn new(target: &VersionSnapshot, source: &VersionSnapshot) -> Self {
        let workflow_id = target.workflow_id().to_string();
        let key = QueueKey::new(&workflow_id, target.version, source.version);
        let change_set = diff(Some(&target.data), Some(&source.data));
        let selection = ChangeSelection::new(&change_set);

        debug!("RevertSession::{} of workflow {} has {} changes", key, workflow_id, change_set.len());

        Self {
            workflow_id,
            key,
            change_set,
            selection,
            source: source.data.clone(),
        }
    }

    pub async fn load(
        api: &dyn WorkflowApi,
        workflow_id: &str,
        target_version: i64,
        source_version: i64,
    ) -> Result<Self, FlowHistoryError> {
        let target = api.get_version(workflow_id, target_version).await?;
        let source = api.get_version(workflow_id, source_version).await?;

        Ok(Self::new(&target, &source))
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    pub fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn selection(&self) -> &ChangeSelection {
        &self.selection
    }

    pub fn disable<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.selection.disable(ids)
    }

    pub fn dependency_warnings(&self) -> Vec<DependencyWarning> {
        self.selection.dependency_warnings(&self.source)
    }

    /// Starts reverting the enabled changes with the operator's `token`, binding the pair's queue on first use.
    /// `Ok(None)` when nothing is enabled or the queue is already running.
    pub fn start(
        &self,
        registry: &QueueRegistry,
        api: Arc<dyn WorkflowApi>,
        guard: Arc<ConcurrencyGuard>,
        token: LastVersionToken,
    ) -> Result<Option<RevertRun>, FlowHistoryError> {
        let changes = self.selection.enabled_changes();

        if changes.is_empty() {
            debug!("RevertSession::{} no change selected", self.key);

            return Ok(None);
        }

        // resolve everything up front so an invalid record never starts a partial run
        let operations = changes
            .iter()
            .map(RevertOperation::resolve)
            .collect::<Result<Vec<RevertOperation>, FlowHistoryError>>()?;

        let tasks = changes
            .into_iter()
            .zip(operations)
            .map(|(change, operation)| {
                let api = api.clone();
                let guard = guard.clone();
                let workflow_id = self.workflow_id.clone();
                let failed_change = change.clone();

                QueueTask::new(change, move || async move {
                    operation
                        .apply(api.as_ref(), &workflow_id, &token)
                        .await
                        .map_err(|e| {
                            if e.is_version_conflict() {
                                guard.invalidate(&workflow_id);
                            }

                            FlowHistoryError::MutationFailure {
                                change: Box::new(failed_change),
                                inner: Box::new(e),
                            }
                        })
                })
            })
            .collect();

        let commit = Self::commit(api, guard, self.workflow_id.clone(), token);

        Ok(registry.get_or_create(&self.key).start(tasks, commit))
    }

    fn commit(
        api: Arc<dyn WorkflowApi>,
        guard: Arc<ConcurrencyGuard>,
        workflow_id: String,
        token: LastVersionToken,
    ) -> QueueTask {
        QueueTask::commit(move || async move {
            match api.create_version(&workflow_id, &token).await {
                Ok(snapshot) => {
                    guard.advance(&workflow_id, snapshot.version);
                    info!("RevertSession::workflow {} saved as version {}", workflow_id, snapshot.version);

                    Ok(())
                }
                Err(e) => {
                    if e.is_version_conflict() {
                        guard.invalidate(&workflow_id);
                    }
                    warn!("RevertSession::failed to save workflow {}: {}", workflow_id, e);

                    Err(e)
                }
            }
        })
    }
}
