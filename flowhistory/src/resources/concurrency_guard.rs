use std::fmt;

use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;

use crate::errors::FlowHistoryError;
use crate::models::version::{CurrentVersion, VersionSnapshot};

/// Version the operator last fetched for a workflow. Attached to every mutating write so the backend can reject it
/// when somebody else saved in the meantime.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LastVersionToken(i64);

impl LastVersionToken {
    pub(crate) fn new(version: i64) -> Self {
        Self(version)
    }

    pub fn version(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LastVersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Latest known snapshot version per workflow.
#[derive(Default)]
pub struct ConcurrencyGuard {
    versions: DashMap<String, i64>,
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current version of a freshly fetched version list.
    pub fn observe_versions(&self, workflow_id: &str, versions: &[VersionSnapshot]) -> Option<i64> {
        let current = versions.current_version()?.version;
        self.observe(workflow_id, current);

        Some(current)
    }

    pub fn observe(&self, workflow_id: &str, version: i64) {
        debug!("ConcurrencyGuard::workflow {} observed at version {}", workflow_id, version);

        self.versions.insert(workflow_id.to_string(), version);
    }

    pub fn token(&self, workflow_id: &str) -> Result<LastVersionToken, FlowHistoryError> {
        self.versions
            .get(workflow_id)
            .map(|version| LastVersionToken::new(*version))
            .ok_or_else(|| {
                FlowHistoryError::PreconditionFailed(format!(
                    "versions of workflow {} must be loaded before it can be modified",
                    workflow_id
                ))
            })
    }

    /// Token for a write by an operator who last fetched `provided`. Fails with `VersionConflict` once a newer
    /// version is known, so a stale operator never writes on top of somebody else's save.
    pub fn token_for(&self, workflow_id: &str, provided: i64) -> Result<LastVersionToken, FlowHistoryError> {
        let current = self.token(workflow_id)?;

        if current.version() != provided {
            debug!(
                "ConcurrencyGuard::rejecting token {} for workflow {} at version {}",
                provided, workflow_id, current
            );

            return Err(FlowHistoryError::VersionConflict {
                workflow_id: workflow_id.to_string(),
                provided,
                current: current.version(),
            });
        }

        Ok(current)
    }

    /// Moves the guard to the version created by a successful commit. Never moves backwards.
    pub fn advance(&self, workflow_id: &str, version: i64) {
        self.versions
            .entry(workflow_id.to_string())
            .and_modify(|known| *known = (*known).max(version))
            .or_insert(version);

        info!("ConcurrencyGuard::workflow {} advanced to version {}", workflow_id, version);
    }

    /// Forgets the known version after a conflict. The operator has to reload before writing again.
    pub fn invalidate(&self, workflow_id: &str) {
        if self.versions.remove(workflow_id).is_some() {
            info!("ConcurrencyGuard::workflow {} invalidated", workflow_id);
        }
    }
}
