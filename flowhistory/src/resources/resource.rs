use std::time::Duration;

use crate::app::{BackendConfig, RevertConfig};
use crate::errors::FlowHistoryError;
use crate::resources::concurrency_guard::ConcurrencyGuard;
use crate::resources::memory_store::MemoryWorkflowStore;
use crate::resources::queue_registry::QueueRegistry;
use crate::resources::rest_client::RestWorkflowApi;

/// Resources live for the whole application runtime.
/// They are usually clients of external services or process-wide registries.
#[allow(async_fn_in_trait)]
pub trait Resource<'a>: Sized {
    type Cfg;

    async fn init_resource(config: Self::Cfg) -> Result<Self, FlowHistoryError>;
}

impl<'a> Resource<'a> for RestWorkflowApi {
    type Cfg = &'a BackendConfig;

    async fn init_resource(config: Self::Cfg) -> Result<Self, FlowHistoryError> {
        if config.url.is_empty() {
            return Err(FlowHistoryError::ConfigError("Missing backend.url".to_string()));
        }

        RestWorkflowApi::new(&config.url, Duration::from_secs(config.timeout_secs))
    }
}

impl<'a> Resource<'a> for MemoryWorkflowStore {
    type Cfg = &'a BackendConfig;

    async fn init_resource(config: Self::Cfg) -> Result<Self, FlowHistoryError> {
        match &config.seed {
            Some(path) => MemoryWorkflowStore::from_seed_file(path),
            None => Ok(MemoryWorkflowStore::new()),
        }
    }
}

impl<'a> Resource<'a> for QueueRegistry {
    type Cfg = &'a RevertConfig;

    async fn init_resource(config: Self::Cfg) -> Result<Self, FlowHistoryError> {
        Ok(QueueRegistry::new(config.failure_policy))
    }
}

impl<'a> Resource<'a> for ConcurrencyGuard {
    type Cfg = ();

    async fn init_resource(_config: ()) -> Result<Self, FlowHistoryError> {
        Ok(ConcurrencyGuard::new())
    }
}
