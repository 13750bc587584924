use std::sync::Arc;
use std::{env, fs};

use actix_cors::Cors;
use actix_web::http;
use anyhow::Context;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_BACKEND_TIMEOUT_SECS, DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_ENV, DEFAULT_QUEUE_IDLE_MINUTES,
};
use crate::errors::FlowHistoryError;
use crate::models::revert::FailurePolicy;
use crate::resources::concurrency_guard::ConcurrencyGuard;
use crate::resources::memory_store::MemoryWorkflowStore;
use crate::resources::queue_registry::QueueRegistry;
use crate::resources::resource::Resource;
use crate::resources::rest_client::RestWorkflowApi;
use crate::resources::workflow_api::WorkflowApi;
use crate::utils::logger::{log_success, log_warning};

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Rest,
    Memory,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default)]
    pub url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// JSON file with version snapshots loaded into the memory backend.
    pub seed: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RevertConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default = "default_queue_idle_minutes")]
    pub queue_idle_minutes: i64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for RevertConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            queue_idle_minutes: DEFAULT_QUEUE_IDLE_MINUTES,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_SECS
}

fn default_queue_idle_minutes() -> i64 {
    DEFAULT_QUEUE_IDLE_MINUTES
}

fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub allowed_origin: String,
    pub backend: BackendConfig,

    #[serde(default)]
    pub revert: RevertConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, FlowHistoryError> {
        let contents = fs::read_to_string(path).with_context(|| format!("Unable to read config file {}", path))?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, FlowHistoryError> {
        let config = toml::from_str(contents)?;

        Ok(config)
    }
}

#[derive(Clone)]
pub struct App {
    pub config: Config,
    pub workflow_api: Arc<dyn WorkflowApi>,
    pub queue_registry: Arc<QueueRegistry>,
    pub concurrency_guard: Arc<ConcurrencyGuard>,
}

impl App {
    pub async fn new() -> Result<Self, FlowHistoryError> {
        dotenv::dotenv().ok();

        let env = env::var("ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config = Config::load(&format!("config.{}.toml", env))?;

        let workflow_api: Arc<dyn WorkflowApi> = match config.backend.kind {
            BackendKind::Rest => Arc::new(RestWorkflowApi::init_resource(&config.backend).await?),
            BackendKind::Memory => Arc::new(MemoryWorkflowStore::init_resource(&config.backend).await?),
        };

        Self::with_workflow_api(config, workflow_api).await
    }

    pub async fn with_workflow_api(
        config: Config,
        workflow_api: Arc<dyn WorkflowApi>,
    ) -> Result<Self, FlowHistoryError> {
        let queue_registry = QueueRegistry::init_resource(&config.revert).await?;
        let concurrency_guard = ConcurrencyGuard::init_resource(()).await?;

        Ok(Self {
            config,
            workflow_api,
            queue_registry: Arc::new(queue_registry),
            concurrency_guard: Arc::new(concurrency_guard),
        })
    }

    /// Init processes that need to be run on startup
    pub async fn init(&self) {
        // init logger
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

        // init queue cleanup
        crate::tasks::cleanup_queues_task(self.queue_registry.clone(), &self.config.revert).await;

        if self.config.backend.kind == BackendKind::Memory {
            log_warning("memory backend in use, versions are lost on restart".to_string());
        }

        log_success(format!(
            "flowhistory ready with {:?} backend, failure policy {}",
            self.config.backend.kind, self.config.revert.failure_policy
        ));
    }

    pub fn cors(&self) -> Cors {
        Cors::default()
            .allowed_origin(self.config.allowed_origin.as_str())
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![http::header::ACCEPT, http::header::ORIGIN, http::header::CONTENT_TYPE])
            .max_age(86400)
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }
}
