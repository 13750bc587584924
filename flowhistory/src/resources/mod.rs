pub mod concurrency_guard;
pub mod memory_store;
pub mod queue_registry;
pub mod resource;
pub mod rest_client;
pub mod workflow_api;
