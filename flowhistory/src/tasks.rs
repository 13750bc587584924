use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use log::info;
use tokio::time;

use crate::app::RevertConfig;
use crate::resources::queue_registry::QueueRegistry;

pub async fn cleanup_queues_task(queue_registry: Arc<QueueRegistry>, config: &RevertConfig) {
    let mut cleanup_interval = time::interval(Duration::from_secs(config.cleanup_interval_secs));
    let max_idle = TimeDelta::minutes(config.queue_idle_minutes);

    tokio::spawn(async move {
        loop {
            cleanup_interval.tick().await;

            let dropped = queue_registry.cleanup_idle(max_idle);
            info!("Cleanup task ran, {} queues dropped, {} left", dropped, queue_registry.len());
        }
    });
}
