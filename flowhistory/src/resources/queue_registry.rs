use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use log::info;

use crate::models::revert::{FailurePolicy, QueueKey, RevertQueue};

/// Process-wide revert queues by snapshot pair. Re-opening a pair reuses its queue.
pub struct QueueRegistry {
    queues: DashMap<QueueKey, Arc<RevertQueue>>,
    failure_policy: FailurePolicy,
}

impl QueueRegistry {
    pub fn new(failure_policy: FailurePolicy) -> Self {
        Self {
            queues: DashMap::new(),
            failure_policy,
        }
    }

    pub fn get_or_create(&self, key: &QueueKey) -> Arc<RevertQueue> {
        self.queues
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RevertQueue::new(key.clone(), self.failure_policy)))
            .clone()
    }

    pub fn get(&self, key: &QueueKey) -> Option<Arc<RevertQueue>> {
        self.queues.get(key).map(|queue| queue.clone())
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Drops queues that aren't running and saw no activity for `max_idle`. Returns how many were dropped.
    pub fn cleanup_idle(&self, max_idle: TimeDelta) -> usize {
        let before = self.queues.len();
        let now = Utc::now();

        self.queues
            .retain(|_, queue| queue.is_running() || now - queue.idle_since() < max_idle);

        let dropped = before.saturating_sub(self.queues.len());
        if dropped > 0 {
            info!("QueueRegistry::dropped {} idle queues", dropped);
        }

        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_queue_per_key() {
        let registry = QueueRegistry::new(FailurePolicy::Abort);
        let key = QueueKey::new("wf-1", 2, 1);

        let first = registry.get_or_create(&key);
        let second = registry.get_or_create(&key);
        let other = registry.get_or_create(&QueueKey::new("wf-2", 2, 1));

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
        assert_eq!(first.key().to_string(), "2,1");
    }

    #[test]
    fn cleanup_drops_idle_queues() {
        let registry = QueueRegistry::new(FailurePolicy::Abort);
        let key = QueueKey::new("wf-1", 2, 1);
        registry.get_or_create(&key);

        assert_eq!(registry.cleanup_idle(TimeDelta::minutes(30)), 0);
        assert!(registry.get(&key).is_some());

        assert_eq!(registry.cleanup_idle(TimeDelta::zero()), 1);
        assert!(registry.is_empty());
    }
}
