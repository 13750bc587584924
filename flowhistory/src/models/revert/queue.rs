use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::errors::FlowHistoryError;
use crate::models::change::ChangeRecord;
use crate::models::revert::events::{FailurePolicy, QueueState, RevertEvent, RevertProgress};

/// Identifies the queue of one snapshot pair. Displays as `"<target>,<source>"`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueueKey {
    #[serde(rename = "workflowId")]
    pub workflow_id: String,

    #[serde(rename = "targetVersion")]
    pub target_version: i64,

    #[serde(rename = "sourceVersion")]
    pub source_version: i64,
}

impl QueueKey {
    pub fn new(workflow_id: &str, target_version: i64, source_version: i64) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            target_version,
            source_version,
        }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.target_version, self.source_version)
    }
}

type TaskFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), FlowHistoryError>> + Send>;

/// Deferred unit of work bound to one change, or to the commit when `change` is `None`.
pub struct QueueTask {
    change: Option<ChangeRecord>,
    run: TaskFn,
}

impl QueueTask {
    pub fn new<F, Fut>(change: ChangeRecord, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), FlowHistoryError>> + Send + 'static,
    {
        Self {
            change: Some(change),
            run: Box::new(move || f().boxed()),
        }
    }

    pub fn commit<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), FlowHistoryError>> + Send + 'static,
    {
        Self {
            change: None,
            run: Box::new(move || f().boxed()),
        }
    }

    fn label(&self) -> String {
        match &self.change {
            Some(change) => format!("{} '{}'", change.object_type, change.display_name),
            None => "new version".to_string(),
        }
    }
}

/// Handle of a started run. The receiver is the only one for that run; the next `start` gets a new channel.
pub struct RevertRun {
    pub id: Uuid,
    pub key: QueueKey,
    pub events: mpsc::UnboundedReceiver<RevertEvent>,
    pub progress: watch::Receiver<RevertProgress>,
}

/// Single-flight, ordered task runner of one snapshot pair.
///
/// State lives in the progress channel: a run may only start while `busy` is false and the check-and-set happens
/// under the channel's write lock, so two concurrent `start` calls can't both win.
pub struct RevertQueue {
    key: QueueKey,
    policy: FailurePolicy,
    progress: watch::Sender<RevertProgress>,
    aborted: AtomicBool,
    last_activity: AtomicI64,
}

impl RevertQueue {
    pub fn new(key: QueueKey, policy: FailurePolicy) -> Self {
        let (progress, _) = watch::channel(RevertProgress::default());

        Self {
            key,
            policy,
            progress,
            aborted: AtomicBool::new(false),
            last_activity: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    pub fn state(&self) -> QueueState {
        self.progress.borrow().state
    }

    pub fn is_running(&self) -> bool {
        self.progress.borrow().busy
    }

    pub fn progress(&self) -> RevertProgress {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RevertProgress> {
        self.progress.subscribe()
    }

    pub fn idle_since(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.last_activity.load(Ordering::Relaxed)).unwrap_or_else(Utc::now)
    }

    fn touch(&self) {
        self.last_activity.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Runs `tasks` in order followed by `commit`.
    ///
    /// Returns `None` without side effects when there is nothing to run or a run is already in progress.
    pub fn start(self: &Arc<Self>, tasks: Vec<QueueTask>, commit: QueueTask) -> Option<RevertRun> {
        if tasks.is_empty() {
            debug!("RevertQueue::{} nothing to revert", self.key);

            return None;
        }

        let total = tasks.len() + 1;
        let mut acquired = false;

        self.progress.send_if_modified(|progress| {
            if progress.busy {
                return false;
            }

            // cleared under the write lock so a concurrent abort() can only land after it
            self.aborted.store(false, Ordering::SeqCst);
            *progress = RevertProgress::started(total);
            acquired = true;

            true
        });

        if !acquired {
            warn!("{}", FlowHistoryError::QueueBusy(self.key.to_string()));

            return None;
        }

        self.touch();

        let id = Uuid::new_v4();
        let (events_tx, events) = mpsc::unbounded_channel();
        let _ = events_tx.send(RevertEvent::Start { total });

        info!("RevertQueue::{} run {} started with {} tasks", self.key, id, total);

        let mut pending: VecDeque<QueueTask> = tasks.into();
        pending.push_back(commit);

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.process(pending, events_tx).await;
        });

        Some(RevertRun {
            id,
            key: self.key.clone(),
            events,
            progress: self.subscribe(),
        })
    }

    /// Stops dequeuing once the in-flight task settles. Returns false when nothing is running.
    pub fn abort(&self) -> bool {
        if !self.is_running() {
            return false;
        }

        warn!("RevertQueue::{} abort requested", self.key);
        self.aborted.store(true, Ordering::SeqCst);

        true
    }

    async fn process(self: Arc<Self>, mut pending: VecDeque<QueueTask>, events: mpsc::UnboundedSender<RevertEvent>) {
        let mut failed = false;

        while let Some(task) = pending.pop_front() {
            if self.aborted.load(Ordering::SeqCst) {
                let error = FlowHistoryError::RevertAborted(self.key.to_string());

                warn!("RevertQueue::{} discarding {} pending tasks", self.key, pending.len() + 1);
                self.progress.send_modify(|progress| progress.error = Some(error.to_string()));
                let _ = events.send(RevertEvent::Error { change: None, error });

                failed = true;
                break;
            }

            let label = task.label();
            let QueueTask { change, run } = task;
            let result = AssertUnwindSafe(async move { run().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panicked(&label, panic)));

            self.touch();

            match result {
                Ok(()) => {
                    let mut settled = 0;
                    self.progress.send_modify(|progress| {
                        progress.settle(&label);
                        settled = progress.progress;
                    });

                    let _ = events.send(RevertEvent::Success {
                        change,
                        progress: settled,
                    });
                }
                Err(e) => {
                    error!("RevertQueue::{} failed to revert {}: {}", self.key, label, e);

                    failed = true;
                    self.progress.send_modify(|progress| {
                        progress.settle(&label);
                        progress.error = Some(e.to_string());
                    });

                    let _ = events.send(RevertEvent::Error { change, error: e });

                    if self.policy == FailurePolicy::Abort {
                        if !pending.is_empty() {
                            warn!("RevertQueue::{} skipping {} remaining tasks", self.key, pending.len());
                        }

                        break;
                    }
                }
            }
        }

        let state = if failed {
            QueueState::Errored
        } else {
            QueueState::Completed
        };

        self.progress.send_modify(|progress| progress.finish(state));
        let _ = events.send(RevertEvent::End { state });

        info!("RevertQueue::{} run ended {}", self.key, state);
    }
}

fn panicked(label: &str, panic: Box<dyn Any + Send>) -> FlowHistoryError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    FlowHistoryError::InternalServerError(format!("reverting {} panicked: {}", label, message))
}
