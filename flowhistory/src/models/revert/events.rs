use serde::{Deserialize, Serialize, Serializer};

use crate::errors::FlowHistoryError;
use crate::models::change::ChangeRecord;

#[derive(Serialize, Deserialize, strum_macros::Display, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueState {
    #[default]
    Idle,
    Running,
    Completed,
    Errored,
}

/// What happens to the remaining tasks of a run once one of them fails.
#[derive(Serialize, Deserialize, strum_macros::Display, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FailurePolicy {
    /// Discard the rest of the run, commit included.
    #[default]
    Abort,
    /// Keep draining, commit included. The run still ends `Errored`.
    Continue,
}

fn serialize_error<S: Serializer>(error: &FlowHistoryError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Lifecycle event of a single run. `change` is `None` for the commit task.
#[derive(Serialize, strum_macros::Display, Debug)]
#[serde(tag = "event", rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RevertEvent {
    Start {
        total: usize,
    },
    Success {
        change: Option<ChangeRecord>,
        progress: u8,
    },
    Error {
        change: Option<ChangeRecord>,
        #[serde(serialize_with = "serialize_error")]
        error: FlowHistoryError,
    },
    End {
        state: QueueState,
    },
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct RevertProgress {
    pub state: QueueState,
    pub busy: bool,

    /// 0..=100, reaches 100 only once the commit task settled.
    pub progress: u8,

    #[serde(rename = "progressText")]
    pub progress_text: String,

    pub error: Option<String>,

    /// Settled tasks, failed ones included.
    pub applied: usize,

    pub total: usize,
}

impl RevertProgress {
    pub fn started(total: usize) -> Self {
        Self {
            state: QueueState::Running,
            busy: true,
            progress: 0,
            progress_text: format!("0/{}", total),
            error: None,
            applied: 0,
            total,
        }
    }

    pub fn settle(&mut self, label: &str) {
        self.applied += 1;
        self.progress = percent(self.applied, self.total);
        self.progress_text = format!("{}/{} {}", self.applied, self.total, label);
    }

    pub fn finish(&mut self, state: QueueState) {
        self.state = state;
        self.busy = false;
    }
}

fn percent(settled: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }

    (settled.min(total) * 100 / total) as u8
}
