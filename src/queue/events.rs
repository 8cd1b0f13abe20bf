//! Queue lifecycle events published to subscribers

use serde::{Deserialize, Serialize};

use crate::queue::task::Task;

/// Point-in-time view of the queue, safe to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub processing: usize,
    pub total: usize,
    pub is_running: bool,
}

/// Lifecycle events emitted on the queue's broadcast channel.
///
/// Task-scoped events carry the affected task as observed at emission time.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    TaskAdded(Task),
    TaskStarted(Task),
    TaskProgress(Task),
    TaskRetry { task: Task, attempt: u32 },
    TaskCompleted(Task),
    TaskFailed(Task),
    TaskCancelled(Task),
    QueueUpdate(QueueSnapshot),
    /// The queue ran dry: no pending tasks and nothing processing
    Drained,
    Started,
    Stopped,
}

impl QueueEvent {
    /// The id of the task this event concerns, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            QueueEvent::TaskAdded(t)
            | QueueEvent::TaskStarted(t)
            | QueueEvent::TaskProgress(t)
            | QueueEvent::TaskCompleted(t)
            | QueueEvent::TaskFailed(t)
            | QueueEvent::TaskCancelled(t) => Some(&t.id),
            QueueEvent::TaskRetry { task, .. } => Some(&task.id),
            _ => None,
        }
    }
}
