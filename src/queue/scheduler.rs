//! Bounded-concurrency task queue
//!
//! A single scheduler loop dispatches pending tasks to spawned workers while
//! honoring the concurrency ceiling. The loop never blocks on a provider
//! call; it waits on a notify handle with a short poll fallback. Retries
//! happen inside the worker, within the `Processing` state, so a retried
//! task is never re-enqueued; only transiently-classified failures retry.
//!
//! Events are published while the state lock is held (`broadcast::send`
//! never blocks), so subscribers observe them in mutation order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::QueueSettings;
use crate::error::ErrorCode;
use crate::provider::types::{GenerationParams, GenerationResult};
use crate::provider::Provider;
use crate::queue::events::{QueueEvent, QueueSnapshot};
use crate::queue::task::{Task, TaskStatus};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const CANCELLED_REASON: &str = "cancelled";

/// Runtime tuning for the queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of tasks in `Processing` at any instant
    pub max_concurrency: usize,
    /// Extra tries after the first failure
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Fallback wake interval for the scheduler loop
    pub poll_interval: Duration,
    /// Synthetic progress tick interval
    pub progress_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(100),
            progress_interval: Duration::from_millis(500),
        }
    }
}

impl From<&QueueSettings> for QueueConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            max_concurrency: settings.max_concurrency.max(1),
            retry_attempts: settings.retry_attempts,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            ..Self::default()
        }
    }
}

/// The FIFO and bookkeeping maps are the only mutable shared state, guarded
/// by one mutex.
struct QueueState {
    fifo: VecDeque<String>,
    tasks: HashMap<String, Task>,
    processing: HashSet<String>,
    running: bool,
    loop_spawned: bool,
    drained_notified: bool,
}

struct Inner {
    provider: Arc<dyn Provider>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    wake: Notify,
    events: broadcast::Sender<QueueEvent>,
}

impl Inner {
    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Must be called with the state lock held, keeping snapshot order
    /// consistent with the mutations it reflects.
    fn emit_snapshot(&self, st: &QueueState) {
        self.emit(QueueEvent::QueueUpdate(snapshot_of(st)));
    }
}

fn snapshot_of(st: &QueueState) -> QueueSnapshot {
    QueueSnapshot {
        pending: st.fifo.len(),
        processing: st.processing.len(),
        total: st.tasks.len(),
        is_running: st.running,
    }
}

/// In-process, in-memory generation task queue.
///
/// Cloning is cheap and shares the same queue. Methods that start work
/// (`add_task`, `start`) must be called within a Tokio runtime.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    pub fn new(provider: Arc<dyn Provider>, config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                provider,
                config,
                state: Mutex::new(QueueState {
                    fifo: VecDeque::new(),
                    tasks: HashMap::new(),
                    processing: HashSet::new(),
                    running: false,
                    loop_spawned: false,
                    drained_notified: true,
                }),
                wake: Notify::new(),
                events,
            }),
        }
    }

    pub fn with_settings(provider: Arc<dyn Provider>, settings: &QueueSettings) -> Self {
        Self::new(provider, QueueConfig::from(settings))
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Enqueue a generation request. Returns immediately with the pending
    /// task; starts the scheduler if it is not already running.
    pub fn add_task(&self, params: GenerationParams) -> Task {
        let task = Task::new(params);
        {
            let mut st = self.inner.state.lock();
            st.tasks.insert(task.id.clone(), task.clone());
            st.fifo.push_back(task.id.clone());
            st.drained_notified = false;
            self.inner.emit(QueueEvent::TaskAdded(task.clone()));
            self.inner.emit_snapshot(&st);
        }

        debug!(task = %task.id, "Task enqueued");
        self.start();
        task
    }

    /// Enqueue several requests, preserving input order
    pub fn add_batch(&self, batch: Vec<GenerationParams>) -> Vec<Task> {
        batch.into_iter().map(|params| self.add_task(params)).collect()
    }

    /// Idempotent; spawns the scheduler loop on first use
    pub fn start(&self) {
        let spawn_loop = {
            let mut st = self.inner.state.lock();
            if !st.running {
                st.running = true;
                self.inner.emit(QueueEvent::Started);
            }
            let spawn_loop = !st.loop_spawned;
            st.loop_spawned = true;
            spawn_loop
        };

        if spawn_loop {
            let inner = self.inner.clone();
            tokio::spawn(scheduler_loop(inner));
        }
        self.inner.wake.notify_one();
    }

    /// Idempotent; prevents new tasks from beginning execution but does not
    /// abort in-flight ones
    pub fn stop(&self) {
        let mut st = self.inner.state.lock();
        if st.running {
            st.running = false;
            self.inner.emit(QueueEvent::Stopped);
        }
    }

    /// Best-effort cancellation.
    ///
    /// A pending task is removed from the FIFO and will never run. A
    /// processing task is dropped from the bookkeeping map; the in-flight
    /// provider call keeps running but its result is discarded. Returns
    /// false for unknown or already terminal ids.
    pub fn cancel_task(&self, id: &str) -> bool {
        let freed_slot = {
            let mut st = self.inner.state.lock();
            let (cancelled, freed_slot) = match st.tasks.get(id).map(|t| t.status) {
                None | Some(TaskStatus::Completed) | Some(TaskStatus::Failed) => return false,
                Some(TaskStatus::Pending) => {
                    st.fifo.retain(|queued| queued != id);
                    let task = st.tasks.get_mut(id).expect("checked above");
                    task.status = TaskStatus::Failed;
                    task.error = Some(CANCELLED_REASON.to_string());
                    task.completed_at = Some(Utc::now());
                    (task.clone(), false)
                }
                Some(TaskStatus::Processing) => {
                    st.processing.remove(id);
                    let mut task = st.tasks.remove(id).expect("checked above");
                    task.status = TaskStatus::Failed;
                    task.error = Some(CANCELLED_REASON.to_string());
                    task.completed_at = Some(Utc::now());
                    (task, true)
                }
            };
            self.inner.emit(QueueEvent::TaskCancelled(cancelled));
            self.inner.emit_snapshot(&st);
            freed_slot
        };

        info!(task = %id, "Task cancelled");
        if freed_slot {
            self.inner.wake.notify_one();
        }
        true
    }

    /// Cancel every pending task; processing tasks are untouched
    pub fn clear_queue(&self) {
        let mut st = self.inner.state.lock();
        let ids: Vec<String> = st.fifo.drain(..).collect();
        for id in &ids {
            let Some(task) = st.tasks.get_mut(id) else {
                continue;
            };
            task.status = TaskStatus::Failed;
            task.error = Some(CANCELLED_REASON.to_string());
            task.completed_at = Some(Utc::now());
            let cancelled = task.clone();
            self.inner.emit(QueueEvent::TaskCancelled(cancelled));
        }
        self.inner.emit_snapshot(&st);
    }

    /// Point-in-time snapshot, safe to poll
    pub fn queue_status(&self) -> QueueSnapshot {
        let st = self.inner.state.lock();
        snapshot_of(&st)
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        let st = self.inner.state.lock();
        st.tasks.values().cloned().collect()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        let st = self.inner.state.lock();
        st.tasks.get(id).cloned()
    }
}

enum Dispatch {
    Task(Task),
    Drained,
    Idle,
}

async fn scheduler_loop(inner: Arc<Inner>) {
    debug!("Scheduler loop started");
    loop {
        match try_dispatch(&inner) {
            Dispatch::Task(task) => {
                let worker = inner.clone();
                tokio::spawn(async move {
                    run_task(worker, task).await;
                });
                // Loop again immediately to fill remaining slots.
            }
            Dispatch::Drained => {
                debug!("Queue drained");
            }
            Dispatch::Idle => {
                tokio::select! {
                    _ = inner.wake.notified() => {}
                    _ = sleep(inner.config.poll_interval) => {}
                }
            }
        }
    }
}

fn try_dispatch(inner: &Inner) -> Dispatch {
    let mut st = inner.state.lock();

    if !st.running || st.processing.len() >= inner.config.max_concurrency {
        return Dispatch::Idle;
    }

    while let Some(id) = st.fifo.pop_front() {
        // Cancelled ids may linger briefly; skip anything no longer pending.
        let Some(task) = st.tasks.get_mut(&id) else {
            continue;
        };
        if task.status != TaskStatus::Pending {
            continue;
        }

        task.status = TaskStatus::Processing;
        task.started_at = Some(Utc::now());
        task.progress = 0;
        let dispatched = task.clone();
        st.processing.insert(id);
        inner.emit(QueueEvent::TaskStarted(dispatched.clone()));
        inner.emit_snapshot(&st);
        return Dispatch::Task(dispatched);
    }

    if st.processing.is_empty() && !st.drained_notified {
        st.drained_notified = true;
        inner.emit(QueueEvent::Drained);
        return Dispatch::Drained;
    }

    Dispatch::Idle
}

/// Worker for one task: invoke the provider, retrying transient failures
/// within `Processing` up to the configured cap. A cancelled task's late
/// result is discarded.
async fn run_task(inner: Arc<Inner>, task: Task) {
    let id = task.id.clone();
    let provider_id = inner.provider.info().id;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        {
            let mut st = inner.state.lock();
            if !st.processing.contains(&id) {
                return;
            }
            match st.tasks.get_mut(&id) {
                Some(t) => t.attempts = attempt,
                None => return,
            }
        }

        let ticker = tokio::spawn(progress_ticker(inner.clone(), id.clone()));

        // Run the provider call on its own spawn so a panic inside a provider
        // becomes a failed attempt instead of killing the worker.
        let call = {
            let provider = inner.provider.clone();
            let params = task.params.clone();
            tokio::spawn(async move { provider.generate(params).await })
        };

        let outcome = match call.await {
            Ok(result) => result,
            Err(e) => GenerationResult::failure(
                provider_id.clone(),
                "none",
                ErrorCode::Internal,
                format!("generation call aborted: {}", e),
                0,
            ),
        };
        ticker.abort();

        if outcome.is_success() {
            let completed = {
                let mut st = inner.state.lock();
                if !st.processing.remove(&id) {
                    false
                } else if let Some(t) = st.tasks.get_mut(&id) {
                    t.status = TaskStatus::Completed;
                    t.progress = 100;
                    t.result = Some(outcome);
                    t.error = None;
                    t.completed_at = Some(Utc::now());
                    let done = t.clone();
                    inner.emit(QueueEvent::TaskCompleted(done));
                    inner.emit_snapshot(&st);
                    true
                } else {
                    false
                }
            };

            if completed {
                info!(task = %id, attempts = attempt, "Task completed");
            } else {
                debug!(task = %id, "Discarding result of cancelled task");
            }
            inner.wake.notify_one();
            return;
        }

        let message = outcome
            .message
            .clone()
            .unwrap_or_else(|| "generation failed".to_string());
        // Only failures that may pass on an identical resend are worth a
        // retry; content-policy, quota, and size rejections fail right away.
        let transient = outcome.code.map_or(false, |code| code.is_transient());

        if transient && attempt <= inner.config.retry_attempts {
            {
                let mut st = inner.state.lock();
                if !st.processing.contains(&id) {
                    return;
                }
                let Some(t) = st.tasks.get_mut(&id) else { return };
                t.progress = 0;
                t.error = Some(message.clone());
                let retrying = t.clone();
                inner.emit(QueueEvent::TaskRetry {
                    task: retrying,
                    attempt,
                });
            }

            warn!(task = %id, attempt, error = %message, "Task attempt failed, retrying");
            sleep(inner.config.retry_delay).await;
            continue;
        }

        let failed = {
            let mut st = inner.state.lock();
            if !st.processing.remove(&id) {
                false
            } else if let Some(t) = st.tasks.get_mut(&id) {
                t.status = TaskStatus::Failed;
                t.error = Some(message.clone());
                t.completed_at = Some(Utc::now());
                let done = t.clone();
                inner.emit(QueueEvent::TaskFailed(done));
                inner.emit_snapshot(&st);
                true
            } else {
                false
            }
        };

        if failed {
            warn!(task = %id, attempts = attempt, error = %message, "Task failed");
        } else {
            debug!(task = %id, "Discarding failure of cancelled task");
        }
        inner.wake.notify_one();
        return;
    }
}

/// Synthetic progress: bumped periodically while the call is in flight,
/// capped well below 100 until real completion.
async fn progress_ticker(inner: Arc<Inner>, id: String) {
    loop {
        sleep(inner.config.progress_interval).await;

        {
            let mut st = inner.state.lock();
            if !st.processing.contains(&id) {
                return;
            }
            match st.tasks.get_mut(&id) {
                Some(t) if t.status == TaskStatus::Processing && t.progress < 90 => {
                    t.progress += 10;
                    let tick = t.clone();
                    inner.emit(QueueEvent::TaskProgress(tick));
                }
                Some(_) => {}
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::ProviderCapabilities;
    use crate::provider::{HealthStatus, ProviderInfo};
    use async_trait::async_trait;

    struct NeverCalledProvider;

    #[async_trait]
    impl Provider for NeverCalledProvider {
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                id: "noop".to_string(),
                display_name: "Noop".to_string(),
                description: String::new(),
                capabilities: ProviderCapabilities {
                    multi_image_input: false,
                    image_editing: false,
                    text_to_image: true,
                    max_input_images: 0,
                    max_output_images: 1,
                    accepted_formats: vec![],
                    max_image_bytes: 0,
                },
                models: vec![],
            }
        }

        fn validate_config(&self) -> bool {
            true
        }

        async fn generate(&self, _params: GenerationParams) -> GenerationResult {
            unreachable!("queue is stopped in these tests")
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::healthy("noop")
        }
    }

    #[test]
    fn test_config_from_settings_clamps_zero_concurrency() {
        let settings = QueueSettings {
            max_concurrency: 0,
            retry_attempts: 1,
            retry_delay_ms: 50,
        };
        let config = QueueConfig::from(&settings);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_snapshot_counts_pending_tasks_while_stopped() {
        tokio_test::block_on(async {
            let queue = TaskQueue::new(Arc::new(NeverCalledProvider), QueueConfig::default());
            queue.stop();

            let a = queue.add_task(GenerationParams::default());
            queue.add_task(GenerationParams::default());
            queue.stop();

            let status = queue.queue_status();
            assert_eq!(status.pending, 2);
            assert_eq!(status.processing, 0);
            assert_eq!(status.total, 2);
            assert!(!status.is_running);

            assert!(queue.cancel_task(&a.id));
            assert_eq!(queue.queue_status().pending, 1);
        });
    }
}
