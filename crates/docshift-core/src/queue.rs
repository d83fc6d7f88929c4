//! Mutation task queue
//!
//! Bounded-concurrency worker pool that resolves mutation tasks into write
//! operations:
//! - `push` enqueues work; a scheduler task starts workers as permits free up
//! - saturation pauses scheduling until a running worker finishes
//! - the first task failure kills everything still queued or running
//! - `drain` is the single join point and hands back the accumulated batch

use crate::error::TaskError;
use crate::progress::{Reporter, TOPIC_QUEUE};
use crate::resolver::{TaskResolver, TemplateResolver};
use crate::types::{Filter, MutationTask, WriteOperation, WriteOptions, DEFAULT_CONCURRENCY};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// Lifecycle state of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing pushed yet
    Idle,
    /// Tasks are being scheduled
    Running,
    /// Every permit is taken; scheduling is paused
    Saturated,
    /// No task is waiting; some may still run
    Empty,
    /// Every pushed task completed
    Drained,
    /// A task failed; remaining work was killed
    Failed,
}

impl QueueState {
    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Drained | Self::Failed)
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks accepted by `push`
    pub pushed: usize,
    /// Tasks whose operation was appended
    pub completed: usize,
    /// Tasks resolving right now
    pub running: usize,
    /// Highest number of tasks resolving at once
    pub peak_running: usize,
    /// Tasks pushed but not started
    pub waiting: usize,
}

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Maximum concurrently resolving tasks (at least 1)
    pub concurrency: usize,
    /// Clauses merged into every operation filter
    pub extra_filter: Filter,
    /// Options copied onto every operation
    pub write_options: WriteOptions,
    /// Progress reporter
    pub reporter: Reporter,
}

impl QueueSettings {
    /// Create settings with the given concurrency
    #[inline]
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ..Self::default()
        }
    }

    /// With extra filter clauses
    #[inline]
    #[must_use]
    pub fn with_extra_filter(mut self, filter: Filter) -> Self {
        self.extra_filter = filter;
        self
    }

    /// With write options
    #[inline]
    #[must_use]
    pub fn with_write_options(mut self, options: WriteOptions) -> Self {
        self.write_options = options;
        self
    }

    /// With progress reporter
    #[inline]
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            extra_filter: Filter::new(),
            write_options: WriteOptions::default(),
            reporter: Reporter::default(),
        }
    }
}

/// Result of a successful drain
#[derive(Debug, Clone, Default)]
pub struct DrainedBatch {
    /// Operations in completion order
    pub operations: Vec<WriteOperation>,
    /// Final statistics
    pub stats: QueueStats,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    pushed: AtomicUsize,
    completed: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    waiting: AtomicUsize,
    /// Append-only until drained
    operations: Mutex<Vec<WriteOperation>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::Idle),
            pushed: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            operations: Mutex::new(Vec::new()),
        }
    }

    fn transition(&self, next: QueueState) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = next;
        }
    }

    fn wake(&self) {
        let mut state = self.state.lock();
        if matches!(*state, QueueState::Idle | QueueState::Empty) {
            *state = QueueState::Running;
        }
    }

    fn fail(&self) {
        *self.state.lock() = QueueState::Failed;
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            pushed: self.pushed.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            peak_running: self.peak_running.load(Ordering::SeqCst),
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }
}

/// Counts a worker as running for as long as it lives
struct RunningGuard<'a> {
    shared: &'a Shared,
    running: usize,
}

impl<'a> RunningGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let running = shared.running.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_running.fetch_max(running, Ordering::SeqCst);
        Self { shared, running }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.shared.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WorkerContext {
    shared: Arc<Shared>,
    resolver: Arc<dyn TaskResolver>,
    settings: QueueSettings,
}

/// Bounded-concurrency mutation queue
///
/// Must be created inside a Tokio runtime; the scheduler runs as a spawned
/// task from construction until `drain` or the first failure.
#[derive(Debug)]
pub struct MutationQueue {
    sender: mpsc::UnboundedSender<MutationTask>,
    scheduler: JoinHandle<Result<(), TaskError>>,
    shared: Arc<Shared>,
    concurrency: usize,
    reporter: Reporter,
}

impl MutationQueue {
    /// Create queue resolving tasks with the template resolver
    #[must_use]
    pub fn new(settings: QueueSettings) -> Self {
        Self::with_resolver(settings, Arc::new(TemplateResolver))
    }

    /// Create queue with a custom resolver
    #[must_use]
    pub fn with_resolver(mut settings: QueueSettings, resolver: Arc<dyn TaskResolver>) -> Self {
        settings.concurrency = settings.concurrency.max(1);
        let concurrency = settings.concurrency;
        let reporter = settings.reporter;

        let shared = Arc::new(Shared::new());
        let (sender, receiver) = mpsc::unbounded_channel();
        let context = Arc::new(WorkerContext {
            shared: Arc::clone(&shared),
            resolver,
            settings,
        });

        let scheduler = tokio::spawn(async move {
            let outcome = schedule(receiver, Arc::clone(&context)).await;
            if outcome.is_err() {
                context.shared.fail();
            }
            outcome
        });

        Self {
            sender,
            scheduler,
            shared,
            concurrency,
            reporter,
        }
    }

    /// Enqueue a task
    ///
    /// # Errors
    /// - `TaskError::QueueClosed` once a failure has killed the queue
    pub fn push(&self, task: MutationTask) -> Result<(), TaskError> {
        let task_id = task.id;
        self.shared.waiting.fetch_add(1, Ordering::SeqCst);
        self.shared.wake();

        if self.sender.send(task).is_err() {
            self.shared.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(TaskError::QueueClosed);
        }

        self.shared.pushed.fetch_add(1, Ordering::SeqCst);
        self.reporter
            .step(TOPIC_QUEUE, format_args!("Task {task_id} added to the queue"));
        Ok(())
    }

    /// Wait for every pushed task and take the accumulated operations
    ///
    /// # Errors
    /// Returns the first task failure; all other work has been aborted.
    pub async fn drain(self) -> Result<DrainedBatch, TaskError> {
        let Self {
            sender,
            scheduler,
            shared,
            reporter,
            ..
        } = self;
        drop(sender);

        let outcome = match scheduler.await {
            Ok(outcome) => outcome,
            Err(e) => settle(Err(e)),
        };

        if let Err(e) = outcome {
            shared.fail();
            reporter.fatal(TOPIC_QUEUE, format_args!("The queue was killed: {e}"));
            return Err(e);
        }

        let operations = std::mem::take(&mut *shared.operations.lock());
        Ok(DrainedBatch {
            operations,
            stats: shared.snapshot(),
        })
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> QueueState {
        *self.shared.state.lock()
    }

    /// Current statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.shared.snapshot()
    }

    /// Configured concurrency bound
    #[inline]
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

type WorkerSet = JoinSet<Result<(), TaskError>>;

/// Scheduler loop: one worker per task, bounded by the semaphore
async fn schedule(
    mut receiver: mpsc::UnboundedReceiver<MutationTask>,
    context: Arc<WorkerContext>,
) -> Result<(), TaskError> {
    let reporter = context.settings.reporter;
    let permits = Arc::new(Semaphore::new(context.settings.concurrency));
    let mut workers = WorkerSet::new();

    loop {
        tokio::select! {
            biased;
            Some(joined) = workers.join_next(), if !workers.is_empty() => settle(joined)?,
            next = receiver.recv() => {
                let Some(task) = next else { break };
                let permit = acquire(&permits, &mut workers, &context).await?;

                let waiting = context
                    .shared
                    .waiting
                    .fetch_sub(1, Ordering::SeqCst)
                    .saturating_sub(1);
                if waiting == 0 {
                    context.shared.transition(QueueState::Empty);
                    reporter.step(TOPIC_QUEUE, "The queue is empty, current length is: 0");
                }

                workers.spawn(run_worker(task, permit, Arc::clone(&context)));
            }
        }
    }

    reporter.step(
        TOPIC_QUEUE,
        format_args!(
            "The queue is being drained, {} task(s) still running",
            workers.len()
        ),
    );
    while let Some(joined) = workers.join_next().await {
        settle(joined)?;
    }

    context.shared.transition(QueueState::Drained);
    Ok(())
}

/// Take a permit, pausing while the queue is saturated
async fn acquire(
    permits: &Arc<Semaphore>,
    workers: &mut WorkerSet,
    context: &WorkerContext,
) -> Result<OwnedSemaphorePermit, TaskError> {
    if let Ok(permit) = Arc::clone(permits).try_acquire_owned() {
        return Ok(permit);
    }

    let reporter = context.settings.reporter;
    context.shared.transition(QueueState::Saturated);
    reporter.step(TOPIC_QUEUE, "The queue is saturated and has been paused");

    loop {
        tokio::select! {
            biased;
            Some(joined) = workers.join_next(), if !workers.is_empty() => settle(joined)?,
            permit = Arc::clone(permits).acquire_owned() => {
                let permit = permit.map_err(|_| TaskError::QueueClosed)?;
                context.shared.transition(QueueState::Running);
                reporter.step(TOPIC_QUEUE, "The queue is being resumed");
                return Ok(permit);
            }
        }
    }
}

async fn run_worker(
    task: MutationTask,
    permit: OwnedSemaphorePermit,
    context: Arc<WorkerContext>,
) -> Result<(), TaskError> {
    let _permit = permit;
    let guard = RunningGuard::enter(&context.shared);

    // let the scheduler keep feeding before resolving
    tokio::task::yield_now().await;

    context.settings.reporter.step(
        TOPIC_QUEUE,
        format_args!(
            "Task ({} / {}) : {}",
            guard.running, context.settings.concurrency, task.id
        ),
    );

    let set = context.resolver.resolve_task(&task).await?;
    drop(guard);

    let mut filter = task.filter;
    for (key, value) in &context.settings.extra_filter {
        filter.insert(key.clone(), value.clone());
    }

    let operation = WriteOperation::set(filter, set, &context.settings.write_options);
    context.shared.operations.lock().push(operation);
    context.shared.completed.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

fn settle(joined: Result<Result<(), TaskError>, JoinError>) -> Result<(), TaskError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(TaskError::Panicked(message))
        }
        Err(_) => Err(TaskError::Aborted),
    }
}
