use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Execution events emitted by the engine.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { tasks: usize },
    ThrottleWaited { duration: Duration },
    TaskStarted { index: usize, name: String },
    TaskFinished { index: usize, name: String, elapsed: Duration },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Forwards execution events to the `log` facade at debug level.
#[derive(Debug, Default)]
pub struct LogExecutionObserver;

impl ExecutionObserver for LogExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        log::debug!("{event:?}");
    }
}

/// Real-time metrics for an execution run.
///
/// The engine updates these counters during execution; callers can snapshot them at any time.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    rows_processed: AtomicU64,
    tasks_started: AtomicU64,
    tasks_finished: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_tasks: AtomicUsize,
    max_active_tasks: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            rows_processed: AtomicU64::new(0),
            tasks_started: AtomicU64::new(0),
            tasks_finished: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_tasks: AtomicUsize::new(0),
            max_active_tasks: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.rows_processed.store(0, Ordering::SeqCst);
        self.tasks_started.store(0, Ordering::SeqCst);
        self.tasks_finished.store(0, Ordering::SeqCst);
        self.throttle_wait_ns.store(0, Ordering::SeqCst);
        self.active_tasks.store(0, Ordering::SeqCst);
        self.max_active_tasks.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns.store(saturating_nanos(elapsed), Ordering::SeqCst);
    }

    /// Add rows read by a finished task.
    pub fn on_rows_processed(&self, rows: u64) {
        let _ = self.rows_processed.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn on_task_start(&self) {
        let _ = self.tasks_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_tasks.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_tasks, now);
    }

    pub fn on_task_end(&self) {
        let _ = self.tasks_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let _ = self.throttle_wait_ns.fetch_add(saturating_nanos(d), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            rows_processed: self.rows_processed.load(Ordering::SeqCst),
            tasks_started: self.tasks_started.load(Ordering::SeqCst),
            tasks_finished: self.tasks_finished.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_tasks: self.max_active_tasks.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub rows_processed: u64,
    pub tasks_started: u64,
    pub tasks_finished: u64,
    pub throttle_wait: Duration,
    pub max_active_tasks: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows_processed={}, tasks={}/{}, max_active_tasks={}, throttle_wait={:?}, elapsed={:?}",
            self.run_id,
            self.rows_processed,
            self.tasks_finished,
            self.tasks_started,
            self.max_active_tasks,
            self.throttle_wait,
            self.elapsed
        )
    }
}
