//! Bounded worker pool for independent validation tasks.
//!
//! Each task (typically one resource of a package) runs on a rayon worker and owns its
//! table and checks; nothing mutable is shared between tasks. On top of the pool size,
//! `max_in_flight_tasks` throttles how many tasks hold open sources at once. Progress is
//! exposed through [`ExecutionMetrics`] and [`ExecutionObserver`] events.

mod observer;
mod semaphore;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::error::{TableError, TableResult};

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, LogExecutionObserver,
};

use semaphore::Semaphore;

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads; `None` uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on concurrently running tasks, on top of `num_threads`.
    pub max_in_flight_tasks: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_tasks: n.max(1),
        }
    }
}

/// A rayon thread pool plus in-flight throttling and metrics.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("threads", &self.pool.current_num_threads())
            .field("opts", &self.opts)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

impl ExecutionEngine {
    /// Rejects `max_in_flight_tasks == 0` and `num_threads == Some(0)`.
    pub fn new(opts: ExecutionOptions) -> TableResult<Self> {
        if opts.max_in_flight_tasks == 0 {
            return Err(TableError::options("max_in_flight_tasks must be > 0"));
        }
        if opts.num_threads == Some(0) {
            return Err(TableError::options("num_threads must be > 0 when set"));
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| TableError::options(format!("failed to build thread pool: {e}")))?;

        Ok(Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run `work` over every task in parallel; results keep the input order.
    ///
    /// `name` labels each task in [`ExecutionEvent`]s.
    pub fn run_tasks<T, R, N, F>(&self, tasks: Vec<T>, name: N, work: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        N: Fn(&T) -> String + Send + Sync,
        F: Fn(T) -> R + Send + Sync,
    {
        self.pool.install(|| self.run_tasks_impl(tasks, &name, &work))
    }

    fn run_tasks_impl<T, R>(
        &self,
        tasks: Vec<T>,
        name: &(dyn Fn(&T) -> String + Send + Sync),
        work: &(dyn Fn(T) -> R + Send + Sync),
    ) -> Vec<R>
    where
        T: Send,
        R: Send,
    {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted { tasks: tasks.len() });

        let sem = Semaphore::new(self.opts.max_in_flight_tasks);
        let out: Vec<R> = tasks
            .into_par_iter()
            .enumerate()
            .map(|(index, task)| {
                let waited = sem.acquire();
                if waited > Duration::ZERO {
                    self.metrics.on_throttle_wait(waited);
                    self.emit(ExecutionEvent::ThrottleWaited { duration: waited });
                }

                let label = name(&task);
                let task_start = Instant::now();
                self.metrics.on_task_start();
                self.emit(ExecutionEvent::TaskStarted {
                    index,
                    name: label.clone(),
                });

                let result = work(task);

                self.emit(ExecutionEvent::TaskFinished {
                    index,
                    name: label,
                    elapsed: task_start.elapsed(),
                });
                self.metrics.on_task_end();
                sem.release();
                result
            })
            .collect();

        self.metrics.end_run(start.elapsed());
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });
        out
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::{ExecutionEngine, ExecutionOptions};
    use crate::execution::{ExecutionEvent, ExecutionObserver};

    struct ConcurrencyObserver {
        active: AtomicUsize,
        max_active: AtomicUsize,
        finished: AtomicUsize,
    }

    impl ConcurrencyObserver {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            }
        }
    }

    impl ExecutionObserver for ConcurrencyObserver {
        fn on_event(&self, event: &ExecutionEvent) {
            match event {
                ExecutionEvent::TaskStarted { .. } => {
                    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_active.fetch_max(now, Ordering::SeqCst);
                }
                ExecutionEvent::TaskFinished { .. } => {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    self.finished.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn results_keep_input_order() {
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            max_in_flight_tasks: 4,
        })
        .unwrap();
        let out = engine.run_tasks((0..50).collect(), |i: &i32| i.to_string(), |i| {
            std::thread::sleep(Duration::from_micros(((50 - i) * 20) as u64));
            i * 2
        });
        assert_eq!(out, (0..50).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn max_in_flight_tasks_throttles_concurrency() {
        let observer = Arc::new(ConcurrencyObserver::new());
        let obs_trait: Arc<dyn ExecutionObserver> = observer.clone();
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            max_in_flight_tasks: 1,
        })
        .unwrap()
        .with_observer(obs_trait);

        let out = engine.run_tasks(vec![(); 20], |_| "task".to_string(), |_| {
            std::thread::sleep(Duration::from_millis(1));
        });

        assert_eq!(out.len(), 20);
        assert_eq!(observer.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(observer.finished.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn metrics_are_available_after_run() {
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            max_in_flight_tasks: 1,
        })
        .unwrap();
        let metrics = engine.metrics();

        let worker_metrics = engine.metrics();
        engine.run_tasks(vec![3u64; 10], |_| "task".to_string(), move |rows| {
            std::thread::sleep(Duration::from_millis(2));
            worker_metrics.on_rows_processed(rows);
        });

        let snap = metrics.snapshot();
        assert_eq!(snap.rows_processed, 30);
        assert_eq!(snap.tasks_started, 10);
        assert_eq!(snap.tasks_finished, 10);
        assert_eq!(snap.max_active_tasks, 1);
        assert!(snap.throttle_wait > Duration::ZERO);
        assert!(snap.elapsed.is_some());
    }

    #[test]
    fn invalid_options_are_rejected() {
        let zero_tasks = ExecutionOptions {
            num_threads: Some(2),
            max_in_flight_tasks: 0,
        };
        assert!(ExecutionEngine::new(zero_tasks).is_err());
        let zero_threads = ExecutionOptions {
            num_threads: Some(0),
            max_in_flight_tasks: 1,
        };
        assert!(ExecutionEngine::new(zero_threads).is_err());
    }
}
