//! Worker threads that drain a fanout queue

use crate::core::{FanoutError, Result, Task};
use crate::metrics::FanoutMetrics;
use crate::pool::panic;
use crate::queue::{BoundedQueue, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{debug, span, Level};

/// Per-worker counters, readable while the worker runs
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total number of tasks processed, panicked ones included
    pub tasks_processed: AtomicU64,
    /// Total number of tasks that panicked
    pub tasks_panicked: AtomicU64,
    /// Total time spent processing tasks (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total tasks processed
    pub fn get_tasks_processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::Relaxed)
    }

    /// Get total tasks panicked
    pub fn get_tasks_panicked(&self) -> u64 {
        self.tasks_panicked.load(Ordering::Relaxed)
    }

    /// Get average processing time per task in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.tasks_processed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    fn record(&self, elapsed_us: u64, panicked: bool) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        if panicked {
            self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
        }
        self.total_processing_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
    }
}

/// Shared state every worker of one fanout is spawned with
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) name: Arc<str>,
    pub(crate) queue: Arc<BoundedQueue>,
    pub(crate) metrics: Arc<FanoutMetrics>,
}

/// A worker thread that runs tasks until it dequeues a stop message
#[derive(Debug)]
pub struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn worker `id`
    pub(crate) fn spawn(id: usize, ctx: WorkerContext) -> Result<Self> {
        let stats = Arc::new(WorkerStats::new());
        let stats_clone = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name(format!("fanout-{}-{}", ctx.name, id))
            .spawn(move || Self::run(id, ctx, stats_clone))
            .map_err(|e| FanoutError::spawn(id, "cannot spawn worker", e))?;

        Ok(Self {
            id,
            thread: Some(thread),
            stats,
        })
    }

    /// Index of this worker within its fanout
    pub fn id(&self) -> usize {
        self.id
    }

    /// Shared handle to the counters
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// True when called from this worker's own thread
    pub fn is_current(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|t| t.thread().id() == thread::current().id())
    }

    /// Waits for the thread to exit
    pub fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| FanoutError::join(self.id, "worker panicked"))?;
        }
        Ok(())
    }

    /// Pops and runs tasks until a stop message arrives
    ///
    /// Tasks are taken in queue order; a stop message ends the loop, so every
    /// task queued before it has been run by some worker.
    fn run(id: usize, ctx: WorkerContext, stats: Arc<WorkerStats>) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "fanout_worker", fanout = %ctx.name, id = id);
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        log::trace!(target: "fanout", "worker {}-{} started", ctx.name, id);

        while let Some(Message::Run(task)) = ctx.queue.pop() {
            Self::execute_task(id, &ctx, task, &stats);
            ctx.metrics.set_queue_depth(ctx.queue.len());
            ctx.metrics.record_processed();
        }

        #[cfg(feature = "tracing")]
        debug!(
            tasks_processed = stats.get_tasks_processed(),
            tasks_panicked = stats.get_tasks_panicked(),
            "worker shutting down"
        );
        log::trace!(target: "fanout", "worker {}-{} stopped", ctx.name, id);
    }

    /// Execute a single task with panic protection, then close its span
    fn execute_task(id: usize, ctx: &WorkerContext, task: Task, stats: &WorkerStats) {
        #[cfg(feature = "tracing")]
        let origin = task.origin().clone();
        let (work, context) = task.into_parts();
        let span = context.span().cloned();

        let start = Instant::now();
        let outcome = panic::catch(move || {
            #[cfg(feature = "tracing")]
            let _entered = origin.enter();
            work(context)
        });
        let elapsed = start.elapsed();

        match &outcome {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                debug!(duration_ms = elapsed.as_millis() as u64, "task completed");
            }
            Err(report) => {
                let env = crate::env::current();
                let location = report.location.as_deref().unwrap_or("unknown");
                #[cfg(feature = "tracing")]
                tracing::error!(
                    fanout = %ctx.name,
                    worker = id,
                    panic_message = %report.message,
                    location = location,
                    "task panicked"
                );
                log::error!(
                    target: "fanout",
                    "panic in fanout worker: fanout={} worker={} message={:?} location={} app_id={} hostname={}\n{}",
                    ctx.name,
                    id,
                    report.message,
                    location,
                    env.app_id,
                    env.hostname,
                    report.backtrace
                );
                ctx.metrics.record_panic();
            }
        }

        if let Some(span) = span {
            span.finish(outcome.as_ref().err().map(|r| r.message.as_str()));
        }

        stats.record(elapsed.as_micros() as u64, outcome.is_err());
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            // Dropped without join; the thread exits on its own once it sees a stop message
            log::debug!(target: "fanout", "worker {} detached without join", self.id);
        }
    }
}
