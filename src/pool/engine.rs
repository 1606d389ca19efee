//! Worker pool engine

use crate::config::FanoutConfig;
use crate::core::{CancellationReason, CancellationToken, Context, FanoutError, Result, Task, Work};
use crate::metrics::{self, FanoutMetrics};
use crate::middleware::Handler;
use crate::pool::panic::HookGuard;
use crate::pool::worker::{Worker, WorkerContext, WorkerStats};
use crate::queue::{BoundedQueue, QueueError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Name used when a fanout is created with an empty one
pub const DEFAULT_NAME: &str = "anonymous";

/// Lifecycle of an engine; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Accepting work
    Running,
    /// Shutdown has begun; queued work is draining
    Closing,
    /// All workers have exited
    Closed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Running => write!(f, "running"),
            Lifecycle::Closing => write!(f, "closing"),
            Lifecycle::Closed => write!(f, "closed"),
        }
    }
}

/// Bounded queue plus a fixed set of worker threads
///
/// The engine is the innermost [`Handler`] of every fanout. Capacity and worker
/// count are fixed for its lifetime. Workers start in the constructor and run
/// until [`shutdown`](Handler::shutdown) (or drop) sends each of them a stop
/// message behind whatever work is still queued.
///
/// Submitters hold the lifecycle lock for reading across the closed check and
/// the enqueue, and shutdown takes it for writing before queueing the stop
/// messages, so no task can land behind a stop message.
pub struct Engine {
    name: Arc<str>,
    config: FanoutConfig,
    queue: Arc<BoundedQueue>,
    scope: CancellationToken,
    lifecycle: RwLock<Lifecycle>,
    workers: Mutex<Vec<Worker>>,
    stats: Vec<Arc<WorkerStats>>,
    metrics: Arc<FanoutMetrics>,
    _hook: HookGuard,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("queue", &self.queue)
            .finish()
    }
}

impl Engine {
    /// Validate `config` and start the workers
    pub fn new(name: &str, config: FanoutConfig) -> Result<Self> {
        config.validate()?;

        let name: Arc<str> = if name.is_empty() {
            Arc::from(DEFAULT_NAME)
        } else {
            Arc::from(name)
        };
        // One reserved slot per worker for its stop message
        let queue = Arc::new(BoundedQueue::new(config.buffer, config.workers));
        let scope = CancellationToken::new();
        let metrics = metrics::registry().series(&name);
        metrics.set_capacity(config.buffer);
        metrics.set_queue_depth(queue.len());
        let hook = HookGuard::acquire();

        let worker_ctx = WorkerContext {
            name: Arc::clone(&name),
            queue: Arc::clone(&queue),
            metrics: Arc::clone(&metrics),
        };
        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            match Worker::spawn(id, worker_ctx.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    log::error!(target: "fanout", "fanout '{}': {}", name, e);
                    scope.cancel_with_reason(CancellationReason::Shutdown);
                    for _ in &workers {
                        queue.push_stop();
                    }
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }
        let stats = workers.iter().map(Worker::stats).collect();

        log::debug!(
            target: "fanout",
            "fanout '{}' started with {} workers, buffer {}",
            name,
            config.workers,
            config.buffer
        );

        Ok(Self {
            name,
            config,
            queue,
            scope,
            lifecycle: RwLock::new(Lifecycle::Running),
            workers: Mutex::new(workers),
            stats,
            metrics,
            _hook: hook,
        })
    }

    /// Engine name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> FanoutConfig {
        self.config
    }

    /// Tasks currently queued
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if no task is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Current lifecycle state
    pub fn state(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    /// Metrics series of this engine's name
    pub fn metrics(&self) -> Arc<FanoutMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Per-worker statistics, indexed by worker id
    pub fn worker_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.stats.clone()
    }

    fn closed(&self) -> FanoutError {
        let reason = self.scope.reason().unwrap_or(CancellationReason::Shutdown);
        FanoutError::closed(&*self.name, reason)
    }

    /// Finish the span of a submission that never made it onto the queue
    fn reject(&self, ctx: &Context, err: FanoutError) -> FanoutError {
        if let Some(span) = ctx.span() {
            span.finish(Some(&err.to_string()));
        }
        err
    }

    fn accepted(&self) -> Result<()> {
        self.metrics.set_queue_depth(self.queue.len());
        Ok(())
    }

    fn is_accepting(state: Lifecycle, scope: &CancellationToken) -> bool {
        state == Lifecycle::Running && !scope.is_cancelled()
    }
}

impl Handler for Engine {
    fn try_submit(&self, ctx: &Context, work: Work) -> Result<()> {
        let state = self.lifecycle.read();
        if !Self::is_accepting(*state, &self.scope) {
            return Err(self.reject(ctx, self.closed()));
        }

        match self.queue.try_push(Task::new(work, ctx)) {
            Ok(()) => self.accepted(),
            Err(QueueError::Full(task)) => {
                self.metrics.record_full();
                let err = FanoutError::queue_full(&*self.name, self.queue.len(), self.capacity());
                Err(self.reject(task.context(), err))
            }
            Err(e) => {
                let task = e.into_task();
                Err(self.reject(task.context(), self.closed()))
            }
        }
    }

    fn submit(&self, ctx: &Context, work: Work) -> Result<()> {
        let state = self.lifecycle.read();
        if !Self::is_accepting(*state, &self.scope) {
            return Err(self.reject(ctx, self.closed()));
        }

        match self.queue.push_wait(Task::new(work, ctx), ctx, self.scope.done()) {
            Ok(()) => self.accepted(),
            Err(QueueError::Abandoned(task)) => Err(self.reject(task.context(), ctx.abandoned())),
            Err(e) => {
                let task = e.into_task();
                Err(self.reject(task.context(), self.closed()))
            }
        }
    }

    /// Stop accepting work, let the workers drain the queue, then join them
    ///
    /// Only the first call shuts down; later calls return `Closed`. Submitters
    /// blocked waiting for space are woken and get `Closed` as well.
    ///
    /// Called from one of the engine's own tasks, it joins every other worker
    /// and returns without waiting for the calling one, which keeps draining
    /// after the task returns. The state then stays [`Lifecycle::Closing`].
    fn shutdown(&self) -> Result<()> {
        if !self.scope.cancel_with_reason(CancellationReason::Shutdown) {
            return Err(self.closed());
        }

        // Waits for in-flight submits; blocked ones were just interrupted
        *self.lifecycle.write() = Lifecycle::Closing;
        log::debug!(
            target: "fanout",
            "fanout '{}' closing with {} tasks queued",
            self.name,
            self.queue.len()
        );

        let workers = std::mem::take(&mut *self.workers.lock());
        for _ in &workers {
            self.queue.push_stop();
        }

        let mut result = Ok(());
        let mut self_hosted = false;
        for worker in workers {
            if worker.is_current() {
                // Exits on its own stop message once the task returns
                self_hosted = true;
                continue;
            }
            if let Err(e) = worker.join() {
                log::error!(target: "fanout", "fanout '{}': {}", self.name, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        self.metrics.set_queue_depth(self.queue.len());
        if self_hosted {
            log::debug!(
                target: "fanout",
                "fanout '{}' closing from its own task; calling worker still draining",
                self.name
            );
            return result;
        }
        *self.lifecycle.write() = Lifecycle::Closed;
        log::debug!(target: "fanout", "fanout '{}' closed", self.name);
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.state() == Lifecycle::Running {
            if let Err(e) = self.shutdown() {
                log::error!(
                    target: "fanout",
                    "failed to shut down fanout '{}' during drop: {}",
                    self.name,
                    e
                );
            }
        }
    }
}
