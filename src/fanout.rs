//! The public fanout facade

use crate::config::FanoutConfig;
use crate::core::{work, Context, Result, Work};
use crate::metrics::FanoutMetrics;
use crate::middleware::{global_chain, Handler, MiddlewareChain};
use crate::pool::{Engine, Lifecycle, WorkerStats};
use std::fmt;
use std::sync::Arc;

/// A named, bounded, multi-worker task dispatcher
///
/// Submissions go through the middleware chain captured at construction and
/// end up on the engine's bounded queue, from which the workers run them.
/// Accepted work runs with a detached copy of the submitter's context: it keeps
/// the trace span and values but not the cancellation.
///
/// Dropping a running fanout shuts it down gracefully, running every queued task
/// first.
///
/// # Example
///
/// ```rust
/// use fanout::prelude::*;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// # fn main() -> Result<()> {
/// let fanout = Fanout::builder("audit").workers(4).buffer(128).build()?;
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..10 {
///     let counter = Arc::clone(&counter);
///     fanout.try_execute(&Context::background(), move |_ctx| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })?;
/// }
///
/// fanout.shutdown()?;
/// assert_eq!(counter.load(Ordering::SeqCst), 10);
/// # Ok(())
/// # }
/// ```
pub struct Fanout {
    engine: Arc<Engine>,
    handler: Box<dyn Handler>,
}

impl fmt::Debug for Fanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fanout").field("engine", &self.engine).finish()
    }
}

impl Fanout {
    /// Create a fanout with the default configuration and the process-wide middleware chain
    pub fn new(name: &str) -> Result<Self> {
        Self::with_config(name, FanoutConfig::default())
    }

    /// Create a fanout with `config` and the process-wide middleware chain
    pub fn with_config(name: &str, config: FanoutConfig) -> Result<Self> {
        Self::with_middleware(name, config, &global_chain())
    }

    /// Create a fanout wrapped by exactly the middleware in `chain`
    pub fn with_middleware(name: &str, config: FanoutConfig, chain: &MiddlewareChain) -> Result<Self> {
        let engine = Arc::new(Engine::new(name, config)?);
        let handler = chain.apply(engine.name(), &config, Box::new(Arc::clone(&engine)));
        Ok(Self { engine, handler })
    }

    /// Start building a fanout named `name`
    pub fn builder(name: impl Into<String>) -> FanoutBuilder {
        FanoutBuilder::new(name)
    }

    /// Enqueue `work` without waiting
    ///
    /// Fails with `QueueFull` when no slot is free and with `Closed` once
    /// shutdown has begun. `None` is accepted and ignored.
    pub fn try_submit(&self, ctx: &Context, work: Option<Work>) -> Result<()> {
        match work {
            Some(work) => self.handler.try_submit(ctx, work),
            None => Ok(()),
        }
    }

    /// Enqueue `work`, waiting for a free slot
    ///
    /// The wait is bounded only by `ctx`: its cancellation or deadline ends the
    /// wait with that error. `None` is accepted and ignored.
    pub fn submit(&self, ctx: &Context, work: Option<Work>) -> Result<()> {
        match work {
            Some(work) => self.handler.submit(ctx, work),
            None => Ok(()),
        }
    }

    /// [`try_submit`](Self::try_submit) for a closure
    pub fn try_execute<F>(&self, ctx: &Context, f: F) -> Result<()>
    where
        F: FnOnce(Context) + Send + 'static,
    {
        self.handler.try_submit(ctx, work(f))
    }

    /// [`submit`](Self::submit) for a closure
    pub fn execute<F>(&self, ctx: &Context, f: F) -> Result<()>
    where
        F: FnOnce(Context) + Send + 'static,
    {
        self.handler.submit(ctx, work(f))
    }

    /// Stop accepting work, run everything already queued and join the workers
    ///
    /// A second call returns `Closed`.
    pub fn shutdown(&self) -> Result<()> {
        self.handler.shutdown()
    }

    /// Fanout name
    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Configuration the fanout was built with
    pub fn config(&self) -> FanoutConfig {
        self.engine.config()
    }

    /// Tasks currently queued
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    /// True if no task is queued
    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.engine.capacity()
    }

    /// Lifecycle state
    pub fn state(&self) -> Lifecycle {
        self.engine.state()
    }

    /// Metrics series of this fanout's name
    pub fn metrics(&self) -> Arc<FanoutMetrics> {
        self.engine.metrics()
    }

    /// Per-worker statistics
    pub fn worker_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.engine.worker_stats()
    }
}

impl Drop for Fanout {
    fn drop(&mut self) {
        // Through the chain so middleware sees the shutdown too
        if self.engine.state() == Lifecycle::Running {
            if let Err(e) = self.handler.shutdown() {
                log::error!(
                    target: "fanout",
                    "failed to shut down fanout '{}' during drop: {}",
                    self.engine.name(),
                    e
                );
            }
        }
    }
}

/// Builder for [`Fanout`]
///
/// ```rust
/// use fanout::{Fanout, MiddlewareChain};
///
/// let fanout = Fanout::builder("mail")
///     .workers(2)
///     .buffer(64)
///     .middleware(MiddlewareChain::new())
///     .build()
///     .unwrap();
/// assert_eq!(fanout.capacity(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct FanoutBuilder {
    name: String,
    config: FanoutConfig,
    chain: Option<MiddlewareChain>,
}

impl FanoutBuilder {
    /// Builder with the default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: FanoutConfig::default(),
            chain: None,
        }
    }

    /// Set the number of worker threads
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config = self.config.with_workers(workers);
        self
    }

    /// Set the queue capacity
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.config = self.config.with_buffer(buffer);
        self
    }

    /// Replace the whole configuration
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn config(mut self, config: FanoutConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `chain` instead of the process-wide middleware chain
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn middleware(mut self, chain: MiddlewareChain) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Validate the configuration and start the fanout
    pub fn build(self) -> Result<Fanout> {
        match self.chain {
            Some(chain) => Fanout::with_middleware(&self.name, self.config, &chain),
            None => Fanout::with_config(&self.name, self.config),
        }
    }
}
