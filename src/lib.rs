//! # Fanout
//!
//! A bounded, multi-worker task dispatcher. Work is submitted to a named
//! [`Fanout`], queued in a fixed-capacity FIFO and run by a fixed set of worker
//! threads, with a middleware chain around every submission.
//!
//! ## Features
//!
//! - **Bounded queue**: fixed capacity; stop signals never compete with work for space
//! - **Backpressure**: [`try_submit`](Fanout::try_submit) rejects with `QueueFull`,
//!   [`submit`](Fanout::submit) waits until the caller's [`Context`] gives up
//! - **Panic isolation**: a panicking task is logged with its backtrace and the
//!   worker carries on with the next one
//! - **Graceful shutdown**: everything queued before shutdown still runs
//! - **Middleware**: decorators around the [`Handler`](middleware::Handler)
//!   capability set, tracing included by default
//! - **Metrics**: queue depth, capacity and throughput per fanout name
//!
//! ## Quick Start
//!
//! ```rust
//! use fanout::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let fanout = Fanout::new("reports")?;
//!
//! for i in 0..10 {
//!     fanout.try_execute(&Context::background(), move |_ctx| {
//!         println!("report {} generated", i);
//!     })?;
//! }
//!
//! // Runs everything still queued, then joins the workers
//! fanout.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Waiting for space
//!
//! ```rust
//! use fanout::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let fanout = Fanout::builder("uploads").workers(4).buffer(16).build()?;
//!
//! // Gives up after 50ms if the queue stays full
//! let ctx = Context::background().with_timeout(Duration::from_millis(50));
//! match fanout.execute(&ctx, |_ctx| { /* upload */ }) {
//!     Ok(()) => {}
//!     Err(e) if e.is_caller_abandoned() => eprintln!("queue busy: {}", e),
//!     Err(e) => return Err(e),
//! }
//! # fanout.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//!
//! ```rust
//! use fanout::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let fanout = Fanout::builder("metered").workers(2).build()?;
//! for _ in 0..10 {
//!     fanout.try_execute(&Context::background(), |_| {})?;
//! }
//! fanout.shutdown()?;
//!
//! let snapshot = fanout.metrics().snapshot();
//! assert!(snapshot.processed >= 10);
//! for (i, stat) in fanout.worker_stats().iter().enumerate() {
//!     println!("worker {}: {} tasks", i, stat.get_tasks_processed());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod env;
pub mod fanout;
pub mod metrics;
pub mod middleware;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod trace;

pub use crate::config::FanoutConfig;
pub use crate::core::{
    work, CancellationReason, CancellationToken, Context, FanoutError, Result, Task, Work,
};
pub use crate::fanout::{Fanout, FanoutBuilder};
pub use crate::middleware::{register_global_middleware, Handler, Middleware, MiddlewareChain};
pub use crate::pool::{Lifecycle, WorkerStats};
pub use crate::trace::{Span, Tag, Trace};
