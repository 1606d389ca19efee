//! Convenient re-exports for common types and traits

pub use crate::config::FanoutConfig;
pub use crate::core::{
    work, CancellationReason, CancellationToken, Context, FanoutError, Result, Work,
};
pub use crate::fanout::{Fanout, FanoutBuilder};
pub use crate::middleware::{middleware, Handler, MiddlewareChain};
pub use crate::pool::{Lifecycle, WorkerStats};
