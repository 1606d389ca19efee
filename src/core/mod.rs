//! Core types shared by the queue, the engine and the middleware

pub mod cancellation;
pub mod context;
pub mod error;
pub mod once;
pub mod task;

pub use cancellation::{CancellationReason, CancellationToken};
pub use context::Context;
pub use error::{FanoutError, Result};
pub use once::RefOnce;
pub use task::{work, Task, Work};
