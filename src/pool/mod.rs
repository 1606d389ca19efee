//! Worker pool engine, worker threads and panic isolation

pub mod engine;
pub mod panic;
pub mod worker;

pub use engine::{Engine, Lifecycle, DEFAULT_NAME};
pub use worker::{Worker, WorkerStats};
