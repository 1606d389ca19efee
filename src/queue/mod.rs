//! The bounded queue between submitters and workers.
//!
//! Elements are [`Message`]s: either a real [`Task`] or a stop signal telling the
//! worker that dequeues it to exit. [`BoundedQueue`] bounds the number of tasks
//! while always leaving room for the stop signals of a shutdown.

mod bounded;

pub use bounded::BoundedQueue;

use crate::core::Task;

/// Element type of the queue
#[derive(Debug)]
pub enum Message {
    /// Work to execute
    Run(Task),
    /// Stop the worker that receives this
    Stop,
}

/// Errors that can occur during queue operations.
///
/// Every variant hands the rejected task back to the caller.
#[derive(Debug)]
pub enum QueueError {
    /// Queue has no free slot.
    Full(Task),
    /// The caller's context was cancelled or hit its deadline while waiting.
    Abandoned(Task),
    /// The wait was interrupted by its owner (shutdown).
    Interrupted(Task),
    /// Queue channels are gone.
    Disconnected(Task),
}

impl QueueError {
    /// Recover the rejected task.
    pub fn into_task(self) -> Task {
        match self {
            QueueError::Full(task)
            | QueueError::Abandoned(task)
            | QueueError::Interrupted(task)
            | QueueError::Disconnected(task) => task,
        }
    }
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "queue is full"),
            QueueError::Abandoned(_) => write!(f, "caller stopped waiting"),
            QueueError::Interrupted(_) => write!(f, "wait interrupted"),
            QueueError::Disconnected(_) => write!(f, "queue is disconnected"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
