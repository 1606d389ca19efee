//! Error types for the fanout

use crate::core::cancellation::CancellationReason;

/// Result type for fanout operations
pub type Result<T> = std::result::Result<T, FanoutError>;

/// Errors that can occur when building or using a fanout
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FanoutError {
    /// The bounded queue has no free slot (non-blocking submit only)
    #[error("fanout '{name}': queue is full ({current}/{max} tasks queued)")]
    QueueFull {
        /// Name of the fanout
        name: String,
        /// Current queue depth
        current: usize,
        /// Queue capacity
        max: usize,
    },

    /// The fanout is shutting down or has shut down
    #[error("fanout '{name}' is closed: {reason}")]
    Closed {
        /// Name of the fanout
        name: String,
        /// Why the lifecycle scope was cancelled
        reason: CancellationReason,
    },

    /// The caller's context was cancelled while waiting for queue space
    #[error("context canceled: {reason}")]
    Canceled {
        /// Reason recorded on the caller's token
        reason: CancellationReason,
    },

    /// The caller's deadline passed while waiting for queue space
    #[error("context deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded {
        /// Time the caller allowed, in milliseconds
        timeout_ms: u64,
    },

    /// A construction parameter is out of range
    #[error("invalid fanout config: {parameter} {message}")]
    InvalidConfig {
        /// Offending field
        parameter: String,
        /// What is wrong with it
        message: String,
    },

    /// The OS refused to start a worker
    #[error("cannot start worker {thread_id}: {message}")]
    SpawnError {
        /// Index of the worker
        thread_id: usize,
        /// Context for the failure
        message: String,
        /// Error from `thread::Builder::spawn`
        #[source]
        source: std::io::Error,
    },

    /// A worker thread terminated by panicking outside any task
    #[error("worker {thread_id} did not exit cleanly: {message}")]
    JoinError {
        /// Index of the worker
        thread_id: usize,
        /// Context for the failure
        message: String,
    },
}

impl FanoutError {
    /// Create a queue full error
    pub fn queue_full(name: impl Into<String>, current: usize, max: usize) -> Self {
        FanoutError::QueueFull {
            name: name.into(),
            current,
            max,
        }
    }

    /// Create a closed error
    pub fn closed(name: impl Into<String>, reason: CancellationReason) -> Self {
        FanoutError::Closed {
            name: name.into(),
            reason,
        }
    }

    /// Create a canceled error
    pub fn canceled(reason: CancellationReason) -> Self {
        FanoutError::Canceled { reason }
    }

    /// Create a deadline exceeded error
    pub fn deadline_exceeded(timeout_ms: u64) -> Self {
        FanoutError::DeadlineExceeded { timeout_ms }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        FanoutError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Wrap a failed worker spawn
    pub fn spawn(thread_id: usize, message: impl Into<String>, source: std::io::Error) -> Self {
        FanoutError::SpawnError {
            thread_id,
            message: message.into(),
            source,
        }
    }

    /// Create a join error
    pub fn join(thread_id: usize, message: impl Into<String>) -> Self {
        FanoutError::JoinError {
            thread_id,
            message: message.into(),
        }
    }

    /// True for the capacity rejection of a non-blocking submit
    pub fn is_queue_full(&self) -> bool {
        matches!(self, FanoutError::QueueFull { .. })
    }

    /// True when the fanout refused work because it is shutting down
    pub fn is_closed(&self) -> bool {
        matches!(self, FanoutError::Closed { .. })
    }

    /// True when the caller gave up waiting (cancellation or deadline)
    pub fn is_caller_abandoned(&self) -> bool {
        matches!(
            self,
            FanoutError::Canceled { .. } | FanoutError::DeadlineExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_predicates() {
        let full = FanoutError::queue_full("audit", 8, 8);
        assert!(full.is_queue_full());
        assert!(!full.is_closed());
        assert!(!full.is_caller_abandoned());

        assert!(FanoutError::closed("audit", CancellationReason::Shutdown).is_closed());
        assert!(FanoutError::deadline_exceeded(50).is_caller_abandoned());
        assert!(FanoutError::canceled(CancellationReason::Manual).is_caller_abandoned());
    }

    #[test]
    fn test_messages() {
        let cases = [
            (
                FanoutError::queue_full("audit", 4, 4),
                "fanout 'audit': queue is full (4/4 tasks queued)",
            ),
            (
                FanoutError::closed("audit", CancellationReason::Shutdown),
                "fanout 'audit' is closed: shutdown requested",
            ),
            (
                FanoutError::deadline_exceeded(50),
                "context deadline exceeded after 50ms",
            ),
            (
                FanoutError::invalid_config("workers", "must be greater than 0"),
                "invalid fanout config: workers must be greater than 0",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_spawn_error_keeps_io_source() {
        let io_err = io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached");
        let err = FanoutError::spawn(5, "cannot spawn worker", io_err);

        assert_eq!(err.to_string(), "cannot start worker 5: cannot spawn worker");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("thread limit reached"));
    }
}
