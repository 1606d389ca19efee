//! The unit of work carried by the queue

use crate::core::context::Context;
use std::fmt;

/// A submitted closure; it receives the detached context it was queued with
pub type Work = Box<dyn FnOnce(Context) + Send + 'static>;

/// Box a closure as [`Work`]
pub fn work<F>(f: F) -> Work
where
    F: FnOnce(Context) + Send + 'static,
{
    Box::new(f)
}

/// Work paired with the context it will run under
///
/// A task is built once, at submission, and never changed afterwards. The queue
/// owns it until a worker dequeues it, then that worker owns it until it has run.
pub struct Task {
    work: Work,
    context: Context,
    #[cfg(feature = "tracing")]
    origin: tracing::Span,
}

impl Task {
    /// Pair `work` with the detached form of `ctx`
    ///
    /// With the `tracing` feature the submitter's current `tracing` span is
    /// captured too, and the worker enters it while the work runs.
    pub fn new(work: Work, ctx: &Context) -> Self {
        Self {
            work,
            context: ctx.detach(),
            #[cfg(feature = "tracing")]
            origin: tracing::Span::current(),
        }
    }

    /// The context the work will receive
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// `tracing` span that was current at submission
    #[cfg(feature = "tracing")]
    pub fn origin(&self) -> &tracing::Span {
        &self.origin
    }

    /// Split into its parts for execution
    pub fn into_parts(self) -> (Work, Context) {
        (self.work, self.context)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
