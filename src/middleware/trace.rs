//! Built-in tracing middleware

use super::{middleware, Handler, Middleware};
use crate::core::{Context, Result, Work};
use crate::trace::{Tag, TAG_COMPONENT, TAG_SPAN_KIND};

/// Operation name of spans forked for non-blocking submits
pub const OP_TRY_SUBMIT: &str = "fanout:try_submit";
/// Operation name of spans forked for blocking submits
pub const OP_SUBMIT: &str = "fanout:submit";
/// Tag key carrying the fanout name
pub const TAG_FANOUT_NAME: &str = "fanout.name";

/// Forks a child span for every submission that arrives with an active span
///
/// The child is installed in the context passed down the chain, so the task
/// runs under it. The worker finishes it after the task has run, which makes
/// the span cover execution rather than just enqueueing.
pub struct TraceHandler<H> {
    inner: H,
    name: String,
}

impl<H: Handler> TraceHandler<H> {
    /// Wrap `inner`
    pub fn new(name: impl Into<String>, inner: H) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }

    fn fork(&self, ctx: &Context, operation: &str) -> Option<Context> {
        let parent = ctx.span()?;
        let span = parent.fork("", operation);
        span.set_tags(&[
            Tag::new(TAG_SPAN_KIND, "background"),
            Tag::new(TAG_COMPONENT, "sync/pipeline/fanout"),
            Tag::new(TAG_FANOUT_NAME, self.name.as_str()),
        ]);
        Some(ctx.with_span(span))
    }
}

impl<H: Handler> Handler for TraceHandler<H> {
    fn try_submit(&self, ctx: &Context, work: Work) -> Result<()> {
        match self.fork(ctx, OP_TRY_SUBMIT) {
            Some(traced) => self.inner.try_submit(&traced, work),
            None => self.inner.try_submit(ctx, work),
        }
    }

    fn submit(&self, ctx: &Context, work: Work) -> Result<()> {
        match self.fork(ctx, OP_SUBMIT) {
            Some(traced) => self.inner.submit(&traced, work),
            None => self.inner.submit(ctx, work),
        }
    }

    fn shutdown(&self) -> Result<()> {
        self.inner.shutdown()
    }
}

/// The trace middleware as a chain entry
pub fn trace_middleware() -> Middleware {
    middleware(|name, _config, inner| Box::new(TraceHandler::new(name, inner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{MemoryReporter, Span, Trace};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Runs work inline and finishes its span, standing in for the engine
    #[derive(Default)]
    struct Inline {
        seen: Mutex<Vec<Option<String>>>,
    }

    impl Handler for Inline {
        fn try_submit(&self, ctx: &Context, work: Work) -> Result<()> {
            self.seen
                .lock()
                .push(ctx.span().map(|s| s.span_id().to_string()));
            let span = ctx.span().cloned();
            work(ctx.clone());
            if let Some(span) = span {
                span.finish(None);
            }
            Ok(())
        }

        fn submit(&self, ctx: &Context, work: Work) -> Result<()> {
            self.try_submit(ctx, work)
        }

        fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_forks_child_span_with_tags() {
        let reporter = Arc::new(MemoryReporter::new());
        let root = Span::root("request", reporter.clone());
        let ctx = Context::background().with_span(root.clone());

        let handler = TraceHandler::new("audit", Inline::default());
        handler.try_submit(&ctx, Box::new(|_| {})).unwrap();
        handler.submit(&ctx, Box::new(|_| {})).unwrap();

        let spans = reporter.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].operation, OP_TRY_SUBMIT);
        assert_eq!(spans[1].operation, OP_SUBMIT);
        for span in &spans {
            assert_eq!(span.parent_id.as_deref(), Some(root.span_id()));
            assert_eq!(span.tag(TAG_SPAN_KIND), Some("background"));
            assert_eq!(span.tag(TAG_COMPONENT), Some("sync/pipeline/fanout"));
            assert_eq!(span.tag(TAG_FANOUT_NAME), Some("audit"));
        }
        // root itself is untouched
        assert!(!root.is_finished());
    }

    #[test]
    fn test_no_span_passes_context_through() {
        let inner = Arc::new(Inline::default());
        let handler = TraceHandler::new("plain", Arc::clone(&inner));
        handler
            .try_submit(&Context::background(), Box::new(|_| {}))
            .unwrap();
        assert_eq!(*inner.seen.lock(), vec![None]);
    }
}
