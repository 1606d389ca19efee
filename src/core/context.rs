//! Caller context: cancellation, deadline, active span and metadata

use crate::core::cancellation::{CancellationReason, CancellationToken};
use crate::core::error::FanoutError;
use crate::trace::Trace;
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Request-scoped state passed alongside every submission
///
/// A context is cheap to clone; every `with_*` method returns a new context
/// derived from `self` and leaves `self` untouched.
///
/// # Example
///
/// ```rust
/// use fanout::Context;
/// use std::time::Duration;
///
/// let ctx = Context::background()
///     .with_value("tenant", "acme")
///     .with_timeout(Duration::from_secs(1));
///
/// let detached = ctx.detach();
/// assert_eq!(detached.value("tenant"), Some("acme"));
/// assert!(detached.deadline().is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: Option<CancellationToken>,
    deadline: Option<(Instant, Duration)>,
    span: Option<Arc<dyn Trace>>,
    values: Arc<BTreeMap<String, String>>,
}

impl Context {
    /// An empty context: never cancelled, no deadline, no span
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context cancelled by the returned token (or by this context's token)
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = match &self.token {
            Some(parent) => parent.child(),
            None => CancellationToken::new(),
        };
        let ctx = Self {
            token: Some(token.clone()),
            ..self.clone()
        };
        (ctx, token)
    }

    /// Derive a context whose deadline is `timeout` from now
    ///
    /// An earlier deadline already on `self` is kept. A timeout too large to
    /// represent as an `Instant` adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let Some(at) = Instant::now().checked_add(timeout) else {
            return self.clone();
        };
        match self.deadline {
            Some((existing, _)) if existing <= at => self.clone(),
            _ => Self {
                deadline: Some((at, timeout)),
                ..self.clone()
            },
        }
    }

    /// Derive a context with an absolute deadline
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        self.with_timeout(deadline.saturating_duration_since(Instant::now()))
    }

    /// Derive a context with `span` as the active span
    pub fn with_span(&self, span: Arc<dyn Trace>) -> Self {
        Self {
            span: Some(span),
            ..self.clone()
        }
    }

    /// Derive a context carrying an extra metadata value
    pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.into(), value.into());
        Self {
            values: Arc::new(values),
            ..self.clone()
        }
    }

    /// The active span, if any
    pub fn span(&self) -> Option<&Arc<dyn Trace>> {
        self.span.as_ref()
    }

    /// A metadata value
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|(at, _)| at)
    }

    /// The cancellation token, if any
    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    /// Why this context is done, `None` while it is still live
    pub fn err(&self) -> Option<FanoutError> {
        if let Some(token) = &self.token {
            if token.is_cancelled() {
                let reason = token.reason().unwrap_or(CancellationReason::Manual);
                return Some(FanoutError::canceled(reason));
            }
        }
        match self.deadline {
            Some((at, timeout)) if Instant::now() >= at => {
                Some(FanoutError::deadline_exceeded(timeout.as_millis() as u64))
            }
            _ => None,
        }
    }

    /// Error to report once a wait on this context was abandoned
    pub(crate) fn abandoned(&self) -> FanoutError {
        self.err().unwrap_or_else(|| match self.deadline {
            Some((_, timeout)) => FanoutError::deadline_exceeded(timeout.as_millis() as u64),
            None => FanoutError::canceled(CancellationReason::Manual),
        })
    }

    /// Channel that disconnects when the token is cancelled; never fires without a token
    pub fn done(&self) -> Receiver<()> {
        match &self.token {
            Some(token) => token.done().clone(),
            None => crossbeam_channel::never(),
        }
    }

    /// Channel that fires at the deadline; never fires without one
    pub fn deadline_timer(&self) -> Receiver<Instant> {
        match self.deadline {
            Some((at, _)) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        }
    }

    /// A context with this span and metadata but none of the cancellation
    ///
    /// Work accepted for asynchronous execution runs with a detached context so
    /// that the submitter returning, or being cancelled, cannot cut it short.
    pub fn detach(&self) -> Self {
        Self {
            token: None,
            deadline: None,
            span: self.span.clone(),
            values: Arc::clone(&self.values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{MemoryReporter, Span};
    use std::thread;

    #[test]
    fn test_background_is_live() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.span().is_none());
        assert!(ctx.done().try_recv().is_err());
    }

    #[test]
    fn test_with_cancel() {
        let (ctx, token) = Context::background().with_cancel();
        assert!(ctx.err().is_none());
        token.cancel();
        let err = ctx.err().expect("cancelled context reports an error");
        assert!(matches!(err, FanoutError::Canceled { .. }));
    }

    #[test]
    fn test_nested_cancel_follows_parent() {
        let (parent, token) = Context::background().with_cancel();
        let (child, _child_token) = parent.with_cancel();
        token.cancel();
        assert!(child.err().is_some());
    }

    #[test]
    fn test_timeout_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        assert!(ctx.err().is_none());
        thread::sleep(Duration::from_millis(30));
        assert!(matches!(
            ctx.err(),
            Some(FanoutError::DeadlineExceeded { timeout_ms: 10 })
        ));
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let short = Context::background().with_timeout(Duration::from_millis(10));
        let longer = short.with_timeout(Duration::from_secs(10));
        assert_eq!(short.deadline(), longer.deadline());
    }

    #[test]
    fn test_unrepresentable_timeout_means_no_deadline() {
        let ctx = Context::background().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());
        assert!(ctx.deadline_timer().try_recv().is_err());

        // An existing deadline is kept
        let short = Context::background().with_timeout(Duration::from_secs(1));
        assert_eq!(short.with_timeout(Duration::MAX).deadline(), short.deadline());
    }

    #[test]
    fn test_detach_drops_cancellation_keeps_span() {
        let reporter = Arc::new(MemoryReporter::new());
        let (ctx, token) = Context::background()
            .with_span(Span::root("op", reporter))
            .with_value("k", "v")
            .with_timeout(Duration::from_millis(1))
            .with_cancel();
        token.cancel();

        let detached = ctx.detach();
        assert!(detached.err().is_none());
        assert!(detached.token().is_none());
        assert!(detached.deadline().is_none());
        assert!(detached.span().is_some());
        assert_eq!(detached.value("k"), Some("v"));
    }
}
