//! Distributed tracing integration.
//!
//! The fanout only needs a narrow tracing surface: read the active span from a
//! [`Context`](crate::Context), fork a child, tag it, install it into the context
//! handed to the next handler, and finish it once the task has run. [`Trace`] is
//! that surface; [`Span`] is the built-in implementation, which reports finished
//! spans to a pluggable [`Reporter`].
//!
//! # Example
//!
//! ```rust
//! use fanout::trace::{MemoryReporter, Span, Tag, Trace};
//! use std::sync::Arc;
//!
//! let reporter = Arc::new(MemoryReporter::new());
//! let root = Span::root("handle_request", reporter.clone());
//! let child = root.fork("", "write_audit");
//! child.set_tags(&[Tag::new("component", "audit")]);
//! child.finish(None);
//!
//! let spans = reporter.spans();
//! assert_eq!(spans.len(), 1);
//! assert_eq!(spans[0].operation, "write_audit");
//! assert_eq!(spans[0].parent_id.as_deref(), Some(root.span_id()));
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Tag key for the span kind
pub const TAG_SPAN_KIND: &str = "span.kind";
/// Tag key for the emitting component
pub const TAG_COMPONENT: &str = "component";
/// Tag key set when the traced operation failed
pub const TAG_ERROR: &str = "error";

/// A key/value annotation on a span
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    /// Create a string tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The tracing operations the fanout consumes
pub trait Trace: Send + Sync + fmt::Debug {
    /// Create a child span; an empty `service_name` inherits the parent's
    fn fork(&self, service_name: &str, operation_name: &str) -> Arc<dyn Trace>;

    /// Attach tags
    fn set_tags(&self, tags: &[Tag]);

    /// Close the span, recording `error` if the operation failed.
    ///
    /// Only the first call has an effect.
    fn finish(&self, error: Option<&str>);

    /// Identifier shared by every span of one trace
    fn trace_id(&self) -> &str;

    /// Identifier of this span
    fn span_id(&self) -> &str;
}

/// Everything known about a span once it finished
#[derive(Clone, Debug, Serialize)]
pub struct SpanRecord {
    /// Trace identifier
    pub trace_id: String,
    /// Span identifier
    pub span_id: String,
    /// Parent span, `None` for a root
    pub parent_id: Option<String>,
    /// Service that emitted the span
    pub service: String,
    /// Operation name
    pub operation: String,
    /// Tags in the order they were set
    pub tags: Vec<Tag>,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Duration in microseconds
    pub duration_us: u64,
    /// Error recorded at finish
    pub error: Option<String>,
}

impl SpanRecord {
    /// Value of the last tag with `key`
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .rev()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

/// Sink for finished spans
pub trait Reporter: Send + Sync {
    /// Called once per finished span
    fn report(&self, record: SpanRecord);
}

/// Writes finished spans to the `log` facade as JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, record: SpanRecord) {
        match serde_json::to_string(&record) {
            Ok(json) => log::debug!(target: "fanout::trace", "{}", json),
            Err(e) => log::warn!(target: "fanout::trace", "unserializable span: {}", e),
        }
    }
}

/// Keeps finished spans in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    spans: Mutex<Vec<SpanRecord>>,
}

impl MemoryReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans reported so far, in finish order
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().clone()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, record: SpanRecord) {
        self.spans.lock().push(record);
    }
}

/// Built-in [`Trace`] implementation
pub struct Span {
    trace_id: String,
    span_id: String,
    parent_id: Option<String>,
    service: String,
    operation: String,
    tags: Mutex<Vec<Tag>>,
    started_at: DateTime<Utc>,
    start: Instant,
    finished: AtomicBool,
    reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("trace_id", &self.trace_id)
            .field("span_id", &self.span_id)
            .field("operation", &self.operation)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Span {
    /// Start a new trace. The service name is the application id from the environment.
    pub fn root(operation_name: impl Into<String>, reporter: Arc<dyn Reporter>) -> Arc<Self> {
        Arc::new(Self::start(
            uuid::Uuid::new_v4().simple().to_string(),
            None,
            crate::env::current().app_id.clone(),
            operation_name.into(),
            reporter,
        ))
    }

    fn start(
        trace_id: String,
        parent_id: Option<String>,
        service: String,
        operation: String,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            trace_id,
            span_id: uuid::Uuid::new_v4().simple().to_string(),
            parent_id,
            service,
            operation,
            tags: Mutex::new(Vec::new()),
            started_at: Utc::now(),
            start: Instant::now(),
            finished: AtomicBool::new(false),
            reporter,
        }
    }

    /// Whether `finish` has been called
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Trace for Span {
    fn fork(&self, service_name: &str, operation_name: &str) -> Arc<dyn Trace> {
        let service = if service_name.is_empty() {
            self.service.clone()
        } else {
            service_name.to_string()
        };
        Arc::new(Span::start(
            self.trace_id.clone(),
            Some(self.span_id.clone()),
            service,
            operation_name.to_string(),
            Arc::clone(&self.reporter),
        ))
    }

    fn set_tags(&self, tags: &[Tag]) {
        self.tags.lock().extend_from_slice(tags);
    }

    fn finish(&self, error: Option<&str>) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut tags = std::mem::take(&mut *self.tags.lock());
        if error.is_some() {
            tags.push(Tag::new(TAG_ERROR, "true"));
        }
        self.reporter.report(SpanRecord {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            parent_id: self.parent_id.clone(),
            service: self.service.clone(),
            operation: self.operation.clone(),
            tags,
            started_at: self.started_at,
            duration_us: self.start.elapsed().as_micros() as u64,
            error: error.map(str::to_string),
        });
    }

    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn span_id(&self) -> &str {
        &self.span_id
    }
}
