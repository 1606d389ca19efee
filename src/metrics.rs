//! Queue and throughput metrics.
//!
//! Each fanout name owns one [`FanoutMetrics`] series in the process-wide
//! [`MetricsRegistry`]. Fanouts created with the same name share the series, as
//! a labelled metric would. With the `tracing` feature enabled, every update is
//! also emitted as a `tracing` event so it can be picked up by a metrics layer.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Gauges and counters of one fanout name
#[derive(Debug, Default)]
pub struct FanoutMetrics {
    name: String,
    queue_depth: AtomicU64,
    capacity: AtomicU64,
    processed: AtomicU64,
    full: AtomicU64,
    panicked: AtomicU64,
}

impl FanoutMetrics {
    /// Create an empty series
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Gauge: tasks waiting in the queue
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::trace!(fanout = %self.name, gauge.queue_depth = depth as u64, "queue depth");
    }

    /// Gauge: queue capacity
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity as u64, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::trace!(fanout = %self.name, gauge.queue_capacity = capacity as u64, "queue capacity");
    }

    /// Counter: a task finished (successfully or not)
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::trace!(fanout = %self.name, counter.tasks_processed = 1, "task processed");
    }

    /// Counter: a non-blocking submit found the queue full
    pub fn record_full(&self) {
        self.full.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::trace!(fanout = %self.name, counter.queue_full = 1, "queue full");
    }

    /// Counter: a task panicked
    pub fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::trace!(fanout = %self.name, counter.tasks_panicked = 1, "task panicked");
    }

    /// Series name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last reported queue depth
    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Reported capacity
    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Tasks processed so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Rejections due to a full queue so far
    pub fn full(&self) -> u64 {
        self.full.load(Ordering::Relaxed)
    }

    /// Panicked tasks so far
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            name: self.name.clone(),
            queue_depth: self.queue_depth(),
            capacity: self.capacity(),
            processed: self.processed(),
            full: self.full(),
            panicked: self.panicked(),
            taken_at: Utc::now(),
        }
    }
}

/// Serializable copy of a [`FanoutMetrics`] series
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    /// Series name
    pub name: String,
    /// Queue depth gauge
    pub queue_depth: u64,
    /// Capacity gauge
    pub capacity: u64,
    /// Processed counter
    pub processed: u64,
    /// Queue-full counter
    pub full: u64,
    /// Panic counter
    pub panicked: u64,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

/// All series of the process, keyed by fanout name
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    series: DashMap<String, Arc<FanoutMetrics>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The series for `name`, created on first use
    pub fn series(&self, name: &str) -> Arc<FanoutMetrics> {
        if let Some(existing) = self.series.get(name) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.series
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(FanoutMetrics::new(name)))
                .value(),
        )
    }

    /// The series for `name` if it exists
    pub fn get(&self, name: &str) -> Option<Arc<FanoutMetrics>> {
        self.series.get(name).map(|s| Arc::clone(s.value()))
    }

    /// Snapshots of every series, sorted by name
    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        let mut all: Vec<_> = self.series.iter().map(|s| s.value().snapshot()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

/// The process-wide registry
pub fn registry() -> &'static MetricsRegistry {
    static REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();
    REGISTRY.get_or_init(MetricsRegistry::new)
}
