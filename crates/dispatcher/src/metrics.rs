//! Dispatch metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::DispatchError;

/// In-process counters for one dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Requests handed to `dispatch`
    requests: AtomicU64,
    /// Tasks accepted by the publisher
    tasks_published: AtomicU64,
    invalid_input: AtomicU64,
    unknown_route: AtomicU64,
    publish_failures: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tasks_published(&self) {
        self.tasks_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed dispatch under its error kind
    pub fn record_failure(&self, err: &DispatchError) {
        let counter = match err {
            DispatchError::InvalidInput { .. } => &self.invalid_input,
            DispatchError::UnknownRoute { .. } => &self.unknown_route,
            DispatchError::Publish { .. } => &self.publish_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            tasks_published: self.tasks_published.load(Ordering::Relaxed),
            invalid_input: self.invalid_input.load(Ordering::Relaxed),
            unknown_route: self.unknown_route.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub tasks_published: u64,
    pub invalid_input: u64,
    pub unknown_route: u64,
    pub publish_failures: u64,
}

impl MetricsSnapshot {
    /// Requests that ended in any error
    pub fn failures(&self) -> u64 {
        self.invalid_input + self.unknown_route + self.publish_failures
    }
}
