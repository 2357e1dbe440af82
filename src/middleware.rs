//! Stock middleware: logging, timing, predicate filtering (v0.1)
//!
//! Middleware observes every event before listener fan-out, in
//! registration order. These three cover the cross-cutting concerns the
//! runtime ships with; hosts register their own for anything else.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::info;

use crate::bus::{Middleware, Next};
use crate::error::ScoutError;
use crate::event::Event;

/// Logs every event at info level with its source and seq
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn handle(&self, event: &Event, next: Next<'_>) -> Result<(), ScoutError> {
        info!(event = %event.name(), source = %event.source, seq = event.seq, "event");
        next.run()
    }
}

/// Per-event-type dispatch counters and cumulative delivery time
#[derive(Default)]
pub struct TimingMiddleware {
    stats: DashMap<&'static str, TimingEntry>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimingEntry {
    pub count: u64,
    pub total_micros: u64,
}

impl TimingMiddleware {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of (event name, entry) pairs
    pub fn snapshot(&self) -> Vec<(&'static str, TimingEntry)> {
        self.stats.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    /// Total deliveries observed for one event name
    pub fn count_for(&self, name: &str) -> u64 {
        self.stats.get(name).map_or(0, |e| e.count)
    }
}

impl Middleware for TimingMiddleware {
    fn handle(&self, event: &Event, next: Next<'_>) -> Result<(), ScoutError> {
        let started = Instant::now();
        let result = next.run();
        let elapsed = started.elapsed().as_micros() as u64;

        let mut entry = self.stats.entry(event.name().as_str()).or_default();
        entry.count += 1;
        entry.total_micros += elapsed;
        result
    }
}

/// Delivers only events matching the predicate; everything else is
/// short-circuited before any listener runs.
pub struct PredicateFilter<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateFilter<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> Middleware for PredicateFilter<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn handle(&self, event: &Event, next: Next<'_>) -> Result<(), ScoutError> {
        if (self.predicate)(event) {
            next.run()
        } else {
            Ok(())
        }
    }
}
