//! Per-endpoint counters exposed to management tooling.
//!
//! Each counter has a single writer (the publisher's `process` or the
//! subscriber's callback thread) and any number of readers, so relaxed
//! atomics are enough: a reader may be one increment behind but never sees a
//! torn value.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct EndpointMetrics {
    /// Blocks (one per processed batch) published by this endpoint.
    blocks_sent: AtomicU64,

    /// Events (lines) published by this endpoint.
    events_sent: AtomicU64,

    /// Blocks received from the engine, including blocks whose events were
    /// all filtered out.
    blocks_received: AtomicU64,

    /// Events forwarded downstream.
    events_received: AtomicU64,
}

/// Point-in-time copy of [`EndpointMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub blocks_sent: u64,
    pub events_sent: u64,
    pub blocks_received: u64,
    pub events_received: u64,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks_sent(&self) -> u64 {
        self.blocks_sent.load(Ordering::Relaxed)
    }

    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    pub fn blocks_received(&self) -> u64 {
        self.blocks_received.load(Ordering::Relaxed)
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub(crate) fn count_block_sent(&self) {
        self.blocks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_events_sent(&self, n: usize) {
        self.events_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn count_block_received(&self) {
        self.blocks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets blocks sent and events sent counters.
    pub fn reset_sent(&self) {
        self.blocks_sent.store(0, Ordering::Relaxed);
        self.events_sent.store(0, Ordering::Relaxed);
    }

    /// Resets blocks received and events received counters.
    pub fn reset_received(&self) {
        self.blocks_received.store(0, Ordering::Relaxed);
        self.events_received.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_sent: self.blocks_sent(),
            events_sent: self.events_sent(),
            blocks_received: self.blocks_received(),
            events_received: self.events_received(),
        }
    }
}

/// Management view of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    /// Effective endpoint address, without options.
    pub uri: String,
    pub endpoint_key: String,
    pub engine_down: bool,
    pub metrics: MetricsSnapshot,
}
