//! Command buffer statistics (`Stats()` in `spec.md` §4.4).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

const LATENCY_WINDOW: usize = 2048;

/// Shared, lock-cheap counters updated by producers and the consumer.
#[derive(Debug, Default)]
pub struct BufferStats {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    queue_depth: AtomicI64,
    last_latency_ms: AtomicU64,
    recent_latencies_ms: Mutex<Vec<u64>>,
}

/// A point-in-time read of `BufferStats`, matching `spec.md`'s
/// `{enqueued, completed, failed, queueDepth, lastLatencyMs, p50, p95,
/// p99}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferStatsSnapshot {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub queue_depth: i64,
    pub last_latency_ms: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

impl BufferStats {
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dequeued(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, latency_ms: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ms);
    }

    pub fn record_failed(&self, latency_ms: u64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ms);
    }

    fn record_latency(&self, latency_ms: u64) {
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
        let mut recent = self.recent_latencies_ms.lock().expect("poisoned");
        if recent.len() >= LATENCY_WINDOW {
            recent.remove(0);
        }
        recent.push(latency_ms);
    }

    #[must_use]
    pub fn queue_depth(&self) -> i64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> BufferStatsSnapshot {
        let mut recent = self.recent_latencies_ms.lock().expect("poisoned").clone();
        recent.sort_unstable();
        let percentile = |p: f64| -> u64 {
            if recent.is_empty() {
                return 0;
            }
            let idx = ((recent.len() as f64 - 1.0) * p).round() as usize;
            recent[idx.min(recent.len() - 1)]
        };
        BufferStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
            last_latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
        }
    }
}
