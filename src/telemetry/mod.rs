//! Observability Hooks (C10): named counters/gauges/histograms
//! (`spec.md` §4.10, §6) backed by real in-memory state, a text
//! exposition format, and a real-time broadcast stream of every update
//! (`SPEC_FULL.md` §4, "Real-time metric stream").

pub mod names;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const HISTOGRAM_WINDOW: usize = 1024;
const BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// One tick published on every counter/gauge/histogram update.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Registry {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
    histograms: HashMap<String, Vec<f64>>,
}

/// The process-wide metrics registry. One instance is shared across
/// every tenant worker.
pub struct MetricsRegistry {
    inner: Mutex<Registry>,
    tx: broadcast::Sender<MetricSample>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Mutex::new(Registry::default()),
            tx,
        }
    }

    pub fn incr_counter(&self, name: &str, delta: u64) {
        let value = {
            let mut inner = self.inner.lock().expect("poisoned");
            let entry = inner.counters.entry(name.to_owned()).or_insert(0);
            *entry += delta;
            *entry
        };
        self.publish(name, MetricKind::Counter, value as f64);
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        {
            let mut inner = self.inner.lock().expect("poisoned");
            inner.gauges.insert(name.to_owned(), value);
        }
        self.publish(name, MetricKind::Gauge, value);
    }

    pub fn observe_histogram(&self, name: &str, value: f64) {
        {
            let mut inner = self.inner.lock().expect("poisoned");
            let samples = inner.histograms.entry(name.to_owned()).or_default();
            if samples.len() >= HISTOGRAM_WINDOW {
                samples.remove(0);
            }
            samples.push(value);
        }
        self.publish(name, MetricKind::Histogram, value);
    }

    fn publish(&self, name: &str, kind: MetricKind, value: f64) {
        let _ = self.tx.send(MetricSample {
            name: name.to_owned(),
            kind,
            value,
            at: Utc::now(),
        });
    }

    /// A live stream of every metric update from this point forward.
    /// Finite once every sender (this registry) is dropped, infinite
    /// otherwise.
    #[must_use]
    pub fn subscribe(&self) -> BroadcastStream<MetricSample> {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// Prometheus-ish text exposition for the `/metrics` endpoint. Not a
    /// full OTel/Prometheus integration (out of scope) — just the named
    /// counters/gauges/histograms as plain text lines.
    #[must_use]
    pub fn render_text(&self) -> String {
        let inner = self.inner.lock().expect("poisoned");
        let mut out = String::new();
        let mut counters: Vec<_> = inner.counters.iter().collect();
        counters.sort_by_key(|(k, _)| (*k).clone());
        for (k, v) in counters {
            out.push_str(&format!("{k} {v}\n"));
        }
        let mut gauges: Vec<_> = inner.gauges.iter().collect();
        gauges.sort_by_key(|(k, _)| (*k).clone());
        for (k, v) in gauges {
            out.push_str(&format!("{k} {v}\n"));
        }
        let mut histograms: Vec<_> = inner.histograms.iter().collect();
        histograms.sort_by_key(|(k, _)| (*k).clone());
        for (k, samples) in histograms {
            if samples.is_empty() {
                continue;
            }
            let sum: f64 = samples.iter().sum();
            let count = samples.len();
            out.push_str(&format!("{k}_sum {sum}\n"));
            out.push_str(&format!("{k}_count {count}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let reg = MetricsRegistry::new();
        reg.incr_counter(names::BUFFER_ENQUEUED, 1);
        reg.incr_counter(names::BUFFER_ENQUEUED, 2);
        let text = reg.render_text();
        assert!(text.contains(&format!("{} 3", names::BUFFER_ENQUEUED)));
    }

    #[test]
    fn gauge_overwrites() {
        let reg = MetricsRegistry::new();
        reg.set_gauge(names::GRAPH_ENTITY_COUNT, 5.0);
        reg.set_gauge(names::GRAPH_ENTITY_COUNT, 9.0);
        let text = reg.render_text();
        assert!(text.contains(&format!("{} 9", names::GRAPH_ENTITY_COUNT)));
    }
}
