//! CorrelationId de-duplication window (`spec.md` §4.9, §5): retries of
//! the same correlationId observed within `window` are served from a
//! cached result instead of re-executing the command.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::handlers::CommandOutcome;

/// A `Clone`-able summary of a failed command, independent of the
/// original (non-`Clone`) error type — enough to replay a dedup hit
/// without re-executing the command.
#[derive(Debug, Clone)]
pub struct DedupError {
    pub code: &'static str,
    pub message: String,
}

pub type CachedResult = Result<CommandOutcome, DedupError>;

struct Entry {
    result: CachedResult,
    recorded_at: DateTime<Utc>,
}

/// One dedup window, shared by every tenant (keys are
/// `"{tenant_id}:{correlation_id}"`). Cheap to clone; internal state is
/// behind an `Arc<Mutex<_>>`.
#[derive(Clone)]
pub struct DedupWindow {
    window: Duration,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl DedupWindow {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the cached result for `key` if it was recorded within the
    /// window, pruning expired entries opportunistically.
    pub async fn lookup(&self, key: &str) -> Option<CachedResult> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        entries.retain(|_, e| now.signed_duration_since(e.recorded_at).to_std().unwrap_or(Duration::ZERO) <= self.window);
        entries.get(key).map(|e| e.result.clone())
    }

    pub async fn record(&self, key: String, result: CachedResult) {
        self.entries.lock().await.insert(
            key,
            Entry {
                result,
                recorded_at: Utc::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_within_window() {
        let dedup = DedupWindow::new(Duration::from_secs(60));
        assert!(dedup.lookup("corr-1").await.is_none());
        dedup
            .record("corr-1".to_owned(), Ok(CommandOutcome::EntityCreated { id: 1, audit_id: 1 }))
            .await;
        assert!(dedup.lookup("corr-1").await.is_some());
    }

    #[tokio::test]
    async fn prunes_expired_entries() {
        let dedup = DedupWindow::new(Duration::from_millis(10));
        dedup
            .record("corr-2".to_owned(), Ok(CommandOutcome::EntityDeleted { id: 2, audit_id: 2 }))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(dedup.lookup("corr-2").await.is_none());
    }
}
