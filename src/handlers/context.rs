//! `HandlerContext`: the dependencies every command/query handler needs
//! (`spec.md` §4.5 — "handlers are stateless; they receive a
//! `HandlerContext {graph=C2, store=C3, audit, clock, cancel}`").

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::cache::EntityCache;
use crate::graph::EntityGraph;
use crate::handlers::cancel::CancellationToken;
use crate::persistence::Store;

/// Injected time source so bulk/expiry logic is deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared state a handler needs to do its work. Handlers themselves are
/// free functions over `&HandlerContext`, never stateful objects.
pub struct HandlerContext {
    pub tenant_id: String,
    pub graph: Arc<RwLock<EntityGraph>>,
    pub store: Arc<dyn Store>,
    pub cache: Option<Arc<dyn EntityCache>>,
    pub clock: Arc<dyn Clock>,
}

impl HandlerContext {
    #[must_use]
    pub fn new(tenant_id: String, graph: Arc<RwLock<EntityGraph>>, store: Arc<dyn Store>) -> Self {
        Self {
            tenant_id,
            graph,
            store,
            cache: None,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn EntityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// A fresh, unlinked cancellation token for one command's deadline
    /// (`spec.md` §5: default 30s for commands, 5s for queries).
    #[must_use]
    pub fn new_cancel_token(&self) -> CancellationToken {
        CancellationToken::new()
    }
}
