use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

/// How long an expired entry is retained as a stale fallback for reads that
/// hit a transiently unavailable store.
const STALE_GRACE: Duration = Duration::from_secs(3600);

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// TTL-bounded read-through cache with prefix invalidation.
///
/// Values are stored as JSON so heterogeneous aggregate results share one
/// map. Two concurrent misses on a key may both run the compute; results are
/// idempotent so last-writer-wins is fine.
#[derive(Clone, Default)]
pub struct Cache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value while fresh; otherwise runs `compute`, stores
    /// the result with `expires_at = now + ttl`, and returns it. If the
    /// compute fails and a previously computed value still exists (even past
    /// its TTL), that value is served instead of the error.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let now = Instant::now();
        if let Some(value) = self.lookup(key, now, false).await {
            if let Ok(decoded) = serde_json::from_value(value) {
                return Ok(decoded);
            }
        }

        match compute().await {
            Ok(value) => {
                let json = serde_json::to_value(&value)?;
                let mut entries = self.entries.write().await;
                entries.retain(|_, e| now < e.expires_at + STALE_GRACE);
                entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value: json,
                        expires_at: now + ttl,
                    },
                );
                Ok(value)
            }
            Err(err) => {
                if let Some(value) = self.lookup(key, now, true).await {
                    if let Ok(decoded) = serde_json::from_value(value) {
                        warn!(key, error = %err, "serving stale cache entry after compute failure");
                        return Ok(decoded);
                    }
                }
                Err(err)
            }
        }
    }

    /// Drops every entry whose key starts with `prefix`, so one class write
    /// can clear "class:<id>" without tracking each derived key.
    pub async fn invalidate(&self, prefix: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        debug!(prefix, dropped = before - entries.len(), "cache invalidated");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn lookup(&self, key: &str, now: Instant, allow_stale: bool) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if allow_stale || now < entry.expires_at {
            Some(entry.value.clone())
        } else {
            None
        }
    }
}
