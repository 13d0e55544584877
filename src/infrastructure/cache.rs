// In-memory response cache
//
// The composite endpoints (dashboard overview, analytics insights) fan out
// into several upstream queries, so their responses are cached for a short
// TTL. Entries expire lazily on lookup.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    expires_at: Instant,
    value: serde_json::Value,
}

#[derive(Clone, Default)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<&'static str, CacheEntry>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &'static str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub async fn put(&self, key: &'static str, value: serde_json::Value, ttl: Duration) {
        let entry = CacheEntry {
            expires_at: Instant::now() + ttl,
            value,
        };
        self.entries.write().await.insert(key, entry);
    }
}
