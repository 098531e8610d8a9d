//! Thread-safe engine and session caches keyed by normalized config
//!
//! Two independent caches share the same algorithm with different sharing
//! rules: pooled engines are safe to share across threads and are keyed by
//! `(type, sorted config)`; HTTP sessions are additionally partitioned by
//! the calling thread's identity. Disposal snapshots and clears the map
//! under the lock, then releases every instance outside it so slow I/O
//! never happens while the mutex is held.

use crate::config::ConnectorConfig;
use crate::engine::DwEngine;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread::ThreadId;
use tracing::{debug, info};

/// Stable cache key: connection type plus sorted stringified config pairs
pub type CacheKey = (String, Vec<(String, String)>);

fn cache_key(connection_type: &str, config: &ConnectorConfig) -> CacheKey {
    (connection_type.to_string(), config.cache_pairs())
}

/// Cache of pooled warehouse/SQL engines, shared across threads
#[derive(Default)]
pub struct EngineCache {
    inner: Mutex<HashMap<CacheKey, DwEngine>>,
}

impl EngineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached engine or create/store a new one
    ///
    /// With `reuse = false` the factory always runs and the cache is
    /// bypassed entirely.
    pub fn get_or_create(
        &self,
        connection_type: &str,
        config: &ConnectorConfig,
        reuse: bool,
        factory: impl FnOnce() -> Result<DwEngine>,
    ) -> Result<DwEngine> {
        if !reuse {
            debug!(connection_type, "Engine reuse disabled, creating new engine");
            return factory();
        }

        let key = cache_key(connection_type, config);
        let mut guard = lock(&self.inner);

        if let Some(cached) = guard.get(&key) {
            debug!(connection_type, "Engine cache hit");
            return Ok(cached.clone());
        }

        let engine = factory()?;
        guard.insert(key, engine.clone());
        debug!(connection_type, "Engine cache miss, new engine created");
        Ok(engine)
    }

    /// Dispose and clear all cached engines; called once at shutdown
    pub async fn dispose_all(&self) {
        let engines: Vec<DwEngine> = {
            let mut guard = lock(&self.inner);
            guard.drain().map(|(_, engine)| engine).collect()
        };

        let count = engines.len();
        for engine in engines {
            engine.dispose().await;
        }

        info!(count, "Disposed cached SQL engines");
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache of HTTP clients, partitioned per calling thread
///
/// Session-class resources are not safely shared across concurrent callers,
/// so the key carries the creating thread's identity.
#[derive(Default)]
pub struct SessionCache {
    inner: Mutex<HashMap<(String, Vec<(String, String)>, ThreadId), reqwest::Client>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        connection_type: &str,
        config: &ConnectorConfig,
        reuse: bool,
        factory: impl FnOnce() -> Result<reqwest::Client>,
    ) -> Result<reqwest::Client> {
        if !reuse {
            debug!(connection_type, "Session reuse disabled, creating new session");
            return factory();
        }

        let (kind, pairs) = cache_key(connection_type, config);
        let key = (kind, pairs, std::thread::current().id());
        let mut guard = lock(&self.inner);

        if let Some(cached) = guard.get(&key) {
            debug!(connection_type, thread = ?key.2, "Session cache hit");
            return Ok(cached.clone());
        }

        let session = factory()?;
        guard.insert(key, session.clone());
        debug!(connection_type, "Session cache miss, new session created");
        Ok(session)
    }

    /// Close and clear all cached sessions; called once at shutdown
    pub fn close_all(&self) {
        let sessions: Vec<reqwest::Client> = {
            let mut guard = lock(&self.inner);
            guard.drain().map(|(_, session)| session).collect()
        };

        // Clients release their connection pools when the last clone drops
        let count = sessions.len();
        drop(sessions);

        info!(count, "Closed cached HTTP sessions");
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn sample_config(path: &str) -> ConnectorConfig {
        let mut config = ConnectorConfig::new();
        config.insert("database_path", json!(path));
        config
    }

    #[test]
    fn test_reuse_returns_identical_engine() {
        let cache = EngineCache::new();
        let config = sample_config(":memory:");

        let first = cache
            .get_or_create("sqlite", &config, true, DwEngine::sqlite_in_memory)
            .unwrap();
        let second = cache
            .get_or_create("sqlite", &config, true, || {
                panic!("factory must not run on a cache hit")
            })
            .unwrap();

        match (&first, &second) {
            (DwEngine::Sqlite(a), DwEngine::Sqlite(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected sqlite engines"),
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reuse_false_bypasses_cache() {
        let cache = EngineCache::new();
        let config = sample_config(":memory:");

        let first = cache
            .get_or_create("sqlite", &config, false, DwEngine::sqlite_in_memory)
            .unwrap();
        let second = cache
            .get_or_create("sqlite", &config, false, DwEngine::sqlite_in_memory)
            .unwrap();

        match (&first, &second) {
            (DwEngine::Sqlite(a), DwEngine::Sqlite(b)) => assert!(!Arc::ptr_eq(a, b)),
            _ => panic!("expected sqlite engines"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_distinct_configs_get_distinct_entries() {
        let cache = EngineCache::new();

        cache
            .get_or_create("sqlite", &sample_config(":memory:"), true, DwEngine::sqlite_in_memory)
            .unwrap();
        cache
            .get_or_create("sqlite", &sample_config("/tmp/other.db"), true, || {
                DwEngine::sqlite_in_memory()
            })
            .unwrap();

        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_dispose_all_empties_the_cache() {
        let cache = EngineCache::new();
        cache
            .get_or_create("sqlite", &sample_config(":memory:"), true, DwEngine::sqlite_in_memory)
            .unwrap();
        assert_eq!(cache.len(), 1);

        cache.dispose_all().await;
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sessions_partitioned_by_thread() {
        let cache = Arc::new(SessionCache::new());
        let config = {
            let mut c = ConnectorConfig::new();
            c.insert("base_url", json!("http://localhost/"));
            c
        };

        cache
            .get_or_create("rest", &config, true, || Ok(reqwest::Client::new()))
            .unwrap();

        let cache_clone = Arc::clone(&cache);
        let config_clone = config.clone();
        std::thread::spawn(move || {
            cache_clone
                .get_or_create("rest", &config_clone, true, || Ok(reqwest::Client::new()))
                .unwrap();
        })
        .join()
        .unwrap();

        // Same type and config, different threads: two entries
        assert_eq!(cache.len(), 2);

        cache.close_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_session_cache_hit_on_same_thread() {
        let cache = SessionCache::new();
        let config = ConnectorConfig::new();

        cache
            .get_or_create("rest", &config, true, || Ok(reqwest::Client::new()))
            .unwrap();
        cache
            .get_or_create("rest", &config, true, || {
                panic!("factory must not run on a cache hit")
            })
            .unwrap();

        assert_eq!(cache.len(), 1);
    }
}
