//! Query Cache (§4.14): keyed by the SHA-256 prefix (16 hex chars) of the
//! lowercased query text. Stores the translation only, never result rows;
//! TTL 24 hours; consulted only for `execute = false` requests.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::translator::Translation;

pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const KEY_PREFIX_CHARS: usize = 16;

#[must_use]
pub fn cache_key(query: &str) -> String {
    let digest = Sha256::digest(query.to_lowercase().as_bytes());
    let hex = format!("{digest:x}");
    hex[..KEY_PREFIX_CHARS].to_string()
}

struct CacheEntry {
    translation: Translation,
    cached_at: DateTime<Utc>,
}

/// Process-local translation cache. §4.14's "an execute=true request always
/// re-runs translation and SQL even on a cache hit" is enforced by the
/// caller (`QueryEngine::handle`), not here: this type only stores and
/// expires entries, consulted exclusively for translation-only requests.
pub struct QueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub async fn get(&self, query: &str) -> Option<Translation> {
        let key = cache_key(query);
        let entries = self.entries.read().await;
        let entry = entries.get(&key)?;
        let age = Utc::now().signed_duration_since(entry.cached_at);
        if age.to_std().ok()? > CACHE_TTL {
            return None;
        }
        Some(entry.translation.clone())
    }

    pub async fn put(&self, query: &str, translation: Translation) {
        let key = cache_key(query);
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry { translation, cached_at: Utc::now() });
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::QueryType;
    use std::collections::HashMap as StdHashMap;

    fn sample_translation() -> Translation {
        Translation {
            query_type: QueryType::Structured,
            confidence: 0.9,
            filters: StdHashMap::new(),
            sort: None,
            limit: 20,
            offset: 0,
            semantic_query: None,
            clarification_question: None,
            unknown_terms: Vec::new(),
            fallback_used: false,
        }
    }

    #[test]
    fn cache_key_is_sha256_prefix_of_lowercased_query() {
        let a = cache_key("Athens Accountant");
        let b = cache_key("athens accountant");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = QueryCache::new();
        cache.put("accountant in athens", sample_translation()).await;
        assert!(cache.get("Accountant In Athens").await.is_some());
    }

    #[tokio::test]
    async fn miss_on_unknown_query() {
        let cache = QueryCache::new();
        assert!(cache.get("nothing cached for this").await.is_none());
    }
}
