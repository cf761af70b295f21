//! Caching layer for legaldoc-runtime.
//!
//! Provides in-memory caching of validated model responses so that
//! re-analyzing an identical document costs no model calls.

use legaldoc_core::SchemaId;
use moka::future::Cache;
use serde_json::Value as JsonValue;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::config::CacheSettings;
use crate::providers::ChatMessage;

/// Cache key for one structured call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    target_hash: u64,
    messages_hash: u64,
    schema: SchemaId,
}

impl CacheKey {
    /// Create a cache key from call inputs.
    pub fn new(provider: &str, model: &str, schema: SchemaId, messages: &[ChatMessage]) -> Self {
        Self {
            target_hash: hash_target(provider, model),
            messages_hash: hash_messages(messages),
            schema,
        }
    }
}

/// Response cache using moka.
///
/// Stores the raw JSON a provider returned once it has passed validation.
/// Cloning is cheap and clones share entries.
#[derive(Clone)]
pub struct ResponseCache {
    cache: Cache<CacheKey, JsonValue>,
}

impl ResponseCache {
    /// Create a new cache with the given limits.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Build a cache from settings, or `None` when caching is disabled.
    pub fn from_settings(settings: &CacheSettings) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::new(settings.capacity, settings.ttl))
    }

    /// Get a cached response.
    pub async fn get(&self, key: &CacheKey) -> Option<JsonValue> {
        self.cache.get(key).await
    }

    /// Store a validated response.
    pub async fn insert(&self, key: CacheKey, response: JsonValue) {
        self.cache.insert(key, response).await;
    }

    /// Drop one entry.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.cache.invalidate(key).await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Get cache statistics.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

// Hash helpers

fn hash_target(provider: &str, model: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    provider.hash(&mut hasher);
    model.hash(&mut hasher);
    hasher.finish()
}

fn hash_messages(messages: &[ChatMessage]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    messages.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system("Classify."), ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = ResponseCache::default();
        let key = CacheKey::new("openai", "gpt-4o-mini", SchemaId::Classification, &messages("Clause 1"));

        assert!(cache.get(&key).await.is_none());

        cache.insert(key, json!({ "category": "Notices", "confidence": 0.9 })).await;
        let cached = cache.get(&key).await.unwrap();
        assert_eq!(cached["category"], "Notices");

        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[test]
    fn test_key_covers_every_input() {
        let base = CacheKey::new("openai", "gpt-4o-mini", SchemaId::Classification, &messages("a"));

        assert_eq!(
            base,
            CacheKey::new("openai", "gpt-4o-mini", SchemaId::Classification, &messages("a"))
        );
        assert_ne!(base, CacheKey::new("gemini", "gpt-4o-mini", SchemaId::Classification, &messages("a")));
        assert_ne!(base, CacheKey::new("openai", "gpt-4o", SchemaId::Classification, &messages("a")));
        assert_ne!(base, CacheKey::new("openai", "gpt-4o-mini", SchemaId::RiskAssessment, &messages("a")));
        assert_ne!(base, CacheKey::new("openai", "gpt-4o-mini", SchemaId::Classification, &messages("b")));
    }

    #[test]
    fn test_disabled_settings_build_no_cache() {
        assert!(ResponseCache::from_settings(&CacheSettings::default()).is_none());

        let settings = CacheSettings {
            enabled: true,
            ..Default::default()
        };
        assert!(ResponseCache::from_settings(&settings).is_some());
    }
}
