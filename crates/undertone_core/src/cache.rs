//! Result cache
//!
//! Bounded LRU of finished results with a time-to-live. Keys are built from
//! sanitized content only, so no raw identifier is ever held as a key. The
//! mode and the remote permission are part of the key: the same message can
//! legitimately get a different answer under either.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use undertone_common::config::CacheConfig;
use undertone_common::{AnalysisMode, AnalysisResult, Content};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    mode: AnalysisMode,
    remote_permitted: bool,
    content: String,
}

impl CacheKey {
    /// `None` unless `content` has been through the sanitizer
    pub fn new(content: &Content, mode: AnalysisMode, remote_permitted: bool) -> Option<Self> {
        if !content.is_sanitized() {
            return None;
        }

        // Length-prefixed fields so no two contents share a key
        let mut key = String::with_capacity(content.text().len() + 16);
        push_field(&mut key, content.text());
        for image in content.images() {
            push_field(&mut key, &image.source_uri);
            push_field(&mut key, &image.alt_text);
            push_field(&mut key, &image.pixel_area.to_string());
        }
        for (name, value) in content.metadata() {
            push_field(&mut key, name);
            push_field(&mut key, value);
        }

        Some(Self {
            mode,
            remote_permitted,
            content: key,
        })
    }
}

fn push_field(key: &mut String, field: &str) {
    key.push_str(&field.len().to_string());
    key.push(':');
    key.push_str(field);
}

#[derive(Debug)]
struct Entry {
    result: AnalysisResult,
    inserted_at: Instant,
}

pub struct ResultCache {
    entries: Mutex<LruCache<CacheKey, Entry>>,
    capacity: NonZeroUsize,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            ttl,
        }
    }

    /// `None` when the cache is disabled
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        NonZeroUsize::new(config.effective_max_entries())
            .map(|capacity| Self::new(capacity, Duration::from_secs(config.effective_ttl_secs())))
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached result for `key`, dropping it if it has outlived the TTL
    pub async fn get(&self, key: &CacheKey) -> Option<AnalysisResult> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.result.clone())
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            debug!("Cached result expired");
        }
        None
    }

    pub async fn insert(&self, key: CacheKey, result: AnalysisResult) {
        let mut entries = self.entries.lock().await;
        entries.put(
            key,
            Entry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::canned_result;
    use undertone_common::{sanitize, BackendId};

    fn key(text: &str, mode: AnalysisMode) -> CacheKey {
        CacheKey::new(&sanitize(&Content::new(text)), mode, false).unwrap()
    }

    fn cache(capacity: usize) -> ResultCache {
        ResultCache::new(NonZeroUsize::new(capacity).unwrap(), Duration::from_secs(60))
    }

    #[test]
    fn test_unsanitized_content_has_no_key() {
        assert!(CacheKey::new(&Content::new("hello"), AnalysisMode::Quick, false).is_none());
    }

    #[test]
    fn test_key_ignores_which_identifier_was_redacted() {
        let a = key("mail jane@example.com today", AnalysisMode::Quick);
        let b = key("mail joe@example.org today", AnalysisMode::Quick);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_separates_mode_permission_and_fields() {
        let sanitized = sanitize(&Content::new("hi"));
        let quick = CacheKey::new(&sanitized, AnalysisMode::Quick, false).unwrap();
        assert_ne!(quick, CacheKey::new(&sanitized, AnalysisMode::Deep, false).unwrap());
        assert_ne!(quick, CacheKey::new(&sanitized, AnalysisMode::Quick, true).unwrap());

        let split_a = sanitize(&Content::new("ab").with_metadata("c", "d"));
        let split_b = sanitize(&Content::new("a").with_metadata("bc", "d"));
        assert_ne!(
            CacheKey::new(&split_a, AnalysisMode::Quick, false),
            CacheKey::new(&split_b, AnalysisMode::Quick, false)
        );
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let cache = cache(4);
        let result = canned_result(BackendId::LocalHeuristic, 20, 5, 0.9);
        cache.insert(key("hello", AnalysisMode::Quick), result.clone()).await;

        assert_eq!(cache.get(&key("hello", AnalysisMode::Quick)).await, Some(result));
        assert!(cache.get(&key("hello", AnalysisMode::Deep)).await.is_none());
        assert!(cache.get(&key("goodbye", AnalysisMode::Quick)).await.is_none());
    }

    #[tokio::test]
    async fn test_least_recently_used_is_evicted() {
        let cache = cache(2);
        for text in ["a", "b"] {
            cache
                .insert(key(text, AnalysisMode::Quick), canned_result(BackendId::LocalHeuristic, 1, 1, 0.5))
                .await;
        }
        // Touch "a" so "b" is the oldest
        assert!(cache.get(&key("a", AnalysisMode::Quick)).await.is_some());
        cache
            .insert(key("c", AnalysisMode::Quick), canned_result(BackendId::LocalHeuristic, 1, 1, 0.5))
            .await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&key("b", AnalysisMode::Quick)).await.is_none());
        assert!(cache.get(&key("a", AnalysisMode::Quick)).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = cache(4);
        let k = key("hello", AnalysisMode::Quick);
        cache
            .insert(k.clone(), canned_result(BackendId::LocalHeuristic, 1, 1, 0.5))
            .await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get(&k).await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&k).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig::default();
        let cache = ResultCache::from_config(&config).unwrap();
        assert_eq!(cache.capacity(), 100);
        assert_eq!(cache.ttl(), Duration::from_secs(600));

        let disabled = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(ResultCache::from_config(&disabled).is_none());
    }
}
