//! Memoizing model-acquisition cache.
//!
//! Constructing a model handle is expensive enough to matter when dozens of
//! research units each want one. The cache memoizes handles by their exact
//! configuration fingerprint for the lifetime of the engine: identical
//! fingerprints always resolve to the same handle instance, distinct
//! fingerprints never collide, and nothing is ever evicted (the key space
//! is bounded by the distinct configurations in use).
//!
//! The cache is an injected service object owned by the engine, not module
//! state; components that need handles receive a reference.

use crate::llm::retry::{RetryPolicy, RetryingModel};
use crate::llm::LanguageModel;
use crate::types::Result;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The exact tuple identifying a reusable model handle. No normalization
/// or fuzzy matching: two fingerprints are the same key only when every
/// field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelFingerprint {
    /// Model identifier, e.g. `openai:gpt-4.1`.
    pub model: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Credential fingerprint (a digest, never the raw secret).
    pub credential: String,
    /// Attempt budget baked into the handle's retry policy.
    pub max_retries: u32,
}

impl ModelFingerprint {
    /// Build a fingerprint from configuration values.
    pub fn new(
        model: impl Into<String>,
        max_tokens: u32,
        credential: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            credential: credential.into(),
            max_retries,
        }
    }

    /// Digest a credential so cache keys never hold the raw secret.
    /// Absent credentials get a stable placeholder digest input.
    pub fn credential_fingerprint(secret: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.unwrap_or("anonymous").as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Builds raw model handles from fingerprints. The cache wraps whatever
/// the factory returns with the retry decorator before storing it.
pub trait ModelFactory: Send + Sync {
    /// Construct a handle for the fingerprint. Construction failures are
    /// configuration errors (unknown provider, missing credential).
    fn build(&self, fingerprint: &ModelFingerprint) -> Result<Arc<dyn LanguageModel>>;
}

/// Counters for cache behavior, mostly useful in logs and tests.
#[derive(Debug, Clone, Default)]
pub struct ModelCacheStats {
    /// Lookups that returned a stored handle.
    pub hits: u64,
    /// Lookups that had to construct.
    pub misses: u64,
    /// Distinct fingerprints currently stored.
    pub entries: usize,
}

/// Process-scoped, concurrency-safe model handle cache.
pub struct ModelCache {
    factory: Arc<dyn ModelFactory>,
    entries: RwLock<HashMap<ModelFingerprint, Arc<dyn LanguageModel>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ModelCache {
    /// Create an empty cache over a handle factory.
    pub fn new(factory: Arc<dyn ModelFactory>) -> Self {
        Self {
            factory,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the handle for a fingerprint, constructing it on first use.
    ///
    /// On a hit the stored handle is returned without touching the
    /// factory. On a miss the factory builds the raw client, the cache
    /// wraps it with the fingerprint's retry policy and stores it.
    /// Concurrent misses on one key may each construct, but only the
    /// first insert wins and every caller receives that single stored
    /// handle; the losing construction is discarded.
    pub fn get_or_create(&self, fingerprint: &ModelFingerprint) -> Result<Arc<dyn LanguageModel>> {
        if let Some(handle) = self.entries.read().get(fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(handle.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(model = %fingerprint.model, "model cache miss; constructing handle");

        // Construct outside the write lock; a racing caller may do the
        // same, and entry() below arbitrates who wins.
        let raw = self.factory.build(fingerprint)?;
        let wrapped: Arc<dyn LanguageModel> = Arc::new(RetryingModel::new(
            raw,
            RetryPolicy::for_attempts(fingerprint.max_retries),
        ));

        let mut entries = self.entries.write();
        Ok(entries
            .entry(fingerprint.clone())
            .or_insert(wrapped)
            .clone())
    }

    /// Current cache counters.
    pub fn stats(&self) -> ModelCacheStats {
        ModelCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }

    /// Number of distinct fingerprints stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache has no entries yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenStream;
    use crate::types::ModelError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    struct StubModel {
        name: String,
    }

    #[async_trait]
    impl LanguageModel for StubModel {
        async fn invoke(&self, _prompt: &str) -> std::result::Result<String, ModelError> {
            Ok("stub".into())
        }

        async fn invoke_structured(
            &self,
            _prompt: &str,
            _schema: &Value,
        ) -> std::result::Result<Value, ModelError> {
            Ok(Value::Null)
        }

        async fn stream(&self, _prompt: &str) -> std::result::Result<TokenStream, ModelError> {
            Ok(Box::new(futures::stream::empty()))
        }

        fn model_name(&self) -> &str {
            &self.name
        }
    }

    struct CountingFactory {
        constructions: AtomicUsize,
    }

    impl CountingFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                constructions: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.constructions.load(Ordering::SeqCst)
        }
    }

    impl ModelFactory for CountingFactory {
        fn build(&self, fingerprint: &ModelFingerprint) -> Result<Arc<dyn LanguageModel>> {
            self.constructions.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubModel {
                name: fingerprint.model.clone(),
            }))
        }
    }

    fn fingerprint(model: &str, max_tokens: u32, credential: &str, retries: u32) -> ModelFingerprint {
        ModelFingerprint::new(model, max_tokens, credential, retries)
    }

    #[test]
    fn test_identical_fingerprints_share_one_handle() {
        let factory = CountingFactory::new();
        let cache = ModelCache::new(factory.clone());
        let fp = fingerprint("openai:gpt-4.1", 1000, "cred", 2);

        let first = cache.get_or_create(&fp).unwrap();
        let second = cache.get_or_create(&fp).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.count(), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_any_differing_field_constructs_anew() {
        let factory = CountingFactory::new();
        let cache = ModelCache::new(factory.clone());
        let base = fingerprint("openai:gpt-4.1", 1000, "cred", 2);

        let original = cache.get_or_create(&base).unwrap();
        let variants = [
            fingerprint("openai:gpt-4.1-mini", 1000, "cred", 2),
            fingerprint("openai:gpt-4.1", 2000, "cred", 2),
            fingerprint("openai:gpt-4.1", 1000, "other", 2),
            fingerprint("openai:gpt-4.1", 1000, "cred", 3),
        ];

        for variant in &variants {
            let handle = cache.get_or_create(variant).unwrap();
            assert!(!Arc::ptr_eq(&original, &handle));
        }
        assert_eq!(factory.count(), 5);
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn test_concurrent_misses_converge_to_one_handle() {
        let factory = CountingFactory::new();
        let cache = Arc::new(ModelCache::new(factory.clone()));
        let fp = fingerprint("openai:gpt-4.1", 1000, "cred", 2);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let fp = fp.clone();
                std::thread::spawn(move || cache.get_or_create(&fp).unwrap())
            })
            .collect();

        let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for handle in &resolved[1..] {
            assert!(Arc::ptr_eq(&resolved[0], handle));
        }
        // Racing constructions are allowed, but only one entry survives.
        assert_eq!(cache.len(), 1);
        assert!(factory.count() >= 1);
    }

    #[test]
    fn test_credential_fingerprint_is_a_digest() {
        let a = ModelFingerprint::credential_fingerprint(Some("sk-1"));
        let b = ModelFingerprint::credential_fingerprint(Some("sk-2"));
        let anon = ModelFingerprint::credential_fingerprint(None);

        assert_ne!(a, b);
        assert_ne!(a, anon);
        assert_eq!(a, ModelFingerprint::credential_fingerprint(Some("sk-1")));
        assert!(!a.contains("sk-1"));
    }
}
