//! Process-wide embedding provider.
//!
//! Owns the lazily loaded model handle and the backend fallback chain:
//! - The first caller triggers loading, concurrent callers await the same load
//! - Backends are tried in order until one loads
//! - If none loads, the provider latches `Unavailable` for the rest of the
//!   process and never retries
//! - Optionally caches embeddings by content hash of the normalized text

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::config::SemanticSearchConfig;
use crate::semantic::embeddings::{Backend, EmbeddingError, FastembedLoader, ModelLoader, TextEmbedder};

static SHARED_PROVIDER: once_cell::sync::OnceCell<Arc<EmbeddingProvider>> =
    once_cell::sync::OnceCell::new();

/// Observable lifecycle of the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Uninitialized,
    Initializing,
    Ready(Backend),
    Unavailable,
}

/// Settled result of initialization. Written once.
enum Loaded {
    Ready {
        backend: Backend,
        model: Arc<dyn TextEmbedder>,
    },
    Unavailable,
}

pub struct EmbeddingProvider {
    loader: Arc<dyn ModelLoader>,
    backends: Vec<Backend>,
    loaded: OnceCell<Loaded>,
    initializing: AtomicBool,
    cache: Option<EmbeddingCache>,
}

impl EmbeddingProvider {
    pub fn new(loader: Arc<dyn ModelLoader>, backends: Vec<Backend>) -> Self {
        Self {
            loader,
            backends,
            loaded: OnceCell::new(),
            initializing: AtomicBool::new(false),
            cache: None,
        }
    }

    /// Provider that starts out latched as unavailable.
    pub fn unavailable(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loaded: OnceCell::new_with(Some(Loaded::Unavailable)),
            ..Self::new(loader, Vec::new())
        }
    }

    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = Some(EmbeddingCache::new(capacity));
        self
    }

    /// Build a provider backed by fastembed, models cached under `base_path`.
    pub fn from_config(config: &SemanticSearchConfig, base_path: &Path) -> Self {
        let loader = Arc::new(FastembedLoader::new(
            &config.model,
            base_path.to_path_buf(),
            Some(Duration::from_secs(config.download_timeout_secs)),
        ));

        let provider = if config.enabled {
            Self::new(loader, config.backends.clone())
        } else {
            log::info!("Semantic search disabled, using substring matching");
            Self::unavailable(loader)
        };

        if config.cache_embeddings {
            provider.with_cache(config.cache_capacity)
        } else {
            provider
        }
    }

    /// The process-wide provider. The first call decides its configuration.
    pub fn shared(config: &SemanticSearchConfig, base_path: &Path) -> Arc<Self> {
        SHARED_PROVIDER
            .get_or_init(|| Arc::new(Self::from_config(config, base_path)))
            .clone()
    }

    /// Current state, without triggering a load.
    pub fn state(&self) -> ProviderState {
        match self.loaded.get() {
            Some(Loaded::Ready { backend, .. }) => ProviderState::Ready(*backend),
            Some(Loaded::Unavailable) => ProviderState::Unavailable,
            None if self.initializing.load(Ordering::SeqCst) => ProviderState::Initializing,
            None => ProviderState::Uninitialized,
        }
    }

    /// Load the model if needed and return the settled state.
    pub async fn ensure_ready(&self) -> ProviderState {
        self.loaded().await;
        self.state()
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state(), ProviderState::Unavailable)
    }

    pub fn cache(&self) -> Option<&EmbeddingCache> {
        self.cache.as_ref()
    }

    /// Embed one text. Input is lower-cased, nothing else.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = match self.loaded().await {
            Loaded::Ready { model, .. } => model.clone(),
            Loaded::Unavailable => return Err(EmbeddingError::Unavailable),
        };

        let normalized = text.to_lowercase();
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&normalized)) {
            return Ok(hit);
        }

        let input = normalized.clone();
        let embedding = tokio::task::spawn_blocking(move || model.embed(&input))
            .await
            .map_err(|e| EmbeddingError::Join(e.to_string()))??;

        if let Some(cache) = &self.cache {
            cache.insert(&normalized, embedding.clone());
        }

        Ok(embedding)
    }

    /// Embed each text independently; one failure does not affect the others.
    pub async fn embed_many(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbeddingError>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await);
        }
        results
    }

    async fn loaded(&self) -> &Loaded {
        self.loaded.get_or_init(|| self.initialize()).await
    }

    /// The only place where the state moves out of `Uninitialized`.
    async fn initialize(&self) -> Loaded {
        let _initializing = InitializingFlag::raise(&self.initializing);

        let loader = self.loader.clone();
        let backends = self.backends.clone();
        let result = tokio::task::spawn_blocking(move || load_first_available(&*loader, &backends)).await;

        let loaded = match result {
            Ok(Some((backend, model))) => Loaded::Ready { backend, model },
            Ok(None) => {
                log::warn!("No embedding backend could be loaded, falling back to substring matching");
                Loaded::Unavailable
            }
            Err(e) => {
                log::error!("Embedding model initialization panicked: {}", e);
                Loaded::Unavailable
            }
        };

        loaded
    }
}

/// Holds `initializing` up while an initialization future is alive, including
/// one dropped mid-load by its caller.
struct InitializingFlag<'a>(&'a AtomicBool);

impl<'a> InitializingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InitializingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn load_first_available(
    loader: &dyn ModelLoader,
    backends: &[Backend],
) -> Option<(Backend, Arc<dyn TextEmbedder>)> {
    for &backend in backends {
        match loader.load(backend) {
            Ok(model) => {
                log::info!("Embedding model ready on {} backend", backend);
                return Some((backend, model));
            }
            Err(e) => log::debug!("Backend {} failed to load: {}", backend, e),
        }
    }
    None
}

/// Content-addressed embedding cache, keyed by SHA-256 of the normalized text.
///
/// Cleared wholesale once `capacity` entries are reached.
pub struct EmbeddingCache {
    entries: Mutex<HashMap<[u8; 32], Vec<f32>>>,
    capacity: usize,
    hits: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
        }
    }

    fn key(text: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.finalize().into()
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let entries = self.entries.lock().ok()?;
        let hit = entries.get(&Self::key(text)).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    pub fn insert(&self, text: &str, embedding: Vec<f32>) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= self.capacity {
            log::debug!("Embedding cache full ({} entries), clearing", entries.len());
            entries.clear();
        }
        entries.insert(Self::key(text), embedding);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{KeywordEmbedder, ScriptedLoader};

    fn provider_with(loader: Arc<ScriptedLoader>) -> EmbeddingProvider {
        EmbeddingProvider::new(loader, Backend::PRIORITY.to_vec())
    }

    #[tokio::test]
    async fn test_starts_uninitialized() {
        let loader = Arc::new(ScriptedLoader::working());
        let provider = provider_with(loader.clone());

        assert_eq!(provider.state(), ProviderState::Uninitialized);
        assert!(loader.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_falls_through_to_cpu() {
        let loader = Arc::new(ScriptedLoader::failing_on(&[
            Backend::Cuda,
            Backend::DirectMl,
            Backend::CoreMl,
        ]));
        let provider = provider_with(loader.clone());

        assert_eq!(provider.ensure_ready().await, ProviderState::Ready(Backend::Cpu));
        assert_eq!(loader.attempts(), Backend::PRIORITY.to_vec());
    }

    #[tokio::test]
    async fn test_stops_at_first_working_backend() {
        let loader = Arc::new(ScriptedLoader::failing_on(&[Backend::Cuda]));
        let provider = provider_with(loader.clone());

        assert_eq!(provider.ensure_ready().await, ProviderState::Ready(Backend::DirectMl));
        assert_eq!(loader.attempts(), vec![Backend::Cuda, Backend::DirectMl]);
    }

    #[tokio::test]
    async fn test_unavailable_is_latched() {
        let loader = Arc::new(ScriptedLoader::failing_on(&Backend::PRIORITY));
        let provider = provider_with(loader.clone());

        assert_eq!(provider.ensure_ready().await, ProviderState::Unavailable);
        assert!(matches!(provider.embed("rust").await, Err(EmbeddingError::Unavailable)));
        assert!(matches!(provider.embed("again").await, Err(EmbeddingError::Unavailable)));

        // one pass through the chain, never retried
        assert_eq!(loader.attempts().len(), Backend::PRIORITY.len());
    }

    #[tokio::test]
    async fn test_preset_unavailable_never_loads() {
        let loader = Arc::new(ScriptedLoader::working());
        let provider = EmbeddingProvider::unavailable(loader.clone());

        assert_eq!(provider.state(), ProviderState::Unavailable);
        assert!(provider.embed("anything").await.is_err());
        assert!(loader.attempts().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_load() {
        let loader = Arc::new(ScriptedLoader::working().with_delay(Duration::from_millis(50)));
        let provider = Arc::new(provider_with(loader.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                provider.embed(&format!("query {}", i)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(loader.attempts(), vec![Backend::Cuda]);
    }

    #[tokio::test]
    async fn test_abandoned_initialization_does_not_stick() {
        let loader = Arc::new(ScriptedLoader::working().with_delay(Duration::from_millis(200)));
        let provider = provider_with(loader.clone());

        let abandoned = tokio::time::timeout(Duration::from_millis(20), provider.ensure_ready()).await;
        assert!(abandoned.is_err());
        assert_eq!(provider.state(), ProviderState::Uninitialized);

        // the next caller starts a fresh load
        assert_eq!(provider.ensure_ready().await, ProviderState::Ready(Backend::Cuda));
    }

    #[tokio::test]
    async fn test_embed_lowercases_input() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let loader = Arc::new(ScriptedLoader::with_embedder(embedder.clone()));
        let provider = provider_with(loader);

        provider.embed("GitHub Stack OVERFLOW").await.unwrap();
        assert_eq!(embedder.seen(), vec!["github stack overflow".to_string()]);
    }

    #[tokio::test]
    async fn test_cache_hits_skip_the_model() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let loader = Arc::new(ScriptedLoader::with_embedder(embedder.clone()));
        let provider = provider_with(loader).with_cache(16);

        let first = provider.embed("Rust Book").await.unwrap();
        let second = provider.embed("rust book").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.seen().len(), 1);
        let cache = provider.cache().unwrap();
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_embed_many_keeps_per_item_errors() {
        let loader = Arc::new(ScriptedLoader::working());
        let provider = provider_with(loader);

        let texts = vec![
            "github".to_string(),
            KeywordEmbedder::FAIL_MARKER.to_string(),
            "twitter".to_string(),
        ];
        let results = provider.embed_many(&texts).await;

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(EmbeddingError::EmbeddingFailed(_))));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_cache_clears_when_full() {
        let cache = EmbeddingCache::new(2);
        cache.insert("a", vec![1.0]);
        cache.insert("b", vec![2.0]);
        assert_eq!(cache.len(), 2);

        cache.insert("c", vec![3.0]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("c"), Some(vec![3.0]));
        assert_eq!(cache.get("a"), None);
    }
}
