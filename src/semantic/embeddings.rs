//! Embedding model wrapper for fastembed.
//!
//! Provides the pieces the provider composes:
//! - `Backend`: compute backends in fallback order
//! - `TextEmbedder`: anything that turns text into a vector
//! - `ModelLoader`: loads a `TextEmbedder` for a given backend
//! - `EmbeddingModel` / `FastembedLoader`: the fastembed implementation

use fastembed::{InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Compute backend for model inference, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cuda,
    DirectMl,
    CoreMl,
    Cpu,
}

impl Backend {
    /// Default fallback chain, ending with the portable CPU backend.
    pub const PRIORITY: [Backend; 4] = [Backend::Cuda, Backend::DirectMl, Backend::CoreMl, Backend::Cpu];
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Backend::Cuda => "cuda",
            Backend::DirectMl => "directml",
            Backend::CoreMl => "coreml",
            Backend::Cpu => "cpu",
        };
        f.write_str(name)
    }
}

/// Error type for embedding operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Backend {0} is not available")]
    BackendUnavailable(Backend),

    #[error("Embeddings are unavailable")]
    Unavailable,

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Model load timed out after {0}s")]
    DownloadTimeout(u64),

    #[error("Embedding task failed: {0}")]
    Join(String),
}

/// Something that turns (already normalized) text into a vector.
///
/// Implementations are blocking; the provider calls them off the async
/// executor.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Loads an embedder on one specific backend.
pub trait ModelLoader: Send + Sync {
    fn load(&self, backend: Backend) -> Result<Arc<dyn TextEmbedder>, EmbeddingError>;
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;

        // Ensure cache directory exists
        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        // sentence-embedding models come out mean-pooled and L2-normalized
        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(false);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5 (add -q suffix for quantized)",
                name
            ))),
        }
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl TextEmbedder for EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }
}

/// Loads fastembed models from a local cache directory.
///
/// fastembed is built here without GPU execution providers, so only
/// `Backend::Cpu` can succeed; the others report `BackendUnavailable`.
pub struct FastembedLoader {
    model_name: String,
    cache_dir: PathBuf,
    download_timeout: Duration,
}

impl FastembedLoader {
    pub fn new(model_name: &str, cache_dir: PathBuf, download_timeout: Option<Duration>) -> Self {
        Self {
            model_name: model_name.to_string(),
            cache_dir,
            download_timeout: download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT),
        }
    }

    /// Build the model on a helper thread and give up after the download
    /// timeout. A timed out load keeps running detached; its result is dropped.
    fn load_with_timeout(&self) -> Result<EmbeddingModel, EmbeddingError> {
        let (tx, rx) = mpsc::channel();
        let model_name = self.model_name.clone();
        let cache_dir = self.cache_dir.clone();

        std::thread::Builder::new()
            .name("embedding-model-load".to_string())
            .spawn(move || {
                let _ = tx.send(EmbeddingModel::new(&model_name, cache_dir));
            })
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to spawn loader thread: {}", e)))?;

        match rx.recv_timeout(self.download_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(EmbeddingError::DownloadTimeout(self.download_timeout.as_secs()))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(EmbeddingError::InitFailed("Model loader thread panicked".to_string()))
            }
        }
    }
}

impl ModelLoader for FastembedLoader {
    fn load(&self, backend: Backend) -> Result<Arc<dyn TextEmbedder>, EmbeddingError> {
        match backend {
            Backend::Cpu => {
                let model = self.load_with_timeout()?;
                log::info!(
                    "Loaded embedding model '{}' ({} dimensions)",
                    model.name(),
                    model.dimensions()
                );
                Ok(Arc::new(model))
            }
            other => Err(EmbeddingError::BackendUnavailable(other)),
        }
    }
}
