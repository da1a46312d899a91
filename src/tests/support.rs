//! Deterministic stand-ins for the embedding model.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::semantic::{Backend, EmbeddingError, ModelLoader, TextEmbedder};

const DEV_WORDS: &[&str] = &[
    "programming", "code", "coding", "developer", "development", "github", "gitlab", "stack",
    "overflow", "stackoverflow", "rust", "docs", "help", "mdn", "tutorial", "react", "guide",
];
const SOCIAL_WORDS: &[&str] = &["social", "twitter", "linkedin", "facebook", "instagram", "reddit", "friends"];
const NEWS_WORDS: &[&str] = &["news", "bbc", "cnn", "nytimes", "guardian", "headlines", "reuters"];

/// Bag-of-topics embedder: one dimension per topic plus a small bias so that
/// no text maps to the zero vector. Output is L2-normalized.
pub struct KeywordEmbedder {
    seen: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl KeywordEmbedder {
    pub const DIMENSIONS: usize = 4;
    /// Texts containing this fail to embed
    pub const FAIL_MARKER: &'static str = "__fail__";
    /// Texts containing this embed to a vector of the wrong length
    pub const SHORT_MARKER: &'static str = "__short__";
    /// Texts containing this embed to the zero vector
    pub const ZERO_MARKER: &'static str = "__zero__";

    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every embed call blocks for `delay` first.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl TextEmbedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.seen.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if text.contains(Self::FAIL_MARKER) {
            return Err(EmbeddingError::EmbeddingFailed("scripted failure".to_string()));
        }
        if text.contains(Self::SHORT_MARKER) {
            return Ok(vec![1.0]);
        }
        if text.contains(Self::ZERO_MARKER) {
            return Ok(vec![0.0; Self::DIMENSIONS]);
        }

        let mut v = vec![0.0, 0.0, 0.0, 0.1];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if DEV_WORDS.contains(&word) {
                v[0] += 1.0;
            } else if SOCIAL_WORDS.contains(&word) {
                v[1] += 1.0;
            } else if NEWS_WORDS.contains(&word) {
                v[2] += 1.0;
            }
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        Ok(v.into_iter().map(|x| x / norm).collect())
    }
}

/// Loader that fails on chosen backends and records every attempt.
pub struct ScriptedLoader {
    failing: Vec<Backend>,
    embedder: Arc<dyn TextEmbedder>,
    delay: Option<Duration>,
    attempts: Mutex<Vec<Backend>>,
}

impl ScriptedLoader {
    pub fn working() -> Self {
        Self::with_embedder(Arc::new(KeywordEmbedder::new()))
    }

    pub fn with_embedder(embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            failing: Vec::new(),
            embedder,
            delay: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(backends: &[Backend]) -> Self {
        Self {
            failing: backends.to_vec(),
            ..Self::working()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn attempts(&self) -> Vec<Backend> {
        self.attempts.lock().unwrap().clone()
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self, backend: Backend) -> Result<Arc<dyn TextEmbedder>, EmbeddingError> {
        self.attempts.lock().unwrap().push(backend);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.failing.contains(&backend) {
            Err(EmbeddingError::BackendUnavailable(backend))
        } else {
            Ok(self.embedder.clone())
        }
    }
}
