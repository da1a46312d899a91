//! Embedding-based retrieval and clustering for bookmarks.
//!
//! # Architecture
//!
//! - `embeddings`: fastembed wrapper, compute backends, loader seam
//! - `provider`: lazily loaded, process-wide model handle with fallback chain
//! - `similarity`: cosine similarity
//! - `lexical`: substring matching for degraded mode
//! - `search`: ranked, thresholded semantic search
//! - `kmeans`: K-means clustering over embeddings

pub mod embeddings;
pub mod kmeans;
mod lexical;
pub mod provider;
pub mod search;
pub mod similarity;

pub use embeddings::{Backend, EmbeddingError, EmbeddingModel, FastembedLoader, ModelLoader, TextEmbedder};
pub use kmeans::{Cluster, ClusterError, Clustering, KMeans};
pub use lexical::SUBSTRING_MATCH_SCORE;
pub use provider::{EmbeddingProvider, ProviderState};
pub use search::{QueryGate, QueryTicket, ScoredResult, SemanticSearch};
pub use similarity::{cosine_similarity, DimensionMismatch};

/// Search results must score strictly above this.
pub const DEFAULT_THRESHOLD: f32 = 0.5;
