use crate::semantic::Backend;
use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

/// Default embedding model (small and fast, close to an "xsmall" web model)
const DEFAULT_SEMANTIC_MODEL: &str = "all-MiniLM-L6-v2";
/// Results at or below this similarity are dropped
const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.5;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: usize = 4096;
const DEFAULT_DEBOUNCE_MS: u64 = 500;

const DEFAULT_NUM_CLUSTERS: usize = 5;
const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Configuration for semantic search and the embedding provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Disabling forces substring matching
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Compute backends, tried in order
    #[serde(default = "default_backends")]
    pub backends: Vec<Backend>,

    /// Minimum similarity, exclusive (0.0, 1.0]
    #[serde(default = "default_semantic_threshold")]
    pub threshold: f32,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Keep embeddings of already seen texts in memory
    #[serde(default = "default_true")]
    pub cache_embeddings: bool,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// How long callers should wait after the last keystroke before searching
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_SEMANTIC_MODEL.to_string(),
            backends: default_backends(),
            threshold: DEFAULT_SEMANTIC_THRESHOLD,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            cache_embeddings: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrganizeConfig {
    #[serde(default = "default_num_clusters")]
    pub num_clusters: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Fixed K-means seed for reproducible groupings
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            num_clusters: DEFAULT_NUM_CLUSTERS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_semantic_model() -> String {
    DEFAULT_SEMANTIC_MODEL.to_string()
}

fn default_backends() -> Vec<Backend> {
    Backend::PRIORITY.to_vec()
}

fn default_semantic_threshold() -> f32 {
    DEFAULT_SEMANTIC_THRESHOLD
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_num_clusters() -> usize {
    DEFAULT_NUM_CLUSTERS
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,
    #[serde(default)]
    pub organize: OrganizeConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let sem = &self.semantic_search;
        if !(sem.threshold > 0.0 && sem.threshold <= 1.0) {
            bail!(
                "semantic_search.threshold must be in (0.0, 1.0], got {}",
                sem.threshold
            );
        }

        if sem.backends.is_empty() {
            bail!("semantic_search.backends must list at least one backend");
        }

        if sem.download_timeout_secs == 0 {
            bail!("semantic_search.download_timeout_secs must be greater than 0");
        }

        if sem.cache_capacity == 0 {
            bail!("semantic_search.cache_capacity must be greater than 0");
        }

        if self.organize.num_clusters == 0 {
            bail!("organize.num_clusters must be greater than 0");
        }

        if self.organize.max_iterations == 0 {
            bail!("organize.max_iterations must be greater than 0");
        }

        Ok(())
    }

    /// Base directory: `SHELF_BASE_PATH`, else `~/.local/share/shelf`.
    pub fn base_path_from_env() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var("SHELF_BASE_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .context("could not determine home directory")?
            .context("home directory path is empty")?;
        Ok(home.join(".local/share/shelf"))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(&Self::base_path_from_env()?)
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            log::info!("Creating default config at {}", config_path.display());
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
