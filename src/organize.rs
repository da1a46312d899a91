//! Auto-organize: cluster bookmarks into labeled folder proposals.
//!
//! Pipeline: embed `title + " " + hostname` for every bookmark, run K-means,
//! group bookmarks by label and name each group after the two most frequent
//! long words in its titles. Any failure along the way yields no proposals;
//! nothing is ever partially applied.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;

use crate::bookmarks::{self, BookmarkError, BookmarkItem, OrganizedFolder};
use crate::config::OrganizeConfig;
use crate::semantic::{ClusterError, EmbeddingError, EmbeddingProvider, KMeans};

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("static regex"));

/// Words this short or shorter never make it into a label.
const MIN_LABEL_WORD_LEN: usize = 3;
const LABEL_WORDS: usize = 2;
const LABEL_SUFFIX: &str = "Collection";

#[derive(Debug, thiserror::Error)]
pub enum OrganizeError {
    #[error(transparent)]
    Bookmark(#[from] BookmarkError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("clustering failed: {0}")]
    Cluster(#[from] ClusterError),
}

pub struct AutoOrganizer {
    provider: Arc<EmbeddingProvider>,
    num_clusters: usize,
    max_iterations: usize,
    seed: Option<u64>,
}

impl AutoOrganizer {
    pub fn new(provider: Arc<EmbeddingProvider>) -> Self {
        Self::with_config(provider, &OrganizeConfig::default())
    }

    pub fn with_config(provider: Arc<EmbeddingProvider>, config: &OrganizeConfig) -> Self {
        Self {
            provider,
            num_clusters: config.num_clusters,
            max_iterations: config.max_iterations,
            seed: config.seed,
        }
    }

    pub fn num_clusters(mut self, k: usize) -> Self {
        self.num_clusters = k;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Propose folders, or nothing at all if any step fails.
    pub async fn organize(&self, bookmarks: &[BookmarkItem]) -> Vec<OrganizedFolder> {
        match self.try_organize(bookmarks).await {
            Ok(folders) => folders,
            Err(e) => {
                log::error!("Auto-organize failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_organize(&self, bookmarks: &[BookmarkItem]) -> Result<Vec<OrganizedFolder>, OrganizeError> {
        if bookmarks.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(bookmarks.len());
        for bookmark in bookmarks {
            let text = format!("{} {}", bookmark.title, bookmarks::hostname(&bookmark.url)?);
            embeddings.push(self.provider.embed(&text).await?);
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let clustering = KMeans::new(self.num_clusters, self.max_iterations).fit(&embeddings, &mut rng)?;
        log::debug!(
            "Clustered {} bookmarks in {} iterations",
            bookmarks.len(),
            clustering.iterations
        );

        let mut groups: BTreeMap<usize, Vec<BookmarkItem>> = BTreeMap::new();
        for (bookmark, &label) in bookmarks.iter().zip(&clustering.labels) {
            groups.entry(label).or_default().push(bookmark.clone());
        }

        let folders: Vec<OrganizedFolder> = groups
            .into_values()
            .map(|bookmarks| OrganizedFolder {
                title: folder_label(&bookmarks),
                bookmarks,
            })
            .collect();

        log::info!("Proposed {} folders for {} bookmarks", folders.len(), bookmarks.len());
        Ok(folders)
    }
}

/// Two most frequent title words longer than three characters, capitalized,
/// joined with " & " and suffixed with " Collection". Ties go to the word
/// seen first.
pub fn folder_label(bookmarks: &[BookmarkItem]) -> String {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();

    for bookmark in bookmarks {
        let title = bookmark.title.to_lowercase();
        for word in NON_WORD.split(&title) {
            if word.chars().count() <= MIN_LABEL_WORD_LEN {
                continue;
            }
            let count = counts.entry(word.to_string()).or_insert(0);
            if *count == 0 {
                first_seen.push(word.to_string());
            }
            *count += 1;
        }
    }

    // stable sort keeps first-seen order among equal counts
    first_seen.sort_by(|a, b| counts[b].cmp(&counts[a]));

    let top: Vec<String> = first_seen.iter().take(LABEL_WORDS).map(|w| capitalize(w)).collect();
    if top.is_empty() {
        LABEL_SUFFIX.to_string()
    } else {
        format!("{} {}", top.join(" & "), LABEL_SUFFIX)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
