//! Substring matching used when embeddings are unavailable.
//!
//! Every bookmark whose `title + " " + url` contains the query
//! (case-insensitively) matches with the constant score
//! `SUBSTRING_MATCH_SCORE`. No ranking beyond corpus order.

use crate::bookmarks::FolderContext;
use crate::semantic::search::ScoredResult;

/// Score given to every substring match.
pub const SUBSTRING_MATCH_SCORE: f32 = 1.0;

pub fn substring_matches(query: &str, corpus: &[FolderContext]) -> Vec<ScoredResult> {
    let needle = query.to_lowercase();

    corpus
        .iter()
        .flat_map(|folder| folder.bookmarks.iter().map(move |b| (folder, b)))
        .filter(|(_, bookmark)| bookmark.search_text().to_lowercase().contains(&needle))
        .map(|(folder, bookmark)| ScoredResult::new(bookmark, SUBSTRING_MATCH_SCORE, &folder.title))
        .collect()
}
