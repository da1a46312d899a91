use std::sync::Arc;

use crate::bookmarks::{collect_folders, flatten, parse_tree, BookmarkItem, OrganizedFolder};
use crate::organize::{AutoOrganizer, OrganizeError};
use crate::semantic::{Backend, EmbeddingError, EmbeddingProvider};
use crate::store::{self, BookmarkStore, MemoryStore};
use crate::tests::support::{KeywordEmbedder, ScriptedLoader};

fn provider_with(embedder: Arc<KeywordEmbedder>) -> Arc<EmbeddingProvider> {
    Arc::new(EmbeddingProvider::new(
        Arc::new(ScriptedLoader::with_embedder(embedder)),
        vec![Backend::Cpu],
    ))
}

fn organizer() -> AutoOrganizer {
    AutoOrganizer::new(provider_with(Arc::new(KeywordEmbedder::new())))
}

/// Two bookmarks per topic whose embedding texts score identically.
fn topics() -> Vec<BookmarkItem> {
    vec![
        BookmarkItem::new("GitHub", "https://github.com"),
        BookmarkItem::new("Twitter", "https://twitter.com"),
        BookmarkItem::new("CNN", "https://cnn.com"),
        BookmarkItem::new("GitLab", "https://gitlab.com"),
        BookmarkItem::new("Reddit", "https://reddit.com"),
        BookmarkItem::new("BBC", "https://bbc.com"),
    ]
}

fn folder_of<'a>(folders: &'a [OrganizedFolder], title: &str) -> &'a OrganizedFolder {
    folders
        .iter()
        .find(|f| f.bookmarks.iter().any(|b| b.title == title))
        .unwrap()
}

#[tokio::test]
async fn test_embeds_title_and_hostname() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let organizer = AutoOrganizer::new(provider_with(embedder.clone())).num_clusters(1);

    organizer
        .organize(&[BookmarkItem::new("GitHub", "https://github.com/rust-lang/rust?tab=readme")])
        .await;

    assert_eq!(embedder.seen(), vec!["github github.com".to_string()]);
}

#[tokio::test]
async fn test_groups_bookmarks_by_topic() {
    let items = topics();
    let folders = organizer()
        .num_clusters(items.len())
        .seed(Some(7))
        .organize(&items)
        .await;

    assert_eq!(folders.len(), 3);
    assert_eq!(folders.iter().map(|f| f.bookmarks.len()).sum::<usize>(), items.len());

    let dev = folder_of(&folders, "GitHub");
    assert!(dev.bookmarks.iter().any(|b| b.title == "GitLab"));
    assert_eq!(dev.title, "Github & Gitlab Collection");

    let social = folder_of(&folders, "Twitter");
    assert!(social.bookmarks.iter().any(|b| b.title == "Reddit"));
    assert_eq!(social.title, "Twitter & Reddit Collection");

    // both titles are too short to name the folder
    let news = folder_of(&folders, "CNN");
    assert!(news.bookmarks.iter().any(|b| b.title == "BBC"));
    assert_eq!(news.title, "Collection");
}

#[tokio::test]
async fn test_identical_embeddings_share_a_folder() {
    let items = topics();
    for seed in 0..8 {
        let folders = organizer().num_clusters(3).seed(Some(seed)).organize(&items).await;

        assert!(!folders.is_empty() && folders.len() <= 3);
        let github = folder_of(&folders, "GitHub");
        assert!(github.bookmarks.iter().any(|b| b.title == "GitLab"));
        let twitter = folder_of(&folders, "Twitter");
        assert!(twitter.bookmarks.iter().any(|b| b.title == "Reddit"));
    }
}

#[tokio::test]
async fn test_same_seed_same_proposals() {
    let items = topics();
    let first = organizer().num_clusters(2).seed(Some(42)).organize(&items).await;
    let second = organizer().num_clusters(2).seed(Some(42)).organize(&items).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_single_cluster_label() {
    let items = vec![
        BookmarkItem::new("React Guide", "https://react.dev/learn"),
        BookmarkItem::new("React Tutorial", "https://react.dev/learn/tutorial"),
    ];
    let folders = organizer().num_clusters(1).organize(&items).await;

    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].title, "React & Guide Collection");
    assert_eq!(folders[0].bookmarks, items);
}

#[tokio::test]
async fn test_fewer_bookmarks_than_clusters() {
    let items = vec![BookmarkItem::new("Rust docs", "https://doc.rust-lang.org")];
    let folders = organizer().num_clusters(5).organize(&items).await;

    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].bookmarks, items);
}

#[tokio::test]
async fn test_empty_input() {
    assert!(organizer().organize(&[]).await.is_empty());
}

#[tokio::test]
async fn test_one_failed_embedding_cancels_everything() {
    let mut items = topics();
    items.push(BookmarkItem::new(KeywordEmbedder::FAIL_MARKER, "https://broken.example"));

    let organizer = organizer();
    assert!(organizer.organize(&items).await.is_empty());
    assert!(matches!(
        organizer.try_organize(&items).await,
        Err(OrganizeError::Embedding(EmbeddingError::EmbeddingFailed(_)))
    ));
}

#[tokio::test]
async fn test_invalid_url_cancels_everything() {
    let mut items = topics();
    items.push(BookmarkItem::new("Broken", "not a url"));

    let organizer = organizer();
    assert!(organizer.organize(&items).await.is_empty());
    assert!(matches!(
        organizer.try_organize(&items).await,
        Err(OrganizeError::Bookmark(_))
    ));
}

#[tokio::test]
async fn test_unavailable_provider_proposes_nothing() {
    let provider = Arc::new(EmbeddingProvider::unavailable(Arc::new(ScriptedLoader::working())));
    let organizer = AutoOrganizer::new(provider);

    assert!(organizer.organize(&topics()).await.is_empty());
}

#[tokio::test]
async fn test_mismatched_dimensions_cancel_everything() {
    let mut items = topics();
    items.push(BookmarkItem::new(KeywordEmbedder::SHORT_MARKER, "https://short.example"));

    assert!(matches!(
        organizer().try_organize(&items).await,
        Err(OrganizeError::Cluster(_))
    ));
}

#[tokio::test]
async fn test_apply_proposals_to_store() {
    let tree = parse_tree(
        r#"[{"id": "0", "title": "", "children": [
            {"id": "1", "parentId": "0", "title": "Bookmarks Bar", "children": [
                {"id": "2", "parentId": "1", "title": "Unsorted", "children": [
                    {"id": "3", "parentId": "2", "title": "React Guide", "url": "https://react.dev/learn"},
                    {"id": "4", "parentId": "2", "title": "React Tutorial", "url": "https://react.dev/learn/tutorial"}
                ]}
            ]}
        ]}]"#,
    )
    .unwrap();

    let items = flatten(&tree);
    let folders = organizer().num_clusters(1).organize(&items).await;

    let store = MemoryStore::new(tree);
    let created = store::materialize(&store, &folders).unwrap();
    assert_eq!(created, vec!["5".to_string()]);

    let after = store.list_tree().unwrap();
    let titles: Vec<String> = collect_folders(&after).into_iter().map(|f| f.title).collect();
    assert_eq!(titles, vec!["Unsorted", "React & Guide Collection"]);

    // originals stay, copies are added
    assert_eq!(flatten(&after).len(), 4);
    let copies = &collect_folders(&after)[1].bookmarks;
    assert_eq!(copies, &items);
}
