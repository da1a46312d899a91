use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

mod bookmarks;
mod cli;
mod config;
mod organize;
mod semantic;
mod store;
#[cfg(test)]
mod tests;

use bookmarks::BookmarkNode;
use config::Config;
use organize::AutoOrganizer;
use semantic::{EmbeddingProvider, ProviderState, SemanticSearch};
use store::{BookmarkStore, MemoryStore};

const DEFAULT_TREE_FILE: &str = "bookmarks.json";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_tree(config: &Config, path: Option<PathBuf>) -> anyhow::Result<Vec<BookmarkNode>> {
    let path = path.unwrap_or_else(|| config.base_path().join(DEFAULT_TREE_FILE));
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read bookmark tree {}", path.display()))?;
    bookmarks::parse_tree(&json).with_context(|| format!("failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = cli::Args::parse();

    let config = Config::load()?;
    tracing::debug!(base_path = %config.base_path().display(), "config loaded");

    let provider = EmbeddingProvider::shared(&config.semantic_search, config.base_path());

    match args.command {
        cli::Command::Search {
            query,
            threshold,
            limit,
            tree_args,
        } => {
            let tree = load_tree(&config, tree_args.tree)?;
            let folders = bookmarks::collect_folders(&tree);

            let mut engine = SemanticSearch::from_config(provider, &config.semantic_search);
            if let Some(threshold) = threshold {
                engine = engine.with_threshold(threshold);
            }
            let mut results = engine.search(&query, &folders).await;
            if let Some(limit) = limit {
                results.truncate(limit);
            }

            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }

        cli::Command::Organize {
            clusters,
            seed,
            apply,
            yes,
            tree_args,
        } => {
            let tree = load_tree(&config, tree_args.tree)?;
            let items = bookmarks::flatten(&tree);

            let organizer = AutoOrganizer::with_config(provider, &config.organize)
                .num_clusters(clusters.unwrap_or(config.organize.num_clusters))
                .seed(seed.or(config.organize.seed));
            let folders = organizer
                .try_organize(&items)
                .await
                .context("auto-organize failed, no folders were changed")?;

            println!("{}", serde_json::to_string_pretty(&folders)?);

            if !apply {
                return Ok(());
            }

            if folders.is_empty() {
                println!("Nothing to organize");
                return Ok(());
            }

            if !yes {
                match inquire::prompt_confirmation(format!(
                    "Create {} folders? Existing bookmarks stay where they are.",
                    folders.len()
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            apply_proposals(tree, &folders)
        }

        cli::Command::Status {} => {
            print_status(&provider, config.base_path()).await;
            Ok(())
        }
    }
}

fn apply_proposals(tree: Vec<BookmarkNode>, folders: &[bookmarks::OrganizedFolder]) -> anyhow::Result<()> {
    let store = MemoryStore::new(tree);
    let created = store::materialize(&store, folders)?;
    log::info!("Created {} folders", created.len());

    println!("{}", serde_json::to_string_pretty(&store.list_tree()?)?);
    Ok(())
}

async fn print_status(provider: &Arc<EmbeddingProvider>, base_path: &Path) {
    println!("base path: {}", base_path.display());
    match provider.ensure_ready().await {
        ProviderState::Ready(backend) => println!("embeddings: ready ({} backend)", backend),
        ProviderState::Unavailable => println!("embeddings: unavailable, search uses substring matching"),
        state => println!("embeddings: {:?}", state),
    }
}
