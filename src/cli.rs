use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct TreeArgs {
    /// Bookmark tree snapshot (JSON array of root nodes).
    /// Defaults to bookmarks.json in the base directory.
    #[clap(long)]
    pub tree: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank bookmarks by similarity to a query
    Search {
        /// Free-text query
        query: String,

        /// Minimum similarity (exclusive). Uses config value by default.
        #[clap(long)]
        threshold: Option<f32>,

        /// Print at most this many results
        #[clap(short, long)]
        limit: Option<usize>,

        #[clap(flatten)]
        tree_args: TreeArgs,
    },
    /// Group bookmarks into proposed folders
    Organize {
        /// Number of clusters
        #[clap(short = 'k', long)]
        clusters: Option<usize>,

        /// Seed for reproducible clustering
        #[clap(long)]
        seed: Option<u64>,

        /// Create the proposed folders and print the resulting tree
        #[clap(long, default_value = "false")]
        apply: bool,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,

        #[clap(flatten)]
        tree_args: TreeArgs,
    },
    /// Load the embedding model and print which backend it runs on
    Status {},
}
