use serde::{Deserialize, Serialize};

/// A single bookmark as seen by search and organize.
///
/// Identity is the `(title, url)` pair; duplicates are legal and treated as
/// distinct points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BookmarkItem {
    pub title: String,
    pub url: String,
}

impl BookmarkItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    /// Text used for search embeddings and the substring fallback.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.url)
    }
}

/// A folder and its direct bookmarks. The title is provenance only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FolderContext {
    pub title: String,
    pub bookmarks: Vec<BookmarkItem>,
}

/// A proposed folder produced by auto-organize.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrganizedFolder {
    pub title: String,
    pub bookmarks: Vec<BookmarkItem>,
}

/// A node of the browser bookmark tree, in the shape `bookmarks.getTree`
/// returns it. Nodes with a `url` are bookmarks, nodes with `children` and no
/// `url` are folders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    pub fn is_bookmark(&self) -> bool {
        self.url.is_some()
    }

    pub fn is_folder(&self) -> bool {
        self.url.is_none() && self.children.is_some()
    }

    pub fn children(&self) -> &[BookmarkNode] {
        self.children.as_deref().unwrap_or_default()
    }

    fn as_item(&self) -> Option<BookmarkItem> {
        self.url.as_ref().map(|url| BookmarkItem {
            title: self.title.clone(),
            url: url.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookmarkError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("malformed bookmark tree: {0}")]
    MalformedTree(#[from] serde_json::Error),
}

/// Parse a bookmark tree snapshot (a JSON array of root nodes).
pub fn parse_tree(json: &str) -> Result<Vec<BookmarkNode>, BookmarkError> {
    Ok(serde_json::from_str(json)?)
}

/// Every folder that directly holds at least one bookmark, depth-first.
pub fn collect_folders(roots: &[BookmarkNode]) -> Vec<FolderContext> {
    let mut folders = Vec::new();
    for root in roots {
        collect_folder_node(root, &mut folders);
    }
    folders
}

fn collect_folder_node(node: &BookmarkNode, folders: &mut Vec<FolderContext>) {
    if !node.is_folder() {
        return;
    }

    let bookmarks: Vec<BookmarkItem> = node.children().iter().filter_map(|c| c.as_item()).collect();
    if !bookmarks.is_empty() {
        folders.push(FolderContext {
            title: node.title.clone(),
            bookmarks,
        });
    }

    for child in node.children().iter().filter(|c| c.is_folder()) {
        collect_folder_node(child, folders);
    }
}

/// Every bookmark in the tree, depth-first pre-order.
pub fn flatten(roots: &[BookmarkNode]) -> Vec<BookmarkItem> {
    fn walk(node: &BookmarkNode, out: &mut Vec<BookmarkItem>) {
        if let Some(item) = node.as_item() {
            out.push(item);
        }
        for child in node.children() {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for root in roots {
        walk(root, &mut out);
    }
    out
}

/// Host part of an absolute url.
pub fn hostname(raw: &str) -> Result<String, BookmarkError> {
    let parsed = url::Url::parse(raw).map_err(|e| BookmarkError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    parsed
        .host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| BookmarkError::InvalidUrl {
            url: raw.to_string(),
            reason: "url has no host".to_string(),
        })
}
