//! Bookmark store collaborator.
//!
//! `BookmarkStore` is the browser-side bookmark API the engine talks to;
//! `MemoryStore` keeps a bookmark tree in memory so proposals can be applied
//! and inspected without a browser.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::bookmarks::{BookmarkNode, OrganizedFolder};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a folder named {0:?} already exists")]
    FolderExists(String),

    #[error("more than one proposed folder is named {0:?}")]
    DuplicateProposal(String),

    #[error("folder {0:?} not found")]
    FolderNotFound(String),

    #[error("bookmark {0:?} not found")]
    BookmarkNotFound(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub trait BookmarkStore: Send + Sync {
    fn list_tree(&self) -> Result<Vec<BookmarkNode>, StoreError>;
    fn create_folder(&self, name: &str) -> Result<String, StoreError>;
    fn create_bookmark(&self, folder_id: &str, url: &str, title: &str) -> Result<String, StoreError>;
    fn remove_bookmark(&self, url: &str, folder_title: &str) -> Result<(), StoreError>;
    fn move_bookmark(&self, url: &str, from_folder: &str, to_folder: &str) -> Result<(), StoreError>;
    fn delete_folder(&self, title: &str) -> Result<(), StoreError>;
}

/// Create one folder per proposal, then its bookmarks, and return the new
/// folder ids. Original bookmarks are left where they are.
///
/// All or nothing: titles are checked against existing folders and each other
/// before anything is created, and folders created before a later failure are
/// deleted again.
pub fn materialize(store: &dyn BookmarkStore, folders: &[OrganizedFolder]) -> Result<Vec<String>, StoreError> {
    check_titles(store, folders)?;

    let mut created: Vec<(String, &str)> = Vec::with_capacity(folders.len());
    for folder in folders {
        if let Err(e) = create_with_bookmarks(store, folder, &mut created) {
            log::warn!("Materialize failed, rolling back {} folders: {}", created.len(), e);
            for (_, title) in created.iter().rev() {
                if let Err(rollback) = store.delete_folder(title) {
                    log::error!("Failed to roll back folder {:?}: {}", title, rollback);
                }
            }
            return Err(e);
        }
    }

    Ok(created.into_iter().map(|(id, _)| id).collect())
}

fn check_titles(store: &dyn BookmarkStore, folders: &[OrganizedFolder]) -> Result<(), StoreError> {
    let mut taken = HashSet::new();
    visit(&store.list_tree()?, &mut |n| {
        if n.is_folder() {
            taken.insert(n.title.clone());
        }
    });
    if let Some(folder) = folders.iter().find(|f| taken.contains(&f.title)) {
        return Err(StoreError::FolderExists(folder.title.clone()));
    }

    let mut proposed = HashSet::new();
    for folder in folders {
        if !proposed.insert(folder.title.as_str()) {
            return Err(StoreError::DuplicateProposal(folder.title.clone()));
        }
    }
    Ok(())
}

fn create_with_bookmarks<'a>(
    store: &dyn BookmarkStore,
    folder: &'a OrganizedFolder,
    created: &mut Vec<(String, &'a str)>,
) -> Result<(), StoreError> {
    let folder_id = store.create_folder(&folder.title)?;
    created.push((folder_id.clone(), &folder.title));

    for bookmark in &folder.bookmarks {
        store.create_bookmark(&folder_id, &bookmark.url, &bookmark.title)?;
    }
    log::info!(
        "Created folder {:?} with {} bookmarks",
        folder.title,
        folder.bookmarks.len()
    );
    Ok(())
}

struct Tree {
    roots: Vec<BookmarkNode>,
    next_id: u64,
}

impl Tree {
    fn allocate_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }
}

pub struct MemoryStore {
    tree: RwLock<Tree>,
}

impl MemoryStore {
    pub fn new(roots: Vec<BookmarkNode>) -> Self {
        let mut max_id = 0;
        visit(&roots, &mut |node| {
            if let Ok(id) = node.id.parse::<u64>() {
                max_id = max_id.max(id);
            }
        });

        Self {
            tree: RwLock::new(Tree {
                roots,
                next_id: max_id + 1,
            }),
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tree>, StoreError> {
        self.tree.write().map_err(|_| StoreError::Poisoned)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn visit(nodes: &[BookmarkNode], f: &mut dyn FnMut(&BookmarkNode)) {
    for node in nodes {
        f(node);
        visit(node.children(), f);
    }
}

fn find_mut<'a>(
    nodes: &'a mut [BookmarkNode],
    pred: &dyn Fn(&BookmarkNode) -> bool,
) -> Option<&'a mut BookmarkNode> {
    for node in nodes {
        if pred(node) {
            return Some(node);
        }
        if let Some(children) = node.children.as_mut() {
            if let Some(found) = find_mut(children, pred) {
                return Some(found);
            }
        }
    }
    None
}

/// Detach the first node matching `pred` (depth-first) and return it.
fn take_first(nodes: &mut Vec<BookmarkNode>, pred: &dyn Fn(&BookmarkNode) -> bool) -> Option<BookmarkNode> {
    if let Some(pos) = nodes.iter().position(|n| pred(n)) {
        let node = nodes.remove(pos);
        reindex(nodes);
        return Some(node);
    }
    for node in nodes.iter_mut() {
        if let Some(children) = node.children.as_mut() {
            if let Some(found) = take_first(children, pred) {
                return Some(found);
            }
        }
    }
    None
}

fn reindex(siblings: &mut [BookmarkNode]) {
    for (index, node) in siblings.iter_mut().enumerate() {
        node.index = Some(index);
    }
}

fn append_child(parent: &mut BookmarkNode, mut child: BookmarkNode) {
    let children = parent.children.get_or_insert_with(Vec::new);
    child.parent_id = Some(parent.id.clone());
    child.index = Some(children.len());
    children.push(child);
}

fn folder_titled(title: &str) -> impl Fn(&BookmarkNode) -> bool + '_ {
    move |n| n.is_folder() && n.title == title
}

impl BookmarkStore for MemoryStore {
    fn list_tree(&self) -> Result<Vec<BookmarkNode>, StoreError> {
        let tree = self.tree.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tree.roots.clone())
    }

    /// New folders go into the bookmarks bar, the first child of the first root.
    fn create_folder(&self, name: &str) -> Result<String, StoreError> {
        let mut tree = self.write()?;

        let mut exists = false;
        visit(&tree.roots, &mut |n| exists |= n.is_folder() && n.title == name);
        if exists {
            return Err(StoreError::FolderExists(name.to_string()));
        }

        let id = tree.allocate_id();
        let folder = BookmarkNode {
            id: id.clone(),
            title: name.to_string(),
            date_added: Some(now_millis()),
            children: Some(Vec::new()),
            ..Default::default()
        };

        let bar = tree
            .roots
            .first_mut()
            .and_then(|root| root.children.as_mut())
            .and_then(|children| children.iter_mut().find(|c| c.is_folder()));

        match bar {
            Some(bar) => append_child(bar, folder),
            None => {
                let index = tree.roots.len();
                tree.roots.push(BookmarkNode {
                    index: Some(index),
                    ..folder
                });
            }
        }

        Ok(id)
    }

    fn create_bookmark(&self, folder_id: &str, url: &str, title: &str) -> Result<String, StoreError> {
        let mut tree = self.write()?;
        // the id is only taken once the folder is known to exist
        let id = tree.next_id.to_string();

        let folder = find_mut(&mut tree.roots, &|n| n.is_folder() && n.id == folder_id)
            .ok_or_else(|| StoreError::FolderNotFound(folder_id.to_string()))?;

        append_child(
            folder,
            BookmarkNode {
                id: id.clone(),
                title: title.to_string(),
                url: Some(url.to_string()),
                date_added: Some(now_millis()),
                ..Default::default()
            },
        );
        tree.next_id += 1;

        Ok(id)
    }

    /// An empty `folder_title` removes the first bookmark with `url` anywhere.
    fn remove_bookmark(&self, url: &str, folder_title: &str) -> Result<(), StoreError> {
        let mut tree = self.write()?;
        let is_match = |n: &BookmarkNode| n.url.as_deref() == Some(url);

        let removed = if folder_title.is_empty() {
            take_first(&mut tree.roots, &is_match)
        } else {
            find_mut(&mut tree.roots, &folder_titled(folder_title))
                .and_then(|folder| folder.children.as_mut())
                .and_then(|children| take_first(children, &is_match))
        };

        removed
            .map(|_| ())
            .ok_or_else(|| StoreError::BookmarkNotFound(url.to_string()))
    }

    fn move_bookmark(&self, url: &str, from_folder: &str, to_folder: &str) -> Result<(), StoreError> {
        let mut tree = self.write()?;

        let mut target_exists = false;
        visit(&tree.roots, &mut |n| target_exists |= n.is_folder() && n.title == to_folder);
        if !target_exists {
            return Err(StoreError::FolderNotFound(to_folder.to_string()));
        }

        let is_match = |n: &BookmarkNode| n.url.as_deref() == Some(url);
        let from_children = find_mut(&mut tree.roots, &folder_titled(from_folder)).and_then(|f| f.children.as_mut());
        let bookmark = match from_children {
            Some(children) => take_first(children, &is_match),
            None => take_first(&mut tree.roots, &is_match),
        }
        .ok_or_else(|| StoreError::BookmarkNotFound(url.to_string()))?;

        let target = find_mut(&mut tree.roots, &folder_titled(to_folder))
            .ok_or_else(|| StoreError::FolderNotFound(to_folder.to_string()))?;
        append_child(target, bookmark);

        Ok(())
    }

    fn delete_folder(&self, title: &str) -> Result<(), StoreError> {
        let mut tree = self.write()?;
        take_first(&mut tree.roots, &folder_titled(title))
            .map(|_| ())
            .ok_or_else(|| StoreError::FolderNotFound(title.to_string()))
    }
}
