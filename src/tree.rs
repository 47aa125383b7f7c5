//! The in-memory wiki tree.
//!
//! Entries live in a strict tree of folders keyed by canonical path segments.
//! Markdown documents may link to each other in cycles; the tree never does.
//! Cycles are the scan engine's problem (its visited set), not the tree's.
//!
//! ## Change detection
//!
//! [`TreeStore::upsert`] is the single choke point for effective changes: it
//! either replaces an entry wholesale or, when the caller's equality function
//! says old and new are the same revision, leaves the old entry untouched and
//! reports `true`. The coordinator uses [`is_same_entry`] (kind and stamp
//! match) so that re-fetching an unchanged document costs no UI work.
//!
//! ## Navigation menu
//!
//! [`TreeStore::menu`] projects the folder tree down to what a reader can
//! navigate to: folders and markdown documents. Data and stylesheet entries
//! are pruned, and so are folders left empty by that pruning.

use crate::markdown::{self, Heading, MarkdownPattern};
use crate::source::Locator;
use crate::stamp::EntryStamp;
use crate::types::MenuItem;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Transient handle through which the presentation layer reaches a data
/// document's payload. Not part of stamp comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataRef(pub String);

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Folder {
    pub children: BTreeMap<String, TreeEntry>,
}

#[derive(Debug, Clone)]
pub struct MarkdownDoc {
    pub text: String,
    pub stamp: EntryStamp,
    /// Where the document came from; the freshness poller re-checks it here.
    pub origin: Locator,
    pub title: Option<String>,
    pub headings: Vec<Heading>,
    pub images: Vec<String>,
    pub links: Vec<String>,
    pub markdown_links: Vec<String>,
}

impl MarkdownDoc {
    pub fn parse(
        text: String,
        stamp: EntryStamp,
        origin: Locator,
        pattern: &MarkdownPattern,
    ) -> Self {
        let extracted = markdown::extract(&text, pattern);
        Self {
            text,
            stamp,
            origin,
            title: extracted.title,
            headings: extracted.headings,
            images: extracted.images,
            links: extracted.links,
            markdown_links: extracted.markdown_links,
        }
    }

    /// Every outgoing in-wiki link: images, generic links, markdown links.
    pub fn all_links(&self) -> impl Iterator<Item = &str> {
        self.markdown_links
            .iter()
            .chain(&self.images)
            .chain(&self.links)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct DataDoc {
    pub payload: Arc<[u8]>,
    pub mime: String,
    pub stamp: EntryStamp,
    pub origin: Locator,
    pub data_ref: Option<DataRef>,
}

#[derive(Debug, Clone)]
pub struct CssDoc {
    pub css: String,
    pub stamp: EntryStamp,
    pub origin: Locator,
}

#[derive(Debug, Clone)]
pub enum TreeEntry {
    Folder(Folder),
    Markdown(MarkdownDoc),
    Data(DataDoc),
    Css(CssDoc),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    Markdown,
    Data,
    Css,
}

impl TreeEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            TreeEntry::Folder(_) => EntryKind::Folder,
            TreeEntry::Markdown(_) => EntryKind::Markdown,
            TreeEntry::Data(_) => EntryKind::Data,
            TreeEntry::Css(_) => EntryKind::Css,
        }
    }

    /// Folders carry no stamp.
    pub fn stamp(&self) -> Option<&EntryStamp> {
        match self {
            TreeEntry::Folder(_) => None,
            TreeEntry::Markdown(doc) => Some(&doc.stamp),
            TreeEntry::Data(doc) => Some(&doc.stamp),
            TreeEntry::Css(doc) => Some(&doc.stamp),
        }
    }

    pub fn origin(&self) -> Option<&Locator> {
        match self {
            TreeEntry::Folder(_) => None,
            TreeEntry::Markdown(doc) => Some(&doc.origin),
            TreeEntry::Data(doc) => Some(&doc.origin),
            TreeEntry::Css(doc) => Some(&doc.origin),
        }
    }

    pub fn as_markdown(&self) -> Option<&MarkdownDoc> {
        match self {
            TreeEntry::Markdown(doc) => Some(doc),
            _ => None,
        }
    }
}

/// Document equality: same kind and same stamp. Payloads are never compared.
pub fn is_same_entry(old: &TreeEntry, new: &TreeEntry) -> bool {
    old.kind() == new.kind() && old.stamp() == new.stamp()
}

#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    root: Folder,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &Folder {
        &self.root
    }

    pub fn clear(&mut self) {
        self.root = Folder::default();
    }

    /// Look up an entry. The empty path is the root folder, which has no
    /// `TreeEntry` of its own, so it yields `None`.
    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        let mut segments = segments(path);
        let first = segments.next()?;
        let mut entry = self.root.children.get(first)?;
        for segment in segments {
            match entry {
                TreeEntry::Folder(folder) => entry = folder.children.get(segment)?,
                _ => return None,
            }
        }
        Some(entry)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Insert or replace the entry at `path`.
    ///
    /// Returns `true` when an entry already existed and `same(old, new)`
    /// holds; the old entry is then left exactly as it was. Otherwise the new
    /// entry replaces whatever was there (creating intermediate folders, and
    /// replacing non-folder entries that stand where a folder is needed) and
    /// `false` is returned. The empty path cannot hold an entry and is ignored.
    pub fn upsert(
        &mut self,
        path: &str,
        entry: TreeEntry,
        same: impl Fn(&TreeEntry, &TreeEntry) -> bool,
    ) -> bool {
        let parts: Vec<&str> = segments(path).collect();
        let Some((leaf, dirs)) = parts.split_last() else {
            tracing::warn!("ignoring upsert at the root path");
            return false;
        };

        let mut folder = &mut self.root;
        for dir in dirs {
            let slot = folder
                .children
                .entry((*dir).to_string())
                .or_insert_with(|| TreeEntry::Folder(Folder::default()));
            if !matches!(slot, TreeEntry::Folder(_)) {
                tracing::warn!(path, segment = *dir, "document replaced by folder");
                *slot = TreeEntry::Folder(Folder::default());
            }
            let TreeEntry::Folder(next) = slot else {
                unreachable!("slot was just made a folder");
            };
            folder = next;
        }

        if let Some(old) = folder.children.get(*leaf)
            && same(old, &entry)
        {
            return true;
        }
        folder.children.insert((*leaf).to_string(), entry);
        false
    }

    /// Remove and return the entry at `path` (with its subtree).
    pub fn delete(&mut self, path: &str) -> Option<TreeEntry> {
        let parts: Vec<&str> = segments(path).collect();
        let (leaf, dirs) = parts.split_last()?;
        let mut folder = &mut self.root;
        for dir in dirs {
            match folder.children.get_mut(*dir)? {
                TreeEntry::Folder(next) => folder = next,
                _ => return None,
            }
        }
        folder.children.remove(*leaf)
    }

    /// Post-order fold over every leaf entry under `start`.
    ///
    /// Children of a folder are folded (in name order) before the fold moves
    /// on to the folder's next sibling. Traversal uses an explicit stack, so
    /// tree depth is bounded by memory rather than by the call stack.
    pub fn reduce<A>(
        &self,
        start: &str,
        initial: A,
        mut f: impl FnMut(A, &str, &TreeEntry) -> A,
    ) -> A {
        let start_path = segments(start).collect::<Vec<_>>().join("/");
        let mut acc = initial;
        let mut stack: Vec<(String, &TreeEntry)> = Vec::new();

        if start_path.is_empty() {
            push_children(&mut stack, "", &self.root);
        } else {
            match self.get(&start_path) {
                Some(entry) => stack.push((start_path, entry)),
                None => return acc,
            }
        }

        while let Some((path, entry)) = stack.pop() {
            match entry {
                TreeEntry::Folder(folder) => push_children(&mut stack, &path, folder),
                leaf => acc = f(acc, &path, leaf),
            }
        }
        acc
    }

    /// Number of leaf entries.
    pub fn len(&self) -> usize {
        self.reduce("", 0, |n, _, _| n + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Navigation projection: folders and markdown documents only.
    pub fn menu(&self) -> MenuItem {
        MenuItem {
            title: String::new(),
            path: String::new(),
            is_folder: true,
            children: menu_children("", &self.root),
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn push_children<'a>(stack: &mut Vec<(String, &'a TreeEntry)>, parent: &str, folder: &'a Folder) {
    // Reversed so that popping visits children in name order.
    for (name, child) in folder.children.iter().rev() {
        stack.push((join(parent, name), child));
    }
}

fn menu_children(parent: &str, folder: &Folder) -> Vec<MenuItem> {
    folder
        .children
        .iter()
        .filter_map(|(name, entry)| {
            let path = join(parent, name);
            match entry {
                TreeEntry::Folder(sub) => {
                    let children = menu_children(&path, sub);
                    (!children.is_empty()).then(|| MenuItem {
                        title: name.clone(),
                        path,
                        is_folder: true,
                        children,
                    })
                }
                TreeEntry::Markdown(doc) => Some(MenuItem {
                    title: doc.title.clone().unwrap_or_else(|| name.clone()),
                    path,
                    is_folder: false,
                    children: Vec::new(),
                }),
                TreeEntry::Data(_) | TreeEntry::Css(_) => None,
            }
        })
        .collect()
}
