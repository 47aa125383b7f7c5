//! Fixpoint scan: discover and fetch a wiki from its source root.
//!
//! A scan works over a [`ScanTree`], a shadow of the document tree that only
//! knows, per key, whether the path was already visited and what kind of
//! document it is. Each pass:
//!
//! 1. takes every unvisited node and marks it visited **before** fetching,
//! 2. fetches those nodes concurrently (bounded by `max_concurrent`),
//! 3. emits [`SyncEvent::EntryResolved`] for each success and queues every
//!    link of a fetched markdown document that the scan tree does not know yet.
//!
//! Passes repeat until one takes nothing: the fixpoint. Links back to visited
//! paths are absorbed, so cycles (`a.md ⇄ b.md`) terminate and every path is
//! fetched at most once per scan. A failed fetch leaves its node visited with
//! nothing resolved and contributes no links.
//!
//! ## Seeding
//!
//! | Root | Seeds |
//! |------|-------|
//! | Directory | every markdown file on disk (walkdir) |
//! | URL | the configured top page only |
//!
//! The prior snapshot taken from the live tree marks already resolved paths
//! visited, so a rescan only fetches what is new. Directory scans also compare
//! the snapshot against the listing; a path missing from it whose file is
//! gone as well gets [`SyncEvent::EntryDeleted`]. Hidden files and symlinks
//! never show up in the listing but stay as long as they exist.
//!
//! ## Cancellation
//!
//! A scan stops dispatching fetches as soon as its [`CancellationToken`] fires
//! and then ends without [`SyncEvent::ScanComplete`].

use crate::markdown::MarkdownPattern;
use crate::paths;
use crate::source::{BlobOpener, FetchError, Locator, SourceRoot};
use crate::tree::{CssDoc, DataDoc, MarkdownDoc, TreeEntry, TreeStore};
use crate::types::{ScanId, ScanStats, SyncEvent};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Unvisited,
    Visited,
}

/// Declared content kind of a scan node, from its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Markdown,
    Css,
    Data,
}

impl ContentKind {
    pub fn classify(path: &str, pattern: &MarkdownPattern) -> Self {
        if pattern.is_markdown(path) {
            ContentKind::Markdown
        } else if path.to_ascii_lowercase().ends_with(".css") {
            ContentKind::Css
        } else {
            ContentKind::Data
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanNode {
    pub status: NodeStatus,
    pub kind: ContentKind,
    /// Original-case path handed to the blob source.
    pub spelling: String,
    /// Where the entry was last read from, for nodes taken from the live tree.
    pub origin: Option<Locator>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanTree {
    nodes: BTreeMap<String, ScanNode>,
}

impl ScanTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Projection of the live tree: every leaf entry is a visited node.
    pub fn from_tree(tree: &TreeStore) -> Self {
        let nodes = tree.reduce("", BTreeMap::new(), |mut nodes, path, entry| {
            let kind = match entry {
                TreeEntry::Markdown(_) => ContentKind::Markdown,
                TreeEntry::Css(_) => ContentKind::Css,
                TreeEntry::Data(_) => ContentKind::Data,
                TreeEntry::Folder(_) => return nodes,
            };
            nodes.insert(
                path.to_string(),
                ScanNode {
                    status: NodeStatus::Visited,
                    kind,
                    spelling: path.to_string(),
                    origin: entry.origin().cloned(),
                },
            );
            nodes
        });
        Self { nodes }
    }

    /// Add an unvisited node unless the key is already known.
    pub fn discover(&mut self, key: String, spelling: String, kind: ContentKind) -> bool {
        if self.nodes.contains_key(&key) {
            return false;
        }
        self.nodes.insert(
            key,
            ScanNode {
                status: NodeStatus::Unvisited,
                kind,
                spelling,
                origin: None,
            },
        );
        true
    }

    /// Mark every unvisited node visited and hand them out for fetching.
    ///
    /// This is the only `Unvisited → Visited` transition, and it happens
    /// before any fetch starts.
    pub fn take_unvisited(&mut self) -> Vec<(String, ScanNode)> {
        self.nodes
            .iter_mut()
            .filter(|(_, node)| node.status == NodeStatus::Unvisited)
            .map(|(key, node)| {
                node.status = NodeStatus::Visited;
                (key.clone(), node.clone())
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&ScanNode> {
        self.nodes.get(key)
    }

    pub fn status(&self, key: &str) -> Option<NodeStatus> {
        self.nodes.get(key).map(|n| n.status)
    }

    pub fn remove(&mut self, key: &str) -> Option<ScanNode> {
        self.nodes.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub id: ScanId,
    pub root: SourceRoot,
    pub prior: ScanTree,
    pub pattern: MarkdownPattern,
    pub top_page: String,
    pub lowercase: bool,
    pub max_concurrent: usize,
}

/// Run a scan to its fixpoint, reporting through `events`.
///
/// Returns the stats also carried by [`SyncEvent::ScanComplete`], or `None`
/// when the scan was cancelled or the receiver went away.
pub async fn run_scan(
    request: ScanRequest,
    opener: Arc<dyn BlobOpener>,
    events: UnboundedSender<SyncEvent>,
    cancel: CancellationToken,
) -> Option<ScanStats> {
    let ScanRequest {
        id,
        root,
        prior: mut nodes,
        pattern,
        top_page,
        lowercase,
        max_concurrent,
    } = request;
    let mut stats = ScanStats::default();
    tracing::info!(scan = id, source = %root.identity(), known = nodes.len(), "scan started");

    match &root {
        SourceRoot::Directory(dir) => {
            let Some(listing) = list_directory(dir.clone()).await else {
                tracing::warn!(dir = %dir.display(), "directory unreadable, nothing to scan");
                return complete(id, &root, stats, &events);
            };
            let on_disk: BTreeSet<String> =
                listing.iter().map(|s| paths::fold(s, lowercase)).collect();

            // Hidden files and symlinks never appear in the listing.
            let unlisted: Vec<String> = nodes
                .keys()
                .filter(|key| !on_disk.contains(*key))
                .map(str::to_string)
                .collect();
            for key in unlisted {
                let gone = match nodes.get(&key) {
                    Some(node) => vanished_from_disk(&root, node).await,
                    None => false,
                };
                if !gone {
                    tracing::trace!(scan = id, path = %key, "unlisted entry still on disk");
                    continue;
                }
                nodes.remove(&key);
                stats.deleted += 1;
                tracing::debug!(scan = id, path = %key, "entry deleted on disk");
                if events
                    .send(SyncEvent::EntryDeleted { scan: id, path: key })
                    .is_err()
                {
                    return None;
                }
            }

            for spelling in listing {
                if pattern.is_markdown(&spelling) {
                    let key = paths::fold(&spelling, lowercase);
                    nodes.discover(key, spelling, ContentKind::Markdown);
                }
            }
        }
        SourceRoot::Url(_) => match paths::normalize(&top_page) {
            Ok(spelling) if !spelling.is_empty() => {
                let key = paths::fold(&spelling, lowercase);
                let kind = ContentKind::classify(&spelling, &pattern);
                nodes.discover(key, spelling, kind);
            }
            _ => tracing::warn!(top_page = %top_page, "unusable top page, nothing to scan"),
        },
    }

    let concurrency = max_concurrent.max(1);
    let mut pass = 0usize;
    loop {
        let batch = nodes.take_unvisited();
        if batch.is_empty() {
            break;
        }
        pass += 1;
        tracing::debug!(scan = id, pass, nodes = batch.len(), "scan pass");

        let opener = opener.as_ref();
        let root = &root;
        let pattern = &pattern;
        let fetches = stream::iter(batch)
            .map(|(key, node)| async move {
                let result = fetch_node(opener, root, &node, pattern).await;
                (key, node, result)
            })
            .buffer_unordered(concurrency);
        let mut fetches = std::pin::pin!(fetches);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(scan = id, "scan cancelled");
                    return None;
                }
                next = fetches.next() => next,
            };
            let Some((key, node, result)) = next else {
                break;
            };
            match result {
                Ok(entry) => {
                    if let TreeEntry::Markdown(doc) = &entry {
                        queue_links(&mut nodes, &mut stats, doc, &node.spelling, pattern, lowercase);
                    }
                    stats.fetched += 1;
                    let event = SyncEvent::EntryResolved {
                        scan: id,
                        path: key,
                        spelling: node.spelling,
                        entry,
                    };
                    if events.send(event).is_err() {
                        return None;
                    }
                }
                Err(e) => {
                    tracing::debug!(scan = id, path = %key, error = %e, "fetch failed");
                    stats.failed.push(key);
                }
            }
        }
    }

    complete(id, &root, stats, &events)
}

fn complete(
    id: ScanId,
    root: &SourceRoot,
    stats: ScanStats,
    events: &UnboundedSender<SyncEvent>,
) -> Option<ScanStats> {
    tracing::info!(
        scan = id,
        fetched = stats.fetched,
        failed = stats.failed.len(),
        deleted = stats.deleted,
        "scan complete"
    );
    events
        .send(SyncEvent::ScanComplete {
            scan: id,
            source: root.identity(),
            stats: stats.clone(),
        })
        .ok()?;
    Some(stats)
}

fn queue_links(
    nodes: &mut ScanTree,
    stats: &mut ScanStats,
    doc: &MarkdownDoc,
    base_spelling: &str,
    pattern: &MarkdownPattern,
    lowercase: bool,
) {
    for link in doc.all_links() {
        match paths::resolve_link(base_spelling, link) {
            Ok(Some(spelling)) => {
                let key = paths::fold(&spelling, lowercase);
                let kind = ContentKind::classify(&spelling, pattern);
                nodes.discover(key, spelling, kind);
            }
            Ok(None) => {}
            Err(e) => {
                stats.dropped_links += 1;
                tracing::warn!(document = base_spelling, error = %e, "dropping link");
            }
        }
    }
}

async fn fetch_node(
    opener: &dyn BlobOpener,
    root: &SourceRoot,
    node: &ScanNode,
    pattern: &MarkdownPattern,
) -> Result<TreeEntry, FetchError> {
    let locator = root
        .locate(&node.spelling)
        .map_err(|e| FetchError::NotFound(e.to_string()))?;
    let source = opener.open(&locator);
    let entry = match node.kind {
        ContentKind::Markdown => {
            let blob = source.read_text().await?;
            TreeEntry::Markdown(MarkdownDoc::parse(blob.text, blob.meta.stamp, locator, pattern))
        }
        ContentKind::Css => {
            let blob = source.read_text().await?;
            TreeEntry::Css(CssDoc {
                css: blob.text,
                stamp: blob.meta.stamp,
                origin: locator,
            })
        }
        ContentKind::Data => {
            let blob = source.read_binary().await?;
            TreeEntry::Data(DataDoc {
                payload: blob.bytes.into(),
                mime: blob.meta.mime,
                stamp: blob.meta.stamp,
                origin: locator,
                data_ref: None,
            })
        }
    };
    Ok(entry)
}

/// Whether a known node's file no longer exists.
///
/// Nodes not backed by a file under the directory root (embedded entries,
/// URLs) count as gone. An inconclusive check keeps the node.
async fn vanished_from_disk(root: &SourceRoot, node: &ScanNode) -> bool {
    let locator = match &node.origin {
        Some(origin) => origin.clone(),
        None => match root.locate(&node.spelling) {
            Ok(locator) => locator,
            Err(_) => return true,
        },
    };
    let Locator::File(path) = locator else {
        return true;
    };
    match tokio::fs::try_exists(&path).await {
        Ok(exists) => !exists,
        Err(e) => {
            tracing::debug!(file = %path.display(), error = %e, "cannot tell whether file exists");
            false
        }
    }
}

/// Every file under `dir` as a slash-separated spelling, hidden entries skipped.
///
/// `None` when the directory itself cannot be read.
async fn list_directory(dir: PathBuf) -> Option<Vec<String>> {
    tokio::task::spawn_blocking(move || walk(&dir))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "directory listing task failed");
            None
        })
}

fn walk(dir: &Path) -> Option<Vec<String>> {
    if !dir.is_dir() {
        return None;
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let spelling: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(spelling.join("/"));
    }
    Some(files)
}
