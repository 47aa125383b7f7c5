//! Shared types passed between the sync engine's parts.
//!
//! Background work (scans, freshness checks, stylesheet fetches, poll timers)
//! talks to the coordinator only through [`SyncEvent`]s on one ordered queue.

use crate::poll::FreshnessCheck;
use crate::tree::{CssDoc, TreeEntry};
use serde::{Deserialize, Serialize};

/// Identifies one scan request. Events from superseded scans are ignored.
pub type ScanId = u64;

/// Navigation tree item: a folder or a markdown document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub title: String,
    pub path: String,
    pub is_folder: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuItem>,
}

/// Counters reported when a scan reaches its fixpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub fetched: usize,
    /// Keys that were discovered but could not be fetched.
    pub failed: Vec<String>,
    pub dropped_links: usize,
    pub deleted: usize,
}

#[derive(Debug)]
pub enum SyncEvent {
    /// A scan fetched a document.
    EntryResolved {
        scan: ScanId,
        path: String,
        /// The path as written, before case folding.
        spelling: String,
        entry: TreeEntry,
    },
    /// A directory scan found a previously known path missing on disk.
    EntryDeleted { scan: ScanId, path: String },
    /// Emitted once per scan that was not cancelled.
    ScanComplete {
        scan: ScanId,
        source: String,
        stats: ScanStats,
    },
    /// Result of a freshness check on `path`.
    PageChecked { path: String, check: FreshnessCheck },
    /// Result of a stylesheet fetch; `None` when it could not be read.
    StylesheetResolved {
        key: String,
        stylesheet: Option<CssDoc>,
    },
    /// The poll timer fired.
    PollTick,
}
