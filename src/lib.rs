//! # markwiki
//!
//! A live markdown wiki. A directory or a URL is the data source: markdown
//! files are pages, links between them are followed until every reachable
//! page, image and stylesheet sits in an in-memory tree, and the page being
//! viewed is re-checked at its source until it changes.
//!
//! # Architecture: One Writer, Many Fetchers
//!
//! ```text
//!   SourceRoot ──► scan (fixpoint over links) ──┐
//!   active page ─► freshness poller ────────────┼─► SyncEvent queue ─► Coordinator ─► TreeStore
//!   css_rules ───► stylesheet fetches ──────────┘                            └──────► Presenter
//! ```
//!
//! All network and disk I/O runs in background tokio tasks. They never touch
//! the tree; they report [`types::SyncEvent`]s, and the [`sync::Coordinator`]
//! applies them one at a time. Merging is idempotent: an entry whose kind and
//! stamp match the stored one is absorbed without any UI work, so rescans and
//! polls of an unchanged wiki are silent.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`paths`] | Path normalization, case folding, relative link resolution |
//! | [`stamp`] | Opaque change stamps: validators, content hashes, timestamps |
//! | [`markdown`] | Markdown classification and extraction of title, headings and links |
//! | [`tree`] | The in-memory document tree: upsert, delete, reduce, menu projection |
//! | [`source`] | Blob sources for directories, URLs and embedded files |
//! | [`scan`] | Scan engine: visited-set fixpoint over links, bounded concurrency |
//! | [`poll`] | Freshness checks of the active page and the adaptive poll interval |
//! | [`styles`] | Stylesheet dependencies of the active page |
//! | [`render`] | Markdown to HTML for the active page using pulldown-cmark and Maud |
//! | [`presenter`] | The UI boundary the coordinator talks to |
//! | [`sync`] | The coordinator: session state, merge rules, event loop |
//! | [`config`] | `markwiki.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting and the terminal presenter |
//! | [`types`] | Events, menu items and scan stats shared between modules |
//!
//! # Design Decisions
//!
//! ## Opaque Stamps
//!
//! Change detection compares stamps for equality only. A remote stamp is the
//! server's `ETag`/`Last-Modified` pair, a local one is a SHA-256 of the
//! content, an embedded one the host's write timestamp. Nothing ever orders
//! stamps, so sources are free to choose whatever identifies a revision.
//!
//! ## Spelling vs Key
//!
//! With `lowercase_paths` on, `Guide/Setup.md` and `guide/setup.md` are one
//! page. The folded form keys the tree; the spelling as written is what gets
//! fetched, because servers and filesystems can be case-sensitive.
//!
//! ## Superseded Scans
//!
//! Each scan carries an id. Requesting a new scan cancels the old one, and
//! anything the old scan still reports is dropped on arrival.

pub mod config;
pub mod markdown;
pub mod output;
pub mod paths;
pub mod poll;
pub mod presenter;
pub mod render;
pub mod scan;
pub mod source;
pub mod stamp;
pub mod styles;
pub mod sync;
pub mod tree;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
