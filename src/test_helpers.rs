//! Shared test utilities for the markwiki test suite.
//!
//! Provides entry builders and [`MockOpener`], an in-memory
//! blob source that records every operation so tests can assert on what was
//! fetched and how often.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let opener = MockOpener::new();
//! opener.add_text("https://wiki.test/index.md", "# Home\n[a](a.md)", "s1");
//! // ... run a scan against wiki_root() ...
//! assert_eq!(opener.reads_of("https://wiki.test/index.md"), 1);
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

use crate::markdown::MarkdownPattern;
use crate::source::{
    BinaryBlob, BlobMeta, BlobOpener, BlobSource, FetchError, Locator, SourceRoot, TextBlob,
    mime_for,
};
use crate::stamp::EntryStamp;
use crate::tree::{DataDoc, MarkdownDoc, TreeEntry};
use crate::types::SyncEvent;

// =========================================================================
// Builders
// =========================================================================

/// The stock markdown file pattern.
pub fn pattern() -> MarkdownPattern {
    MarkdownPattern::new(r"\.(md|mkd|markdown)$").unwrap()
}

/// URL root every [`MockOpener`] test uses.
pub fn wiki_root() -> SourceRoot {
    SourceRoot::Url(Url::parse("https://wiki.test/").unwrap())
}

pub fn markdown_doc(text: &str, stamp: &str) -> MarkdownDoc {
    MarkdownDoc::parse(
        text.to_string(),
        EntryStamp::from(stamp),
        Locator::Url(Url::parse("https://wiki.test/index.md").unwrap()),
        &pattern(),
    )
}

pub fn markdown_entry(text: &str, stamp: &str) -> TreeEntry {
    TreeEntry::Markdown(markdown_doc(text, stamp))
}

pub fn data_entry(bytes: &[u8], stamp: &str) -> TreeEntry {
    TreeEntry::Data(DataDoc {
        payload: Arc::from(bytes),
        mime: "image/png".to_string(),
        stamp: EntryStamp::from(stamp),
        origin: Locator::Embedded("data.png".into()),
        data_ref: None,
    })
}

/// Every event currently queued, without waiting.
pub fn drain(rx: &mut UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =========================================================================
// MockOpener
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    Probe(String),
    ReadText(String),
    ReadBinary(String),
}

#[derive(Debug, Clone)]
struct MockBlob {
    bytes: Vec<u8>,
    stamp: EntryStamp,
}

#[derive(Debug, Default)]
struct MockState {
    blobs: HashMap<String, MockBlob>,
    ops: Vec<RecordedOp>,
}

/// In-memory [`BlobOpener`] keyed by the locator's display form.
///
/// Clones share state. Unknown locators fail with [`FetchError::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct MockOpener {
    state: Arc<Mutex<MockState>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn add_text(&self, locator: &str, text: &str, stamp: &str) {
        self.add_binary(locator, text.as_bytes(), stamp);
    }

    pub fn add_binary(&self, locator: &str, bytes: &[u8], stamp: &str) {
        self.with_state(|s| {
            s.blobs.insert(
                locator.to_string(),
                MockBlob {
                    bytes: bytes.to_vec(),
                    stamp: EntryStamp::from(stamp),
                },
            )
        });
    }

    pub fn operations(&self) -> Vec<RecordedOp> {
        self.with_state(|s| s.ops.clone())
    }

    pub fn clear_operations(&self) {
        self.with_state(|s| s.ops.clear());
    }

    /// Text and binary reads of one locator.
    pub fn reads_of(&self, locator: &str) -> usize {
        self.with_state(|s| {
            s.ops
                .iter()
                .filter(|op| match op {
                    RecordedOp::ReadText(l) | RecordedOp::ReadBinary(l) => l == locator,
                    RecordedOp::Probe(_) => false,
                })
                .count()
        })
    }
}

impl BlobOpener for MockOpener {
    fn open(&self, locator: &Locator) -> Box<dyn BlobSource> {
        Box::new(MockSource {
            key: locator.to_string(),
            opener: self.clone(),
        })
    }
}

struct MockSource {
    key: String,
    opener: MockOpener,
}

impl MockSource {
    fn fetch(&self, op: RecordedOp) -> Result<(BlobMeta, Vec<u8>), FetchError> {
        self.opener.with_state(|s| {
            s.ops.push(op);
            let blob = s
                .blobs
                .get(&self.key)
                .ok_or_else(|| FetchError::NotFound(self.key.clone()))?;
            let meta = BlobMeta {
                stamp: blob.stamp.clone(),
                mime: mime_for(&self.key).to_string(),
            };
            Ok((meta, blob.bytes.clone()))
        })
    }
}

#[async_trait]
impl BlobSource for MockSource {
    async fn probe(&self) -> Result<BlobMeta, FetchError> {
        self.fetch(RecordedOp::Probe(self.key.clone()))
            .map(|(meta, _)| meta)
    }

    async fn read_text(&self) -> Result<TextBlob, FetchError> {
        let (meta, bytes) = self.fetch(RecordedOp::ReadText(self.key.clone()))?;
        Ok(TextBlob {
            meta,
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    async fn read_binary(&self) -> Result<BinaryBlob, FetchError> {
        let (meta, bytes) = self.fetch(RecordedOp::ReadBinary(self.key.clone()))?;
        Ok(BinaryBlob { meta, bytes })
    }
}
