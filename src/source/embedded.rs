//! Files embedded in a host document, kept in memory.

use super::{BinaryBlob, BlobMeta, BlobSource, FetchError, TextBlob};
use crate::stamp::EntryStamp;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFile {
    pub name: String,
    pub mime: String,
    /// Recorded by the host when the element was written; doubles as the stamp.
    pub timestamp: u64,
    pub bytes: Arc<[u8]>,
}

impl EmbeddedFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, timestamp: u64, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            timestamp,
            bytes: Arc::from(bytes),
        }
    }

    fn meta(&self) -> BlobMeta {
        BlobMeta {
            stamp: EntryStamp::from_timestamp(self.timestamp),
            mime: self.mime.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EmbeddedStore {
    files: RwLock<BTreeMap<String, EmbeddedFile>>,
}

impl EmbeddedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file by name.
    pub fn insert(&self, file: EmbeddedFile) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files.insert(file.name.clone(), file);
    }

    pub fn get(&self, name: &str) -> Option<EmbeddedFile> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.get(name).cloned()
    }

    /// Snapshot of every file, in name order.
    pub fn files(&self) -> Vec<EmbeddedFile> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.values().cloned().collect()
    }
}

pub struct EmbeddedBlob {
    store: Arc<EmbeddedStore>,
    name: String,
}

impl EmbeddedBlob {
    pub fn new(store: Arc<EmbeddedStore>, name: String) -> Self {
        Self { store, name }
    }

    fn file(&self) -> Result<EmbeddedFile, FetchError> {
        self.store
            .get(&self.name)
            .ok_or_else(|| FetchError::NotFound(format!("embedded:{}", self.name)))
    }
}

#[async_trait]
impl BlobSource for EmbeddedBlob {
    async fn probe(&self) -> Result<BlobMeta, FetchError> {
        self.file().map(|f| f.meta())
    }

    async fn read_text(&self) -> Result<TextBlob, FetchError> {
        let file = self.file()?;
        Ok(TextBlob {
            meta: file.meta(),
            text: String::from_utf8_lossy(&file.bytes).into_owned(),
        })
    }

    async fn read_binary(&self) -> Result<BinaryBlob, FetchError> {
        let file = self.file()?;
        Ok(BinaryBlob {
            meta: file.meta(),
            bytes: file.bytes.to_vec(),
        })
    }
}
