//! Local directory source.
//!
//! Stamps are content fingerprints, so a probe reads the whole file. Wiki
//! documents are small and an mtime can lie (checkouts, copies, editors that
//! preserve timestamps), so the extra read is accepted.

use super::{BinaryBlob, BlobMeta, BlobSource, FetchError, TextBlob, mime_for};
use crate::stamp::EntryStamp;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

pub struct FileBlob {
    path: PathBuf,
}

impl FileBlob {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn read(&self) -> Result<(BlobMeta, Vec<u8>), FetchError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| io_to_fetch(&self.path, e))?;
        let meta = BlobMeta {
            stamp: EntryStamp::from_content(&bytes),
            mime: mime_for(&self.path.to_string_lossy()).to_string(),
        };
        Ok((meta, bytes))
    }
}

fn io_to_fetch(path: &std::path::Path, e: io::Error) -> FetchError {
    let what = format!("{}: {e}", path.display());
    match e.kind() {
        io::ErrorKind::NotFound => FetchError::NotFound(what),
        _ => FetchError::SourceUnavailable(what),
    }
}

#[async_trait]
impl BlobSource for FileBlob {
    async fn probe(&self) -> Result<BlobMeta, FetchError> {
        self.read().await.map(|(meta, _)| meta)
    }

    async fn read_text(&self) -> Result<TextBlob, FetchError> {
        let (meta, bytes) = self.read().await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(TextBlob { meta, text })
    }

    async fn read_binary(&self) -> Result<BinaryBlob, FetchError> {
        let (meta, bytes) = self.read().await?;
        Ok(BinaryBlob { meta, bytes })
    }
}
