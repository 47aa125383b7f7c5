//! Blob sources: uniform reads over where documents live.
//!
//! Three kinds of origin exist, each addressed by a [`Locator`]:
//!
//! | Locator | Implementation | Stamp |
//! |---------|----------------|-------|
//! | `File` | [`local::FileBlob`] (tokio::fs) | SHA-256 of contents |
//! | `Url` | [`remote::UrlBlob`] (reqwest, HEAD/GET) | `ETag` + `Last-Modified` |
//! | `Embedded` | [`embedded::EmbeddedBlob`] (in-memory store) | element timestamp |
//!
//! Every source offers the same three reads, cheapest first: [`BlobSource::probe`]
//! (metadata only), [`BlobSource::read_text`] and [`BlobSource::read_binary`].
//!
//! Failures come back as [`FetchError`]. The scan engine, the freshness
//! poller and the stylesheet fetcher turn every failure into "no update this
//! round"; nothing here is ever fatal.
//!
//! [`BlobOpener`] is the seam between the sync engine and real I/O: the
//! engine asks an opener for a source per locator, so tests substitute a
//! recording mock opener without touching the filesystem or the network.

pub mod embedded;
pub mod local;
pub mod remote;

use crate::paths::{self, PathError};
use async_trait::async_trait;
use embedded::{EmbeddedBlob, EmbeddedStore};
use local::FileBlob;
use remote::UrlBlob;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::stamp::EntryStamp;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Where a single document can be read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    File(PathBuf),
    Url(Url),
    Embedded(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::File(path) => write!(f, "{}", path.display()),
            Locator::Url(url) => f.write_str(url.as_str()),
            Locator::Embedded(name) => write!(f, "embedded:{name}"),
        }
    }
}

/// The root a scan discovers documents under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRoot {
    Directory(PathBuf),
    Url(Url),
}

impl SourceRoot {
    /// Locator of the document with the given spelling under this root.
    pub fn locate(&self, spelling: &str) -> Result<Locator, PathError> {
        match self {
            SourceRoot::Directory(dir) => {
                let path = spelling
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .fold(dir.clone(), |acc, segment| acc.join(segment));
                Ok(Locator::File(path))
            }
            SourceRoot::Url(root) => paths::url_for(root, spelling).map(Locator::Url),
        }
    }

    /// Human-readable identity, reported with scan completion.
    pub fn identity(&self) -> String {
        match self {
            SourceRoot::Directory(dir) => dir.display().to_string(),
            SourceRoot::Url(url) => url.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub stamp: EntryStamp,
    pub mime: String,
}

#[derive(Debug, Clone)]
pub struct TextBlob {
    pub meta: BlobMeta,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct BinaryBlob {
    pub meta: BlobMeta,
    pub bytes: Vec<u8>,
}

/// Read capability over one document.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Existence and metadata, as cheaply as the transport allows.
    async fn probe(&self) -> Result<BlobMeta, FetchError>;

    async fn read_text(&self) -> Result<TextBlob, FetchError>;

    async fn read_binary(&self) -> Result<BinaryBlob, FetchError>;
}

/// Hands out a [`BlobSource`] for a locator.
pub trait BlobOpener: Send + Sync {
    fn open(&self, locator: &Locator) -> Box<dyn BlobSource>;

    /// The store [`Locator::Embedded`] locators are read from, if any.
    fn embedded(&self) -> Option<Arc<EmbeddedStore>> {
        None
    }
}

/// The production opener: local files, HTTP(S) and the embedded store.
#[derive(Clone)]
pub struct Sources {
    client: reqwest::Client,
    embedded: Arc<EmbeddedStore>,
}

impl Sources {
    pub fn new(request_timeout: Duration) -> Self {
        Self::with_embedded(request_timeout, Arc::new(EmbeddedStore::new()))
    }

    pub fn with_embedded(request_timeout: Duration, embedded: Arc<EmbeddedStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client, embedded }
    }
}

impl BlobOpener for Sources {
    fn open(&self, locator: &Locator) -> Box<dyn BlobSource> {
        match locator {
            Locator::File(path) => Box::new(FileBlob::new(path.clone())),
            Locator::Url(url) => Box::new(UrlBlob::new(self.client.clone(), url.clone())),
            Locator::Embedded(name) => {
                Box::new(EmbeddedBlob::new(Arc::clone(&self.embedded), name.clone()))
            }
        }
    }

    fn embedded(&self) -> Option<Arc<EmbeddedStore>> {
        Some(Arc::clone(&self.embedded))
    }
}

/// MIME type guessed from a path's extension.
pub fn mime_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "md" | "mkd" | "markdown" => "text/markdown",
        "css" => "text/css",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn directory_root_locates_files() {
        let root = SourceRoot::Directory(PathBuf::from("/wiki"));
        assert_eq!(
            root.locate("guide/setup.md").unwrap(),
            Locator::File(Path::new("/wiki").join("guide").join("setup.md"))
        );
    }

    #[test]
    fn url_root_locates_urls() {
        let root = SourceRoot::Url(Url::parse("https://h.example/wiki/").unwrap());
        assert_eq!(
            root.locate("guide/setup.md").unwrap().to_string(),
            "https://h.example/wiki/guide/setup.md"
        );
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for("a/b.MD"), "text/markdown");
        assert_eq!(mime_for("logo.png"), "image/png");
        assert_eq!(mime_for("style.css"), "text/css");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn embedded_locators_read_the_shared_store() {
        let store = Arc::new(EmbeddedStore::new());
        let sources = Sources::with_embedded(Duration::from_secs(1), Arc::clone(&store));
        store.insert(embedded::EmbeddedFile::new("a.md", "text/markdown", 3, b"# A"));

        let shared = sources.embedded().unwrap();
        assert!(Arc::ptr_eq(&shared, &store));
        let blob = sources.open(&Locator::Embedded("a.md".into()));
        assert_eq!(blob.read_text().await.unwrap().text, "# A");
    }

    #[test]
    fn locator_display() {
        assert_eq!(Locator::Embedded("a.md".into()).to_string(), "embedded:a.md");
    }
}
