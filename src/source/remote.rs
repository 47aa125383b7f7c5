//! HTTP(S) source.
//!
//! `probe` is a HEAD request, the reads are GETs. Any non-success status is
//! [`FetchError::NotFound`]; transport errors (DNS, TLS, timeouts) are
//! [`FetchError::SourceUnavailable`]. Request timeouts are configured on the
//! shared client, not here.

use super::{BinaryBlob, BlobMeta, BlobSource, FetchError, TextBlob, mime_for};
use crate::stamp::EntryStamp;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG, HeaderMap, HeaderName, LAST_MODIFIED};
use reqwest::{Client, Response};
use url::Url;

pub struct UrlBlob {
    client: Client,
    url: Url,
}

impl UrlBlob {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    fn check(&self, response: Response) -> Result<Response, FetchError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(FetchError::NotFound(format!("{}: HTTP {status}", self.url)))
        }
    }

    fn unavailable(&self, e: reqwest::Error) -> FetchError {
        FetchError::SourceUnavailable(format!("{}: {e}", self.url))
    }

    fn meta(&self, headers: &HeaderMap) -> BlobMeta {
        let header = move |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
        let mime = header(CONTENT_TYPE)
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_string())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| mime_for(self.url.path()).to_string());
        BlobMeta {
            stamp: EntryStamp::from_validators(header(ETAG), header(LAST_MODIFIED)),
            mime,
        }
    }

    async fn get(&self) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;
        self.check(response)
    }
}

#[async_trait]
impl BlobSource for UrlBlob {
    async fn probe(&self) -> Result<BlobMeta, FetchError> {
        let response = self
            .client
            .head(self.url.clone())
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;
        let response = self.check(response)?;
        Ok(self.meta(response.headers()))
    }

    async fn read_text(&self) -> Result<TextBlob, FetchError> {
        let response = self.get().await?;
        let meta = self.meta(response.headers());
        let text = response.text().await.map_err(|e| self.unavailable(e))?;
        Ok(TextBlob { meta, text })
    }

    async fn read_binary(&self) -> Result<BinaryBlob, FetchError> {
        let response = self.get().await?;
        let meta = self.meta(response.headers());
        let bytes = response.bytes().await.map_err(|e| self.unavailable(e))?;
        Ok(BinaryBlob {
            meta,
            bytes: bytes.to_vec(),
        })
    }
}
