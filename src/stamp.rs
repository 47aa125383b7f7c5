//! Entry stamps: equality-only revision tokens.
//!
//! A stamp identifies one revision of a document. Stamps are compared for
//! equality and nothing else; there is no ordering and no payload comparison.
//! Equal stamps mean "same revision", and the tree trusts that.
//!
//! ## Sources of stamps
//!
//! - **Remote**: the `ETag` and `Last-Modified` response validators,
//!   serialized deterministically. When a server sends neither, the stamp is
//!   synthesized from the fetch time, so such resources are treated as
//!   changed on every re-fetch.
//! - **Local**: SHA-256 of the file contents. Content-based rather than
//!   mtime-based, so it survives tools that rewrite identical bytes and
//!   checkouts that reset modification times.
//! - **Embedded**: the timestamp the host document recorded for the element.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Disambiguates synthesized stamps minted within the same clock tick.
static FETCH_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryStamp(String);

impl EntryStamp {
    /// Stamp from HTTP validators; synthesized when both are absent.
    pub fn from_validators(etag: Option<&str>, last_modified: Option<&str>) -> Self {
        if etag.is_none() && last_modified.is_none() {
            return Self::fetched_now();
        }
        // json! objects keep keys sorted, so the serialization is stable.
        let value = serde_json::json!({
            "etag": etag,
            "last_modified": last_modified,
        });
        Self(value.to_string())
    }

    /// A stamp that equals no other stamp ever minted.
    pub fn fetched_now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = FETCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("fetched:{nanos}:{seq}"))
    }

    /// Content fingerprint used for local files.
    pub fn from_content(bytes: &[u8]) -> Self {
        Self(format!("sha256:{:x}", Sha256::digest(bytes)))
    }

    /// Stamp of an embedded element.
    pub fn from_timestamp(timestamp: u64) -> Self {
        Self(format!("ts:{timestamp}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryStamp {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
