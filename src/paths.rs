//! Canonical wiki paths.
//!
//! Every document in the wiki is addressed by a slash-separated path relative
//! to the source root, e.g. `guide/setup.md`. Links inside markdown documents
//! are written in many spellings (`./setup.md`, `guide//setup.md`,
//! `../guide/Setup.md`) and all of them must collapse onto one key before they
//! reach the tree or the scan engine.
//!
//! Two forms exist:
//!
//! - **Spelling**: the normalized path with its original letter case. This is
//!   what gets handed to a blob source, because case-sensitive filesystems and
//!   servers need the real name.
//! - **Key**: the spelling folded by the configured case policy. This is what
//!   the tree and the scan engine index by.
//!
//! ```text
//! "./Guide//Setup.MD#install"  →  spelling "Guide/Setup.MD"  →  key "guide/setup.md"
//! ```
//!
//! The empty string is the home page path.

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Malformed link: {0}")]
    MalformedLink(String),
}

/// Normalize a raw path into its spelling form.
///
/// Strips query and fragment, turns backslashes into slashes, drops empty and
/// `.` segments and resolves `..` against preceding segments. A `..` that
/// would climb above the root is a [`PathError::MalformedLink`].
pub fn normalize(raw: &str) -> Result<String, PathError> {
    let without_fragment = raw.split(['#', '?']).next().unwrap_or_default();
    let cleaned = without_fragment.replace('\\', "/");

    let mut segments: Vec<&str> = Vec::new();
    for segment in cleaned.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::MalformedLink(raw.to_string()));
                }
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Fold a spelling into a tree key according to the case policy.
pub fn fold(spelling: &str, lowercase: bool) -> String {
    if lowercase {
        spelling.to_lowercase()
    } else {
        spelling.to_string()
    }
}

/// Directory part of a path: `a/b/c.md` → `a/b`, `c.md` → ``.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Whether a link carries a URL scheme (`https:`, `mailto:`, `data:` ...).
///
/// Scheme-bearing links never name a document inside the wiki tree.
pub fn is_url(link: &str) -> bool {
    let Some(colon) = link.find(':') else {
        return false;
    };
    let scheme = &link[..colon];
    // A single letter is a Windows drive, not a scheme.
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Resolve a link found in the document at `base_spelling` to a spelling.
///
/// Returns `Ok(None)` for links that do not address a wiki document: URLs,
/// fragment-only anchors and empty hrefs. Absolute links (`/x.md`) resolve
/// against the source root, everything else against the document's directory.
pub fn resolve_link(base_spelling: &str, link: &str) -> Result<Option<String>, PathError> {
    let link = link.trim();
    if link.is_empty() || link.starts_with('#') || link.starts_with('?') || is_url(link) {
        return Ok(None);
    }
    let joined = if let Some(rooted) = link.strip_prefix('/') {
        rooted.to_string()
    } else {
        let dir = parent_dir(base_spelling);
        if dir.is_empty() {
            link.to_string()
        } else {
            format!("{dir}/{link}")
        }
    };
    let spelling = normalize(&joined)?;
    if spelling.is_empty() {
        return Err(PathError::MalformedLink(link.to_string()));
    }
    Ok(Some(spelling))
}

/// Build the URL of a wiki path under a root URL.
///
/// Follows browser semantics: a root of `https://h/wiki/` joins to
/// `https://h/wiki/<path>`, a root of `https://h/wiki/index.html` joins next
/// to `index.html`.
pub fn url_for(root: &Url, spelling: &str) -> Result<Url, PathError> {
    root.join(spelling)
        .map_err(|e| PathError::MalformedLink(format!("{spelling}: {e}")))
}

/// Strip the fragment from a root URL so it can be used as a join base.
pub fn root_url(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_fragment(None);
    root
}
