//! Stylesheet dependencies of the active page.
//!
//! A page declares stylesheets through the configured `css_rules`. When the
//! active page changes, [`diff_dependencies`] compares the declared list with
//! what is already applied. Stylesheets never applied are read outright.
//! Applied ones carry their stamp along and are only probed; the body is read
//! again only when the source reports a different stamp. Stylesheets no
//! longer declared stay applied; nothing is ever unloaded.

use crate::config::CssRuleConfig;
use crate::paths;
use crate::source::{BlobOpener, Locator, SourceRoot};
use crate::stamp::EntryStamp;
use crate::tree::CssDoc;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

#[derive(Debug, Clone)]
struct CssRule {
    pattern: Regex,
    stylesheets: Vec<String>,
}

/// Compiled `css_rules`.
#[derive(Debug, Clone, Default)]
pub struct CssRules {
    rules: Vec<CssRule>,
}

impl CssRules {
    pub fn from_config(rules: &[CssRuleConfig]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok(CssRule {
                    pattern: Regex::new(&rule.pattern)?,
                    stylesheets: rule.stylesheets.clone(),
                })
            })
            .collect::<Result<_, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// Stylesheets of every rule matching `page`, first occurrence wins.
    pub fn declared_for(&self, page: &str) -> Vec<String> {
        let mut declared: Vec<String> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.pattern.is_match(page)) {
            for sheet in &rule.stylesheets {
                if !declared.contains(sheet) {
                    declared.push(sheet.clone());
                }
            }
        }
        declared
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStyle {
    pub stamp: EntryStamp,
    pub css: String,
}

/// Stylesheets pushed to the presenter so far, plus fetches in flight.
#[derive(Debug, Clone, Default)]
pub struct AppliedStyles {
    applied: BTreeMap<String, AppliedStyle>,
    pending: BTreeSet<String>,
}

impl AppliedStyles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AppliedStyle> {
        self.applied.get(key)
    }

    pub fn stamp(&self, key: &str) -> Option<&EntryStamp> {
        self.applied.get(key).map(|s| &s.stamp)
    }

    /// Record a stylesheet; returns `false` when the same revision was
    /// already applied.
    pub fn apply(&mut self, key: &str, doc: &CssDoc) -> bool {
        self.pending.remove(key);
        if self.stamp(key) == Some(&doc.stamp) {
            return false;
        }
        self.applied.insert(
            key.to_string(),
            AppliedStyle {
                stamp: doc.stamp.clone(),
                css: doc.css.clone(),
            },
        );
        true
    }

    pub fn mark_pending(&mut self, key: &str) {
        self.pending.insert(key.to_string());
    }

    pub fn finish_pending(&mut self, key: &str) {
        self.pending.remove(key);
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.applied.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.applied.clear();
        self.pending.clear();
    }
}

/// A declared stylesheet to fetch, or to re-validate when `prior` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleFetch {
    pub key: String,
    pub locator: Locator,
    /// Stamp of the applied revision.
    pub prior: Option<EntryStamp>,
}

/// Which declared stylesheets need a fetch or a stamp check.
///
/// Absolute URLs are keyed and fetched by URL. Other entries resolve against
/// the page's directory and are fetched from the active source root; without
/// a root they cannot be located and are skipped. Fetches already in flight
/// are skipped too.
pub fn diff_dependencies(
    page_spelling: &str,
    declared: &[String],
    applied: &AppliedStyles,
    root: Option<&SourceRoot>,
    lowercase: bool,
) -> Vec<StyleFetch> {
    let mut fetches: Vec<StyleFetch> = Vec::new();
    for dep in declared {
        let Some(mut fetch) = locate_dependency(page_spelling, dep, root, lowercase) else {
            continue;
        };
        if applied.is_pending(&fetch.key) || fetches.iter().any(|f| f.key == fetch.key) {
            continue;
        }
        fetch.prior = applied.stamp(&fetch.key).cloned();
        fetches.push(fetch);
    }
    fetches
}

fn locate_dependency(
    page_spelling: &str,
    dep: &str,
    root: Option<&SourceRoot>,
    lowercase: bool,
) -> Option<StyleFetch> {
    if paths::is_url(dep) {
        return match Url::parse(dep) {
            Ok(url) => Some(StyleFetch {
                key: url.to_string(),
                locator: Locator::Url(url),
                prior: None,
            }),
            Err(e) => {
                tracing::warn!(stylesheet = dep, error = %e, "unparseable stylesheet URL");
                None
            }
        };
    }
    let spelling = match paths::resolve_link(page_spelling, dep) {
        Ok(Some(spelling)) => spelling,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(stylesheet = dep, error = %e, "dropping stylesheet");
            return None;
        }
    };
    let Some(root) = root else {
        tracing::debug!(stylesheet = dep, "no source root for relative stylesheet");
        return None;
    };
    match root.locate(&spelling) {
        Ok(locator) => Some(StyleFetch {
            key: paths::fold(&spelling, lowercase),
            locator,
            prior: None,
        }),
        Err(e) => {
            tracing::warn!(stylesheet = dep, error = %e, "dropping stylesheet");
            None
        }
    }
}

/// Resolve one [`StyleFetch`]: `None` when the applied revision is still
/// current or the stylesheet cannot be read.
pub async fn refresh_stylesheet(opener: &dyn BlobOpener, fetch: &StyleFetch) -> Option<CssDoc> {
    if let Some(prior) = &fetch.prior {
        match opener.open(&fetch.locator).probe().await {
            Ok(meta) if &meta.stamp == prior => return None,
            Ok(_) => tracing::debug!(stylesheet = %fetch.key, "stylesheet changed at source"),
            Err(e) => {
                tracing::debug!(stylesheet = %fetch.locator, error = %e, "stylesheet probe failed");
                return None;
            }
        }
    }
    fetch_stylesheet(opener, &fetch.locator).await
}

/// Fetch one stylesheet; `None` when it cannot be read.
async fn fetch_stylesheet(opener: &dyn BlobOpener, locator: &Locator) -> Option<CssDoc> {
    match opener.open(locator).read_text().await {
        Ok(blob) => Some(CssDoc {
            css: blob.text,
            stamp: blob.meta.stamp,
            origin: locator.clone(),
        }),
        Err(e) => {
            tracing::debug!(stylesheet = %locator, error = %e, "stylesheet fetch failed");
            None
        }
    }
}
