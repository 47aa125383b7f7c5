//! Wiki configuration.
//!
//! Handles loading, validating and merging `markwiki.toml`. Stock defaults are
//! serialized to a TOML table and the user file is merged over them key by
//! key, so a config file only needs the values it wants to change.
//!
//! ## Config File Location
//!
//! `markwiki.toml` in the wiki's source directory, or any file passed with
//! `--config`. URL sources have no directory, so they use stock defaults
//! unless `--config` is given.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! top_page = "index.md"                      # Scan root for URL sources, default page
//! markdown_file_regex = "\\.(md|mkd|markdown)$"  # Case-insensitive
//! lowercase_paths = true                     # Fold path keys to lowercase
//! markdown_body_class = "markdown-body"      # Class of the rendered page wrapper
//!
//! [poll]
//! min_interval_ms = 1000    # Interval right after a change
//! max_interval_ms = 10000   # Upper bound under quiescence
//! step_ms = 10              # Added per unchanged check
//!
//! [scan]
//! max_concurrent_fetches = 8
//! rescan_after_scan = false # Start a new scan whenever one completes
//! request_timeout_ms = 10000
//!
//! [[css_rules]]
//! pattern = "^guide/"       # Regex over the active page path
//! stylesheets = ["guide.css", "https://cdn.example/base.css"]
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::markdown::MarkdownPattern;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in a source directory.
pub const CONFIG_FILE_NAME: &str = "markwiki.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

/// Wiki configuration loaded from `markwiki.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WikiConfig {
    /// Page a URL scan starts from; also shown when no page is chosen.
    pub top_page: String,
    /// Filename pattern classifying paths as markdown documents.
    pub markdown_file_regex: String,
    /// Case policy for path keys.
    pub lowercase_paths: bool,
    /// Class of the `<div>` wrapping rendered pages.
    pub markdown_body_class: String,
    pub poll: PollConfig,
    pub scan: ScanConfig,
    /// Stylesheets declared per page pattern.
    pub css_rules: Vec<CssRuleConfig>,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            top_page: "index.md".to_string(),
            markdown_file_regex: r"\.(md|mkd|markdown)$".to_string(),
            lowercase_paths: true,
            markdown_body_class: "markdown-body".to_string(),
            poll: PollConfig::default(),
            scan: ScanConfig::default(),
            css_rules: Vec::new(),
        }
    }
}

impl WikiConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match paths::normalize(&self.top_page) {
            Ok(p) if !p.is_empty() => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "top_page must name a document, got {:?}",
                    self.top_page
                )));
            }
        }
        MarkdownPattern::new(&self.markdown_file_regex)?;
        if self.poll.min_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll.min_interval_ms must be non-zero".into(),
            ));
        }
        if self.poll.min_interval_ms > self.poll.max_interval_ms {
            return Err(ConfigError::Validation(
                "poll.min_interval_ms must not exceed poll.max_interval_ms".into(),
            ));
        }
        if self.poll.step_ms == 0 {
            return Err(ConfigError::Validation("poll.step_ms must be non-zero".into()));
        }
        if self.scan.max_concurrent_fetches == 0 {
            return Err(ConfigError::Validation(
                "scan.max_concurrent_fetches must be non-zero".into(),
            ));
        }
        if self.scan.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "scan.request_timeout_ms must be non-zero".into(),
            ));
        }
        for rule in &self.css_rules {
            regex::Regex::new(&rule.pattern)?;
        }
        Ok(())
    }

    pub fn markdown_pattern(&self) -> Result<MarkdownPattern, ConfigError> {
        Ok(MarkdownPattern::new(&self.markdown_file_regex)?)
    }
}

/// Freshness poller bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Added to the interval after every check that finds nothing new.
    pub step_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            max_interval_ms: 10000,
            step_ms: 10,
        }
    }
}

/// Scan engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Fetches in flight at once within one scan pass.
    pub max_concurrent_fetches: usize,
    /// Start another scan each time one completes.
    pub rescan_after_scan: bool,
    /// Per-request timeout for remote sources.
    pub request_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            rescan_after_scan: false,
            request_timeout_ms: 10000,
        }
    }
}

/// Stylesheets declared for every active page whose path matches `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CssRuleConfig {
    pub pattern: String,
    pub stylesheets: Vec<String>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(WikiConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<WikiConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: WikiConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `markwiki.toml` from a source directory, falling back to defaults.
pub fn load_config(dir: &Path) -> Result<WikiConfig, ConfigError> {
    load_config_file(&dir.join(CONFIG_FILE_NAME))
}

/// Load an explicit config file; a missing file means stock defaults.
pub fn load_config_file(path: &Path) -> Result<WikiConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `markwiki.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# markwiki configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file as markwiki.toml in the wiki directory, or pass it with
# --config. Unknown keys will cause an error.

# Page a URL scan starts from, and the page shown when none is chosen.
top_page = "index.md"

# Filenames matching this regex (case-insensitive) are markdown documents.
# Everything else a page links to is fetched as data.
markdown_file_regex = "\\.(md|mkd|markdown)$"

# Fold paths to lowercase so README.MD and readme.md are the same page.
lowercase_paths = true

# Class of the <div> that wraps every rendered page.
markdown_body_class = "markdown-body"

# ---------------------------------------------------------------------------
# Freshness polling of the active page
# ---------------------------------------------------------------------------
[poll]
# Interval right after a change was seen.
min_interval_ms = 1000

# Interval never grows beyond this.
max_interval_ms = 10000

# Added to the interval after every check that finds nothing new.
step_ms = 10

# ---------------------------------------------------------------------------
# Scanning
# ---------------------------------------------------------------------------
[scan]
# Documents fetched at once within one scan pass.
max_concurrent_fetches = 8

# Start another scan whenever one completes.
rescan_after_scan = false

# Timeout for each remote request.
request_timeout_ms = 10000

# ---------------------------------------------------------------------------
# Stylesheets
# ---------------------------------------------------------------------------
# Each rule applies to active pages whose path matches `pattern`. A page gets
# the stylesheets of every matching rule, in rule order, without duplicates.
# Relative stylesheet paths resolve against the page's directory.
#
# [[css_rules]]
# pattern = ".*"
# stylesheets = ["wiki.css"]
"##
}
