//! Markdown analysis: headings and outgoing links.
//!
//! A markdown document is parsed once when it is fetched. The parse yields
//! the heading list (for the page outline) and three link lists that drive
//! discovery in the scan engine:
//!
//! | List | Contents |
//! |------|----------|
//! | `images` | `![alt](src)` targets |
//! | `markdown_links` | `[text](href)` targets matching the markdown filename pattern |
//! | `links` | every other in-wiki `[text](href)` target |
//!
//! Targets are kept as written (minus surrounding whitespace). Links that
//! cannot name a wiki document, such as absolute URLs, `mailto:` and
//! fragment-only anchors, are left out of all three lists.

use crate::paths;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classifies paths as markdown documents by filename.
///
/// Matching is case-insensitive, so `README.MD` counts as markdown under the
/// default `\.(md|mkd|markdown)$` pattern.
#[derive(Debug, Clone)]
pub struct MarkdownPattern {
    regex: Regex,
}

impl MarkdownPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { regex })
    }

    pub fn is_markdown(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// One heading of a document, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    /// Anchor id, unique within the document.
    pub id: String,
}

/// Everything the wiki needs from a markdown document besides its text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: Option<String>,
    pub headings: Vec<Heading>,
    pub images: Vec<String>,
    pub links: Vec<String>,
    pub markdown_links: Vec<String>,
}

pub(crate) fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
}

pub fn extract(text: &str, pattern: &MarkdownPattern) -> Extracted {
    let mut out = Extracted::default();
    let mut slugger = Slugger::default();
    let mut heading: Option<(HeadingLevel, String)> = None;

    for event in Parser::new_ext(text, parser_options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => heading = Some((level, String::new())),
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, raw)) = heading.take() {
                    let text = raw.trim().to_string();
                    if out.title.is_none() && !text.is_empty() {
                        out.title = Some(text.clone());
                    }
                    out.headings.push(Heading {
                        level: heading_level(level),
                        id: slugger.slug(&text),
                        text,
                    });
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, raw)) = heading.as_mut() {
                    raw.push_str(&t);
                }
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                if let Some(target) = wiki_target(&dest_url) {
                    push_unique(&mut out.images, target);
                }
            }
            Event::Start(Tag::Link { dest_url, .. }) => {
                if let Some(target) = wiki_target(&dest_url) {
                    let without_fragment = target.split('#').next().unwrap_or_default();
                    if pattern.is_markdown(without_fragment) {
                        push_unique(&mut out.markdown_links, target);
                    } else {
                        push_unique(&mut out.links, target);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

pub(crate) fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn wiki_target(dest: &str) -> Option<String> {
    let dest = dest.trim();
    if dest.is_empty() || dest.starts_with('#') || paths::is_url(dest) {
        None
    } else {
        Some(dest.to_string())
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// GitHub-style heading anchors: `Getting Started!` → `getting-started`,
/// repeated headings get `-1`, `-2` suffixes.
#[derive(Debug, Default)]
pub(crate) struct Slugger {
    seen: HashMap<String, usize>,
}

impl Slugger {
    pub(crate) fn slug(&mut self, text: &str) -> String {
        let base: String = text
            .trim()
            .to_lowercase()
            .chars()
            .filter_map(|c| match c {
                c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
                c if c.is_whitespace() => Some('-'),
                _ => None,
            })
            .collect();

        match self.seen.get_mut(&base) {
            Some(count) => {
                *count += 1;
                format!("{base}-{count}")
            }
            None => {
                self.seen.insert(base.clone(), 0);
                base
            }
        }
    }
}
