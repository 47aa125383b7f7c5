//! CLI output formatting for the sync engine.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. Every document leads
//! with its semantic identity (positional index and title) and its wiki path
//! follows after `→`. Counts and unresolved paths are shown as indented
//! context lines under a one-line summary.
//!
//! # Output Format
//!
//! ## Menu
//!
//! ```text
//! Menu
//! 001 Cycle A → a.md
//! 002 guide/
//!     001 Setup → guide/setup.md
//! 003 Home → index.md
//! ```
//!
//! ## Scan summary
//!
//! ```text
//! Scanned /srv/wiki: 5 fetched, 1 failed, 2 links dropped, 0 deleted
//!     Failed: missing.md
//! ```
//!
//! ## Page
//!
//! ```text
//! Page: Home → index.md
//!     Welcome to the wiki. See the setup guide for...
//!     Headings
//!         Home (#home)
//!             Install (#install)
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects. [`TerminalPresenter`] routes
//! coordinator notifications through [`format_notification`].

use crate::markdown::Heading;
use crate::presenter::{Notification, Presenter};
use crate::render::RenderedPage;
use crate::types::{MenuItem, ScanStats};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Strip HTML tags from a string (simple angle-bracket stripping).
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

/// Collapse whitespace and truncate to `max` characters, appending `...`.
fn preview(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(max).collect();
        format!("{}...", cut)
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Menu
// ============================================================================

/// A flattened node from walking the menu tree.
struct MenuNode<'a> {
    depth: usize,
    position: usize,
    item: &'a MenuItem,
}

fn walk_menu<'a>(items: &'a [MenuItem], depth: usize, nodes: &mut Vec<MenuNode<'a>>) {
    for (i, item) in items.iter().enumerate() {
        nodes.push(MenuNode {
            depth,
            position: i + 1,
            item,
        });
        if item.is_folder {
            walk_menu(&item.children, depth + 1, nodes);
        }
    }
}

/// Format the navigation menu, one line per folder or markdown document.
pub fn format_menu(menu: &MenuItem) -> Vec<String> {
    let mut nodes = Vec::new();
    walk_menu(&menu.children, 0, &mut nodes);

    let mut lines = vec!["Menu".to_string()];
    if nodes.is_empty() {
        lines.push("    (empty)".to_string());
    }
    for node in nodes {
        let prefix = format!("{}{}", indent(node.depth), format_index(node.position));
        if node.item.is_folder {
            lines.push(format!("{} {}/", prefix, node.item.title));
        } else {
            lines.push(format!(
                "{} {} \u{2192} {}",
                prefix, node.item.title, node.item.path
            ));
        }
    }
    lines
}

pub fn print_menu(menu: &MenuItem) {
    print_lines(format_menu(menu));
}

// ============================================================================
// Scan summary
// ============================================================================

/// One-line scan summary plus the keys that could not be fetched.
pub fn format_scan_summary(source: &str, stats: &ScanStats) -> Vec<String> {
    let mut lines = vec![format!(
        "Scanned {}: {} fetched, {} failed, {} links dropped, {} deleted",
        source,
        stats.fetched,
        stats.failed.len(),
        stats.dropped_links,
        stats.deleted
    )];
    for path in &stats.failed {
        lines.push(format!("    Failed: {}", path));
    }
    lines
}

pub fn print_scan_summary(source: &str, stats: &ScanStats) {
    print_lines(format_scan_summary(source, stats));
}

/// Link report for `check`: every discovered path that never resolved.
pub fn format_link_report(source: &str, stats: &ScanStats) -> Vec<String> {
    if stats.failed.is_empty() {
        return vec![format!("No unresolved links in {}", source)];
    }
    let mut lines = vec![format!(
        "Unresolved links in {} ({})",
        source,
        stats.failed.len()
    )];
    for (i, path) in stats.failed.iter().enumerate() {
        lines.push(format!("    {} {}", format_index(i + 1), path));
    }
    if stats.dropped_links > 0 {
        lines.push(format!(
            "    {} malformed links dropped",
            stats.dropped_links
        ));
    }
    lines
}

pub fn print_link_report(source: &str, stats: &ScanStats) {
    print_lines(format_link_report(source, stats));
}

// ============================================================================
// Pages
// ============================================================================

/// Page header and a plain-text preview of the rendered body.
pub fn format_page(path: &str, page: &RenderedPage) -> Vec<String> {
    let mut lines = vec![format!("Page: {} \u{2192} {}", page.title, path)];
    let text = preview(&strip_html_tags(&page.html), 72);
    if !text.is_empty() {
        lines.push(format!("    {}", text));
    }
    lines
}

/// Heading outline, indented by heading level.
pub fn format_headings(headings: &[Heading]) -> Vec<String> {
    if headings.is_empty() {
        return Vec::new();
    }
    let top = headings.iter().map(|h| h.level).min().unwrap_or(1);
    let mut lines = vec!["    Headings".to_string()];
    for heading in headings {
        let depth = 2 + usize::from(heading.level - top);
        lines.push(format!("{}{} (#{})", indent(depth), heading.text, heading.id));
    }
    lines
}

/// Display lines for one presenter notification.
pub fn format_notification(notification: &Notification) -> Vec<String> {
    match notification {
        Notification::Html { path, page } => format_page(path, page),
        Notification::Headings { headings, .. } => format_headings(headings),
        Notification::Menu(menu) => format_menu(menu),
        Notification::Stylesheet { key, css } => {
            vec![format!("Stylesheet: {} ({} bytes)", key, css.len())]
        }
        Notification::Seq(seq) => vec![format!("Refresh #{}", seq)],
    }
}

/// Presenter that prints every notification to stdout.
#[derive(Debug, Default)]
pub struct TerminalPresenter {
    /// Print the full rendered HTML instead of a preview.
    pub show_html: bool,
}

impl TerminalPresenter {
    pub fn new(show_html: bool) -> Self {
        Self { show_html }
    }

    fn emit(&self, notification: Notification) {
        if self.show_html
            && let Notification::Html { path, page } = &notification
        {
            println!("Page: {} \u{2192} {}", page.title, path);
            println!("{}", page.html);
            return;
        }
        print_lines(format_notification(&notification));
    }
}

impl Presenter for TerminalPresenter {
    fn update_html(&mut self, path: &str, page: &RenderedPage) {
        self.emit(Notification::Html {
            path: path.to_string(),
            page: page.clone(),
        });
    }

    fn update_heading_list(&mut self, path: &str, headings: &[Heading]) {
        self.emit(Notification::Headings {
            path: path.to_string(),
            headings: headings.to_vec(),
        });
    }

    fn update_menu(&mut self, menu: &MenuItem) {
        self.emit(Notification::Menu(menu.clone()));
    }

    fn apply_stylesheet(&mut self, key: &str, css: &str) {
        self.emit(Notification::Stylesheet {
            key: key.to_string(),
            css: css.to_string(),
        });
    }

    fn update_seq(&mut self, seq: u64) {
        tracing::debug!(seq, "refresh");
    }
}
