//! Markdown to HTML for the active page.
//!
//! Rendering is a thin pass over pulldown-cmark's event stream:
//! heading ids come from the document's extracted heading list, links to
//! other markdown documents become in-wiki routes (`#<path key>`), and image
//! sources pointing at data documents are swapped for their data reference.
//! The result is wrapped in a `<div>` with the configured class using maud.

use crate::markdown::{self, MarkdownPattern};
use crate::paths;
use crate::tree::{MarkdownDoc, TreeEntry, TreeStore};
use maud::{PreEscaped, html};
use pulldown_cmark::{CowStr, Event, Parser, Tag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub title: String,
    pub html: String,
}

/// What rendering needs besides the document.
pub struct RenderContext<'a> {
    pub tree: &'a TreeStore,
    pub pattern: &'a MarkdownPattern,
    pub body_class: &'a str,
    pub lowercase: bool,
}

pub fn render_page(spelling: &str, doc: &MarkdownDoc, ctx: &RenderContext<'_>) -> RenderedPage {
    let mut heading_index = 0usize;
    let events = Parser::new_ext(&doc.text, markdown::parser_options()).map(|event| match event {
        Event::Start(Tag::Heading {
            level,
            id,
            classes,
            attrs,
        }) => {
            let id = doc
                .headings
                .get(heading_index)
                .map(|h| CowStr::from(h.id.clone()))
                .or(id);
            heading_index += 1;
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            })
        }
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => {
            let dest_url = wiki_route(spelling, &dest_url, ctx).map_or(dest_url, CowStr::from);
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            })
        }
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => {
            let dest_url = data_source(spelling, &dest_url, ctx).map_or(dest_url, CowStr::from);
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            })
        }
        other => other,
    });

    let mut body = String::with_capacity(doc.text.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut body, events);

    RenderedPage {
        title: doc.title.clone().unwrap_or_else(|| spelling.to_string()),
        html: wrap(ctx.body_class, PreEscaped(body)),
    }
}

/// Placeholder for a page that is not in the tree.
pub fn not_found(spelling: &str, body_class: &str) -> RenderedPage {
    let inner = html! { p { (spelling) " not found" } };
    RenderedPage {
        title: spelling.to_string(),
        html: wrap(body_class, inner),
    }
}

fn wrap(body_class: &str, inner: PreEscaped<String>) -> String {
    html! {
        div class=(body_class) { (inner) }
    }
    .into_string()
}

/// `#<key>` for links to markdown documents inside the wiki.
fn wiki_route(spelling: &str, dest: &str, ctx: &RenderContext<'_>) -> Option<String> {
    let target = dest.split('#').next().unwrap_or_default();
    if !ctx.pattern.is_markdown(target) {
        return None;
    }
    let resolved = paths::resolve_link(spelling, dest).ok()??;
    Some(format!("#{}", paths::fold(&resolved, ctx.lowercase)))
}

/// Data reference of the data document an image points at, if loaded.
fn data_source(spelling: &str, dest: &str, ctx: &RenderContext<'_>) -> Option<String> {
    let resolved = paths::resolve_link(spelling, dest).ok()??;
    match ctx.tree.get(&paths::fold(&resolved, ctx.lowercase))? {
        TreeEntry::Data(doc) => doc.data_ref.as_ref().map(|r| r.to_string()),
        _ => None,
    }
}
