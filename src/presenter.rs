//! The presentation boundary.
//!
//! The coordinator never touches a UI directly; it calls a [`Presenter`].
//! The CLI prints notifications to the terminal, tests record them with
//! [`RecordingPresenter`].

use crate::markdown::Heading;
use crate::render::RenderedPage;
use crate::types::MenuItem;
use std::sync::{Arc, Mutex, PoisonError};

pub trait Presenter: Send {
    /// The active page was (re-)rendered.
    fn update_html(&mut self, path: &str, page: &RenderedPage);

    fn update_heading_list(&mut self, path: &str, headings: &[Heading]);

    fn update_menu(&mut self, menu: &MenuItem);

    fn apply_stylesheet(&mut self, key: &str, css: &str);

    /// Refresh sequence number, bumped on every page render.
    fn update_seq(&mut self, seq: u64);
}

/// One presenter call, as recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Html { path: String, page: RenderedPage },
    Headings { path: String, headings: Vec<Heading> },
    Menu(MenuItem),
    Stylesheet { key: String, css: String },
    Seq(u64),
}

/// Presenter that keeps every notification in a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    log: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, notification: Notification) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Return and forget everything recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Paths of every `update_html` call, in order.
    pub fn rendered_paths(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Html { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn update_html(&mut self, path: &str, page: &RenderedPage) {
        self.push(Notification::Html {
            path: path.to_string(),
            page: page.clone(),
        });
    }

    fn update_heading_list(&mut self, path: &str, headings: &[Heading]) {
        self.push(Notification::Headings {
            path: path.to_string(),
            headings: headings.to_vec(),
        });
    }

    fn update_menu(&mut self, menu: &MenuItem) {
        self.push(Notification::Menu(menu.clone()));
    }

    fn apply_stylesheet(&mut self, key: &str, css: &str) {
        self.push(Notification::Stylesheet {
            key: key.to_string(),
            css: css.to_string(),
        });
    }

    fn update_seq(&mut self, seq: u64) {
        self.push(Notification::Seq(seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_log() {
        let recorder = RecordingPresenter::new();
        let mut handle = recorder.clone();
        handle.update_seq(3);
        handle.apply_stylesheet("a.css", "p {}");
        assert_eq!(recorder.notifications().len(), 2);
        assert_eq!(recorder.take()[0], Notification::Seq(3));
        assert!(recorder.notifications().is_empty());
    }
}
