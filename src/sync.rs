//! The sync coordinator: single owner of the live wiki.
//!
//! ```text
//!   request_scan_*  ──► run_scan (task) ──┐
//!   kick_poller     ──► check / timer ────┤  SyncEvent queue  ──► handle_event ──► TreeStore
//!   set_active_page ──► stylesheet fetch ─┘   (one consumer)                   └──► Presenter
//! ```
//!
//! Background work never touches the tree. Scans, freshness checks,
//! stylesheet fetches and poll timers run as tokio tasks and report back
//! through one unbounded queue; [`Coordinator::handle_event`] applies each
//! event in order, so every tree mutation happens on a single writer.
//!
//! ## Merge rules
//!
//! Every resolved entry goes through [`TreeStore::upsert`] with
//! [`is_same_entry`] (kind and stamp). An equivalent entry stops there with
//! no UI work. Otherwise:
//!
//! - a new path, or any changed markdown document, republishes the menu
//! - with no active page yet, the first markdown document becomes the page
//! - the active page itself is re-rendered along with its heading list
//! - a data document the active page links to re-renders the page
//!
//! ## Scan lifecycle
//!
//! Each scan request gets a fresh [`ScanId`] and cancels the scan in flight.
//! Events carrying an older id are dropped. When the current scan completes,
//! the freshness poller is kicked, and if `scan.rescan_after_scan` is set a
//! follow-up scan is dispatched after one poll interval.
//!
//! ## Freshness poller
//!
//! One perpetual loop: a check of the active page, then a timer, then a
//! check again. [`Coordinator::kick_poller`] starts the loop once; later
//! kicks are no-ops.

use crate::config::{ConfigError, WikiConfig};
use crate::markdown::{Heading, MarkdownPattern};
use crate::paths;
use crate::poll::{self, FreshnessCheck, PollSchedule};
use crate::presenter::Presenter;
use crate::render::{self, RenderContext, RenderedPage};
use crate::scan::{self, ContentKind, ScanRequest, ScanTree};
use crate::source::{BlobOpener, Locator, SourceRoot};
use crate::stamp::EntryStamp;
use crate::styles::{self, AppliedStyles, CssRules};
use crate::tree::{
    self, CssDoc, DataDoc, DataRef, EntryKind, MarkdownDoc, TreeEntry, TreeStore,
};
use crate::types::{ScanId, ScanStats, SyncEvent};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    None,
    Directory,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActivePage {
    key: String,
    /// As requested, before case folding; used to locate relative resources.
    spelling: String,
}

/// Live state tying a source to the in-memory tree.
#[derive(Debug)]
struct SyncSession {
    mode: SourceMode,
    root: Option<SourceRoot>,
    tree: TreeStore,
    active_page: Option<ActivePage>,
    schedule: PollSchedule,
}

pub struct Coordinator<P: Presenter> {
    config: WikiConfig,
    pattern: MarkdownPattern,
    css_rules: CssRules,
    session: SyncSession,
    styles: AppliedStyles,
    opener: Arc<dyn BlobOpener>,
    presenter: P,
    events: UnboundedSender<SyncEvent>,
    scan_cancel: Option<CancellationToken>,
    current_scan: Option<ScanId>,
    next_scan_id: ScanId,
    last_scan: Option<ScanStats>,
    poll_armed: bool,
    seq: u64,
    next_data_ref: u64,
}

impl<P: Presenter> Coordinator<P> {
    /// Build a coordinator and the receiving end of its event queue.
    pub fn new(
        config: WikiConfig,
        opener: Arc<dyn BlobOpener>,
        presenter: P,
    ) -> Result<(Self, UnboundedReceiver<SyncEvent>), SyncError> {
        config.validate()?;
        let pattern = config.markdown_pattern()?;
        let css_rules = CssRules::from_config(&config.css_rules).map_err(ConfigError::from)?;
        let (events, rx) = mpsc::unbounded_channel();
        let session = SyncSession {
            mode: SourceMode::None,
            root: None,
            tree: TreeStore::new(),
            active_page: None,
            schedule: PollSchedule::from_config(&config.poll),
        };
        let coordinator = Self {
            config,
            pattern,
            css_rules,
            session,
            styles: AppliedStyles::new(),
            opener,
            presenter,
            events,
            scan_cancel: None,
            current_scan: None,
            next_scan_id: 1,
            last_scan: None,
            poll_armed: false,
            seq: 0,
            next_data_ref: 0,
        };
        Ok((coordinator, rx))
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    pub fn tree(&self) -> &TreeStore {
        &self.session.tree
    }

    pub fn mode(&self) -> SourceMode {
        self.session.mode
    }

    pub fn active_page(&self) -> Option<&str> {
        self.session.active_page.as_ref().map(|p| p.key.as_str())
    }

    pub fn poll_interval(&self) -> Duration {
        self.session.schedule.current()
    }

    pub fn styles(&self) -> &AppliedStyles {
        &self.styles
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_scanning(&self) -> bool {
        self.current_scan.is_some()
    }

    /// Stats of the most recent completed scan.
    pub fn last_scan(&self) -> Option<&ScanStats> {
        self.last_scan.as_ref()
    }

    // =========================================================================
    // Requests
    // =========================================================================

    pub fn request_scan_directory(&mut self, dir: impl Into<PathBuf>) -> Result<ScanId, SyncError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(SyncError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            )));
        }
        let root = SourceRoot::Directory(dir);
        self.session.mode = SourceMode::Directory;
        self.session.root = Some(root.clone());
        Ok(self.dispatch_scan(root, None))
    }

    pub fn request_scan_url(&mut self, url: &str) -> Result<ScanId, SyncError> {
        let parsed = Url::parse(url).map_err(|source| SyncError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let root = SourceRoot::Url(paths::root_url(&parsed));
        self.session.mode = SourceMode::Url;
        self.session.root = Some(root.clone());
        Ok(self.dispatch_scan(root, None))
    }

    /// Read one markdown file and show it, without scanning anything.
    pub async fn open_single_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.cancel_scan();
        self.session.mode = SourceMode::None;
        self.session.root = None;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let locator = Locator::File(path);
        match self.opener.open(&locator).read_text().await {
            Ok(blob) => {
                let key = paths::fold(&name, self.config.lowercase_paths);
                let doc = MarkdownDoc::parse(blob.text, blob.meta.stamp, locator, &self.pattern);
                let is_new = !self.session.tree.contains(&key);
                let same = self
                    .session
                    .tree
                    .upsert(&key, TreeEntry::Markdown(doc), tree::is_same_entry);
                if is_new || !same {
                    self.publish_menu();
                }
            }
            Err(e) => tracing::warn!(file = %locator, error = %e, "cannot open file"),
        }
        self.set_active_page(&name);
    }

    /// Merge every file of the opener's embedded store into the tree.
    ///
    /// Entries keep [`Locator::Embedded`] origins, so the poller re-checks an
    /// embedded page against the same store.
    pub fn load_embedded(&mut self) {
        let Some(store) = self.opener.embedded() else {
            tracing::warn!("blob opener has no embedded store, nothing to load");
            return;
        };
        for file in store.files() {
            let spelling = match paths::normalize(&file.name) {
                Ok(s) if !s.is_empty() => s,
                _ => {
                    tracing::warn!(name = %file.name, "skipping embedded file with unusable name");
                    continue;
                }
            };
            let key = paths::fold(&spelling, self.config.lowercase_paths);
            let origin = Locator::Embedded(file.name.clone());
            let stamp = EntryStamp::from_timestamp(file.timestamp);
            let entry = match ContentKind::classify(&spelling, &self.pattern) {
                ContentKind::Markdown => TreeEntry::Markdown(MarkdownDoc::parse(
                    String::from_utf8_lossy(&file.bytes).into_owned(),
                    stamp,
                    origin,
                    &self.pattern,
                )),
                ContentKind::Css => TreeEntry::Css(CssDoc {
                    css: String::from_utf8_lossy(&file.bytes).into_owned(),
                    stamp,
                    origin,
                }),
                ContentKind::Data => TreeEntry::Data(DataDoc {
                    payload: Arc::clone(&file.bytes),
                    mime: file.mime.clone(),
                    stamp,
                    origin,
                    data_ref: None,
                }),
            };
            self.merge_entry(&key, &spelling, entry);
        }
    }

    /// Show a page. Always re-renders, even when nothing changed.
    ///
    /// The empty path means the configured top page.
    pub fn set_active_page(&mut self, raw: &str) {
        let spelling = match paths::normalize(raw) {
            Ok(s) if s.is_empty() => paths::normalize(&self.config.top_page).unwrap_or_default(),
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(page = raw, error = %e, "cannot open page");
                let page = render::not_found(raw, &self.config.markdown_body_class);
                self.present(raw, &page, &[]);
                return;
            }
        };
        let key = paths::fold(&spelling, self.config.lowercase_paths);
        tracing::debug!(page = %key, "active page set");
        self.session.active_page = Some(ActivePage { key, spelling });
        self.render_active();
        self.resolve_styles();
        self.kick_poller();
    }

    /// Forget the tree, the source and the applied stylesheets.
    pub fn reset(&mut self) {
        self.cancel_scan();
        self.session.tree.clear();
        self.styles.clear();
        self.session.mode = SourceMode::None;
        self.session.root = None;
        self.session.active_page = None;
        tracing::info!("session reset");
        self.publish_menu();
    }

    /// Start the freshness poll loop unless it is already running.
    pub fn kick_poller(&mut self) {
        if self.poll_armed {
            return;
        }
        self.poll_armed = true;
        self.start_check();
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::EntryResolved {
                scan,
                path,
                spelling,
                entry,
            } => {
                if self.is_stale(scan) {
                    tracing::debug!(scan, path = %path, "dropping entry from superseded scan");
                    return;
                }
                self.merge_entry(&path, &spelling, entry);
            }
            SyncEvent::EntryDeleted { scan, path } => {
                if self.is_stale(scan) {
                    return;
                }
                if self.session.tree.delete(&path).is_some() {
                    tracing::debug!(path = %path, "entry deleted");
                    self.publish_menu();
                    if self.active_page() == Some(path.as_str()) {
                        self.render_active();
                    }
                }
            }
            SyncEvent::ScanComplete {
                scan,
                source,
                stats,
            } => {
                if self.is_stale(scan) {
                    tracing::debug!(scan, "ignoring completion of superseded scan");
                    return;
                }
                tracing::info!(scan, source = %source, fetched = stats.fetched, "scan finished");
                self.current_scan = None;
                self.scan_cancel = None;
                self.last_scan = Some(stats);
                if self.config.scan.rescan_after_scan
                    && self.session.mode != SourceMode::None
                    && let Some(root) = self.session.root.clone()
                {
                    let delay = self.session.schedule.current();
                    self.dispatch_scan(root, Some(delay));
                }
                self.kick_poller();
            }
            SyncEvent::PageChecked { path, check } => {
                match check {
                    FreshnessCheck::Changed(entry) => {
                        tracing::debug!(page = %path, "page changed at source");
                        self.session.schedule.reset();
                        let spelling = match &self.session.active_page {
                            Some(active) if active.key == path => active.spelling.clone(),
                            _ => path.clone(),
                        };
                        self.merge_entry(&path, &spelling, entry);
                    }
                    FreshnessCheck::Unchanged | FreshnessCheck::Unavailable => {
                        self.session.schedule.back_off();
                    }
                }
                tracing::trace!(
                    interval_ms = self.session.schedule.current().as_millis() as u64,
                    "next poll"
                );
                self.arm_timer();
            }
            SyncEvent::StylesheetResolved { key, stylesheet } => match stylesheet {
                Some(doc) => {
                    if self.styles.apply(&key, &doc) {
                        self.presenter.apply_stylesheet(&key, &doc.css);
                    }
                }
                None => self.styles.finish_pending(&key),
            },
            SyncEvent::PollTick => self.start_check(),
        }
    }

    /// Handle events until the current scan completes.
    ///
    /// Returns the scan's stats, or `None` if the queue closed first. With
    /// `rescan_after_scan` enabled a new scan is always current, so this only
    /// returns once the queue closes.
    pub async fn pump_until_scanned(
        &mut self,
        rx: &mut UnboundedReceiver<SyncEvent>,
    ) -> Option<ScanStats> {
        while self.is_scanning() {
            let event = rx.recv().await?;
            self.handle_event(event);
        }
        self.last_scan.clone()
    }

    /// Handle events until `shutdown` fires or the queue closes.
    pub async fn run(
        mut self,
        mut rx: UnboundedReceiver<SyncEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
        self.cancel_scan();
        self
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn is_stale(&self, scan: ScanId) -> bool {
        self.current_scan != Some(scan)
    }

    fn cancel_scan(&mut self) {
        if let Some(token) = self.scan_cancel.take() {
            tracing::debug!(scan = ?self.current_scan, "cancelling scan in flight");
            token.cancel();
        }
        self.current_scan = None;
    }

    fn dispatch_scan(&mut self, root: SourceRoot, delay: Option<Duration>) -> ScanId {
        self.cancel_scan();
        let id = self.next_scan_id;
        self.next_scan_id += 1;

        let request = ScanRequest {
            id,
            root,
            prior: ScanTree::from_tree(&self.session.tree),
            pattern: self.pattern.clone(),
            top_page: self.config.top_page.clone(),
            lowercase: self.config.lowercase_paths,
            max_concurrent: self.config.scan.max_concurrent_fetches,
        };
        let token = CancellationToken::new();
        let opener = Arc::clone(&self.opener);
        let events = self.events.clone();
        let cancel = token.clone();
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            scan::run_scan(request, opener, events, cancel).await;
        });

        self.scan_cancel = Some(token);
        self.current_scan = Some(id);
        id
    }

    fn merge_entry(&mut self, key: &str, spelling: &str, mut entry: TreeEntry) {
        if let TreeEntry::Data(doc) = &mut entry
            && doc.data_ref.is_none()
        {
            self.next_data_ref += 1;
            doc.data_ref = Some(DataRef(format!("blob:markwiki/{}", self.next_data_ref)));
        }
        let kind = entry.kind();
        let is_new = !self.session.tree.contains(key);
        if self.session.tree.upsert(key, entry, tree::is_same_entry) {
            tracing::trace!(path = key, "entry unchanged");
            return;
        }
        tracing::debug!(path = key, new = is_new, "entry changed");

        if is_new || kind == EntryKind::Markdown {
            self.publish_menu();
        }
        let adopt = self.session.active_page.is_none() && kind == EntryKind::Markdown;
        let refresh = self.session.active_page.as_ref().is_some_and(|active| {
            active.key == key || (kind == EntryKind::Data && self.active_links_to(active, key))
        });
        if adopt {
            tracing::info!(page = key, "showing first resolved page");
            self.set_active_page(spelling);
        } else if refresh {
            self.render_active();
        }
    }

    fn active_links_to(&self, active: &ActivePage, key: &str) -> bool {
        let Some(TreeEntry::Markdown(doc)) = self.session.tree.get(&active.key) else {
            return false;
        };
        doc.images.iter().chain(&doc.links).any(|link| {
            matches!(
                paths::resolve_link(&active.spelling, link),
                Ok(Some(s)) if paths::fold(&s, self.config.lowercase_paths) == key
            )
        })
    }

    fn render_active(&mut self) {
        let Some(active) = self.session.active_page.clone() else {
            return;
        };
        let (page, headings) = match self.session.tree.get(&active.key) {
            Some(TreeEntry::Markdown(doc)) => {
                let ctx = RenderContext {
                    tree: &self.session.tree,
                    pattern: &self.pattern,
                    body_class: &self.config.markdown_body_class,
                    lowercase: self.config.lowercase_paths,
                };
                (render::render_page(&active.spelling, doc, &ctx), doc.headings.clone())
            }
            _ => (
                render::not_found(&active.spelling, &self.config.markdown_body_class),
                Vec::new(),
            ),
        };
        self.present(&active.key, &page, &headings);
    }

    fn present(&mut self, path: &str, page: &RenderedPage, headings: &[Heading]) {
        self.seq += 1;
        self.presenter.update_html(path, page);
        self.presenter.update_heading_list(path, headings);
        self.presenter.update_seq(self.seq);
    }

    fn publish_menu(&mut self) {
        let menu = self.session.tree.menu();
        self.presenter.update_menu(&menu);
    }

    fn resolve_styles(&mut self) {
        let Some(active) = &self.session.active_page else {
            return;
        };
        let declared = self.css_rules.declared_for(&active.key);
        let fetches = styles::diff_dependencies(
            &active.spelling,
            &declared,
            &self.styles,
            self.session.root.as_ref(),
            self.config.lowercase_paths,
        );
        for fetch in fetches {
            tracing::debug!(stylesheet = %fetch.key, applied = fetch.prior.is_some(), "resolving stylesheet");
            self.styles.mark_pending(&fetch.key);
            let opener = Arc::clone(&self.opener);
            let events = self.events.clone();
            tokio::spawn(async move {
                let stylesheet = styles::refresh_stylesheet(opener.as_ref(), &fetch).await;
                let _ = events.send(SyncEvent::StylesheetResolved {
                    key: fetch.key,
                    stylesheet,
                });
            });
        }
    }

    /// One poll round: check the active page, or wait and back off when
    /// there is nothing to check.
    fn start_check(&mut self) {
        let target = self.session.active_page.as_ref().and_then(|active| {
            match self.session.tree.get(&active.key) {
                Some(TreeEntry::Markdown(doc)) => {
                    Some((active.key.clone(), doc.origin.clone(), doc.stamp.clone()))
                }
                _ => None,
            }
        });
        let Some((path, origin, prior)) = target else {
            self.arm_timer();
            self.session.schedule.back_off();
            return;
        };
        let opener = Arc::clone(&self.opener);
        let events = self.events.clone();
        let pattern = self.pattern.clone();
        tokio::spawn(async move {
            let check = poll::check_freshness(opener.as_ref(), &origin, &prior, &pattern).await;
            let _ = events.send(SyncEvent::PageChecked { path, check });
        });
    }

    fn arm_timer(&self) {
        let delay = self.session.schedule.current();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SyncEvent::PollTick);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CssRuleConfig;
    use crate::presenter::{Notification, RecordingPresenter};
    use crate::source::Sources;
    use crate::source::embedded::{EmbeddedFile, EmbeddedStore};
    use crate::test_helpers::{MockOpener, RecordedOp, data_entry, markdown_doc};

    type Harness = (
        Coordinator<RecordingPresenter>,
        UnboundedReceiver<SyncEvent>,
        RecordingPresenter,
    );

    fn harness_on(opener: Arc<dyn BlobOpener>, config: WikiConfig) -> Harness {
        let presenter = RecordingPresenter::new();
        let (coordinator, rx) = Coordinator::new(config, opener, presenter.clone()).unwrap();
        (coordinator, rx, presenter)
    }

    fn harness_with(opener: &MockOpener, config: WikiConfig) -> Harness {
        harness_on(Arc::new(opener.clone()), config)
    }

    /// `site.css` declared for the top page.
    fn site_css_config() -> WikiConfig {
        let mut config = WikiConfig::default();
        config.css_rules.push(CssRuleConfig {
            pattern: "^index".into(),
            stylesheets: vec!["site.css".into()],
        });
        config
    }

    /// Handle events until `done` holds.
    async fn pump_until(
        coord: &mut Coordinator<RecordingPresenter>,
        rx: &mut UnboundedReceiver<SyncEvent>,
        mut done: impl FnMut(&Coordinator<RecordingPresenter>) -> bool,
    ) {
        while !done(coord) {
            let event = rx.recv().await.unwrap();
            coord.handle_event(event);
        }
    }

    fn applied_css(coord: &Coordinator<RecordingPresenter>, key: &str) -> Option<String> {
        coord.styles().get(key).map(|s| s.css.clone())
    }

    fn harness(opener: &MockOpener) -> Harness {
        harness_with(opener, WikiConfig::default())
    }

    fn small_wiki() -> MockOpener {
        let opener = MockOpener::new();
        opener.add_text(
            "https://wiki.test/index.md",
            "# Home\n[a](a.md)\n![logo](img/logo.png)",
            "s1",
        );
        opener.add_text("https://wiki.test/a.md", "# A\n[home](index.md)", "s1");
        opener.add_binary("https://wiki.test/img/logo.png", b"png", "s1");
        opener
    }

    fn count_html(notes: &[Notification]) -> usize {
        notes
            .iter()
            .filter(|n| matches!(n, Notification::Html { .. }))
            .count()
    }

    #[tokio::test]
    async fn url_scan_builds_tree_and_adopts_top_page() {
        let opener = small_wiki();
        let (mut coord, mut rx, presenter) = harness(&opener);

        coord.request_scan_url("https://wiki.test/").unwrap();
        assert_eq!(coord.mode(), SourceMode::Url);
        let stats = coord.pump_until_scanned(&mut rx).await.unwrap();

        assert_eq!(stats.fetched, 3);
        assert_eq!(coord.tree().len(), 3);
        assert_eq!(coord.active_page(), Some("index.md"));
        // Adopted first, then re-rendered once the linked image arrived.
        let rendered = presenter.rendered_paths();
        assert!(!rendered.is_empty());
        assert!(rendered.iter().all(|p| p == "index.md"));
        let menu = coord.tree().menu();
        let titles: Vec<&str> = menu.children.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "Home"]);
    }

    #[tokio::test]
    async fn equivalent_entry_triggers_no_notification() {
        let opener = small_wiki();
        let (mut coord, mut rx, presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        presenter.take();

        for path in ["index.md", "a.md"] {
            coord.merge_entry(path, path, TreeEntry::Markdown(markdown_doc("# changed text", "s1")));
        }
        assert!(presenter.notifications().is_empty());
    }

    #[tokio::test]
    async fn changed_active_page_rerenders() {
        let opener = small_wiki();
        let (mut coord, mut rx, presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        presenter.take();

        coord.merge_entry(
            "index.md",
            "index.md",
            TreeEntry::Markdown(markdown_doc("# Home v2", "s2")),
        );
        let notes = presenter.notifications();
        assert_eq!(count_html(&notes), 1);
        assert!(notes.iter().any(|n| matches!(
            n,
            Notification::Headings { headings, .. } if headings[0].text == "Home v2"
        )));
    }

    #[tokio::test]
    async fn changed_linked_data_rerenders_active_page() {
        let opener = small_wiki();
        let (mut coord, mut rx, presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        presenter.take();

        coord.merge_entry("img/logo.png", "img/logo.png", data_entry(b"png2", "s2"));
        assert_eq!(presenter.rendered_paths(), vec!["index.md"]);

        presenter.take();
        coord.merge_entry("img/other.png", "img/other.png", data_entry(b"x", "s1"));
        assert!(presenter.rendered_paths().is_empty());
    }

    #[tokio::test]
    async fn data_entries_get_fresh_refs() {
        let opener = small_wiki();
        let (mut coord, mut rx, _presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();

        let Some(TreeEntry::Data(doc)) = coord.tree().get("img/logo.png") else {
            panic!("logo not loaded");
        };
        assert!(
            doc.data_ref
                .as_ref()
                .is_some_and(|r| r.0.starts_with("blob:markwiki/"))
        );
    }

    #[tokio::test]
    async fn set_active_page_always_rerenders() {
        let opener = small_wiki();
        let (mut coord, mut rx, presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        presenter.take();

        coord.set_active_page("a.md");
        coord.set_active_page("a.md");
        assert_eq!(presenter.rendered_paths(), vec!["a.md", "a.md"]);
        assert!(presenter.notifications().contains(&Notification::Seq(coord.seq())));
    }

    #[tokio::test]
    async fn empty_page_means_top_page() {
        let opener = small_wiki();
        let (mut coord, _rx, _presenter) = harness(&opener);
        coord.set_active_page("");
        assert_eq!(coord.active_page(), Some("index.md"));
        coord.set_active_page("./Guide//Intro.MD");
        assert_eq!(coord.active_page(), Some("guide/intro.md"));
    }

    #[tokio::test]
    async fn missing_page_renders_placeholder() {
        let opener = MockOpener::new();
        let (mut coord, _rx, presenter) = harness(&opener);
        coord.set_active_page("nowhere.md");
        let notes = presenter.notifications();
        assert!(notes.iter().any(|n| matches!(
            n,
            Notification::Html { page, .. } if page.html.contains("nowhere.md not found")
        )));
    }

    #[tokio::test]
    async fn unchanged_poll_backs_off_without_rendering() {
        let opener = small_wiki();
        let (mut coord, mut rx, presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        presenter.take();
        let before = coord.poll_interval();

        coord.handle_event(SyncEvent::PageChecked {
            path: "index.md".into(),
            check: FreshnessCheck::Unchanged,
        });
        let after_one = coord.poll_interval();
        assert!(after_one > before);

        coord.handle_event(SyncEvent::PageChecked {
            path: "index.md".into(),
            check: FreshnessCheck::Unavailable,
        });
        assert!(coord.poll_interval() > after_one);
        assert!(presenter.rendered_paths().is_empty());
    }

    #[tokio::test]
    async fn poll_interval_is_capped() {
        let mut config = WikiConfig::default();
        config.poll.min_interval_ms = 100;
        config.poll.max_interval_ms = 120;
        config.poll.step_ms = 15;
        let (mut coord, _rx, _presenter) = harness_with(&MockOpener::new(), config);

        for _ in 0..5 {
            coord.handle_event(SyncEvent::PageChecked {
                path: "index.md".into(),
                check: FreshnessCheck::Unchanged,
            });
        }
        assert_eq!(coord.poll_interval(), Duration::from_millis(120));
    }

    #[tokio::test]
    async fn changed_poll_resets_interval_and_rerenders() {
        let opener = small_wiki();
        let (mut coord, mut rx, presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        for _ in 0..3 {
            coord.handle_event(SyncEvent::PageChecked {
                path: "index.md".into(),
                check: FreshnessCheck::Unchanged,
            });
        }
        presenter.take();

        coord.handle_event(SyncEvent::PageChecked {
            path: "index.md".into(),
            check: FreshnessCheck::Changed(TreeEntry::Markdown(markdown_doc("# Home v2", "s2"))),
        });
        assert_eq!(coord.poll_interval(), Duration::from_millis(1000));
        assert_eq!(presenter.rendered_paths(), vec!["index.md"]);
    }

    #[tokio::test]
    async fn dependency_diff_fetches_only_new_stylesheets() {
        let opener = small_wiki();
        opener.add_text("https://wiki.test/a.css", "a {}", "s1");
        opener.add_text("https://wiki.test/b.css", "b {}", "s2");
        opener.add_text("https://wiki.test/c.css", "c {}", "s3");

        let mut config = WikiConfig::default();
        config.css_rules.push(CssRuleConfig {
            pattern: "^index".into(),
            stylesheets: vec!["a.css".into(), "b.css".into()],
        });
        config.css_rules.push(CssRuleConfig {
            pattern: "^a\\.md$".into(),
            stylesheets: vec!["a.css".into(), "c.css".into()],
        });
        let (mut coord, mut rx, presenter) = harness_with(&opener, config);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        while coord.styles().keys().count() < 2 {
            let event = rx.recv().await.unwrap();
            coord.handle_event(event);
        }
        opener.clear_operations();

        coord.set_active_page("a.md");
        pump_until(&mut coord, &mut rx, |c| {
            c.styles().get("c.css").is_some() && !c.styles().is_pending("a.css")
        })
        .await;

        let css_reads: Vec<RecordedOp> = opener
            .operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::ReadText(url) if url.ends_with(".css")))
            .collect();
        assert_eq!(
            css_reads,
            vec![RecordedOp::ReadText("https://wiki.test/c.css".into())]
        );
        assert!(
            opener
                .operations()
                .contains(&RecordedOp::Probe("https://wiki.test/a.css".into()))
        );
        assert!(coord.styles().get("b.css").is_some());
        assert!(presenter.notifications().contains(&Notification::Stylesheet {
            key: "c.css".into(),
            css: "c {}".into(),
        }));
    }

    #[tokio::test]
    async fn edited_stylesheet_is_reapplied_on_page_switch() {
        let opener = small_wiki();
        opener.add_text("https://wiki.test/site.css", "body { color: red }", "v1");
        let (mut coord, mut rx, presenter) = harness_with(&opener, site_css_config());
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        pump_until(&mut coord, &mut rx, |c| c.styles().get("site.css").is_some()).await;

        opener.add_text("https://wiki.test/site.css", "body { color: blue }", "v2");
        presenter.take();
        coord.set_active_page("a.md");
        coord.set_active_page("index.md");
        pump_until(&mut coord, &mut rx, |c| !c.styles().is_pending("site.css")).await;

        assert_eq!(applied_css(&coord, "site.css").as_deref(), Some("body { color: blue }"));
        assert!(presenter.notifications().contains(&Notification::Stylesheet {
            key: "site.css".into(),
            css: "body { color: blue }".into(),
        }));
    }

    #[tokio::test]
    async fn unchanged_stylesheet_is_not_pushed_again() {
        let opener = small_wiki();
        opener.add_text("https://wiki.test/site.css", "body {}", "v1");
        let (mut coord, mut rx, presenter) = harness_with(&opener, site_css_config());
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        pump_until(&mut coord, &mut rx, |c| c.styles().get("site.css").is_some()).await;
        presenter.take();

        coord.set_active_page("index.md");
        pump_until(&mut coord, &mut rx, |c| !c.styles().is_pending("site.css")).await;

        assert_eq!(opener.reads_of("https://wiki.test/site.css"), 1);
        assert!(
            !presenter
                .notifications()
                .iter()
                .any(|n| matches!(n, Notification::Stylesheet { .. }))
        );
    }

    #[tokio::test]
    async fn new_scan_supersedes_old_one() {
        let opener = small_wiki();
        let (mut coord, mut rx, _presenter) = harness(&opener);
        let first = coord.request_scan_url("https://wiki.test/").unwrap();
        let second = coord.request_scan_url("https://wiki.test/").unwrap();
        assert_ne!(first, second);

        coord.handle_event(SyncEvent::EntryResolved {
            scan: first,
            path: "stale.md".into(),
            spelling: "stale.md".into(),
            entry: TreeEntry::Markdown(markdown_doc("# Stale", "s1")),
        });
        coord.handle_event(SyncEvent::ScanComplete {
            scan: first,
            source: "old".into(),
            stats: ScanStats::default(),
        });
        assert!(coord.is_scanning());
        assert!(!coord.tree().contains("stale.md"));

        coord.pump_until_scanned(&mut rx).await.unwrap();
        assert!(coord.tree().contains("a.md"));
    }

    #[tokio::test]
    async fn rescan_policy_dispatches_follow_up_scan() {
        let mut config = WikiConfig::default();
        config.scan.rescan_after_scan = true;
        let (mut coord, _rx, _presenter) = harness_with(&small_wiki(), config);
        let id = coord.request_scan_url("https://wiki.test/").unwrap();

        coord.handle_event(SyncEvent::ScanComplete {
            scan: id,
            source: "https://wiki.test/".into(),
            stats: ScanStats::default(),
        });
        assert!(coord.is_scanning());
    }

    #[tokio::test]
    async fn scan_complete_without_rescan_policy_goes_idle() {
        let (mut coord, _rx, _presenter) = harness(&small_wiki());
        let id = coord.request_scan_url("https://wiki.test/").unwrap();
        coord.handle_event(SyncEvent::ScanComplete {
            scan: id,
            source: "https://wiki.test/".into(),
            stats: ScanStats::default(),
        });
        assert!(!coord.is_scanning());
    }

    #[tokio::test]
    async fn deletion_removes_entry_and_republishes_menu() {
        let opener = small_wiki();
        let (mut coord, mut rx, presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        let id = coord.request_scan_url("https://wiki.test/").unwrap();
        presenter.take();

        coord.handle_event(SyncEvent::EntryDeleted {
            scan: id,
            path: "a.md".into(),
        });
        assert!(!coord.tree().contains("a.md"));
        assert!(
            presenter
                .notifications()
                .iter()
                .any(|n| matches!(n, Notification::Menu(_)))
        );
    }

    #[tokio::test]
    async fn open_single_file_bypasses_scan() {
        let opener = MockOpener::new();
        opener.add_text("/notes/Todo.md", "# Todo\n- [ ] write", "s1");
        let (mut coord, _rx, presenter) = harness(&opener);

        coord.open_single_file("/notes/Todo.md").await;
        assert_eq!(coord.mode(), SourceMode::None);
        assert!(!coord.is_scanning());
        assert_eq!(coord.active_page(), Some("todo.md"));
        assert_eq!(presenter.rendered_paths(), vec!["todo.md"]);
    }

    fn embedded_harness(store: &Arc<EmbeddedStore>) -> Harness {
        let sources = Sources::with_embedded(Duration::from_secs(1), Arc::clone(store));
        harness_on(Arc::new(sources), WikiConfig::default())
    }

    #[tokio::test]
    async fn load_embedded_merges_all_kinds() {
        let store = Arc::new(EmbeddedStore::new());
        store.insert(EmbeddedFile::new("index.md", "text/markdown", 1, b"# Embedded"));
        store.insert(EmbeddedFile::new("site.css", "text/css", 1, b"p {}"));
        store.insert(EmbeddedFile::new("img/a.png", "image/png", 1, b"png"));
        let (mut coord, _rx, presenter) = embedded_harness(&store);

        coord.load_embedded();
        assert_eq!(coord.tree().get("index.md").map(|e| e.kind()), Some(EntryKind::Markdown));
        assert_eq!(coord.tree().get("site.css").map(|e| e.kind()), Some(EntryKind::Css));
        assert_eq!(coord.tree().get("img/a.png").map(|e| e.kind()), Some(EntryKind::Data));
        assert_eq!(presenter.rendered_paths(), vec!["index.md"]);
    }

    #[tokio::test]
    async fn embedded_page_is_polled_against_its_store() {
        let store = Arc::new(EmbeddedStore::new());
        store.insert(EmbeddedFile::new("index.md", "text/markdown", 1, b"# Embedded"));
        let (mut coord, mut rx, presenter) = embedded_harness(&store);
        coord.load_embedded();
        assert_eq!(coord.active_page(), Some("index.md"));

        let first = loop {
            if let SyncEvent::PageChecked { check, .. } = rx.recv().await.unwrap() {
                break check;
            }
        };
        assert!(matches!(first, FreshnessCheck::Unchanged));

        store.insert(EmbeddedFile::new("index.md", "text/markdown", 2, b"# Rewritten"));
        presenter.take();
        coord.handle_event(SyncEvent::PageChecked {
            path: "index.md".into(),
            check: first,
        });
        pump_until(&mut coord, &mut rx, |_| !presenter.rendered_paths().is_empty()).await;
        assert!(presenter.notifications().iter().any(|n| matches!(
            n,
            Notification::Headings { headings, .. } if headings[0].text == "Rewritten"
        )));
    }

    #[tokio::test]
    async fn load_embedded_without_store_is_a_no_op() {
        let (mut coord, _rx, presenter) = harness(&MockOpener::new());
        coord.load_embedded();
        assert!(coord.tree().is_empty());
        assert!(presenter.notifications().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_tree_and_mode() {
        let opener = small_wiki();
        let (mut coord, mut rx, _presenter) = harness(&opener);
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();

        coord.reset();
        assert!(coord.tree().is_empty());
        assert_eq!(coord.mode(), SourceMode::None);
        assert_eq!(coord.active_page(), None);
    }

    #[tokio::test]
    async fn reset_forgets_applied_stylesheets() {
        let opener = small_wiki();
        opener.add_text("https://wiki.test/site.css", "body { color: red }", "s1");
        opener.add_text("https://other.test/index.md", "# Other", "s1");
        opener.add_text("https://other.test/site.css", "body { color: blue }", "s1");
        let (mut coord, mut rx, presenter) = harness_with(&opener, site_css_config());
        coord.request_scan_url("https://wiki.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        pump_until(&mut coord, &mut rx, |c| c.styles().get("site.css").is_some()).await;

        coord.reset();
        assert_eq!(coord.styles().keys().count(), 0);

        presenter.take();
        coord.request_scan_url("https://other.test/").unwrap();
        coord.pump_until_scanned(&mut rx).await.unwrap();
        pump_until(&mut coord, &mut rx, |c| c.styles().get("site.css").is_some()).await;

        assert_eq!(applied_css(&coord, "site.css").as_deref(), Some("body { color: blue }"));
        assert!(presenter.notifications().contains(&Notification::Stylesheet {
            key: "site.css".into(),
            css: "body { color: blue }".into(),
        }));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let (mut coord, _rx, _presenter) = harness(&MockOpener::new());
        assert!(matches!(
            coord.request_scan_url("not a url"),
            Err(SyncError::InvalidUrl { .. })
        ));
        assert_eq!(coord.mode(), SourceMode::None);
    }

    #[tokio::test]
    async fn scan_of_missing_directory_is_rejected() {
        let (mut coord, _rx, _presenter) = harness(&MockOpener::new());
        assert!(matches!(
            coord.request_scan_directory("/definitely/not/here"),
            Err(SyncError::Io(_))
        ));
    }
}
