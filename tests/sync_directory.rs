//! End-to-end sync of a wiki directory on disk.
//!
//! Drives the public API the way the CLI does: load `markwiki.toml` from the
//! fixture wiki, scan it through the real blob sources, then follow the
//! active page while files change underneath it.

use markwiki::config;
use markwiki::presenter::{Notification, RecordingPresenter};
use markwiki::source::Sources;
use markwiki::sync::{Coordinator, SourceMode};
use markwiki::types::SyncEvent;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

type Wiki = (
    Coordinator<RecordingPresenter>,
    UnboundedReceiver<SyncEvent>,
    RecordingPresenter,
);

fn fixture_wiki() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/wiki");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

fn open_wiki(dir: &Path) -> Wiki {
    let config = config::load_config(dir).unwrap();
    let sources = Sources::new(Duration::from_millis(config.scan.request_timeout_ms));
    let presenter = RecordingPresenter::new();
    let (coordinator, rx) =
        Coordinator::new(config, Arc::new(sources), presenter.clone()).unwrap();
    (coordinator, rx, presenter)
}

/// Handle events until `done` holds, failing after five seconds.
async fn pump_until(
    coordinator: &mut Coordinator<RecordingPresenter>,
    rx: &mut UnboundedReceiver<SyncEvent>,
    mut done: impl FnMut(&Coordinator<RecordingPresenter>) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(coordinator) {
            let event = rx.recv().await.expect("event queue closed");
            coordinator.handle_event(event);
        }
    })
    .await
    .expect("timed out waiting for the wiki");
}

fn last_html(presenter: &RecordingPresenter, path: &str) -> Option<String> {
    presenter
        .notifications()
        .into_iter()
        .rev()
        .find_map(|n| match n {
            Notification::Html { path: p, page } if p == path => Some(page.html),
            _ => None,
        })
}

#[tokio::test]
async fn directory_scan_mirrors_linked_wiki() {
    let tmp = fixture_wiki();
    let (mut wiki, mut rx, presenter) = open_wiki(tmp.path());

    wiki.request_scan_directory(tmp.path()).unwrap();
    assert_eq!(wiki.mode(), SourceMode::Directory);
    let stats = wiki.pump_until_scanned(&mut rx).await.unwrap();

    assert!(stats.failed.is_empty(), "unresolved: {:?}", stats.failed);
    assert_eq!(stats.fetched, 5);
    for path in ["index.md", "a.md", "b.md", "guide/setup.md", "img/logo.png"] {
        assert!(wiki.tree().contains(path), "{path} missing");
    }
    assert!(!wiki.tree().contains(".drafts/secret.md"));
    assert!(!wiki.tree().contains("guide/theme.css"));

    wiki.set_active_page("");
    assert_eq!(wiki.active_page(), Some("index.md"));
    let html = last_html(&presenter, "index.md").unwrap();
    assert!(html.contains(r##"href="#guide/setup.md""##));
    assert!(html.contains(r#"src="blob:markwiki/"#));
}

#[tokio::test]
async fn guide_pages_pull_in_their_stylesheet() {
    let tmp = fixture_wiki();
    let (mut wiki, mut rx, presenter) = open_wiki(tmp.path());
    wiki.request_scan_directory(tmp.path()).unwrap();
    wiki.pump_until_scanned(&mut rx).await.unwrap();

    wiki.set_active_page("guide/Setup.md");
    pump_until(&mut wiki, &mut rx, |w| w.styles().get("guide/theme.css").is_some()).await;

    assert!(presenter.notifications().iter().any(|n| matches!(
        n,
        Notification::Stylesheet { key, css } if key == "guide/theme.css" && css.contains("border-bottom")
    )));
}

#[tokio::test]
async fn poller_picks_up_edits_of_active_page() {
    let tmp = fixture_wiki();
    let (mut wiki, mut rx, presenter) = open_wiki(tmp.path());
    wiki.request_scan_directory(tmp.path()).unwrap();
    wiki.pump_until_scanned(&mut rx).await.unwrap();
    wiki.set_active_page("");
    presenter.take();

    std::fs::write(tmp.path().join("index.md"), "# Edited\n\nFresh text.\n").unwrap();
    pump_until(&mut wiki, &mut rx, |_| {
        last_html(&presenter, "index.md").is_some_and(|html| html.contains("Fresh text."))
    })
    .await;

    assert_eq!(wiki.poll_interval(), Duration::from_millis(20));
}

#[tokio::test]
async fn rescan_reports_deleted_files() {
    let tmp = fixture_wiki();
    let (mut wiki, mut rx, _presenter) = open_wiki(tmp.path());
    wiki.request_scan_directory(tmp.path()).unwrap();
    wiki.pump_until_scanned(&mut rx).await.unwrap();

    std::fs::remove_file(tmp.path().join("a.md")).unwrap();
    wiki.request_scan_directory(tmp.path()).unwrap();
    let stats = wiki.pump_until_scanned(&mut rx).await.unwrap();

    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.fetched, 0);
    assert!(!wiki.tree().contains("a.md"));
    assert!(wiki.tree().contains("b.md"));
}

#[tokio::test]
async fn rescan_keeps_linked_hidden_files() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("index.md"), "# Home\n\n![l](.assets/logo.png)\n").unwrap();
    std::fs::create_dir_all(tmp.path().join(".assets")).unwrap();
    std::fs::write(tmp.path().join(".assets/logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
    let (mut wiki, mut rx, _presenter) = open_wiki(tmp.path());

    wiki.request_scan_directory(tmp.path()).unwrap();
    wiki.pump_until_scanned(&mut rx).await.unwrap();
    assert!(wiki.tree().contains(".assets/logo.png"));

    wiki.request_scan_directory(tmp.path()).unwrap();
    let stats = wiki.pump_until_scanned(&mut rx).await.unwrap();
    assert_eq!(stats.deleted, 0);
    assert!(wiki.tree().contains(".assets/logo.png"));
}

#[tokio::test]
async fn edited_stylesheet_reaches_the_page_on_return() {
    let tmp = fixture_wiki();
    let (mut wiki, mut rx, presenter) = open_wiki(tmp.path());
    wiki.request_scan_directory(tmp.path()).unwrap();
    wiki.pump_until_scanned(&mut rx).await.unwrap();
    wiki.set_active_page("guide/Setup.md");
    pump_until(&mut wiki, &mut rx, |w| w.styles().get("guide/theme.css").is_some()).await;

    std::fs::write(tmp.path().join("guide/theme.css"), "h2 { color: teal }\n").unwrap();
    wiki.set_active_page("index.md");
    wiki.set_active_page("guide/Setup.md");
    pump_until(&mut wiki, &mut rx, |w| {
        w.styles()
            .get("guide/theme.css")
            .is_some_and(|s| s.css.contains("teal"))
    })
    .await;

    assert!(presenter.notifications().iter().any(|n| matches!(
        n,
        Notification::Stylesheet { key, css } if key == "guide/theme.css" && css.contains("teal")
    )));
}

#[tokio::test]
async fn single_file_mode_renders_without_scanning() {
    let tmp = fixture_wiki();
    let (mut wiki, _rx, presenter) = open_wiki(tmp.path());

    wiki.open_single_file(tmp.path().join("guide/Setup.md")).await;

    assert_eq!(wiki.mode(), SourceMode::None);
    assert_eq!(wiki.tree().len(), 1);
    let html = last_html(&presenter, "setup.md").unwrap();
    assert!(html.contains(r#"<h2 id="install">"#));
}
