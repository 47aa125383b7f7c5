use clap::{Parser, Subcommand};
use markwiki::config::{self, WikiConfig};
use markwiki::output::{self, TerminalPresenter};
use markwiki::paths;
use markwiki::presenter::{Presenter, RecordingPresenter};
use markwiki::source::Sources;
use markwiki::sync::Coordinator;
use markwiki::types::{ScanStats, SyncEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("MARKWIKI_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let build = env!("MARKWIKI_BUILD_ID");
        if build.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{build}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "markwiki")]
#[command(about = "Live markdown wiki over a directory or URL tree")]
#[command(long_about = "\
Live markdown wiki over a directory or URL tree

A source is a local directory or an http(s) URL. Markdown files are pages;
links between them are followed until every reachable page, image and
stylesheet is loaded. Pages are re-checked while you watch them.

Source layout:

  wiki/
  ├── markwiki.toml        # Config (optional)
  ├── index.md             # Top page, start of a URL scan
  ├── guide/
  │   ├── setup.md         # Linked as [setup](guide/setup.md)
  │   └── theme.css        # Declared through css_rules
  └── img/
      └── logo.png         # Linked as ![logo](img/logo.png)

Directory sources are listed in full; URL sources are crawled from the top
page by following links.

Run 'markwiki gen-config' to generate a documented markwiki.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: markwiki.toml in the source directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging; RUST_LOG overrides
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory or URL and print the navigation menu
    Scan { source: String },
    /// Scan, open a page, and follow changes until Ctrl-C
    Watch {
        source: String,
        /// Page to show (default: the top page)
        #[arg(long)]
        page: Option<String>,
        /// Print rendered HTML instead of a text preview
        #[arg(long)]
        html: bool,
    },
    /// Render one markdown file without scanning
    Open { file: PathBuf },
    /// Scan and report links that never resolved
    Check { source: String },
    /// Print a stock markwiki.toml with all options documented
    GenConfig,
}

/// Where a wiki comes from, as given on the command line.
enum SourceArg {
    Directory(PathBuf),
    Url(String),
}

impl SourceArg {
    fn parse(raw: &str) -> Self {
        if paths::is_url(raw) {
            SourceArg::Url(raw.to_string())
        } else {
            SourceArg::Directory(PathBuf::from(raw))
        }
    }

    fn display(&self) -> String {
        match self {
            SourceArg::Directory(dir) => dir.display().to_string(),
            SourceArg::Url(url) => url.clone(),
        }
    }

    fn config_dir(&self) -> Option<&Path> {
        match self {
            SourceArg::Directory(dir) => Some(dir.as_path()),
            SourceArg::Url(_) => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Scan { source } => {
            let source = SourceArg::parse(&source);
            let mut config = load_wiki_config(cli.config.as_deref(), source.config_dir())?;
            config.scan.rescan_after_scan = false;
            let (coordinator, stats) = scan_once(config, &source).await?;
            output::print_menu(&coordinator.tree().menu());
            println!();
            output::print_scan_summary(&source.display(), &stats);
        }
        Command::Watch { source, page, html } => {
            let source = SourceArg::parse(&source);
            let config = load_wiki_config(cli.config.as_deref(), source.config_dir())?;
            let (mut coordinator, mut rx) =
                build_coordinator(config, TerminalPresenter::new(html))?;
            start_scan(&mut coordinator, &source)?;
            let stats = coordinator.pump_until_scanned(&mut rx).await.unwrap_or_default();
            output::print_scan_summary(&source.display(), &stats);
            coordinator.set_active_page(page.as_deref().unwrap_or(""));

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    signal.cancel();
                }
            });
            tracing::info!("watching {}; Ctrl-C to stop", source.display());
            coordinator.run(rx, shutdown).await;
        }
        Command::Open { file } => {
            let config = load_wiki_config(cli.config.as_deref(), file.parent())?;
            let (mut coordinator, _rx) = build_coordinator(config, TerminalPresenter::new(true))?;
            coordinator.open_single_file(file).await;
        }
        Command::Check { source } => {
            let source = SourceArg::parse(&source);
            let mut config = load_wiki_config(cli.config.as_deref(), source.config_dir())?;
            config.scan.rescan_after_scan = false;
            println!("==> Checking {}", source.display());
            let (_, stats) = scan_once(config, &source).await?;
            output::print_link_report(&source.display(), &stats);
            if !stats.failed.is_empty() {
                std::process::exit(1);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let default = if debug { "markwiki=debug" } else { "markwiki=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `--config` wins; otherwise `markwiki.toml` next to the source, else defaults.
fn load_wiki_config(
    explicit: Option<&Path>,
    source_dir: Option<&Path>,
) -> Result<WikiConfig, config::ConfigError> {
    match (explicit, source_dir) {
        (Some(path), _) => {
            if !path.exists() {
                tracing::warn!("config file {} not found, using defaults", path.display());
            }
            config::load_config_file(path)
        }
        (None, Some(dir)) => config::load_config(dir),
        (None, None) => Ok(WikiConfig::default()),
    }
}

fn build_coordinator<P: Presenter>(
    config: WikiConfig,
    presenter: P,
) -> Result<(Coordinator<P>, UnboundedReceiver<SyncEvent>), Box<dyn std::error::Error>> {
    let sources = Sources::new(Duration::from_millis(config.scan.request_timeout_ms));
    Ok(Coordinator::new(config, Arc::new(sources), presenter)?)
}

fn start_scan<P: Presenter>(
    coordinator: &mut Coordinator<P>,
    source: &SourceArg,
) -> Result<(), Box<dyn std::error::Error>> {
    match source {
        SourceArg::Directory(dir) => coordinator.request_scan_directory(dir.clone())?,
        SourceArg::Url(url) => coordinator.request_scan_url(url)?,
    };
    Ok(())
}

/// Run one scan to completion without printing notifications.
async fn scan_once(
    config: WikiConfig,
    source: &SourceArg,
) -> Result<(Coordinator<RecordingPresenter>, ScanStats), Box<dyn std::error::Error>> {
    let (mut coordinator, mut rx) = build_coordinator(config, RecordingPresenter::new())?;
    start_scan(&mut coordinator, source)?;
    let stats = coordinator.pump_until_scanned(&mut rx).await.unwrap_or_default();
    Ok((coordinator, stats))
}
