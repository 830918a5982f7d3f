//! CLI mode for audiobook-dl.

mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use console::style;
use indicatif::MultiProgress;

use crate::config::AppConfig;
use crate::credentials::Credentials;
use crate::download::{DownloadProgress, Downloader};
use crate::http::Gateway;
use crate::session::Session;

pub use progress::{IndicatifProgress, print_playlist, print_summary};

/// Download audiobooks chapter by chapter.
#[derive(Parser, Debug)]
#[command(name = "audiobook-dl", version, about)]
pub struct Args {
    /// Content URLs, processed one after another
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for chapter files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of chapters downloaded at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Platform cookies as a `Cookie:` header value ("name=value; other=value")
    #[arg(long, env = "AUDIOBOOK_DL_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// Re-download chapters that already exist
    #[arg(long)]
    pub force: bool,

    /// Keep `.part` files of failed chapters for a later resume
    #[arg(long)]
    pub keep_partial: bool,

    /// Stop at the first failed chapter
    #[arg(long)]
    pub fail_fast: bool,

    /// Retries per chapter on transient errors
    #[arg(long)]
    pub retries: Option<u32>,

    /// Print the playlist without downloading
    #[arg(long)]
    pub list: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Loads the configuration file and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the cookie string is invalid.
    pub fn app_config(&self) -> crate::Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        let download = &mut config.download;

        if let Some(dir) = &self.output_dir {
            download.output_dir.clone_from(dir);
        }
        if let Some(jobs) = self.jobs {
            download.concurrent_tracks = jobs.max(1);
        }
        if let Some(retries) = self.retries {
            download.retry.max_attempts = retries;
        }
        download.force_overwrite |= self.force;
        download.fail_fast |= self.fail_fast;
        if self.keep_partial {
            download.cleanup_on_error = false;
        }

        if let Some(cookie) = &self.cookie {
            config
                .credentials
                .merge(Credentials::from_cookie_header(cookie)?);
        }
        Ok(config)
    }
}

/// Initializes `env_logger`; `RUST_LOG` wins over the verbosity flag.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug,selectors=warn,html5ever=warn",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

/// Resolves, lists and downloads one content URL.
///
/// Returns whether every chapter ended up on disk.
async fn acquire(
    url: &str,
    gateway: &Gateway,
    config: &AppConfig,
    downloader: &Downloader,
    list_only: bool,
) -> crate::Result<bool> {
    println!("Resolving {url} ...");
    let mut session = Session::establish(gateway, config, url, config.credentials.clone()).await?;
    print_playlist(&session, downloader.config());

    if list_only {
        return Ok(true);
    }

    let multi = MultiProgress::new();
    let progress: Arc<dyn DownloadProgress> = Arc::new(IndicatifProgress::new(multi.clone()));
    let report = downloader
        .download_all(session.playlist_mut(), &progress)
        .await?;
    multi.clear().ok();

    print_summary(&report);
    Ok(report.is_complete())
}

/// Runs the CLI with arguments from the process command line.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be built. Per-URL failures are printed and reflected in the exit
/// code instead.
pub async fn run() -> crate::Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.app_config()?;
    if config.credentials.is_empty() {
        log::warn!("No cookies configured; only previews will be available");
    }

    let gateway = Gateway::new(&config.http)?;
    let downloader = Downloader::new(gateway.clone(), config.download.clone());

    let mut all_ok = true;
    for url in &args.urls {
        match acquire(url, &gateway, &config, &downloader, args.list).await {
            Ok(complete) => all_ok &= complete,
            Err(e) => {
                all_ok = false;
                eprintln!("{} {url}: {e}", style("error:").red().bold());
            }
        }
    }

    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
