//! audiobook-dl - A library for downloading audiobooks chapter by chapter.
//!
//! A content URL is resolved into platform identifiers by scraping its
//! landing page, a license is negotiated when the page shows an account
//! entitlement, and the resulting playlist is downloaded track by track.
//! Without an entitlement the free preview becomes a one-track playlist.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use audiobook_dl::{AppConfig, Credentials, DownloadProgress, Downloader, Gateway, NoProgress, Session};
//!
//! # async fn example() -> audiobook_dl::Result<()> {
//! let config = AppConfig::load(None)?;
//! let gateway = Gateway::new(&config.http)?;
//! let credentials = Credentials::from_cookie_header("_scribd_session=...")?;
//!
//! // Resolve identifiers, negotiate the license and build the playlist
//! let mut session = Session::establish(
//!     &gateway,
//!     &config,
//!     "https://www.scribd.com/audiobook/500123456/My-Great-Book",
//!     credentials,
//! )
//! .await?;
//!
//! // Download every chapter with no progress reporting
//! let downloader = Downloader::new(gateway, config.download.clone());
//! let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
//! let report = downloader.download_all(session.playlist_mut(), &progress).await?;
//! println!("Downloaded {} chapters", report.summary.tracks_downloaded);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod credentials;
pub mod download;
pub mod error;
pub mod format;
pub mod fs;
pub mod http;
pub mod license;
pub mod playlist;
pub mod resolve;
pub mod retry;
pub mod session;
pub mod stats;
mod wire;

// Re-export main types for convenience
pub use config::{AppConfig, DownloadConfig, HttpConfig, RetryConfig, ServiceConfig};
pub use credentials::Credentials;
pub use download::{
    DownloadProgress, DownloadReport, Downloader, FileStatus, NoProgress, TrackOutcome,
    TrackReport,
};
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration, format_rate};
pub use fs::{FileSystem, TokioFileSystem};
pub use http::Gateway;
pub use license::{LicenseId, negotiate, negotiate_with_retry};
pub use playlist::{Playlist, PlaylistSource, Track, build_playlist, derive_title};
pub use resolve::{Identifiers, resolve};
pub use session::{Endpoints, Session};
pub use stats::{DownloadSummary, TrackStats};
