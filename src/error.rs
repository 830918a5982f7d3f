//! Error types for the audiobook-dl library.

use thiserror::Error;

/// Errors that can occur while acquiring an audiobook.
///
/// Every pipeline stage has its own variant so callers can decide what to
/// retry (only the license exchange, a single track, or the whole pipeline).
#[derive(Error, Debug)]
pub enum Error {
    /// The content URL carries no 9-digit content identifier.
    #[error("No content identifier found in URL: {url}")]
    IdentifierNotFound {
        /// The URL that was searched.
        url: String,
    },

    /// The landing page is missing the preview data or it is malformed.
    #[error("Unexpected page structure: {0}")]
    PageStructure(String),

    /// The listen endpoint that ties the cookies to a server session could not be reached.
    #[error("Authentication request failed: {0}")]
    AuthenticationFailed(#[source] reqwest::Error),

    /// The license endpoint answered without any license record.
    #[error("No license record for work {work_id}")]
    LicenseRecordMissing {
        /// Work identifier whose licenses were requested.
        work_id: String,
    },

    /// A service response could not be parsed into the expected shape.
    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse {
        /// Endpoint that produced the response.
        endpoint: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The premium playlist request errored or returned an unusable body.
    #[error("Playlist request failed: {0}")]
    PlaylistRequestFailed(String),

    /// Network-level failure at any stage.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Destination write failure.
    #[error("I/O error: {0}")]
    Filesystem(#[from] std::io::Error),

    /// The configuration file or a command-line override is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A transfer was cancelled because another track failed.
    #[error("Download cancelled")]
    Cancelled,
}

impl Error {
    /// Returns true for failures worth retrying with the same inputs.
    ///
    /// Timeouts, connection problems, throttling and server errors count as
    /// transient. Structural problems (bad page, missing license, bad config)
    /// never do.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) | Self::AuthenticationFailed(e) => is_transient_http(e),
            Self::Filesystem(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Self::IdentifierNotFound { .. }
            | Self::PageStructure(_)
            | Self::LicenseRecordMissing { .. }
            | Self::MalformedResponse { .. }
            | Self::PlaylistRequestFailed(_)
            | Self::Config(_)
            | Self::Cancelled => false,
        }
    }
}

fn is_transient_http(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() || e.is_body() || e.is_request() || is_cut_short(e) {
        return true;
    }
    e.status()
        .is_some_and(|s| s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS)
}

/// A streamed body that ends early surfaces as a decode error wrapping the
/// underlying body error.
fn is_cut_short(e: &reqwest::Error) -> bool {
    e.is_decode()
        && std::error::Error::source(e)
            .and_then(|source| source.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_body)
}

/// A specialized `Result` type for audiobook-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
