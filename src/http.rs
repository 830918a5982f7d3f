//! Thin HTTP gateway over `reqwest` used by every pipeline stage.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::{Response, StatusCode};

use crate::config::HttpConfig;
use crate::credentials::Credentials;
use crate::error::Result;

/// Header carrying the licensing service key.
pub const SESSION_KEY_HEADER: &str = "Session-Key";

/// Performs page fetches, keyed API calls and streamed downloads.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: reqwest::Client,
}

impl Gateway {
    /// Builds a gateway with a configured HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetches a page with the credential cookies attached and returns its body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) on network
    /// failure or a non-success status.
    pub async fn fetch_page(&self, url: &str, credentials: &Credentials) -> Result<String> {
        log::debug!("GET {url}");
        let response = credentials
            .apply(self.client.get(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Issues a credentialed GET and discards the body.
    ///
    /// Used to bind the cookies to a server-side session.
    ///
    /// # Errors
    ///
    /// Returns the raw `reqwest` error so the caller can classify it.
    pub async fn touch(&self, url: &str, credentials: &Credentials) -> reqwest::Result<StatusCode> {
        log::debug!("GET {url} (session)");
        let response = credentials
            .apply(self.client.get(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.status())
    }

    /// GET with the `Session-Key` header; returns the body text.
    ///
    /// # Errors
    ///
    /// Returns the raw `reqwest` error on network failure or non-success status.
    pub async fn get_keyed(&self, url: &str, session_key: &str) -> reqwest::Result<String> {
        log::debug!("GET {url} (keyed)");
        self.client
            .get(url)
            .header(SESSION_KEY_HEADER, session_key)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// POST a JSON body with the `Session-Key` header; returns the body text.
    ///
    /// # Errors
    ///
    /// Returns the raw `reqwest` error on network failure or non-success status.
    pub async fn post_keyed(
        &self,
        url: &str,
        session_key: &str,
        body: String,
    ) -> reqwest::Result<String> {
        log::debug!("POST {url} (keyed)");
        self.client
            .post(url)
            .header(SESSION_KEY_HEADER, session_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Opens a streamed GET, optionally starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) on network
    /// failure or a non-success status.
    pub async fn open_stream(&self, url: &str, offset: Option<u64>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(offset) = offset.filter(|&o| o > 0) {
            log::debug!("GET {url} (from byte {offset})");
            request = request.header(RANGE, format!("bytes={offset}-"));
        } else {
            log::debug!("GET {url} (stream)");
        }
        Ok(request.send().await?.error_for_status()?)
    }
}
