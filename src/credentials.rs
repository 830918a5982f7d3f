//! The caller-supplied cookie/header bag.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cookies and extra headers attached to requests made on the user's behalf.
///
/// Premium cookies make the account marker visible on the landing page and
/// tie the listen request to the account. The bag is only held in memory for
/// the lifetime of a session.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Cookie name → value.
    pub cookies: BTreeMap<String, String>,
    /// Extra request headers (name → value).
    pub headers: BTreeMap<String, String>,
}

impl Credentials {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a raw `Cookie:` header value such as `a=1; b=2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a pair has no `=` or an empty name.
    pub fn from_cookie_header(header: &str) -> Result<Self> {
        let mut creds = Self::new();
        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            creds.add_cookie_pair(pair)?;
        }
        Ok(creds)
    }

    /// Adds one `NAME=VALUE` cookie.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pair is not of the form `NAME=VALUE`.
    pub fn add_cookie_pair(&mut self, pair: &str) -> Result<()> {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("cookie must be NAME=VALUE, got '{pair}'")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Config(format!("cookie name is empty in '{pair}'")));
        }
        self.cookies.insert(name.to_string(), value.trim().to_string());
        Ok(())
    }

    /// Sets a cookie, replacing an existing one with the same name.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Sets an extra header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Merges `other` into `self`; entries from `other` win.
    pub fn merge(&mut self, other: Self) {
        self.cookies.extend(other.cookies);
        self.headers.extend(other.headers);
    }

    /// Returns true when neither cookies nor headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.headers.is_empty()
    }

    /// Renders the cookies as a single `Cookie` header value.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let joined = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        Some(joined)
    }

    /// Attaches the cookie header and extra headers to a request.
    #[must_use]
    pub fn apply(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(cookie) = self.cookie_header() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }
}

// Values are secrets; only names are printed.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}
