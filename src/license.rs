//! License negotiation against the licensing service.

use std::fmt;

use crate::config::{RetryConfig, ServiceConfig};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::http::Gateway;
use crate::retry::with_retry;
use crate::wire::LicenseResponse;

/// Short-lived credential unlocking the full playlist of one work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LicenseId(String);

impl LicenseId {
    /// Wraps a raw license id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LicenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runs the two-step license exchange once.
///
/// Step one binds the credential cookies to a server session via the listen
/// page; its body is ignored. Step two reads the first license record of the
/// account for this work, authenticated by the service key.
///
/// # Errors
///
/// - [`Error::AuthenticationFailed`] if the listen page cannot be reached.
/// - [`Error::Transport`] if the license endpoint cannot be reached.
/// - [`Error::MalformedResponse`] if the license body is not the expected JSON.
/// - [`Error::LicenseRecordMissing`] if there are no license records.
pub async fn negotiate(
    gateway: &Gateway,
    authenticate_url: &str,
    license_url: &str,
    work_id: &str,
    service: &ServiceConfig,
    credentials: &Credentials,
) -> Result<LicenseId> {
    gateway
        .touch(authenticate_url, credentials)
        .await
        .map_err(Error::AuthenticationFailed)?;

    let body = gateway.get_keyed(license_url, &service.session_key).await?;
    let license = parse_license(&body, license_url, work_id)?;
    log::info!("Obtained license for work {work_id}");
    Ok(license)
}

/// [`negotiate`] with a bounded retry of the whole exchange on transient errors.
///
/// # Errors
///
/// Returns the error of the final attempt.
#[allow(clippy::too_many_arguments)]
pub async fn negotiate_with_retry(
    gateway: &Gateway,
    authenticate_url: &str,
    license_url: &str,
    work_id: &str,
    service: &ServiceConfig,
    credentials: &Credentials,
    retry: &RetryConfig,
) -> Result<LicenseId> {
    with_retry(retry, "license", |_| {
        negotiate(
            gateway,
            authenticate_url,
            license_url,
            work_id,
            service,
            credentials,
        )
    })
    .await
}

/// Reads the first license id out of a license endpoint body.
///
/// # Errors
///
/// See [`negotiate`].
pub fn parse_license(body: &str, endpoint: &str, work_id: &str) -> Result<LicenseId> {
    let response: LicenseResponse =
        serde_json::from_str(body).map_err(|e| Error::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

    let first = response
        .licenses
        .and_then(|records| records.into_iter().next())
        .ok_or_else(|| Error::LicenseRecordMissing {
            work_id: work_id.to_string(),
        })?;

    first
        .id
        .filter(|id| !id.is_empty())
        .map(LicenseId)
        .ok_or_else(|| Error::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: "first license record has no id".to_string(),
        })
}
