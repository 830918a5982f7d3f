//! One acquisition attempt for one content URL.

use crate::config::{AppConfig, RetryConfig, ServiceConfig};
use crate::credentials::Credentials;
use crate::error::Result;
use crate::http::Gateway;
use crate::license::{LicenseId, negotiate_with_retry};
use crate::playlist::{Playlist, PlaylistSource, build_playlist, derive_title};
use crate::resolve::{Identifiers, resolve};

/// Service URLs derived from the resolved identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Listen page that binds the credential cookies to a server session.
    pub authenticate_url: String,
    /// License record of the account; present only with an author id.
    pub license_url: Option<String>,
    /// Playlist endpoint of the work.
    pub playlist_url: String,
}

impl Endpoints {
    /// Computes the endpoints for `ids` under `service`.
    #[must_use]
    pub fn new(service: &ServiceConfig, ids: &Identifiers) -> Self {
        let api = &service.license_api_url;
        Self {
            authenticate_url: format!("{}/listen/{}", service.platform_url, ids.content_id),
            license_url: ids.author_id.as_ref().map(|author| {
                format!(
                    "{api}/v4/accounts/{}-{author}/audiobooks/{}",
                    service.platform_slug, ids.work_id
                )
            }),
            playlist_url: format!("{api}/v4/audiobooks/{}/playlists", ids.work_id),
        }
    }
}

/// Fully resolved acquisition state.
///
/// Every derived value is computed once by [`Session::establish`]; afterwards
/// only the playlist's download record changes.
#[derive(Debug, Clone)]
pub struct Session {
    content_url: String,
    credentials: Credentials,
    ids: Identifiers,
    endpoints: Endpoints,
    title: String,
    playlist: Playlist,
}

impl Session {
    /// Resolves identifiers, negotiates a license when an author id is
    /// present, and builds the playlist.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; see [`resolve`],
    /// [`negotiate`](crate::license::negotiate) and [`build_playlist`].
    pub async fn establish(
        gateway: &Gateway,
        config: &AppConfig,
        content_url: &str,
        credentials: Credentials,
    ) -> Result<Self> {
        Self::establish_with(
            gateway,
            &config.service,
            &config.license_retry,
            content_url,
            credentials,
        )
        .await
    }

    /// [`establish`](Self::establish) with explicit service settings.
    ///
    /// # Errors
    ///
    /// See [`establish`](Self::establish).
    pub async fn establish_with(
        gateway: &Gateway,
        service: &ServiceConfig,
        license_retry: &RetryConfig,
        content_url: &str,
        credentials: Credentials,
    ) -> Result<Self> {
        let ids = resolve(gateway, content_url, &credentials).await?;
        let endpoints = Endpoints::new(service, &ids);

        let source = match &endpoints.license_url {
            Some(license_url) => PlaylistSource::Premium(
                negotiate_with_retry(
                    gateway,
                    &endpoints.authenticate_url,
                    license_url,
                    &ids.work_id,
                    service,
                    &credentials,
                    license_retry,
                )
                .await?,
            ),
            None => PlaylistSource::PreviewOnly,
        };

        let title = derive_title(content_url).unwrap_or_else(|| ids.content_id.clone());
        let playlist = build_playlist(
            gateway,
            service,
            &title,
            &endpoints.playlist_url,
            &ids.preview_url,
            &source,
        )
        .await?;

        Ok(Self {
            content_url: content_url.to_string(),
            credentials,
            ids,
            endpoints,
            title,
            playlist,
        })
    }

    /// The URL this session was built from.
    #[must_use]
    pub fn content_url(&self) -> &str {
        &self.content_url
    }

    /// Credentials used for the page fetch and the listen request.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Resolved identifiers.
    #[must_use]
    pub const fn identifiers(&self) -> &Identifiers {
        &self.ids
    }

    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.ids.content_id
    }

    #[must_use]
    pub fn preview_url(&self) -> &str {
        &self.ids.preview_url
    }

    #[must_use]
    pub fn work_id(&self) -> &str {
        &self.ids.work_id
    }

    #[must_use]
    pub fn author_id(&self) -> Option<&str> {
        self.ids.author_id.as_deref()
    }

    /// Derived service URLs.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn authenticate_url(&self) -> &str {
        &self.endpoints.authenticate_url
    }

    #[must_use]
    pub fn license_url(&self) -> Option<&str> {
        self.endpoints.license_url.as_deref()
    }

    #[must_use]
    pub fn playlist_url(&self) -> &str {
        &self.endpoints.playlist_url
    }

    /// The negotiated license, for premium sessions.
    #[must_use]
    pub const fn license_id(&self) -> Option<&LicenseId> {
        match self.playlist.source() {
            PlaylistSource::Premium(license) => Some(license),
            PlaylistSource::PreviewOnly => None,
        }
    }

    #[must_use]
    pub const fn source(&self) -> &PlaylistSource {
        self.playlist.source()
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub const fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Mutable playlist, for recording downloads.
    pub const fn playlist_mut(&mut self) -> &mut Playlist {
        &mut self.playlist
    }

    #[must_use]
    pub fn into_playlist(self) -> Playlist {
        self.playlist
    }
}
