//! Playlist construction and title derivation.

use std::path::{Path, PathBuf};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::http::Gateway;
use crate::license::LicenseId;
use crate::wire::{PlaylistRequest, PlaylistResponse, TrackRecord};

/// Part/chapter label of the synthetic preview track.
pub const PREVIEW_LABEL: &str = "preview";

/// Where a playlist comes from, decided once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistSource {
    /// Full playlist unlocked by a license.
    Premium(LicenseId),
    /// Only the free sample is available.
    PreviewOnly,
}

impl PlaylistSource {
    /// Returns true for the premium variant.
    #[must_use]
    pub const fn is_premium(&self) -> bool {
        matches!(self, Self::Premium(_))
    }
}

/// One chapter's stream descriptor.
///
/// `part_number` and `chapter_number` are opaque labels; they are usually
/// numeric but the preview track uses [`PREVIEW_LABEL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    stream_url: String,
    part_number: String,
    chapter_number: String,
}

impl Track {
    /// Creates a track.
    #[must_use]
    pub fn new(
        stream_url: impl Into<String>,
        part_number: impl Into<String>,
        chapter_number: impl Into<String>,
    ) -> Self {
        Self {
            stream_url: stream_url.into(),
            part_number: part_number.into(),
            chapter_number: chapter_number.into(),
        }
    }

    /// The single track of a preview-only playlist.
    #[must_use]
    pub fn preview(preview_url: impl Into<String>) -> Self {
        Self::new(preview_url, PREVIEW_LABEL, PREVIEW_LABEL)
    }

    /// Remote stream location.
    #[must_use]
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Part label.
    #[must_use]
    pub fn part_number(&self) -> &str {
        &self.part_number
    }

    /// Chapter label.
    #[must_use]
    pub fn chapter_number(&self) -> &str {
        &self.chapter_number
    }
}

impl From<TrackRecord> for Track {
    fn from(record: TrackRecord) -> Self {
        Self::new(record.url, record.part_number, record.chapter_number)
    }
}

/// Ordered chapters of one work plus its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    title: String,
    file_stem: String,
    tracks: Vec<Track>,
    source: PlaylistSource,
    expires: Option<String>,
    playlist_token: Option<String>,
    downloaded_paths: Vec<PathBuf>,
}

impl Playlist {
    /// Creates a playlist; `tracks` keep their order.
    #[must_use]
    pub fn new(title: impl Into<String>, tracks: Vec<Track>, source: PlaylistSource) -> Self {
        let title = title.into();
        Self {
            file_stem: file_stem(&title),
            title,
            tracks,
            source,
            expires: None,
            playlist_token: None,
            downloaded_paths: Vec::new(),
        }
    }

    /// Single-track playlist over the free sample.
    #[must_use]
    pub fn preview(title: impl Into<String>, preview_url: impl Into<String>) -> Self {
        Self::new(title, vec![Track::preview(preview_url)], PlaylistSource::PreviewOnly)
    }

    fn from_response(title: String, response: PlaylistResponse, license: LicenseId) -> Self {
        let tracks = response.playlist.into_iter().map(Track::from).collect();
        let mut playlist = Self::new(title, tracks, PlaylistSource::Premium(license));
        playlist.expires = response.expires;
        playlist.playlist_token = response.playlist_token;
        playlist
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Title with spaces replaced by underscores, used for file names.
    #[must_use]
    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    /// Tracks in chapter order.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Number of tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns true if the playlist has no tracks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Where the playlist came from.
    #[must_use]
    pub const fn source(&self) -> &PlaylistSource {
        &self.source
    }

    /// Returns true when only the preview is available.
    #[must_use]
    pub const fn is_preview(&self) -> bool {
        matches!(self.source, PlaylistSource::PreviewOnly)
    }

    /// Expiry reported by the service, if any.
    #[must_use]
    pub fn expires(&self) -> Option<&str> {
        self.expires.as_deref()
    }

    /// Playlist token reported by the service, if any.
    #[must_use]
    pub fn playlist_token(&self) -> Option<&str> {
        self.playlist_token.as_deref()
    }

    /// Local files produced so far, in track order.
    #[must_use]
    pub fn downloaded_paths(&self) -> &[PathBuf] {
        &self.downloaded_paths
    }

    /// Records a finished file. Ignored once every track has a path.
    pub(crate) fn record_download(&mut self, path: PathBuf) {
        if self.downloaded_paths.len() < self.tracks.len() {
            self.downloaded_paths.push(path);
        }
    }

    /// Local file name for `track`: `{file_stem}_{chapter}.{extension}`.
    #[must_use]
    pub fn file_name(&self, track: &Track, extension: &str) -> String {
        let chapter = track.chapter_number().replace(['/', '\\'], "_");
        format!("{}_{chapter}.{extension}", self.file_stem)
    }

    /// Full destination of `track` under `dir`.
    #[must_use]
    pub fn destination(&self, track: &Track, dir: &Path, extension: &str) -> PathBuf {
        dir.join(self.file_name(track, extension))
    }
}

/// Derives the display title from the content URL's last path segment.
///
/// Query and fragment are ignored, empty segments dropped, hyphens become
/// spaces. Returns `None` when the URL has no path segment at all.
#[must_use]
pub fn derive_title(content_url: &str) -> Option<String> {
    let without_query = content_url
        .split(['?', '#'])
        .next()
        .unwrap_or(content_url);
    without_query
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()
        .map(|segment| segment.replace('-', " "))
}

/// Turns a display title into a file name stem.
#[must_use]
pub fn file_stem(title: &str) -> String {
    title.replace(' ', "_")
}

/// Builds the playlist for `source`.
///
/// Premium sources POST the license id to `playlist_url`; preview sources
/// synthesize a single track over `preview_url` without any request.
///
/// # Errors
///
/// Returns [`Error::PlaylistRequestFailed`] if the premium request fails or
/// its body cannot be parsed.
pub async fn build_playlist(
    gateway: &Gateway,
    service: &ServiceConfig,
    title: &str,
    playlist_url: &str,
    preview_url: &str,
    source: &PlaylistSource,
) -> Result<Playlist> {
    let license = match source {
        PlaylistSource::PreviewOnly => {
            log::info!("Using preview playlist for \"{title}\"");
            return Ok(Playlist::preview(title, preview_url));
        }
        PlaylistSource::Premium(license) => license,
    };

    let body = serde_json::to_string(&PlaylistRequest {
        license_id: license.as_str(),
    })
    .map_err(|e| Error::PlaylistRequestFailed(e.to_string()))?;

    let text = gateway
        .post_keyed(playlist_url, &service.session_key, body)
        .await
        .map_err(|e| Error::PlaylistRequestFailed(e.to_string()))?;

    let response: PlaylistResponse = serde_json::from_str(&text)
        .map_err(|e| Error::PlaylistRequestFailed(format!("unexpected playlist body: {e}")))?;

    let playlist = Playlist::from_response(title.to_string(), response, license.clone());
    log::info!("Playlist for \"{title}\" has {} tracks", playlist.len());
    Ok(playlist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::http::SESSION_KEY_HEADER;
    use proptest::prelude::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn title_from_trailing_slash_url() {
        let title = derive_title("https://x.com/123456789/My-Great-Book/").unwrap();
        assert_eq!(title, "My Great Book");
        assert_eq!(file_stem(&title), "My_Great_Book");
    }

    #[test]
    fn title_ignores_query_and_fragment() {
        assert_eq!(
            derive_title("https://x.com/audiobook/123456789/Dune?ref=home#top").as_deref(),
            Some("Dune")
        );
    }

    #[test]
    fn title_of_bare_slashes_is_none() {
        assert_eq!(derive_title("///"), None);
    }

    #[test]
    fn preview_playlist_shape() {
        let playlist = Playlist::preview("Dune", "https://s.example.com/123456/p.mp3");
        assert!(playlist.is_preview());
        assert_eq!(playlist.len(), 1);
        let track = &playlist.tracks()[0];
        assert_eq!(track.stream_url(), "https://s.example.com/123456/p.mp3");
        assert_eq!(track.part_number(), PREVIEW_LABEL);
        assert_eq!(track.chapter_number(), PREVIEW_LABEL);
        assert_eq!(playlist.file_name(track, "mp3"), "Dune_preview.mp3");
    }

    #[test]
    fn file_name_neutralizes_separators() {
        let playlist = Playlist::preview("A B", "u");
        let track = Track::new("u", "1", "1/2");
        assert_eq!(playlist.file_name(&track, "mp3"), "A_B_1_2.mp3");
    }

    #[test]
    fn downloaded_paths_never_exceed_tracks() {
        let mut playlist = Playlist::preview("T", "u");
        playlist.record_download(PathBuf::from("a"));
        playlist.record_download(PathBuf::from("b"));
        assert_eq!(playlist.downloaded_paths(), &[PathBuf::from("a")]);
    }

    #[tokio::test]
    async fn preview_source_makes_no_request() {
        let gateway = Gateway::new(&HttpConfig::default()).unwrap();
        let playlist = build_playlist(
            &gateway,
            &ServiceConfig::default(),
            "Dune",
            "http://127.0.0.1:1/never",
            "https://s.example.com/123456/p.mp3",
            &PlaylistSource::PreviewOnly,
        )
        .await
        .unwrap();
        assert_eq!(playlist.tracks()[0].chapter_number(), PREVIEW_LABEL);
    }

    #[tokio::test]
    async fn premium_playlist_preserves_server_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/audiobooks/123456/playlists"))
            .and(header(SESSION_KEY_HEADER, "k"))
            .and(body_string(r#"{"license_id":"lic-1"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"playlist":[
                    {"url":"https://cdn/3.mp3","part_number":1,"chapter_number":3},
                    {"url":"https://cdn/1.mp3","part_number":1,"chapter_number":1},
                    {"url":"https://cdn/2.mp3","part_number":2,"chapter_number":2}
                ],"expires":1700000000,"playlist_token":"tok"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = Gateway::new(&HttpConfig::default()).unwrap();
        let service = ServiceConfig::default().with_session_key("k");
        let playlist = build_playlist(
            &gateway,
            &service,
            "Dune",
            &format!("{}/v4/audiobooks/123456/playlists", server.uri()),
            "unused",
            &PlaylistSource::Premium(LicenseId::new("lic-1")),
        )
        .await
        .unwrap();

        let chapters: Vec<_> = playlist.tracks().iter().map(Track::chapter_number).collect();
        assert_eq!(chapters, ["3", "1", "2"]);
        assert_eq!(playlist.tracks()[0].stream_url(), "https://cdn/3.mp3");
        assert_eq!(playlist.expires(), Some("1700000000"));
        assert_eq!(playlist.playlist_token(), Some("tok"));
        assert!(playlist.source().is_premium());
    }

    #[tokio::test]
    async fn premium_request_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let gateway = Gateway::new(&HttpConfig::default()).unwrap();
        let err = build_playlist(
            &gateway,
            &ServiceConfig::default(),
            "Dune",
            &format!("{}/v4/audiobooks/1/playlists", server.uri()),
            "unused",
            &PlaylistSource::Premium(LicenseId::new("x")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::PlaylistRequestFailed(_)));
    }

    #[tokio::test]
    async fn premium_unparseable_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"tracks":[]}"#))
            .mount(&server)
            .await;

        let gateway = Gateway::new(&HttpConfig::default()).unwrap();
        let err = build_playlist(
            &gateway,
            &ServiceConfig::default(),
            "Dune",
            &format!("{}/v4/audiobooks/1/playlists", server.uri()),
            "unused",
            &PlaylistSource::Premium(LicenseId::new("x")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::PlaylistRequestFailed(_)));
    }

    proptest! {
        #[test]
        fn title_derivation_is_stable(words in proptest::collection::vec("[A-Za-z]{1,8}", 1..5), trailing in proptest::bool::ANY) {
            let slug = words.join("-");
            let url = format!("https://x.com/audiobook/123456789/{slug}{}", if trailing { "/" } else { "" });
            let title = derive_title(&url).unwrap();
            prop_assert_eq!(&title, &words.join(" "));
            prop_assert_eq!(file_stem(&title), words.join("_"));
            prop_assert_eq!(file_stem(&file_stem(&title)), file_stem(&title));
        }
    }
}
