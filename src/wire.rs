//! JSON shapes exchanged with the licensing service.

use serde::{Deserialize, Deserializer, Serialize};

/// A JSON scalar that is carried around as an opaque string.
///
/// The service sends ids and chapter labels as numbers or strings depending
/// on the endpoint; neither is ever parsed downstream.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(s) => s,
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
        }
    }
}

fn opaque<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(String::from)
}

fn opaque_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Scalar>::deserialize(deserializer).map(|v| v.map(String::from))
}

/// Response of `GET /v4/accounts/{platform}-{author}/audiobooks/{work}`.
#[derive(Debug, Deserialize)]
pub struct LicenseResponse {
    /// License records; absent when the account holds none.
    #[serde(default)]
    pub licenses: Option<Vec<LicenseRecord>>,
}

/// One license record. Only the id is used.
#[derive(Debug, Deserialize)]
pub struct LicenseRecord {
    /// License identifier.
    #[serde(default, deserialize_with = "opaque_opt")]
    pub id: Option<String>,
}

/// Body of `POST /v4/audiobooks/{work}/playlists`.
#[derive(Debug, Serialize)]
pub struct PlaylistRequest<'a> {
    /// License that unlocks the full playlist.
    pub license_id: &'a str,
}

/// Response of the playlist endpoint.
#[derive(Debug, Deserialize)]
pub struct PlaylistResponse {
    /// Chapter descriptors in play order.
    pub playlist: Vec<TrackRecord>,
    /// Expiry of the signed stream URLs, passed through untouched.
    #[serde(default, deserialize_with = "opaque_opt")]
    pub expires: Option<String>,
    /// Token of this playlist issue, passed through untouched.
    #[serde(default, deserialize_with = "opaque_opt")]
    pub playlist_token: Option<String>,
}

/// One chapter descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackRecord {
    /// Stream location.
    pub url: String,
    /// Part label.
    #[serde(deserialize_with = "opaque")]
    pub part_number: String,
    /// Chapter label.
    #[serde(deserialize_with = "opaque")]
    pub chapter_number: String,
}
