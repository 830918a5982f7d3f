//! Identifier resolution: content URL → content id, preview URL, work id, author id.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::http::Gateway;

static CONTENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{9}").expect("valid regex"));

static WORK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{5,6}").expect("valid regex"));

static AUTHOR_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{8}").expect("valid regex"));

const PUSH_STATE_ATTR: &str = "data-push_state";

/// Everything the landing page and URL tell us about a work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifiers {
    /// 9-digit platform id from the content URL.
    pub content_id: String,
    /// Free sample stream.
    pub preview_url: String,
    /// Work id inside the licensing service.
    pub work_id: String,
    /// Premium account id; `None` means only the preview is available.
    pub author_id: Option<String>,
}

/// The page-derived part of [`Identifiers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageIdentifiers {
    /// Free sample stream.
    pub preview_url: String,
    /// Work id inside the licensing service.
    pub work_id: String,
    /// Premium account id, if the page exposes one.
    pub author_id: Option<String>,
}

#[derive(Deserialize)]
struct PushState {
    audiobook_sample_url: Option<String>,
}

/// Extracts the first 9-digit run from the content URL.
///
/// # Errors
///
/// Returns [`Error::IdentifierNotFound`] when there is none.
pub fn extract_content_id(content_url: &str) -> Result<String> {
    CONTENT_ID_RE
        .find(content_url)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::IdentifierNotFound {
            url: content_url.to_string(),
        })
}

/// Pulls the preview URL, work id and author id out of the landing page HTML.
///
/// # Errors
///
/// Returns [`Error::PageStructure`] if the preview container, its JSON
/// payload, the sample URL, or the work id inside it is missing.
pub fn scrape_landing_page(html: &str) -> Result<PageIdentifiers> {
    let document = Html::parse_document(html);
    let preview_sel =
        Selector::parse(r#"div[data-track_category="book_preview"]"#).expect("valid selector");
    let script_sel = Selector::parse(r#"script[type="text/javascript"]"#).expect("valid selector");

    let container = document
        .select(&preview_sel)
        .next()
        .ok_or_else(|| Error::PageStructure("book preview container not found".to_string()))?;
    let payload = container.value().attr(PUSH_STATE_ATTR).ok_or_else(|| {
        Error::PageStructure(format!("preview container has no {PUSH_STATE_ATTR} attribute"))
    })?;
    let state: PushState = serde_json::from_str(payload)
        .map_err(|e| Error::PageStructure(format!("preview data is not valid JSON: {e}")))?;
    let preview_url = state
        .audiobook_sample_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::PageStructure("preview data has no sample URL".to_string()))?;

    let work_id = WORK_ID_RE
        .find(&preview_url)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            Error::PageStructure(format!("no work id in sample URL {preview_url}"))
        })?;

    // Best effort: the account marker only shows up for premium sessions.
    let author_id = document.select(&script_sel).last().and_then(|script| {
        let code: String = script.text().collect();
        AUTHOR_ID_RE.find(&code).map(|m| m.as_str().to_string())
    });

    Ok(PageIdentifiers {
        preview_url,
        work_id,
        author_id,
    })
}

/// Resolves a content URL into [`Identifiers`] with one credentialed page fetch.
///
/// # Errors
///
/// Returns [`Error::IdentifierNotFound`] before any network access if the URL
/// has no content id, [`Error::Transport`] if the page cannot be fetched, and
/// [`Error::PageStructure`] if the page lacks the preview data.
pub async fn resolve(
    gateway: &Gateway,
    content_url: &str,
    credentials: &Credentials,
) -> Result<Identifiers> {
    let content_id = extract_content_id(content_url)?;
    log::info!("Resolving content {content_id}");

    let html = gateway.fetch_page(content_url, credentials).await?;
    let page = scrape_landing_page(&html)?;

    match &page.author_id {
        Some(author) => log::info!("Work {} (account {author})", page.work_id),
        None => log::info!("Work {} (no account marker, preview only)", page.work_id),
    }

    Ok(Identifiers {
        content_id,
        preview_url: page.preview_url,
        work_id: page.work_id,
        author_id: page.author_id,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Builds a landing page with the given push-state JSON and script blocks.
    pub(crate) fn landing_page(push_state: &str, scripts: &[&str]) -> String {
        let escaped = push_state.replace('"', "&quot;");
        let scripts: String = scripts
            .iter()
            .map(|s| format!(r#"<script type="text/javascript">{s}</script>"#))
            .collect();
        format!(
            r#"<html><head><title>Book</title></head><body>
            <div class="preview" data-track_category="book_preview" data-push_state="{escaped}"></div>
            <script type="application/ld+json">{{"id": 99999999}}</script>
            {scripts}
            </body></html>"#
        )
    }

    const SAMPLE: &str =
        r#"{"audiobook_sample_url":"https://samples.example.com/123456/sample.mp3"}"#;

    #[test]
    fn content_id_is_first_nine_digit_run() {
        assert_eq!(
            extract_content_id("https://www.scribd.com/audiobook/500123456/My-Great-Book").unwrap(),
            "500123456"
        );
    }

    #[test]
    fn content_id_missing() {
        let err = extract_content_id("https://www.scribd.com/audiobook/1234/Short").unwrap_err();
        assert!(matches!(err, Error::IdentifierNotFound { .. }));
    }

    #[test]
    fn scrapes_preview_work_and_author() {
        let html = landing_page(SAMPLE, &["var a = 1;", "window.user = {id: 12345678};"]);
        let page = scrape_landing_page(&html).unwrap();
        assert_eq!(page.preview_url, "https://samples.example.com/123456/sample.mp3");
        assert_eq!(page.work_id, "123456");
        assert_eq!(page.author_id.as_deref(), Some("12345678"));
    }

    #[test]
    fn author_comes_from_last_script_only() {
        let html = landing_page(SAMPLE, &["var first = 87654321;", "var last = 'none';"]);
        let page = scrape_landing_page(&html).unwrap();
        assert_eq!(page.author_id, None);
    }

    #[test]
    fn no_scripts_means_no_author() {
        let html = landing_page(SAMPLE, &[]);
        assert_eq!(scrape_landing_page(&html).unwrap().author_id, None);
    }

    #[test]
    fn missing_container_is_page_structure_error() {
        let err = scrape_landing_page("<html><body><div></div></body></html>").unwrap_err();
        assert!(matches!(err, Error::PageStructure(_)));
    }

    #[test]
    fn malformed_json_is_page_structure_error() {
        let html = landing_page("{not json", &[]);
        assert!(matches!(
            scrape_landing_page(&html),
            Err(Error::PageStructure(_))
        ));
    }

    #[test]
    fn missing_sample_url_is_page_structure_error() {
        let html = landing_page(r#"{"other":"value"}"#, &[]);
        assert!(matches!(
            scrape_landing_page(&html),
            Err(Error::PageStructure(_))
        ));
    }

    #[test]
    fn sample_url_without_work_id_is_page_structure_error() {
        let html = landing_page(r#"{"audiobook_sample_url":"https://x.com/abc.mp3"}"#, &[]);
        assert!(matches!(
            scrape_landing_page(&html),
            Err(Error::PageStructure(_))
        ));
    }

    proptest! {
        #[test]
        fn extracts_embedded_nine_digit_id(id in 100_000_000u32..999_999_999, slug in "[A-Za-z-]{1,20}") {
            let url = format!("https://www.scribd.com/audiobook/{id}/{slug}");
            prop_assert_eq!(extract_content_id(&url).unwrap(), id.to_string());
        }

        #[test]
        fn urls_without_long_runs_fail(slug in "[A-Za-z/-]{0,30}", n in 0u32..99_999_999) {
            let url = format!("https://example.com/{slug}/{n}");
            prop_assert!(extract_content_id(&url).is_err());
        }
    }
}
