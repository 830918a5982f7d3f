//! End-to-end acquisition against a mock platform and licensing service.

use std::sync::Arc;

use audiobook_dl::{
    AppConfig, Credentials, DownloadConfig, DownloadProgress, Downloader, Gateway, NoProgress,
    RetryConfig, ServiceConfig, Session,
};
use tempfile::TempDir;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTENT_PATH: &str = "/audiobook/500123456/Night-Train";

fn landing_page(with_account: bool) -> String {
    let account = if with_account {
        r#"<script type="text/javascript">window.Scribd.account = {"id": 87654321};</script>"#
    } else {
        ""
    };
    format!(
        r#"<html><body>
        <div data-track_category="book_preview"
             data-push_state="{{&quot;audiobook_sample_url&quot;:&quot;https://samples.example.com/654321/sample.mp3&quot;}}"></div>
        <script type="text/javascript">var loaded = true;</script>
        {account}
        </body></html>"#
    )
}

fn config(server: &MockServer, dir: &TempDir) -> AppConfig {
    AppConfig {
        service: ServiceConfig::default()
            .with_base_url(&server.uri())
            .with_session_key("integration-key"),
        download: DownloadConfig::default()
            .with_output_dir(dir.path())
            .with_concurrent_tracks(2)
            .with_retry(RetryConfig::disabled()),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn premium_book_is_downloaded_in_chapter_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENT_PATH))
        .and(header("cookie", "_session=premium"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page(true)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listen/500123456"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/accounts/scribd-87654321/audiobooks/654321"))
        .and(header("Session-Key", "integration-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"licenses":[{"id":991}]}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/audiobooks/654321/playlists"))
        .and(body_string(r#"{"license_id":"991"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"{{"playlist":[
                {{"url":"{0}/cdn/1.mp3","part_number":1,"chapter_number":1}},
                {{"url":"{0}/cdn/2.mp3","part_number":1,"chapter_number":2}},
                {{"url":"{0}/cdn/3.mp3","part_number":2,"chapter_number":3}}
            ],"expires":"2030-01-01T00:00:00Z","playlist_token":"t"}}"#,
            server.uri()
        )))
        .expect(1)
        .mount(&server)
        .await;
    for n in 1..=3 {
        Mock::given(method("GET"))
            .and(path(format!("/cdn/{n}.mp3")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'0' + n; 64]))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let config = config(&server, &dir);
    let gateway = Gateway::new(&config.http).unwrap();

    let mut session = Session::establish(
        &gateway,
        &config,
        &format!("{}{CONTENT_PATH}", server.uri()),
        Credentials::new().with_cookie("_session", "premium"),
    )
    .await
    .unwrap();

    assert_eq!(session.title(), "Night Train");
    assert_eq!(session.license_id().map(|l| l.as_str()), Some("991"));
    assert_eq!(session.playlist().expires(), Some("2030-01-01T00:00:00Z"));

    let downloader = Downloader::new(gateway, config.download.clone());
    let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
    let report = downloader
        .download_all(session.playlist_mut(), &progress)
        .await
        .unwrap();

    assert!(report.is_complete());
    let expected: Vec<_> = (1..=3)
        .map(|n| dir.path().join(format!("Night_Train_{n}.mp3")))
        .collect();
    assert_eq!(session.playlist().downloaded_paths(), expected.as_slice());
    for (n, file) in (1u8..).zip(&expected) {
        assert_eq!(std::fs::read(file).unwrap(), vec![b'0' + n; 64]);
    }
}

#[tokio::test]
async fn anonymous_visitor_gets_the_preview() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page(false)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = config(&server, &dir);
    let gateway = Gateway::new(&config.http).unwrap();

    let session = Session::establish(
        &gateway,
        &config,
        &format!("{}{CONTENT_PATH}", server.uri()),
        Credentials::new(),
    )
    .await
    .unwrap();

    assert!(session.playlist().is_preview());
    assert_eq!(session.work_id(), "654321");
    let track = &session.playlist().tracks()[0];
    assert_eq!(track.stream_url(), "https://samples.example.com/654321/sample.mp3");
    assert_eq!(
        session.playlist().file_name(track, "mp3"),
        "Night_Train_preview.mp3"
    );
}
