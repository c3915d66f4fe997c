//! Integration test: extractor strategies, fetcher and HTTP object store
//! against a local HTTP server.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::media_server::{self, Route};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use vidq_core::downloader::{CurlFetcher, FetchRequest, FetchSettings, MediaFetcher};
use vidq_core::error::JobError;
use vidq_core::http::HttpSettings;
use vidq_core::resolver::{DirectProbe, Extractor, ExtractorSettings, PageScrape, ResolveStrategy, ResolveTarget};
use vidq_core::storage::{HttpObjectStore, ObjectStore, PutObject};

fn mp4_like(len: usize) -> Vec<u8> {
    let mut body = vec![0, 0, 0, 0x20];
    body.extend_from_slice(b"ftypisom");
    body.resize(len, 0x33);
    body
}

fn fetcher() -> CurlFetcher {
    CurlFetcher::new(FetchSettings {
        http: HttpSettings::default(),
        transfer_timeout: Duration::from_secs(10),
        min_file_size: 1000,
    })
}

fn target(page_url: String) -> ResolveTarget {
    ResolveTarget {
        video_id: 1,
        external_id: "7301".into(),
        page_url,
    }
}

const PAGE: &str = r#"<html><body>
<div class="player"><video autoplay src="/media/clip.mp4"></video></div>
</body></html>"#;

#[tokio::test]
async fn fetch_streams_body_to_dest() {
    let body = mp4_like(256 * 1024);
    let server = media_server::start(vec![("/clip.mp4", Route::ok("video/mp4", body.clone()))]);
    let dir = tempdir().unwrap();
    let dest = dir.path().join("download.tmp");

    let req = FetchRequest {
        url: server.url("/clip.mp4"),
        headers: BTreeMap::new(),
        dest: dest.clone(),
    };
    let fetched = fetcher().fetch(&req, &CancellationToken::new()).await.unwrap();
    assert_eq!(fetched.bytes, body.len() as u64);
    assert_eq!(fetched.content_type.as_deref(), Some("video/mp4"));
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn undersized_payload_is_rejected_without_leftovers() {
    let server = media_server::start(vec![("/stub.mp4", Route::ok("video/mp4", vec![1u8; 100]))]);
    let dir = tempdir().unwrap();
    let dest = dir.path().join("download.tmp");

    let req = FetchRequest {
        url: server.url("/stub.mp4"),
        headers: BTreeMap::new(),
        dest: dest.clone(),
    };
    let err = fetcher().fetch(&req, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, JobError::TransferFailed(_)), "{err}");
    assert!(err.to_string().contains("too small"), "{err}");
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn http_error_status_is_transfer_failed() {
    let server = media_server::start(vec![("/gone.mp4", Route::status(403))]);
    let dir = tempdir().unwrap();
    let dest = dir.path().join("download.tmp");

    let req = FetchRequest {
        url: server.url("/gone.mp4"),
        headers: BTreeMap::new(),
        dest: dest.clone(),
    };
    let err = fetcher().fetch(&req, &CancellationToken::new()).await.unwrap_err();
    assert!(err.to_string().starts_with("TransferFailed"), "{err}");
    assert!(err.to_string().contains("403"), "{err}");
    assert!(!dest.exists());
}

#[tokio::test]
async fn direct_probe_accepts_only_video_responses() {
    let server = media_server::start(vec![
        ("/clip.mp4", Route::ok("video/mp4", mp4_like(4096))),
        ("/page", Route::ok("text/html", PAGE)),
    ]);
    let probe = DirectProbe::new(HttpSettings::default(), Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let hit = probe
        .resolve(&target(server.url("/clip.mp4")), &cancel)
        .await
        .unwrap()
        .expect("video content type is a direct url");
    assert_eq!(hit.url, server.url("/clip.mp4"));
    assert_eq!(hit.meta.content_type.as_deref(), Some("video/mp4"));
    assert_eq!(hit.meta.content_length, Some(4096));

    let miss = probe.resolve(&target(server.url("/page")), &cancel).await.unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn page_scrape_finds_video_element() {
    let server = media_server::start(vec![("/page", Route::ok("text/html", PAGE))]);
    let scrape = PageScrape::new(HttpSettings::default(), Duration::from_secs(5));

    let hit = scrape
        .resolve(&target(server.url("/page")), &CancellationToken::new())
        .await
        .unwrap()
        .expect("video element found");
    assert_eq!(hit.url, server.url("/media/clip.mp4"));
    assert_eq!(hit.meta.headers.get("Referer"), Some(&server.url("/page")));
}

#[tokio::test]
async fn default_chain_falls_through_to_page_scrape() {
    let server = media_server::start(vec![("/page", Route::ok("text/html", PAGE))]);
    let extractor = Extractor::with_defaults(&ExtractorSettings {
        http: HttpSettings::default(),
        budget: Duration::from_secs(10),
        har_capture_dir: None,
        har_include_cookies: false,
    });

    let media = extractor
        .resolve(&target(server.url("/page")), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(media.url, server.url("/media/clip.mp4"));
    assert_eq!(media.meta.source.as_deref(), Some("page_scrape"));
}

#[tokio::test]
async fn missing_page_is_resolution_failed() {
    let server = media_server::start(vec![]);
    let extractor = Extractor::with_defaults(&ExtractorSettings {
        http: HttpSettings::default(),
        budget: Duration::from_secs(10),
        har_capture_dir: None,
        har_include_cookies: false,
    });

    let err = extractor
        .resolve(&target(server.url("/nothing")), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ResolutionFailed");
    assert!(err.to_string().contains("page_scrape"), "{err}");
}

#[tokio::test]
async fn http_store_puts_object_with_bearer_token() {
    let server = media_server::start(vec![]);
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.tmp");
    let body = mp4_like(3000);
    std::fs::write(&path, &body).unwrap();

    let store = HttpObjectStore::new(
        server.url("/v1"),
        "videos",
        Some("s3cret".into()),
        HttpSettings::default(),
        Duration::from_secs(10),
    );
    let stored = store
        .put_object(
            PutObject {
                key: "videos/7301/7301_1-1.mp4",
                path: &path,
                content_type: "video/mp4",
                len: body.len() as u64,
                sha256: "00",
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(stored.etag.as_deref(), Some("stub-etag"));

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path, "/v1/object/videos/videos/7301/7301_1-1.mp4");
    assert_eq!(received[0].body, body);
    assert_eq!(received[0].headers.get("authorization").map(String::as_str), Some("Bearer s3cret"));
    assert_eq!(received[0].headers.get("content-type").map(String::as_str), Some("video/mp4"));
}

#[tokio::test]
async fn http_store_rejection_is_storage_failed() {
    let server = media_server::start(vec![("/v1/object/videos/k.mp4", Route::status(403))]);
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.tmp");
    std::fs::write(&path, mp4_like(2000)).unwrap();

    let store = HttpObjectStore::new(
        server.url("/v1"),
        "videos",
        None,
        HttpSettings::default(),
        Duration::from_secs(10),
    );
    let err = store
        .put_object(
            PutObject {
                key: "k.mp4",
                path: &path,
                content_type: "video/mp4",
                len: 2000,
                sha256: "00",
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "StorageFailed");
    assert!(err.to_string().contains("403"), "{err}");
}
