//! HAR (HTTP Archive) capture strategy.
//!
//! A browser capture of the video page, saved as `<dir>/<external_id>.har`,
//! records the media request the player made. When such a file exists the
//! worker takes the URL (and the request headers the CDN expects) from it.

mod parse;
mod resolve;

pub use resolve::resolve_har;

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::{blocking, ResolveStrategy, ResolveTarget, ResolvedMedia};

pub struct HarCapture {
    dir: PathBuf,
    include_cookies: bool,
}

impl HarCapture {
    pub fn new(dir: PathBuf, include_cookies: bool) -> Self {
        HarCapture {
            dir,
            include_cookies,
        }
    }

    /// Capture file for a video; path separators in the id are neutralized.
    pub fn capture_path(&self, external_id: &str) -> PathBuf {
        let name: String = external_id
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
            .collect();
        self.dir.join(format!("{name}.har"))
    }
}

#[async_trait]
impl ResolveStrategy for HarCapture {
    fn name(&self) -> &'static str {
        "har_capture"
    }

    async fn resolve(
        &self,
        target: &ResolveTarget,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Option<ResolvedMedia>> {
        let path = self.capture_path(&target.external_id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        let include_cookies = self.include_cookies;
        blocking(move || resolve_har(&path, include_cookies)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn har_file(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn picks_video_response_over_page_and_images() {
        let f = har_file(
            r#"{
            "log": {
                "version": "1.2",
                "entries": [
                    {
                        "request": { "url": "https://www.example.com/video/7301", "headers": [] },
                        "response": { "status": 200, "headers": [ { "name": "Content-Type", "value": "text/html" } ] }
                    },
                    {
                        "request": {
                            "url": "https://v.example.com/obj/abc?sig=1",
                            "headers": [
                                { "name": "Referer", "value": "https://www.example.com/" },
                                { "name": "Cookie", "value": "sid=1" }
                            ]
                        },
                        "response": {
                            "status": 206,
                            "headers": [
                                { "name": "Content-Type", "value": "video/mp4" },
                                { "name": "Content-Length", "value": "2097152" }
                            ]
                        }
                    },
                    {
                        "request": { "url": "https://p.example.com/cover.jpeg", "headers": [] },
                        "response": { "status": 200, "headers": [ { "name": "Content-Type", "value": "image/jpeg" } ] }
                    }
                ]
            }
        }"#,
        );
        let media = resolve_har(f.path(), false).unwrap().unwrap();
        assert_eq!(media.url, "https://v.example.com/obj/abc?sig=1");
        assert_eq!(media.meta.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(media.meta.content_length, Some(2_097_152));
        assert_eq!(
            media.meta.headers.get("Referer").map(String::as_str),
            Some("https://www.example.com/")
        );
        assert!(!media.meta.headers.contains_key("Cookie"));
    }

    #[test]
    fn include_cookies_replays_cookie() {
        let f = har_file(
            r#"{"log":{"entries":[{
                "request": { "url": "https://cdn.example.com/a.mp4", "headers": [ { "name": "Cookie", "value": "sid=1" } ] },
                "response": { "status": 200, "headers": [] }
            }]}}"#,
        );
        let media = resolve_har(f.path(), true).unwrap().unwrap();
        assert_eq!(media.url, "https://cdn.example.com/a.mp4");
        assert_eq!(media.meta.headers.get("Cookie").map(String::as_str), Some("sid=1"));
    }

    #[test]
    fn falls_back_to_json_body() {
        let f = har_file(
            r#"{"log":{"entries":[{
                "request": { "url": "https://www.example.com/aweme/v1/detail?id=7301", "headers": [] },
                "response": {
                    "status": 200,
                    "headers": [],
                    "content": {
                        "mimeType": "application/json; charset=utf-8",
                        "text": "{\"video\":{\"play_addr\":{\"url_list\":[\"https://v.example.com/aweme/v1/play/?id=7301\"]}}}"
                    }
                }
            }]}}"#,
        );
        let media = resolve_har(f.path(), false).unwrap().unwrap();
        assert_eq!(media.url, "https://v.example.com/aweme/v1/play/?id=7301");
        assert_eq!(media.meta.source.as_deref(), Some("har_json"));
        assert_eq!(
            media.meta.extra.get("original_response").map(String::as_str),
            Some("https://www.example.com/aweme/v1/detail?id=7301")
        );
    }

    #[test]
    fn no_media_is_none_and_bad_json_is_err() {
        let f = har_file(r#"{"log":{"version":"1.2","entries":[]}}"#);
        assert!(resolve_har(f.path(), false).unwrap().is_none());
        let f = har_file("not json");
        assert!(resolve_har(f.path(), false).is_err());
    }

    #[test]
    fn failed_media_response_is_skipped() {
        let f = har_file(
            r#"{"log":{"entries":[{
                "request": { "url": "https://cdn.example.com/a.mp4", "headers": [] },
                "response": { "status": 403, "headers": [] }
            }]}}"#,
        );
        assert!(resolve_har(f.path(), false).unwrap().is_none());
    }

    #[tokio::test]
    async fn strategy_skips_missing_capture() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = HarCapture::new(dir.path().to_path_buf(), false);
        let target = ResolveTarget {
            video_id: 1,
            external_id: "7301".into(),
            page_url: "https://www.example.com/video/7301".into(),
        };
        let cancel = CancellationToken::new();
        assert!(strategy.resolve(&target, &cancel).await.unwrap().is_none());

        std::fs::write(
            dir.path().join("7301.har"),
            r#"{"log":{"entries":[{"request":{"url":"https://cdn.example.com/7301.mp4"},"response":{"status":200}}]}}"#,
        )
        .unwrap();
        let media = strategy.resolve(&target, &cancel).await.unwrap().unwrap();
        assert_eq!(media.url, "https://cdn.example.com/7301.mp4");
    }

    #[test]
    fn capture_path_neutralizes_separators() {
        let strategy = HarCapture::new(PathBuf::from("/captures"), false);
        assert_eq!(
            strategy.capture_path("../x/y"),
            PathBuf::from("/captures/.._x_y.har")
        );
    }
}
