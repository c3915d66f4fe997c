//! Pick the media response out of a HAR capture of a video page.

use anyhow::{Context, Result};
use std::path::Path;

use crate::queue_db::MediaMeta;
use crate::resolver::scan::{find_media_url_in_json, is_video_content_type, looks_like_media_url};
use crate::resolver::ResolvedMedia;

use super::parse::{HarEntry, HarHeader, HarLog};

/// Request headers replayed when fetching the chosen URL.
const REPLAY_HEADERS: &[&str] = &["Referer", "User-Agent", "Origin"];

/// Resolves a HAR capture to a direct media URL (and the headers to replay).
///
/// Prefers a response that is itself media: `video/*` content type, or a
/// request URL that looks like a media stream, with a successful status.
/// Among those, video content types win, then responses with a known size,
/// then the latest entry. Otherwise falls back to JSON responses whose body
/// embeds a media URL. `Ok(None)` when the capture holds neither.
///
/// If `include_cookies` is true, the `Cookie` header from the chosen request
/// is included (for cookie-based CDN auth).
pub fn resolve_har(path: &Path, include_cookies: bool) -> Result<Option<ResolvedMedia>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read HAR file: {}", path.display()))?;
    let har: HarLog = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse HAR JSON: {}", path.display()))?;
    let entries = har.log.entries;

    if let Some(i) = select_media_entry(&entries) {
        let entry = &entries[i];
        let content_type = response_content_type(entry);
        let meta = MediaMeta {
            content_type: content_type.filter(|ct| is_video_content_type(ct)),
            content_length: get_header(&entry.response.headers, "Content-Length")
                .and_then(|v| v.trim().parse().ok()),
            source: Some("har_capture".to_string()),
            headers: replay_headers(&entry.request.headers, include_cookies),
            ..MediaMeta::default()
        };
        return Ok(Some(ResolvedMedia {
            url: entry.request.url.clone(),
            meta,
        }));
    }

    for entry in entries.iter().rev() {
        let Some(url) = json_embedded_url(entry) else {
            continue;
        };
        let mut meta = MediaMeta {
            source: Some("har_json".to_string()),
            headers: replay_headers(&entry.request.headers, include_cookies),
            ..MediaMeta::default()
        };
        meta.extra
            .insert("original_response".to_string(), entry.request.url.clone());
        return Ok(Some(ResolvedMedia { url, meta }));
    }

    Ok(None)
}

fn response_content_type(entry: &HarEntry) -> Option<String> {
    get_header(&entry.response.headers, "Content-Type")
        .map(str::to_string)
        .or_else(|| entry.response.content.as_ref().and_then(|c| c.mime_type.clone()))
}

/// True if the response is a successful media payload.
fn response_looks_like_media(entry: &HarEntry) -> bool {
    let status = entry.response.status;
    if status != 200 && status != 206 {
        return false;
    }
    response_content_type(entry)
        .map(|ct| is_video_content_type(&ct))
        .unwrap_or(false)
        || looks_like_media_url(&entry.request.url)
}

/// Prefer a video content type; then a known Content-Length; then later index.
fn media_entry_score(entry: &HarEntry, index: usize) -> (bool, bool, usize) {
    let video_type = response_content_type(entry)
        .map(|ct| is_video_content_type(&ct))
        .unwrap_or(false);
    (
        video_type,
        get_header(&entry.response.headers, "Content-Length").is_some(),
        index,
    )
}

/// Best entry that looks like media, or None if none match.
fn select_media_entry(entries: &[HarEntry]) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| response_looks_like_media(e))
        .max_by_key(|(i, e)| media_entry_score(e, *i))
        .map(|(i, _)| i)
}

/// Media URL embedded in a JSON response body, if the capture kept the body.
fn json_embedded_url(entry: &HarEntry) -> Option<String> {
    let content = entry.response.content.as_ref()?;
    let is_json = content
        .mime_type
        .as_deref()
        .map(|m| m.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);
    if !is_json || content.encoding.as_deref() == Some("base64") {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(content.text.as_deref()?).ok()?;
    find_media_url_in_json(&value)
}

fn replay_headers(
    headers: &[HarHeader],
    include_cookies: bool,
) -> std::collections::BTreeMap<String, String> {
    let mut out = std::collections::BTreeMap::new();
    for name in REPLAY_HEADERS {
        if let Some(v) = get_header(headers, name).filter(|v| !v.is_empty()) {
            out.insert(name.to_string(), v.to_string());
        }
    }
    if include_cookies {
        if let Some(cookie) = get_header(headers, "Cookie").filter(|v| !v.is_empty()) {
            out.insert("Cookie".to_string(), cookie.to_string());
        }
    }
    out
}

fn get_header<'a>(headers: &'a [HarHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}
