//! HTTP HEAD probing.
//!
//! Uses the curl crate (libcurl) to learn what a URL serves before the
//! worker commits to downloading it: content type, size hint and ETag of
//! the final response after redirects.

mod parse;

pub(crate) use parse::parse_headers;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::str;
use std::time::Duration;

use curl::easy::Easy;
use tokio_util::sync::CancellationToken;

use crate::http::{self, HttpSettings};

/// Result of a HEAD request.
#[derive(Debug, Clone, Default)]
pub struct HeadResult {
    pub status: u32,
    /// `Content-Type` of the final response, if present.
    pub content_type: Option<String>,
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    /// URL after following redirects.
    pub effective_url: Option<String>,
}

impl HeadResult {
    /// True when the server says it is serving video bytes.
    pub fn is_video(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("video/"))
            .unwrap_or(false)
    }
}

/// Performs a HEAD request and returns parsed metadata.
///
/// Follows redirects. Non-2xx final responses are errors.
/// Runs in the current thread; call from `spawn_blocking` if used from async code.
pub fn probe(
    url: &str,
    headers: &BTreeMap<String, String>,
    settings: &HttpSettings,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<HeadResult> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = Easy::new();
    http::prepare(&mut easy, url, headers, settings, timeout)?;
    easy.nobody(true)?;
    http::enable_progress(&mut easy)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.progress_function(|_, _, _, _| http::keep_going(cancel))?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }

    let mut result = parse::parse_headers(&lines);
    result.status = code;
    result.effective_url = easy.effective_url().ok().flatten().map(str::to_string);
    Ok(result)
}
