//! Shared libcurl plumbing: default request headers, cancellation, small GETs.
//!
//! Every function here blocks; async callers go through `spawn_blocking`.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::str;
use std::time::Duration;

use curl::easy::{Easy, List};
use tokio_util::sync::CancellationToken;

/// Largest page body `get_text` keeps in memory.
pub const MAX_PAGE_BYTES: usize = 4 * 1024 * 1024;

/// Connection defaults applied to every request the worker makes.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub referer: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
            referer: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Build the curl header list: caller headers win over the defaults.
pub(crate) fn header_list(headers: &BTreeMap<String, String>, settings: &HttpSettings) -> Result<List> {
    let has = |name: &str| headers.keys().any(|k| k.trim().eq_ignore_ascii_case(name));

    let mut list = List::new();
    if !has("user-agent") {
        list.append(&format!("User-Agent: {}", settings.user_agent))?;
    }
    if let Some(referer) = settings.referer.as_deref().filter(|_| !has("referer")) {
        list.append(&format!("Referer: {referer}"))?;
    }
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    Ok(list)
}

/// Apply URL, redirects, timeouts and headers to a fresh handle.
pub(crate) fn prepare(
    easy: &mut Easy,
    url: &str,
    headers: &BTreeMap<String, String>,
    settings: &HttpSettings,
    timeout: Duration,
) -> Result<()> {
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(settings.connect_timeout)?;
    easy.timeout(timeout)?;
    easy.http_headers(header_list(headers, settings)?)?;
    Ok(())
}

/// Enable libcurl's progress callback so a cancelled token aborts the transfer.
pub(crate) fn enable_progress(easy: &mut Easy) -> Result<()> {
    easy.progress(true)?;
    Ok(())
}

/// True if the transfer should continue.
pub(crate) fn keep_going(cancel: &CancellationToken) -> bool {
    !cancel.is_cancelled()
}

/// Response of a small in-memory GET.
#[derive(Debug, Clone)]
pub struct TextResponse {
    pub status: u32,
    pub content_type: Option<String>,
    /// Final URL after redirects.
    pub effective_url: String,
    pub body: String,
}

/// GET `url` into memory (up to `MAX_PAGE_BYTES`, lossy UTF-8).
pub fn get_text(
    url: &str,
    headers: &BTreeMap<String, String>,
    settings: &HttpSettings,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TextResponse> {
    let mut body: Vec<u8> = Vec::new();
    let mut header_lines: Vec<String> = Vec::new();

    let mut easy = Easy::new();
    prepare(&mut easy, url, headers, settings, timeout)?;
    enable_progress(&mut easy)?;
    easy.accept_encoding("")?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                header_lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            if body.len() + data.len() > MAX_PAGE_BYTES {
                // Short write aborts the transfer.
                return Ok(0);
            }
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| keep_going(cancel))?;
        transfer
            .perform()
            .with_context(|| format!("GET {url} failed"))?;
    }

    let status = easy.response_code().context("no response code")?;
    let effective_url = easy
        .effective_url()
        .ok()
        .flatten()
        .unwrap_or(url)
        .to_string();
    Ok(TextResponse {
        status,
        content_type: crate::fetch_head::parse_headers(&header_lines).content_type,
        effective_url,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_strings(list: &List) -> Vec<String> {
        list.iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    #[test]
    fn defaults_are_added_unless_overridden() {
        let settings = HttpSettings {
            user_agent: "vidq-test".into(),
            referer: Some("https://www.example.com/".into()),
            connect_timeout: Duration::from_secs(1),
        };
        let none = BTreeMap::new();
        let lines = list_strings(&header_list(&none, &settings).unwrap());
        assert_eq!(
            lines,
            vec![
                "User-Agent: vidq-test".to_string(),
                "Referer: https://www.example.com/".to_string()
            ]
        );

        let mut custom = BTreeMap::new();
        custom.insert("referer".to_string(), "https://m.example.com/".to_string());
        let lines = list_strings(&header_list(&custom, &settings).unwrap());
        assert_eq!(
            lines,
            vec![
                "User-Agent: vidq-test".to_string(),
                "referer: https://m.example.com/".to_string()
            ]
        );
    }
}
