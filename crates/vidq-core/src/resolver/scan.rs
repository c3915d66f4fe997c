//! Heuristics for spotting direct media URLs in JSON and HTML.

use serde_json::Value;

/// True for absolute http(s) URLs that look like a media stream.
pub fn looks_like_media_url(s: &str) -> bool {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return false;
    }
    let path = lower.split(['?', '#']).next().unwrap_or("");
    path.ends_with(".mp4") || path.ends_with(".webm") || lower.contains("/play/")
}

/// True for content types the worker can store.
pub fn is_video_content_type(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("video/")
}

/// Depth-first walk of a JSON document for the first media-looking string.
pub fn find_media_url_in_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if looks_like_media_url(s) => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(find_media_url_in_json),
        Value::Object(map) => map.values().find_map(find_media_url_in_json),
        _ => None,
    }
}

/// Undo the escaping pages apply to URLs embedded in scripts and attributes.
pub fn unescape_url(s: &str) -> String {
    s.replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\u0026", "&")
        .replace("\\/", "/")
        .replace("&amp;", "&")
}

/// Resolve `candidate` against the page URL; absolute URLs pass through.
fn absolutize(candidate: &str, base: &str) -> Option<String> {
    let candidate = unescape_url(candidate.trim());
    if candidate.is_empty() || candidate.starts_with("blob:") || candidate.starts_with("data:") {
        return None;
    }
    let joined = match url::Url::parse(base) {
        Ok(base) => base.join(&candidate).ok()?,
        Err(_) => url::Url::parse(&candidate).ok()?,
    };
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// Value of attribute `name` inside one tag's text (`<video ...>`).
fn attr_value(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find(name) {
        let start = from + pos;
        from = start + name.len();
        // Must be a whole attribute name.
        let before_ok = start == 0
            || lower.as_bytes()[start - 1].is_ascii_whitespace();
        let rest = lower[from..].trim_start();
        if !before_ok || !rest.starts_with('=') {
            continue;
        }
        let value_start = tag.len() - rest.len() + 1;
        let raw = tag[value_start..].trim_start();
        let value = match raw.chars().next() {
            Some(q @ ('"' | '\'')) => raw[1..].split(q).next().unwrap_or(""),
            _ => raw.split(|c: char| c.is_whitespace() || c == '>').next().unwrap_or(""),
        };
        return Some(value.to_string());
    }
    None
}

/// `src` of the first `<video>` element (or its first `<source>` child).
pub fn find_video_src(html: &str, base: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("<video") {
        let start = from + pos;
        let tag_end = start + lower[start..].find('>')?;
        let tag = &html[start..=tag_end];
        if let Some(url) = attr_value(tag, "src").and_then(|s| absolutize(&s, base)) {
            return Some(url);
        }
        let close = lower[tag_end..]
            .find("</video")
            .map(|p| tag_end + p)
            .unwrap_or(lower.len());
        let mut inner = tag_end;
        while let Some(p) = lower[inner..close].find("<source") {
            let s_start = inner + p;
            let s_end = s_start + lower[s_start..].find('>')?;
            if let Some(url) = attr_value(&html[s_start..=s_end], "src").and_then(|s| absolutize(&s, base)) {
                return Some(url);
            }
            if s_end >= close {
                break;
            }
            inner = s_end;
        }
        from = tag_end;
    }
    None
}

/// Inner text of every `<script>` element.
fn script_bodies(html: &str) -> Vec<&str> {
    let lower = html.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("<script") {
        let start = from + pos;
        let Some(open_end) = lower[start..].find('>').map(|p| start + p + 1) else {
            break;
        };
        let Some(close) = lower[open_end..].find("</script").map(|p| open_end + p) else {
            break;
        };
        out.push(&html[open_end..close]);
        from = close;
    }
    out
}

/// Parse a script body as JSON, either bare or as `name = {...};`.
fn script_json(body: &str) -> Option<Value> {
    let trimmed = body.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

/// First media URL inside any JSON embedded in a script block.
pub fn find_in_script_json(html: &str) -> Option<String> {
    script_bodies(html)
        .into_iter()
        .filter_map(script_json)
        .find_map(|v| find_media_url_in_json(&v))
}

/// First media-looking absolute URL anywhere in the text, after unescaping.
pub fn find_quoted_media_url(text: &str) -> Option<String> {
    let unescaped = unescape_url(text);
    let mut from = 0;
    while let Some(pos) = unescaped[from..].find("http") {
        let start = from + pos;
        let end = unescaped[start..]
            .find(|c: char| matches!(c, '"' | '\'' | '<' | '>' | '\\' | '`') || c.is_whitespace())
            .map(|p| start + p)
            .unwrap_or(unescaped.len());
        let candidate = &unescaped[start..end];
        if looks_like_media_url(candidate) {
            return Some(candidate.to_string());
        }
        from = start + 4;
    }
    None
}

/// Where in a page a media URL was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageHit {
    VideoElement,
    ScriptJson,
    Quoted,
}

impl PageHit {
    pub fn as_str(self) -> &'static str {
        match self {
            PageHit::VideoElement => "video_element",
            PageHit::ScriptJson => "json",
            PageHit::Quoted => "page_text",
        }
    }
}

/// Scan a page: `<video src>`, then embedded JSON, then any quoted media URL.
pub fn find_in_html(html: &str, base: &str) -> Option<(String, PageHit)> {
    if let Some(u) = find_video_src(html, base) {
        return Some((u, PageHit::VideoElement));
    }
    if let Some(u) = find_in_script_json(html) {
        return Some((u, PageHit::ScriptJson));
    }
    find_quoted_media_url(html).map(|u| (u, PageHit::Quoted))
}
