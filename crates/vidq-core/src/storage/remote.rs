//! HTTP object store: `PUT {endpoint}/object/{bucket}/{key}` with a bearer token.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use curl::easy::{Easy, ReadError};

use super::{ObjectStore, PutObject, StoredObject};
use crate::error::{JobError, Stage};
use crate::fetch_head::parse_headers;
use crate::http::{self, HttpSettings};

/// How much of an error response body ends up in the diagnostic.
const ERROR_BODY_MAX: usize = 200;

pub struct HttpObjectStore {
    endpoint: String,
    bucket: String,
    token: Option<String>,
    http: HttpSettings,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        token: Option<String>,
        http: HttpSettings,
        timeout: Duration,
    ) -> Self {
        HttpObjectStore {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            token,
            http,
            timeout,
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn provider(&self) -> &str {
        "http"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, obj: PutObject<'_>, cancel: &CancellationToken) -> Result<StoredObject, JobError> {
        let url = self.object_url(obj.key);
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), obj.content_type.to_string());
        if let Some(token) = &self.token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        let path = obj.path.to_path_buf();
        let len = obj.len;
        let settings = self.http.clone();
        let timeout = self.timeout;
        let token = cancel.clone();

        let result = tokio::task::spawn_blocking(move || {
            put_file(&url, &headers, &path, len, &settings, timeout, &token)
        })
        .await
        .map_err(|e| JobError::Aborted(format!("upload task failed: {e}")))?;

        match result {
            Err(_) if cancel.is_cancelled() => Err(JobError::Cancelled(Stage::Upload)),
            other => other,
        }
    }
}

/// Blocking streaming PUT of one file.
fn put_file(
    url: &str,
    headers: &BTreeMap<String, String>,
    path: &Path,
    len: u64,
    settings: &HttpSettings,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<StoredObject, JobError> {
    let failed = |msg: String| JobError::StorageFailed(msg);

    let mut file = File::open(path).map_err(|e| JobError::Aborted(format!("open {}: {e}", path.display())))?;
    let mut header_lines: Vec<String> = Vec::new();
    let mut body: Vec<u8> = Vec::new();

    let mut easy = Easy::new();
    http::prepare(&mut easy, url, headers, settings, timeout).map_err(|e| failed(format!("{e:#}")))?;
    let performed = run_put(&mut easy, &mut file, len, &mut header_lines, &mut body, cancel);

    if let Err(e) = performed {
        return Err(failed(format!("PUT failed: {e}")));
    }
    let code = easy
        .response_code()
        .map_err(|e| failed(format!("no response code: {e}")))?;
    if !(200..300).contains(&code) {
        let snippet = String::from_utf8_lossy(&body[..body.len().min(ERROR_BODY_MAX)]).into_owned();
        return Err(failed(format!("PUT returned HTTP {code}: {}", snippet.trim())));
    }

    Ok(StoredObject {
        etag: parse_headers(&header_lines).etag,
    })
}

fn run_put(
    easy: &mut Easy,
    file: &mut File,
    len: u64,
    header_lines: &mut Vec<String>,
    body: &mut Vec<u8>,
    cancel: &CancellationToken,
) -> Result<(), curl::Error> {
    easy.upload(true)?;
    easy.in_filesize(len)?;
    easy.progress(true)?;

    let mut transfer = easy.transfer();
    transfer.read_function(|buf| file.read(buf).map_err(|_| ReadError::Abort))?;
    transfer.header_function(|data| {
        if let Ok(s) = str::from_utf8(data) {
            header_lines.push(s.trim_end().to_string());
        }
        true
    })?;
    transfer.write_function(|data| {
        if body.len() < ERROR_BODY_MAX {
            body.extend_from_slice(data);
        }
        Ok(data.len())
    })?;
    transfer.progress_function(|_, _, _, _| http::keep_going(cancel))?;
    transfer.perform()
}
