//! Single-stream HTTP GET into a local file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::str;
use std::time::Duration;

use curl::easy::Easy;
use tokio_util::sync::CancellationToken;

use super::{FetchRequest, FetchSettings, FetchedFile};
use crate::error::{JobError, Stage};
use crate::fetch_head::parse_headers;
use crate::http;

/// Abort when throughput stays under this many bytes/s for `LOW_SPEED_TIME`.
const LOW_SPEED_LIMIT: u32 = 1024;
const LOW_SPEED_TIME: Duration = Duration::from_secs(30);

/// Sink state shared with the curl callbacks.
struct Sink {
    out: BufWriter<File>,
    written: u64,
    write_error: Option<std::io::Error>,
    header_lines: Vec<String>,
}

/// Downloads `req.url` with a single GET, writing sequentially to `req.dest`.
///
/// Blocks the calling thread. Rejects non-2xx responses, short bodies
/// (against `Content-Length`) and bodies under `min_file_size`. The caller
/// removes `req.dest` on error.
pub fn download_single(
    req: &FetchRequest,
    settings: &FetchSettings,
    cancel: &CancellationToken,
) -> Result<FetchedFile, JobError> {
    let file = File::create(&req.dest)
        .map_err(|e| JobError::Aborted(format!("create {}: {e}", req.dest.display())))?;
    let mut sink = Sink {
        out: BufWriter::with_capacity(256 * 1024, file),
        written: 0,
        write_error: None,
        header_lines: Vec::new(),
    };

    let mut easy = Easy::new();
    http::prepare(
        &mut easy,
        &req.url,
        &req.headers,
        &settings.http,
        settings.transfer_timeout,
    )
    .map_err(|e| JobError::TransferFailed(format!("{e:#}")))?;

    let performed = run_transfer(&mut easy, &mut sink, settings.transfer_timeout, cancel);
    let written = sink.written;

    if let Some(e) = sink.write_error.take() {
        return Err(JobError::Aborted(format!("write {}: {e}", req.dest.display())));
    }
    if let Err(e) = performed {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled(Stage::Fetch));
        }
        if e.is_operation_timedout() {
            return Err(JobError::TransferFailed(format!(
                "timed out after {}s ({written} bytes received)",
                settings.transfer_timeout.as_secs()
            )));
        }
        return Err(JobError::TransferFailed(format!("GET failed: {e}")));
    }

    let code = easy
        .response_code()
        .map_err(|e| JobError::TransferFailed(format!("no response code: {e}")))?;
    if !(200..300).contains(&code) {
        return Err(JobError::TransferFailed(format!("GET returned HTTP {code}")));
    }

    sink.out
        .flush()
        .map_err(|e| JobError::Aborted(format!("flush {}: {e}", req.dest.display())))?;

    let head = parse_headers(&sink.header_lines);
    if let Some(expected) = head.content_length {
        if written != expected {
            return Err(JobError::TransferFailed(format!(
                "partial transfer: got {written} of {expected} bytes"
            )));
        }
    }
    if written < settings.min_file_size {
        return Err(JobError::TransferFailed(format!(
            "payload too small: {written} bytes (minimum {})",
            settings.min_file_size
        )));
    }

    Ok(FetchedFile {
        bytes: written,
        content_type: head.content_type,
    })
}

fn run_transfer(
    easy: &mut Easy,
    sink: &mut Sink,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), curl::Error> {
    easy.low_speed_limit(LOW_SPEED_LIMIT)?;
    easy.low_speed_time(LOW_SPEED_TIME.min(timeout))?;
    easy.progress(true)?;

    let Sink {
        out,
        written,
        write_error,
        header_lines,
    } = sink;

    let mut transfer = easy.transfer();
    transfer.header_function(|data| {
        if let Ok(s) = str::from_utf8(data) {
            header_lines.push(s.trim_end().to_string());
        }
        true
    })?;
    transfer.write_function(|data| match out.write_all(data) {
        Ok(()) => {
            *written += data.len() as u64;
            Ok(data.len())
        }
        Err(e) => {
            *write_error = Some(e);
            Ok(0) // abort transfer
        }
    })?;
    transfer.progress_function(|_, _, _, _| http::keep_going(cancel))?;
    transfer.perform()
}
