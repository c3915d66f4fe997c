//! Object key layout: `videos/<id>/<id>_<job>-<millis>.<ext>`.

use crate::queue_db::JobId;

/// Top-level key prefix for every stored video.
pub const KEY_PREFIX: &str = "videos";

/// Longest sanitized id segment, in bytes.
const SEGMENT_MAX: usize = 128;

/// Sanitizes an external id for use as one key segment.
///
/// - Keeps ASCII alphanumerics, `-` and `.`; everything else becomes `_`
/// - Collapses consecutive underscores
/// - Trims leading/trailing dots and underscores (no `..` segments)
/// - Limits length to 128 bytes; empty input becomes `unknown`
pub fn sanitize_segment(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut prev_underscore = false;

    for c in id.chars() {
        let replacement = if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            c
        } else {
            '_'
        };
        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut s = trimmed[..trimmed.len().min(SEGMENT_MAX)].to_string();
    if s.is_empty() {
        s.push_str("unknown");
    }
    s
}

/// Key for one upload. `millis` plus the job id keep keys unique across retries.
pub fn object_key(external_id: &str, job_id: JobId, millis: i64, ext: &str) -> String {
    let id = sanitize_segment(external_id);
    format!("{KEY_PREFIX}/{id}/{id}_{job_id}-{millis}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(
            object_key("7301234567890", 12, 1_700_000_000_000, "mp4"),
            "videos/7301234567890/7301234567890_12-1700000000000.mp4"
        );
    }

    #[test]
    fn hostile_ids_stay_in_one_segment() {
        assert_eq!(sanitize_segment("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_segment("a b//c"), "a_b_c");
        assert_eq!(sanitize_segment("///"), "unknown");
        assert_eq!(sanitize_segment("视频"), "unknown");
        assert_eq!(sanitize_segment(&"x".repeat(300)).len(), 128);
    }
}
