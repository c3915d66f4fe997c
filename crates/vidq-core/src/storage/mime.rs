//! Container sniffing from the first bytes of a downloaded file.

pub const MP4: &str = "video/mp4";
pub const WEBM: &str = "video/webm";

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Mime type recognised from the file head, if any.
pub fn sniff(head: &[u8]) -> Option<&'static str> {
    // ISO BMFF: box size, then `ftyp` at offset 4.
    if head.len() >= 8 && &head[4..8] == b"ftyp" {
        return Some(MP4);
    }
    if head.starts_with(&EBML_MAGIC) {
        return Some(WEBM);
    }
    let window = &head[..head.len().min(64)];
    if window.windows(4).any(|w| w == b"ftyp") {
        return Some(MP4);
    }
    if window.windows(4).any(|w| w.eq_ignore_ascii_case(b"webm")) {
        return Some(WEBM);
    }
    None
}

/// Sniffed type, else a `video/*` hint from the server, else mp4.
pub fn resolve_mime(head: &[u8], hint: Option<&str>) -> String {
    if let Some(m) = sniff(head) {
        return m.to_string();
    }
    hint.map(|h| h.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|h| h.starts_with("video/"))
        .unwrap_or_else(|| MP4.to_string())
}

/// File extension used in object keys.
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        WEBM => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        _ => "mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_mp4_and_webm() {
        let mp4 = [0, 0, 0, 0x20, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm'];
        assert_eq!(sniff(&mp4), Some(MP4));
        let webm = [0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81];
        assert_eq!(sniff(&webm), Some(WEBM));
        assert_eq!(sniff(b"<!DOCTYPE html>"), None);
    }

    #[test]
    fn falls_back_to_hint_then_mp4() {
        assert_eq!(resolve_mime(b"????", Some("video/quicktime; x=1")), "video/quicktime");
        assert_eq!(resolve_mime(b"????", Some("application/octet-stream")), MP4);
        assert_eq!(resolve_mime(b"", None), MP4);
        assert_eq!(extension_for("video/quicktime"), "mov");
        assert_eq!(extension_for(WEBM), "webm");
    }
}
