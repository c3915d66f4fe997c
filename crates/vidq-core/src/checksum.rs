//! SHA-256 of downloaded files, computed in one streaming pass before upload.
//!
//! The same pass keeps the first bytes of the file so the uploader can sniff
//! the container format without reopening it.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// How many leading bytes `digest_file` keeps.
pub const HEAD_LEN: usize = 64;

/// Checksum, length and leading bytes of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex SHA-256.
    pub sha256: String,
    pub len: u64,
    /// Up to `HEAD_LEN` bytes from the start of the file.
    pub head: Vec<u8>,
}

/// Hash a file in chunks, keeping memory use bounded for large files.
pub fn digest_file(path: &Path) -> Result<FileDigest> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut head = Vec::with_capacity(HEAD_LEN);
    let mut len = 0u64;
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        if head.len() < HEAD_LEN {
            let take = (HEAD_LEN - head.len()).min(n);
            head.extend_from_slice(&buf[..take]);
        }
        hasher.update(&buf[..n]);
        len += n as u64;
    }
    Ok(FileDigest {
        sha256: hex::encode(hasher.finalize()),
        len,
        head,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn digest_of_empty_file() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let digest = digest_file(f.path()).unwrap();
        assert_eq!(
            digest.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(digest.len, 0);
        assert!(digest.head.is_empty());
    }

    #[test]
    fn digest_of_known_content() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();
        assert_eq!(
            digest_file(f.path()).unwrap().sha256,
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn head_is_capped_across_chunks() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        f.write_all(&body).unwrap();
        f.flush().unwrap();
        let digest = digest_file(f.path()).unwrap();
        assert_eq!(digest.len, 200_000);
        assert_eq!(digest.head, body[..HEAD_LEN].to_vec());
    }
}
