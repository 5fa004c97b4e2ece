//! Digest helpers for part verification.
//!
//! Two digests are used:
//! - MD5, matching the ETag convention of S3-compatible backends, to verify a
//!   part against the checksum the backend reports or supplies.
//! - SHA-256, for the local resumption journal.

use md5::Md5;
use sha2::{Digest, Sha256};

/// Calculate the MD5 digest of `data` as lowercase hex.
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Calculate the SHA-256 digest of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Normalizes a backend ETag for comparison with a local MD5.
///
/// Strips surrounding quotes and lowercases the value. Returns `None` for
/// ETags that are not a plain MD5 (multipart-style `<hash>-<n>` values, or
/// anything that is not 32 hex characters).
pub fn normalize_etag(etag: &str) -> Option<String> {
    let trimmed = etag.trim().trim_matches('"').to_ascii_lowercase();
    if trimmed.len() == 32 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(trimmed)
    } else {
        None
    }
}

/// Compares an expected checksum against the MD5 of `data`.
///
/// Returns the actual digest on mismatch. Checksums that cannot be
/// interpreted as an MD5 are not compared.
pub fn verify_md5(expected: &str, data: &[u8]) -> Result<String, (String, String)> {
    let actual = md5_hex(data);
    match normalize_etag(expected) {
        Some(expected) if expected != actual => Err((expected, actual)),
        _ => Ok(actual),
    }
}
