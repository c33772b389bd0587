use std::path::PathBuf;

use url::Url;

use crate::error::{Error, Result};
use crate::types::KeySource;

/// Validates a key ID format before passing to subprocess.
///
/// Accepted formats:
/// - 8 hex characters (short key ID, discouraged due to collisions)
/// - 16 hex characters (long key ID)
/// - 40 hex characters (full fingerprint, recommended)
/// - Any of the above with "0x" prefix
///
/// Returns the normalized keyid (uppercase, no prefix) on success.
pub fn validate_keyid(keyid: &str) -> Result<String> {
    if keyid.is_empty() {
        return Err(Error::InvalidKeyId {
            keyid: keyid.to_string(),
            reason: "key ID cannot be empty".to_string(),
        });
    }

    let normalized = strip_hex_prefix(keyid).to_uppercase();

    if !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidKeyId {
            keyid: keyid.to_string(),
            reason: "key ID must contain only hexadecimal characters".to_string(),
        });
    }

    match normalized.len() {
        8 | 16 | 40 => Ok(normalized),
        len => Err(Error::InvalidKeyId {
            keyid: keyid.to_string(),
            reason: format!("key ID must be 8, 16, or 40 hex characters (got {})", len),
        }),
    }
}

/// Validates a full 40 hex character fingerprint.
///
/// Returns the normalized fingerprint (uppercase, no prefix) on success.
pub fn validate_fingerprint(fingerprint: &str) -> Result<String> {
    let normalized = strip_hex_prefix(fingerprint).to_uppercase();

    if normalized.len() != 40 {
        return Err(Error::InvalidFingerprint {
            fingerprint: fingerprint.to_string(),
            reason: format!(
                "fingerprint must be 40 hex characters (got {})",
                normalized.len()
            ),
        });
    }

    if !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidFingerprint {
            fingerprint: fingerprint.to_string(),
            reason: "fingerprint must contain only hexadecimal characters".to_string(),
        });
    }

    Ok(normalized)
}

/// Validates a key source location.
///
/// Accepted formats:
/// - An absolute filesystem path
/// - An `http`, `https` or `ftp` URL
pub fn validate_source(location: &str) -> Result<KeySource> {
    let invalid = |reason: &str| Error::InvalidSource {
        location: location.to_string(),
        reason: reason.to_string(),
    };

    if location.is_empty() {
        return Err(invalid("source cannot be empty"));
    }

    if location.starts_with('/') {
        return Ok(KeySource::Path(PathBuf::from(location)));
    }

    let url = Url::parse(location).map_err(|_| {
        invalid("source must be an absolute path or an http, https or ftp URL")
    })?;

    match url.scheme() {
        "http" | "https" | "ftp" if url.has_host() => Ok(KeySource::Url(url)),
        "http" | "https" | "ftp" => Err(invalid("URL has no host")),
        _ => Err(invalid("unsupported URL scheme (expected http, https or ftp)")),
    }
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}
