use std::io;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{tool} exited with status {status}: {stderr}")]
    Tool {
        tool: String,
        status: i32,
        stderr: String,
    },

    #[error("invalid key ID '{keyid}': {reason}")]
    InvalidKeyId { keyid: String, reason: String },

    #[error("invalid fingerprint '{fingerprint}': {reason}")]
    InvalidFingerprint { fingerprint: String, reason: String },

    #[error("invalid key source '{location}': {reason}")]
    InvalidSource { location: String, reason: String },

    #[error("key {id}: {reason}")]
    Validation { id: String, reason: String },

    #[error(
        "key {id}: fingerprint of the supplied material does not match (found: {found}); \
         check the id and that the content or source is legitimate"
    )]
    VerificationMismatch { id: String, found: String },

    #[error("key {id}: no install path matches (content set: {has_content}, source set: {has_source})")]
    UnexpectedShape {
        id: String,
        has_content: bool,
        has_source: bool,
    },

    #[error("key {short} still listed after {attempts} deletion attempts")]
    DeletionDidNotConverge { short: String, attempts: usize },

    #[error("failed to fetch key material from '{location}': {reason}")]
    Fetch { location: String, reason: String },

    #[error("invalid manifest: {0}")]
    Config(#[from] toml::de::Error),

    #[error("permission denied (requires root)")]
    PermissionDenied,
}

pub type Result<T> = std::result::Result<T, Error>;
