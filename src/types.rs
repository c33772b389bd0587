use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::error::Result;
use crate::validation::{validate_fingerprint, validate_keyid, validate_source};

/// Keyserver queried when a declaration does not name one.
pub const DEFAULT_KEYSERVER: &str = "keyserver.ubuntu.com";

/// Observed keys, indexed by full fingerprint.
pub type KeyMap = BTreeMap<Fingerprint, KeyRecord>;

/// A full 40 hex character key fingerprint, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parses a fingerprint, accepting an optional `0x` prefix and any case.
    pub fn parse(value: &str) -> Result<Self> {
        validate_fingerprint(value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last 16 hex characters.
    pub fn long(&self) -> &str {
        &self.0[24..]
    }

    /// The last 8 hex characters.
    pub fn short(&self) -> &str {
        &self.0[32..]
    }
}

impl Borrow<str> for Fingerprint {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An operator supplied key identifier: a short (8), long (16) or full (40)
/// hex id, normalized to uppercase without prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId(String);

impl KeyId {
    pub fn parse(value: &str) -> Result<Self> {
        validate_keyid(value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_fingerprint(&self) -> bool {
        self.0.len() == 40
    }

    /// Returns the id as a [`Fingerprint`] when it is full length.
    pub fn as_fingerprint(&self) -> Option<Fingerprint> {
        self.is_fingerprint().then(|| Fingerprint(self.0.clone()))
    }

    /// The last 8 hex characters, which every id form ends with.
    pub fn short(&self) -> &str {
        &self.0[self.0.len() - 8..]
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public key algorithm, derived from the OpenPGP algorithm code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyType {
    Rsa,
    Dsa,
    Ecc,
    Ecdsa,
    #[default]
    Unrecognized,
}

impl KeyType {
    pub fn from_algorithm_code(code: &str) -> Self {
        match code {
            "1" => Self::Rsa,
            "17" => Self::Dsa,
            "18" => Self::Ecc,
            "19" => Self::Ecdsa,
            _ => Self::Unrecognized,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rsa => "rsa",
            Self::Dsa => "dsa",
            Self::Ecc => "ecc",
            Self::Ecdsa => "ecdsa",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// A key registered in the trust store.
///
/// Records are rebuilt from the trust store listing on every pass and carry
/// no identity beyond their fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct KeyRecord {
    pub fingerprint: Fingerprint,
    pub size: u32,
    pub key_type: KeyType,
    pub created: Option<DateTime<Utc>>,
    /// `None` means the key never expires.
    pub expiry: Option<DateTime<Utc>>,
    expired: bool,
}

impl KeyRecord {
    /// Builds a record, deriving `expired` from `expiry` as of `now`.
    pub fn observed(
        fingerprint: Fingerprint,
        size: u32,
        key_type: KeyType,
        created: Option<DateTime<Utc>>,
        expiry: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            fingerprint,
            size,
            key_type,
            created,
            expiry,
            expired: false,
        };
        record.expired = record.is_expired_at(now);
        record
    }

    /// Whether `expiry` had passed when the record was observed.
    pub fn expired(&self) -> bool {
        self.expired
    }

    pub fn long(&self) -> &str {
        self.fingerprint.long()
    }

    pub fn short(&self) -> &str {
        self.fingerprint.short()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| now >= expiry)
    }
}

/// Whether a declared key should be in the trust store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

/// Where key material is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Path(PathBuf),
    Url(Url),
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

/// A key as declared by the operator.
///
/// `content` and `source` may both be set here; the planner reports that
/// combination as a validation failure rather than acting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntry {
    pub id: KeyId,
    pub presence: Presence,
    /// Literal key material.
    pub content: Option<String>,
    pub source: Option<KeySource>,
    pub server: String,
    /// Extra `--keyserver-options`.
    pub options: Option<String>,
    /// Re-import the key when the registered copy has expired.
    pub refresh: bool,
    /// Skip certificate verification when fetching an https source.
    pub weak_ssl: bool,
}

impl DesiredEntry {
    pub fn new(id: &str, presence: Presence) -> Result<Self> {
        Ok(Self {
            id: KeyId::parse(id)?,
            presence,
            content: None,
            source: None,
            server: DEFAULT_KEYSERVER.to_string(),
            options: None,
            refresh: false,
            weak_ssl: false,
        })
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_source(mut self, location: &str) -> Result<Self> {
        self.source = Some(validate_source(location)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    #[must_use]
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    #[must_use]
    pub fn with_weak_ssl(mut self, weak_ssl: bool) -> Self {
        self.weak_ssl = weak_ssl;
        self
    }
}

/// A non-fatal notice raised while processing an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Advisory {
    /// The id is shorter than a full fingerprint and may match another key.
    ShortIdCollisionRisk { id: String },
    /// Supplied material was imported without checking its fingerprint.
    VerificationUnavailable { id: String },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortIdCollisionRisk { id } => write!(
                f,
                "key {id}: ids shorter than 40 characters may collide with other keys"
            ),
            Self::VerificationUnavailable { id } => write!(
                f,
                "key {id}: fingerprint tool unavailable, material could not be verified"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::TimeZone;

    const FPR: &str = "630239CC130E1A7FD81A27B140976EAF437D05B5";

    #[test]
    fn test_key_type_from_algorithm_code() {
        assert_eq!(KeyType::from_algorithm_code("1"), KeyType::Rsa);
        assert_eq!(KeyType::from_algorithm_code("17"), KeyType::Dsa);
        assert_eq!(KeyType::from_algorithm_code("18"), KeyType::Ecc);
        assert_eq!(KeyType::from_algorithm_code("19"), KeyType::Ecdsa);
        assert_eq!(KeyType::from_algorithm_code("22"), KeyType::Unrecognized);
        assert_eq!(KeyType::from_algorithm_code(""), KeyType::Unrecognized);
    }

    #[test]
    fn test_fingerprint_suffixes() {
        let fpr = Fingerprint::parse(FPR).unwrap();
        assert_eq!(fpr.long(), "40976EAF437D05B5");
        assert_eq!(fpr.short(), "437D05B5");
        assert!(FPR.ends_with(fpr.long()));
        assert!(FPR.ends_with(fpr.short()));
    }

    #[test]
    fn test_fingerprint_rejects_malformed() {
        assert!(matches!(
            Fingerprint::parse("437D05B5"),
            Err(Error::InvalidFingerprint { .. })
        ));
    }

    #[test]
    fn test_key_id_short_and_fingerprint() {
        let id = KeyId::parse("0x40976eaf437d05b5").unwrap();
        assert_eq!(id.as_str(), "40976EAF437D05B5");
        assert_eq!(id.short(), "437D05B5");
        assert!(!id.is_fingerprint());
        assert!(id.as_fingerprint().is_none());

        let id = KeyId::parse(FPR).unwrap();
        assert!(id.is_fingerprint());
        assert_eq!(id.as_fingerprint().unwrap().as_str(), FPR);
        assert_eq!(id.short(), "437D05B5");
    }

    #[test]
    fn test_record_expired_derived_from_expiry() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let past = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let future = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        let fpr = Fingerprint::parse(FPR).unwrap();

        let never = KeyRecord::observed(fpr.clone(), 4096, KeyType::Rsa, None, None, now);
        assert!(!never.expired());

        let expired =
            KeyRecord::observed(fpr.clone(), 4096, KeyType::Rsa, None, Some(past), now);
        assert!(expired.expired());

        let boundary = KeyRecord::observed(fpr.clone(), 4096, KeyType::Rsa, None, Some(now), now);
        assert!(boundary.expired());

        let valid = KeyRecord::observed(fpr, 4096, KeyType::Rsa, None, Some(future), now);
        assert!(!valid.expired());
        assert!(valid.is_expired_at(future));
    }

    #[test]
    fn test_desired_entry_defaults() {
        let entry = DesiredEntry::new(FPR, Presence::Present).unwrap();
        assert_eq!(entry.server, DEFAULT_KEYSERVER);
        assert!(entry.content.is_none());
        assert!(entry.source.is_none());
        assert!(entry.options.is_none());
        assert!(!entry.refresh);
        assert!(!entry.weak_ssl);
    }

    #[test]
    fn test_desired_entry_rejects_bad_source() {
        let err = DesiredEntry::new(FPR, Presence::Present)
            .unwrap()
            .with_source("relative/key.asc")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSource { .. }));
    }
}
