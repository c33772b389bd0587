use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{Fingerprint, KeyMap, KeyRecord, KeyType};

/// Parses a `--with-colons --fingerprint --fixed-list-mode` key listing.
///
/// Each `pub` line is paired with the first `fpr` line that follows it. Once a
/// pair is emitted both halves are forgotten, so subkey fingerprints and
/// fingerprints without a preceding `pub` line are never attached to a key.
/// Lines that are not valid UTF-8 are dropped.
pub fn parse_key_listing(output: &[u8], now: DateTime<Utc>) -> KeyMap {
    let mut keys = KeyMap::new();
    let mut current_key: Option<PendingKey> = None;

    for line in output.split(|&byte| byte == b'\n') {
        let Ok(line) = std::str::from_utf8(line) else {
            debug!("skipping line that is not valid UTF-8");
            continue;
        };
        let line = line.strip_suffix('\r').unwrap_or(line);

        let fields: Vec<&str> = line.split(':').collect();

        match fields[0] {
            "pub" => {
                if current_key.is_some() {
                    debug!("dropping public key line without fingerprint");
                }
                current_key = PendingKey::from_pub_fields(&fields);
                if current_key.is_none() {
                    debug!("skipping malformed public key line");
                }
            }
            "fpr" => {
                let Some(pending) = current_key.take() else {
                    debug!("skipping fingerprint line without public key line");
                    continue;
                };
                match fingerprint_field(&fields) {
                    Some(fingerprint) => {
                        let record = pending.build(fingerprint, now);
                        keys.insert(record.fingerprint.clone(), record);
                    }
                    None => debug!("skipping key: malformed fingerprint line"),
                }
            }
            "sub" | "ssb" | "sec" | "uid" | "uat" | "sig" | "rev" | "tru" | "grp" => {}
            record_type if !record_type.is_empty() => {
                debug!(record_type, "skipping unknown GPG record type");
            }
            _ => {}
        }
    }

    if current_key.is_some() {
        debug!("dropping final public key line without fingerprint");
    }

    keys
}

/// Extracts the primary key fingerprints from a listing, in listing order.
pub fn parse_fingerprints(output: &[u8]) -> Vec<Fingerprint> {
    let text = String::from_utf8_lossy(output);
    let mut fingerprints = Vec::new();
    let mut awaiting = false;

    for line in text.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields[0] {
            "pub" => awaiting = true,
            "fpr" if awaiting => {
                awaiting = false;
                if let Some(fingerprint) = fingerprint_field(&fields) {
                    fingerprints.push(fingerprint);
                }
            }
            _ => {}
        }
    }

    fingerprints
}

fn fingerprint_field(fields: &[&str]) -> Option<Fingerprint> {
    let value = fields.iter().rev().find(|f| !f.is_empty())?;
    Fingerprint::parse(value).ok()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    s.parse::<i64>()
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
}

struct PendingKey {
    size: u32,
    key_type: KeyType,
    created: Option<DateTime<Utc>>,
    expiry: Option<DateTime<Utc>>,
}

impl PendingKey {
    /// Reads validity, size, algorithm, key id, creation and expiry fields.
    fn from_pub_fields(fields: &[&str]) -> Option<Self> {
        if fields.len() < 7 {
            return None;
        }

        Some(Self {
            size: fields[2].parse().unwrap_or(0),
            key_type: KeyType::from_algorithm_code(fields[3]),
            created: parse_timestamp(fields[5]),
            expiry: parse_timestamp(fields[6]),
        })
    }

    fn build(self, fingerprint: Fingerprint, now: DateTime<Utc>) -> KeyRecord {
        KeyRecord::observed(
            fingerprint,
            self.size,
            self.key_type,
            self.created,
            self.expiry,
            now,
        )
    }
}
