use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::keyring::ToolRunner;
use crate::parse::parse_fingerprints;
use crate::types::Fingerprint;

/// Result of checking supplied key material against a claimed fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Every primary key in the material carries the claimed fingerprint.
    Verified,
    /// The material holds no key, or a key with another fingerprint.
    Mismatch { found: Vec<Fingerprint> },
    /// The fingerprint tool could not be run, so nothing was checked.
    Unavailable,
}

/// Compares an extracted fingerprint with a claimed one, ignoring ASCII case.
pub fn fingerprint_matches(extracted: &str, claimed: &str) -> bool {
    !extracted.is_empty() && extracted.eq_ignore_ascii_case(claimed)
}

/// Returns true when `extracted` is non-empty and every entry matches `claimed`.
pub fn all_match(extracted: &[Fingerprint], claimed: &Fingerprint) -> bool {
    !extracted.is_empty()
        && extracted
            .iter()
            .all(|fingerprint| fingerprint_matches(fingerprint.as_str(), claimed.as_str()))
}

/// Checks that key material really is the key the operator named.
pub struct FingerprintVerifier<'a, R: ?Sized> {
    runner: &'a R,
}

impl<'a, R: ToolRunner + ?Sized> FingerprintVerifier<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Extracts the fingerprints of the key file at `material` and compares
    /// them with `claimed`.
    pub async fn verify(&self, material: &Path, claimed: &Fingerprint) -> Result<Verification> {
        if !self.runner.fingerprint_tool_available().await {
            warn!(fingerprint = %claimed, "fingerprint tool unavailable, cannot verify key material");
            return Ok(Verification::Unavailable);
        }

        let found = match self.runner.show_key_file(material).await {
            Ok(output) => parse_fingerprints(&output),
            Err(Error::Tool { stderr, .. }) if rejects_option(&stderr) => {
                warn!(%stderr, "fingerprint tool cannot show key files, cannot verify key material");
                return Ok(Verification::Unavailable);
            }
            Err(Error::Tool { stderr, .. }) => {
                debug!(%stderr, "no key could be extracted from material");
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        if all_match(&found, claimed) {
            debug!(fingerprint = %claimed, "key material verified");
            Ok(Verification::Verified)
        } else {
            Ok(Verification::Mismatch { found })
        }
    }
}

/// gpg releases before 2.2.8 answer `--show-keys` with `invalid option`.
fn rejects_option(stderr: &str) -> bool {
    stderr.contains("invalid option") || stderr.contains("unknown option")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRunner, listing_for};

    const CLAIMED: &str = "630239CC130E1A7FD81A27B140976EAF437D05B5";
    const OTHER: &str = "126C0D24BD8A2942CC7DF8AC7638D0442B90D010";

    fn claimed() -> Fingerprint {
        Fingerprint::parse(CLAIMED).unwrap()
    }

    #[test]
    fn test_fingerprint_matches_exact_and_case_insensitive() {
        assert!(fingerprint_matches(CLAIMED, CLAIMED));
        assert!(fingerprint_matches(&CLAIMED.to_lowercase(), CLAIMED));
    }

    #[test]
    fn test_fingerprint_matches_rejects_any_single_difference() {
        for position in 0..CLAIMED.len() {
            let mut altered: Vec<u8> = CLAIMED.bytes().collect();
            altered[position] = if altered[position] == b'0' { b'1' } else { b'0' };
            let altered = String::from_utf8(altered).unwrap();
            assert!(
                !fingerprint_matches(&altered, CLAIMED),
                "difference at {position} must not match"
            );
        }
    }

    #[test]
    fn test_fingerprint_matches_rejects_suffixes() {
        assert!(!fingerprint_matches(&CLAIMED[32..], CLAIMED));
        assert!(!fingerprint_matches(&CLAIMED[24..], CLAIMED));
        assert!(!fingerprint_matches("", CLAIMED));
    }

    #[test]
    fn test_all_match_requires_every_key() {
        let other = Fingerprint::parse(OTHER).unwrap();
        assert!(all_match(&[claimed()], &claimed()));
        assert!(!all_match(&[], &claimed()));
        assert!(!all_match(&[claimed(), other], &claimed()));
    }

    #[tokio::test]
    async fn test_verify_match() {
        let runner = FakeRunner::default().with_material(&listing_for(CLAIMED));
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = FingerprintVerifier::new(&runner)
            .verify(file.path(), &claimed())
            .await
            .unwrap();
        assert_eq!(result, Verification::Verified);
    }

    #[tokio::test]
    async fn test_verify_mismatch_reports_found() {
        let runner = FakeRunner::default().with_material(&listing_for(OTHER));
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = FingerprintVerifier::new(&runner)
            .verify(file.path(), &claimed())
            .await
            .unwrap();
        assert_eq!(
            result,
            Verification::Mismatch {
                found: vec![Fingerprint::parse(OTHER).unwrap()]
            }
        );
    }

    #[tokio::test]
    async fn test_verify_extra_key_is_mismatch() {
        let listing = format!("{}{}", listing_for(CLAIMED), listing_for(OTHER));
        let runner = FakeRunner::default().with_material(&listing);
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = FingerprintVerifier::new(&runner)
            .verify(file.path(), &claimed())
            .await
            .unwrap();
        assert!(matches!(result, Verification::Mismatch { .. }));
    }

    #[tokio::test]
    async fn test_verify_unparseable_material_is_mismatch() {
        let runner = FakeRunner::default().with_material("gpg: no valid OpenPGP data found.\n");
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = FingerprintVerifier::new(&runner)
            .verify(file.path(), &claimed())
            .await
            .unwrap();
        assert_eq!(result, Verification::Mismatch { found: vec![] });
    }

    #[tokio::test]
    async fn test_verify_old_gpg_without_show_keys_is_unavailable() {
        let runner = FakeRunner {
            show_stderr: Some("gpg: invalid option \"--show-keys\"\n".to_string()),
            ..FakeRunner::default()
        };
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = FingerprintVerifier::new(&runner)
            .verify(file.path(), &claimed())
            .await
            .unwrap();
        assert_eq!(result, Verification::Unavailable);
    }

    #[tokio::test]
    async fn test_verify_tool_failure_is_mismatch() {
        let runner = FakeRunner {
            show_stderr: Some("gpg: no valid OpenPGP data found.\n".to_string()),
            ..FakeRunner::default()
        };
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = FingerprintVerifier::new(&runner)
            .verify(file.path(), &claimed())
            .await
            .unwrap();
        assert_eq!(result, Verification::Mismatch { found: vec![] });
    }

    #[tokio::test]
    async fn test_verify_tool_unavailable() {
        let runner = FakeRunner::default();
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = FingerprintVerifier::new(&runner)
            .verify(file.path(), &claimed())
            .await
            .unwrap();
        assert_eq!(result, Verification::Unavailable);
    }
}
