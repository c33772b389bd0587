use std::io::Write;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::keyring::ToolRunner;
use crate::source;
use crate::types::{Advisory, DesiredEntry, KeySource};
use crate::verify::{FingerprintVerifier, Verification};

/// How a key gets into the trust store, chosen from the shape of the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPath<'a> {
    /// Fetch by id from the entry's keyserver.
    Keyserver,
    /// Import the literal material.
    Content(&'a str),
    /// Import material read from a path or downloaded from a URL.
    Source(&'a KeySource),
}

impl<'a> InstallPath<'a> {
    pub fn of(entry: &'a DesiredEntry) -> Result<Self> {
        match (&entry.content, &entry.source) {
            (None, None) => Ok(Self::Keyserver),
            (Some(content), None) => Ok(Self::Content(content)),
            (None, Some(source)) => Ok(Self::Source(source)),
            (Some(_), Some(_)) => Err(Error::UnexpectedShape {
                id: entry.id.to_string(),
                has_content: true,
                has_source: true,
            }),
        }
    }
}

/// Adds declared keys to the trust store.
pub struct KeyInstaller<'a, R: ?Sized> {
    runner: &'a R,
}

impl<'a, R: ToolRunner + ?Sized> KeyInstaller<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Installs the key described by `entry`. Nothing is retried.
    ///
    /// Supplied material is verified against the id before import whenever
    /// the id is a full fingerprint. Advisories raised on the way are pushed
    /// onto `advisories` even if the install then fails.
    pub async fn create(&self, entry: &DesiredEntry, advisories: &mut Vec<Advisory>) -> Result<()> {
        match InstallPath::of(entry)? {
            InstallPath::Keyserver => {
                let options = entry.options.as_deref().filter(|options| !options.is_empty());
                debug!(id = %entry.id, server = %entry.server, "receiving key from keyserver");
                self.runner
                    .receive_key(&entry.server, entry.id.as_str(), options)
                    .await?;
            }
            InstallPath::Content(content) => {
                self.import_material(entry, content.as_bytes(), advisories)
                    .await?;
            }
            InstallPath::Source(source) => {
                let material = source::fetch(source, entry.weak_ssl).await?;
                self.import_material(entry, &material, advisories).await?;
            }
        }

        info!(id = %entry.id, "key installed");
        Ok(())
    }

    async fn import_material(
        &self,
        entry: &DesiredEntry,
        material: &[u8],
        advisories: &mut Vec<Advisory>,
    ) -> Result<()> {
        // Removed when dropped, on every return path.
        let mut file = tempfile::Builder::new().prefix("apt_key").tempfile()?;
        file.write_all(material)?;
        file.flush()?;

        match entry.id.as_fingerprint() {
            Some(claimed) => {
                match FingerprintVerifier::new(self.runner)
                    .verify(file.path(), &claimed)
                    .await?
                {
                    Verification::Verified => {}
                    Verification::Mismatch { found } => {
                        let found = if found.is_empty() {
                            "no key".to_string()
                        } else {
                            found
                                .iter()
                                .map(|fingerprint| fingerprint.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        };
                        return Err(Error::VerificationMismatch {
                            id: entry.id.to_string(),
                            found,
                        });
                    }
                    Verification::Unavailable => {
                        let advisory = Advisory::VerificationUnavailable {
                            id: entry.id.to_string(),
                        };
                        warn!(id = %entry.id, "{advisory}");
                        advisories.push(advisory);
                    }
                }
            }
            None => debug!(id = %entry.id, "id is not a full fingerprint, skipping verification"),
        }

        self.runner.add_key_file(file.path()).await
    }
}
