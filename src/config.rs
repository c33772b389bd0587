//! Tool configuration and key declarations loaded from TOML.
//!
//! ```toml
//! [config]
//! keyserver = "keyserver.ubuntu.com"
//! max_delete_attempts = 8
//!
//! [[key]]
//! id = "630239CC130E1A7FD81A27B140976EAF437D05B5"
//! ensure = "present"
//!
//! [[key]]
//! id = "126C0D24BD8A2942CC7DF8AC7638D0442B90D010"
//! ensure = "absent"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::remove::DEFAULT_MAX_DELETE_ATTEMPTS;
use crate::types::{DEFAULT_KEYSERVER, DesiredEntry, Presence};

/// Settings for the external tools and the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Trust store tool.
    pub apt_key: PathBuf,
    /// Fingerprint extraction tool.
    pub gpg: PathBuf,
    /// Keyserver used by declarations that do not name one.
    pub keyserver: String,
    /// Upper bound on delete-then-check rounds for a single key.
    pub max_delete_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apt_key: PathBuf::from("apt-key"),
            gpg: PathBuf::from("gpg"),
            keyserver: DEFAULT_KEYSERVER.to_string(),
            max_delete_attempts: DEFAULT_MAX_DELETE_ATTEMPTS,
        }
    }
}

/// One `[[key]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyDeclaration {
    pub id: String,
    #[serde(default)]
    pub ensure: Presence,
    pub content: Option<String>,
    pub source: Option<String>,
    pub server: Option<String>,
    pub options: Option<String>,
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub weak_ssl: bool,
}

impl KeyDeclaration {
    /// Validates the declaration, using `default_server` when none is named.
    pub fn to_entry(&self, default_server: &str) -> Result<DesiredEntry> {
        let mut entry = DesiredEntry::new(&self.id, self.ensure)?
            .with_server(self.server.as_deref().unwrap_or(default_server))
            .with_refresh(self.refresh)
            .with_weak_ssl(self.weak_ssl);

        if let Some(content) = &self.content {
            entry = entry.with_content(content.as_str());
        }
        if let Some(source) = &self.source {
            entry = entry.with_source(source)?;
        }
        if let Some(options) = &self.options {
            entry = entry.with_options(options.as_str());
        }

        Ok(entry)
    }
}

/// A declaration file: tool settings plus the desired keys, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub config: Config,
    #[serde(default, rename = "key")]
    pub keys: Vec<KeyDeclaration>,
}

impl Manifest {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let input = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&input)
    }

    /// Validates every declaration, preserving declaration order.
    pub fn desired_entries(&self) -> Result<Vec<DesiredEntry>> {
        self.keys
            .iter()
            .map(|key| key.to_entry(&self.config.keyserver))
            .collect()
    }
}
