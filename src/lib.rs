//! Reconciles declared signing keys against the apt trust store.
//!
//! The trust store listing is parsed into [`KeyRecord`]s, compared with the
//! declared [`DesiredEntry`]s, and each difference is converged by adding or
//! deleting a key through `apt-key`. Keys supplied as literal content or
//! fetched from a path or URL are checked against their declared fingerprint
//! before they are imported.
//!
//! # Example
//!
//! ```no_run
//! use apt_key::{Keyring, Manifest, Reconciler};
//!
//! #[tokio::main]
//! async fn main() -> apt_key::Result<()> {
//!     let manifest = Manifest::load("/etc/apt-keys.toml").await?;
//!     let keyring = Keyring::from_config(&manifest.config);
//!     let reconciler = Reconciler::from_config(keyring, &manifest.config);
//!
//!     let report = reconciler.reconcile(&manifest.desired_entries()?).await?;
//!     for (id, err) in report.failures() {
//!         eprintln!("{id}: {err}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - `apt-key` available (Debian, Ubuntu and derivatives)
//! - Root access for write operations (add, delete, receive)
//! - `gpg` for fingerprint verification of supplied key material (optional)

mod config;
mod error;
mod ftp;
mod install;
mod keyring;
mod parse;
mod plan;
mod reconcile;
mod remove;
mod source;
#[cfg(test)]
mod testing;
mod types;
mod validation;
mod verify;

pub use config::{Config, KeyDeclaration, Manifest};
pub use error::{Error, Result};
pub use install::{InstallPath, KeyInstaller};
pub use keyring::{Keyring, ToolRunner};
pub use parse::{parse_fingerprints, parse_key_listing};
pub use plan::{Action, PlannedAction, find_observed, plan};
pub use reconcile::{EntryReport, Outcome, Reconciler, RunReport};
pub use remove::{DEFAULT_MAX_DELETE_ATTEMPTS, DeletionState, KeyRemover};
pub use source::fetch as fetch_source;
pub use types::{
    Advisory, DEFAULT_KEYSERVER, DesiredEntry, Fingerprint, KeyId, KeyMap, KeyRecord, KeySource,
    KeyType, Presence,
};
pub use verify::{FingerprintVerifier, Verification, all_match, fingerprint_matches};
