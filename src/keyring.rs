use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

const DEFAULT_APT_KEY: &str = "apt-key";
const DEFAULT_GPG: &str = "gpg";

/// The external tools the reconciler drives.
///
/// [`Keyring`] is the system implementation. Tests substitute scripted fakes.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Returns the raw colon-delimited, fingerprint-inclusive listing of every key.
    async fn list_keys(&self) -> Result<Vec<u8>>;

    /// Imports the key material stored at `path`.
    async fn add_key_file(&self, path: &Path) -> Result<()>;

    /// Deletes one trust store entry matching `short`.
    async fn delete_key(&self, short: &str) -> Result<()>;

    /// Returns whether any entry still matches `short`.
    async fn key_listed(&self, short: &str) -> Result<bool>;

    /// Fetches `id` from `server`, passing `options` as keyserver options.
    async fn receive_key(&self, server: &str, id: &str, options: Option<&str>) -> Result<()>;

    /// Returns whether the fingerprint extraction tool can be run.
    async fn fingerprint_tool_available(&self) -> bool;

    /// Returns a colon-delimited listing of the keys stored in the file at `path`.
    async fn show_key_file(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Interface for the apt trust store, backed by `apt-key` and `gpg`.
///
/// # Root Privileges
///
/// `add_key_file`, `delete_key` and `receive_key` modify the trust store and
/// require root privileges. They return [`Error::PermissionDenied`] when
/// called without sufficient permissions.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> apt_key::Result<()> {
/// use apt_key::{Keyring, ToolRunner};
///
/// let keyring = Keyring::new();
/// let listing = keyring.list_keys().await?;
/// println!("{} bytes of key listing", listing.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Keyring {
    apt_key: PathBuf,
    gpg: PathBuf,
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyring {
    /// Creates a Keyring that resolves `apt-key` and `gpg` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            apt_key: PathBuf::from(DEFAULT_APT_KEY),
            gpg: PathBuf::from(DEFAULT_GPG),
        }
    }

    /// Creates a Keyring using the tool paths from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            apt_key: config.apt_key.clone(),
            gpg: config.gpg.clone(),
        }
    }

    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.env("LC_ALL", "C")
            .env("APT_KEY_DONT_WARN_ON_DANGEROUS_USAGE", "1");
        cmd
    }

    async fn run_apt_key<I, S>(&self, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.command(&self.apt_key).args(args).output().await?;

        if !output.status.success() {
            return Err(check_tool_error(
                &self.apt_key,
                output.status,
                &output.stderr,
            ));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl ToolRunner for Keyring {
    async fn list_keys(&self) -> Result<Vec<u8>> {
        self.run_apt_key([
            "adv",
            "--no-tty",
            "--list-keys",
            "--with-colons",
            "--fingerprint",
            "--fixed-list-mode",
        ])
        .await
    }

    async fn add_key_file(&self, path: &Path) -> Result<()> {
        self.run_apt_key([OsStr::new("add"), path.as_os_str()])
            .await
            .map(drop)
    }

    async fn delete_key(&self, short: &str) -> Result<()> {
        self.run_apt_key(["del", short]).await.map(drop)
    }

    async fn key_listed(&self, short: &str) -> Result<bool> {
        let output = self
            .command(&self.apt_key)
            .args(["adv", "--no-tty", "--list-keys", "--with-colons", short])
            .output()
            .await?;

        Ok(output.status.success() && !output.stdout.is_empty())
    }

    async fn receive_key(&self, server: &str, id: &str, options: Option<&str>) -> Result<()> {
        let mut args = vec!["adv", "--no-tty", "--keyserver", server];
        if let Some(options) = options {
            args.extend(["--keyserver-options", options]);
        }
        args.extend(["--recv-keys", id]);

        self.run_apt_key(args).await.map(drop)
    }

    async fn fingerprint_tool_available(&self) -> bool {
        match self.command(&self.gpg).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(err) => {
                debug!(tool = %self.gpg.display(), error = %err, "fingerprint tool not runnable");
                false
            }
        }
    }

    async fn show_key_file(&self, path: &Path) -> Result<Vec<u8>> {
        let output = self
            .command(&self.gpg)
            .args([
                "--batch",
                "--no-tty",
                "--with-colons",
                "--with-fingerprint",
                "--show-keys",
            ])
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(check_tool_error(&self.gpg, output.status, &output.stderr));
        }

        Ok(output.stdout)
    }
}

fn check_tool_error(tool: &Path, status: std::process::ExitStatus, stderr: &[u8]) -> Error {
    let msg = String::from_utf8_lossy(stderr);

    if msg.contains("Permission denied")
        || msg.contains("permission denied")
        || msg.contains("must be root")
    {
        return Error::PermissionDenied;
    }

    Error::Tool {
        tool: tool.display().to_string(),
        status: status.code().unwrap_or(-1),
        stderr: msg.trim_end().to_string(),
    }
}
