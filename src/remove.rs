use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::keyring::ToolRunner;
use crate::types::DesiredEntry;

/// Default cap on delete-then-check rounds for one key.
pub const DEFAULT_MAX_DELETE_ATTEMPTS: usize = 16;

/// Progress of a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    Deleting,
    Checking,
    Converged,
    GaveUp,
}

/// Removes declared keys from the trust store.
///
/// Several trust store entries can share a short id (subkeys, duplicate
/// imports), so deletion repeats until nothing matches the short id any more.
/// A failed existence check counts as nothing left. The number of rounds is
/// capped so an existence check that always answers "listed" cannot keep the
/// loop running.
pub struct KeyRemover<'a, R: ?Sized> {
    runner: &'a R,
    max_attempts: usize,
}

impl<'a, R: ToolRunner + ?Sized> KeyRemover<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            max_attempts: DEFAULT_MAX_DELETE_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Deletes every entry matching the short id of `entry`.
    pub async fn delete(&self, entry: &DesiredEntry) -> Result<()> {
        let short = entry.id.short();
        let mut attempts = 0;
        let mut state = DeletionState::Deleting;

        loop {
            state = match state {
                DeletionState::Deleting if attempts >= self.max_attempts => DeletionState::GaveUp,
                DeletionState::Deleting => {
                    attempts += 1;
                    debug!(short, attempt = attempts, "deleting key");
                    self.runner.delete_key(short).await?;
                    DeletionState::Checking
                }
                DeletionState::Checking => match self.runner.key_listed(short).await {
                    Ok(true) => DeletionState::Deleting,
                    Ok(false) => DeletionState::Converged,
                    Err(err) => {
                        warn!(short, error = %err, "existence check failed, treating key as removed");
                        DeletionState::Converged
                    }
                },
                DeletionState::Converged => {
                    info!(id = %entry.id, short, attempts, "key removed");
                    return Ok(());
                }
                DeletionState::GaveUp => {
                    return Err(Error::DeletionDidNotConverge {
                        short: short.to_string(),
                        attempts,
                    });
                }
            };
        }
    }
}
