use chrono::Utc;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::install::KeyInstaller;
use crate::keyring::ToolRunner;
use crate::parse::parse_key_listing;
use crate::plan::{Action, PlannedAction, plan};
use crate::remove::{DEFAULT_MAX_DELETE_ATTEMPTS, KeyRemover};
use crate::types::{Advisory, DesiredEntry, KeyId, KeyMap};

/// How processing one entry ended.
#[derive(Debug)]
pub enum Outcome {
    Created,
    Deleted,
    Unchanged,
    Failed(Error),
}

/// The result of processing one desired entry.
#[derive(Debug)]
pub struct EntryReport {
    pub id: KeyId,
    pub advisories: Vec<Advisory>,
    pub outcome: Outcome,
}

/// Per-entry results of a reconciliation run, in declaration order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub entries: Vec<EntryReport>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = (&KeyId, &Error)> {
        self.entries.iter().filter_map(|entry| match &entry.outcome {
            Outcome::Failed(err) => Some((&entry.id, err)),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn created(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Created))
    }

    pub fn deleted(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Deleted))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Unchanged))
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.outcome))
            .count()
    }
}

/// Converges the trust store towards a set of declared keys.
///
/// Entries are processed one at a time in declaration order. A failure in one
/// entry is recorded in the report and does not stop the others.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> apt_key::Result<()> {
/// use apt_key::{DesiredEntry, Keyring, Presence, Reconciler};
///
/// let reconciler = Reconciler::new(Keyring::new());
/// let desired = vec![DesiredEntry::new(
///     "630239CC130E1A7FD81A27B140976EAF437D05B5",
///     Presence::Present,
/// )?];
/// let report = reconciler.reconcile(&desired).await?;
/// assert!(report.is_success());
/// # Ok(())
/// # }
/// ```
pub struct Reconciler<R> {
    runner: R,
    max_delete_attempts: usize,
}

impl<R: ToolRunner> Reconciler<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            max_delete_attempts: DEFAULT_MAX_DELETE_ATTEMPTS,
        }
    }

    /// Creates a reconciler using the deletion cap from `config`.
    pub fn from_config(runner: R, config: &Config) -> Self {
        Self::new(runner).with_max_delete_attempts(config.max_delete_attempts)
    }

    #[must_use]
    pub fn with_max_delete_attempts(mut self, max_delete_attempts: usize) -> Self {
        self.max_delete_attempts = max_delete_attempts;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Reads the keys currently registered in the trust store.
    pub async fn observe(&self) -> Result<KeyMap> {
        let listing = self.runner.list_keys().await?;
        Ok(parse_key_listing(&listing, Utc::now()))
    }

    /// Observes the trust store, plans and applies one action per entry.
    ///
    /// Fails only when the trust store cannot be listed.
    pub async fn reconcile(&self, desired: &[DesiredEntry]) -> Result<RunReport> {
        let observed = self.observe().await?;
        let mut report = RunReport::default();

        for planned in plan(&observed, desired) {
            report.entries.push(self.apply(planned).await);
        }

        info!(
            created = report.created(),
            deleted = report.deleted(),
            unchanged = report.unchanged(),
            failed = report.failures().count(),
            "reconciliation finished"
        );
        Ok(report)
    }

    async fn apply(&self, planned: PlannedAction<'_>) -> EntryReport {
        let PlannedAction {
            action,
            mut advisories,
        } = planned;
        let entry = action.entry();

        let result = match action {
            Action::NoOp(_) => Ok(Outcome::Unchanged),
            Action::ValidationFailure(_, reason) => Err(Error::Validation {
                id: entry.id.to_string(),
                reason: reason.to_string(),
            }),
            Action::Create(_) => KeyInstaller::new(&self.runner)
                .create(entry, &mut advisories)
                .await
                .map(|()| Outcome::Created),
            Action::Delete(_) => KeyRemover::new(&self.runner)
                .with_max_attempts(self.max_delete_attempts)
                .delete(entry)
                .await
                .map(|()| Outcome::Deleted),
        };

        let outcome = result.unwrap_or_else(|err| {
            error!(id = %entry.id, error = %err, "failed to converge key");
            Outcome::Failed(err)
        });

        EntryReport {
            id: entry.id.clone(),
            advisories,
            outcome,
        }
    }
}
