use tracing::{debug, warn};

use crate::types::{Advisory, DesiredEntry, KeyId, KeyMap, KeyRecord, Presence};

pub(crate) const CONTENT_SOURCE_EXCLUSIVE: &str = "content and source are mutually exclusive";

/// What to do with one declared key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<'a> {
    NoOp(&'a DesiredEntry),
    Delete(&'a DesiredEntry),
    Create(&'a DesiredEntry),
    /// The declaration is invalid; nothing is attempted for it.
    ValidationFailure(&'a DesiredEntry, &'static str),
}

impl<'a> Action<'a> {
    pub fn entry(&self) -> &'a DesiredEntry {
        match self {
            Self::NoOp(entry)
            | Self::Delete(entry)
            | Self::Create(entry)
            | Self::ValidationFailure(entry, _) => entry,
        }
    }
}

/// An action together with the advisories raised while planning it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction<'a> {
    pub action: Action<'a>,
    pub advisories: Vec<Advisory>,
}

/// Decides one action per desired entry, in declaration order.
///
/// | registered | desired | action |
/// |---|---|---|
/// | yes | absent  | delete |
/// | yes | present | none (or create, when `refresh` is set and the key expired) |
/// | no  | present | create |
/// | no  | absent  | none |
///
/// Keys are never updated in place.
pub fn plan<'a>(observed: &KeyMap, desired: &'a [DesiredEntry]) -> Vec<PlannedAction<'a>> {
    desired
        .iter()
        .map(|entry| plan_entry(observed, entry))
        .collect()
}

fn plan_entry<'a>(observed: &KeyMap, entry: &'a DesiredEntry) -> PlannedAction<'a> {
    let mut advisories = Vec::new();

    if !entry.id.is_fingerprint() {
        let advisory = Advisory::ShortIdCollisionRisk {
            id: entry.id.to_string(),
        };
        warn!(id = %entry.id, "{advisory}");
        advisories.push(advisory);
    }

    if entry.content.is_some() && entry.source.is_some() {
        return PlannedAction {
            action: Action::ValidationFailure(entry, CONTENT_SOURCE_EXCLUSIVE),
            advisories,
        };
    }

    let action = match (find_observed(observed, &entry.id), entry.presence) {
        (Some(_), Presence::Absent) => Action::Delete(entry),
        (Some(record), Presence::Present) if entry.refresh && record.expired() => {
            debug!(id = %entry.id, "registered key expired, re-importing");
            Action::Create(entry)
        }
        (Some(_), Presence::Present) => {
            debug!(id = %entry.id, "key registered, updating in place is not supported");
            Action::NoOp(entry)
        }
        (None, Presence::Present) => Action::Create(entry),
        (None, Presence::Absent) => {
            debug!(id = %entry.id, "key already absent");
            Action::NoOp(entry)
        }
    };

    PlannedAction { action, advisories }
}

/// Finds the registered key an id refers to.
///
/// A full id is looked up by fingerprint, a 16 character id is compared with
/// each record's long id and an 8 character id with its short id. All
/// comparisons are exact.
pub fn find_observed<'m>(observed: &'m KeyMap, id: &KeyId) -> Option<&'m KeyRecord> {
    let id = id.as_str();
    match id.len() {
        40 => observed.get(id),
        16 => observed.values().find(|record| record.long() == id),
        _ => observed.values().find(|record| record.short() == id),
    }
}
