//! Modification detection against a field lock.
//!
//! A signature may lock some or all form fields of the document it signs. The
//! container decoder reports which fields changed after signing; this item
//! fails when any of them is covered by the lock.

use serde::{Deserialize, Serialize};

use crate::domain::verification::Level;
use crate::services::chain::{ChainItem, CheckOutcome};

pub const LOCKED_FIELDS_UNMODIFIED: &str = "locked-fields-unmodified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockAction {
    /// Every field is locked.
    All,
    /// Only the listed fields are locked.
    Include,
    /// Every field except the listed ones is locked.
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLock {
    pub action: LockAction,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl FieldLock {
    #[must_use]
    pub fn is_locked(&self, field: &str) -> bool {
        let listed = self.fields.iter().any(|f| f == field);
        match self.action {
            LockAction::All => true,
            LockAction::Include => listed,
            LockAction::Exclude => !listed,
        }
    }
}

/// A lock declared by one signature together with the fields the decoder
/// found modified after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLockRule {
    pub signature_id: String,
    pub lock: FieldLock,
    #[serde(default)]
    pub modified_fields: Vec<String>,
    #[serde(default = "default_lock_level")]
    pub level: Level,
}

fn default_lock_level() -> Level {
    Level::Fail
}

impl FieldLockRule {
    #[must_use]
    pub fn to_check(&self) -> LockedFieldsCheck {
        LockedFieldsCheck::new(self.lock.clone(), self.modified_fields.clone(), self.level)
    }
}

pub struct LockedFieldsCheck {
    lock: FieldLock,
    modified_fields: Vec<String>,
    level: Level,
}

impl LockedFieldsCheck {
    #[must_use]
    pub fn new(lock: FieldLock, modified_fields: Vec<String>, level: Level) -> Self {
        Self {
            lock,
            modified_fields,
            level,
        }
    }

    fn violations(&self) -> Vec<&str> {
        self.modified_fields
            .iter()
            .filter(|field| self.lock.is_locked(field))
            .map(String::as_str)
            .collect()
    }
}

impl ChainItem for LockedFieldsCheck {
    fn name(&self) -> &str {
        LOCKED_FIELDS_UNMODIFIED
    }

    fn level(&self) -> Level {
        self.level
    }

    fn check(&self) -> CheckOutcome {
        let violations = self.violations();
        CheckOutcome::from_bool(
            violations.is_empty(),
            format!("Locked fields were modified: {}", violations.join(", ")),
        )
    }
}
