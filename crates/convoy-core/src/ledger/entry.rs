//! Ledger entries and execution states.

use serde::{Deserialize, Serialize};

/// Outcome recorded for one execution attempt.
///
/// Only [`EntryState::Executed`] counts as satisfied. The two rollback
/// states are pure audit trail: they record what compensation did after a
/// failure, and like `Failed` they leave the unit eligible to run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryState {
    /// The execution action completed.
    Executed,
    /// The execution (or before) action failed.
    Failed,
    /// The unit was skipped while ignored-tracking is on.
    Ignored,
    /// Compensation ran and completed after a failure.
    RolledBack,
    /// Compensation itself failed.
    RollbackFailed,
}

impl EntryState {
    /// Canonical storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
            Self::Ignored => "IGNORED",
            Self::RolledBack => "ROLLED_BACK",
            Self::RollbackFailed => "ROLLBACK_FAILED",
        }
    }

    /// Parses the canonical storage form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "EXECUTED" => Some(Self::Executed),
            "FAILED" => Some(Self::Failed),
            "IGNORED" => Some(Self::Ignored),
            "ROLLED_BACK" => Some(Self::RolledBack),
            "ROLLBACK_FAILED" => Some(Self::RollbackFailed),
            _ => None,
        }
    }

    /// Whether this state marks the unit as already done.
    #[must_use]
    pub const fn satisfies(self) -> bool {
        matches!(self, Self::Executed)
    }
}

/// One appended record of an execution attempt.
///
/// Entries are immutable once written. `state` is nullable on purpose: an
/// entry with no state is a legacy success marker and counts as
/// satisfied, exactly like `Executed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    /// Groups every entry of one runner invocation.
    pub execution_id: String,
    /// Unit id half of the identity.
    pub id: String,
    /// Author half of the identity.
    pub author: String,
    /// Wall-clock append time, epoch milliseconds.
    pub created_at_ms: u64,
    /// Recorded outcome; `None` is a legacy success marker.
    pub state: Option<EntryState>,
    /// Name of the set that declared the unit.
    pub set_name: String,
    /// How long the attempt took.
    pub execution_millis: u64,
    /// Host that performed the attempt.
    pub hostname: String,
    /// Failure message, when there was one.
    pub error: Option<String>,
    /// Free-form audit payload.
    pub metadata: Option<serde_json::Value>,
}

impl LedgerEntry {
    /// Whether this entry marks its unit as already done.
    #[must_use]
    pub fn satisfies(&self) -> bool {
        self.state.map_or(true, EntryState::satisfies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_canonical_form() {
        for state in [
            EntryState::Executed,
            EntryState::Failed,
            EntryState::Ignored,
            EntryState::RolledBack,
            EntryState::RollbackFailed,
        ] {
            assert_eq!(EntryState::parse(state.as_str()), Some(state));
        }
        assert_eq!(EntryState::parse("NONSENSE"), None);
    }

    #[test]
    fn only_executed_and_legacy_null_satisfy() {
        assert!(EntryState::Executed.satisfies());
        assert!(!EntryState::Failed.satisfies());
        assert!(!EntryState::Ignored.satisfies());
        assert!(!EntryState::RolledBack.satisfies());
        assert!(!EntryState::RollbackFailed.satisfies());
    }
}
