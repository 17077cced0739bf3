//! Run results: what happened to each unit, queryable after the fact.

use serde::Serialize;

/// Outcome of an attempted rollback after a unit failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RollbackOutcome {
    /// Every rollback action that was attempted completed.
    RolledBack,
    /// At least one rollback action itself failed.
    RollbackFailed {
        /// Failure text from the first rollback action that failed.
        error: String,
    },
}

/// Outcome of one migration unit within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UnitOutcome {
    /// The unit's execution action completed and was recorded.
    Executed {
        /// Wall-clock duration of the unit's actions in milliseconds.
        execution_millis: u64,
    },
    /// The ledger already satisfied the unit; nothing ran.
    Skipped,
    /// The unit's before or execution action failed.
    Failed {
        /// Failure text from the action.
        error: String,
        /// Result of compensating rollback actions, when any were
        /// attempted.
        rollback: Option<RollbackOutcome>,
    },
}

/// One unit's identity and outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    /// Unit identifier.
    pub id: String,
    /// Unit author.
    pub author: String,
    /// What happened to the unit.
    pub outcome: UnitOutcome,
}

/// Summary of one migration run.
///
/// Returned on success and carried inside
/// [`RunnerError::MigrationFailed`](super::RunnerError::MigrationFailed)
/// on a fail-fast stop, so the caller always sees what ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Identifier shared by every ledger entry this run wrote.
    pub execution_id: String,
    /// Run start, milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    /// Run end, milliseconds since the Unix epoch.
    pub finished_at_ms: u64,
    /// Per-unit outcomes in catalog order.
    pub outcomes: Vec<UnitReport>,
}

impl RunReport {
    /// Units whose execution action completed.
    pub fn executed(&self) -> impl Iterator<Item = &UnitReport> {
        self.outcomes
            .iter()
            .filter(|unit| matches!(unit.outcome, UnitOutcome::Executed { .. }))
    }

    /// Units skipped because the ledger already satisfied them.
    pub fn skipped(&self) -> impl Iterator<Item = &UnitReport> {
        self.outcomes
            .iter()
            .filter(|unit| matches!(unit.outcome, UnitOutcome::Skipped))
    }

    /// Units whose before or execution action failed.
    pub fn failed(&self) -> impl Iterator<Item = &UnitReport> {
        self.outcomes
            .iter()
            .filter(|unit| matches!(unit.outcome, UnitOutcome::Failed { .. }))
    }

    /// Whether the run finished without any unit failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}
