//! The run loop: lock, walk the catalog, record every outcome.

use std::env;
use std::fmt;
use std::mem;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::RunnerError;
use super::events::RunEvents;
use super::report::{RollbackOutcome, RunReport, UnitOutcome, UnitReport};
use crate::catalog::{CatalogEntry, CatalogOptions, MigrationCatalog, MigrationSet, MigrationUnit};
use crate::ledger::{EntryState, LedgerEntry, LedgerStore};
use crate::lock::{DEFAULT_KEY, LeaseLockManager, LockError, LockStore};
use crate::registry::ResourceRegistry;
use crate::time::{Clock, SystemClock};

/// Why the unit loop stopped before the end of the catalog.
enum RunHalt {
    /// The lock or the ledger failed mid-run.
    Infra(RunnerError),
    /// A fail-fast unit failed.
    FailFast {
        id: String,
        author: String,
        error: String,
    },
}

/// What happened when one unit's actions ran.
enum Attempt {
    Completed {
        execution_millis: u64,
    },
    Failed {
        error: String,
        before_ran: bool,
        execution_started: bool,
        execution_millis: u64,
    },
}

// =========================================================================
// Builder
// =========================================================================

/// Configures and assembles a [`MigrationRunner`].
pub struct RunnerBuilder {
    sets: Vec<MigrationSet>,
    catalog_options: CatalogOptions,
    lock_store: Option<Arc<dyn LockStore>>,
    ledger_store: Option<Arc<dyn LedgerStore>>,
    clock: Arc<dyn Clock>,
    resources: ResourceRegistry,
    events: RunEvents,
    metadata: Option<serde_json::Value>,
    lock_key: String,
    lock_acquired_for_ms: Option<u64>,
    lock_quit_trying_after_ms: Option<u64>,
    lock_try_frequency_ms: Option<u64>,
    renewal_daemon: bool,
    index_creation: bool,
    track_ignored: bool,
}

impl fmt::Debug for RunnerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerBuilder")
            .field("sets", &self.sets.len())
            .field("catalog_options", &self.catalog_options)
            .field("lock_key", &self.lock_key)
            .field("renewal_daemon", &self.renewal_daemon)
            .field("index_creation", &self.index_creation)
            .field("track_ignored", &self.track_ignored)
            .finish_non_exhaustive()
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self {
            sets: Vec::new(),
            catalog_options: CatalogOptions::default(),
            lock_store: None,
            ledger_store: None,
            clock: Arc::new(SystemClock),
            resources: ResourceRegistry::default(),
            events: RunEvents::default(),
            metadata: None,
            lock_key: DEFAULT_KEY.to_string(),
            lock_acquired_for_ms: None,
            lock_quit_trying_after_ms: None,
            lock_try_frequency_ms: None,
            renewal_daemon: true,
            index_creation: true,
            track_ignored: false,
        }
    }
}

impl RunnerBuilder {
    /// Adds one migration set.
    #[must_use]
    pub fn set(mut self, set: MigrationSet) -> Self {
        self.sets.push(set);
        self
    }

    /// Adds several migration sets.
    #[must_use]
    pub fn sets(mut self, sets: impl IntoIterator<Item = MigrationSet>) -> Self {
        self.sets.extend(sets);
        self
    }

    /// Sets the catalog filter and ordering options.
    #[must_use]
    pub fn catalog_options(mut self, options: CatalogOptions) -> Self {
        self.catalog_options = options;
        self
    }

    /// Sets the lock store the run serializes on.
    #[must_use]
    pub fn lock_store(mut self, store: Arc<dyn LockStore>) -> Self {
        self.lock_store = Some(store);
        self
    }

    /// Sets the ledger store that records execution history.
    #[must_use]
    pub fn ledger_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.ledger_store = Some(store);
        self
    }

    /// Replaces the time source. Defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the whole resource registry handed to unit actions.
    #[must_use]
    pub fn resources(mut self, resources: ResourceRegistry) -> Self {
        self.resources = resources;
        self
    }

    /// Registers one resource under the default name.
    #[must_use]
    pub fn resource<T>(mut self, value: T) -> Self
    where
        T: std::any::Any + Send + Sync,
    {
        self.resources.insert_default(value);
        self
    }

    /// Registers one resource under an explicit name.
    #[must_use]
    pub fn named_resource<T>(mut self, name: impl Into<String>, value: T) -> Self
    where
        T: std::any::Any + Send + Sync,
    {
        self.resources.insert(name, value);
        self
    }

    /// Sets the lifecycle callbacks.
    #[must_use]
    pub fn events(mut self, events: RunEvents) -> Self {
        self.events = events;
        self
    }

    /// Attaches opaque metadata to every ledger entry the run writes.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the lock key the run contends on.
    #[must_use]
    pub fn lock_key(mut self, key: impl Into<String>) -> Self {
        self.lock_key = key.into();
        self
    }

    /// Sets the lease lifetime in milliseconds.
    #[must_use]
    pub fn lock_acquired_for_ms(mut self, millis: u64) -> Self {
        self.lock_acquired_for_ms = Some(millis);
        self
    }

    /// Sets the total acquisition budget in milliseconds.
    #[must_use]
    pub fn lock_quit_trying_after_ms(mut self, millis: u64) -> Self {
        self.lock_quit_trying_after_ms = Some(millis);
        self
    }

    /// Sets the retry pause between acquisition attempts in milliseconds.
    #[must_use]
    pub fn lock_try_frequency_ms(mut self, millis: u64) -> Self {
        self.lock_try_frequency_ms = Some(millis);
        self
    }

    /// Enables or disables the background lease renewal thread.
    #[must_use]
    pub fn renewal_daemon(mut self, enabled: bool) -> Self {
        self.renewal_daemon = enabled;
        self
    }

    /// Whether `run` may create the ledger's unique execution index.
    ///
    /// With creation disabled the run fails fast when the index is
    /// absent.
    #[must_use]
    pub fn index_creation(mut self, enabled: bool) -> Self {
        self.index_creation = enabled;
        self
    }

    /// Whether skipped units are recorded in the ledger as `Ignored`.
    #[must_use]
    pub fn track_ignored(mut self, enabled: bool) -> Self {
        self.track_ignored = enabled;
        self
    }

    /// Assembles the runner.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::InvalidConfig`] when no lock store or no
    /// ledger store was provided.
    pub fn build(self) -> Result<MigrationRunner, RunnerError> {
        let lock_store = self.lock_store.ok_or_else(|| RunnerError::InvalidConfig {
            reason: "a lock store is required".to_string(),
        })?;
        let ledger_store = self
            .ledger_store
            .ok_or_else(|| RunnerError::InvalidConfig {
                reason: "a ledger store is required".to_string(),
            })?;

        Ok(MigrationRunner {
            sets: self.sets,
            catalog_options: self.catalog_options,
            lock_store,
            ledger_store,
            clock: self.clock,
            resources: self.resources,
            events: self.events,
            metadata: self.metadata,
            lock_key: self.lock_key,
            lock_acquired_for_ms: self.lock_acquired_for_ms,
            lock_quit_trying_after_ms: self.lock_quit_trying_after_ms,
            lock_try_frequency_ms: self.lock_try_frequency_ms,
            renewal_daemon: self.renewal_daemon,
            index_creation: self.index_creation,
            track_ignored: self.track_ignored,
            executed: false,
        })
    }
}

// =========================================================================
// Runner
// =========================================================================

/// Executes a migration catalog exactly once under the distributed lock.
///
/// Built with [`MigrationRunner::builder`]. [`run`](Self::run) walks the
/// catalog in order, consults the ledger before each unit, and records
/// every outcome; the lease is held for the whole walk and released on
/// every exit path.
pub struct MigrationRunner {
    sets: Vec<MigrationSet>,
    catalog_options: CatalogOptions,
    lock_store: Arc<dyn LockStore>,
    ledger_store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    resources: ResourceRegistry,
    events: RunEvents,
    metadata: Option<serde_json::Value>,
    lock_key: String,
    lock_acquired_for_ms: Option<u64>,
    lock_quit_trying_after_ms: Option<u64>,
    lock_try_frequency_ms: Option<u64>,
    renewal_daemon: bool,
    index_creation: bool,
    track_ignored: bool,
    executed: bool,
}

impl fmt::Debug for MigrationRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRunner")
            .field("sets", &self.sets.len())
            .field("lock_key", &self.lock_key)
            .field("executed", &self.executed)
            .finish_non_exhaustive()
    }
}

impl MigrationRunner {
    /// Starts building a runner.
    #[must_use]
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::default()
    }

    /// Runs the catalog once.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::AlreadyExecuted`] on a second call,
    /// [`RunnerError::Catalog`] when the sets cannot be assembled,
    /// [`RunnerError::Ledger`] when the ledger cannot be prepared or
    /// written, [`RunnerError::Lock`] when the lease cannot be acquired
    /// or kept, and [`RunnerError::MigrationFailed`] when a fail-fast
    /// unit fails.
    pub fn run(&mut self) -> Result<RunReport, RunnerError> {
        if self.executed {
            return Err(RunnerError::AlreadyExecuted);
        }
        self.executed = true;

        match self.execute() {
            Ok(report) => {
                self.events.emit_completed(&report);
                Ok(report)
            },
            Err(error) => {
                self.events.emit_failed(&error);
                Err(error)
            },
        }
    }

    fn execute(&mut self) -> Result<RunReport, RunnerError> {
        let started_at_ms = self.clock.now_ms();
        let execution_id = new_execution_id(started_at_ms);
        let hostname = detect_hostname().unwrap_or_else(|| "unknown".to_string());
        info!(execution_id = %execution_id, "migration run starting");

        // Catalog and ledger problems abort before the lock is touched.
        let sets = mem::take(&mut self.sets);
        let catalog = MigrationCatalog::build(sets, &self.catalog_options)?;
        self.ledger_store.initialize(self.index_creation)?;

        let manager = self.lock_manager()?;
        manager.acquire()?;
        self.events.emit_started();

        // The manager also releases on drop, so a panic unwinding
        // through a unit action still frees the lease.
        let mut outcomes = Vec::with_capacity(catalog.len());
        let halt = self.execute_units(&execution_id, &hostname, &catalog, &manager, &mut outcomes);
        manager.release();

        let finished_at_ms = self.clock.now_ms();
        let report = RunReport {
            execution_id,
            started_at_ms,
            finished_at_ms,
            outcomes,
        };

        match halt {
            None => {
                info!(
                    execution_id = %report.execution_id,
                    executed = report.executed().count(),
                    skipped = report.skipped().count(),
                    failed = report.failed().count(),
                    "migration run finished"
                );
                Ok(report)
            },
            Some(RunHalt::Infra(error)) => Err(error),
            Some(RunHalt::FailFast { id, author, error }) => Err(RunnerError::MigrationFailed {
                id,
                author,
                error,
                report: Box::new(report),
            }),
        }
    }

    /// Walks the catalog. Returns `None` when every unit was visited,
    /// or the reason the walk stopped early.
    fn execute_units(
        &self,
        execution_id: &str,
        hostname: &str,
        catalog: &MigrationCatalog,
        manager: &LeaseLockManager,
        outcomes: &mut Vec<UnitReport>,
    ) -> Option<RunHalt> {
        for entry in catalog.entries() {
            let unit = entry.unit();

            if !unit.run_always() {
                match self.ledger_store.is_satisfied(entry.id(), entry.author()) {
                    Ok(true) => {
                        debug!(
                            id = %entry.id(),
                            author = %entry.author(),
                            "unit already satisfied; skipping"
                        );
                        if self.track_ignored {
                            let ignored = self.ledger_entry(
                                execution_id,
                                hostname,
                                entry,
                                EntryState::Ignored,
                                0,
                                None,
                            );
                            if let Err(err) = self.ledger_store.append(&ignored) {
                                return Some(RunHalt::Infra(err.into()));
                            }
                        }
                        outcomes.push(UnitReport {
                            id: entry.id().to_string(),
                            author: entry.author().to_string(),
                            outcome: UnitOutcome::Skipped,
                        });
                        continue;
                    },
                    Ok(false) => {},
                    Err(err) => return Some(RunHalt::Infra(err.into())),
                }
            }

            // Long units must not let the lease lapse under us.
            if let Err(err) = manager.ensure() {
                return Some(RunHalt::Infra(err.into()));
            }

            info!(
                id = %entry.id(),
                author = %entry.author(),
                set = %entry.set_name(),
                "running migration unit"
            );
            match self.attempt_unit(unit) {
                Attempt::Completed { execution_millis } => {
                    let recorded = self.ledger_entry(
                        execution_id,
                        hostname,
                        entry,
                        EntryState::Executed,
                        execution_millis,
                        None,
                    );
                    if let Err(err) = self.ledger_store.append(&recorded) {
                        return Some(RunHalt::Infra(err.into()));
                    }
                    outcomes.push(UnitReport {
                        id: entry.id().to_string(),
                        author: entry.author().to_string(),
                        outcome: UnitOutcome::Executed { execution_millis },
                    });
                },
                Attempt::Failed {
                    error,
                    before_ran,
                    execution_started,
                    execution_millis,
                } => {
                    warn!(
                        id = %entry.id(),
                        author = %entry.author(),
                        error = %error,
                        "migration unit failed"
                    );
                    let failed = self.ledger_entry(
                        execution_id,
                        hostname,
                        entry,
                        EntryState::Failed,
                        execution_millis,
                        Some(error.clone()),
                    );
                    if let Err(err) = self.ledger_store.append(&failed) {
                        return Some(RunHalt::Infra(err.into()));
                    }

                    let rollback = self.run_rollbacks(unit, before_ran, execution_started);
                    if let Some(outcome) = &rollback {
                        let (state, rollback_error) = match outcome {
                            RollbackOutcome::RolledBack => (EntryState::RolledBack, None),
                            RollbackOutcome::RollbackFailed { error } => {
                                (EntryState::RollbackFailed, Some(error.clone()))
                            },
                        };
                        let audit = self.ledger_entry(
                            execution_id,
                            hostname,
                            entry,
                            state,
                            0,
                            rollback_error,
                        );
                        if let Err(err) = self.ledger_store.append(&audit) {
                            return Some(RunHalt::Infra(err.into()));
                        }
                    }

                    outcomes.push(UnitReport {
                        id: entry.id().to_string(),
                        author: entry.author().to_string(),
                        outcome: UnitOutcome::Failed {
                            error: error.clone(),
                            rollback,
                        },
                    });
                    if unit.fail_fast() {
                        return Some(RunHalt::FailFast {
                            id: entry.id().to_string(),
                            author: entry.author().to_string(),
                            error,
                        });
                    }
                },
            }
        }
        None
    }

    /// Runs a unit's before and execution actions, timing the attempt.
    fn attempt_unit(&self, unit: &MigrationUnit) -> Attempt {
        let started_ms = self.clock.now_ms();

        if unit.has_before() {
            if let Err(err) = unit.run_before(&self.resources) {
                return Attempt::Failed {
                    error: err.to_string(),
                    before_ran: true,
                    execution_started: false,
                    execution_millis: self.clock.now_ms().saturating_sub(started_ms),
                };
            }
        }

        if let Err(err) = unit.run_execution(&self.resources) {
            return Attempt::Failed {
                error: err.to_string(),
                before_ran: unit.has_before(),
                execution_started: true,
                execution_millis: self.clock.now_ms().saturating_sub(started_ms),
            };
        }

        Attempt::Completed {
            execution_millis: self.clock.now_ms().saturating_sub(started_ms),
        }
    }

    /// Runs the compensating actions that apply to what actually started,
    /// newest first. Their failures are logged, never thrown.
    fn run_rollbacks(
        &self,
        unit: &MigrationUnit,
        before_ran: bool,
        execution_started: bool,
    ) -> Option<RollbackOutcome> {
        let mut attempted = false;
        let mut first_error: Option<String> = None;

        if execution_started && unit.has_rollback() {
            attempted = true;
            debug!(id = %unit.id(), "running rollback action");
            if let Err(err) = unit.run_rollback(&self.resources) {
                warn!(id = %unit.id(), error = %err, "rollback action failed");
                if first_error.is_none() {
                    first_error = Some(err.to_string());
                }
            }
        }
        if before_ran && unit.has_rollback_before() {
            attempted = true;
            debug!(id = %unit.id(), "running rollback-before action");
            if let Err(err) = unit.run_rollback_before(&self.resources) {
                warn!(id = %unit.id(), error = %err, "rollback-before action failed");
                if first_error.is_none() {
                    first_error = Some(err.to_string());
                }
            }
        }

        if !attempted {
            return None;
        }
        Some(match first_error {
            None => RollbackOutcome::RolledBack,
            Some(error) => RollbackOutcome::RollbackFailed { error },
        })
    }

    fn lock_manager(&self) -> Result<LeaseLockManager, LockError> {
        let mut builder = LeaseLockManager::builder(Arc::clone(&self.lock_store))
            .key(self.lock_key.clone())
            .renewal_daemon(self.renewal_daemon)
            .clock(Arc::clone(&self.clock));
        if let Some(millis) = self.lock_acquired_for_ms {
            builder = builder.acquired_for_ms(millis);
        }
        if let Some(millis) = self.lock_quit_trying_after_ms {
            builder = builder.quit_trying_after_ms(millis);
        }
        if let Some(millis) = self.lock_try_frequency_ms {
            builder = builder.try_frequency_ms(millis);
        }
        builder.build()
    }

    fn ledger_entry(
        &self,
        execution_id: &str,
        hostname: &str,
        entry: &CatalogEntry,
        state: EntryState,
        execution_millis: u64,
        error: Option<String>,
    ) -> LedgerEntry {
        LedgerEntry {
            execution_id: execution_id.to_string(),
            id: entry.id().to_string(),
            author: entry.author().to_string(),
            created_at_ms: self.clock.now_ms(),
            state: Some(state),
            set_name: entry.set_name().to_string(),
            execution_millis,
            hostname: hostname.to_string(),
            error,
            metadata: self.metadata.clone(),
        }
    }
}

/// Builds a run identifier: UTC timestamp plus a random suffix.
fn new_execution_id(now_ms: u64) -> String {
    let timestamp = i64::try_from(now_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(
            || now_ms.to_string(),
            |at| at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    format!("{timestamp}-{}", Uuid::new_v4())
}

/// Best-effort host identification for ledger audit fields.
fn detect_hostname() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
