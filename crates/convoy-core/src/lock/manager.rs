//! Lease lifecycle: acquisition loop, refresh, renewal daemon, release.
//!
//! A [`LeaseLockManager`] drives one named lease through `Idle -> Held ->
//! Closed`. Acquisition and refresh are retry loops over the store's
//! conditional writes; the optional renewal daemon is a plain thread that
//! re-runs the refresh step ahead of expiry. A manager is single-use: once
//! release starts it answers [`LockError::Closed`] forever.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{LockError, LockStoreError};
use super::store::LockStore;
use crate::time::{Clock, SystemClock};

// =========================================================================
// Constants
// =========================================================================

/// Lease lifetime granted on each successful insert or refresh.
pub const DEFAULT_ACQUIRED_FOR_MS: u64 = 60_000;

/// Shortest lease lifetime the builder accepts.
pub const MIN_ACQUIRED_FOR_MS: u64 = 3_000;

/// Pacing between retries while the lock is contended or the store
/// misbehaves.
pub const DEFAULT_TRY_FREQUENCY_MS: u64 = 1_000;

/// Shortest retry pacing the builder accepts.
pub const MIN_TRY_FREQUENCY_MS: u64 = 500;

/// Floor for the contention sleep, even when the blocking lease is about
/// to expire.
pub const MIN_RETRY_SLEEP_MS: u64 = 500;

/// Lock key used when the builder is not given one.
pub const DEFAULT_KEY: &str = "default";

/// Refresh margin: leases are renewed once within a third of expiry, but
/// never later than one second before it.
const fn refresh_margin_ms(acquired_for_ms: u64) -> u64 {
    let third = acquired_for_ms / 3;
    if third > 1_000 { third } else { 1_000 }
}

// =========================================================================
// Builder
// =========================================================================

/// Validating builder for [`LeaseLockManager`].
///
/// Out-of-range timings are rejected at build time rather than clamped, so
/// a misconfigured deployment fails loudly before it ever touches the
/// store.
pub struct LockManagerBuilder {
    key: String,
    owner: Option<String>,
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    acquired_for_ms: u64,
    quit_trying_after_ms: Option<u64>,
    try_frequency_ms: u64,
    renewal_daemon: bool,
}

impl fmt::Debug for LockManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManagerBuilder")
            .field("key", &self.key)
            .field("acquired_for_ms", &self.acquired_for_ms)
            .field("quit_trying_after_ms", &self.quit_trying_after_ms)
            .field("try_frequency_ms", &self.try_frequency_ms)
            .field("renewal_daemon", &self.renewal_daemon)
            .finish_non_exhaustive()
    }
}

impl LockManagerBuilder {
    pub(crate) fn new(store: Arc<dyn LockStore>) -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            owner: None,
            store,
            clock: Arc::new(SystemClock),
            acquired_for_ms: DEFAULT_ACQUIRED_FOR_MS,
            quit_trying_after_ms: None,
            try_frequency_ms: DEFAULT_TRY_FREQUENCY_MS,
            renewal_daemon: true,
        }
    }

    /// Lock key to arbitrate on. Defaults to [`DEFAULT_KEY`].
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Owner identity written into the lease row. Defaults to a fresh
    /// UUIDv4, unique per manager.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Lease lifetime per successful insert or refresh.
    #[must_use]
    pub fn acquired_for_ms(mut self, millis: u64) -> Self {
        self.acquired_for_ms = millis;
        self
    }

    /// Total budget for blocking in [`LeaseLockManager::acquire`] before
    /// giving up. Defaults to three lease lifetimes.
    #[must_use]
    pub fn quit_trying_after_ms(mut self, millis: u64) -> Self {
        self.quit_trying_after_ms = Some(millis);
        self
    }

    /// Pacing between conditional-write retries.
    #[must_use]
    pub fn try_frequency_ms(mut self, millis: u64) -> Self {
        self.try_frequency_ms = millis;
        self
    }

    /// Whether a background thread keeps the lease renewed between
    /// explicit [`LeaseLockManager::ensure`] calls. Enabled by default.
    #[must_use]
    pub fn renewal_daemon(mut self, enabled: bool) -> Self {
        self.renewal_daemon = enabled;
        self
    }

    /// Time source for lease math and retry pacing.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the manager.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidConfig`] when the key or owner is
    /// empty, the lease lifetime is under [`MIN_ACQUIRED_FOR_MS`], the try
    /// frequency is under [`MIN_TRY_FREQUENCY_MS`], or the quit-trying
    /// budget is zero.
    pub fn build(mut self) -> Result<LeaseLockManager, LockError> {
        if self.key.is_empty() {
            return Err(LockError::InvalidConfig {
                reason: "lock key must not be empty".to_string(),
            });
        }
        if self.acquired_for_ms < MIN_ACQUIRED_FOR_MS {
            return Err(LockError::InvalidConfig {
                reason: format!(
                    "lease lifetime must be at least {MIN_ACQUIRED_FOR_MS}ms, got {}ms",
                    self.acquired_for_ms
                ),
            });
        }
        if self.try_frequency_ms < MIN_TRY_FREQUENCY_MS {
            return Err(LockError::InvalidConfig {
                reason: format!(
                    "try frequency must be at least {MIN_TRY_FREQUENCY_MS}ms, got {}ms",
                    self.try_frequency_ms
                ),
            });
        }
        let quit_trying_after_ms = self
            .quit_trying_after_ms
            .unwrap_or_else(|| self.acquired_for_ms.saturating_mul(3));
        if quit_trying_after_ms == 0 {
            return Err(LockError::InvalidConfig {
                reason: "quit-trying budget must be positive".to_string(),
            });
        }
        let owner = match self.owner.take() {
            Some(owner) if owner.is_empty() => {
                return Err(LockError::InvalidConfig {
                    reason: "lock owner must not be empty".to_string(),
                });
            },
            Some(owner) => owner,
            None => Uuid::new_v4().to_string(),
        };
        let margin_ms = refresh_margin_ms(self.acquired_for_ms);
        Ok(self.into_manager(owner, quit_trying_after_ms, margin_ms))
    }

    /// Test-only escape hatch: builds without timing validation so renewal
    /// tests can run on millisecond-scale leases.
    #[cfg(test)]
    pub(crate) fn build_for_test(self) -> LeaseLockManager {
        let quit = self
            .quit_trying_after_ms
            .unwrap_or_else(|| self.acquired_for_ms.saturating_mul(3));
        let owner = self
            .owner
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let margin = (self.acquired_for_ms / 3).max(1);
        self.into_manager(owner, quit, margin)
    }

    fn into_manager(
        self,
        owner: String,
        quit_trying_after_ms: u64,
        refresh_margin_ms: u64,
    ) -> LeaseLockManager {
        LeaseLockManager {
            core: Arc::new(LockCore {
                key: self.key,
                owner,
                acquired_for_ms: self.acquired_for_ms,
                quit_trying_after_ms,
                try_frequency_ms: self.try_frequency_ms,
                refresh_margin_ms,
                store: self.store,
                clock: self.clock,
                state: Mutex::new(CoreState::default()),
            }),
            renewal_daemon: self.renewal_daemon,
            daemon: Mutex::new(None),
        }
    }
}

// =========================================================================
// Core state
// =========================================================================

#[derive(Debug, Default)]
struct CoreState {
    /// Expiry of the lease this manager currently believes it holds.
    expires_at_ms: Option<u64>,
    /// Acquisition deadline, set on entry to `acquire` and kept after
    /// success so refresh failures stay under the same budget.
    deadline_ms: Option<u64>,
    /// Once set, every public operation except `release` answers `Closed`.
    release_started: bool,
    /// Release timed out waiting for the daemon; the row was left to
    /// expire naturally.
    abandoned: bool,
}

/// Shared between the manager and its renewal daemon.
struct LockCore {
    key: String,
    owner: String,
    acquired_for_ms: u64,
    quit_trying_after_ms: u64,
    try_frequency_ms: u64,
    refresh_margin_ms: u64,
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<CoreState>,
}

/// Outcome of one refresh attempt, before retry policy is applied.
enum RefreshError {
    /// Worth retrying under the acquisition deadline.
    Transient { reason: String },
    /// Surfaced to the caller as-is.
    Fatal(LockError),
}

impl LockCore {
    fn closed_error(&self) -> LockError {
        LockError::Closed {
            key: self.key.clone(),
        }
    }

    fn is_held(&self) -> bool {
        let expires_at_ms = self
            .state
            .lock()
            .expect("lock state mutex poisoned")
            .expires_at_ms;
        match expires_at_ms {
            Some(expiry) => self.clock.now_ms() <= expiry,
            None => false,
        }
    }

    /// Milliseconds until the lease enters its refresh margin, clamped to
    /// `[1, acquired_for]`. This is both the daemon's resting period and
    /// the basis for the release ack wait.
    fn rest_until_refresh_ms(&self) -> u64 {
        let expires_at_ms = self
            .state
            .lock()
            .expect("lock state mutex poisoned")
            .expires_at_ms;
        let rest = match expires_at_ms {
            Some(expiry) => expiry
                .saturating_sub(self.clock.now_ms())
                .saturating_sub(self.refresh_margin_ms),
            None => self.acquired_for_ms.saturating_sub(self.refresh_margin_ms),
        };
        rest.clamp(1, self.acquired_for_ms)
    }

    /// One refresh attempt: no-op outside the margin, otherwise a
    /// conditional extend. Returns whether the lease was actually
    /// extended.
    fn try_refresh(&self) -> Result<bool, RefreshError> {
        let (expires_at_ms, deadline_ms) = {
            let state = self.state.lock().expect("lock state mutex poisoned");
            if state.release_started {
                return Err(RefreshError::Fatal(self.closed_error()));
            }
            (state.expires_at_ms, state.deadline_ms)
        };

        let now_ms = self.clock.now_ms();
        let needs_refresh = match expires_at_ms {
            None => true,
            Some(expiry) => now_ms >= expiry.saturating_sub(self.refresh_margin_ms),
        };
        if !needs_refresh {
            return Ok(false);
        }

        let new_expiry_ms = now_ms.saturating_add(self.acquired_for_ms);
        match self.store.update_if_owner(&self.key, &self.owner, new_expiry_ms) {
            Ok(()) => {
                let mut state = self.state.lock().expect("lock state mutex poisoned");
                state.expires_at_ms = Some(new_expiry_ms);
                Ok(true)
            },
            // Held by someone else: the lease expired and was taken. This
            // outranks the deadline check so a lost lock is never
            // misreported as a timeout.
            Err(LockStoreError::NotOwner {
                current_owner: Some(current_owner),
            }) => Err(RefreshError::Fatal(LockError::Stolen {
                key: self.key.clone(),
                current_owner,
            })),
            Err(LockStoreError::NotOwner {
                current_owner: None,
            }) => Err(self.refresh_failure(deadline_ms, "lease row is gone".to_string())),
            Err(other) => Err(self.refresh_failure(deadline_ms, other.to_string())),
        }
    }

    fn refresh_failure(&self, deadline_ms: Option<u64>, reason: String) -> RefreshError {
        let budget_spent = match deadline_ms {
            Some(deadline) => self.clock.is_past(deadline),
            // Never acquired: there is no budget to burn down.
            None => true,
        };
        if budget_spent {
            RefreshError::Fatal(LockError::Timeout {
                key: self.key.clone(),
                waited_ms: self.quit_trying_after_ms,
                holder: None,
            })
        } else {
            RefreshError::Transient { reason }
        }
    }
}

// =========================================================================
// Renewal daemon
// =========================================================================

struct DaemonHandle {
    stop_tx: Sender<()>,
    ack_rx: Receiver<()>,
}

/// Runs on the renewal thread. Rests until the lease needs refreshing,
/// refreshes, repeats; a stop signal (or a dropped sender) ends the loop
/// immediately. Fatal refresh errors end the loop without touching the
/// row, since another owner may legitimately hold it by then.
fn renewal_loop(core: &LockCore, stop_rx: &Receiver<()>) {
    let mut next_wait_ms = core.rest_until_refresh_ms();
    loop {
        match stop_rx.recv_timeout(Duration::from_millis(next_wait_ms)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {},
        }
        match core.try_refresh() {
            Ok(extended) => {
                if extended {
                    debug!(key = %core.key, "lease refreshed by renewal daemon");
                }
                next_wait_ms = core.rest_until_refresh_ms();
            },
            Err(RefreshError::Transient { reason }) => {
                warn!(
                    key = %core.key,
                    %reason,
                    "transient lock store error in renewal daemon, will retry"
                );
                next_wait_ms = core.try_frequency_ms;
            },
            Err(RefreshError::Fatal(LockError::Closed { .. })) => return,
            Err(RefreshError::Fatal(err)) => {
                warn!(key = %core.key, error = %err, "renewal daemon stopping");
                return;
            },
        }
    }
}

// =========================================================================
// Manager
// =========================================================================

/// Exclusive, renewable lease on one lock key.
///
/// One instance guards one run: [`acquire`](Self::acquire) at the start,
/// [`ensure`](Self::ensure) between long operations,
/// [`release`](Self::release) at the end (also performed on drop). The
/// manager never deletes or overwrites a lease it does not own.
pub struct LeaseLockManager {
    core: Arc<LockCore>,
    renewal_daemon: bool,
    daemon: Mutex<Option<DaemonHandle>>,
}

impl fmt::Debug for LeaseLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseLockManager")
            .field("key", &self.core.key)
            .field("owner", &self.core.owner)
            .field("held", &self.core.is_held())
            .finish_non_exhaustive()
    }
}

impl LeaseLockManager {
    /// Starts building a manager over `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn LockStore>) -> LockManagerBuilder {
        LockManagerBuilder::new(store)
    }

    /// Lock key this manager arbitrates on.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.core.key
    }

    /// Owner identity this manager writes into lease rows.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.core.owner
    }

    /// Whether a lease was acquired and has not yet expired or been
    /// released.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.core.is_held()
    }

    /// Whether release gave up waiting for the renewal daemon and left the
    /// lease row to expire on its own.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.core
            .state
            .lock()
            .expect("lock state mutex poisoned")
            .abandoned
    }

    /// Blocks until the lease is acquired or the quit-trying budget is
    /// spent.
    ///
    /// Each attempt is a conditional insert with a fresh expiry. While a
    /// live foreign lease blocks the key, attempts are paced by the try
    /// frequency, clamped down to the holder's remaining lifetime and up
    /// to [`MIN_RETRY_SLEEP_MS`]. Transient store errors are logged and
    /// retried under the same deadline. On success, starts the renewal
    /// daemon if enabled.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] once the deadline passes without a
    /// successful insert; [`LockError::Closed`] if release has begun.
    pub fn acquire(&self) -> Result<(), LockError> {
        let deadline_ms = {
            let mut state = self.core.state.lock().expect("lock state mutex poisoned");
            if state.release_started {
                return Err(self.core.closed_error());
            }
            let deadline = self.core.clock.now_plus_ms(self.core.quit_trying_after_ms);
            state.deadline_ms = Some(deadline);
            deadline
        };

        loop {
            let now_ms = self.core.clock.now_ms();
            let new_expiry_ms = now_ms.saturating_add(self.core.acquired_for_ms);
            match self
                .core
                .store
                .insert_if_absent(&self.core.key, &self.core.owner, new_expiry_ms)
            {
                Ok(()) => {
                    {
                        let mut state =
                            self.core.state.lock().expect("lock state mutex poisoned");
                        state.expires_at_ms = Some(new_expiry_ms);
                    }
                    debug!(
                        key = %self.core.key,
                        owner = %self.core.owner,
                        expires_at_ms = new_expiry_ms,
                        "lock acquired"
                    );
                    if self.renewal_daemon {
                        self.start_daemon();
                    }
                    return Ok(());
                },
                Err(LockStoreError::AlreadyHeld {
                    current_owner,
                    expires_at_ms,
                }) => {
                    if self.core.clock.is_past(deadline_ms) {
                        return Err(LockError::Timeout {
                            key: self.core.key.clone(),
                            waited_ms: self.core.quit_trying_after_ms,
                            holder: Some(current_owner),
                        });
                    }
                    let holder_remaining_ms =
                        expires_at_ms.saturating_sub(self.core.clock.now_ms());
                    let sleep_ms = self
                        .core
                        .try_frequency_ms
                        .min(holder_remaining_ms)
                        .max(MIN_RETRY_SLEEP_MS);
                    debug!(
                        key = %self.core.key,
                        holder = %current_owner,
                        sleep_ms,
                        "lock held by another owner, waiting"
                    );
                    self.core.clock.sleep(Duration::from_millis(sleep_ms));
                },
                Err(other) => {
                    if self.core.clock.is_past(deadline_ms) {
                        return Err(LockError::Timeout {
                            key: self.core.key.clone(),
                            waited_ms: self.core.quit_trying_after_ms,
                            holder: None,
                        });
                    }
                    warn!(
                        key = %self.core.key,
                        error = %other,
                        "lock store error during acquire, will retry"
                    );
                    self.core
                        .clock
                        .sleep(Duration::from_millis(self.core.try_frequency_ms));
                },
            }
        }
    }

    /// Keeps the lease alive: no-op while comfortably inside the lease,
    /// otherwise a conditional extend. Long-running callers invoke this
    /// between operations even with the daemon enabled, so a stolen lease
    /// is noticed at the next unit boundary rather than at the end of the
    /// run.
    ///
    /// # Errors
    ///
    /// [`LockError::Stolen`] if the row is held by a different owner;
    /// [`LockError::Timeout`] if the refresh keeps failing past the
    /// acquisition deadline; [`LockError::Closed`] after release began.
    pub fn ensure(&self) -> Result<(), LockError> {
        loop {
            match self.core.try_refresh() {
                Ok(extended) => {
                    if extended {
                        debug!(key = %self.core.key, "lease refreshed");
                    }
                    return Ok(());
                },
                Err(RefreshError::Transient { reason }) => {
                    warn!(
                        key = %self.core.key,
                        %reason,
                        "transient lock store error during refresh, will retry"
                    );
                    self.core
                        .clock
                        .sleep(Duration::from_millis(self.core.try_frequency_ms));
                },
                Err(RefreshError::Fatal(err)) => return Err(err),
            }
        }
    }

    /// Releases the lease. Idempotent; never fails.
    ///
    /// Stops the renewal daemon and waits for its acknowledgement before
    /// deleting the row. If the acknowledgement does not arrive in time
    /// the row is deliberately left in place: deleting it while a renewal
    /// may still be in flight could resurrect a just-deleted lease, so the
    /// lease is abandoned to expire naturally instead.
    pub fn release(&self) {
        {
            let mut state = self.core.state.lock().expect("lock state mutex poisoned");
            if state.release_started {
                return;
            }
            state.release_started = true;
        }

        let ack_timeout_ms = self
            .core
            .rest_until_refresh_ms()
            .max(self.core.acquired_for_ms);
        let daemon = self.daemon.lock().expect("daemon slot mutex poisoned").take();
        let daemon_acked = match daemon {
            None => true,
            Some(handle) => {
                let _ = handle.stop_tx.send(());
                match handle
                    .ack_rx
                    .recv_timeout(Duration::from_millis(ack_timeout_ms))
                {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                    Err(RecvTimeoutError::Timeout) => false,
                }
            },
        };

        if daemon_acked {
            if let Err(err) = self
                .core
                .store
                .delete_if_owner(&self.core.key, &self.core.owner)
            {
                warn!(
                    key = %self.core.key,
                    error = %err,
                    "failed to delete lease row during release"
                );
            } else {
                debug!(key = %self.core.key, owner = %self.core.owner, "lock released");
            }
        } else {
            warn!(
                key = %self.core.key,
                "renewal daemon did not acknowledge stop in time; \
                 leaving the lease to expire naturally"
            );
            self.core
                .state
                .lock()
                .expect("lock state mutex poisoned")
                .abandoned = true;
        }

        let mut state = self.core.state.lock().expect("lock state mutex poisoned");
        state.expires_at_ms = None;
        state.deadline_ms = Some(self.core.clock.now_ms());
    }

    /// Spawns the renewal thread. At most one per manager; a spawn failure
    /// degrades to explicit `ensure` calls.
    fn start_daemon(&self) {
        let mut slot = self.daemon.lock().expect("daemon slot mutex poisoned");
        if slot.is_some() {
            return;
        }
        let (stop_tx, stop_rx) = mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::channel();
        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name(format!("lock-renewal-{}", core.key))
            .spawn(move || {
                renewal_loop(&core, &stop_rx);
                let _ = ack_tx.send(());
            });
        match spawned {
            Ok(_join_handle) => {
                *slot = Some(DaemonHandle { stop_tx, ack_rx });
            },
            Err(err) => {
                warn!(
                    key = %self.core.key,
                    error = %err,
                    "failed to spawn lock renewal thread; lease renewal now \
                     depends on explicit ensure calls"
                );
            },
        }
    }
}

impl Drop for LeaseLockManager {
    fn drop(&mut self) {
        let released = self
            .core
            .state
            .lock()
            .expect("lock state mutex poisoned")
            .release_started;
        if released {
            return;
        }
        let holds_lease = self
            .core
            .state
            .lock()
            .expect("lock state mutex poisoned")
            .expires_at_ms
            .is_some();
        let daemon_running = self
            .daemon
            .lock()
            .expect("daemon slot mutex poisoned")
            .is_some();
        if holds_lease || daemon_running {
            self.release();
        }
    }
}
