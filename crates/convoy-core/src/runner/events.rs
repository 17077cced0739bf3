//! Optional lifecycle callbacks fired around a run.

use std::fmt;

use super::error::RunnerError;
use super::report::RunReport;

type StartedHook = dyn Fn() + Send + Sync;
type CompletedHook = dyn Fn(&RunReport) + Send + Sync;
type FailedHook = dyn Fn(&RunnerError) + Send + Sync;

/// Callbacks invoked at run boundaries. Every hook defaults to a no-op.
///
/// `on_started` fires once the lock is held and before the first unit
/// runs; `on_completed` fires after the lease is released on a
/// successful run; `on_failed` fires after the lease is released on any
/// failing run.
#[derive(Default)]
pub struct RunEvents {
    on_started: Option<Box<StartedHook>>,
    on_completed: Option<Box<CompletedHook>>,
    on_failed: Option<Box<FailedHook>>,
}

impl fmt::Debug for RunEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunEvents")
            .field("on_started", &self.on_started.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .finish()
    }
}

impl RunEvents {
    /// Creates an event set with every hook unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook fired when the lock is acquired and the run begins.
    #[must_use]
    pub fn on_started<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_started = Some(Box::new(hook));
        self
    }

    /// Sets the hook fired with the report of a successful run.
    #[must_use]
    pub fn on_completed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RunReport) + Send + Sync + 'static,
    {
        self.on_completed = Some(Box::new(hook));
        self
    }

    /// Sets the hook fired with the error of a failing run.
    #[must_use]
    pub fn on_failed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RunnerError) + Send + Sync + 'static,
    {
        self.on_failed = Some(Box::new(hook));
        self
    }

    pub(crate) fn emit_started(&self) {
        if let Some(hook) = &self.on_started {
            hook();
        }
    }

    pub(crate) fn emit_completed(&self, report: &RunReport) {
        if let Some(hook) = &self.on_completed {
            hook(report);
        }
    }

    pub(crate) fn emit_failed(&self, error: &RunnerError) {
        if let Some(hook) = &self.on_failed {
            hook(error);
        }
    }
}
