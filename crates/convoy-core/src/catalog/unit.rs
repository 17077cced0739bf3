//! Migration units and the sets that declare them.

use std::fmt;

use super::error::CatalogError;
use super::version::Version;
use crate::registry::ResourceRegistry;

/// Error surfaced by a migration action body.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of one action invocation.
pub type ActionResult = Result<(), ActionError>;

type ActionFn = dyn Fn(&ResourceRegistry) -> ActionResult + Send + Sync;

/// One migration: identity, ordering metadata, and up to four actions.
///
/// Identity is `(id, author)`; the author may be left blank here and
/// filled from the catalog's default at build time. The execution action
/// is mandatory. The optional before action runs ahead of it; the two
/// rollback actions compensate their respective halves on failure.
pub struct MigrationUnit {
    id: String,
    author: Option<String>,
    order: String,
    system_version: Version,
    run_always: bool,
    fail_fast: bool,
    profiles: Vec<String>,
    before: Option<Box<ActionFn>>,
    execution: Box<ActionFn>,
    rollback: Option<Box<ActionFn>>,
    rollback_before: Option<Box<ActionFn>>,
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("id", &self.id)
            .field("author", &self.author)
            .field("order", &self.order)
            .field("system_version", &self.system_version)
            .field("run_always", &self.run_always)
            .field("fail_fast", &self.fail_fast)
            .finish_non_exhaustive()
    }
}

impl MigrationUnit {
    /// Starts building a unit with the given id.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> MigrationUnitBuilder {
        MigrationUnitBuilder::new(id.into())
    }

    /// Unit id, unique within its set.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declared author, if any.
    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Lexical sort key within the declaring set.
    #[must_use]
    pub fn order(&self) -> &str {
        &self.order
    }

    /// Version this unit belongs to.
    #[must_use]
    pub fn system_version(&self) -> &Version {
        &self.system_version
    }

    /// Whether the unit bypasses the ledger's satisfaction check and runs
    /// on every invocation.
    #[must_use]
    pub fn run_always(&self) -> bool {
        self.run_always
    }

    /// Whether a failure of this unit aborts the whole run.
    #[must_use]
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Profiles declared on the unit.
    #[must_use]
    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    /// Whether a before action is declared.
    #[must_use]
    pub fn has_before(&self) -> bool {
        self.before.is_some()
    }

    /// Whether a rollback action is declared.
    #[must_use]
    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some()
    }

    /// Whether a rollback action for the before step is declared.
    #[must_use]
    pub fn has_rollback_before(&self) -> bool {
        self.rollback_before.is_some()
    }

    pub(crate) fn run_before(&self, resources: &ResourceRegistry) -> ActionResult {
        match &self.before {
            Some(action) => action(resources),
            None => Ok(()),
        }
    }

    pub(crate) fn run_execution(&self, resources: &ResourceRegistry) -> ActionResult {
        (self.execution)(resources)
    }

    pub(crate) fn run_rollback(&self, resources: &ResourceRegistry) -> ActionResult {
        match &self.rollback {
            Some(action) => action(resources),
            None => Ok(()),
        }
    }

    pub(crate) fn run_rollback_before(&self, resources: &ResourceRegistry) -> ActionResult {
        match &self.rollback_before {
            Some(action) => action(resources),
            None => Ok(()),
        }
    }
}

/// Builder for [`MigrationUnit`].
pub struct MigrationUnitBuilder {
    id: String,
    author: Option<String>,
    order: Option<String>,
    system_version: String,
    run_always: bool,
    fail_fast: bool,
    profiles: Vec<String>,
    before: Option<Box<ActionFn>>,
    execution: Option<Box<ActionFn>>,
    rollback: Option<Box<ActionFn>>,
    rollback_before: Option<Box<ActionFn>>,
}

impl fmt::Debug for MigrationUnitBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnitBuilder")
            .field("id", &self.id)
            .field("author", &self.author)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl MigrationUnitBuilder {
    fn new(id: String) -> Self {
        Self {
            id,
            author: None,
            order: None,
            system_version: "0".to_string(),
            run_always: false,
            fail_fast: true,
            profiles: Vec::new(),
            before: None,
            execution: None,
            rollback: None,
            rollback_before: None,
        }
    }

    /// Author half of the unit identity.
    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Lexical sort key within the set. Zero-pad for numeric ordering.
    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Version this unit belongs to. Defaults to `"0"`.
    #[must_use]
    pub fn system_version(mut self, version: impl Into<String>) -> Self {
        self.system_version = version.into();
        self
    }

    /// Run on every invocation, ignoring prior success. Defaults to
    /// `false`.
    #[must_use]
    pub fn run_always(mut self, run_always: bool) -> Self {
        self.run_always = run_always;
        self
    }

    /// Abort the whole run if this unit fails. Defaults to `true`.
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Restrict the unit to an active profile. Repeatable; prefix with
    /// `!` to negate.
    #[must_use]
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profiles.push(profile.into());
        self
    }

    /// Action run immediately before the execution action.
    #[must_use]
    pub fn before<F>(mut self, action: F) -> Self
    where
        F: Fn(&ResourceRegistry) -> ActionResult + Send + Sync + 'static,
    {
        self.before = Some(Box::new(action));
        self
    }

    /// The unit's main action. Mandatory.
    #[must_use]
    pub fn execution<F>(mut self, action: F) -> Self
    where
        F: Fn(&ResourceRegistry) -> ActionResult + Send + Sync + 'static,
    {
        self.execution = Some(Box::new(action));
        self
    }

    /// Compensation for a failed execution action.
    #[must_use]
    pub fn rollback<F>(mut self, action: F) -> Self
    where
        F: Fn(&ResourceRegistry) -> ActionResult + Send + Sync + 'static,
    {
        self.rollback = Some(Box::new(action));
        self
    }

    /// Compensation for the before action, invoked only when the before
    /// action had already run.
    #[must_use]
    pub fn rollback_before<F>(mut self, action: F) -> Self
    where
        F: Fn(&ResourceRegistry) -> ActionResult + Send + Sync + 'static,
    {
        self.rollback_before = Some(Box::new(action));
        self
    }

    /// Builds the unit.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidUnit`] when the id or order is
    /// empty, an explicit author is empty, or no execution action was
    /// given; [`CatalogError::InvalidVersion`] when the system version
    /// does not parse.
    pub fn build(self) -> Result<MigrationUnit, CatalogError> {
        if self.id.is_empty() {
            return Err(CatalogError::InvalidUnit {
                id: self.id,
                reason: "id must not be empty".to_string(),
            });
        }
        if matches!(&self.author, Some(author) if author.is_empty()) {
            return Err(CatalogError::InvalidUnit {
                id: self.id,
                reason: "author must not be empty".to_string(),
            });
        }
        let order = match self.order {
            Some(order) if !order.is_empty() => order,
            _ => {
                return Err(CatalogError::InvalidUnit {
                    id: self.id,
                    reason: "order must be a non-empty sort key".to_string(),
                });
            },
        };
        let Some(execution) = self.execution else {
            return Err(CatalogError::InvalidUnit {
                id: self.id,
                reason: "an execution action is required".to_string(),
            });
        };
        let system_version = Version::parse(&self.system_version)?;
        Ok(MigrationUnit {
            id: self.id,
            author: self.author,
            order,
            system_version,
            run_always: self.run_always,
            fail_fast: self.fail_fast,
            profiles: self.profiles,
            before: self.before,
            execution,
            rollback: self.rollback,
            rollback_before: self.rollback_before,
        })
    }
}

/// Named group of units, ordered as a block within the catalog.
pub struct MigrationSet {
    name: String,
    order: Option<String>,
    profiles: Vec<String>,
    units: Vec<MigrationUnit>,
}

impl fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationSet")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}

impl MigrationSet {
    /// Starts building a set with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> MigrationSetBuilder {
        MigrationSetBuilder::new(name.into())
    }

    /// Set name, used as an ordering tie-breaker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional block-level sort key. Sets without one order first.
    #[must_use]
    pub fn order(&self) -> Option<&str> {
        self.order.as_deref()
    }

    /// Profiles declared on the set.
    #[must_use]
    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    /// Units in declaration order.
    #[must_use]
    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    pub(crate) fn into_parts(self) -> (String, Vec<MigrationUnit>) {
        (self.name, self.units)
    }
}

/// Builder for [`MigrationSet`].
pub struct MigrationSetBuilder {
    name: String,
    order: Option<String>,
    profiles: Vec<String>,
    units: Vec<MigrationUnit>,
}

impl fmt::Debug for MigrationSetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationSetBuilder")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}

impl MigrationSetBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            order: None,
            profiles: Vec::new(),
            units: Vec::new(),
        }
    }

    /// Block-level sort key. Sets without one sort ahead of sets with
    /// one.
    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Restrict the whole set to an active profile. Repeatable; prefix
    /// with `!` to negate.
    #[must_use]
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profiles.push(profile.into());
        self
    }

    /// Adds a unit to the set.
    #[must_use]
    pub fn unit(mut self, unit: MigrationUnit) -> Self {
        self.units.push(unit);
        self
    }

    /// Builds the set.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidSet`] when the name is empty and
    /// [`CatalogError::DuplicateIdInSet`] when two units share an id.
    pub fn build(self) -> Result<MigrationSet, CatalogError> {
        if self.name.is_empty() {
            return Err(CatalogError::InvalidSet {
                name: self.name,
                reason: "name must not be empty".to_string(),
            });
        }
        for (index, unit) in self.units.iter().enumerate() {
            if self.units[..index].iter().any(|other| other.id() == unit.id()) {
                return Err(CatalogError::DuplicateIdInSet {
                    set: self.name.clone(),
                    id: unit.id().to_string(),
                });
            }
        }
        Ok(MigrationSet {
            name: self.name,
            order: self.order,
            profiles: self.profiles,
            units: self.units,
        })
    }
}
