//! Catalog assembly: filter, order, deduplicate.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use super::error::CatalogError;
use super::profile::profiles_match;
use super::unit::{MigrationSet, MigrationUnit};
use super::version::VersionRange;

/// Inputs that shape the catalog without being part of any unit.
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    /// Inclusive window on unit system versions.
    pub version_range: VersionRange,
    /// Profiles considered active for this run.
    pub active_profiles: Vec<String>,
    /// Author assigned to units that declare none.
    pub default_author: Option<String>,
}

/// One executable unit in final catalog position, with its identity
/// fully resolved.
pub struct CatalogEntry {
    set_name: String,
    author: String,
    unit: MigrationUnit,
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("set", &self.set_name)
            .field("id", &self.unit.id())
            .field("author", &self.author)
            .finish()
    }
}

impl CatalogEntry {
    /// Unit id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.unit.id()
    }

    /// Resolved author; the catalog default when the unit declared none.
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Name of the declaring set.
    #[must_use]
    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    /// The unit itself.
    #[must_use]
    pub fn unit(&self) -> &MigrationUnit {
        &self.unit
    }
}

/// Immutable, totally ordered plan of work for one run.
///
/// Built from scratch on every runner invocation; nothing about it is
/// persisted.
pub struct MigrationCatalog {
    entries: Vec<CatalogEntry>,
}

impl fmt::Debug for MigrationCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationCatalog")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl MigrationCatalog {
    /// Filters, orders, and deduplicates `sets` into a catalog.
    ///
    /// Sets and units whose profiles do not match the active ones are
    /// dropped silently, as are units outside the version window. Sets
    /// order by the group rule (unordered sets first by name, then by
    /// order with name as tie-breaker); units order lexically by their
    /// sort key within each set.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateMigration`] when two surviving
    /// units share an identity, and [`CatalogError::InvalidUnit`] when a
    /// unit has no author and no default author is configured. No partial
    /// catalog is ever produced.
    pub fn build(
        sets: Vec<MigrationSet>,
        options: &CatalogOptions,
    ) -> Result<Self, CatalogError> {
        let mut kept: Vec<MigrationSet> = sets
            .into_iter()
            .filter(|set| {
                let matched = profiles_match(set.profiles(), &options.active_profiles);
                if !matched {
                    debug!(set = %set.name(), "migration set dropped by profile filter");
                }
                matched
            })
            .collect();
        kept.sort_by(set_order);

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut entries = Vec::new();
        for set in kept {
            let (set_name, units) = set.into_parts();
            let mut units: Vec<MigrationUnit> = units
                .into_iter()
                .filter(|unit| {
                    let matched = profiles_match(unit.profiles(), &options.active_profiles);
                    if !matched {
                        debug!(id = %unit.id(), "migration unit dropped by profile filter");
                    }
                    matched
                })
                .filter(|unit| {
                    let contained = options.version_range.contains(unit.system_version());
                    if !contained {
                        debug!(
                            id = %unit.id(),
                            version = %unit.system_version(),
                            "migration unit dropped by version window"
                        );
                    }
                    contained
                })
                .collect();
            units.sort_by(|a, b| a.order().cmp(b.order()));

            for unit in units {
                let author = match unit.author() {
                    Some(author) => author.to_string(),
                    None => match &options.default_author {
                        Some(author) => author.clone(),
                        None => {
                            return Err(CatalogError::InvalidUnit {
                                id: unit.id().to_string(),
                                reason: "no author declared and no default author configured"
                                    .to_string(),
                            });
                        },
                    },
                };
                if !seen.insert((unit.id().to_string(), author.clone())) {
                    return Err(CatalogError::DuplicateMigration {
                        id: unit.id().to_string(),
                        author,
                    });
                }
                entries.push(CatalogEntry {
                    set_name: set_name.clone(),
                    author,
                    unit,
                });
            }
        }
        Ok(Self { entries })
    }

    /// Entries in execution order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of units in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog contains no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Block ordering: sets without a sort key come first, ordered by name;
/// sets with one follow, ordered by key then name.
fn set_order(a: &MigrationSet, b: &MigrationSet) -> Ordering {
    match (a.order(), b.order()) {
        (None, None) => a.name().cmp(b.name()),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y).then_with(|| a.name().cmp(b.name())),
    }
}
