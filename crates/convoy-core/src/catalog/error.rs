//! Catalog construction errors.

use thiserror::Error;

/// Errors raised while building migration units, sets, or the catalog.
///
/// All of these are configuration defects: they abort a run before the
/// lock is acquired and before any unit executes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// Two units share an identity across the whole filtered catalog.
    #[error("duplicate migration '{id}' by '{author}'")]
    DuplicateMigration {
        /// Unit id declared twice.
        id: String,
        /// Author half of the duplicated identity.
        author: String,
    },

    /// Two units inside one set share an id.
    #[error("duplicate unit id '{id}' in migration set '{set}'")]
    DuplicateIdInSet {
        /// Set declaring the duplicate.
        set: String,
        /// Repeated unit id.
        id: String,
    },

    /// A unit is structurally incomplete or carries an empty field.
    #[error("invalid migration unit '{id}': {reason}")]
    InvalidUnit {
        /// Offending unit id, possibly empty.
        id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A set is structurally incomplete or carries an empty field.
    #[error("invalid migration set '{name}': {reason}")]
    InvalidSet {
        /// Offending set name, possibly empty.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A version string is not dotted-numeric.
    #[error("invalid version '{raw}': {reason}")]
    InvalidVersion {
        /// The string that failed to parse.
        raw: String,
        /// Parse failure detail.
        reason: String,
    },
}
