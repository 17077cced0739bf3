//! Migration discovery, filtering, and deterministic ordering.
//!
//! A [`MigrationUnit`] is one migration body with identity `(id, author)`
//! and a lexical sort key; a [`MigrationSet`] is a named group of units
//! ordered as a block. [`MigrationCatalog::build`] turns declared sets
//! into the total execution order for a run: profile and version filters
//! drop non-applicable work silently, block and unit comparators fix the
//! order, and any duplicate identity across the survivors aborts the
//! build before anything executes.
//!
//! Ordering is fully deterministic: unordered sets come first sorted by
//! name, ordered sets follow by key with name as tie-breaker, and units
//! sort by plain lexical comparison of their keys. Numeric ordering
//! therefore requires zero-padded keys (`"001"`, `"002"`, ... `"010"`).
//!
//! # Example
//!
//! ```
//! use convoy_core::catalog::{CatalogOptions, MigrationCatalog, MigrationSet, MigrationUnit};
//!
//! let set = MigrationSet::builder("client-initializer")
//!     .order("001")
//!     .unit(
//!         MigrationUnit::builder("create-clients")
//!             .author("platform")
//!             .order("001")
//!             .execution(|_resources| Ok(()))
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let catalog = MigrationCatalog::build(vec![set], &CatalogOptions::default())?;
//! assert_eq!(catalog.len(), 1);
//! assert_eq!(catalog.entries()[0].id(), "create-clients");
//! # Ok::<(), convoy_core::catalog::CatalogError>(())
//! ```

mod build;
mod error;
mod profile;
mod unit;
mod version;

#[cfg(test)]
mod tests;

pub use build::{CatalogEntry, CatalogOptions, MigrationCatalog};
pub use error::CatalogError;
pub use unit::{
    ActionError, ActionResult, MigrationSet, MigrationSetBuilder, MigrationUnit,
    MigrationUnitBuilder,
};
pub use version::{Version, VersionRange};
