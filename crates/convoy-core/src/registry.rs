//! Typed resources handed to migration actions.
//!
//! Migration bodies receive their collaborators (database handles,
//! clients, tuning values) through a [`ResourceRegistry`] instead of
//! globals. Resources are keyed by `(name, type)`, so one name may serve
//! several types and one type several names; lookups return shared
//! handles and never panic.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Name used by [`ResourceRegistry::insert_default`] and
/// [`ResourceRegistry::get_default`].
pub const DEFAULT_RESOURCE_NAME: &str = "default";

/// Resolution failures. All lookups are total functions over these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// No resource under the requested name and type.
    #[error("no resource named '{name}' of type {type_name}")]
    MissingResource {
        /// Requested name.
        name: String,
        /// Requested type.
        type_name: &'static str,
    },

    /// The name exists, but under a different type.
    #[error("resource '{name}' is a {found}, not a {expected}")]
    TypeMismatch {
        /// Requested name.
        name: String,
        /// Requested type.
        expected: &'static str,
        /// Type actually registered under the name.
        found: &'static str,
    },

    /// No resource of the requested type at all.
    #[error("no resource of type {type_name}")]
    MissingType {
        /// Requested type.
        type_name: &'static str,
    },

    /// Several resources share the requested type; a by-type lookup
    /// cannot choose between them.
    #[error("{count} resources of type {type_name}; fetch by name instead")]
    AmbiguousType {
        /// Requested type.
        type_name: &'static str,
        /// How many entries carry it.
        count: usize,
    },
}

struct RegistryEntry {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Named, typed resource map passed by reference to every action.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: HashMap<(String, TypeId), RegistryEntry>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ResourceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` under `name`, replacing any previous entry with
    /// the same name and type.
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.entries.insert(
            (name.into(), TypeId::of::<T>()),
            RegistryEntry {
                value: Arc::new(value),
                type_name: type_name::<T>(),
            },
        );
    }

    /// Registers `value` under [`DEFAULT_RESOURCE_NAME`].
    pub fn insert_default<T: Any + Send + Sync>(&mut self, value: T) {
        self.insert(DEFAULT_RESOURCE_NAME, value);
    }

    /// Fetches the resource registered under `name` with type `T`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::TypeMismatch`] when the name is bound to another
    /// type; [`RegistryError::MissingResource`] when it is unbound.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        if let Some(entry) = self.entries.get(&(name.to_string(), TypeId::of::<T>())) {
            if let Ok(value) = Arc::clone(&entry.value).downcast::<T>() {
                return Ok(value);
            }
        }
        match self
            .entries
            .iter()
            .find(|((entry_name, _), _)| entry_name == name)
        {
            Some((_, entry)) => Err(RegistryError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
                found: entry.type_name,
            }),
            None => Err(RegistryError::MissingResource {
                name: name.to_string(),
                type_name: type_name::<T>(),
            }),
        }
    }

    /// Fetches the resource registered under [`DEFAULT_RESOURCE_NAME`].
    ///
    /// # Errors
    ///
    /// Same as [`ResourceRegistry::get`].
    pub fn get_default<T: Any + Send + Sync>(&self) -> Result<Arc<T>, RegistryError> {
        self.get(DEFAULT_RESOURCE_NAME)
    }

    /// Fetches the single resource of type `T`, whatever its name.
    ///
    /// # Errors
    ///
    /// [`RegistryError::MissingType`] when no entry has the type,
    /// [`RegistryError::AmbiguousType`] when several do.
    pub fn get_by_type<T: Any + Send + Sync>(&self) -> Result<Arc<T>, RegistryError> {
        let mut found: Option<&RegistryEntry> = None;
        let mut count = 0usize;
        for ((_, type_id), entry) in &self.entries {
            if *type_id == TypeId::of::<T>() {
                count += 1;
                found = Some(entry);
            }
        }
        match (count, found) {
            (1, Some(entry)) => {
                if let Ok(value) = Arc::clone(&entry.value).downcast::<T>() {
                    Ok(value)
                } else {
                    Err(RegistryError::MissingType {
                        type_name: type_name::<T>(),
                    })
                }
            },
            (0, _) | (_, None) => Err(RegistryError::MissingType {
                type_name: type_name::<T>(),
            }),
            (count, _) => Err(RegistryError::AmbiguousType {
                type_name: type_name::<T>(),
                count,
            }),
        }
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Endpoint(String);

    #[test]
    fn insert_and_get_by_name() {
        let mut registry = ResourceRegistry::new();
        registry.insert("primary", Endpoint("db-1".to_string()));

        let endpoint = registry.get::<Endpoint>("primary").expect("resolve");
        assert_eq!(*endpoint, Endpoint("db-1".to_string()));
    }

    #[test]
    fn default_name_round_trips() {
        let mut registry = ResourceRegistry::new();
        registry.insert_default(42u32);
        assert_eq!(*registry.get_default::<u32>().expect("resolve"), 42);
    }

    #[test]
    fn reinsert_replaces_same_name_and_type() {
        let mut registry = ResourceRegistry::new();
        registry.insert("primary", Endpoint("old".to_string()));
        registry.insert("primary", Endpoint("new".to_string()));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get::<Endpoint>("primary").expect("resolve").0,
            "new"
        );
    }

    #[test]
    fn one_name_may_carry_several_types() {
        let mut registry = ResourceRegistry::new();
        registry.insert("primary", Endpoint("db-1".to_string()));
        registry.insert("primary", 7u32);

        assert_eq!(registry.len(), 2);
        assert!(registry.get::<Endpoint>("primary").is_ok());
        assert!(registry.get::<u32>("primary").is_ok());
    }

    #[test]
    fn unbound_name_is_missing_resource() {
        let registry = ResourceRegistry::new();
        assert!(matches!(
            registry.get::<Endpoint>("primary"),
            Err(RegistryError::MissingResource { .. })
        ));
    }

    #[test]
    fn wrong_type_is_reported_as_mismatch() {
        let mut registry = ResourceRegistry::new();
        registry.insert("primary", Endpoint("db-1".to_string()));

        match registry.get::<u32>("primary") {
            Err(RegistryError::TypeMismatch { name, .. }) => assert_eq!(name, "primary"),
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn by_type_lookup_requires_uniqueness() {
        let mut registry = ResourceRegistry::new();
        assert!(matches!(
            registry.get_by_type::<Endpoint>(),
            Err(RegistryError::MissingType { .. })
        ));

        registry.insert("primary", Endpoint("db-1".to_string()));
        assert_eq!(
            registry.get_by_type::<Endpoint>().expect("resolve").0,
            "db-1"
        );

        registry.insert("secondary", Endpoint("db-2".to_string()));
        assert!(matches!(
            registry.get_by_type::<Endpoint>(),
            Err(RegistryError::AmbiguousType { count: 2, .. })
        ));
    }
}
