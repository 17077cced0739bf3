//! Catalog construction and ordering tests.

use super::{
    CatalogError, CatalogOptions, MigrationCatalog, MigrationSet, MigrationUnit, Version,
    VersionRange,
};

fn unit(id: &str, author: &str, order: &str) -> MigrationUnit {
    MigrationUnit::builder(id)
        .author(author)
        .order(order)
        .execution(|_resources| Ok(()))
        .build()
        .expect("unit")
}

fn catalog_ids(catalog: &MigrationCatalog) -> Vec<String> {
    catalog
        .entries()
        .iter()
        .map(|entry| entry.id().to_string())
        .collect()
}

// =========================================================================
// Versions
// =========================================================================

#[test]
fn versions_compare_numerically_per_segment() {
    let parse = |raw| Version::parse(raw).expect("version");
    assert!(parse("1.2.10") > parse("1.2.9"));
    assert!(parse("1.10") > parse("1.9"));
    assert!(parse("0.1") < parse("1"));
    assert_eq!(parse("1.0.0"), parse("1"));
}

#[test]
fn version_rejects_non_numeric_segments() {
    assert!(matches!(
        Version::parse("1.x"),
        Err(CatalogError::InvalidVersion { .. })
    ));
    assert!(matches!(
        Version::parse(""),
        Err(CatalogError::InvalidVersion { .. })
    ));
}

#[test]
fn version_range_is_inclusive_on_both_ends() {
    let range = VersionRange::parse(Some("1.0"), Some("2.0")).expect("range");
    let contains = |raw| range.contains(&Version::parse(raw).expect("version"));
    assert!(contains("1.0"));
    assert!(contains("1.5.3"));
    assert!(contains("2.0"));
    assert!(contains("2"));
    assert!(!contains("0.9.9"));
    assert!(!contains("2.0.1"));

    let unbounded = VersionRange::default();
    assert!(unbounded.contains(&Version::parse("0").expect("version")));
    assert!(unbounded.contains(&Version::parse("999.999").expect("version")));
}

// =========================================================================
// Builders
// =========================================================================

#[test]
fn unit_builder_validates_required_fields() {
    let err = MigrationUnit::builder("")
        .order("001")
        .execution(|_| Ok(()))
        .build()
        .expect_err("empty id");
    assert!(matches!(err, CatalogError::InvalidUnit { .. }));

    let err = MigrationUnit::builder("a")
        .execution(|_| Ok(()))
        .build()
        .expect_err("missing order");
    assert!(matches!(err, CatalogError::InvalidUnit { ref reason, .. } if reason.contains("order")));

    let err = MigrationUnit::builder("a")
        .order("001")
        .build()
        .expect_err("missing execution");
    assert!(
        matches!(err, CatalogError::InvalidUnit { ref reason, .. } if reason.contains("execution"))
    );

    let err = MigrationUnit::builder("a")
        .order("001")
        .author("")
        .execution(|_| Ok(()))
        .build()
        .expect_err("empty author");
    assert!(matches!(err, CatalogError::InvalidUnit { ref reason, .. } if reason.contains("author")));

    let err = MigrationUnit::builder("a")
        .order("001")
        .system_version("1.beta")
        .execution(|_| Ok(()))
        .build()
        .expect_err("bad version");
    assert!(matches!(err, CatalogError::InvalidVersion { .. }));
}

#[test]
fn unit_defaults() {
    let built = MigrationUnit::builder("a")
        .author("dev")
        .order("001")
        .execution(|_| Ok(()))
        .build()
        .expect("unit");
    assert_eq!(built.system_version(), &Version::parse("0").expect("zero"));
    assert!(!built.run_always());
    assert!(built.fail_fast());
    assert!(!built.has_before());
    assert!(!built.has_rollback());
}

#[test]
fn set_builder_rejects_duplicate_unit_ids() {
    let err = MigrationSet::builder("clients")
        .unit(unit("a", "dev", "001"))
        .unit(unit("a", "other", "002"))
        .build()
        .expect_err("duplicate id");
    match err {
        CatalogError::DuplicateIdInSet { set, id } => {
            assert_eq!(set, "clients");
            assert_eq!(id, "a");
        },
        other => panic!("expected DuplicateIdInSet, got {other:?}"),
    }
}

// =========================================================================
// Ordering
// =========================================================================

#[test]
fn sets_without_order_come_first_by_name() {
    let sets = vec![
        MigrationSet::builder("zeta")
            .order("01")
            .unit(unit("z1", "dev", "001"))
            .build()
            .expect("set"),
        MigrationSet::builder("beta")
            .unit(unit("b1", "dev", "001"))
            .build()
            .expect("set"),
        MigrationSet::builder("omega")
            .order("00")
            .unit(unit("o1", "dev", "001"))
            .build()
            .expect("set"),
        MigrationSet::builder("alpha")
            .unit(unit("a1", "dev", "001"))
            .build()
            .expect("set"),
    ];

    let catalog = MigrationCatalog::build(sets, &CatalogOptions::default()).expect("catalog");
    assert_eq!(catalog_ids(&catalog), vec!["a1", "b1", "o1", "z1"]);
}

#[test]
fn units_sort_lexically_within_a_set() {
    let set = MigrationSet::builder("clients")
        .unit(unit("two", "dev", "2"))
        .unit(unit("ten", "dev", "10"))
        .unit(unit("padded-ten", "dev", "010"))
        .build()
        .expect("set");

    let catalog =
        MigrationCatalog::build(vec![set], &CatalogOptions::default()).expect("catalog");
    // Lexical, not numeric: "010" < "10" < "2".
    assert_eq!(catalog_ids(&catalog), vec!["padded-ten", "ten", "two"]);
}

// =========================================================================
// Filtering
// =========================================================================

#[test]
fn profile_filter_drops_sets_and_units_silently() {
    let sets = vec![
        MigrationSet::builder("prod-only")
            .profile("prod")
            .unit(unit("p1", "dev", "001"))
            .build()
            .expect("set"),
        MigrationSet::builder("everywhere")
            .unit(unit("e1", "dev", "001"))
            .unit(
                MigrationUnit::builder("e2-staging")
                    .author("dev")
                    .order("002")
                    .profile("staging")
                    .execution(|_| Ok(()))
                    .build()
                    .expect("unit"),
            )
            .build()
            .expect("set"),
    ];

    let options = CatalogOptions {
        active_profiles: vec!["staging".to_string()],
        ..CatalogOptions::default()
    };
    let catalog = MigrationCatalog::build(sets, &options).expect("catalog");
    assert_eq!(catalog_ids(&catalog), vec!["e1", "e2-staging"]);
}

#[test]
fn version_window_drops_out_of_range_units() {
    let set = MigrationSet::builder("clients")
        .unit(
            MigrationUnit::builder("old")
                .author("dev")
                .order("001")
                .system_version("0.9")
                .execution(|_| Ok(()))
                .build()
                .expect("unit"),
        )
        .unit(
            MigrationUnit::builder("current")
                .author("dev")
                .order("002")
                .system_version("1.5")
                .execution(|_| Ok(()))
                .build()
                .expect("unit"),
        )
        .unit(
            MigrationUnit::builder("future")
                .author("dev")
                .order("003")
                .system_version("3.0")
                .execution(|_| Ok(()))
                .build()
                .expect("unit"),
        )
        .build()
        .expect("set");

    let options = CatalogOptions {
        version_range: VersionRange::parse(Some("1"), Some("2")).expect("range"),
        ..CatalogOptions::default()
    };
    let catalog = MigrationCatalog::build(vec![set], &options).expect("catalog");
    assert_eq!(catalog_ids(&catalog), vec!["current"]);
}

// =========================================================================
// Identity
// =========================================================================

#[test]
fn duplicate_identity_across_sets_is_fatal() {
    let sets = vec![
        MigrationSet::builder("first")
            .unit(unit("a", "dev", "001"))
            .build()
            .expect("set"),
        MigrationSet::builder("second")
            .unit(unit("a", "dev", "001"))
            .build()
            .expect("set"),
    ];

    let err = MigrationCatalog::build(sets, &CatalogOptions::default())
        .expect_err("duplicate identity");
    match err {
        CatalogError::DuplicateMigration { id, author } => {
            assert_eq!(id, "a");
            assert_eq!(author, "dev");
        },
        other => panic!("expected DuplicateMigration, got {other:?}"),
    }
}

#[test]
fn same_id_with_different_author_is_distinct() {
    let sets = vec![
        MigrationSet::builder("first")
            .unit(unit("a", "alice", "001"))
            .build()
            .expect("set"),
        MigrationSet::builder("second")
            .unit(unit("a", "bob", "001"))
            .build()
            .expect("set"),
    ];

    let catalog = MigrationCatalog::build(sets, &CatalogOptions::default()).expect("catalog");
    assert_eq!(catalog.len(), 2);
}

#[test]
fn default_author_fills_undeclared_units() {
    let set = MigrationSet::builder("clients")
        .unit(
            MigrationUnit::builder("anonymous")
                .order("001")
                .execution(|_| Ok(()))
                .build()
                .expect("unit"),
        )
        .build()
        .expect("set");

    let options = CatalogOptions {
        default_author: Some("platform".to_string()),
        ..CatalogOptions::default()
    };
    let catalog = MigrationCatalog::build(vec![set], &options).expect("catalog");
    assert_eq!(catalog.entries()[0].author(), "platform");
}

#[test]
fn unit_without_any_author_is_rejected() {
    let set = MigrationSet::builder("clients")
        .unit(
            MigrationUnit::builder("anonymous")
                .order("001")
                .execution(|_| Ok(()))
                .build()
                .expect("unit"),
        )
        .build()
        .expect("set");

    let err = MigrationCatalog::build(vec![set], &CatalogOptions::default())
        .expect_err("no author anywhere");
    assert!(matches!(err, CatalogError::InvalidUnit { ref reason, .. } if reason.contains("author")));
}
