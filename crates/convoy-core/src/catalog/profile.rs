//! Profile matching for sets and units.

/// Whether a declared profile list is satisfied by the active profiles.
///
/// An empty declaration always matches. Otherwise the list matches when
/// any positive entry is active, or any negated entry (`"!name"`) names a
/// profile that is not active. Matching is exact and case-sensitive.
pub(crate) fn profiles_match(declared: &[String], active: &[String]) -> bool {
    if declared.is_empty() {
        return true;
    }
    declared.iter().any(|profile| match profile.strip_prefix('!') {
        Some(negated) => !active.iter().any(|a| a == negated),
        None => active.iter().any(|a| a == profile),
    })
}

#[cfg(test)]
mod tests {
    use super::profiles_match;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn empty_declaration_always_matches() {
        assert!(profiles_match(&[], &[]));
        assert!(profiles_match(&[], &strings(&["prod"])));
    }

    #[test]
    fn positive_entry_requires_active_profile() {
        let declared = strings(&["prod"]);
        assert!(profiles_match(&declared, &strings(&["prod", "eu"])));
        assert!(!profiles_match(&declared, &strings(&["staging"])));
        assert!(!profiles_match(&declared, &[]));
    }

    #[test]
    fn negated_entry_matches_when_profile_inactive() {
        let declared = strings(&["!prod"]);
        assert!(profiles_match(&declared, &[]));
        assert!(profiles_match(&declared, &strings(&["staging"])));
        assert!(!profiles_match(&declared, &strings(&["prod"])));
    }

    #[test]
    fn any_entry_can_satisfy_the_list() {
        let declared = strings(&["prod", "!blue"]);
        // "!blue" passes while blue is inactive, even without prod.
        assert!(profiles_match(&declared, &strings(&["staging"])));
        // prod passes even though blue is active.
        assert!(profiles_match(&declared, &strings(&["prod", "blue"])));
        assert!(!profiles_match(&declared, &strings(&["blue"])));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!profiles_match(&strings(&["Prod"]), &strings(&["prod"])));
    }
}
