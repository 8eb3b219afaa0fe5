//! Tolerant comparison of access predicates written in different surface syntaxes.
//!
//! Postgres re-renders stored policy expressions (extra parentheses, `::text`
//! casts, `SELECT true AS bool`), Hasura metadata is YAML and the registry is
//! hand-authored SQL or JSON. Comparing their normalized forms lets all three
//! be checked against each other without a full expression parser.

const TEXT_CAST: &str = "::text";
const RENDERED_TRUE: &str = "trueasbool";

/// Canonicalize a predicate for comparison.
///
/// Removes `::text`, lowercases, drops every character outside `[a-z0-9]` and
/// collapses the `trueasbool` artefact to `true`. The collapse is repeated
/// until no occurrence remains so the result is a fixed point.
pub fn normalize(s: &str) -> String {
    let lowered = s.replace(TEXT_CAST, "").to_lowercase();
    let mut out: String = lowered
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    while out.contains(RENDERED_TRUE) {
        out = out.replace(RENDERED_TRUE, "true");
    }
    out
}

/// True when the normalized `needle` occurs inside the normalized `haystack`.
///
/// The check is asymmetric: `haystack` may carry extra boilerplate that
/// `needle` lacks, but not the other way round. An empty `needle` always matches.
pub fn contains_normalized(haystack: &str, needle: &str) -> bool {
    normalize(haystack).contains(&normalize(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_casts_case_and_punctuation() {
        assert_eq!(
            normalize("(current_setting('app.user_id'::text) = owners)"),
            "currentsettingappuseridowners"
        );
        assert_eq!(normalize("SELECT true AS bool"), "selecttrue");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn rendered_and_authored_predicates_compare_equal() {
        let rendered = "(true <= ( SELECT true AS bool\n   FROM (granted_permissions p\n     JOIN docs_access_paths usp ON ((usp.location_id = p.location_id)))\n  WHERE ((p.user_id = current_setting('app.user_id'::text)) AND (p.permission_name = 'accesscontrol.docs.read'::text))\n LIMIT 1))";
        let authored = "true <= (\n  select\t\t\t\n    true\n  from\n          granted_permissions p\n  join docs_access_paths usp on\n          usp.location_id = p.location_id\n  where\n    p.user_id = current_setting('app.user_id')\n    and p.permission_name = 'accesscontrol.docs.read'\n  limit 1\n  )\n";
        assert_eq!(normalize(rendered), normalize(authored));
        assert!(contains_normalized(authored, rendered));
    }

    #[test]
    fn containment_is_directional() {
        assert!(contains_normalized("(1 = 1) AND x", "1 = 1"));
        assert!(!contains_normalized("1 = 1", "(1 = 1) AND x"));
        assert!(contains_normalized("anything", ""));
    }

    #[test]
    fn repeated_boolean_artefacts_collapse_fully() {
        assert_eq!(normalize("true as bool as bool"), "true");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(s in ".*") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn normalized_form_contains_itself(s in ".*") {
            prop_assert!(contains_normalized(&s, &s));
        }

        #[test]
        fn normalized_form_is_ascii_alphanumeric(s in ".*") {
            prop_assert!(normalize(&s).chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
