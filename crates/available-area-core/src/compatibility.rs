use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Pairwise answer to "may these two actions occupy the same land at once?".
///
/// Callers pass the candidate code first and the already-placed code second.
/// Implementations MUST be pure for the lifetime of a calculation.
pub trait CompatibilityCheck {
    fn is_compatible(&self, action_code: &str, other_code: &str) -> bool;
}

impl<F> CompatibilityCheck for F
where
    F: Fn(&str, &str) -> bool,
{
    fn is_compatible(&self, action_code: &str, other_code: &str) -> bool {
        self(action_code, other_code)
    }
}

/// One row of the compatibility reference table.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityRule {
    pub option_code: String,
    pub option_code_compat: String,
}

impl CompatibilityRule {
    #[must_use]
    pub fn new(option_code: impl Into<String>, option_code_compat: impl Into<String>) -> Self {
        Self { option_code: option_code.into(), option_code_compat: option_code_compat.into() }
    }
}

/// Immutable snapshot of the compatibility reference table.
///
/// Rows may be registered in one direction only; lookups test both orderings.
/// Codes the table has never seen are incompatible with everything.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CompatibilityMatrix {
    pairs: BTreeMap<String, BTreeSet<String>>,
    known_codes: BTreeSet<String>,
}

impl CompatibilityMatrix {
    #[must_use]
    pub fn from_rules(rules: &[CompatibilityRule]) -> Self {
        Self::from_pairs(
            rules.iter().map(|rule| (rule.option_code.as_str(), rule.option_code_compat.as_str())),
        )
    }

    #[must_use]
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut matrix = Self::default();
        for (option_code, option_code_compat) in pairs {
            matrix
                .pairs
                .entry(option_code.to_string())
                .or_default()
                .insert(option_code_compat.to_string());
            matrix.known_codes.insert(option_code.to_string());
            matrix.known_codes.insert(option_code_compat.to_string());
        }
        matrix
    }

    #[must_use]
    pub fn knows(&self, code: &str) -> bool {
        self.known_codes.contains(code)
    }

    /// Codes from `codes` that appear in no row of the table, deduplicated and sorted.
    #[must_use]
    pub fn unknown_codes<'a, I>(&self, codes: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        codes
            .into_iter()
            .filter(|code| !self.knows(code))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn registered(&self, lhs: &str, rhs: &str) -> bool {
        self.pairs.get(lhs).is_some_and(|compatible| compatible.contains(rhs))
    }
}

impl CompatibilityCheck for CompatibilityMatrix {
    fn is_compatible(&self, action_code: &str, other_code: &str) -> bool {
        self.registered(action_code, other_code) || self.registered(other_code, action_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipm4_matrix() -> CompatibilityMatrix {
        CompatibilityMatrix::from_rules(&[
            CompatibilityRule::new("AB1", "CSAM1"),
            CompatibilityRule::new("AB1", "PRF1"),
            CompatibilityRule::new("AB1", "SOH1"),
            CompatibilityRule::new("CSAM1", "PRF1"),
            CompatibilityRule::new("CSAM1", "SOH1"),
            CompatibilityRule::new("PRF1", "SOH1"),
        ])
    }

    #[test]
    fn one_directional_rows_are_symmetric() {
        let matrix = cipm4_matrix();
        assert!(matrix.is_compatible("AB1", "PRF1"));
        assert!(matrix.is_compatible("PRF1", "AB1"));
        assert!(matrix.is_compatible("SOH1", "CSAM1"));
    }

    #[test]
    fn unregistered_pairs_are_incompatible() {
        let matrix = cipm4_matrix();
        assert!(!matrix.is_compatible("AB1", "AB1"));
        assert!(!matrix.is_compatible("SW1", "AB1"));
        assert!(!matrix.is_compatible("AB1", "SW1"));
    }

    #[test]
    fn unknown_codes_are_reported_once_in_order() {
        let matrix = cipm4_matrix();
        assert!(matrix.knows("SOH1"));
        assert_eq!(
            matrix.unknown_codes(["SW1", "PRF1", "UPL1", "SW1"]),
            vec!["SW1".to_string(), "UPL1".to_string()]
        );
    }

    #[test]
    fn duplicate_rows_do_not_inflate_len() {
        let matrix = CompatibilityMatrix::from_pairs([("A", "B"), ("A", "B"), ("B", "A")]);
        assert_eq!(matrix.len(), 2);
        assert!(!matrix.is_empty());
        assert!(CompatibilityMatrix::default().is_empty());
    }

    #[test]
    fn closures_act_as_compatibility_checks() {
        let everything = |_: &str, _: &str| true;
        assert!(everything.is_compatible("CMOR1", "UPL1"));
    }
}
