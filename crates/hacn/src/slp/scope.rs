// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sets of SLP scopes.
//!
//! Scopes are administrative partition labels. They are compared in
//! canonical form, so a `ScopeSet` canonicalizes (and SLP-unescapes) every
//! scope on entry.

use super::strings;
use std::collections::BTreeSet;
use std::fmt;

/// An unordered set of canonicalized scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    scopes: BTreeSet<String>,
}

impl ScopeSet {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a comma separated, possibly escaped, string.
    pub fn from_string(scopes: &str) -> Self {
        let mut set = BTreeSet::new();
        for scope in scopes.split(',') {
            let canonical = strings::canonicalize(&strings::unescape(scope));
            if !canonical.is_empty() {
                set.insert(canonical);
            }
        }
        ScopeSet { scopes: set }
    }

    /// Build from individual scope strings.
    pub fn from_scopes<I: IntoIterator<Item = S>, S: AsRef<str>>(scopes: I) -> Self {
        let set = scopes
            .into_iter()
            .map(|s| strings::canonicalize(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        ScopeSet { scopes: set }
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Membership, canonicalizing the probe.
    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains(&strings::canonicalize(scope))
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.scopes.iter()
    }

    /// True if the sets share at least one scope.
    pub fn intersects(&self, other: &ScopeSet) -> bool {
        self.scopes.iter().any(|s| other.scopes.contains(s))
    }

    /// Number of shared scopes.
    pub fn intersection_count(&self, other: &ScopeSet) -> usize {
        self.scopes
            .iter()
            .filter(|s| other.scopes.contains(*s))
            .count()
    }

    /// The shared scopes.
    pub fn intersection(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet {
            scopes: self
                .scopes
                .intersection(&other.scopes)
                .cloned()
                .collect(),
        }
    }

    /// The scopes in `self` but not `other`.
    pub fn difference(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet {
            scopes: self.scopes.difference(&other.scopes).cloned().collect(),
        }
    }

    /// Superset test; equal sets count as supersets.
    pub fn is_superset(&self, other: &ScopeSet) -> bool {
        self.scopes.is_superset(&other.scopes)
    }

    /// Add every scope from `other`.
    pub fn update(&mut self, other: &ScopeSet) {
        self.scopes.extend(other.scopes.iter().cloned());
    }

    /// Comma separated, SLP-escaped, ready for the wire.
    pub fn to_escaped_string(&self) -> String {
        let escaped: Vec<String> = self.scopes.iter().map(|s| strings::escape(s)).collect();
        escaped.join(",")
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        write!(f, "{}", joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_canonicalizes() {
        let scopes = ScopeSet::from_string("One, TWO ,three");
        assert_eq!(scopes.len(), 3);
        assert!(scopes.contains("one"));
        assert!(scopes.contains("Two"));
        assert!(scopes.contains(" three "));
    }

    #[test]
    fn test_empty_components_skipped() {
        let scopes = ScopeSet::from_string("one,,two,");
        assert_eq!(scopes.len(), 2);
        assert!(ScopeSet::from_string("").is_empty());
    }

    #[test]
    fn test_set_operations() {
        let a = ScopeSet::from_string("one,two");
        let b = ScopeSet::from_string("two,three");
        assert!(a.intersects(&b));
        assert_eq!(a.intersection_count(&b), 1);
        assert_eq!(a.intersection(&b), ScopeSet::from_string("two"));
        assert_eq!(a.difference(&b), ScopeSet::from_string("one"));
        assert!(!a.is_superset(&b));
        assert!(a.is_superset(&ScopeSet::from_string("one")));
        assert!(a.is_superset(&a));
    }

    #[test]
    fn test_update() {
        let mut a = ScopeSet::from_string("one");
        a.update(&ScopeSet::from_string("two"));
        assert_eq!(a, ScopeSet::from_string("one,two"));
    }

    #[test]
    fn test_escaped_round_trip() {
        let scopes = ScopeSet::from_scopes(["sco,pe", "plain"]);
        let escaped = scopes.to_escaped_string();
        assert_eq!(ScopeSet::from_string(&escaped), scopes);
    }

    #[test]
    fn test_display_is_comma_joined() {
        let scopes = ScopeSet::from_string("b,a");
        assert_eq!(scopes.to_string(), "a,b");
    }
}
