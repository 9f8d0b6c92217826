//! Per-release sets of defective methods

use crate::models::MethodIdentity;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Release name to the methods known to be defective in that release.
///
/// Mutation is union-only: a method once marked buggy in a release stays so.
#[derive(Debug, Clone, Default)]
pub struct BuggyMethodSet {
    by_release: BTreeMap<String, HashSet<MethodIdentity>>,
}

impl BuggyMethodSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark<'a, I>(&mut self, release: &str, methods: I)
    where
        I: IntoIterator<Item = &'a MethodIdentity>,
    {
        self.by_release
            .entry(release.to_string())
            .or_default()
            .extend(methods.into_iter().cloned());
    }

    pub fn is_buggy(&self, release: &str, method: &MethodIdentity) -> bool {
        self.by_release
            .get(release)
            .is_some_and(|set| set.contains(method))
    }

    /// Buggy-method check by signature alone.
    pub fn contains_signature(&self, release: &str, signature: &str) -> bool {
        self.by_release
            .get(release)
            .is_some_and(|set| set.iter().any(|m| m.full_signature == signature))
    }

    pub fn methods(&self, release: &str) -> Option<&HashSet<MethodIdentity>> {
        self.by_release.get(release)
    }

    pub fn releases(&self) -> impl Iterator<Item = &str> {
        self.by_release.keys().map(String::as_str)
    }

    /// Total (release, method) pairs.
    pub fn len(&self) -> usize {
        self.by_release.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted signatures per release, for reporting.
    pub fn to_sorted(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.by_release
            .iter()
            .map(|(release, set)| {
                (
                    release.clone(),
                    set.iter().map(|m| m.full_signature.clone()).collect(),
                )
            })
            .collect()
    }
}

impl Serialize for BuggyMethodSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_sorted().serialize(serializer)
    }
}
