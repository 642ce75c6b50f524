//! Metadata match criteria.
//!
//! # Design Decisions
//! - Built once per request, immutable afterwards
//! - Entries kept sorted by key so iteration order is stable
//! - A host matches iff every criterion's key is present in its metadata
//!   with exactly that value; extra metadata keys are ignored
//! - Empty criteria match every host

use std::collections::BTreeMap;
use std::fmt;

use crate::cluster::host::Metadata;

/// One `key == value` constraint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchCriterion {
    pub name: String,
    pub value: String,
}

/// Ordered set of metadata constraints derived from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MetadataMatchCriteria {
    criteria: Vec<MatchCriterion>,
}

impl MetadataMatchCriteria {
    /// Build criteria from a key/value mapping. Later duplicates of a key win.
    pub fn new<I, K, V>(mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let sorted: BTreeMap<String, String> = mapping
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            criteria: sorted
                .into_iter()
                .map(|(name, value)| MatchCriterion { name, value })
                .collect(),
        }
    }

    /// Criteria that match every host.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn criteria(&self) -> &[MatchCriterion] {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// True iff `metadata` contains every `(key, value)` pair.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.criteria
            .iter()
            .all(|c| metadata.get(&c.name) == Some(&c.value))
    }

    /// Overlay `overrides` on top of `self`; on key conflicts `overrides` wins.
    ///
    /// Used to combine route-level criteria with request-level ones.
    pub fn merge(&self, overrides: &MetadataMatchCriteria) -> Self {
        Self::new(
            self.criteria
                .iter()
                .chain(overrides.criteria.iter())
                .map(|c| (c.name.clone(), c.value.clone())),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetadataMatchCriteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for MetadataMatchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, c) in self.criteria.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", c.name, c.value)?;
        }
        write!(f, "}}")
    }
}
