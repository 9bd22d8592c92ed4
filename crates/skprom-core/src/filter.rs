//! Path filtering: decides which flattened leaf paths are stored.
//!
//! Matching is exact string equality on the full leaf path. There is no
//! prefix or glob support: `navigation.position` does not match
//! `navigation.position.latitude`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// How the configured path list is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    /// Store only the listed paths.
    #[serde(rename = "White")]
    Inclusive,
    /// Store everything except the listed paths.
    #[serde(rename = "Black")]
    Exclusive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PathFilter {
    #[default]
    AllowAll,
    Include(HashSet<String>),
    Exclude(HashSet<String>),
}

impl PathFilter {
    /// Build a filter from optional settings.
    ///
    /// A missing mode, a missing list, or an empty list all yield the
    /// permissive filter.
    pub fn configure(mode: Option<FilterMode>, patterns: Option<&[String]>) -> Self {
        let (Some(mode), Some(patterns)) = (mode, patterns) else {
            return PathFilter::AllowAll;
        };
        if patterns.is_empty() {
            return PathFilter::AllowAll;
        }
        let set: HashSet<String> = patterns.iter().cloned().collect();
        match mode {
            FilterMode::Inclusive => PathFilter::Include(set),
            FilterMode::Exclusive => PathFilter::Exclude(set),
        }
    }

    pub fn should_store(&self, path: &str) -> bool {
        match self {
            PathFilter::AllowAll => true,
            PathFilter::Include(set) => set.contains(path),
            PathFilter::Exclude(set) => !set.contains(path),
        }
    }

    pub fn is_permissive(&self) -> bool {
        matches!(self, PathFilter::AllowAll)
    }
}
