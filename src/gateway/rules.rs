//! Allow-list and prefix rules for the reserved namespace

use super::path::normalize_path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Policy attached to a prefix rule
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubtreePolicy {
    /// Any path below the prefix is served locally
    #[default]
    AllowSubtree,
    /// Any path below the prefix is rejected, whatever the gateway mode
    DenySubtree,
}

impl fmt::Display for SubtreePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubtreePolicy::AllowSubtree => write!(f, "allow-subtree"),
            SubtreePolicy::DenySubtree => write!(f, "deny-subtree"),
        }
    }
}

/// The path prefix that scopes what the gateway looks at.
///
/// Scope is segment-aware: `/api` covers `/api` and `/api/...` but not `/apix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedPrefix(String);

impl ReservedPrefix {
    /// Wrap an already validated prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a normalized path falls inside the namespace
    pub fn contains(&self, path: &str) -> bool {
        is_at_or_below(path, &self.0)
    }
}

impl fmt::Display for ReservedPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `(prefix, policy)` pair covering every path strictly below `prefix`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRule {
    pub prefix: String,
    pub policy: SubtreePolicy,
}

impl PrefixRule {
    pub fn new(prefix: &str, policy: SubtreePolicy) -> Self {
        Self {
            prefix: normalize_path(prefix).to_string(),
            policy,
        }
    }

    /// The bare prefix does not match; a `/` and suffix must follow it
    pub fn matches(&self, path: &str) -> bool {
        path.strip_prefix(self.prefix.as_str())
            .map(|rest| rest.starts_with('/') && rest.len() > 1)
            .unwrap_or(false)
    }
}

/// Result of looking a path up in the [`RouteTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    Exact,
    Subtree(SubtreePolicy),
}

/// Compiled allow-list for one reserved namespace
#[derive(Debug, Clone)]
pub struct RouteTable {
    prefix: ReservedPrefix,
    exact: BTreeSet<String>,
    /// Longest prefix first
    rules: Vec<PrefixRule>,
}

impl RouteTable {
    pub fn new<I, S>(prefix: ReservedPrefix, local_paths: I, rules: Vec<PrefixRule>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let exact = local_paths
            .into_iter()
            .map(|p| normalize_path(p.as_ref()).to_string())
            .collect();

        let mut rules = rules;
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Self {
            prefix,
            exact,
            rules,
        }
    }

    pub fn prefix(&self) -> &ReservedPrefix {
        &self.prefix
    }

    /// Allow-listed exact paths in sorted order
    pub fn local_paths(&self) -> impl Iterator<Item = &str> {
        self.exact.iter().map(String::as_str)
    }

    pub fn rules(&self) -> &[PrefixRule] {
        &self.rules
    }

    /// Look up a normalized path. Exact entries win over prefix rules and
    /// the longest matching prefix rule wins over shorter ones.
    pub fn lookup(&self, path: &str) -> Option<RuleMatch> {
        if self.exact.contains(path) {
            return Some(RuleMatch::Exact);
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| RuleMatch::Subtree(rule.policy))
    }
}

/// `path == base` or `path` continues `base` with a `/`
pub(crate) fn is_at_or_below(path: &str, base: &str) -> bool {
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || base.ends_with('/'),
        None => false,
    }
}
