//! Gateway router
//!
//! Classifies every request path against the reserved namespace:
//! - paths outside the namespace pass through untouched
//! - allow-listed paths are served by in-process handlers
//! - everything else under the namespace is rejected, or forwarded to the
//!   upstream origin when the gateway runs in proxy mode
//!
//! Classification is a pure function of the path and the compiled
//! configuration. It performs no I/O and keeps no state between calls, so the
//! same [`Gateway`] can back the async server middleware and the synchronous
//! [`edge`] adapter.

pub mod edge;
pub mod path;
pub mod rewrite;
pub mod rules;

use crate::config::{ConfigError, GatewayConfig};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use path::{is_well_formed, normalize_path};
pub use rewrite::{Origin, RewriteError, RewriteRule, RewriteTable};
pub use rules::{PrefixRule, ReservedPrefix, RouteTable, RuleMatch, SubtreePolicy};

/// Status returned for rejected reserved-prefix requests
pub const REJECTION_STATUS: StatusCode = StatusCode::SERVICE_UNAVAILABLE;

/// Body returned for rejected reserved-prefix requests
pub const REJECTION_BODY: &str = "API not available";

/// What happens to reserved-prefix paths that are not allow-listed
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// Answer with the fixed rejection response
    #[default]
    Reject,
    /// Forward to the upstream origin through the rewrite table
    Proxy,
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayMode::Reject => write!(f, "reject"),
            GatewayMode::Proxy => write!(f, "proxy"),
        }
    }
}

/// Why a reserved-prefix path was not allowed through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Not covered by any allow rule
    Unlisted,
    /// Covered by a deny-subtree rule
    Denied,
    /// The raw path could not be matched safely
    Malformed,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Unlisted => write!(f, "unlisted"),
            BlockReason::Denied => write!(f, "denied"),
            BlockReason::Malformed => write!(f, "malformed"),
        }
    }
}

/// Classification of a single request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Outside the reserved namespace; the gateway takes no action
    PassThrough,
    /// Allow-listed; forward unchanged to the in-process handler
    Local,
    /// Inside the namespace but not allowed
    Blocked(BlockReason),
}

/// Classification with the gateway mode applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    PassThrough,
    Local,
    Reject(BlockReason),
    /// Forward to this absolute URL
    Forward(String),
}

impl Dispatch {
    /// Label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Dispatch::PassThrough => "pass_through",
            Dispatch::Local => "local",
            Dispatch::Reject(_) => "rejected",
            Dispatch::Forward(_) => "forwarded",
        }
    }
}

/// Compiled, immutable gateway configuration
#[derive(Debug, Clone)]
pub struct Gateway {
    table: RouteTable,
    mode: GatewayMode,
    rewrites: RewriteTable,
}

impl Gateway {
    pub fn new(table: RouteTable, mode: GatewayMode, rewrites: RewriteTable) -> Self {
        Self {
            table,
            mode,
            rewrites,
        }
    }

    /// Validate the configuration and compile it
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let settings = &config.gateway;
        let rules = settings
            .prefix_rules
            .iter()
            .map(|r| PrefixRule::new(&r.prefix, r.policy))
            .collect();
        let table = RouteTable::new(
            ReservedPrefix::new(settings.prefix.as_str()),
            &settings.local_paths,
            rules,
        );

        Ok(Self::new(table, settings.mode, config.rewrite_table()?))
    }

    pub fn mode(&self) -> GatewayMode {
        self.mode
    }

    pub fn prefix(&self) -> &ReservedPrefix {
        self.table.prefix()
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn rewrites(&self) -> &RewriteTable {
        &self.rewrites
    }

    /// Classify a raw request path. The method and query string never
    /// influence the verdict.
    pub fn classify(&self, path: &str) -> Verdict {
        let normalized = normalize_path(path);
        if !self.table.prefix().contains(normalized) {
            return Verdict::PassThrough;
        }
        if !is_well_formed(path) {
            return Verdict::Blocked(BlockReason::Malformed);
        }

        match self.table.lookup(normalized) {
            Some(RuleMatch::Exact) | Some(RuleMatch::Subtree(SubtreePolicy::AllowSubtree)) => {
                Verdict::Local
            }
            Some(RuleMatch::Subtree(SubtreePolicy::DenySubtree)) => {
                Verdict::Blocked(BlockReason::Denied)
            }
            None => Verdict::Blocked(BlockReason::Unlisted),
        }
    }

    /// Classify a request and apply the gateway mode.
    ///
    /// In proxy mode only unlisted paths are forwarded; denied and malformed
    /// paths are rejected in both modes.
    pub fn dispatch(&self, path: &str, query: Option<&str>) -> Dispatch {
        match self.classify(path) {
            Verdict::PassThrough => Dispatch::PassThrough,
            Verdict::Local => Dispatch::Local,
            Verdict::Blocked(BlockReason::Unlisted) if self.mode == GatewayMode::Proxy => self
                .rewrites
                .resolve(path, query)
                .map(Dispatch::Forward)
                .unwrap_or(Dispatch::Reject(BlockReason::Unlisted)),
            Verdict::Blocked(reason) => Dispatch::Reject(reason),
        }
    }
}
