//! Configuration module for the gateway service
//!
//! This module handles loading, parsing and validating configuration from
//! TOML files. The configuration is read once at startup and never mutated.

use crate::gateway::rules::is_at_or_below;
use crate::gateway::{
    normalize_path, GatewayMode, Origin, RewriteError, RewriteRule, RewriteTable, SubtreePolicy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Configuration problems detected before the gateway starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid reserved prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: &'static str },
    #[error("{kind} '{path}' lies outside the reserved prefix '{prefix}'")]
    OutsidePrefix {
        kind: &'static str,
        path: String,
        prefix: String,
    },
    #[error("upstream origin is empty")]
    EmptyUpstream,
    #[error("{what} '{origin}' points back at the local origin '{local}'")]
    RoutingLoop {
        what: &'static str,
        origin: String,
        local: String,
    },
    #[error("proxy mode needs an upstream origin or at least one rewrite")]
    MissingUpstream,
    #[error("{name} endpoint '{path}' lies under the reserved prefix but is not allow-listed")]
    UnreachableEndpoint { name: &'static str, path: String },
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

/// Prefix rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixRuleConfig {
    /// Base path; the rule covers every path strictly below it
    pub prefix: String,
    /// Rule policy (default: allow_subtree)
    #[serde(default)]
    pub policy: SubtreePolicy,
}

/// Reserved namespace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Path prefix the gateway is responsible for
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// What to do with unlisted paths under the prefix
    #[serde(default)]
    pub mode: GatewayMode,
    /// Base URL of the backend that receives forwarded requests
    #[serde(default)]
    pub upstream_origin: Option<String>,
    /// Exact paths served by in-process handlers
    #[serde(default)]
    pub local_paths: Vec<String>,
    /// Prefix rules for endpoint families
    #[serde(default)]
    pub prefix_rules: Vec<PrefixRuleConfig>,
}

fn default_prefix() -> String {
    "/api".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            mode: GatewayMode::default(),
            upstream_origin: None,
            local_paths: vec![],
            prefix_rules: vec![],
        }
    }
}

/// Rewrite rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Source pattern, e.g. "/api/:path*"
    pub source: String,
    /// Destination template, e.g. "https://backend.example/api/:path*"
    pub destination: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Public origin this gateway is served from (default: http://localhost:<port>)
    #[serde(default)]
    pub origin: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout: default_timeout(),
            origin: None,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path to expose metrics
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Whether health check is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path for health check endpoint
    #[serde(default = "default_health_path")]
    pub path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_health_path(),
        }
    }
}

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Reserved namespace and allow-list
    #[serde(default)]
    pub gateway: RouterConfig,
    /// Explicit rewrite table; derived from the upstream origin when empty
    #[serde(default)]
    pub rewrites: Vec<RewriteConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load configuration from a TOML string
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let config: GatewayConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.gateway.prefix.as_str();
        validate_prefix(prefix)?;

        // Every allow rule must sit under the prefix, otherwise the
        // default-deny step could never see it
        for path in &self.gateway.local_paths {
            if !in_scope(prefix, path) {
                return Err(ConfigError::OutsidePrefix {
                    kind: "local path",
                    path: path.clone(),
                    prefix: prefix.to_string(),
                });
            }
        }
        for rule in &self.gateway.prefix_rules {
            if !in_scope(prefix, &rule.prefix) {
                return Err(ConfigError::OutsidePrefix {
                    kind: "prefix rule",
                    path: rule.prefix.clone(),
                    prefix: prefix.to_string(),
                });
            }
        }

        let local = self.local_origin()?;
        if let Some(upstream) = self.upstream_origin()? {
            if upstream == local {
                return Err(ConfigError::RoutingLoop {
                    what: "upstream origin",
                    origin: upstream.to_string(),
                    local: local.to_string(),
                });
            }
        }

        let rewrites = self.rewrite_table()?;
        for (config, rule) in self.rewrites.iter().zip(rewrites.rules()) {
            if !in_scope(prefix, rule.source_base()) {
                return Err(ConfigError::OutsidePrefix {
                    kind: "rewrite source",
                    path: config.source.clone(),
                    prefix: prefix.to_string(),
                });
            }
            if *rule.origin() == local {
                return Err(ConfigError::RoutingLoop {
                    what: "rewrite destination",
                    origin: config.destination.clone(),
                    local: local.to_string(),
                });
            }
        }
        if self.gateway.mode == GatewayMode::Proxy && rewrites.is_empty() {
            return Err(ConfigError::MissingUpstream);
        }

        // Gateway-owned endpoints must not be swallowed by default-deny
        let endpoints = [
            ("health", self.health.enabled, &self.health.path),
            ("metrics", self.metrics.enabled, &self.metrics.path),
        ];
        for (name, enabled, path) in endpoints {
            if enabled && in_scope(prefix, path) && !self.is_allow_listed(path) {
                return Err(ConfigError::UnreachableEndpoint {
                    name,
                    path: path.clone(),
                });
            }
        }

        Ok(())
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Origin this gateway is reachable at
    pub fn local_origin(&self) -> Result<Origin, ConfigError> {
        let origin = match &self.server.origin {
            Some(origin) => origin.clone(),
            None => format!("http://localhost:{}", self.server.port),
        };
        Ok(Origin::parse(&origin)?)
    }

    /// Configured upstream origin, if any
    pub fn upstream_origin(&self) -> Result<Option<Origin>, ConfigError> {
        match &self.gateway.upstream_origin {
            None => Ok(None),
            Some(origin) if origin.trim().is_empty() => Err(ConfigError::EmptyUpstream),
            Some(origin) => Ok(Some(Origin::parse(origin)?)),
        }
    }

    /// Build the rewrite table: the explicit `[[rewrites]]` entries, or a
    /// single rule forwarding the whole prefix to the upstream origin
    pub fn rewrite_table(&self) -> Result<RewriteTable, ConfigError> {
        if !self.rewrites.is_empty() {
            let rules = self
                .rewrites
                .iter()
                .map(|r| RewriteRule::parse(&r.source, &r.destination))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(RewriteTable::new(rules));
        }

        let rules = self
            .upstream_origin()?
            .map(|origin| RewriteRule::for_prefix(&self.gateway.prefix, &origin))
            .into_iter()
            .collect();
        Ok(RewriteTable::new(rules))
    }

    fn is_allow_listed(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.gateway
            .local_paths
            .iter()
            .any(|p| normalize_path(p) == path)
    }
}

fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidPrefix {
        prefix: prefix.to_string(),
        reason,
    };
    if !prefix.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if prefix == "/" {
        return Err(invalid("must not be the root path"));
    }
    if prefix.ends_with('/') {
        return Err(invalid("must not end with '/'"));
    }
    if prefix.contains(['*', ':', '?', '#']) {
        return Err(invalid("must be a literal path"));
    }
    Ok(())
}

fn in_scope(prefix: &str, path: &str) -> bool {
    is_at_or_below(normalize_path(path), prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gateway.prefix, "/api");
        assert_eq!(config.gateway.mode, GatewayMode::Reject);
        assert!(config.metrics.enabled);
        assert!(config.health.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 3000
timeout = 10
origin = "https://portfolio.example"

[gateway]
prefix = "/api"
mode = "proxy"
upstream_origin = "https://backend.example"
local_paths = ["/api/weather", "/api/nba/", "/api/uuid"]

[[gateway.prefix_rules]]
prefix = "/api/uuid"
policy = "allow_subtree"

[[gateway.prefix_rules]]
prefix = "/api/admin"
policy = "deny_subtree"
"#;

        let config = GatewayConfig::parse(toml).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.timeout, 10);
        assert_eq!(config.gateway.mode, GatewayMode::Proxy);
        assert_eq!(config.gateway.local_paths.len(), 3);
        assert_eq!(config.gateway.prefix_rules.len(), 2);
        assert_eq!(config.gateway.prefix_rules[1].policy, SubtreePolicy::DenySubtree);

        let rewrites = config.rewrite_table().unwrap();
        assert_eq!(rewrites.rules().len(), 1);
        assert_eq!(
            rewrites.rules()[0].destination(),
            "https://backend.example/api/:path*"
        );
    }

    #[test]
    fn test_prefix_rule_policy_defaults_to_allow() {
        let toml = r#"
[[gateway.prefix_rules]]
prefix = "/api/uuid"
"#;
        let config = GatewayConfig::parse(toml).unwrap();
        assert_eq!(config.gateway.prefix_rules[0].policy, SubtreePolicy::AllowSubtree);
    }

    #[test]
    fn test_upstream_equal_to_local_origin_fails_fast() {
        let toml = r#"
[server]
port = 8080

[gateway]
upstream_origin = "http://LOCALHOST:8080/"
"#;
        let err = GatewayConfig::parse(toml).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::RoutingLoop { .. })
        ));
    }

    #[test]
    fn test_explicit_local_origin_loop() {
        let mut config = GatewayConfig::default();
        config.server.origin = Some("https://portfolio.example".to_string());
        config.gateway.upstream_origin = Some("https://portfolio.example:443".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RoutingLoop { .. })
        ));
    }

    #[test]
    fn test_rewrite_destination_loop() {
        let mut config = GatewayConfig::default();
        config.rewrites.push(RewriteConfig {
            source: "/api/:path*".to_string(),
            destination: "http://localhost:8080/api/:path*".to_string(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RoutingLoop { .. })
        ));
    }

    #[test]
    fn test_empty_upstream() {
        let mut config = GatewayConfig::default();
        config.gateway.upstream_origin = Some("  ".to_string());
        assert_eq!(config.validate(), Err(ConfigError::EmptyUpstream));
    }

    #[test]
    fn test_invalid_upstream() {
        let mut config = GatewayConfig::default();
        config.gateway.upstream_origin = Some("backend.example".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Rewrite(RewriteError::InvalidOrigin { .. }))
        ));
    }

    #[test]
    fn test_proxy_mode_requires_upstream() {
        let toml = r#"
[gateway]
mode = "proxy"
"#;
        let err = GatewayConfig::parse(toml).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingUpstream)
        );
    }

    #[test]
    fn test_local_path_outside_prefix() {
        let toml = r#"
[gateway]
local_paths = ["/api/weather", "/dashboard"]
"#;
        let err = GatewayConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("'/dashboard' lies outside the reserved prefix"));
    }

    #[test]
    fn test_prefix_rule_outside_prefix() {
        let mut config = GatewayConfig::default();
        config.gateway.prefix_rules.push(PrefixRuleConfig {
            prefix: "/apiv2".to_string(),
            policy: SubtreePolicy::AllowSubtree,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutsidePrefix { kind: "prefix rule", .. })
        ));
    }

    #[test]
    fn test_rewrite_source_outside_prefix() {
        let mut config = GatewayConfig::default();
        config.rewrites.push(RewriteConfig {
            source: "/blog/:path*".to_string(),
            destination: "https://backend.example/blog/:path*".to_string(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutsidePrefix { kind: "rewrite source", .. })
        ));
    }

    #[test]
    fn test_invalid_prefixes() {
        for prefix in ["api", "/", "/api/", "/api/*"] {
            let mut config = GatewayConfig::default();
            config.gateway.prefix = prefix.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidPrefix { .. })),
                "prefix {:?}",
                prefix
            );
        }
    }

    #[test]
    fn test_health_under_prefix_must_be_allow_listed() {
        let mut config = GatewayConfig::default();
        config.health.path = "/api/health".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnreachableEndpoint { name: "health", .. })
        ));

        config.gateway.local_paths.push("/api/health".to_string());
        assert!(config.validate().is_ok());
    }
}
