//! Rewrite table forwarding reserved-prefix traffic to an upstream origin
//!
//! Patterns use a single trailing wildcard capture:
//!
//! ```text
//! source      = "/api/:path*"
//! destination = "https://backend.example/api/:path*"
//! ```
//!
//! Everything after the source base is captured and substituted into the
//! destination. The query string is carried over byte for byte.

use super::rules::is_at_or_below;
use axum::http::Uri;
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing origins and rewrite patterns
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("origin is empty")]
    EmptyOrigin,
    #[error("invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: &'static str },
    #[error("invalid rewrite source '{pattern}': {reason}")]
    InvalidSource { pattern: String, reason: &'static str },
    #[error("invalid rewrite destination '{pattern}': {reason}")]
    InvalidDestination { pattern: String, reason: &'static str },
    #[error("rewrite destination captures ':{found}*' but source captures ':{expected}*'")]
    CaptureMismatch { expected: String, found: String },
}

/// Scheme and authority of an HTTP(S) server, kept in canonical form
/// (lowercase, default port dropped, no trailing `/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(String);

impl Origin {
    pub fn parse(input: &str) -> Result<Self, RewriteError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RewriteError::EmptyOrigin);
        }
        let invalid = |reason| RewriteError::InvalidOrigin {
            origin: trimmed.to_string(),
            reason,
        };

        let uri: Uri = trimmed.parse().map_err(|_| invalid("not a valid URL"))?;
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| invalid("missing scheme"))?
            .to_ascii_lowercase();
        let default_port = match scheme.as_str() {
            "http" => 80,
            "https" => 443,
            _ => return Err(invalid("scheme must be http or https")),
        };
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        if authority.host().is_empty() {
            return Err(invalid("missing host"));
        }
        if !matches!(uri.path(), "" | "/") {
            return Err(invalid("origin must not carry a path"));
        }
        if uri.query().is_some() {
            return Err(invalid("origin must not carry a query"));
        }

        let host = authority.host().to_ascii_lowercase();
        let canonical = match authority.port_u16() {
            Some(port) if port != default_port => format!("{}://{}:{}", scheme, host, port),
            _ => format!("{}://{}", scheme, host),
        };
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `source -> destination` rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    /// Literal part of the source before the capture, without trailing `/`
    source_base: String,
    capture: String,
    origin: Origin,
    /// Literal path of the destination before the capture
    destination_base: String,
}

impl RewriteRule {
    pub fn parse(source: &str, destination: &str) -> Result<Self, RewriteError> {
        let (source_base, capture) =
            split_capture(source).ok_or_else(|| RewriteError::InvalidSource {
                pattern: source.to_string(),
                reason: "must end with a '/:name*' capture",
            })?;
        if !source_base.is_empty() && !source_base.starts_with('/') {
            return Err(RewriteError::InvalidSource {
                pattern: source.to_string(),
                reason: "must start with '/'",
            });
        }
        if source_base.contains([':', '*', '?']) {
            return Err(RewriteError::InvalidSource {
                pattern: source.to_string(),
                reason: "only one trailing capture is supported",
            });
        }

        let (dest_prefix, dest_capture) =
            split_capture(destination).ok_or_else(|| RewriteError::InvalidDestination {
                pattern: destination.to_string(),
                reason: "must end with a '/:name*' capture",
            })?;
        if dest_capture != capture {
            return Err(RewriteError::CaptureMismatch {
                expected: capture.to_string(),
                found: dest_capture.to_string(),
            });
        }

        let scheme_end = dest_prefix
            .find("://")
            .ok_or_else(|| RewriteError::InvalidDestination {
                pattern: destination.to_string(),
                reason: "must start with an absolute origin",
            })?;
        let path_start = dest_prefix[scheme_end + 3..]
            .find('/')
            .map(|i| i + scheme_end + 3)
            .unwrap_or(dest_prefix.len());
        let (origin, destination_base) = dest_prefix.split_at(path_start);
        if destination_base.contains([':', '*', '?', '#']) {
            return Err(RewriteError::InvalidDestination {
                pattern: destination.to_string(),
                reason: "only one trailing capture is supported",
            });
        }

        Ok(Self {
            source_base: source_base.to_string(),
            capture: capture.to_string(),
            origin: Origin::parse(origin)?,
            destination_base: destination_base.to_string(),
        })
    }

    /// Forward everything under `prefix` to the same path on `origin`
    pub fn for_prefix(prefix: &str, origin: &Origin) -> Self {
        Self {
            source_base: prefix.to_string(),
            capture: "path".to_string(),
            origin: origin.clone(),
            destination_base: prefix.to_string(),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn source_base(&self) -> &str {
        &self.source_base
    }

    pub fn source(&self) -> String {
        format!("{}/:{}*", self.source_base, self.capture)
    }

    pub fn destination(&self) -> String {
        format!("{}{}/:{}*", self.origin, self.destination_base, self.capture)
    }

    /// Check whether a path lies in this rule's source domain
    pub fn covers(&self, path: &str) -> bool {
        is_at_or_below(path, &self.source_base)
    }

    /// Build the destination URL, or `None` when the path lies outside the
    /// source domain. Total over the domain.
    pub fn apply(&self, path: &str, query: Option<&str>) -> Option<String> {
        if !self.covers(path) {
            return None;
        }
        // Either empty or starting with `/`
        let suffix = &path[self.source_base.len()..];

        let mut url = String::with_capacity(
            self.origin.as_str().len() + self.destination_base.len() + suffix.len() + 2,
        );
        url.push_str(self.origin.as_str());
        url.push_str(&self.destination_base);
        url.push_str(suffix);
        if self.destination_base.is_empty() && suffix.is_empty() {
            url.push('/');
        }
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        Some(url)
    }
}

/// Ordered rewrite rules; the first covering rule wins
#[derive(Debug, Clone, Default)]
pub struct RewriteTable {
    rules: Vec<RewriteRule>,
}

impl RewriteTable {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.apply(path, query))
    }
}

/// Split `"<base>/:<name>*"` into `("<base>", "<name>")`
fn split_capture(pattern: &str) -> Option<(&str, &str)> {
    let body = pattern.strip_suffix('*')?;
    let idx = body.rfind("/:")?;
    let name = &body[idx + 2..];
    let valid_name =
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid_name.then(|| (&body[..idx], name))
}
