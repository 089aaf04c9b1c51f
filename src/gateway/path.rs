//! Request path normalization
//!
//! Normalization never fails. Whether a raw path is safe to match against the
//! allow-list is a separate question answered by [`is_well_formed`].

use percent_encoding::percent_decode_str;

/// Sentinel substituted for a path that normalizes to nothing
pub const ROOT_PATH: &str = "/";

/// Strip every trailing `/`, mapping the empty result to [`ROOT_PATH`].
///
/// Idempotent: `normalize_path(normalize_path(p)) == normalize_path(p)`.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH
    } else {
        trimmed
    }
}

/// Check whether a raw request path can be matched safely.
///
/// A path is rejected when it is not absolute, carries control characters
/// (raw or percent-encoded), has a broken percent escape, decodes to invalid
/// UTF-8, or contains a `..` segment.
pub fn is_well_formed(path: &str) -> bool {
    if path.is_empty() {
        return true;
    }
    if !path.starts_with('/') || path.bytes().any(|b| b.is_ascii_control()) {
        return false;
    }
    if !has_valid_escapes(path) {
        return false;
    }

    match percent_decode_str(path).decode_utf8() {
        Ok(decoded) => {
            !decoded.chars().any(char::is_control) && !decoded.split('/').any(|seg| seg == "..")
        }
        Err(_) => false,
    }
}

/// Every `%` must introduce exactly two hex digits
fn has_valid_escapes(path: &str) -> bool {
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .map(|pair| pair.iter().all(u8::is_ascii_hexdigit))
                .unwrap_or(false);
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_trailing_slashes() {
        assert_eq!(normalize_path("/api/weather"), "/api/weather");
        assert_eq!(normalize_path("/api/weather/"), "/api/weather");
        assert_eq!(normalize_path("/api/weather///"), "/api/weather");
    }

    #[test]
    fn test_empty_maps_to_root() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("////"), "/");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for path in ["", "/", "//", "/api/", "/api/uuid/abc-123//", "/a//b/", "no-slash/"] {
            let once = normalize_path(path);
            assert_eq!(normalize_path(once), once, "path {:?}", path);
        }
    }

    #[test]
    fn test_inner_slashes_are_kept() {
        assert_eq!(normalize_path("/api//weather/"), "/api//weather");
    }

    #[test]
    fn test_well_formed_paths() {
        assert!(is_well_formed(""));
        assert!(is_well_formed("/"));
        assert!(is_well_formed("/api/weather"));
        assert!(is_well_formed("/api/uuid/5f2c"));
        assert!(is_well_formed("/api/search%20term"));
        assert!(is_well_formed("/api/caf%C3%A9"));
    }

    #[test]
    fn test_malformed_paths() {
        assert!(!is_well_formed("api/weather"));
        assert!(!is_well_formed("/api/%zz"));
        assert!(!is_well_formed("/api/%4"));
        assert!(!is_well_formed("/api/%"));
        assert!(!is_well_formed("/api/%ff%fe"));
        assert!(!is_well_formed("/api/%00"));
        assert!(!is_well_formed("/api/line\nbreak"));
        assert!(!is_well_formed("/api/../secret"));
        assert!(!is_well_formed("/api/%2e%2e/secret"));
    }

    #[test]
    fn test_single_dot_segments_are_allowed() {
        assert!(is_well_formed("/api/./weather"));
        assert!(is_well_formed("/api/v1..2"));
    }
}
