//! Route patterns.
//!
//! | Pattern                  | Example match              | Captured params                 |
//! |--------------------------|----------------------------|---------------------------------|
//! | `/users`                 | `/users`                   | *(none)*                        |
//! | `/users/:id`             | `/users/42`                | `id → "42"`                     |
//! | `/files/*`               | `/files/docs/readme.txt`   | `wildcard → "/docs/readme.txt"` |
//! | `example.com/admin`      | `/admin` on that host only | *(none)*                        |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so `/users/` and
//! `/users` are treated as equivalent.

use crate::context::PathParams;

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Pattern {
    // Matches one exact path string, e.g. `/users`.
    Exact(String),
    // Matches a fixed number of segments where some may be named captures, e.g. `/users/:id`.
    Parameterized { segments: Vec<Segment> },
    // Matches any path that starts with the given prefix, e.g. `/files/*`.
    Wildcard(String),
}

/// Splits a route string into its optional host and its path pattern.
///
/// Anything before the first `/` is the host, lowercased.
pub(crate) fn split_host(route: &str) -> (Option<String>, &str) {
    match route.find('/') {
        Some(0) | None => (None, route),
        Some(i) => (Some(route[..i].to_ascii_lowercase()), &route[i..]),
    }
}

/// Removes a `:port` suffix and lowercases a `Host` header value.
pub(crate) fn normalize_host(host: &str) -> String {
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    };
    host.to_ascii_lowercase()
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    /// Parse a route pattern string into a `Pattern`.
    ///
    /// The pattern is classified as follows (checked in order):
    ///
    /// 1. Ends with `/*` → [`Pattern::Wildcard`] — matches any path sharing the prefix.
    /// 2. Contains `:` → [`Pattern::Parameterized`] — one or more named captures.
    /// 3. Otherwise → [`Pattern::Exact`] — literal path match.
    pub(crate) fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if let Some(p) = s.strip_prefix(':') {
                        Segment::Parameter(p.to_string())
                    } else {
                        Segment::Static(s.to_string())
                    }
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path` against this pattern, returning extracted [`PathParams`] on success.
    pub(crate) fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let mut params = PathParams::new();
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

                if segments.len() != path_segments.len() {
                    return None;
                }

                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) => {
                            if s != path_seg {
                                return None;
                            }
                        }
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }

                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                // `/files/*` must not match `/filesystem`.
                if !suffix.is_empty() && !suffix.starts_with('/') {
                    return None;
                }
                let mut params = PathParams::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                Some(params)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Pattern::parse ────────────────────────────────────────────────────────

    #[test]
    fn pattern_parse_root() {
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
    }

    #[test]
    fn pattern_parse_trailing_slash_stripped() {
        // "/users/" should be normalized to "/users"
        assert!(matches!(Pattern::parse("/users/"), Pattern::Exact(s) if s == "/users"));
    }

    #[test]
    fn pattern_parse_parameterized_multi() {
        let pat = Pattern::parse("/users/:id/posts/:post_id");
        match pat {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 4);
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "id"));
                assert!(matches!(&segments[3], Segment::Parameter(s) if s == "post_id"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn pattern_parse_wildcard() {
        assert!(matches!(
            Pattern::parse("/files/*"),
            Pattern::Wildcard(s) if s == "/files"
        ));
    }

    // ── Pattern::matches ──────────────────────────────────────────────────────

    #[test]
    fn pattern_exact_match() {
        let pat = Pattern::parse("/users");
        assert!(pat.matches("/users").is_some());
        assert!(pat.matches("/users/").is_some());
        assert!(pat.matches("/posts").is_none());
    }

    #[test]
    fn pattern_param_extracts_values() {
        let pat = Pattern::parse("/users/:id/posts/:post_id");
        let params = pat.matches("/users/7/posts/99").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("post_id"), Some("99"));
        assert!(pat.matches("/users/7/posts").is_none());
        assert!(pat.matches("/posts/7/posts/99").is_none());
    }

    #[test]
    fn pattern_wildcard_match() {
        let pat = Pattern::parse("/files/*");
        let params = pat.matches("/files/docs/readme.txt").unwrap();
        assert_eq!(params.get("wildcard"), Some("/docs/readme.txt"));
        assert!(pat.matches("/files").is_some());
        assert!(pat.matches("/filesystem").is_none());
        assert!(pat.matches("/other/readme.txt").is_none());
    }

    // ── hosts ─────────────────────────────────────────────────────────────────

    #[test]
    fn split_host_from_route() {
        assert_eq!(split_host("/a"), (None, "/a"));
        assert_eq!(
            split_host("Example.com/a/:id"),
            (Some("example.com".to_owned()), "/a/:id")
        );
    }

    #[test]
    fn normalize_host_strips_port() {
        assert_eq!(normalize_host("Example.COM:8443"), "example.com");
        assert_eq!(normalize_host("example.com"), "example.com");
        assert_eq!(normalize_host("[::1]:80"), "[::1]");
        assert_eq!(normalize_host("[::1]"), "[::1]");
    }
}
