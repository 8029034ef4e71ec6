//! Redirect rule lookup.
//!
//! # Responsibilities
//! - Store compiled redirect rules in declaration order
//! - Find the first rule matching a failed request's target
//! - Resolve its status code and templated `Location`
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan; first match wins, no specificity tie-breaking
//! - A malformed rule is reported and yields no redirect; later rules are
//!   not consulted, the request falls through to error handling

use axum::http::StatusCode;
use indexmap::IndexMap;

use crate::config::schema::RedirectTarget;
use crate::routing::matcher::{Matcher, PatternMatcher};
use crate::routing::template;

/// Status used when a rule does not name one.
pub const DEFAULT_REDIRECT_STATUS: StatusCode = StatusCode::MOVED_PERMANENTLY;

/// A resolved redirect: status code and `Location` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub status: StatusCode,
    pub location: String,
}

#[derive(Debug)]
struct RedirectRule {
    matcher: PatternMatcher,
    target: RedirectTarget,
}

/// Ordered, compiled redirect table.
#[derive(Debug, Default)]
pub struct RedirectTable {
    rules: Vec<RedirectRule>,
}

impl RedirectTable {
    /// Compile every configured rule, preserving order.
    pub fn from_config(redirects: &IndexMap<String, RedirectTarget>) -> Self {
        let rules = redirects
            .iter()
            .map(|(pattern, target)| RedirectRule {
                matcher: PatternMatcher::compile(pattern),
                target: target.clone(),
            })
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve the redirect for `target` (path + query as received).
    pub fn resolve(&self, target: &str) -> Option<Redirect> {
        let (rule, captures) = self
            .rules
            .iter()
            .find_map(|rule| rule.matcher.captures(target).map(|captures| (rule, captures)))?;

        let (status_code, template) = match &rule.target {
            RedirectTarget::Path(path) => (None, Some(path)),
            RedirectTarget::Detailed(spec) => (spec.status_code, spec.path.as_ref()),
        };

        let Some(template) = template else {
            tracing::warn!(
                pattern = %rule.matcher.pattern(),
                "Redirect is malformed: must contain at least a `path` key or be a string"
            );
            return None;
        };

        let status = match status_code.map(StatusCode::from_u16) {
            None => DEFAULT_REDIRECT_STATUS,
            Some(Ok(status)) => status,
            Some(Err(_)) => {
                tracing::warn!(
                    pattern = %rule.matcher.pattern(),
                    status_code = ?status_code,
                    "Redirect is malformed: invalid status code"
                );
                return None;
            }
        };

        Some(Redirect {
            status,
            location: template::render(template, &captures),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RedirectSpec;

    fn table(rules: &[(&str, RedirectTarget)]) -> RedirectTable {
        let map: IndexMap<String, RedirectTarget> = rules
            .iter()
            .map(|(pattern, target)| (pattern.to_string(), target.clone()))
            .collect();
        RedirectTable::from_config(&map)
    }

    fn detailed(path: Option<&str>, status_code: Option<u16>) -> RedirectTarget {
        RedirectTarget::Detailed(RedirectSpec {
            path: path.map(String::from),
            status_code,
        })
    }

    #[test]
    fn test_plain_string_defaults_to_301() {
        let table = table(&[("/redirect_file.txt", "/index.html".into())]);
        assert_eq!(
            table.resolve("/redirect_file.txt"),
            Some(Redirect {
                status: StatusCode::MOVED_PERMANENTLY,
                location: "/index.html".into(),
            })
        );
        assert_eq!(table.resolve("/other.txt"), None);
    }

    #[test]
    fn test_record_with_status() {
        let table = table(&[("/custom_redirect", detailed(Some("/index.html"), Some(302)))]);
        let redirect = table.resolve("/custom_redirect").unwrap();
        assert_eq!(redirect.status, StatusCode::FOUND);
        assert_eq!(redirect.location, "/index.html");
    }

    #[test]
    fn test_record_without_status_defaults_to_301() {
        let table = table(&[("/x", detailed(Some("/y"), None))]);
        assert_eq!(table.resolve("/x").unwrap().status, StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn test_malformed_rule_yields_no_redirect() {
        let table = table(&[
            ("/fail_redirect", detailed(None, Some(418))),
            ("/fail_*", "/never.html".into()),
        ]);
        assert_eq!(table.resolve("/fail_redirect"), None);
    }

    #[test]
    fn test_invalid_status_yields_no_redirect() {
        let table = table(&[("/bad", detailed(Some("/x"), Some(7)))]);
        assert_eq!(table.resolve("/bad"), None);
    }

    #[test]
    fn test_first_declared_rule_wins() {
        let table = table(&[
            ("/docs/*", "/first".into()),
            ("/docs/intro", "/second".into()),
        ]);
        assert_eq!(table.resolve("/docs/intro").unwrap().location, "/first");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_query_string_rules() {
        let table = table(&[
            ("/redirect_file.txt", "/index.html".into()),
            ("/redirect_file.txt?alt=true", "/alt.html".into()),
        ]);
        assert_eq!(table.resolve("/redirect_file.txt?alt=true").unwrap().location, "/alt.html");
        assert_eq!(table.resolve("/redirect_file.txt?alt=false"), None);
    }

    #[test]
    fn test_captures_substituted() {
        let table = table(&[
            ("/posts/:id", "/articles/:id".into()),
            ("/files/*", detailed(Some("/downloads/:_"), Some(307))),
        ]);
        assert_eq!(table.resolve("/posts/42").unwrap().location, "/articles/42");

        let redirect = table.resolve("/files/a/b.zip").unwrap();
        assert_eq!(redirect.status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(redirect.location, "/downloads/a/b.zip");
    }

    #[test]
    fn test_empty_table() {
        let table = RedirectTable::default();
        assert!(table.is_empty());
        assert_eq!(table.resolve("/anything"), None);
    }
}
