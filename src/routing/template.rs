//! Destination templating.
//!
//! Replaces `:name` tokens in a redirect destination with captured values.
//! A token without a matching capture stays in the output verbatim, so
//! `http://host:8080/` passes through untouched.

use crate::routing::matcher::Captures;

/// Substitute every `:name` token of `template` from `captures`.
///
/// Token names are runs of ASCII alphanumerics and `_` (the wildcard
/// capture is `:_`). Never fails.
pub fn render(template: &str, captures: &Captures) -> String {
    if captures.is_empty() {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];

        match captures.get(name).filter(|_| !name.is_empty()) {
            Some(value) => out.push_str(&value),
            None => {
                out.push(':');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    out.push_str(rest);
    out
}
