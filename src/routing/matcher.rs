//! Redirect pattern matching.
//!
//! # Responsibilities
//! - Match a request target (path + query, as received) against a pattern
//! - Glob dialect: `*`, `**`, `?`, `[...]`, `{a,b}`, leading `!` negation
//! - Parameter dialect: `:name` segments, `*` wildcard, `( )` optional parts
//! - Extract captures from the parameter dialect
//!
//! # Design Decisions
//! - Both dialects are compiled once, at startup: globs to a token list
//!   matched by memoized backtracking, parameter patterns to anchored regexes
//! - A pattern matches if the glob matches OR the parameter form matches;
//!   the glob is tried first since it has no captures to lose
//! - Captures always come from the parameter dialect, so `/blog/*` matched
//!   by the glob still yields `_` for templating
//! - Matching is case-sensitive and never normalises the target

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use thiserror::Error;

/// Name under which the parameter dialect stores `*` wildcard captures.
pub const WILDCARD: &str = "_";

/// Characters accepted in a `:name` parameter value.
const SEGMENT_VALUE: &str = r"[a-zA-Z0-9\-_~ %]+";

/// Error compiling a pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("unbalanced parentheses in pattern `{0}`")]
    UnbalancedParens(String),

    #[error("pattern `{0}` ends with a dangling escape")]
    DanglingEscape(String),

    #[error("pattern `{pattern}` compiled to an invalid expression: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Values captured from a request target, in pattern order.
///
/// A name captured more than once keeps every value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    values: IndexMap<String, Vec<String>>,
}

impl Captures {
    /// Create an empty capture set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.entry(name.into()).or_default().push(value.into());
    }

    /// Value for `name`, multiple values joined with `,`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|values| values.join(","))
    }

    /// All values captured for `name`.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Trait for matching request targets against a pattern.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns the captures if the target matches, `None` otherwise.
    fn captures(&self, target: &str) -> Option<Captures>;

    /// Returns true if the target matches this pattern.
    fn matches(&self, target: &str) -> bool {
        self.captures(target).is_some()
    }
}

/// Glob-style matcher. Boolean only: a match yields no captures.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    source: String,
    negate: bool,
    alternatives: Vec<Vec<GlobToken>>,
}

impl GlobMatcher {
    /// Compile a glob pattern. Every string is a valid glob.
    pub fn new(pattern: &str) -> Self {
        let bangs = pattern.chars().take_while(|c| *c == '!').count();
        let body = &pattern[bangs..];

        let alternatives = expand_braces(body).iter().map(|alt| tokenize_glob(alt)).collect();

        Self {
            source: pattern.to_string(),
            negate: bangs % 2 == 1,
            alternatives,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }
}

impl Matcher for GlobMatcher {
    fn captures(&self, target: &str) -> Option<Captures> {
        let text: Vec<char> = target.chars().collect();
        let hit = self.alternatives.iter().any(|tokens| {
            let mut failed = HashSet::new();
            match_glob(tokens, &text, 0, 0, &mut failed)
        });
        (hit != self.negate).then(Captures::new)
    }
}

/// Path-parameter matcher (`/posts/:id`, `/files/*`, `/a(/:b)`).
#[derive(Debug, Clone)]
pub struct ParamMatcher {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl ParamMatcher {
    /// Compile a parameter pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let mut expr = String::from("^");
        let mut names = Vec::new();
        let mut depth = 0usize;
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| PatternError::DanglingEscape(pattern.to_string()))?;
                    push_literal(&mut expr, escaped);
                }
                '(' => {
                    depth += 1;
                    expr.push_str("(?:");
                }
                ')' => {
                    if depth == 0 {
                        return Err(PatternError::UnbalancedParens(pattern.to_string()));
                    }
                    depth -= 1;
                    expr.push_str(")?");
                }
                '*' => {
                    names.push(WILDCARD.to_string());
                    expr.push_str("(.*?)");
                }
                ':' if chars.peek().is_some_and(char::is_ascii_alphanumeric) => {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if !next.is_ascii_alphanumeric() {
                            break;
                        }
                        name.push(next);
                        chars.next();
                    }
                    names.push(name);
                    expr.push('(');
                    expr.push_str(SEGMENT_VALUE);
                    expr.push(')');
                }
                other => push_literal(&mut expr, other),
            }
        }

        if depth != 0 {
            return Err(PatternError::UnbalancedParens(pattern.to_string()));
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|source| PatternError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            names,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Parameter names in pattern order (`_` for wildcards).
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Matcher for ParamMatcher {
    fn captures(&self, target: &str) -> Option<Captures> {
        let found = self.regex.captures(target)?;
        let mut captures = Captures::new();
        for (name, group) in self.names.iter().zip(found.iter().skip(1)) {
            // Groups inside an optional part that did not participate are skipped.
            // Values stay percent-encoded so they can go straight into a URL.
            if let Some(group) = group {
                captures.insert(name.as_str(), group.as_str());
            }
        }
        Some(captures)
    }
}

/// A redirect pattern compiled in both dialects.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    source: String,
    glob: GlobMatcher,
    params: Option<ParamMatcher>,
}

impl PatternMatcher {
    /// Compile `pattern` in both dialects.
    ///
    /// A pattern the parameter dialect rejects (unbalanced parentheses,
    /// dangling escape) is matched as a glob only, and logged.
    pub fn compile(pattern: &str) -> Self {
        let glob = GlobMatcher::new(pattern);
        let params = ParamMatcher::new(pattern)
            .map_err(|e| tracing::warn!(pattern = %pattern, error = %e, "Parameter form of redirect pattern disabled"))
            .ok();

        Self {
            source: pattern.to_string(),
            glob,
            params,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }
}

impl Matcher for PatternMatcher {
    fn captures(&self, target: &str) -> Option<Captures> {
        let param_captures = || self.params.as_ref().and_then(|p| p.captures(target));

        if self.glob.matches(target) {
            return Some(param_captures().unwrap_or_default());
        }
        param_captures()
    }
}

fn push_literal(expr: &mut String, c: char) {
    let mut buf = [0u8; 4];
    expr.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

/// Expand `{a,b}` alternatives into separate patterns.
///
/// A brace group without a top-level comma is kept literally.
fn expand_braces(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '{' => {
                if let Some((close, alternatives)) = brace_group(&chars, i) {
                    let prefix: String = chars[..i].iter().collect();
                    let suffix: String = chars[close + 1..].iter().collect();
                    return alternatives
                        .iter()
                        .flat_map(|alt| expand_braces(&format!("{}{}{}", prefix, alt, suffix)))
                        .collect();
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    vec![pattern.to_string()]
}

/// Locate the group opened at `open`; returns its closing index and the
/// comma-separated alternatives, or `None` when it is not an alternation.
fn brace_group(chars: &[char], open: usize) -> Option<(usize, Vec<String>)> {
    let mut depth = 0usize;
    let mut alternatives = Vec::new();
    let mut current = String::new();
    let mut i = open + 1;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                current.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    current.push(next);
                }
                i += 2;
                continue;
            }
            '{' => depth += 1,
            '}' if depth == 0 => {
                if alternatives.is_empty() {
                    return None;
                }
                alternatives.push(current);
                return Some((i, alternatives));
            }
            '}' => depth -= 1,
            ',' if depth == 0 => {
                alternatives.push(std::mem::take(&mut current));
                i += 1;
                continue;
            }
            _ => {}
        }
        current.push(c);
        i += 1;
    }

    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GlobToken {
    Literal(char),
    /// `?`: one character other than `/`.
    Any,
    /// `*`: any run of characters other than `/`.
    Star,
    /// `**` followed by more segments; consumes whole `segment/` units.
    GlobStarDir,
    /// `**` as the final segment; consumes the rest of the target.
    GlobStarTail,
    Class(CharClass),
    /// The next character must not be a `.` (segment starting with a wildcard).
    NoDot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CharClass {
    negated: bool,
    items: Vec<(char, char)>,
}

impl CharClass {
    fn contains(&self, c: char) -> bool {
        let listed = self.items.iter().any(|(lo, hi)| *lo <= c && c <= *hi);
        listed != self.negated
    }
}

/// Tokenize one brace-free glob, segment by segment.
fn tokenize_glob(glob: &str) -> Vec<GlobToken> {
    let segments: Vec<&str> = glob.split('/').collect();
    let last = segments.len() - 1;
    let mut tokens = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        if *segment == "**" {
            if index == last {
                tokens.push(GlobToken::GlobStarTail);
            } else {
                // Consumes its own trailing separator so `/a/**/b` matches `/a/b`.
                tokens.push(GlobToken::GlobStarDir);
                continue;
            }
        } else {
            tokenize_segment(segment, &mut tokens);
        }
        if index != last {
            tokens.push(GlobToken::Literal('/'));
        }
    }

    tokens
}

fn tokenize_segment(segment: &str, tokens: &mut Vec<GlobToken>) {
    let chars: Vec<char> = segment.chars().collect();

    // Wildcards never match a leading dot.
    if matches!(chars.first(), Some('*' | '?' | '[')) {
        tokens.push(GlobToken::NoDot);
    }

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                while chars.get(i + 1) == Some(&'*') {
                    i += 1;
                }
                tokens.push(GlobToken::Star);
            }
            '?' => tokens.push(GlobToken::Any),
            '[' => match char_class(&chars, i) {
                Some((close, class)) => {
                    tokens.push(GlobToken::Class(class));
                    i = close;
                }
                None => tokens.push(GlobToken::Literal('[')),
            },
            '\\' => match chars.get(i + 1) {
                Some(&next) => {
                    tokens.push(GlobToken::Literal(next));
                    i += 1;
                }
                None => tokens.push(GlobToken::Literal('\\')),
            },
            other => tokens.push(GlobToken::Literal(other)),
        }
        i += 1;
    }
}

/// Parse a `[...]` class starting at `open`; returns the closing index.
fn char_class(chars: &[char], open: usize) -> Option<(usize, CharClass)> {
    let mut i = open + 1;
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }

    let first = i;
    let mut items = Vec::new();
    while i < chars.len() {
        let mut c = chars[i];
        if c == ']' && i > first {
            return Some((i, CharClass { negated, items }));
        }
        if c == '\\' {
            i += 1;
            c = *chars.get(i)?;
        }
        match (chars.get(i + 1), chars.get(i + 2)) {
            (Some('-'), Some(&hi)) if hi != ']' => {
                items.push((c, hi));
                i += 3;
            }
            _ => {
                items.push((c, c));
                i += 1;
            }
        }
    }

    None
}

/// Backtracking glob match; `failed` memoizes dead (token, text) states.
fn match_glob(
    tokens: &[GlobToken],
    text: &[char],
    pi: usize,
    ti: usize,
    failed: &mut HashSet<(usize, usize)>,
) -> bool {
    if failed.contains(&(pi, ti)) {
        return false;
    }

    let matched = match tokens.get(pi) {
        None => ti == text.len(),
        Some(GlobToken::Literal(c)) => {
            text.get(ti) == Some(c) && match_glob(tokens, text, pi + 1, ti + 1, failed)
        }
        Some(GlobToken::Any) => {
            text.get(ti).is_some_and(|c| *c != '/')
                && match_glob(tokens, text, pi + 1, ti + 1, failed)
        }
        Some(GlobToken::Class(class)) => {
            text.get(ti).is_some_and(|c| *c != '/' && class.contains(*c))
                && match_glob(tokens, text, pi + 1, ti + 1, failed)
        }
        Some(GlobToken::NoDot) => {
            text.get(ti) != Some(&'.') && match_glob(tokens, text, pi + 1, ti, failed)
        }
        Some(GlobToken::Star) => {
            let mut end = ti;
            loop {
                if match_glob(tokens, text, pi + 1, end, failed) {
                    break true;
                }
                match text.get(end) {
                    Some(c) if *c != '/' => end += 1,
                    _ => break false,
                }
            }
        }
        Some(GlobToken::GlobStarDir) => {
            let mut pos = ti;
            loop {
                if match_glob(tokens, text, pi + 1, pos, failed) {
                    break true;
                }
                if text.get(pos) == Some(&'.') {
                    break false;
                }
                match text[pos..].iter().position(|c| *c == '/') {
                    Some(offset) => pos += offset + 1,
                    None => break false,
                }
            }
        }
        Some(GlobToken::GlobStarTail) => {
            let rest = &text[ti..];
            let hidden = rest
                .iter()
                .enumerate()
                .any(|(i, c)| *c == '.' && (i == 0 || rest[i - 1] == '/'));
            !hidden && match_glob(tokens, text, pi + 1, text.len(), failed)
        }
    };

    if !matched {
        failed.insert((pi, ti));
    }
    matched
}
