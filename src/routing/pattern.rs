//! Host pattern parsing and matching.
//!
//! # Responsibilities
//! - Parse registration strings into immutable segment sequences
//! - Expand `{a,b,c}` groups into plain patterns
//! - Match a pattern against the labels of an incoming host
//! - Rank patterns for best-match selection
//!
//! # Design Decisions
//! - Host matching is case-insensitive (hostnames are); literals are
//!   normalized to lowercase at parse time
//! - `**` is restricted to the pattern edges, so matching is a structural
//!   test with no backtracking
//! - No regex in the hot path

use thiserror::Error;

/// Errors raised while parsing a pattern at registration time.
///
/// A failed registration never affects routes that are already installed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidPatternError {
    /// The pattern string was empty.
    #[error("pattern is empty")]
    Empty,

    /// A dot-separated label was empty (e.g. `a..b`).
    #[error("empty label in pattern `{0}`")]
    EmptyLabel(String),

    /// `**` appeared somewhere other than the first or last label.
    #[error("`**` may only be the first or last label in `{0}`")]
    InteriorMulti(String),

    /// A `{` group was never closed.
    #[error("unmatched `{{` in pattern `{0}`")]
    UnmatchedGroup(String),
}

/// One dot-separated component of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly one label, case-insensitively.
    Literal(String),
    /// `*`: matches exactly one label, any non-empty value.
    Single,
    /// `**`: matches zero or more consecutive labels, edges only.
    Multi,
}

/// An immutable parsed host pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    text: String,
    segments: Vec<Segment>,
    leading_multi: bool,
    trailing_multi: bool,
    wildcard_count: usize,
}

impl Pattern {
    /// Parse a single (already group-expanded) pattern string.
    pub fn parse(text: &str) -> Result<Self, InvalidPatternError> {
        // Accept the FQDN form with one trailing dot, like the host side.
        let trimmed = text.strip_suffix('.').unwrap_or(text);
        if trimmed.is_empty() {
            return Err(InvalidPatternError::Empty);
        }

        let mut segments = Vec::new();
        for raw in trimmed.split('.') {
            segments.push(match raw {
                "" => return Err(InvalidPatternError::EmptyLabel(text.to_string())),
                "**" => Segment::Multi,
                "*" => Segment::Single,
                lit => Segment::Literal(lit.to_ascii_lowercase()),
            });
        }

        let last = segments.len() - 1;
        if segments
            .iter()
            .enumerate()
            .any(|(i, s)| *s == Segment::Multi && i != 0 && i != last)
        {
            return Err(InvalidPatternError::InteriorMulti(text.to_string()));
        }

        let leading_multi = segments.first() == Some(&Segment::Multi);
        let trailing_multi = segments.len() > 1 && segments.last() == Some(&Segment::Multi);
        let wildcard_count = segments
            .iter()
            .filter(|s| !matches!(s, Segment::Literal(_)))
            .count();

        Ok(Self {
            text: trimmed.to_ascii_lowercase(),
            segments,
            leading_multi,
            trailing_multi,
            wildcard_count,
        })
    }

    /// The normalized (lowercased, trailing-dot-stripped) pattern text.
    ///
    /// Both registration and removal compare this form, so pattern identity
    /// is case-insensitive like matching itself.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when every segment is a literal.
    pub fn is_exact(&self) -> bool {
        self.wildcard_count == 0
    }

    /// Lookup key for the exact-match fast path.
    pub(crate) fn exact_key(&self) -> String {
        self.text.clone()
    }

    /// Ranking key, lower is better: all-literal patterns first, then fewer
    /// wildcards, then matches without `**`. Registration order breaks ties
    /// at the call site.
    pub(crate) fn rank(&self) -> (bool, usize, bool) {
        (
            self.wildcard_count > 0,
            self.wildcard_count,
            self.leading_multi || self.trailing_multi || self.segments == [Segment::Multi],
        )
    }

    /// Structural match against the labels of a host.
    pub fn matches(&self, labels: &[&str]) -> bool {
        // A lone `**` matches anything, including an empty host.
        if self.segments == [Segment::Multi] {
            return true;
        }

        let fixed: &[Segment] = {
            let start = usize::from(self.leading_multi);
            let end = self.segments.len() - usize::from(self.trailing_multi);
            &self.segments[start..end]
        };

        let aligns = |offset: usize| {
            fixed
                .iter()
                .zip(&labels[offset..offset + fixed.len()])
                .all(|(seg, label)| seg.matches_label(label))
        };

        match (self.leading_multi, self.trailing_multi) {
            (false, false) => labels.len() == fixed.len() && aligns(0),
            // Fixed segments align at the end opposite the `**`.
            (true, false) => labels.len() >= fixed.len() && aligns(labels.len() - fixed.len()),
            (false, true) => labels.len() >= fixed.len() && aligns(0),
            (true, true) => {
                labels.len() >= fixed.len() && (0..=labels.len() - fixed.len()).any(aligns)
            }
        }
    }
}

impl Segment {
    fn matches_label(&self, label: &str) -> bool {
        match self {
            Segment::Literal(lit) => label.eq_ignore_ascii_case(lit),
            Segment::Single => !label.is_empty(),
            // `**` is consumed by the alignment logic, never positionally.
            Segment::Multi => false,
        }
    }
}

/// Expand `{a,b,c}` groups into plain patterns, recursively.
///
/// An empty alternative collapses the dot that follows the group, so
/// `{,www.}example.com` yields both `example.com` and `www.example.com`.
pub fn expand(pattern: &str) -> Result<Vec<String>, InvalidPatternError> {
    let mut out = Vec::new();
    expand_into(pattern.trim(), &mut out)?;
    Ok(out)
}

fn expand_into(pattern: &str, out: &mut Vec<String>) -> Result<(), InvalidPatternError> {
    if let Some(open) = pattern.find('{') {
        let close = pattern[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| InvalidPatternError::UnmatchedGroup(pattern.to_string()))?;

        let head = &pattern[..open];
        let tail = &pattern[close + 1..];
        for value in pattern[open + 1..close].split(',') {
            let value = value.trim();
            let tail = if value.is_empty() {
                tail.strip_prefix('.').unwrap_or(tail)
            } else {
                tail
            };
            expand_into(&format!("{head}{value}{tail}"), out)?;
        }
        return Ok(());
    }

    out.push(pattern.strip_suffix('.').unwrap_or(pattern).to_string());
    Ok(())
}

/// Split a host string into labels for matching.
///
/// Strips an optional port (including the bracketed IPv6 form) and one
/// trailing dot; does not lowercase, matching is case-insensitive anyway.
pub(crate) fn host_labels(host: &str) -> Vec<&str> {
    let host = strip_port(host);
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        return Vec::new();
    }
    host.split('.').collect()
}

pub(crate) fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal; keep the brackets' contents as one label.
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(host: &str) -> Vec<&str> {
        host_labels(host)
    }

    fn pattern(text: &str) -> Pattern {
        Pattern::parse(text).unwrap()
    }

    #[test]
    fn literal_only_matches_exact_labels() {
        let p = pattern("api.example.com");
        assert!(p.matches(&labels("api.example.com")));
        assert!(p.matches(&labels("API.Example.COM")));
        assert!(!p.matches(&labels("example.com")));
        assert!(!p.matches(&labels("www.api.example.com")));
    }

    #[test]
    fn single_wildcard_consumes_exactly_one_label() {
        let p = pattern("*.localhost");
        assert!(p.matches(&labels("a.localhost")));
        assert!(p.matches(&labels("b.localhost")));
        assert!(!p.matches(&labels("a.b.localhost")));
        assert!(!p.matches(&labels("localhost")));
    }

    #[test]
    fn single_wildcard_in_the_middle() {
        let p = pattern("test.*.localhost");
        assert!(p.matches(&labels("test.anything.localhost")));
        assert!(!p.matches(&labels("x.nope.localhost")));
        assert!(!p.matches(&labels("test.localhost")));
    }

    #[test]
    fn multi_wildcard_leading() {
        let p = pattern("**.x");
        assert!(p.matches(&labels("x")));
        assert!(p.matches(&labels("a.x")));
        assert!(p.matches(&labels("a.b.c.x")));
        assert!(!p.matches(&labels("y")));
        assert!(!p.matches(&labels("a.b.y")));
    }

    #[test]
    fn multi_wildcard_trailing() {
        let p = pattern("x.**");
        assert!(p.matches(&labels("x")));
        assert!(p.matches(&labels("x.a")));
        assert!(p.matches(&labels("x.a.b.c")));
        assert!(!p.matches(&labels("y")));
        assert!(!p.matches(&labels("a.x")));
    }

    #[test]
    fn multi_wildcard_both_edges() {
        let p = pattern("**.x.**");
        assert!(p.matches(&labels("x")));
        assert!(p.matches(&labels("a.x.b")));
        assert!(p.matches(&labels("a.b.x")));
        assert!(!p.matches(&labels("a.b.c")));
    }

    #[test]
    fn lone_multi_matches_everything() {
        let p = pattern("**");
        assert!(p.matches(&labels("any.host.at.all")));
        assert!(p.matches(&labels("x")));
    }

    #[test]
    fn mixed_wildcards() {
        let p = pattern("alpha.*.*");
        assert!(p.matches(&labels("alpha.1.2")));
        assert!(!p.matches(&labels("beta.1.2")));
        assert!(!p.matches(&labels("alpha.1.2.3")));
        assert!(!p.matches(&labels("alpha.1")));
    }

    #[test]
    fn interior_multi_is_rejected() {
        assert_eq!(
            Pattern::parse("a.**.b"),
            Err(InvalidPatternError::InteriorMulti("a.**.b".into()))
        );
    }

    #[test]
    fn empty_labels_are_rejected() {
        assert!(matches!(
            Pattern::parse("a..b"),
            Err(InvalidPatternError::EmptyLabel(_))
        ));
        assert_eq!(Pattern::parse(""), Err(InvalidPatternError::Empty));
    }

    #[test]
    fn text_is_normalized_to_lowercase() {
        assert_eq!(pattern("Api.Example.COM").text(), "api.example.com");
    }

    #[test]
    fn trailing_dot_is_tolerated() {
        let p = pattern("example.com.");
        assert_eq!(p.text(), "example.com");
        assert!(p.matches(&labels("example.com")));
        assert!(p.matches(&labels("example.com.")));
    }

    #[test]
    fn group_expansion() {
        assert_eq!(
            expand("{a,b}.example.com").unwrap(),
            vec!["a.example.com", "b.example.com"]
        );
        assert_eq!(
            expand("{,www.}example.com").unwrap(),
            vec!["example.com", "www.example.com"]
        );
        assert_eq!(
            expand("{a,b}.{x,y}").unwrap(),
            vec!["a.x", "a.y", "b.x", "b.y"]
        );
    }

    #[test]
    fn group_expansion_unmatched_brace() {
        assert!(matches!(
            expand("{a,b.example.com"),
            Err(InvalidPatternError::UnmatchedGroup(_))
        ));
    }

    #[test]
    fn rank_orders_specificity() {
        let exact = pattern("a.b");
        let single = pattern("*.b");
        let multi = pattern("**.b");
        assert!(exact.rank() < single.rank());
        assert!(single.rank() < multi.rank());
    }

    #[test]
    fn port_is_stripped_from_hosts() {
        assert_eq!(host_labels("example.com:8080"), vec!["example", "com"]);
        assert_eq!(host_labels("[::1]:8080"), vec!["::1"]);
        assert_eq!(host_labels(""), Vec::<&str>::new());
    }

    #[test]
    fn pattern_matches_nothing_positionally_for_multi() {
        // `**` never consumes a label positionally; the alignment logic
        // handles it. Guard against regressions in Segment::matches_label.
        assert!(!Segment::Multi.matches_label("x"));
    }
}
