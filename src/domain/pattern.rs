//! URI pattern matching and specificity ordering.
//!
//! Semantics are pinned in `SPEC_FULL.md` §3.1 (spec.md left them only
//! sketched via the S4 scenario). `*` and `{name}` both match exactly one
//! path segment; `**` matches zero or more trailing segments and is only
//! legal as the final pattern segment.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    Glob,
}

/// A parsed, reusable URI pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPattern {
    segments: Vec<Segment>,
}

fn split_segments(uri: &str) -> Vec<&str> {
    let trimmed = uri.trim_end_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.trim_start_matches('/').split('/').collect()
}

impl UriPattern {
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let raw = split_segments(pattern);
        let mut segments = Vec::with_capacity(raw.len());
        for (i, seg) in raw.iter().enumerate() {
            let parsed = if *seg == "**" {
                Segment::Glob
            } else if *seg == "*" || (seg.starts_with('{') && seg.ends_with('}')) {
                Segment::Single
            } else {
                Segment::Literal((*seg).to_owned())
            };
            if matches!(parsed, Segment::Glob) && i != raw.len() - 1 {
                // `**` elsewhere is treated as a literal-looking single-segment
                // wildcard rather than a silent no-op: only the trailing
                // position gets suffix semantics.
                segments.push(Segment::Single);
                continue;
            }
            segments.push(parsed);
        }
        Self { segments }
    }

    #[must_use]
    pub fn matches(&self, uri: &str) -> bool {
        let uri_segs = split_segments(uri);
        match_segments(&self.segments, &uri_segs)
    }

    /// Lower values are more specific; used only to break ties when
    /// reporting which single permission provenance "won", never for the
    /// allow/deny decision itself (§4.1 and `SPEC_FULL.md` §3.1).
    #[must_use]
    pub fn specificity(&self) -> Specificity {
        let wildcard_count = self
            .segments
            .iter()
            .filter(|s| !matches!(s, Segment::Literal(_)))
            .count();
        let literal_prefix_len = self
            .segments
            .iter()
            .take_while(|s| matches!(s, Segment::Literal(_)))
            .count();
        let is_exact = wildcard_count == 0;
        Specificity {
            is_exact,
            wildcard_count,
            literal_prefix_len,
        }
    }
}

fn match_segments(pattern: &[Segment], uri: &[&str]) -> bool {
    match pattern.first() {
        None => uri.is_empty(),
        Some(Segment::Glob) => true, // only ever the last segment (enforced at parse time)
        Some(Segment::Single) => {
            !uri.is_empty() && match_segments(&pattern[1..], &uri[1..])
        }
        Some(Segment::Literal(lit)) => {
            !uri.is_empty() && uri[0] == lit && match_segments(&pattern[1..], &uri[1..])
        }
    }
}

/// Ordering key for pattern specificity: smaller is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specificity {
    is_exact: bool,
    wildcard_count: usize,
    literal_prefix_len: usize,
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        // exact literal match always wins
        match (self.is_exact, other.is_exact) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        self.wildcard_count
            .cmp(&other.wildcard_count)
            .then_with(|| other.literal_prefix_len.cmp(&self.literal_prefix_len))
    }
}

/// Convenience one-shot matcher (parses the pattern each call — prefer
/// `UriPattern::parse` + `matches` when checking many URIs against the
/// same pattern, as the graph's permission index does).
#[must_use]
pub fn pattern_matches(pattern: &str, uri: &str) -> bool {
    UriPattern::parse(pattern).matches(uri)
}

#[must_use]
pub fn specificity(pattern: &str) -> Specificity {
    UriPattern::parse(pattern).specificity()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_literal_only() {
        assert!(pattern_matches("/api/projects", "/api/projects"));
        assert!(!pattern_matches("/api/projects", "/api/project"));
    }

    #[test]
    fn star_matches_single_segment() {
        assert!(pattern_matches("/api/*", "/api/secret"));
        assert!(!pattern_matches("/api/*", "/api/secret/nested"));
    }

    #[test]
    fn double_star_matches_suffix() {
        assert!(pattern_matches("/api/**", "/api/a/b/c"));
        assert!(pattern_matches("/api/**", "/api"));
    }

    #[test]
    fn param_behaves_like_star() {
        assert!(pattern_matches("/api/{id}/edit", "/api/42/edit"));
        assert!(!pattern_matches("/api/{id}/edit", "/api/42/43/edit"));
    }

    #[test]
    fn trailing_slash_is_normalized() {
        assert!(pattern_matches("/api/projects/", "/api/projects"));
        assert!(pattern_matches("/api/projects", "/api/projects/"));
    }

    #[test]
    fn exact_beats_wildcard_specificity() {
        let exact = specificity("/api/secret");
        let wild = specificity("/api/*");
        assert!(exact < wild);
    }

    #[test]
    fn fewer_wildcards_is_more_specific() {
        let one_wild = specificity("/api/*/edit");
        let two_wild = specificity("/api/*/*");
        assert!(one_wild < two_wild);
    }
}
