//! Glob matching over slash-delimited keys (spec §9 "Globbing precision").
//!
//! `*` matches exactly one segment; `**` matches zero or more segments;
//! any other segment is a literal. Used by both the ACL evaluator (KV path
//! / service name globs) and the watch manager (key patterns).

/// A precompiled pattern. Cheap to clone (wraps an `Arc<[Segment]>`-free
/// `Vec` since patterns are small and typically compiled once at
/// subscribe/policy-load time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Star,
    DoubleStar,
}

impl Pattern {
    pub fn compile(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .map(|seg| match seg {
                "*" => Segment::Star,
                "**" => Segment::DoubleStar,
                other => Segment::Literal(other.to_string()),
            })
            .collect();
        Self { raw: raw.to_string(), segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains no wildcard segments (an exact key).
    pub fn is_exact(&self) -> bool {
        !self.segments.iter().any(|s| matches!(s, Segment::Star | Segment::DoubleStar))
    }

    pub fn matches(&self, key: &str) -> bool {
        let key_segments: Vec<&str> = key.split('/').collect();
        match_segments(&self.segments, &key_segments)
    }

    /// Longest non-wildcard leading prefix, used to build a prefix trie for
    /// the watch manager's publish path (spec §9).
    pub fn literal_prefix(&self) -> String {
        let mut out = Vec::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push(s.clone()),
                _ => break,
            }
        }
        out.join("/")
    }
}

fn match_segments(pattern: &[Segment], key: &[&str]) -> bool {
    match pattern.first() {
        None => key.is_empty(),
        Some(Segment::Literal(lit)) => {
            matches!(key.first(), Some(k) if *k == lit) && match_segments(&pattern[1..], &key[1..])
        }
        Some(Segment::Star) => !key.is_empty() && match_segments(&pattern[1..], &key[1..]),
        Some(Segment::DoubleStar) => {
            // ** matches zero or more segments: try every split point.
            for i in 0..=key.len() {
                if match_segments(&pattern[1..], &key[i..]) {
                    return true;
                }
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_exact_match() {
        let p = Pattern::compile("app/config");
        assert!(p.matches("app/config"));
        assert!(!p.matches("app/config/extra"));
        assert!(p.is_exact());
    }

    #[test]
    fn single_star_matches_one_segment() {
        let p = Pattern::compile("config/*");
        assert!(p.matches("config/a"));
        assert!(p.matches("config/b"));
        assert!(!p.matches("config/a/b"));
        assert!(!p.matches("other"));
        assert!(!p.is_exact());
    }

    #[test]
    fn double_star_matches_across_segments() {
        let p = Pattern::compile("app/**");
        assert!(p.matches("app"));
        assert!(p.matches("app/x"));
        assert!(p.matches("app/x/y/z"));
        assert!(!p.matches("other/x"));
    }

    #[test]
    fn double_star_in_middle() {
        let p = Pattern::compile("a/**/z");
        assert!(p.matches("a/z"));
        assert!(p.matches("a/b/z"));
        assert!(p.matches("a/b/c/z"));
        assert!(!p.matches("a/b/c"));
    }

    #[test]
    fn literal_prefix_stops_at_wildcard() {
        let p = Pattern::compile("app/sub/*");
        assert_eq!(p.literal_prefix(), "app/sub");
        let p2 = Pattern::compile("**");
        assert_eq!(p2.literal_prefix(), "");
    }
}
