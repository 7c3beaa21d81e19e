//! Topic pattern matching
//!
//! Topics are dotted hierarchical strings (`pipeline.stage.rms.error`).
//! A filter pattern is a dotted sequence of literal segments and `*`
//! wildcards, where `*` matches exactly one segment. A filter holding no
//! patterns passes everything.

/// Compiled topic filter over one or more patterns
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    patterns: Vec<Vec<Segment>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

impl TopicFilter {
    /// Pass-everything filter
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(pattern: &str) -> Self {
        let mut filter = Self::default();
        filter.add(pattern);
        filter
    }

    pub fn from_patterns<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Self {
        let mut filter = Self::default();
        for pattern in patterns {
            filter.add(pattern);
        }
        filter
    }

    pub fn add(&mut self, pattern: &str) {
        let compiled = pattern
            .split('.')
            .map(|segment| {
                if segment == "*" {
                    Segment::Wildcard
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();
        self.patterns.push(compiled);
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True when the topic passes the filter
    pub fn matches(&self, topic: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let segments: Vec<&str> = topic.split('.').collect();
        self.patterns.iter().any(|pattern| {
            pattern.len() == segments.len()
                && pattern.iter().zip(&segments).all(|(p, s)| match p {
                    Segment::Wildcard => true,
                    Segment::Literal(lit) => lit == s,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matches_one_segment() {
        let filter = TopicFilter::new("pipeline.stage.*.error");
        assert!(filter.matches("pipeline.stage.rms.error"));
        assert!(!filter.matches("pipeline.stage.rms.debug"));
        // Two segments in place of one `*` do not match
        assert!(!filter.matches("pipeline.stage.a.b.error"));
    }

    #[test]
    fn test_exact_pattern() {
        let filter = TopicFilter::new("pipeline.callback.error");
        assert!(filter.matches("pipeline.callback.error"));
        assert!(!filter.matches("pipeline.callback"));
        assert!(!filter.matches("pipeline.callback.error.extra"));
    }

    #[test]
    fn test_empty_filter_passes_all() {
        let filter = TopicFilter::all();
        assert!(filter.matches("anything.at.all"));
    }

    #[test]
    fn test_multiple_patterns_or_together() {
        let filter = TopicFilter::from_patterns(["a.*.c", "x.y"]);
        assert!(filter.matches("a.b.c"));
        assert!(filter.matches("x.y"));
        assert!(!filter.matches("a.b"));
    }
}
