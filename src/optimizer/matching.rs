// Output comparison

use crate::config::MatchingConfig;

/// Default comparison: whitespace-trimmed, case-insensitive equality.
pub fn check_match(actual: &str, expected: &str) -> bool {
    MatchPolicy::default().matches(actual, expected)
}

/// Literal string comparison with optional case folding and trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    pub case_sensitive: bool,
    pub strip_whitespace: bool,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strip_whitespace: true,
        }
    }
}

impl From<MatchingConfig> for MatchPolicy {
    fn from(config: MatchingConfig) -> Self {
        Self {
            case_sensitive: config.case_sensitive,
            strip_whitespace: config.strip_whitespace,
        }
    }
}

impl MatchPolicy {
    pub fn matches(&self, actual: &str, expected: &str) -> bool {
        let (a, e) = if self.strip_whitespace {
            (actual.trim(), expected.trim())
        } else {
            (actual, expected)
        };

        if self.case_sensitive {
            a == e
        } else {
            a.to_lowercase() == e.to_lowercase()
        }
    }
}
