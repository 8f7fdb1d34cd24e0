//! Slave exclusion patterns.

/// Case-sensitive substring patterns; a slave whose name contains any of
/// them is left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionFilter {
    patterns: Vec<String>,
}

impl ExclusionFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns the first pattern contained in `name`, if any.
    pub fn matching_pattern(&self, name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| name.contains(pattern.as_str()))
            .map(String::as_str)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.matching_pattern(name).is_some()
    }
}
