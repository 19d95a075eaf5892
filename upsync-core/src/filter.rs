use std::path::Path;

/// Ignore filter built from the configured pattern list.
///
/// A path is ignored when its string form contains any pattern as a plain
/// substring. There is no glob or regex interpretation.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<String>,
}

impl IgnoreFilter {
    /// Build a filter from a pattern list. Empty patterns are dropped, since
    /// they would match every path.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.as_ref().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether `path` (relative to the local root) must be skipped.
    pub fn is_ignored<P: AsRef<Path>>(&self, path: P) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let path = path.as_ref().to_string_lossy();
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }
}
