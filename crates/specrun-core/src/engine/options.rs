//! Options narrowing which contexts a run executes.

use serde::{Deserialize, Serialize};

use crate::assembly::ContextDescriptor;

/// Filters applied by the engine before running a context.
///
/// Empty lists filter nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Run only contexts carrying at least one of these tags.
    #[serde(default)]
    pub include_tags: Vec<String>,
    /// Never run contexts carrying any of these tags.
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    /// Run only contexts with these names.
    #[serde(default)]
    pub filters: Vec<String>,
}

impl RunOptions {
    /// Whether `context` should run under these options.
    pub fn allows(&self, context: &ContextDescriptor) -> bool {
        if !self.filters.is_empty() && !self.filters.iter().any(|f| *f == context.name) {
            return false;
        }
        if !self.include_tags.is_empty()
            && !context.tags.iter().any(|t| self.include_tags.contains(t))
        {
            return false;
        }
        !context.tags.iter().any(|t| self.exclude_tags.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_everything() {
        let options = RunOptions::default();
        assert!(options.allows(&ContextDescriptor::new("a::one")));
        assert!(options.allows(&ContextDescriptor::new("a::two").with_tags(["slow"])));
    }

    #[test]
    fn test_tags() {
        let options = RunOptions {
            include_tags: vec!["db".to_string()],
            exclude_tags: vec!["slow".to_string()],
            ..Default::default()
        };
        assert!(options.allows(&ContextDescriptor::new("a").with_tags(["db"])));
        assert!(!options.allows(&ContextDescriptor::new("b").with_tags(["db", "slow"])));
        assert!(!options.allows(&ContextDescriptor::new("c")));
    }

    #[test]
    fn test_name_filter() {
        let options = RunOptions {
            filters: vec!["a::one".to_string()],
            ..Default::default()
        };
        assert!(options.allows(&ContextDescriptor::new("a::one")));
        assert!(!options.allows(&ContextDescriptor::new("a::two")));
    }
}
