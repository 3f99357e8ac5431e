//! Include/ignore volume selection.

use regex::Regex;

use crate::utils::errors::{DkrError, Result};

/// Compiled include/ignore pattern sets.
///
/// Ignore patterns win: a name matching any ignore pattern is excluded no
/// matter what the include set says. An empty include set selects every
/// name; a non-empty one requires at least one match. Patterns are
/// unanchored searches.
#[derive(Debug, Default)]
pub struct VolumeFilter {
    includes: Vec<Regex>,
    ignores: Vec<Regex>,
}

impl VolumeFilter {
    /// Compile both pattern sets. A malformed pattern fails the whole
    /// invocation before any volume is touched.
    pub fn compile(includes: &[String], ignores: &[String]) -> Result<Self> {
        Ok(Self {
            includes: compile_set(includes)?,
            ignores: compile_set(ignores)?,
        })
    }

    pub fn included(&self, name: &str) -> bool {
        if self.ignores.iter().any(|p| p.is_match(name)) {
            return false;
        }
        if self.includes.is_empty() {
            return true;
        }
        self.includes.iter().any(|p| p.is_match(name))
    }
}

fn compile_set(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| DkrError::Config(format!("Invalid pattern '{}': {}", p, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_includes_everything() {
        let filter = VolumeFilter::compile(&[], &[]).unwrap();
        for name in ["db_main", "logs", "", "weird-volume.name"] {
            assert!(filter.included(name), "{name} should be included");
        }
    }

    #[test]
    fn test_ignore_wins_over_include() {
        let filter =
            VolumeFilter::compile(&patterns(&["^db_"]), &patterns(&["main"])).unwrap();
        assert!(!filter.included("db_main"));
        assert!(filter.included("db_cache"));
    }

    #[test]
    fn test_nonempty_includes_require_match() {
        let filter = VolumeFilter::compile(&patterns(&["^db_"]), &[]).unwrap();
        assert!(!filter.included("logs"));
        assert!(!filter.included("mydb_data"));
        assert!(filter.included("db_main"));
    }

    #[test]
    fn test_db_prefix_scenario() {
        let filter = VolumeFilter::compile(&patterns(&["^db_"]), &[]).unwrap();
        let volumes = ["db_main", "db_cache", "logs"];
        let selected: Vec<&str> = volumes
            .iter()
            .copied()
            .filter(|v| filter.included(v))
            .collect();
        assert_eq!(selected, ["db_main", "db_cache"]);
    }

    #[test]
    fn test_patterns_are_unanchored() {
        let filter = VolumeFilter::compile(&patterns(&["cache"]), &[]).unwrap();
        assert!(filter.included("db_cache_v2"));
    }

    #[test]
    fn test_malformed_pattern_is_config_error() {
        let err = VolumeFilter::compile(&patterns(&["[unclosed"]), &[]).unwrap_err();
        assert!(matches!(err, DkrError::Config(_)));

        let err = VolumeFilter::compile(&[], &patterns(&["(?P<bad"])).unwrap_err();
        assert!(matches!(err, DkrError::Config(_)));
    }
}
