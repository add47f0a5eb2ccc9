use std::path::Path;

use crate::exclude::ExcludeRule;
use crate::ignore::IgnoreFilter;

/// All filters constructed once and consulted read-only during a scan
/// (§4.5). A lookup returns true iff any filter matches; the node is then
/// routed to the attic instead of the normal children.
#[derive(Default)]
pub struct FilterSet {
    pub exclude_rules: Vec<ExcludeRule>,
    pub ignore_filters: Vec<IgnoreFilter>,
}

impl FilterSet {
    pub fn new() -> Self {
        FilterSet::default()
    }

    /// Per-entry exclude check, run while stat-ing a directory's children
    /// (§4.4 step 3). Rules flagged `match_any_direct_child` are excluded
    /// here; they are evaluated separately after the directory is read in
    /// full via [`FilterSet::any_direct_child_excluded`].
    pub fn is_excluded(&self, full_path: &Path, basename: &str) -> bool {
        self.exclude_rules
            .iter()
            .filter(|r| !r.match_any_direct_child)
            .any(|r| r.matches(full_path, basename))
    }

    /// Directory-level exclude check (§4.4 step 4): applied once, after the
    /// directory has been fully read, against its direct non-directory
    /// children.
    pub fn any_direct_child_excluded<'a>(&self, children: impl Iterator<Item = (&'a Path, &'a str)>) -> bool {
        let rules: Vec<&ExcludeRule> = self.exclude_rules.iter().filter(|r| r.match_any_direct_child).collect();
        if rules.is_empty() {
            return false;
        }
        for (full_path, basename) in children {
            if rules.iter().any(|r| r.matches(full_path, basename)) {
                return true;
            }
        }
        false
    }

    pub fn is_ignored(&self, full_path: &Path, basename: &str) -> bool {
        self.ignore_filters.iter().any(|f| f.matches(full_path, basename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclude::ExcludeKind;
    use crate::ignore::PatternFilter;
    use std::path::PathBuf;

    #[test]
    fn matches_any_filter() {
        let mut set = FilterSet::new();
        set.ignore_filters.push(IgnoreFilter::Pattern(PatternFilter::new("*.txt", true).unwrap()));
        assert!(set.is_ignored(&PathBuf::from("/a/b.txt"), "b.txt"));
        assert!(!set.is_ignored(&PathBuf::from("/a/b.rs"), "b.rs"));
    }

    #[test]
    fn direct_child_exclude_rule_is_separate_from_per_entry() {
        let mut set = FilterSet::new();
        set.exclude_rules
            .push(ExcludeRule::new(ExcludeKind::Fixed, ".git", true, false, true).unwrap());
        assert!(!set.is_excluded(&PathBuf::from("/repo/.git"), ".git"));
        assert!(set.any_direct_child_excluded(std::iter::once((Path::new("/repo/.git"), ".git"))));
    }
}
