use std::path::Path;

use regex::{Regex, RegexBuilder};

use crate::wildcard::wildcard_to_regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeKind {
    Regex,
    Wildcard,
    Fixed,
}

/// One exclude rule (§4.5): regex, wildcard, or fixed-string, matched
/// against either the full path or just the basename.
pub struct ExcludeRule {
    kind: ExcludeKind,
    matcher: Regex,
    pub full_path: bool,
    /// "match any direct non-directory child" rules are applied after the
    /// directory has been fully read, not per-entry (§4.4 step 4).
    pub match_any_direct_child: bool,
}

impl ExcludeRule {
    pub fn new(
        kind: ExcludeKind,
        pattern: &str,
        case_sensitive: bool,
        full_path: bool,
        match_any_direct_child: bool,
    ) -> Result<Self, regex::Error> {
        let matcher = match kind {
            ExcludeKind::Regex => RegexBuilder::new(pattern).case_insensitive(!case_sensitive).build()?,
            ExcludeKind::Wildcard => wildcard_to_regex(pattern, case_sensitive)?,
            ExcludeKind::Fixed => {
                let anchored = format!("^{}$", regex::escape(pattern));
                RegexBuilder::new(&anchored).case_insensitive(!case_sensitive).build()?
            }
        };
        Ok(ExcludeRule {
            kind,
            matcher,
            full_path,
            match_any_direct_child,
        })
    }

    pub fn kind(&self) -> ExcludeKind {
        self.kind
    }

    pub fn matches(&self, full_path: &Path, basename: &str) -> bool {
        if self.full_path {
            self.matcher.is_match(&full_path.to_string_lossy())
        } else {
            self.matcher.is_match(basename)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn basename_match() {
        let rule = ExcludeRule::new(ExcludeKind::Wildcard, "*.o", true, false, false).unwrap();
        assert!(rule.matches(&PathBuf::from("/a/b/x.o"), "x.o"));
        assert!(!rule.matches(&PathBuf::from("/a/b/x.c"), "x.c"));
    }

    #[test]
    fn full_path_match() {
        let rule = ExcludeRule::new(ExcludeKind::Fixed, "/a/b/target", true, true, false).unwrap();
        assert!(rule.matches(&PathBuf::from("/a/b/target"), "target"));
        assert!(!rule.matches(&PathBuf::from("/a/c/target"), "target"));
    }
}
