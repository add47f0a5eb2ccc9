use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::wildcard::{suffix_fast_path, wildcard_to_regex};

/// Pattern / suffix filter (§4.5): `*.ext` with an alphanumeric `ext`
/// compiles to a cheap suffix comparator; anything else falls back to a
/// wildcard regex.
pub enum PatternFilter {
    Suffix { ext: String, case_sensitive: bool },
    Wildcard(Regex),
}

impl PatternFilter {
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self, regex::Error> {
        if let Some(ext) = suffix_fast_path(pattern) {
            return Ok(PatternFilter::Suffix {
                ext: if case_sensitive { ext.to_string() } else { ext.to_lowercase() },
                case_sensitive,
            });
        }
        Ok(PatternFilter::Wildcard(wildcard_to_regex(pattern, case_sensitive)?))
    }

    pub fn matches(&self, basename: &str) -> bool {
        match self {
            PatternFilter::Suffix { ext, case_sensitive } => {
                let name = if *case_sensitive { basename.to_string() } else { basename.to_lowercase() };
                name.ends_with(&format!(".{ext}"))
            }
            PatternFilter::Wildcard(re) => re.is_match(basename),
        }
    }
}

/// Package filter (§4.5): a snapshot of files known to any installed
/// package, supplied once by the package-manager collaborator (§6.3).
pub struct PackageFilter {
    files: HashSet<PathBuf>,
}

impl PackageFilter {
    pub fn new(files: HashSet<PathBuf>) -> Self {
        PackageFilter { files }
    }

    pub fn matches(&self, full_path: &Path) -> bool {
        self.files.contains(full_path)
    }
}

pub enum IgnoreFilter {
    Pattern(PatternFilter),
    Package(PackageFilter),
}

impl IgnoreFilter {
    pub fn matches(&self, full_path: &Path, basename: &str) -> bool {
        match self {
            IgnoreFilter::Pattern(p) => p.matches(basename),
            IgnoreFilter::Package(p) => p.matches(full_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_filter_matches_extension() {
        let f = PatternFilter::new("*.tmp", true).unwrap();
        assert!(f.matches("foo.tmp"));
        assert!(!f.matches("foo.tmpx"));
    }

    #[test]
    fn package_filter_matches_member_path() {
        let mut files = HashSet::new();
        files.insert(PathBuf::from("/usr/bin/ls"));
        let f = PackageFilter::new(files);
        assert!(f.matches(&PathBuf::from("/usr/bin/ls")));
        assert!(!f.matches(&PathBuf::from("/usr/bin/cat")));
    }
}
