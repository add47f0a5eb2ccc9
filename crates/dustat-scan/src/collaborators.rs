//! Package manager and categorizer collaborator interfaces (§6.3, §6.4).
//! The scan engine consumes these traits and ships small default
//! implementations; it never becomes a package manager or MIME database
//! itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub arch: String,
}

pub trait PackageManager {
    fn list_installed(&self) -> Vec<InstalledPackage>;
    fn list_files_of(&self, pkg: &InstalledPackage) -> Vec<PathBuf>;
}

/// Used where no real package-manager backend is wired in (§6.3's
/// Non-goal: the core does not implement an apt/rpm/pacman backend).
pub struct NullPackageManager;

impl PackageManager for NullPackageManager {
    fn list_installed(&self) -> Vec<InstalledPackage> {
        Vec::new()
    }

    fn list_files_of(&self, _pkg: &InstalledPackage) -> Vec<PathBuf> {
        Vec::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub name: &'static str,
    pub color: &'static str,
}

pub trait Categorizer: Send + Sync {
    fn category(&self, file: &Path) -> Category;
}

/// Extension-keyed categorizer, recovered from `MimeCategorizer.h`'s
/// suffix-rule table: a small built-in map of common extensions to a
/// name+color, enough to color a treemap without a full MIME database.
pub struct ExtensionCategorizer {
    rules: Vec<(&'static str, Category)>,
    fallback: Category,
}

const RULES: &[(&str, &str, &str)] = &[
    ("jpg", "Images", "#dd5500"),
    ("jpeg", "Images", "#dd5500"),
    ("png", "Images", "#dd5500"),
    ("gif", "Images", "#dd5500"),
    ("svg", "Images", "#dd5500"),
    ("mp3", "Music", "#cc00cc"),
    ("flac", "Music", "#cc00cc"),
    ("ogg", "Music", "#cc00cc"),
    ("mp4", "Videos", "#0066cc"),
    ("mkv", "Videos", "#0066cc"),
    ("avi", "Videos", "#0066cc"),
    ("zip", "Archives", "#888800"),
    ("tar", "Archives", "#888800"),
    ("gz", "Archives", "#888800"),
    ("xz", "Archives", "#888800"),
    ("7z", "Archives", "#888800"),
    ("pdf", "Documents", "#008844"),
    ("doc", "Documents", "#008844"),
    ("docx", "Documents", "#008844"),
    ("txt", "Documents", "#008844"),
    ("md", "Documents", "#008844"),
    ("c", "Source code", "#3366ff"),
    ("cpp", "Source code", "#3366ff"),
    ("h", "Source code", "#3366ff"),
    ("rs", "Source code", "#3366ff"),
    ("py", "Source code", "#3366ff"),
    ("js", "Source code", "#3366ff"),
    ("so", "Libraries", "#999999"),
    ("a", "Libraries", "#999999"),
    ("dll", "Libraries", "#999999"),
];

impl ExtensionCategorizer {
    pub fn new() -> Self {
        let rules = RULES.iter().map(|(ext, name, color)| (*ext, Category { name, color })).collect();
        ExtensionCategorizer { rules, fallback: Category { name: "Other", color: "#777777" } }
    }
}

impl Default for ExtensionCategorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Categorizer for ExtensionCategorizer {
    fn category(&self, file: &Path) -> Category {
        let ext = file.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) => self
                .rules
                .iter()
                .find(|(rule_ext, _)| *rule_ext == ext)
                .map(|(_, cat)| cat.clone())
                .unwrap_or_else(|| self.fallback.clone()),
            None => self.fallback.clone(),
        }
    }
}

/// Snapshots every file registered by every installed package into a flat
/// set, taken once at filter-set construction time (§4.5's "Package
/// filter").
pub fn snapshot_package_files(mgr: &dyn PackageManager) -> HashSet<PathBuf> {
    let mut set = HashSet::new();
    for pkg in mgr.list_installed() {
        set.extend(mgr.list_files_of(&pkg));
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_known_and_unknown_extensions() {
        let cat = ExtensionCategorizer::new();
        assert_eq!(cat.category(Path::new("/a/photo.JPG")).name, "Images");
        assert_eq!(cat.category(Path::new("/a/readme")).name, "Other");
    }

    #[test]
    fn null_package_manager_has_no_files() {
        let mgr = NullPackageManager;
        assert!(snapshot_package_files(&mgr).is_empty());
    }
}
