//! `PkgReadJob` (§3.1, §6.3): synthesizes a `PkgInfo` subtree per installed
//! package from a [`PackageManager`](crate::collaborators::PackageManager)
//! collaborator, instead of reading a directory from disk. Unlike
//! `LocalDirReadJob` this has no job-queue/tick presence of its own — the
//! package list is small enough, and the collaborator call itself the only
//! potentially slow step, that building the whole `Pkg:/` subtree in one
//! call is adequate (§6.3 notes the real backend may parallelize
//! `list_files_of` across sub-processes; that lives in the collaborator
//! implementation, not here).

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path};

use dustat_core::node::{NodeId, NodeKind};
use dustat_core::tree::Tree;

use crate::collaborators::{InstalledPackage, PackageManager};
use crate::unix_stat;

/// Builds one `PkgInfo` node per installed package under `tree.root`,
/// synthesizing `FileInfo`/intermediate-`DirInfo` children from
/// `list_files_of`. Packages that share a `name` but differ in `version`
/// or `arch` are marked `is_multi_version`/`is_multi_arch` on every node in
/// that name group (§3.1: "mark multi-version or multi-arch when names
/// collide"). Returns the created `PkgInfo` ids, in `list_installed` order.
pub fn scan_packages(tree: &mut Tree, mgr: &dyn PackageManager) -> Vec<NodeId> {
    let installed = mgr.list_installed();

    let mut by_name: HashMap<&str, Vec<&InstalledPackage>> = HashMap::new();
    for pkg in &installed {
        by_name.entry(pkg.name.as_str()).or_default().push(pkg);
    }

    let mut ids = Vec::with_capacity(installed.len());
    for pkg in &installed {
        let group = &by_name[pkg.name.as_str()];
        let is_multi_version = group.iter().any(|p| p.version != pkg.version);
        let is_multi_arch = group.iter().any(|p| p.arch != pkg.arch);

        let pkg_id = tree.create_dir_with_dot_entry(OsString::from(format!("Pkg:/{}", pkg.name)), NodeKind::Pkg);
        tree.insert_child(tree.root, pkg_id);
        {
            let d = tree.get_mut(pkg_id).dir_mut();
            d.pkg_version = Some(pkg.version.clone());
            d.pkg_arch = Some(pkg.arch.clone());
            d.is_multi_version = is_multi_version;
            d.is_multi_arch = is_multi_arch;
        }

        for file_path in mgr.list_files_of(pkg) {
            insert_pkg_file(tree, pkg_id, &file_path);
        }

        tree.finalize_local(pkg_id);
        tree.check_ignored(pkg_id);
        tree.mark_dirty(pkg_id);
        ids.push(pkg_id);
    }
    ids
}

/// Walks `path`'s components under `pkg_id`, creating intermediate
/// directories as needed (mirroring the real scan's on-disk nesting, since
/// a package's file list is a flat set of absolute paths), then creates a
/// leaf `FileInfo` stat'd off disk when the file still exists (a package's
/// file list can outlive the file itself, e.g. a user-deleted config).
fn insert_pkg_file(tree: &mut Tree, pkg_id: NodeId, path: &Path) {
    let mut cur = pkg_id;
    let mut components: Vec<Component> = path.components().collect();
    let leaf = match components.pop() {
        Some(c) => c,
        None => return,
    };

    for comp in components {
        let name = match comp {
            Component::Normal(n) => OsString::from(n),
            Component::RootDir => continue,
            _ => continue,
        };
        cur = find_or_create_dir(tree, cur, &name);
    }

    let leaf_name = match leaf {
        Component::Normal(n) => OsString::from(n),
        _ => return,
    };
    let file_id = tree.create_file(leaf_name);
    if let Ok(st) = unix_stat::stat_entry(path.parent().unwrap_or_else(|| Path::new("/")), None, path.file_name().unwrap_or_default()) {
        let node = tree.get_mut(file_id);
        node.mode = st.mode;
        node.uid = st.uid;
        node.gid = st.gid;
        node.mtime = st.mtime;
        node.byte_size = st.size;
        node.allocated_size = st.blocks * 512;
        node.blocks = st.blocks;
        node.links = st.nlink.max(1);
    }
    tree.insert_child(cur, file_id);
}

fn find_or_create_dir(tree: &mut Tree, parent: NodeId, name: &std::ffi::OsStr) -> NodeId {
    for c in tree.children(parent) {
        if tree.get(c).kind.is_dir() && tree.get(c).name == name {
            return c;
        }
    }
    let id = tree.create_dir_with_dot_entry(OsString::from(name), NodeKind::Dir);
    tree.insert_child(parent, id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PackageManager;
    use std::path::PathBuf;

    struct FakeManager;

    impl PackageManager for FakeManager {
        fn list_installed(&self) -> Vec<InstalledPackage> {
            vec![
                InstalledPackage { name: "foo".into(), version: "1.0".into(), arch: "amd64".into() },
                InstalledPackage { name: "foo".into(), version: "2.0".into(), arch: "amd64".into() },
                InstalledPackage { name: "bar".into(), version: "3.0".into(), arch: "amd64".into() },
            ]
        }

        fn list_files_of(&self, pkg: &InstalledPackage) -> Vec<PathBuf> {
            match pkg.name.as_str() {
                "foo" => vec![PathBuf::from("/usr/bin/foo"), PathBuf::from("/usr/share/foo/doc.txt")],
                _ => vec![PathBuf::from("/usr/bin/bar")],
            }
        }
    }

    #[test]
    fn synthesizes_pkginfo_subtrees_and_flags_multi_version() {
        let mut tree = Tree::new();
        let mgr = FakeManager;
        let ids = scan_packages(&mut tree, &mgr);
        assert_eq!(ids.len(), 3);

        let foo1 = ids[0];
        let d = tree.get(foo1).dir();
        assert!(d.is_multi_version);
        assert!(!d.is_multi_arch);
        assert_eq!(tree.get(foo1).name.to_string_lossy(), "Pkg:/foo");

        let bar = ids[2];
        assert!(!tree.get(bar).dir().is_multi_version);
    }

    #[test]
    fn nests_package_files_by_directory_component() {
        let mut tree = Tree::new();
        let mgr = FakeManager;
        let ids = scan_packages(&mut tree, &mgr);
        let foo = ids[0];

        let usr = tree.children(foo).find(|c| tree.get(*c).name == "usr").expect("usr dir");
        assert!(tree.get(usr).kind.is_dir());
        let share = tree.children(usr).find(|c| tree.get(*c).name == "share").expect("share dir");
        let foo_dir = tree.children(share).find(|c| tree.get(*c).name == "foo").expect("foo dir");
        let doc = tree
            .children(foo_dir)
            .chain(tree.get(foo_dir).dir().dot_entry.into_iter().flat_map(|de| tree.children(de)))
            .find(|c| tree.get(*c).name == "doc.txt");
        assert!(doc.is_some());
    }
}
