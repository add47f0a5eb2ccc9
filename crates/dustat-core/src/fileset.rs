use crate::node::NodeId;
use crate::tree::Tree;

/// A set-of-nodes collection with the normalization operations views need
/// before bulk operations (§4.6).
#[derive(Clone, Debug, Default)]
pub struct FileInfoSet(pub Vec<NodeId>);

impl FileInfoSet {
    pub fn new(ids: Vec<NodeId>) -> Self {
        FileInfoSet(ids)
    }

    /// Drop entries whose node has since been freed from the arena.
    pub fn invalid_removed(&self, tree: &Tree) -> FileInfoSet {
        FileInfoSet(self.0.iter().copied().filter(|id| tree.try_get(*id).is_some()).collect())
    }

    /// Drop entries whose ancestor is also present, so a bulk operation
    /// (delete, refresh) does not process a node twice.
    pub fn normalized(&self, tree: &Tree) -> FileInfoSet {
        let present: std::collections::HashSet<NodeId> = self.0.iter().copied().collect();
        let kept: Vec<NodeId> = self
            .0
            .iter()
            .copied()
            .filter(|id| {
                let mut cur = tree.get(*id).parent;
                while let Some(p) = cur {
                    if present.contains(&p) {
                        return false;
                    }
                    cur = tree.get(p).parent;
                }
                true
            })
            .collect();
        FileInfoSet(kept)
    }

    /// Normalized set of parents, substituting the real directory when the
    /// parent is a pseudo-dir (dot entry or attic).
    pub fn parents(&self, tree: &Tree) -> FileInfoSet {
        let mut out = Vec::new();
        for id in &self.0 {
            if let Some(mut p) = tree.get(*id).parent {
                while tree.get(p).kind.is_pseudo_dir() {
                    match tree.get(p).parent {
                        Some(gp) => p = gp,
                        None => break,
                    }
                }
                out.push(p);
            }
        }
        FileInfoSet(out).normalized(tree)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use std::ffi::OsString;

    #[test]
    fn normalized_drops_descendants_of_included_ancestor() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);
        let child = tree.create_file(OsString::from("a"));
        tree.insert_child(root, child);

        let set = FileInfoSet::new(vec![root, child]);
        let normalized = set.normalized(&tree);
        assert_eq!(normalized.0, vec![root]);
    }

    #[test]
    fn parents_substitutes_real_dir_for_dot_entry() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);
        let file = tree.create_file(OsString::from("a.txt"));
        tree.insert_child(root, file);

        let set = FileInfoSet::new(vec![file]);
        let parents = set.parents(&tree);
        assert_eq!(parents.0, vec![root]);
    }
}
