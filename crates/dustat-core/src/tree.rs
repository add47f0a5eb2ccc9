use std::ffi::{OsStr, OsString};
use std::path::Path;

use crate::node::{DirData, Node, NodeId, NodeKind, ReadState};

/// An in-memory, parent-linked file/directory graph, arena-backed.
///
/// `Tree` owns an invisible root `Dir` node; the first visible toplevel is
/// its first child (§3.1). Every reference between nodes is a [`NodeId`]
/// rather than an owning pointer, so there is no destructor-ordering hazard
/// and no magic-number staleness check (§9 design note).
pub struct Tree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    pub root: NodeId,
    pub ignore_hard_links: bool,
}

impl Tree {
    pub fn new() -> Self {
        let mut nodes = Vec::new();
        nodes.push(Some(Node::new_dir(OsString::new(), NodeKind::Dir)));
        Tree {
            nodes,
            free: Vec::new(),
            root: NodeId(0),
            ignore_hard_links: false,
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = Some(node);
            id
        } else {
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(Some(node));
            id
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        self.nodes[id.index()]
            .as_ref()
            .expect("NodeId used after its node was freed")
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.index()]
            .as_mut()
            .expect("NodeId used after its node was freed")
    }

    pub fn try_get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|n| n.as_ref())
    }

    /// Children of `parent`, walking `next_sibling`, not including the dot
    /// entry or attic.
    pub fn children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cur = self.get(parent).dir().first_child;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.get(id).next_sibling;
            Some(id)
        })
    }

    /// `size()` / `allocated_size()` with hard-link division (invariant 5):
    /// a regular file's reported size is divided by its link count unless
    /// the tree is configured to ignore hard-link sharing.
    pub fn size(&self, id: NodeId) -> u64 {
        self.divided(id, self.get(id).byte_size)
    }

    pub fn allocated_size(&self, id: NodeId) -> u64 {
        self.divided(id, self.get(id).allocated_size)
    }

    fn divided(&self, id: NodeId, value: u64) -> u64 {
        let node = self.get(id);
        if !node.kind.is_dir() && node.links > 1 && !self.ignore_hard_links {
            value / node.links
        } else {
            value
        }
    }

    /// `insert_child` (§4.1): directories, and files when `parent` has no
    /// dot entry, are prepended directly; otherwise delegate to the dot
    /// entry.
    pub fn insert_child(&mut self, parent: NodeId, child: NodeId) {
        let dot_entry = self.get(parent).dir().dot_entry;
        let target = if self.get(child).kind.is_dir() || dot_entry.is_none() {
            parent
        } else {
            dot_entry.unwrap()
        };

        self.get_mut(child).parent = Some(target);
        let head = self.get(target).dir().first_child;
        self.get_mut(child).next_sibling = head;
        self.get_mut(target).dir_mut().first_child = Some(child);
        self.get_mut(target).dir_mut().direct_children_count += 1;

        self.child_added(target, child);
    }

    /// `add_to_attic` (§4.1): routes an ignored child to `parent`'s attic,
    /// or to the dot entry's attic when `parent` has a dot entry and the
    /// child is not itself a directory, creating atics lazily.
    pub fn add_to_attic(&mut self, parent: NodeId, child: NodeId) {
        let dot_entry = self.get(parent).dir().dot_entry;
        let target_dir = if self.get(child).kind.is_dir() || dot_entry.is_none() {
            parent
        } else {
            dot_entry.unwrap()
        };

        let attic = self.attic_or_create(target_dir);
        self.get_mut(child).is_ignored = true;
        self.mark_subtree_ignored(child);

        self.get_mut(child).parent = Some(attic);
        let head = self.get(attic).dir().first_child;
        self.get_mut(child).next_sibling = head;
        self.get_mut(attic).dir_mut().first_child = Some(child);

        self.get_mut(target_dir).dir_mut().total_ignored_items += 1;
        self.mark_dirty(target_dir);
    }

    fn mark_subtree_ignored(&mut self, id: NodeId) {
        self.get_mut(id).is_ignored = true;
        if self.get(id).kind.is_dir() {
            let children: Vec<NodeId> = self.children(id).collect();
            for c in children {
                self.mark_subtree_ignored(c);
            }
        }
    }

    fn attic_or_create(&mut self, dir: NodeId) -> NodeId {
        if let Some(attic) = self.get(dir).dir().attic {
            return attic;
        }
        let attic = self.alloc(Node::new_dir(OsString::from("<attic>"), NodeKind::Attic));
        self.get_mut(attic).parent = Some(dir);
        self.get_mut(dir).dir_mut().attic = Some(attic);
        attic
    }

    fn dot_entry_or_create(&mut self, dir: NodeId) -> NodeId {
        if let Some(de) = self.get(dir).dir().dot_entry {
            return de;
        }
        let de = self.alloc(Node::new_dir(OsString::from("<dot-entry>"), NodeKind::DotEntry));
        self.get_mut(de).parent = Some(dir);
        self.get_mut(dir).dir_mut().dot_entry = Some(de);
        self.get_mut(dir).dir_mut().direct_children_count += 1;
        de
    }

    /// Eagerly create a dot entry for a newly-created real directory, per
    /// §4.1: "When a new directory D is first created... a DotEntry is
    /// created eagerly".
    pub fn create_dir_with_dot_entry(&mut self, name: OsString, kind: NodeKind) -> NodeId {
        let id = self.alloc(Node::new_dir(name, kind));
        if !kind.is_pseudo_dir() {
            self.dot_entry_or_create(id);
        }
        id
    }

    pub fn create_file(&mut self, name: OsString) -> NodeId {
        self.alloc(Node::new_file(name))
    }

    /// `unlink_child`: logs and no-ops if not found, never errors (§4.1).
    pub fn unlink_child(&mut self, parent: NodeId, child: NodeId) {
        let mut cur = self.get(parent).dir().first_child;
        let mut prev: Option<NodeId> = None;
        while let Some(id) = cur {
            if id == child {
                let next = self.get(id).next_sibling;
                match prev {
                    Some(p) => self.get_mut(p).next_sibling = next,
                    None => self.get_mut(parent).dir_mut().first_child = next,
                }
                self.get_mut(child).next_sibling = None;
                self.get_mut(child).parent = None;
                if self.get(parent).dir().dot_entry != Some(child)
                    && self.get(parent).dir().attic != Some(child)
                {
                    self.get_mut(parent).dir_mut().direct_children_count =
                        self.get(parent).dir().direct_children_count.saturating_sub(1);
                }
                self.mark_dirty(parent);
                return;
            }
            prev = Some(id);
            cur = self.get(id).next_sibling;
        }
        log::debug!("unlink_child: child not found under parent, ignoring");
    }

    /// Recursively frees `id` and everything reachable from it (dot entry,
    /// attic, child list), returning the slots to the arena free list.
    pub fn free_subtree(&mut self, id: NodeId) {
        if let Some(node) = &self.nodes[id.index()] {
            if let Some(dir) = &node.dir {
                let first_child = dir.first_child;
                let dot_entry = dir.dot_entry;
                let attic = dir.attic;
                let mut cur = first_child;
                while let Some(c) = cur {
                    let next = self.get(c).next_sibling;
                    self.free_subtree(c);
                    cur = next;
                }
                if let Some(de) = dot_entry {
                    self.free_subtree(de);
                }
                if let Some(at) = attic {
                    self.free_subtree(at);
                }
            }
        }
        self.nodes[id.index()] = None;
        self.free.push(id);
    }

    /// Drops the whole arena and reinitializes the invisible root.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.nodes.push(Some(Node::new_dir(OsString::new(), NodeKind::Dir)));
        self.root = NodeId(0);
    }

    /// Dirty propagation (invariant 7): mark `id` and every ancestor dirty
    /// and drop their sort caches, stopping once an already-dirty ancestor
    /// is reached (it has already propagated further).
    pub fn mark_dirty(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = self.get_mut(n);
            if let Some(dir) = node.dir.as_mut() {
                if dir.summary_dirty {
                    break;
                }
                dir.summary_dirty = true;
                dir.sort_info = None;
            }
            cur = self.get(n).parent;
        }
    }

    /// Incremental totals update on insert (§4.2): applied only while the
    /// parent subtree is clean; otherwise the eventual `recalc` subsumes it.
    fn child_added(&mut self, parent: NodeId, child: NodeId) {
        if self.get(parent).dir().summary_dirty {
            return;
        }
        let (c_size, c_alloc, c_blocks, c_items, c_subdirs, c_files, c_mtime, c_oldest) = {
            let c = self.get(child);
            if c.kind.is_dir() {
                let d = c.dir();
                (
                    d.total_size,
                    d.total_allocated_size,
                    d.total_blocks,
                    d.total_items,
                    d.total_subdirs + 1,
                    d.total_files,
                    c.mtime.max(d.latest_mtime),
                    d.oldest_file_mtime,
                )
            } else {
                (
                    self.size(child),
                    self.allocated_size(child),
                    c.blocks,
                    1,
                    0,
                    1,
                    c.mtime,
                    c.mtime,
                )
            }
        };

        let p = self.get_mut(parent).dir_mut();
        p.total_size += c_size;
        p.total_allocated_size += c_alloc;
        p.total_blocks += c_blocks;
        p.total_items += c_items + 1;
        p.total_subdirs += c_subdirs;
        p.total_files += c_files;
        p.total_unignored_items += 1;
        p.latest_mtime = p.latest_mtime.max(c_mtime);
        if c_oldest > 0 && (p.oldest_file_mtime == 0 || c_oldest < p.oldest_file_mtime) {
            p.oldest_file_mtime = c_oldest;
        }
    }

    /// `locate`: resolve a path against the tree (invariant: `tree.locate(x.url)
    /// == x`). A toplevel's `name` is its full absolute path (§3.1), so this
    /// first looks for a toplevel whose name is a prefix of `path`, then
    /// walks the remaining components as ordinary child names.
    pub fn locate(&self, path: &Path) -> Option<NodeId> {
        let path_str = path.to_string_lossy();
        for top in self.children(self.root) {
            let top_name = self.get(top).name.to_string_lossy().into_owned();
            if path_str == top_name {
                return Some(top);
            }
            if let Some(rest) = path_str.strip_prefix(top_name.as_str()) {
                let rest = rest.trim_start_matches('/');
                if rest.is_empty() {
                    return Some(top);
                }
                return self.locate_relative(top, rest);
            }
        }
        None
    }

    fn locate_relative(&self, start: NodeId, rest: &str) -> Option<NodeId> {
        let mut cur = start;
        for comp in rest.split('/') {
            if comp.is_empty() {
                continue;
            }
            cur = self.find_named_child(cur, OsStr::new(comp))?;
        }
        Some(cur)
    }

    fn find_named_child(&self, parent: NodeId, name: &OsStr) -> Option<NodeId> {
        for c in self.children(parent) {
            if self.get(c).name == name {
                return Some(c);
            }
        }
        if let Some(de) = self.get(parent).dir().dot_entry {
            for c in self.children(de) {
                if self.get(c).name == name {
                    return Some(c);
                }
            }
        }
        None
    }

    /// `finalize_local` (§4.1): after `dir` finishes reading, flatten a
    /// childless-except-for-files directory by reparenting the dot entry's
    /// children up, folding its attic into `dir`'s attic, then drop the
    /// dot entry if it ends up empty.
    pub fn finalize_local(&mut self, dir: NodeId) {
        let dot_entry = match self.get(dir).dir().dot_entry {
            Some(de) => de,
            None => return,
        };
        let has_real_dir_children = self
            .children(dir)
            .any(|c| self.get(c).kind.is_dir() && self.get(c).kind != NodeKind::DotEntry);
        let attic_has_children = self.get(dir).dir().attic.is_some();

        if !has_real_dir_children && !attic_has_children {
            let de_children: Vec<NodeId> = self.children(dot_entry).collect();
            for c in de_children {
                self.get_mut(c).parent = Some(dir);
                let head = self.get(dir).dir().first_child;
                self.get_mut(c).next_sibling = head;
                self.get_mut(dir).dir_mut().first_child = Some(c);
            }
            self.get_mut(dot_entry).dir_mut().first_child = None;

            if let Some(de_attic) = self.get(dot_entry).dir().attic {
                let dir_attic = self.attic_or_create(dir);
                let attic_children: Vec<NodeId> = self.children(de_attic).collect();
                for c in attic_children {
                    self.get_mut(c).parent = Some(dir_attic);
                    let head = self.get(dir_attic).dir().first_child;
                    self.get_mut(c).next_sibling = head;
                    self.get_mut(dir_attic).dir_mut().first_child = Some(c);
                }
                self.get_mut(de_attic).dir_mut().first_child = None;
                self.free.push(de_attic);
                self.nodes[de_attic.index()] = None;
                self.get_mut(dot_entry).dir_mut().attic = None;
            }

            if self.get(dot_entry).dir().first_child.is_none() {
                self.get_mut(dir).dir_mut().dot_entry = None;
                self.get_mut(dir).dir_mut().direct_children_count =
                    self.get(dir).dir().direct_children_count.saturating_sub(1);
                self.nodes[dot_entry.index()] = None;
                self.free.push(dot_entry);
            }
        }
        self.mark_dirty(dir);
    }

    /// `check_ignored` (§4.1): bottom-up cascade, stopping at pseudo-dirs.
    pub fn check_ignored(&mut self, dir: NodeId) {
        if self.get(dir).kind.is_pseudo_dir() {
            return;
        }
        self.recalc(dir);
        let d = self.get(dir).dir();
        let should_be_ignored = d.total_ignored_items > 0 && d.total_unignored_items == 0;
        if should_be_ignored {
            self.get_mut(dir).is_ignored = true;
            let children: Vec<NodeId> = self.children(dir).collect();
            for c in children {
                if !self.get(c).is_ignored {
                    self.get_mut(c).is_ignored = true;
                    if self.get(c).kind.is_dir() {
                        self.check_ignored(c);
                    }
                }
            }
            if let Some(parent) = self.get(dir).parent {
                if !self.get(parent).kind.is_pseudo_dir() {
                    self.check_ignored(parent);
                }
            }
        }
    }

    /// Summary aggregator's full recompute (§4.2): zero counters, walk
    /// direct children (dot entry counted as one more child), summing
    /// recursively; the attic's `total_ignored_items`/`err_subdir_count`
    /// are added last, unconditionally.
    pub fn recalc(&mut self, dir: NodeId) {
        if !self.get(dir).dir().summary_dirty {
            return;
        }

        let mut total_size = 0u64;
        let mut total_allocated_size = 0u64;
        let mut total_blocks = 0u64;
        let mut total_items = 0u32;
        let mut total_subdirs = 0u32;
        let mut total_files = 0u32;
        let mut total_unignored_items = 0u32;
        let mut err_subdir_count = 0u32;
        let mut latest_mtime = self.get(dir).mtime;
        let mut oldest_file_mtime = 0i64;

        let own_children: Vec<NodeId> = self.children(dir).collect();
        let dot_entry = self.get(dir).dir().dot_entry;
        let mut all_children = own_children;
        if let Some(de) = dot_entry {
            all_children.push(de);
        }

        for c in all_children {
            if self.get(c).is_ignored {
                continue;
            }
            let c_is_dir = self.get(c).kind.is_dir();
            if c_is_dir {
                self.recalc(c);
                let d = self.get(c).dir();
                total_size += d.total_size;
                total_allocated_size += d.total_allocated_size;
                total_blocks += d.total_blocks;
                total_items += d.total_items;
                total_subdirs += d.total_subdirs;
                total_files += d.total_files;
                total_unignored_items += d.total_unignored_items;
                err_subdir_count += d.err_subdir_count;
                latest_mtime = latest_mtime.max(d.latest_mtime);
                if d.oldest_file_mtime > 0
                    && (oldest_file_mtime == 0 || d.oldest_file_mtime < oldest_file_mtime)
                {
                    oldest_file_mtime = d.oldest_file_mtime;
                }
                if !self.get(c).kind.is_pseudo_dir() {
                    total_subdirs += 1;
                    total_items += 1;
                    total_unignored_items += 1;
                    if matches!(d.read_state, ReadState::Error | ReadState::PermissionDenied) {
                        err_subdir_count += 1;
                    }
                }
            } else {
                let size = self.size(c);
                let alloc = self.allocated_size(c);
                total_size += size;
                total_allocated_size += alloc;
                total_blocks += self.get(c).blocks;
                total_items += 1;
                total_files += 1;
                total_unignored_items += 1;
                let mtime = self.get(c).mtime;
                latest_mtime = latest_mtime.max(mtime);
                if mtime > 0 && (oldest_file_mtime == 0 || mtime < oldest_file_mtime) {
                    oldest_file_mtime = mtime;
                }
            }
        }

        let (ignored_from_attic, err_from_attic) = match self.get(dir).dir().attic {
            Some(attic) => {
                let ignored: u32 = self.children(attic).count() as u32;
                let err: u32 = self
                    .children(attic)
                    .filter(|c| {
                        self.get(*c).kind.is_dir()
                            && matches!(
                                self.get(*c).dir().read_state,
                                ReadState::Error | ReadState::PermissionDenied
                            )
                    })
                    .count() as u32;
                (ignored, err)
            }
            None => (0, 0),
        };

        let d = self.get_mut(dir).dir_mut();
        d.total_size = total_size;
        d.total_allocated_size = total_allocated_size;
        d.total_blocks = total_blocks;
        d.total_items = total_items;
        d.total_subdirs = total_subdirs;
        d.total_files = total_files;
        d.total_unignored_items = total_unignored_items;
        d.total_ignored_items = ignored_from_attic;
        d.err_subdir_count = err_subdir_count + err_from_attic;
        d.latest_mtime = latest_mtime;
        d.oldest_file_mtime = oldest_file_mtime;
        d.summary_dirty = false;
    }

    /// True if `ancestor` is `node` itself or a strict ancestor of it,
    /// walking `parent` pointers.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.try_get(n).and_then(|node| node.parent);
        }
        false
    }

    pub fn set_read_state(&mut self, dir: NodeId, state: ReadState) {
        let cur = self.get(dir).dir().read_state;
        if !cur.can_transition_to(state) {
            return;
        }
        self.get_mut(dir).dir_mut().read_state = state;
        if matches!(state, ReadState::Error | ReadState::PermissionDenied) {
            self.mark_dirty(dir);
        }
    }

    /// A pseudo-dir (dot entry or attic) has no read of its own; it reports
    /// its real parent's state instead. A node with no parent (the tree
    /// root) reports `Finished` rather than looking at itself again.
    pub fn read_state(&self, id: NodeId) -> ReadState {
        let node = self.get(id);
        if node.kind.is_pseudo_dir() {
            match node.parent {
                Some(parent) if parent != id => self.read_state(parent),
                _ => ReadState::Finished,
            }
        } else {
            node.dir().read_state
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file(tree: &mut Tree, name: &str, size: u64, links: u64, mtime: i64) -> NodeId {
        let id = tree.create_file(OsString::from(name));
        tree.get_mut(id).byte_size = size;
        tree.get_mut(id).allocated_size = size;
        tree.get_mut(id).links = links;
        tree.get_mut(id).mtime = mtime;
        id
    }

    #[test]
    fn scenario_s1_basic_totals() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);

        let a = new_file(&mut tree, "a.txt", 10, 1, 100);
        let b = new_file(&mut tree, "b.txt", 20, 1, 100);
        tree.insert_child(root, a);
        tree.insert_child(root, b);

        let s = tree.create_dir_with_dot_entry(OsString::from("s"), NodeKind::Dir);
        tree.insert_child(root, s);
        let c = new_file(&mut tree, "c.txt", 70, 1, 100);
        tree.insert_child(s, c);

        tree.finalize_local(s);
        tree.finalize_local(root);
        tree.mark_dirty(root);
        tree.recalc(root);

        let d = tree.get(root).dir();
        assert_eq!(d.total_size, 100);
        assert_eq!(d.total_items, 4);
        assert_eq!(d.total_files, 3);
        assert_eq!(d.total_subdirs, 1);
    }

    #[test]
    fn scenario_s2_ignore_cascades_to_root() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);

        let a = new_file(&mut tree, "a.txt", 10, 1, 1);
        let b = new_file(&mut tree, "b.txt", 20, 1, 1);
        let c = new_file(&mut tree, "c.txt", 30, 1, 1);
        tree.add_to_attic(root, a);
        tree.add_to_attic(root, b);
        tree.add_to_attic(root, c);

        tree.check_ignored(root);

        assert!(tree.get(root).is_ignored);
        let d = tree.get(root).dir();
        assert_eq!(d.total_unignored_items, 0);
        assert_eq!(d.total_ignored_items, 3);
    }

    #[test]
    fn scenario_s3_hard_link_division() {
        let mut tree = Tree::new();
        let f = new_file(&mut tree, "f", 4096, 4, 1);
        assert_eq!(tree.size(f), 1024);
        tree.ignore_hard_links = true;
        assert_eq!(tree.size(f), 4096);
    }

    #[test]
    fn locate_round_trip() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);
        let s = tree.create_dir_with_dot_entry(OsString::from("s"), NodeKind::Dir);
        tree.insert_child(root, s);

        let found = tree.locate(Path::new("root/s"));
        assert_eq!(found, Some(s));
    }

    #[test]
    fn unlink_missing_child_is_a_noop() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);
        let phantom = tree.create_file(OsString::from("ghost"));
        tree.unlink_child(root, phantom);
    }

    #[test]
    fn pseudo_dir_read_state_delegates_to_parent() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);
        tree.set_read_state(root, ReadState::PermissionDenied);

        let dot = tree.get(root).dir().dot_entry.unwrap();
        assert_eq!(tree.read_state(dot), ReadState::PermissionDenied);

        let attic = tree.attic_or_create(root);
        assert_eq!(tree.read_state(attic), ReadState::PermissionDenied);
    }

    #[test]
    fn root_with_no_parent_reports_finished() {
        let tree = Tree::new();
        assert_eq!(tree.read_state(tree.root), ReadState::Finished);
    }
}
