use std::cmp::Ordering;

use crate::node::{NodeId, SortColumn, SortInfo, SortOrder};
use crate::tree::Tree;

/// Dominance detection constants (§4.3), recovered by name from the
/// original `DirInfo::findDominantChildren()`.
pub const DOMINANCE_FACTOR: f64 = 5.0;
pub const MIN_DOMINANT_PERCENT: f64 = 3.0;
pub const MAX_DOMINANT_PERCENT: f64 = 70.0;

impl Tree {
    /// `sorted_children(column, order)` (§4.3). Returns a cached view when
    /// valid; otherwise rebuilds it (which also drops caches on self and
    /// ancestors, matching "invalidate, then recompute").
    pub fn sorted_children(&mut self, dir: NodeId, column: SortColumn, order: SortOrder) -> &[NodeId] {
        let needs_rebuild = match &self.get(dir).dir().sort_info {
            Some(info) => info.column != column || info.order != order,
            None => true,
        };
        if needs_rebuild {
            self.rebuild_sort_cache(dir, column, order);
        }
        &self.get(dir).dir().sort_info.as_ref().unwrap().sorted_children
    }

    pub fn dominant_row(&self, dir: NodeId) -> Option<u32> {
        self.get(dir).dir().sort_info.as_ref().and_then(|i| i.dominant_row)
    }

    fn rebuild_sort_cache(&mut self, dir: NodeId, column: SortColumn, order: SortOrder) {
        self.mark_dirty(dir);
        self.recalc(dir);

        let mut children: Vec<NodeId> = self.children(dir).collect();
        if let Some(de) = self.get(dir).dir().dot_entry {
            children.push(de);
        }

        // Secondary key: Name ascending, unless we're already sorting by Name.
        if column != SortColumn::Name {
            children.sort_by(|a, b| self.compare_name(*a, *b));
        }
        children.sort_by(|a, b| {
            let primary = self.compare_column(*a, *b, column);
            match order {
                SortOrder::Ascending => primary,
                SortOrder::Descending => primary.reverse(),
            }
        });

        for (i, c) in children.iter().enumerate() {
            self.get_mut(*c).row_number = i as u32;
        }

        let dominant_row = self.compute_dominant_row(dir, &children, column, order);

        if let Some(attic) = self.get(dir).dir().attic {
            self.get_mut(attic).row_number = children.len() as u32;
            children.push(attic);
        }

        self.get_mut(dir).dir_mut().sort_info = Some(SortInfo {
            column,
            order,
            sorted_children: children,
            dominant_row,
        });
    }

    fn compare_name(&self, a: NodeId, b: NodeId) -> Ordering {
        let a_is_dot = self.get(a).kind.is_dot_entry();
        let b_is_dot = self.get(b).kind.is_dot_entry();
        if a_is_dot != b_is_dot {
            // Dot entry always sorts after all real directories on Name (§4.3).
            return if a_is_dot { Ordering::Greater } else { Ordering::Less };
        }
        self.get(a).name.cmp(&self.get(b).name)
    }

    fn compare_column(&self, a: NodeId, b: NodeId, column: SortColumn) -> Ordering {
        match column {
            SortColumn::Name => self.compare_name(a, b),
            SortColumn::Size => self.size_of(a).cmp(&self.size_of(b)),
            SortColumn::AllocatedSize => self.allocated_size_or_dir_total(a).cmp(&self.allocated_size_or_dir_total(b)),
            SortColumn::Items => self.total_items_of(a).cmp(&self.total_items_of(b)),
            SortColumn::Files => self.total_files_of(a).cmp(&self.total_files_of(b)),
            SortColumn::Subdirs => self.total_subdirs_of(a).cmp(&self.total_subdirs_of(b)),
            SortColumn::LatestMTime => self.latest_mtime_of(a).cmp(&self.latest_mtime_of(b)),
            SortColumn::OldestMTime => self.oldest_mtime_of(a).cmp(&self.oldest_mtime_of(b)),
            SortColumn::Permissions => self.get(a).mode.cmp(&self.get(b).mode),
        }
    }

    /// `Size` column value: a directory sorts by its subtree total, not its
    /// own (usually irrelevant) directory-entry size.
    fn size_of(&self, id: NodeId) -> u64 {
        match self.try_get(id) {
            Some(n) if n.kind.is_dir() => n.dir().total_size,
            Some(_) => self.size(id),
            None => 0,
        }
    }

    fn total_items_of(&self, id: NodeId) -> u32 {
        self.try_get(id).map(|n| if n.kind.is_dir() { n.dir().total_items } else { 1 }).unwrap_or(0)
    }
    fn total_files_of(&self, id: NodeId) -> u32 {
        self.try_get(id).map(|n| if n.kind.is_dir() { n.dir().total_files } else { 1 }).unwrap_or(0)
    }
    fn total_subdirs_of(&self, id: NodeId) -> u32 {
        self.try_get(id).map(|n| if n.kind.is_dir() { n.dir().total_subdirs } else { 0 }).unwrap_or(0)
    }
    fn latest_mtime_of(&self, id: NodeId) -> i64 {
        self.try_get(id)
            .map(|n| if n.kind.is_dir() { n.dir().latest_mtime } else { n.mtime })
            .unwrap_or(0)
    }
    fn oldest_mtime_of(&self, id: NodeId) -> i64 {
        self.try_get(id)
            .map(|n| if n.kind.is_dir() { n.dir().oldest_file_mtime } else { n.mtime })
            .unwrap_or(0)
    }

    /// Dominance detection (§4.3): only for a size-like column, descending
    /// order, with at least two items.
    fn compute_dominant_row(
        &self,
        dir: NodeId,
        children: &[NodeId],
        column: SortColumn,
        order: SortOrder,
    ) -> Option<u32> {
        let is_size_like = matches!(column, SortColumn::Size | SortColumn::AllocatedSize);
        if !is_size_like || order != SortOrder::Descending || children.len() < 2 {
            return None;
        }
        let parent_total = self.allocated_size_or_dir_total(dir);
        if parent_total == 0 {
            return None;
        }

        let mut percents: Vec<f64> = children
            .iter()
            .map(|c| self.allocated_size_or_dir_total(*c) as f64 / parent_total as f64 * 100.0)
            .collect();
        percents.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = percents[percents.len() / 2];
        let threshold = (median * DOMINANCE_FACTOR).clamp(MIN_DOMINANT_PERCENT, MAX_DOMINANT_PERCENT);

        // children is already sorted descending by this point.
        for (i, c) in children.iter().enumerate() {
            let pct = self.allocated_size_or_dir_total(*c) as f64 / parent_total as f64 * 100.0;
            if pct < threshold {
                return Some(i as u32);
            }
        }
        None
    }

    fn allocated_size_or_dir_total(&self, id: NodeId) -> u64 {
        match self.try_get(id) {
            Some(n) if n.kind.is_dir() => n.dir().total_allocated_size,
            Some(_) => self.allocated_size(id),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use std::ffi::OsString;

    #[test]
    fn row_numbers_match_sorted_position() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);
        for (name, size) in [("a", 30u64), ("b", 10), ("c", 20)] {
            let f = tree.create_file(OsString::from(name));
            tree.get_mut(f).byte_size = size;
            tree.get_mut(f).allocated_size = size;
            tree.insert_child(root, f);
        }
        let sorted = tree
            .sorted_children(root, SortColumn::Size, SortOrder::Ascending)
            .to_vec();
        for (i, id) in sorted.iter().enumerate() {
            assert_eq!(tree.get(*id).row_number, i as u32);
        }
    }

    #[test]
    fn size_column_sorts_directories_by_subtree_total_not_own_entry_size() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);

        // A big subdirectory whose own directory-entry size is tiny...
        let big_dir = tree.create_dir_with_dot_entry(OsString::from("big"), NodeKind::Dir);
        tree.insert_child(root, big_dir);
        let big_file = tree.create_file(OsString::from("huge.bin"));
        tree.get_mut(big_file).byte_size = 1_000_000;
        tree.get_mut(big_file).allocated_size = 1_000_000;
        tree.insert_child(big_dir, big_file);

        // ...and a small file that outweighs that directory-entry size alone.
        let small_file = tree.create_file(OsString::from("small.txt"));
        tree.get_mut(small_file).byte_size = 100;
        tree.get_mut(small_file).allocated_size = 100;
        tree.insert_child(root, small_file);

        tree.finalize_local(big_dir);
        tree.finalize_local(root);

        let sorted = tree
            .sorted_children(root, SortColumn::Size, SortOrder::Descending)
            .to_vec();
        assert_eq!(sorted[0], big_dir, "the 1MB subtree should sort before the 100-byte file");
    }
}
