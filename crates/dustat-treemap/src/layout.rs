//! Tile layout (§4.8): squarified and slice-and-dice tiling, ported from
//! `TreemapTile.cpp`'s `createSquarifiedChildren()` / `layoutRow()` /
//! `createChildrenHorizontal()` / `createChildrenVertical()`. Tile trees are
//! built on the scan plane (the tree is only ever mutably borrowed here,
//! never shared with the render plane) and then handed off read-only to the
//! renderer (§5).

use std::path::PathBuf;

use dustat_core::cli::ScanConfig;
use dustat_core::node::{NodeId, SortColumn, SortOrder};
use dustat_core::tree::Tree;

use crate::cushion::{CushionHeightSequence, CushionSurface};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Rect { x, y, w, h }
    }

    fn area(&self) -> f64 {
        self.w * self.h
    }

    fn shorter_side(&self) -> f64 {
        self.w.min(self.h)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// One laid-out tile: a node, its screen rect, its cushion surface, and (for
/// directories) its laid-out children.
#[derive(Clone, Debug)]
pub struct Tile {
    pub node: NodeId,
    pub path: PathBuf,
    pub rect: Rect,
    pub cushion: CushionSurface,
    pub is_leaf: bool,
    pub children: Vec<Tile>,
}

/// A directory's (or a file's) "weight" for layout purposes: the subtree
/// total for directories, the hard-link-divided size for files (mirrors
/// `dustat_core::sort`'s `size_of`, which the sort cache now uses too).
fn item_total_size(tree: &Tree, id: NodeId) -> u64 {
    let node = tree.get(id);
    if node.kind.is_dir() {
        node.dir().total_allocated_size
    } else {
        tree.allocated_size(id)
    }
}

/// Full path of `id`, rebuilt by walking parents (§4.8 operates purely on
/// tile geometry; the categorizer still needs a path to classify leaves by
/// extension, so we reconstruct it the way the cache writer does for the
/// identical problem, `writer.rs::join_path`).
fn path_of(tree: &Tree, id: NodeId) -> PathBuf {
    let mut components = Vec::new();
    let mut cur = Some(id);
    while let Some(c) = cur {
        if c == tree.root {
            break;
        }
        let node = tree.get(c);
        if !node.kind.is_dot_entry() && !node.kind.is_attic() {
            components.push(node.name.clone());
        }
        cur = node.parent;
    }
    components.reverse();
    let mut path = PathBuf::new();
    for c in components {
        path.push(c);
    }
    path
}

/// Children eligible for tiling (§4.8): real subdirectories plus `dir`'s own
/// dot entry as one virtual child (its loose files are tiled inside it when
/// its own tile is built), excluding the attic and zero-size nodes, ordered
/// by descending allocated size (reusing the sort cache so the largest tile
/// is always laid out first, as `squarify()` requires). A subdirectory's own
/// dot entry is its business, not `dir`'s — it stays nested under that
/// subdirectory's tile, reached when `build_tile` recurses into it.
fn gather_tileable_children(tree: &mut Tree, dir: NodeId) -> Vec<NodeId> {
    let sorted = tree
        .sorted_children(dir, SortColumn::AllocatedSize, SortOrder::Descending)
        .to_vec();
    sorted
        .into_iter()
        .filter(|id| {
            let node = tree.get(*id);
            if node.kind.is_attic() {
                return false;
            }
            item_total_size(tree, *id) > 0
        })
        .collect()
}

/// Entry point: builds the full tile tree for `root` within `available`
/// (§4.8). `root` is usually the scanned toplevel.
pub fn build_treemap(tree: &mut Tree, root: NodeId, available: Rect, config: &ScanConfig) -> Tile {
    build_tile(tree, root, available, CushionSurface::root(), config)
}

fn build_tile(tree: &mut Tree, id: NodeId, rect: Rect, cushion: CushionSurface, config: &ScanConfig) -> Tile {
    let path = path_of(tree, id);
    let is_dir = tree.get(id).kind.is_dir();

    if !is_dir {
        return Tile { node: id, path, rect, cushion, is_leaf: true, children: Vec::new() };
    }

    let children_ids = gather_tileable_children(tree, id);
    let min_tile_area = config.min_tile_size * config.min_tile_size;
    if children_ids.is_empty() || rect.area() < min_tile_area {
        return Tile { node: id, path, rect, cushion, is_leaf: true, children: Vec::new() };
    }

    let sizes: Vec<f64> = children_ids.iter().map(|c| item_total_size(tree, *c) as f64).collect();
    let total: f64 = sizes.iter().sum();
    if total <= 0.0 {
        return Tile { node: id, path, rect, cushion, is_leaf: true, children: Vec::new() };
    }

    let heights = CushionHeightSequence::new(config.cushion_height, config.cushion_height_scale);
    let child_tiles = if config.squarified && rect.shorter_side() >= config.min_squarified_tile_height {
        create_squarified_children(tree, &children_ids, &sizes, total, rect, cushion, &heights, config)
    } else {
        create_sliced_children(tree, &children_ids, &sizes, total, rect, cushion, &heights, config)
    };

    Tile { node: id, path, rect, cushion, is_leaf: false, children: child_tiles }
}

/// `createSquarifiedChildren()` (§4.8): repeatedly peels off the longest
/// prefix of the remaining (size-descending) children whose aspect ratios
/// keep improving, lays that "row" out across the shorter side of the
/// remaining rect, then recurses on what's left.
fn create_squarified_children(
    tree: &mut Tree,
    ids: &[NodeId],
    sizes: &[f64],
    total: f64,
    rect: Rect,
    cushion: CushionSurface,
    heights: &CushionHeightSequence,
    config: &ScanConfig,
) -> Vec<Tile> {
    let mut tiles = Vec::with_capacity(ids.len());
    let mut remaining_rect = rect;
    let mut start = 0usize;

    while start < ids.len() {
        let side = remaining_rect.shorter_side();
        if side <= 0.0 {
            break;
        }
        // area-per-unit-size if the whole remaining set were laid into the
        // current remaining rect (recomputed each row since `total` only
        // covers the original set, not what's left — §4.8 keeps a running
        // remaining-total instead).
        let remaining_total: f64 = sizes[start..].iter().sum();
        if remaining_total <= 0.0 {
            break;
        }
        let scale = remaining_rect.area() / remaining_total;

        let mut end = start + 1;
        let mut best_ratio = worst_aspect_ratio(&sizes[start..end], scale, side);
        loop {
            if end >= ids.len() {
                break;
            }
            let next_ratio = worst_aspect_ratio(&sizes[start..=end], scale, side);
            if next_ratio > best_ratio {
                break;
            }
            best_ratio = next_ratio;
            end += 1;
        }

        let row_ids = &ids[start..end];
        let row_sizes = &sizes[start..end];
        let row_total: f64 = row_sizes.iter().sum();
        let row_extent = (row_total * scale / side).max(0.0);

        let (row_rect, next_rect, orientation) = if remaining_rect.w >= remaining_rect.h {
            // shorter side is height; the row is a vertical strip on the left
            let row_rect = Rect::new(remaining_rect.x, remaining_rect.y, row_extent.min(remaining_rect.w), remaining_rect.h);
            let next_rect = Rect::new(
                remaining_rect.x + row_rect.w,
                remaining_rect.y,
                (remaining_rect.w - row_rect.w).max(0.0),
                remaining_rect.h,
            );
            (row_rect, next_rect, Orientation::Vertical)
        } else {
            let row_rect = Rect::new(remaining_rect.x, remaining_rect.y, remaining_rect.w, row_extent.min(remaining_rect.h));
            let next_rect = Rect::new(
                remaining_rect.x,
                remaining_rect.y + row_rect.h,
                remaining_rect.w,
                (remaining_rect.h - row_rect.h).max(0.0),
            );
            (row_rect, next_rect, Orientation::Horizontal)
        };

        let mut row_cushion = cushion;
        match orientation {
            Orientation::Vertical => row_cushion.add_horizontal_ridge(heights, row_rect.x, row_rect.x + row_rect.w),
            Orientation::Horizontal => row_cushion.add_vertical_ridge(heights, row_rect.y, row_rect.y + row_rect.h),
        }

        layout_row(tree, row_ids, row_sizes, row_total, row_rect, orientation, row_cushion, heights, config, &mut tiles);

        remaining_rect = next_rect;
        start = end;
    }
    let _ = total;
    tiles
}

/// Worst (furthest-from-1) aspect ratio across a candidate row, computed
/// without division the way the original avoids it: for each item,
/// `max(side^2 * itemArea / rowArea^2, rowArea^2 / (side^2 * itemArea))`.
fn worst_aspect_ratio(row_sizes: &[f64], scale: f64, side: f64) -> f64 {
    let row_area: f64 = row_sizes.iter().map(|s| s * scale).sum();
    if row_area <= 0.0 {
        return f64::INFINITY;
    }
    let side2 = side * side;
    let row_area2 = row_area * row_area;
    row_sizes
        .iter()
        .map(|s| {
            let item_area = s * scale;
            if item_area <= 0.0 {
                return f64::INFINITY;
            }
            let a = side2 * item_area / row_area2;
            let b = row_area2 / (side2 * item_area);
            a.max(b)
        })
        .fold(0.0_f64, f64::max)
}

/// `layoutRow()` (§4.8): subdivides one row's rect among its items
/// proportional to size, forcing the last tile to consume whatever
/// remains (cumulative-rounding, so slivers don't accumulate). Tiles
/// smaller than `min_tile_size` on either axis are dropped, matching the
/// original's "tiles that would be invisible aren't created".
fn layout_row(
    tree: &mut Tree,
    ids: &[NodeId],
    sizes: &[f64],
    row_total: f64,
    row_rect: Rect,
    orientation: Orientation,
    cushion: CushionSurface,
    heights: &CushionHeightSequence,
    config: &ScanConfig,
    out: &mut Vec<Tile>,
) {
    let mut offset = 0.0;
    let n = ids.len();
    for (i, (&id, &size)) in ids.iter().zip(sizes.iter()).enumerate() {
        let is_last = i + 1 == n;
        let extent = match orientation {
            Orientation::Vertical => row_rect.h,
            Orientation::Horizontal => row_rect.w,
        };
        let this_extent = if is_last {
            extent - offset
        } else {
            (size / row_total * extent).max(0.0)
        };

        let tile_rect = match orientation {
            Orientation::Vertical => Rect::new(row_rect.x, row_rect.y + offset, row_rect.w, this_extent.max(0.0)),
            Orientation::Horizontal => Rect::new(row_rect.x + offset, row_rect.y, this_extent.max(0.0), row_rect.h),
        };
        offset += this_extent;

        if tile_rect.w < config.min_tile_size || tile_rect.h < config.min_tile_size {
            continue;
        }

        let mut child_cushion = cushion;
        match orientation {
            Orientation::Vertical => child_cushion.add_vertical_ridge(heights, tile_rect.y, tile_rect.y + tile_rect.h),
            Orientation::Horizontal => child_cushion.add_horizontal_ridge(heights, tile_rect.x, tile_rect.x + tile_rect.w),
        }
        child_cushion = child_cushion.child();

        out.push(build_tile(tree, id, tile_rect, child_cushion, config));
    }
}

/// `createChildrenHorizontal()` / `createChildrenVertical()` (§4.8): simple
/// alternating-axis tiling used below the squarified-layout size threshold,
/// or when squarified layout is disabled.
fn create_sliced_children(
    tree: &mut Tree,
    ids: &[NodeId],
    sizes: &[f64],
    total: f64,
    rect: Rect,
    cushion: CushionSurface,
    heights: &CushionHeightSequence,
    config: &ScanConfig,
) -> Vec<Tile> {
    let orientation = if rect.w >= rect.h { Orientation::Vertical } else { Orientation::Horizontal };
    let mut tiles = Vec::with_capacity(ids.len());
    layout_row(tree, ids, sizes, total, rect, orientation, cushion, heights, config, &mut tiles);
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use dustat_core::node::NodeKind;
    use std::ffi::OsString;

    fn make_dir_with_files(sizes: &[u64]) -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);
        for (i, &size) in sizes.iter().enumerate() {
            let f = tree.create_file(OsString::from(format!("f{i}")));
            tree.get_mut(f).byte_size = size;
            tree.get_mut(f).allocated_size = size;
            tree.insert_child(root, f);
        }
        tree.finalize_local(root);
        (tree, root)
    }

    #[test]
    fn squarified_layout_covers_the_full_rect_with_disjoint_tiles() {
        let (mut tree, root) = make_dir_with_files(&[500, 300, 100, 50, 50]);
        let config = ScanConfig::default();
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);
        let tile = build_treemap(&mut tree, root, rect, &config);

        assert!(!tile.is_leaf);
        let total_area: f64 = tile.children.iter().map(|c| c.rect.area()).sum();
        assert!((total_area - rect.area()).abs() < rect.area() * 0.05, "tiles should roughly cover the parent rect");

        for a in &tile.children {
            for b in &tile.children {
                if a.node == b.node {
                    continue;
                }
                let overlap_x = (a.rect.x.max(b.rect.x)) < (a.rect.x + a.rect.w).min(b.rect.x + b.rect.w);
                let overlap_y = (a.rect.y.max(b.rect.y)) < (a.rect.y + a.rect.h).min(b.rect.y + b.rect.h);
                assert!(!(overlap_x && overlap_y), "sibling tiles must not overlap");
            }
        }
    }

    #[test]
    fn tiny_tiles_below_min_size_are_dropped() {
        let (mut tree, root) = make_dir_with_files(&[1_000_000, 1]);
        let mut config = ScanConfig::default();
        config.min_tile_size = 5.0;
        let rect = Rect::new(0.0, 0.0, 100.0, 10.0);
        let tile = build_treemap(&mut tree, root, rect, &config);
        assert!(tile.children.len() <= 2);
    }

    #[test]
    fn sliced_layout_alternates_by_rect_shape() {
        let (mut tree, root) = make_dir_with_files(&[10, 20, 30]);
        let mut config = ScanConfig::default();
        config.squarified = false;
        let rect = Rect::new(0.0, 0.0, 200.0, 50.0);
        let tile = build_treemap(&mut tree, root, rect, &config);
        assert_eq!(tile.children.len(), 3);
        // Wide rect -> vertical strips -> children tile left to right.
        let xs: Vec<f64> = tile.children.iter().map(|c| c.rect.x).collect();
        let mut sorted_xs = xs.clone();
        sorted_xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(xs, sorted_xs);
    }

    #[test]
    fn mixed_directory_tiles_loose_files_via_its_own_dot_entry_only() {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);

        let loose = tree.create_file(OsString::from("loose.txt"));
        tree.get_mut(loose).byte_size = 200;
        tree.get_mut(loose).allocated_size = 200;
        tree.insert_child(root, loose);

        let sub = tree.create_dir_with_dot_entry(OsString::from("sub"), NodeKind::Dir);
        tree.insert_child(root, sub);
        let subsub = tree.create_dir_with_dot_entry(OsString::from("subsub"), NodeKind::Dir);
        tree.insert_child(sub, subsub);
        let x = tree.create_file(OsString::from("x.txt"));
        tree.get_mut(x).byte_size = 40;
        tree.get_mut(x).allocated_size = 40;
        tree.insert_child(subsub, x);
        let g = tree.create_file(OsString::from("g.txt"));
        tree.get_mut(g).byte_size = 100;
        tree.get_mut(g).allocated_size = 100;
        tree.insert_child(sub, g);

        tree.finalize_local(subsub);
        tree.finalize_local(sub);
        tree.finalize_local(root);

        let config = ScanConfig::default();
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);
        let tile = build_treemap(&mut tree, root, rect, &config);

        // root's own loose file and "sub" are the only two top-level tiles;
        // "sub"'s dot entry must not be hoisted up as a third sibling here.
        assert!(!tile.is_leaf);
        assert_eq!(tile.children.len(), 2);

        let total_area: f64 = tile.children.iter().map(|c| c.rect.area()).sum();
        assert!((total_area - rect.area()).abs() < rect.area() * 0.05, "tiles should cover the parent rect");

        let sub_tile = tile.children.iter().find(|c| c.path.ends_with("sub")).expect("sub tile present");
        assert!(!sub_tile.is_leaf);
        // "subsub" plus sub's own dot entry (holding g.txt), nested inside sub.
        assert_eq!(sub_tile.children.len(), 2);
    }

    #[test]
    fn empty_directory_becomes_a_leaf_tile() {
        let (mut tree, root) = make_dir_with_files(&[]);
        let config = ScanConfig::default();
        let rect = Rect::new(0.0, 0.0, 50.0, 50.0);
        let tile = build_treemap(&mut tree, root, rect, &config);
        assert!(tile.is_leaf);
        assert!(tile.children.is_empty());
    }
}
