use std::ffi::OsString;

/// Index into a [`crate::tree::Tree`]'s arena.
///
/// Replaces the original model's owning pointer + magic-number staleness
/// check: an index into a `Vec` that has not been compacted can never be
/// stale, and a whole subtree is freed by returning its ids to the arena's
/// free list in one pass.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeKind {
    File,
    Dir,
    DotEntry,
    Attic,
    Pkg,
}

impl NodeKind {
    pub fn is_dir(self) -> bool {
        !matches!(self, NodeKind::File)
    }

    pub fn is_pseudo_dir(self) -> bool {
        matches!(self, NodeKind::DotEntry | NodeKind::Attic)
    }

    pub fn is_attic(self) -> bool {
        matches!(self, NodeKind::Attic)
    }

    pub fn is_dot_entry(self) -> bool {
        matches!(self, NodeKind::DotEntry)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReadState {
    Queued,
    Reading,
    Finished,
    OnRequestOnly,
    Aborted,
    PermissionDenied,
    Error,
}

impl ReadState {
    /// Once `Aborted`, later transitions to `Finished` are suppressed
    /// (invariant 6, read-state monotonicity).
    pub fn can_transition_to(self, next: ReadState) -> bool {
        !(self == ReadState::Aborted && next == ReadState::Finished)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SortColumn {
    Name,
    Size,
    AllocatedSize,
    Items,
    Files,
    Subdirs,
    LatestMTime,
    OldestMTime,
    Permissions,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Debug)]
pub struct SortInfo {
    pub column: SortColumn,
    pub order: SortOrder,
    pub sorted_children: Vec<NodeId>,
    pub dominant_row: Option<u32>,
}

/// Directory-only fields, present when [`Node::kind`] is `Dir`, `DotEntry`,
/// `Attic`, or `Pkg`.
#[derive(Debug)]
pub struct DirData {
    pub first_child: Option<NodeId>,
    pub dot_entry: Option<NodeId>,
    pub attic: Option<NodeId>,
    pub read_state: ReadState,
    pub pending_read_jobs: u32,
    pub is_mount_point: bool,
    pub is_excluded: bool,
    pub is_from_cache: bool,
    pub is_locked: bool,

    pub summary_dirty: bool,
    pub total_size: u64,
    pub total_allocated_size: u64,
    pub total_blocks: u64,
    pub total_items: u32,
    pub total_subdirs: u32,
    pub total_files: u32,
    pub total_ignored_items: u32,
    pub total_unignored_items: u32,
    pub direct_children_count: u32,
    pub err_subdir_count: u32,
    pub latest_mtime: i64,
    pub oldest_file_mtime: i64,

    pub sort_info: Option<SortInfo>,

    // PkgInfo extras (supplemental, §10.1 of SPEC_FULL.md)
    pub pkg_version: Option<String>,
    pub pkg_arch: Option<String>,
    pub is_multi_version: bool,
    pub is_multi_arch: bool,
}

impl Default for DirData {
    fn default() -> Self {
        DirData {
            first_child: None,
            dot_entry: None,
            attic: None,
            read_state: ReadState::Queued,
            pending_read_jobs: 0,
            is_mount_point: false,
            is_excluded: false,
            is_from_cache: false,
            is_locked: false,
            summary_dirty: true,
            total_size: 0,
            total_allocated_size: 0,
            total_blocks: 0,
            total_items: 0,
            total_subdirs: 0,
            total_files: 0,
            total_ignored_items: 0,
            total_unignored_items: 0,
            direct_children_count: 0,
            err_subdir_count: 0,
            latest_mtime: 0,
            oldest_file_mtime: 0,
            sort_info: None,
            pkg_version: None,
            pkg_arch: None,
            is_multi_version: false,
            is_multi_arch: false,
        }
    }
}

#[derive(Debug)]
pub struct Node {
    pub name: OsString,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
    pub byte_size: u64,
    pub allocated_size: u64,
    pub blocks: u64,
    pub links: u64,
    /// Device number the entry was stat'd on, used by the scan engine's
    /// mount-crossing policy (a subdir is a mount point iff its device
    /// differs from its parent's). Zero for cache-sourced or synthetic
    /// nodes, which never need the comparison.
    pub dev: u64,
    pub is_sparse: bool,
    pub is_ignored: bool,
    pub parent: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub row_number: u32,
    pub kind: NodeKind,
    pub dir: Option<DirData>,
}

impl Node {
    pub fn new_file(name: OsString) -> Self {
        Node {
            name,
            mode: 0,
            uid: 0,
            gid: 0,
            mtime: 0,
            byte_size: 0,
            allocated_size: 0,
            blocks: 0,
            links: 1,
            dev: 0,
            is_sparse: false,
            is_ignored: false,
            parent: None,
            next_sibling: None,
            row_number: 0,
            kind: NodeKind::File,
            dir: None,
        }
    }

    pub fn new_dir(name: OsString, kind: NodeKind) -> Self {
        debug_assert!(kind.is_dir());
        Node {
            name,
            mode: 0,
            uid: 0,
            gid: 0,
            mtime: 0,
            byte_size: 0,
            allocated_size: 0,
            blocks: 0,
            links: 1,
            dev: 0,
            is_sparse: false,
            is_ignored: false,
            parent: None,
            next_sibling: None,
            row_number: 0,
            kind,
            dir: Some(DirData::default()),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn dir(&self) -> &DirData {
        self.dir.as_ref().expect("non-directory node has no DirData")
    }

    pub fn dir_mut(&mut self) -> &mut DirData {
        self.dir.as_mut().expect("non-directory node has no DirData")
    }

    /// Raw byte size, before hard-link division. Use
    /// [`crate::tree::Tree::size`] for the hard-link-aware accessor called
    /// out in invariant 5.
    pub fn raw_byte_size(&self) -> u64 {
        self.byte_size
    }
}
