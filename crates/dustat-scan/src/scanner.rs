//! The scan plane (§5): a `Scanner` owns the `Tree` and the job queue and
//! is driven by repeated `tick()` calls from the caller's event loop. There
//! is no GUI event loop to piggyback on here, so the CLI drives it in a
//! tight loop instead (§5's concurrency model, restated for a CLI host).

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use dustat_core::cli::ScanConfig;
use dustat_core::error::DustatResult;
use dustat_core::fileset::FileInfoSet;
use dustat_core::node::{NodeId, NodeKind, ReadState};
use dustat_core::tree::Tree;
use dustat_filter::FilterSet;

use crate::events::ScanEvent;
use crate::job::{CacheFileReader, Job, JobQueue};
use crate::local::run_local_dir_job;
use crate::mount::MountPointTable;

const CACHE_STEP_LINES: u64 = dustat_cache::CACHE_READ_YIELD_LINES;

pub struct Scanner {
    pub tree: Tree,
    pub filters: FilterSet,
    pub config: ScanConfig,
    mounts: Box<dyn MountPointTable>,
    queue: JobQueue,
    ntfs_warned: bool,
    finished: bool,
    toplevel: Option<NodeId>,
    events: VecDeque<ScanEvent>,
}

impl Scanner {
    pub fn new(config: ScanConfig, filters: FilterSet, mounts: Box<dyn MountPointTable>) -> Self {
        let mut tree = Tree::new();
        tree.ignore_hard_links = config.ignore_hard_links;
        Scanner {
            tree,
            filters,
            config,
            mounts,
            queue: JobQueue::new(),
            ntfs_warned: false,
            finished: true,
            toplevel: None,
            events: VecDeque::new(),
        }
    }

    /// Drains queued [`ScanEvent`]s in emission order (§6.5). Callers that
    /// do not care about the event stream (the CLI today) may simply never
    /// call this; events are not required to keep the scan itself correct.
    pub fn drain_events(&mut self) -> Vec<ScanEvent> {
        self.events.drain(..).collect()
    }

    /// Enqueues the root `LocalDirReadJob` for `path` and returns the new
    /// toplevel's id. `tick()` must be called repeatedly afterwards until
    /// [`Scanner::is_finished`] is true.
    pub fn start(&mut self, path: &Path) -> DustatResult<NodeId> {
        let abs = std::fs::canonicalize(path)?;
        let name = OsString::from(abs.to_string_lossy().into_owned());
        let dir = self.tree.create_dir_with_dot_entry(name, NodeKind::Dir);
        self.tree.insert_child(self.tree.root, dir);
        self.queue.push(Job::LocalDir { dir, path: abs });
        self.finished = false;
        self.toplevel = Some(dir);
        self.events.push_back(ScanEvent::StartingReading);
        Ok(dir)
    }

    /// Seeds the engine directly from an on-disk cache file instead of a
    /// live scan (the CLI's `--read-cache` path, §6.1).
    pub fn start_from_cache(&mut self, cache_path: &Path) -> DustatResult<()> {
        let file = std::fs::File::open(cache_path)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let reader = std::io::BufReader::new(decoder);
        let cache_reader: CacheFileReader = dustat_cache::CacheReader::new(reader, None)?;
        self.queue.push(Job::Cache { dir: self.tree.root, reader: Box::new(cache_reader) });
        self.finished = false;
        self.events.push_back(ScanEvent::StartingReading);
        Ok(())
    }

    pub fn toplevel(&self) -> Option<NodeId> {
        self.toplevel
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Runs one step of the head job. A `LocalDirReadJob` always finishes
    /// within the tick it starts; a `CacheReadJob` processes up to
    /// [`CACHE_STEP_LINES`] lines and is requeued if more remain (§4.4).
    /// Returns `true` once the queue (and therefore the whole scan) is
    /// finished.
    pub fn tick(&mut self) -> DustatResult<bool> {
        if self.finished {
            return Ok(true);
        }
        let job = match self.queue.pop() {
            Some(j) => j,
            None => {
                self.finished = true;
                return Ok(true);
            }
        };

        match job {
            Job::LocalDir { dir, path } => {
                let mut job_events = Vec::new();
                let new_jobs = run_local_dir_job(
                    &mut self.tree,
                    dir,
                    &path,
                    &self.filters,
                    self.mounts.as_ref(),
                    &self.config,
                    &mut self.queue,
                    &mut self.ntfs_warned,
                    &mut job_events,
                );
                self.events.extend(job_events);
                for j in new_jobs {
                    self.queue.push(j);
                }
            }
            Job::Cache { dir, mut reader } => {
                let done = reader.step(&mut self.tree, CACHE_STEP_LINES)?;
                if done {
                    if let Some(new_top) = reader.toplevel() {
                        if dir == self.tree.root {
                            self.toplevel = Some(new_top);
                        }
                    }
                    self.events.push_back(ScanEvent::ReadJobFinished(dir));
                } else {
                    self.queue.push_front(Job::Cache { dir, reader });
                }
            }
        }

        if self.queue.is_empty() {
            self.finished = true;
            self.events.push_back(ScanEvent::Finished);
        }
        Ok(self.finished)
    }

    /// Drains the queue, marking every dir still waiting on a job as
    /// `Aborted` (§4.4's "Abort clears both lists and marks every dir in
    /// them as aborted").
    pub fn abort(&mut self) {
        self.queue.abort(&mut self.tree);
        self.finished = true;
        self.events.push_back(ScanEvent::Aborted);
    }

    /// Refresh semantics (§4.4): normalize `selection` (drop stale ids and
    /// descendants of an already-included ancestor), then for each
    /// surviving node re-stat its path; if the path is gone, walk up to the
    /// nearest surviving ancestor and refresh there instead. Refreshing a
    /// node whose parent is the tree's invisible root triggers a full
    /// rescan from the visible toplevel; otherwise the subtree is deleted
    /// and a fresh `LocalDirReadJob` is enqueued for its path.
    pub fn refresh(&mut self, selection: &FileInfoSet) -> DustatResult<()> {
        let normalized = selection.invalid_removed(&self.tree).normalized(&self.tree);
        for &id in normalized.iter() {
            self.refresh_one(id)?;
        }
        Ok(())
    }

    fn refresh_one(&mut self, mut id: NodeId) -> DustatResult<()> {
        loop {
            if self.tree.try_get(id).is_none() {
                return Ok(());
            }
            let path = node_path(&self.tree, id);
            if path.as_ref().map(|p| p.exists()).unwrap_or(false) {
                break;
            }
            match self.tree.get(id).parent {
                Some(parent) if parent != self.tree.root => id = parent,
                _ => return Ok(()),
            }
        }

        let parent = match self.tree.get(id).parent {
            Some(p) => p,
            None => return Ok(()),
        };

        if parent == self.tree.root {
            let path = node_path(&self.tree, id).expect("existence checked above");
            self.events.push_back(ScanEvent::Clearing);
            self.tree.unlink_child(parent, id);
            self.tree.free_subtree(id);
            self.events.push_back(ScanEvent::Cleared);
            self.start(&path)?;
            return Ok(());
        }

        let path = node_path(&self.tree, id).expect("existence checked above");
        self.events.push_back(ScanEvent::ClearingSubtree(id));
        self.queue.kill_subtree(&self.tree, id);
        self.tree.unlink_child(parent, id);
        self.tree.free_subtree(id);
        self.events.push_back(ScanEvent::SubtreeCleared);

        let name = path.file_name().map(OsString::from).unwrap_or_else(|| path.clone().into_os_string());
        let new_dir = self.tree.create_dir_with_dot_entry(name, NodeKind::Dir);
        self.tree.insert_child(parent, new_dir);
        self.queue.push(Job::LocalDir { dir: new_dir, path });
        self.finished = false;
        self.events.push_back(ScanEvent::StartingReading);
        Ok(())
    }

    pub fn pending_jobs(&self) -> bool {
        !self.queue.is_empty()
    }
}

/// Writes the current tree to a `.qdirstat.cache.gz` file at `out_path`,
/// rooted at `start` (§6.1).
pub fn write_cache(tree: &Tree, start: NodeId, start_path: &Path, out_path: &PathBuf) -> DustatResult<()> {
    dustat_cache::write_cache_file(tree, start, start_path, out_path)?;
    Ok(())
}

/// Reconstructs `id`'s on-disk path by walking up to its toplevel (whose
/// `name` is the absolute path, §3.1) and joining real-directory/file name
/// components, skipping pseudo-dirs (dot entry, attic) which do not
/// contribute a path segment of their own.
fn node_path(tree: &Tree, id: NodeId) -> Option<PathBuf> {
    let mut components = Vec::new();
    let mut cur = id;
    loop {
        let node = tree.try_get(cur)?;
        let parent = node.parent?;
        if parent == tree.root {
            let mut path = PathBuf::from(&node.name);
            for comp in components.iter().rev() {
                path.push(comp);
            }
            return Some(path);
        }
        if !node.kind.is_pseudo_dir() {
            components.push(node.name.clone());
        }
        cur = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::ProcMountsTable;
    use dustat_filter::{ExcludeKind, ExcludeRule};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn excluded_directory_is_left_unread_but_present() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("keep")).unwrap();
        fs::write(dir.path().join("keep/a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), b"ref: refs/heads/main").unwrap();

        let mut filters = FilterSet::new();
        filters.exclude_rules.push(ExcludeRule::new(ExcludeKind::Fixed, ".git", true, false, false).unwrap());

        let mut scanner = Scanner::new(ScanConfig::default(), filters, Box::new(ProcMountsTable::new()));
        let top = scanner.start(dir.path()).unwrap();
        while !scanner.tick().unwrap() {}

        scanner.tree.mark_dirty(top);
        scanner.tree.recalc(top);

        let git_dir = scanner.tree.children(top).find(|&c| scanner.tree.get(c).name == ".git").unwrap();
        assert!(scanner.tree.get(git_dir).dir().is_excluded);
        assert_eq!(scanner.tree.read_state(git_dir), ReadState::OnRequestOnly);
        assert_eq!(scanner.tree.get(git_dir).dir().direct_children_count, 1, "dot entry only, HEAD never read");

        assert_eq!(scanner.tree.get(top).dir().total_files, 1, "only keep/a.txt should be counted");
    }

    #[test]
    fn scans_a_small_directory_tree_to_completion() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"world!!").unwrap();

        let mut scanner = Scanner::new(ScanConfig::default(), FilterSet::new(), Box::new(ProcMountsTable::new()));
        let top = scanner.start(dir.path()).unwrap();

        let mut guard = 0;
        while !scanner.tick().unwrap() {
            guard += 1;
            assert!(guard < 10_000, "scan never finished");
        }

        scanner.tree.mark_dirty(top);
        scanner.tree.recalc(top);
        let d = scanner.tree.get(top).dir();
        assert_eq!(d.total_files, 2);
        assert_eq!(d.total_subdirs, 1);
        assert_eq!(d.total_size, 12);
    }

    #[test]
    fn abort_marks_pending_jobs_aborted() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mut scanner = Scanner::new(ScanConfig::default(), FilterSet::new(), Box::new(ProcMountsTable::new()));
        let top = scanner.start(dir.path()).unwrap();
        scanner.tick().unwrap();
        scanner.abort();
        assert!(scanner.is_finished());
        let _ = top;
    }

    #[test]
    fn abort_emits_an_aborted_event() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mut scanner = Scanner::new(ScanConfig::default(), FilterSet::new(), Box::new(ProcMountsTable::new()));
        scanner.start(dir.path()).unwrap();
        scanner.tick().unwrap();
        scanner.abort();
        assert!(scanner.drain_events().contains(&ScanEvent::Aborted));
    }

    #[test]
    fn a_completed_scan_emits_starting_reading_and_finished() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let mut scanner = Scanner::new(ScanConfig::default(), FilterSet::new(), Box::new(ProcMountsTable::new()));
        scanner.start(dir.path()).unwrap();
        while !scanner.tick().unwrap() {}
        let events = scanner.drain_events();
        assert_eq!(events.first(), Some(&ScanEvent::StartingReading));
        assert_eq!(events.last(), Some(&ScanEvent::Finished));
        assert!(events.iter().any(|e| matches!(e, ScanEvent::ReadJobFinished(_))));
    }

    #[test]
    fn refresh_rereads_a_changed_subtree() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.txt"), b"hello").unwrap();

        let mut scanner = Scanner::new(ScanConfig::default(), FilterSet::new(), Box::new(ProcMountsTable::new()));
        let top = scanner.start(dir.path()).unwrap();
        while !scanner.tick().unwrap() {}
        scanner.tree.mark_dirty(top);
        scanner.tree.recalc(top);
        assert_eq!(scanner.tree.get(top).dir().total_files, 1);

        fs::write(dir.path().join("sub/b.txt"), b"world!!").unwrap();
        let sub = scanner.tree.children(top).find(|&c| scanner.tree.get(c).name == "sub").unwrap();
        scanner.refresh(&FileInfoSet::new(vec![sub])).unwrap();
        while !scanner.tick().unwrap() {}

        scanner.tree.mark_dirty(top);
        scanner.tree.recalc(top);
        assert_eq!(scanner.tree.get(top).dir().total_files, 2);
    }

    #[test]
    fn refresh_of_toplevel_triggers_a_full_rescan() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();

        let mut scanner = Scanner::new(ScanConfig::default(), FilterSet::new(), Box::new(ProcMountsTable::new()));
        let top = scanner.start(dir.path()).unwrap();
        while !scanner.tick().unwrap() {}

        fs::write(dir.path().join("b.txt"), b"more").unwrap();
        scanner.refresh(&FileInfoSet::new(vec![top])).unwrap();
        while !scanner.tick().unwrap() {}

        let new_top = scanner.toplevel().unwrap();
        scanner.tree.mark_dirty(new_top);
        scanner.tree.recalc(new_top);
        assert_eq!(scanner.tree.get(new_top).dir().total_files, 2);
    }
}
