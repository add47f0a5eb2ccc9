//! `LocalDirReadJob` (§4.4): probe access, enumerate in inode order, stat
//! each entry, route directories/files/ignored-files, then finalize.

use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use dustat_core::node::{NodeId, NodeKind, ReadState};
use dustat_core::tree::Tree;
use dustat_filter::FilterSet;

use crate::events::ScanEvent;
use crate::job::{Job, JobQueue};
use crate::mount::{self, MountPointTable};
use crate::unix_stat;
use dustat_core::cli::ScanConfig;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// Runs one `LocalDirReadJob` to completion (§4.4's "On each tick the head
/// job runs" — unlike a `CacheReadJob`, a local directory read always
/// finishes within a single tick). Returns the jobs the caller should
/// enqueue next (recursive subdirectory jobs, or a single `CacheReadJob`
/// when this directory's contents were replaced by an on-disk cache file).
pub fn run_local_dir_job(
    tree: &mut Tree,
    dir: NodeId,
    path: &Path,
    filters: &FilterSet,
    mounts: &dyn MountPointTable,
    config: &ScanConfig,
    queue: &mut JobQueue,
    ntfs_warned: &mut bool,
    events: &mut Vec<ScanEvent>,
) -> Vec<Job> {
    tree.set_read_state(dir, ReadState::Reading);

    // Step 1: access probe.
    if !unix_stat::can_access(path) {
        let state = match std::fs::metadata(path) {
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => ReadState::PermissionDenied,
            Err(_) => ReadState::Error,
            Ok(_) => ReadState::PermissionDenied,
        };
        tree.set_read_state(dir, state);
        tree.mark_dirty(dir);
        events.push(ScanEvent::ReadJobFinished(dir));
        return Vec::new();
    }

    let read_dir = match std::fs::read_dir(path) {
        Ok(rd) => rd,
        Err(e) => {
            let state = if e.kind() == std::io::ErrorKind::PermissionDenied {
                ReadState::PermissionDenied
            } else {
                ReadState::Error
            };
            tree.set_read_state(dir, state);
            tree.mark_dirty(dir);
            events.push(ScanEvent::ReadJobFinished(dir));
            return Vec::new();
        }
    };

    // Step 2: inode-ordered multimap.
    let dirfd = File::open(path).ok();
    let mut entries: Vec<(u64, OsString)> = Vec::new();
    for entry in read_dir.flatten() {
        let name = entry.file_name();
        if name == "." || name == ".." {
            continue;
        }
        let ino = dirfd
            .as_ref()
            .and_then(|fd| unix_stat::fstatat(fd, &name).ok())
            .map(|st| st.ino)
            .unwrap_or(0);
        entries.push((ino, name));
    }
    entries.sort_by_key(|(ino, _)| *ino);

    let parent_dev = tree.get(dir).dev;
    let is_ntfs = mounts.find(path).map(|m| m.is_ntfs()).unwrap_or(false);

    let mut new_jobs = Vec::new();
    let mut non_dir_children: Vec<(PathBuf, String)> = Vec::new();

    for (_, name) in &entries {
        let st = match unix_stat::stat_entry(path, dirfd.as_ref(), name) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("could not stat {}: {e}", path.join(name).display());
                continue;
            }
        };
        let child_path = path.join(name);

        if name.as_os_str() == std::ffi::OsStr::new(dustat_cache::CACHE_FILE_NAME) {
            if let Some(job) = try_replace_with_cache(tree, dir, &child_path, queue, events) {
                return vec![job];
            }
            continue;
        }

        if st.mode & S_IFMT == S_IFDIR {
            let child_id = tree.create_dir_with_dot_entry(name.clone(), NodeKind::Dir);
            fill_stat(tree, child_id, &st);

            let is_mount_point = parent_dev != 0 && st.dev != parent_dev;
            tree.insert_child(dir, child_id);

            let basename = name.to_string_lossy().into_owned();
            if filters.is_excluded(&child_path, &basename) {
                // A per-entry exclude rule (not "match any direct child",
                // which is applied after the fact in step 4) keeps the
                // directory in the tree but unread, the same on-request-only
                // state a declined mount-point crossing leaves behind.
                tree.get_mut(child_id).dir_mut().is_excluded = true;
                tree.set_read_state(child_id, ReadState::OnRequestOnly);
            } else if is_mount_point {
                tree.get_mut(child_id).dir_mut().is_mount_point = true;
                let crosses = mounts
                    .find(&child_path)
                    .map(|m| mount::should_cross(&m, config.cross_filesystems))
                    .unwrap_or(false);
                if crosses {
                    new_jobs.push(Job::LocalDir { dir: child_id, path: child_path });
                } else {
                    log::debug!("not crossing mount point at {}", child_path.display());
                    tree.set_read_state(child_id, ReadState::OnRequestOnly);
                }
            } else {
                new_jobs.push(Job::LocalDir { dir: child_id, path: child_path });
            }
        } else {
            let child_id = tree.create_file(name.clone());
            fill_stat(tree, child_id, &st);
            if is_ntfs && st.nlink > 1 {
                if !*ntfs_warned {
                    log::warn!("NTFS reports a bogus hard-link count; treating all files on this volume as link count 1");
                    *ntfs_warned = true;
                }
                tree.get_mut(child_id).links = 1;
            }

            let basename = name.to_string_lossy().into_owned();
            if filters.is_ignored(&child_path, &basename) {
                tree.add_to_attic(dir, child_id);
            } else {
                tree.insert_child(dir, child_id);
            }
            non_dir_children.push((child_path, basename));
        }
    }

    // Step 4: "match any direct non-directory child" exclude rules, applied
    // once the directory has been fully read.
    let excluded = filters.any_direct_child_excluded(non_dir_children.iter().map(|(p, n)| (p.as_path(), n.as_str())));
    if excluded {
        wipe_children(tree, dir, events);
        tree.get_mut(dir).dir_mut().is_excluded = true;
        tree.set_read_state(dir, ReadState::OnRequestOnly);
        events.push(ScanEvent::ReadJobFinished(dir));
        return Vec::new();
    }

    // Step 5: finalize.
    tree.finalize_local(dir);
    tree.check_ignored(dir);
    tree.set_read_state(dir, ReadState::Finished);
    events.push(ScanEvent::ReadJobFinished(dir));
    new_jobs
}

fn fill_stat(tree: &mut Tree, id: NodeId, st: &unix_stat::RawStat) {
    let node = tree.get_mut(id);
    node.mode = st.mode;
    node.uid = st.uid;
    node.gid = st.gid;
    node.mtime = st.mtime;
    node.byte_size = st.size;
    node.allocated_size = st.blocks * 512;
    node.blocks = st.blocks;
    node.links = st.nlink.max(1);
    node.dev = st.dev;
}

/// If `cache_path` is a `.qdirstat.cache.gz` whose first directory record's
/// path matches `dir`'s own path, detach `dir` from the tree, free its
/// (partial) contents, cancel every queued job under it, and return a
/// `CacheReadJob` that will rebuild the same subtree from the cache. `dir`
/// itself is freed; the cache job creates a fresh node for it (§4.4 step 3).
fn try_replace_with_cache(
    tree: &mut Tree,
    dir: NodeId,
    cache_path: &Path,
    queue: &mut JobQueue,
    events: &mut Vec<ScanEvent>,
) -> Option<Job> {
    let dir_url = tree_url(tree, dir);
    let file = File::open(cache_path).ok()?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);
    if !cache_first_record_matches(&mut reader, &dir_url) {
        return None;
    }

    let file = File::open(cache_path).ok()?;
    let decoder = GzDecoder::new(file);
    let reader = BufReader::new(decoder);
    let parent = tree.get(dir).parent?;

    events.push(ScanEvent::ClearingSubtree(dir));
    queue.kill_subtree(tree, dir);
    tree.unlink_child(parent, dir);
    tree.free_subtree(dir);
    events.push(ScanEvent::SubtreeCleared);

    let cache_reader = dustat_cache::CacheReader::new(reader, Some(parent)).ok()?;
    Some(Job::Cache { dir: parent, reader: Box::new(cache_reader) })
}

fn tree_url(tree: &Tree, id: NodeId) -> String {
    let mut parts = Vec::new();
    let mut cur = Some(id);
    while let Some(n) = cur {
        if n == tree.root {
            break;
        }
        parts.push(tree.get(n).name.to_string_lossy().into_owned());
        cur = tree.get(n).parent;
        if cur == Some(tree.root) {
            break;
        }
    }
    parts.reverse();
    parts.join("/")
}

fn cache_first_record_matches(reader: &mut impl std::io::BufRead, dir_url: &str) -> bool {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(Ok(h)) => h,
        _ => return false,
    };
    if !header.trim_start().starts_with('[') {
        return false;
    }
    for line in lines {
        let line = match line {
            Ok(l) => l,
            Err(_) => return false,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let _type = fields.next();
        let path_field = match fields.next() {
            Some(p) => p,
            None => return false,
        };
        let decoded = dustat_cache::url_decode(path_field);
        return decoded == dir_url || decoded.trim_end_matches('/') == dir_url.trim_end_matches('/');
    }
    false
}

fn wipe_children(tree: &mut Tree, dir: NodeId, events: &mut Vec<ScanEvent>) {
    let children: Vec<NodeId> = tree.children(dir).collect();
    for c in children {
        events.push(ScanEvent::DeletingChild(c));
        tree.unlink_child(dir, c);
        tree.free_subtree(c);
    }
    events.push(ScanEvent::ChildrenDeleted);
}
