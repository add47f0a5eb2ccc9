use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use flate2::read::GzDecoder;
use regex::Regex;

use dustat_core::error::{DustatError, DustatResult};
use dustat_core::node::{NodeId, NodeKind, ReadState};
use dustat_core::tree::Tree;

use crate::codec::{parse_mtime, parse_size, url_decode};
use crate::constants::{MAX_ERROR_COUNT, MAX_FIELDS, MAX_LINE_LEN};

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;
const S_IFBLK: u32 = 0o060000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;
const S_IFSOCK: u32 = 0o140000;

/// Cache reads yield to the scheduler roughly this often (§4.4's "yields
/// every ~1000 input lines"), so a very large cache file does not stall the
/// tick loop.
pub const CACHE_READ_YIELD_LINES: u64 = 1000;

fn header_regex() -> Regex {
    Regex::new(r"^\[(qdirstat|kdirstat) [^ ]+ cache file\]$").unwrap()
}

fn multi_slash_regex() -> Regex {
    Regex::new(r"/{2,}").unwrap()
}

/// Splits an absolute or leaf path into (dirname, basename), matching
/// `splitPath` in the original reader.
fn split_path(full_path: &str) -> (String, String) {
    let absolute = full_path.starts_with('/');
    let parts: Vec<&str> = full_path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return (String::new(), if absolute { "/".to_string() } else { String::new() });
    }
    let name = parts[parts.len() - 1].to_string();
    let mut dirname = parts[..parts.len() - 1].join("/");
    if absolute {
        dirname = format!("/{dirname}");
    }
    (dirname, name)
}

/// Reads a gzip cache file into `tree`, rooted under `parent` (or, if
/// `parent` is `None`, creating a new toplevel as a child of `tree.root`).
/// Returns the id of the first directory created (§4.7, §8 scenario S5/S6).
pub fn read_cache_file(path: &Path, tree: &mut Tree, parent: Option<NodeId>) -> DustatResult<NodeId> {
    let file = std::fs::File::open(path)?;
    let decoder = GzDecoder::new(file);
    let reader = BufReader::new(decoder);
    read_cache(reader, tree, parent)
}

pub fn read_cache(reader: impl BufRead, tree: &mut Tree, starting_parent: Option<NodeId>) -> DustatResult<NodeId> {
    let mut job = CacheReader::new(reader, starting_parent)?;
    while !job.step(tree, u64::MAX)? {}
    job.toplevel().ok_or_else(|| DustatError::CacheParse { line: job.line_no, message: "no entries read".into() })
}

/// Incremental, resumable cache reader: a single `step()` call consumes up
/// to a line budget and returns whether the stream is exhausted, so a
/// scan-engine job can interleave cache reads with its tick loop instead of
/// blocking it for the whole file (§4.4's `CacheReadJob`).
pub struct CacheReader<R: BufRead> {
    lines: Lines<R>,
    header_re: Regex,
    slash_re: Regex,
    starting_parent: Option<NodeId>,
    latest_dir: Option<NodeId>,
    toplevel: Option<NodeId>,
    created_dirs: Vec<NodeId>,
    error_count: u64,
    line_no: u64,
    header_checked: bool,
    finished: bool,
}

impl<R: BufRead> CacheReader<R> {
    pub fn new(reader: R, starting_parent: Option<NodeId>) -> DustatResult<Self> {
        let mut lines = reader.lines();
        let header = lines
            .next()
            .ok_or_else(|| DustatError::CacheParse { line: 0, message: "empty cache file".into() })??;
        let header_re = header_regex();
        if !header_re.is_match(header.trim()) {
            return Err(DustatError::CacheParse { line: 1, message: format!("bad header: {header}") });
        }
        Ok(CacheReader {
            lines,
            header_re,
            slash_re: multi_slash_regex(),
            starting_parent,
            latest_dir: None,
            toplevel: None,
            created_dirs: Vec::new(),
            error_count: 0,
            line_no: 1,
            header_checked: true,
            finished: false,
        })
    }

    pub fn toplevel(&self) -> Option<NodeId> {
        self.toplevel
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Processes at most `max_lines` input lines against `tree`. Returns
    /// `Ok(true)` once the stream is exhausted (having already run
    /// end-of-stream finalization), `Ok(false)` if more `step()` calls are
    /// needed.
    pub fn step(&mut self, tree: &mut Tree, max_lines: u64) -> DustatResult<bool> {
        debug_assert!(self.header_checked);
        if self.finished {
            return Ok(true);
        }

        let mut consumed = 0u64;
        while consumed < max_lines {
            let line = match self.lines.next() {
                Some(l) => l?,
                None => {
                    self.finalize(tree)?;
                    return Ok(true);
                }
            };
            self.line_no += 1;
            consumed += 1;

            let trimmed = line.trim_end();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if trimmed.len() > MAX_LINE_LEN {
                self.record_error(format!("line exceeds {MAX_LINE_LEN} bytes, skipping"))?;
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().take(MAX_FIELDS).collect();
            if fields.len() < 4 {
                self.record_error(format!("expected at least 4 fields, saw {}", fields.len()))?;
                continue;
            }

            if let Err(msg) = process_line(
                &fields,
                tree,
                &self.slash_re,
                self.starting_parent,
                &mut self.latest_dir,
                &mut self.toplevel,
                &mut self.created_dirs,
            ) {
                self.record_error(msg)?;
            }
        }
        Ok(false)
    }

    fn record_error(&mut self, msg: String) -> DustatResult<()> {
        self.error_count += 1;
        log::error!("cache line {}: {}", self.line_no, msg);
        if self.error_count > MAX_ERROR_COUNT {
            return Err(DustatError::CacheAborted);
        }
        Ok(())
    }

    /// End-of-stream finalization: finalize each created DirInfo, deepest
    /// first, then mark non-error directories finished (§4.7).
    fn finalize(&mut self, tree: &mut Tree) -> DustatResult<()> {
        for dir in self.created_dirs.drain(..).rev() {
            tree.finalize_local(dir);
            tree.check_ignored(dir);
            if matches!(tree.read_state(dir), ReadState::Reading | ReadState::Queued) {
                tree.set_read_state(dir, ReadState::Finished);
            }
        }
        self.finished = true;
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn process_line(
    fields: &[&str],
    tree: &mut Tree,
    slash_re: &Regex,
    starting_parent: Option<NodeId>,
    latest_dir: &mut Option<NodeId>,
    toplevel: &mut Option<NodeId>,
    created_dirs: &mut Vec<NodeId>,
) -> Result<(), String> {
    let type_str = fields[0];
    let raw_path = fields[1];

    // Old format (no uid/gid/mode): detected by a `0x`-prefixed field
    // where uid would otherwise be (§4.7).
    let has_uid_gid_mode = !(fields.len() > 3 && fields[3].starts_with("0x"));

    let (uid, gid, mode_str, mtime_str, alloc_idx);
    if has_uid_gid_mode {
        if fields.len() < 8 {
            return Err("too few fields for current cache format".into());
        }
        uid = fields[3].parse::<u32>().unwrap_or(0);
        gid = fields[4].parse::<u32>().unwrap_or(0);
        mode_str = Some(fields[5]);
        mtime_str = fields[6];
        alloc_idx = 7;
    } else {
        if fields.len() < 5 {
            return Err("too few fields for legacy cache format".into());
        }
        uid = 0;
        gid = 0;
        mode_str = None;
        mtime_str = fields[3];
        alloc_idx = 4;
    }

    let size = parse_size(fields[2]).ok_or("unparseable size field")?;
    let mtime = parse_mtime(mtime_str).ok_or("unparseable mtime field")?;
    let alloc = fields.get(alloc_idx).and_then(|f| parse_size(f)).unwrap_or(size);

    let mode = match mode_str {
        Some(m) => u32::from_str_radix(m, 8).map_err(|_| "unparseable mode field")?,
        None => mode_from_type_letter(type_str),
    };

    let mut unread: Option<char> = None;
    let mut blocks_field: Option<u64> = None;
    let mut links_field: Option<u64> = None;
    let mut i = alloc_idx + 1;
    if fields.get(i) == Some(&"|") {
        i += 1;
    }
    while i + 1 < fields.len() {
        let key = fields[i];
        let val = fields[i + 1];
        match key.trim_end_matches(':').to_ascii_lowercase().as_str() {
            "unread" => unread = val.chars().next().map(|c| c.to_ascii_lowercase()),
            "blocks" => blocks_field = val.parse::<u64>().ok(),
            "links" => links_field = val.parse::<u64>().ok(),
            _ => {}
        }
        i += 2;
    }

    let is_sparse = blocks_field.is_some();
    let blocks = blocks_field.unwrap_or_else(|| alloc.div_ceil(512));
    let links = links_field.unwrap_or(1);

    if raw_path.starts_with('/') {
        *latest_dir = None;
    }

    let decoded = url_decode(raw_path);
    let collapsed = slash_re.replace_all(&decoded, "/").into_owned();
    let (dirname, basename) = split_path(&collapsed);

    // Parent resolution (§4.7): the latest directory, else the trivial
    // empty-tree case, else a locate() of the dirname against either the
    // reader's starting point (mid-scan auto-discovery) or the whole tree.
    let mut parent = *latest_dir;
    if parent.is_none() && tree.children(tree.root).next().is_none() {
        parent = Some(tree.root);
    }
    if parent.is_none() {
        if let Some(start) = starting_parent {
            parent = tree.locate(Path::new(&dirname)).or(Some(start));
        } else {
            parent = tree.locate(Path::new(&dirname));
        }
    }
    let parent = parent.ok_or_else(|| format!("could not locate parent \"{dirname}\" for \"{basename}\""))?;

    if mode & S_IFMT == S_IFDIR {
        let name = if parent == tree.root { collapsed.clone() } else { basename.clone() };
        let id = tree.create_dir_with_dot_entry(std::ffi::OsString::from(name), NodeKind::Dir);
        {
            let node = tree.get_mut(id);
            node.mode = mode;
            node.uid = uid;
            node.gid = gid;
            node.mtime = mtime;
            node.byte_size = size;
            node.allocated_size = alloc;
        }
        tree.get_mut(id).dir_mut().is_from_cache = true;
        tree.insert_child(parent, id);

        *latest_dir = Some(id);
        if toplevel.is_none() {
            *toplevel = Some(id);
        }
        created_dirs.push(id);

        if let Some(code) = unread {
            match code {
                'e' => {
                    tree.get_mut(id).dir_mut().is_excluded = true;
                    tree.set_read_state(id, ReadState::OnRequestOnly);
                }
                'p' => tree.set_read_state(id, ReadState::PermissionDenied),
                'm' => {
                    tree.get_mut(id).dir_mut().is_mount_point = true;
                    tree.set_read_state(id, ReadState::OnRequestOnly);
                }
                _ => {}
            }
        }
    } else {
        let id = tree.create_file(std::ffi::OsString::from(basename));
        {
            let node = tree.get_mut(id);
            node.mode = mode;
            node.uid = uid;
            node.gid = gid;
            node.mtime = mtime;
            node.byte_size = size;
            node.allocated_size = alloc;
            node.blocks = blocks;
            node.links = links;
            node.is_sparse = is_sparse;
        }
        tree.insert_child(parent, id);
    }

    Ok(())
}

fn mode_from_type_letter(type_str: &str) -> u32 {
    match type_str.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('D') => S_IFDIR,
        Some('L') => S_IFLNK,
        Some('B') => S_IFBLK,
        Some('C') => S_IFCHR,
        Some('S') => S_IFSOCK,
        Some('F') if type_str.eq_ignore_ascii_case("fifo") => S_IFIFO,
        _ => S_IFREG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_handles_absolute_and_relative() {
        assert_eq!(split_path("/a/b/c"), ("/a/b".to_string(), "c".to_string()));
        assert_eq!(split_path("leaf"), (String::new(), "leaf".to_string()));
    }

    #[test]
    fn header_regex_accepts_both_dialects() {
        let re = header_regex();
        assert!(re.is_match("[qdirstat 1.0 cache file]"));
        assert!(re.is_match("[kdirstat 2.0 cache file]"));
        assert!(!re.is_match("not a cache file"));
    }
}
