use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use dustat_core::format::compact_size;
use dustat_core::node::{NodeId, ReadState};
use dustat_core::tree::Tree;

pub const CACHE_FORMAT_VERSION: &str = "1.0";

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;
const S_IFBLK: u32 = 0o060000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;
const S_IFSOCK: u32 = 0o140000;

fn type_letter(node: &dustat_core::node::Node) -> &'static str {
    if node.kind.is_dir() {
        return "D";
    }
    match node.mode & S_IFMT {
        S_IFLNK => "L",
        S_IFBLK => "BlockDev",
        S_IFCHR => "CharDev",
        S_IFIFO => "FIFO",
        S_IFSOCK => "Socket",
        _ => "F",
    }
}

/// Writes the gzip cache file for the subtree rooted at `start` (§4.7).
/// `start_path` is the absolute path of `start`, used for the first
/// directory record; every deeper record is a path-relative leaf name.
pub fn write_cache_file(tree: &Tree, start: NodeId, start_path: &Path, out_path: &Path) -> io::Result<()> {
    let file = std::fs::File::create(out_path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    write_cache(tree, start, start_path, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

pub fn write_cache(tree: &Tree, start: NodeId, start_path: &Path, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "[qdirstat {CACHE_FORMAT_VERSION} cache file]")?;
    writeln!(out, "# Type\tpath\tsize\tuid\tgid\tmode\tmtime\talloc")?;
    write_node(tree, start, &start_path.to_string_lossy(), out)?;
    Ok(())
}

/// Recursively writes `id` (a directory), then its dot entry's file
/// children as leaf names, then each real subdirectory in full, mirroring
/// `writeTree`'s depth-first order. `abs_path` is `id`'s full path: every
/// directory line carries its full path so the reader can resolve a
/// parent by locating `dirname(abs_path)` rather than relying on
/// traversal order (§4.7's "parent resolution").
fn write_node(tree: &Tree, id: NodeId, abs_path: &str, out: &mut impl Write) -> io::Result<()> {
    write_line(tree, id, &crate::codec::url_encode(abs_path), out)?;

    if let Some(node) = tree.try_get(id) {
        if node.kind.is_dir() {
            if let Some(de) = node.dir().dot_entry {
                for c in tree.children(de) {
                    let name = crate::codec::url_encode(&tree.get(c).name.to_string_lossy());
                    write_line(tree, c, &name, out)?;
                }
            }
            // Direct children after finalize_local's flattening may include
            // plain files as well as subdirectories (§4.1's "dot-entry
            // cleanup"), so every direct child is written, not just dirs.
            let children: Vec<NodeId> = tree.children(id).collect();
            for c in children {
                if tree.get(c).kind.is_dir() {
                    let child_path = join_path(abs_path, &tree.get(c).name.to_string_lossy());
                    write_node(tree, c, &child_path, out)?;
                } else {
                    let name = crate::codec::url_encode(&tree.get(c).name.to_string_lossy());
                    write_line(tree, c, &name, out)?;
                }
            }
        }
    }
    Ok(())
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn write_line(tree: &Tree, id: NodeId, path_or_name: &str, out: &mut impl Write) -> io::Result<()> {
    let node = tree.get(id);
    let type_str = type_letter(node);
    let size = compact_size(node.byte_size);
    let mode_octal = format!("{:o}", node.mode & 0o7777);
    let mtime_hex = format!("{:x}", node.mtime);
    let alloc = compact_size(node.allocated_size);

    write!(
        out,
        "{type_str}\t{path_or_name}\t{size}\t{}\t{}\t{mode_octal}\t{mtime_hex}\t{alloc}\t|",
        node.uid, node.gid,
    )?;

    if node.is_sparse {
        write!(out, "  blocks: {}", node.blocks)?;
    }
    if node.links > 1 {
        write!(out, "  links: {}", node.links)?;
    }
    if node.kind.is_dir() {
        let state_word = match node.dir().read_state {
            ReadState::OnRequestOnly if node.dir().is_mount_point => Some("mountpoint"),
            ReadState::OnRequestOnly if node.dir().is_excluded => Some("excluded"),
            ReadState::PermissionDenied => Some("permission-denied"),
            _ => None,
        };
        if let Some(word) = state_word {
            write!(out, "  unread: {word}")?;
        }
    }
    writeln!(out)?;
    Ok(())
}
