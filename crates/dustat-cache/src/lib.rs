pub mod codec;
pub mod constants;
pub mod reader;
pub mod writer;

pub use codec::{parse_mtime, parse_size, url_decode, url_encode};
pub use constants::{CACHE_FILE_NAME, MAX_ERROR_COUNT, MAX_FIELDS, MAX_LINE_LEN};
pub use reader::{read_cache, read_cache_file, CacheReader, CACHE_READ_YIELD_LINES};
pub use writer::{write_cache, write_cache_file, CACHE_FORMAT_VERSION};

#[cfg(test)]
mod tests {
    use super::*;
    use dustat_core::node::NodeKind;
    use dustat_core::tree::Tree;
    use std::ffi::OsString;
    use std::io::Cursor;
    use std::path::Path;

    fn build_sample_tree() -> (Tree, dustat_core::node::NodeId) {
        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);

        let a = tree.create_file(OsString::from("a.txt"));
        tree.get_mut(a).byte_size = 10;
        tree.get_mut(a).allocated_size = 10;
        tree.get_mut(a).mtime = 1000;
        tree.insert_child(root, a);

        let s = tree.create_dir_with_dot_entry(OsString::from("s"), NodeKind::Dir);
        tree.insert_child(root, s);
        let c = tree.create_file(OsString::from("c.txt"));
        tree.get_mut(c).byte_size = 70;
        tree.get_mut(c).allocated_size = 70;
        tree.get_mut(c).mtime = 1000;
        tree.insert_child(s, c);

        tree.finalize_local(s);
        tree.finalize_local(root);
        tree.mark_dirty(root);
        tree.recalc(root);
        (tree, root)
    }

    #[test]
    fn scenario_s5_write_then_read_round_trip() {
        let (tree, root) = build_sample_tree();
        let mut buf = Vec::new();
        write_cache(&tree, root, Path::new("/data/root"), &mut buf).unwrap();

        let mut read_tree = Tree::new();
        let new_root = read_cache(Cursor::new(buf), &mut read_tree, None).unwrap();
        read_tree.mark_dirty(new_root);
        read_tree.recalc(new_root);

        assert_eq!(read_tree.get(new_root).name, OsString::from("/data/root"));
        let orig = tree.get(root).dir();
        let got = read_tree.get(new_root).dir();
        assert_eq!(got.total_size, orig.total_size);
        assert_eq!(got.total_items, orig.total_items);
        assert_eq!(got.total_files, orig.total_files);
        assert_eq!(got.total_subdirs, orig.total_subdirs);
        assert_eq!(got.latest_mtime, orig.latest_mtime);
    }

    #[test]
    fn round_trip_preserves_unread_state_of_excluded_and_denied_dirs() {
        use dustat_core::node::ReadState;

        let mut tree = Tree::new();
        let root = tree.create_dir_with_dot_entry(OsString::from("root"), NodeKind::Dir);
        tree.insert_child(tree.root, root);

        let excluded = tree.create_dir_with_dot_entry(OsString::from("excluded"), NodeKind::Dir);
        tree.insert_child(root, excluded);
        tree.get_mut(excluded).dir_mut().is_excluded = true;
        tree.set_read_state(excluded, ReadState::OnRequestOnly);

        let denied = tree.create_dir_with_dot_entry(OsString::from("denied"), NodeKind::Dir);
        tree.insert_child(root, denied);
        tree.set_read_state(denied, ReadState::PermissionDenied);

        let read_ok = tree.create_dir_with_dot_entry(OsString::from("ok"), NodeKind::Dir);
        tree.insert_child(root, read_ok);
        tree.set_read_state(read_ok, ReadState::Finished);

        tree.finalize_local(root);
        tree.mark_dirty(root);
        tree.recalc(root);

        let mut buf = Vec::new();
        write_cache(&tree, root, Path::new("/data/root"), &mut buf).unwrap();

        let mut read_tree = Tree::new();
        let new_root = read_cache(Cursor::new(buf), &mut read_tree, None).unwrap();

        let find = |name: &str| {
            read_tree.children(new_root).find(|c| read_tree.get(*c).name == OsString::from(name)).unwrap()
        };
        assert_eq!(read_tree.read_state(find("excluded")), ReadState::OnRequestOnly);
        assert_eq!(read_tree.read_state(find("denied")), ReadState::PermissionDenied);
        assert_eq!(read_tree.read_state(find("ok")), ReadState::Finished);
    }
}
