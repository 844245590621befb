mod common;

use common::Scratch;
use sacs::{update_hierarchy_size, DirEntry, EntryKind, FsError, EMPTY_DIR_SIZE};

/// Builds `/a/b` and returns the handles for `a` and `b`.
fn nested(s: &mut Scratch) -> (DirEntry, DirEntry) {
    let mut root = s.fs.root().unwrap();
    s.fs.create_dir(&mut root, "a").unwrap();
    let mut a = s.fs.open_dir("/a").unwrap();
    s.fs.create_dir(&mut a, "b").unwrap();
    let b = s.fs.open_dir("/a/b").unwrap();
    (a, b)
}

fn sizes(s: &Scratch, dirs: &[u32]) -> Vec<u32> {
    dirs.iter().map(|&d| s.fs.dir_size(d).unwrap()).collect()
}

#[test]
fn sizes_accumulate_up_to_the_root() {
    let mut s = Scratch::default_volume();
    let (a, mut b) = nested(&mut s);
    s.fs.create_file(&mut b, "f", 100, &[7; 100]).unwrap();

    let root_start = s.fs.superblock().root_start;
    assert_eq!(b.size, EMPTY_DIR_SIZE + 100);
    assert_eq!(
        sizes(&s, &[b.start_block, a.start_block, root_start]),
        vec![164, 228, 292]
    );

    // the root mirrors its total into its own `..`
    let root = s.fs.root().unwrap();
    let dotdot = s.fs.list(&root).nth(1).unwrap().unwrap();
    assert_eq!(dotdot.name, "..");
    assert_eq!(dotdot.size, 292);
}

#[test]
fn paired_deltas_cancel_out() {
    let mut s = Scratch::default_volume();
    let (a, b) = nested(&mut s);
    let root_start = s.fs.superblock().root_start;
    let dirs = [b.start_block, a.start_block, root_start];
    let before = sizes(&s, &dirs);

    update_hierarchy_size(s.fs.volume(), b.start_block, 1000).unwrap();
    assert_eq!(
        sizes(&s, &dirs),
        before.iter().map(|v| v + 1000).collect::<Vec<_>>()
    );
    update_hierarchy_size(s.fs.volume(), b.start_block, -1000).unwrap();
    assert_eq!(sizes(&s, &dirs), before);
}

#[test]
fn propagation_walks_depth_plus_one_levels() {
    let mut s = Scratch::default_volume();
    let (a, b) = nested(&mut s);
    let root_start = s.fs.superblock().root_start;
    let vol = s.fs.volume();

    assert_eq!(update_hierarchy_size(vol, root_start, 0).unwrap(), 1);
    assert_eq!(update_hierarchy_size(vol, a.start_block, 0).unwrap(), 2);
    assert_eq!(update_hierarchy_size(vol, b.start_block, 0).unwrap(), 3);
}

#[test]
fn negative_delta_clamps_at_zero() {
    let mut s = Scratch::default_volume();
    let (_, b) = nested(&mut s);
    update_hierarchy_size(s.fs.volume(), b.start_block, -1_000_000).unwrap();
    assert_eq!(s.fs.dir_size(b.start_block).unwrap(), 0);
    assert_eq!(s.fs.dir_size(s.fs.superblock().root_start).unwrap(), 0);
}

#[test]
fn missing_back_reference_is_a_consistency_fault() {
    let mut s = Scratch::default_volume();
    let (_, b) = nested(&mut s);
    let mut root = s.fs.root().unwrap();
    // orphan `a` by freeing its slot in the root without touching the bitmap
    let mut a_slot = s.fs.volume().read_entry(root.start_block, 2).unwrap();
    assert_eq!(a_slot.name, "a");
    a_slot.status = sacs::EntryStatus::Free;
    s.fs.volume().write_entry(root.start_block, 2, &a_slot).unwrap();

    let err = update_hierarchy_size(s.fs.volume(), b.start_block, 10).unwrap_err();
    assert!(matches!(err, FsError::ConsistencyFault { .. }), "{err}");
    // the levels below the break were still written
    assert_eq!(s.fs.dir_size(b.start_block).unwrap(), EMPTY_DIR_SIZE + 10);
    root = s.fs.root().unwrap();
    assert_eq!(root.size, 3 * EMPTY_DIR_SIZE);
}

#[test]
fn duplicate_name_leaves_bitmap_alone() {
    let mut s = Scratch::default_volume();
    let mut root = s.fs.root().unwrap();
    s.fs.create_file(&mut root, "x", 10, b"0123456789").unwrap();
    let bits = s.bitmap();
    let size = root.size;

    let err = s.fs.create_file(&mut root, "x", 3, b"abc").unwrap_err();
    assert!(matches!(err, FsError::DuplicateName(ref n) if n == "x"));
    let err = s.fs.create_dir(&mut root, "x").unwrap_err();
    assert!(matches!(err, FsError::DuplicateName(_)));

    assert_eq!(s.bitmap(), bits);
    assert_eq!(s.fs.root().unwrap().size, size);
}

#[test]
fn invalid_names_are_refused() {
    let mut s = Scratch::default_volume();
    let mut root = s.fs.root().unwrap();
    for name in ["", ".", "..", "a/b", "seventeen-chars-x"] {
        let err = s.fs.create_file(&mut root, name, 0, &[]).unwrap_err();
        assert!(matches!(err, FsError::InvalidName(_)), "{name:?}: {err}");
    }
    assert_eq!(s.fs.free_blocks().unwrap(), s.fs.superblock().data_blocks());
}

#[test]
fn non_empty_directory_is_not_deleted() {
    let mut s = Scratch::default_volume();
    nested(&mut s);
    let mut root = s.fs.root().unwrap();
    let bits = s.bitmap();
    let size = root.size;

    let err = s.fs.delete_item(&mut root, "a").unwrap_err();
    assert!(matches!(err, FsError::NotEmpty(ref n) if n == "a"));
    assert_eq!(s.bitmap(), bits);
    assert_eq!(s.fs.root().unwrap().size, size);
    assert!(s.fs.open_dir("/a/b").is_ok());
}

#[test]
fn dot_entries_and_root_cannot_be_deleted() {
    let mut s = Scratch::default_volume();
    let mut root = s.fs.root().unwrap();
    assert!(matches!(
        s.fs.delete_item(&mut root, ".").unwrap_err(),
        FsError::DotEntryDenied
    ));
    assert!(matches!(
        s.fs.delete_item(&mut root, "..").unwrap_err(),
        FsError::DotEntryDenied
    ));
    assert!(matches!(
        s.fs.delete_item(&mut root, "ghost").unwrap_err(),
        FsError::NotFound(_)
    ));
}

#[test]
fn entry_aliasing_the_root_cannot_be_deleted() {
    let mut s = Scratch::default_volume();
    let mut root = s.fs.root().unwrap();
    let root_start = s.fs.superblock().root_start;
    let alias = sacs::prepare_entry("alias", EntryKind::Dir, EMPTY_DIR_SIZE, root_start, 2048);
    s.fs.volume().write_entry(root_start, 2, &alias).unwrap();
    let bits = s.bitmap();

    let err = s.fs.delete_item(&mut root, "alias").unwrap_err();
    assert!(matches!(err, FsError::OperationOnRootDenied), "{err}");
    assert_eq!(s.bitmap(), bits);
    assert!(s.fs.list(&root).any(|e| e.unwrap().name == "alias"));
}

#[test]
fn parent_loop_is_a_consistency_fault() {
    let mut s = Scratch::default_volume();
    let (a, b) = nested(&mut s);
    // `a/..` now points down at its own child `b`
    let mut dotdot = s.fs.volume().read_entry(a.start_block, 1).unwrap();
    dotdot.start_block = b.start_block;
    s.fs.volume().write_entry(a.start_block, 1, &dotdot).unwrap();

    let err = update_hierarchy_size(s.fs.volume(), b.start_block, 10).unwrap_err();
    assert!(
        matches!(err, FsError::ConsistencyFault { child, parent } if child == a.start_block && parent == b.start_block),
        "{err}"
    );
}

#[test]
fn deleting_subtree_returns_sizes_and_blocks() {
    let mut s = Scratch::default_volume();
    let (mut a, mut b) = nested(&mut s);
    s.fs.create_file(&mut b, "f", 5000, &[1; 5000]).unwrap();
    s.fs.delete_item(&mut b, "f").unwrap();
    assert_eq!(b.size, EMPTY_DIR_SIZE);
    s.fs.delete_item(&mut a, "b").unwrap();
    assert_eq!(a.size, EMPTY_DIR_SIZE);

    let mut root = s.fs.root().unwrap();
    assert_eq!(root.size, 2 * EMPTY_DIR_SIZE);
    s.fs.delete_item(&mut root, "a").unwrap();
    assert_eq!(root.size, EMPTY_DIR_SIZE);
    assert_eq!(s.fs.free_blocks().unwrap(), s.fs.superblock().data_blocks());
}

#[test]
fn full_parent_rolls_back_the_allocation() {
    let mut s = Scratch::small_root();
    let mut root = s.fs.root().unwrap();
    assert_eq!(root.length, 1);

    // 64 slots, two taken by `.` and `..`
    for i in 0..62 {
        s.fs.create_file(&mut root, &format!("f{i}"), 0, &[]).unwrap();
    }
    let bits = s.bitmap();
    let free = s.fs.free_blocks().unwrap();

    let err = s.fs.create_file(&mut root, "one-more", 10, b"0123456789").unwrap_err();
    assert!(matches!(err, FsError::ParentFull), "{err}");
    let err = s.fs.create_dir(&mut root, "dir").unwrap_err();
    assert!(matches!(err, FsError::ParentFull), "{err}");

    assert_eq!(s.bitmap(), bits);
    assert_eq!(s.fs.free_blocks().unwrap(), free);
    assert_eq!(s.fs.root().unwrap().size, EMPTY_DIR_SIZE);

    // a freed slot is reused
    s.fs.delete_item(&mut root, "f7").unwrap();
    s.fs.create_dir(&mut root, "dir").unwrap();
}
