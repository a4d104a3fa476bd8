//! End-to-end index behavior over small stores.
//!
//! Blocks are kept tiny (96 bytes, 4-byte keys and values, 8 slots per
//! node) so splits, root promotions, and free-list exhaustion all happen
//! within a few dozen inserts.

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use blocktree::{BTreeIndex, BufferCache, DisplayMode, Error, FileStore, MemStore};

const BLOCK_SIZE: usize = 96;
const KEY_SIZE: usize = 4;
const VALUE_SIZE: usize = 4;

fn small_cache(num_blocks: u32) -> BufferCache<MemStore> {
    BufferCache::new(MemStore::new(BLOCK_SIZE, num_blocks), 16)
}

fn key(i: u32) -> String {
    format!("{:04}", i)
}

fn value(i: u32) -> String {
    format!("v{:03}", i)
}

fn sorted_dump(index: &mut BTreeIndex<'_, MemStore>) -> String {
    let mut out = Vec::new();
    index.display(&mut out, DisplayMode::SortedKeyVal).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn insert_then_lookup_single_key() {
    let mut cache = small_cache(32);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    index.insert(b"aaaa", b"1111").unwrap();

    assert_eq!(index.lookup(b"aaaa").unwrap(), b"1111");
    assert_eq!(index.num_keys(), 1);
}

#[test]
fn duplicate_insert_conflicts_and_preserves_value() {
    let mut cache = small_cache(32);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    index.insert(b"aaaa", b"1111").unwrap();
    assert!(matches!(index.insert(b"aaaa", b"2222"), Err(Error::Conflict)));

    assert_eq!(index.lookup(b"aaaa").unwrap(), b"1111");
}

#[test]
fn lookup_on_fresh_index_is_not_found() {
    let mut cache = small_cache(32);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    for probe in [b"0000", b"zzzz", b"mmmm"] {
        assert!(matches!(index.lookup(probe), Err(Error::NotFound)));
    }
}

#[test]
fn hundred_ascending_inserts_stay_sorted_and_deepen_the_tree() {
    let mut cache = small_cache(128);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    for i in 0..100 {
        index.insert(key(i).as_bytes(), value(i).as_bytes()).unwrap();
    }

    for i in 0..100 {
        assert_eq!(
            index.lookup(key(i).as_bytes()).unwrap(),
            value(i).as_bytes(),
            "key {} lost",
            key(i)
        );
    }

    let dump = sorted_dump(&mut index);
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 100);
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted);

    // With 8-slot nodes a hundred keys cannot fit under a one-level root.
    assert_ne!(index.root_block(), 1);
    index.sanity_check().unwrap();
}

#[test]
fn shuffled_inserts_produce_the_same_sorted_dump() {
    let mut ascending_cache = small_cache(128);
    let mut ascending = BTreeIndex::create(&mut ascending_cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();
    for i in 0..100 {
        ascending
            .insert(key(i).as_bytes(), value(i).as_bytes())
            .unwrap();
    }
    let expected = sorted_dump(&mut ascending);

    let mut order: Vec<u32> = (0..100).collect();
    order.shuffle(&mut StdRng::seed_from_u64(0x5EED));

    let mut shuffled_cache = small_cache(128);
    let mut shuffled = BTreeIndex::create(&mut shuffled_cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();
    for &i in &order {
        shuffled
            .insert(key(i).as_bytes(), value(i).as_bytes())
            .unwrap();
    }

    assert_eq!(sorted_dump(&mut shuffled), expected);
    shuffled.sanity_check().unwrap();
}

#[test]
fn exhausted_store_reports_no_space_but_keeps_key_order() {
    let mut cache = small_cache(32);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    let mut inserted = 0u32;
    let mut saw_no_space = false;
    for i in 0..1000 {
        match index.insert(key(i).as_bytes(), value(i).as_bytes()) {
            Ok(()) => inserted += 1,
            Err(Error::NoSpace) => {
                saw_no_space = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert!(saw_no_space, "32 blocks absorbed 1000 inserts");
    assert!(inserted >= 30, "only {} inserts before NoSpace", inserted);
    index.keys_in_order().unwrap();
    index.sanity_check().unwrap();

    // Everything inserted before the failure is still readable.
    for i in 0..inserted {
        assert_eq!(index.lookup(key(i).as_bytes()).unwrap(), value(i).as_bytes());
    }
}

#[test]
fn updates_after_splits_are_visible_and_sane() {
    let mut cache = small_cache(128);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    for i in 0..50 {
        index.insert(key(i).as_bytes(), value(i).as_bytes()).unwrap();
    }
    for i in (0..50).step_by(2) {
        index.update(key(i).as_bytes(), b"new!").unwrap();
    }

    for i in 0..50 {
        let expected = if i % 2 == 0 {
            b"new!".to_vec()
        } else {
            value(i).into_bytes()
        };
        assert_eq!(index.lookup(key(i).as_bytes()).unwrap(), expected);
    }

    index.sanity_check().unwrap();
}

#[test]
fn update_then_lookup_round_trip() {
    let mut cache = small_cache(32);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    index.insert(b"kkkk", b"0000").unwrap();
    index.update(b"kkkk", b"1234").unwrap();

    assert_eq!(index.lookup(b"kkkk").unwrap(), b"1234");
}

#[test]
fn wrong_width_keys_and_values_are_rejected() {
    let mut cache = small_cache(32);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    assert!(matches!(
        index.insert(b"short", b"1111"),
        Err(Error::SizeMismatch { expected: 4, got: 5 })
    ));
    assert!(matches!(
        index.insert(b"aaaa", b"oversized"),
        Err(Error::SizeMismatch { expected: 4, got: 9 })
    ));
    assert_eq!(index.num_keys(), 0);
}

#[test]
fn delete_reports_unimplemented() {
    let mut cache = small_cache(32);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();
    index.insert(b"aaaa", b"1111").unwrap();

    assert!(matches!(index.delete(b"aaaa"), Err(Error::Unimplemented(_))));
    assert_eq!(index.lookup(b"aaaa").unwrap(), b"1111");
}

#[test]
fn fill_report_tracks_shallow_occupancy_after_splits() {
    let mut cache = small_cache(128);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    for i in 0..60 {
        index.insert(key(i).as_bytes(), value(i).as_bytes()).unwrap();
    }

    let report = index.fill_report().unwrap();
    assert_eq!(report.total_keys, 60);
    assert!(report.leaves > 1);
    assert!(report.average_fill() > 0.0 && report.average_fill() <= 1.0);
}

#[test]
fn graphviz_dump_mentions_every_allocated_leaf() {
    let mut cache = small_cache(128);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    for i in 0..30 {
        index.insert(key(i).as_bytes(), value(i).as_bytes()).unwrap();
    }

    let mut out = Vec::new();
    index.display(&mut out, DisplayMode::DepthDot).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.starts_with("digraph tree {"));
    let report = index.fill_report().unwrap();
    // One label line per node, one edge line per child pointer.
    assert!(text.matches("label=").count() > report.leaves);
    assert!(text.matches("->").count() >= report.leaves);
}

#[test]
fn index_survives_detach_flush_and_reattach_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.blk");

    {
        let store = FileStore::create(&path, BLOCK_SIZE, 64).unwrap();
        let mut cache = BufferCache::new(store, 16);
        let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();
        for i in 0..40 {
            index.insert(key(i).as_bytes(), value(i).as_bytes()).unwrap();
        }
        index.detach().unwrap();
        cache.flush().unwrap();
    }

    let store = FileStore::open(&path, BLOCK_SIZE).unwrap();
    let mut cache = BufferCache::new(store, 16);
    let mut index = BTreeIndex::attach(&mut cache, 0).unwrap();

    assert_eq!(index.num_keys(), 40);
    for i in 0..40 {
        assert_eq!(index.lookup(key(i).as_bytes()).unwrap(), value(i).as_bytes());
    }
    index.sanity_check().unwrap();
}

#[test]
fn cache_pressure_does_not_corrupt_the_tree() {
    // Two frames force constant eviction and write-back underneath the
    // engine while it splits nodes.
    let mut cache = BufferCache::new(MemStore::new(BLOCK_SIZE, 128), 2);
    let mut index = BTreeIndex::create(&mut cache, 0, KEY_SIZE, VALUE_SIZE).unwrap();

    let mut order: Vec<u32> = (0..80).collect();
    order.shuffle(&mut StdRng::seed_from_u64(7));
    for &i in &order {
        index.insert(key(i).as_bytes(), value(i).as_bytes()).unwrap();
    }

    for i in 0..80 {
        assert_eq!(index.lookup(key(i).as_bytes()).unwrap(), value(i).as_bytes());
    }
    index.sanity_check().unwrap();
}
