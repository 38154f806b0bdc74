//! # BigArray Integration Tests
//!
//! End-to-end coverage of the circular array against real directories:
//! append/read round trips, cursor persistence across reopen, wraparound at a
//! small index ceiling, the data-size ceiling, backlog auto-eviction, and
//! garbage collection of retired page files.
//!
//! All tests shrink the geometry through the construction hooks (small data
//! pages, few index records per page) so page rollover and collection are
//! reachable without writing gigabytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bigring::{ArrayConfig, ArrayError, BigArray};
use parking_lot::Mutex;
use tempfile::tempdir;

/// 64 KiB data pages: a multiple of every common OS page size.
const DATA_PAGE: u64 = 64 * 1024;
/// 16 index records per index page.
const INDEX_BITS: u32 = 4;

fn small_config(dir: &Path, name: &str) -> ArrayConfig {
    ArrayConfig::new(dir, name)
        .override_min_data_page_size(DATA_PAGE)
        .data_page_size(DATA_PAGE)
        .index_items_per_page_bits(INDEX_BITS)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn index_page_path(array_dir: &Path, page: u64) -> PathBuf {
    array_dir.join("index").join(format!("page-{page}.dat"))
}

fn data_page_path(array_dir: &Path, page: u64) -> PathBuf {
    array_dir.join("data").join(format!("page-{page}.dat"))
}

#[test]
fn hello_world_scenario() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "simple")).unwrap();

    assert_eq!(array.size(), 0);
    assert!(array.is_empty());
    assert!(!array.is_full());
    assert!(!array.is_data_full(0));
    assert!(ArrayError::is_index_out_of_range(&array.get(0).unwrap_err()));
    assert!(ArrayError::is_index_out_of_range(&array.get(1).unwrap_err()));

    assert_eq!(array.append(b"hello").unwrap(), 0);
    assert_eq!(array.append(b"world").unwrap(), 1);

    assert_eq!(array.get(0).unwrap(), b"hello");
    assert_eq!(array.get(1).unwrap(), b"world");
    assert_eq!(array.size(), 2);
    assert_eq!(array.data_size(), 10);
    assert_eq!(array.tail_index(), 0);
    assert_eq!(array.head_index(), 2);

    array.remove_before_index(1).unwrap();
    assert_eq!(array.tail_index(), 1);
    assert_eq!(array.size(), 1);
    assert!(ArrayError::is_index_out_of_range(&array.get(0).unwrap_err()));
    assert_eq!(array.get(1).unwrap(), b"world");
}

#[test]
fn monotonic_size_and_head_advance() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "monotonic")).unwrap();

    for i in 0..100u32 {
        array.append(format!("entry-{i}").as_bytes()).unwrap();
        assert_eq!(array.size(), u64::from(i) + 1);
    }
    assert_eq!(array.head_index(), array.tail_index() + 100);
}

#[test]
fn shift_returns_entries_in_fifo_order() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "fifo")).unwrap();

    for i in 0..20u32 {
        array.append(format!("entry-{i}").as_bytes()).unwrap();
    }

    for i in 0..20u32 {
        let remaining_before = array.size();
        let entry = array.shift().unwrap().unwrap();
        assert_eq!(entry, format!("entry-{i}").as_bytes());
        assert_eq!(array.size(), remaining_before - 1);
    }

    assert!(array.shift().unwrap().is_none());
    assert!(array.peek().unwrap().is_none());
}

#[test]
fn wraparound_at_small_max_index() {
    let dir = tempdir().unwrap();
    let mut array =
        BigArray::open(small_config(dir.path(), "wrap").max_index(8)).unwrap();

    // one slot is reserved: capacity is max_index - 1
    for i in 0..7u32 {
        array.append(format!("item-{i}").as_bytes()).unwrap();
    }
    assert!(array.is_full());

    let err = array.append(b"overflow").unwrap_err();
    assert!(ArrayError::is_out_of_space(&err));

    assert_eq!(array.shift().unwrap().unwrap(), b"item-0");
    assert!(!array.is_full());

    let appended_at = array.append(b"item-7").unwrap();
    assert_eq!(appended_at, 7);
    assert_eq!(array.head_index(), 0, "head wraps to zero");
    assert_eq!(array.size(), 7);

    // wrapped validity: [tail=1, head=0) covers 1..=7
    assert!(ArrayError::is_index_out_of_range(&array.get(0).unwrap_err()));
    for i in 1..8u64 {
        assert!(array.get(i).is_ok(), "index {i} should be live");
    }
    assert_eq!(array.get(7).unwrap(), b"item-7");
}

#[test]
fn invalid_reads_surface_index_out_of_range() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "invalid")).unwrap();

    for _ in 0..3 {
        array.append(b"x").unwrap();
    }
    array.shift().unwrap();

    // live range is [1, 3)
    assert!(ArrayError::is_index_out_of_range(&array.get(0).unwrap_err()));
    assert!(ArrayError::is_index_out_of_range(&array.get(3).unwrap_err()));
    assert!(ArrayError::is_index_out_of_range(
        &array.get(u64::MAX - 1).unwrap_err()
    ));
    assert!(array.get(1).is_ok());
    assert!(array.get(2).is_ok());

    assert!(ArrayError::is_index_out_of_range(
        &array.item_length(0).unwrap_err()
    ));
}

#[test]
fn data_ceiling_fails_with_out_of_space_while_ring_has_room() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(
        small_config(dir.path(), "ceiling").max_data_size_mb(1), // 16 data pages
    )
    .unwrap();

    // one 48000-byte payload per 64 KiB page
    let payload = vec![0xABu8; 48_000];
    for _ in 0..16 {
        array.append(&payload).unwrap();
    }

    let err = array.append(&payload).unwrap_err();
    assert!(ArrayError::is_out_of_space(&err));
    assert!(!array.is_full(), "index ring still has room");
    assert!(array.is_data_full(payload.len() as u64));
}

#[test]
fn backlog_evicts_exactly_one_batch_before_append_succeeds() {
    let dir = tempdir().unwrap();
    let backlog: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&backlog);

    let mut array = BigArray::open(
        small_config(dir.path(), "backlog")
            .max_data_size_mb(1)
            .backlog(move |entry| sink.lock().push(entry)),
    )
    .unwrap();

    let mut payloads = Vec::new();
    for i in 0..16u8 {
        let payload = vec![i; 48_000];
        array.append(&payload).unwrap();
        payloads.push(payload);
    }
    assert!(backlog.lock().is_empty());

    // the triggering append evicts one batch of 10 oldest entries, then fits
    let trigger = vec![0xFFu8; 48_000];
    array.append(&trigger).unwrap();

    assert_eq!(array.tail_index(), 10);
    assert_eq!(array.size(), 7);

    assert!(
        wait_until(Duration::from_secs(5), || backlog.lock().len() == 10),
        "expected 10 backlogged entries, got {}",
        backlog.lock().len()
    );
    assert_eq!(*backlog.lock(), payloads[..10]);

    // the oldest survivor and the trigger both read back
    assert_eq!(array.get(10).unwrap(), payloads[10]);
    assert_eq!(array.get(16).unwrap(), trigger);
}

#[test]
fn oversized_payload_is_rejected() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "oversized")).unwrap();

    let payload = vec![0u8; DATA_PAGE as usize + 1];
    assert!(array.append(&payload).is_err());

    // exactly one page still fits
    let payload = vec![7u8; DATA_PAGE as usize];
    let index = array.append(&payload).unwrap();
    assert_eq!(array.get(index).unwrap(), payload);
}

#[test]
fn item_length_matches_appended_length() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "lengths")).unwrap();

    for len in 1..=50u32 {
        array.append(&vec![0u8; len as usize]).unwrap();
    }
    for len in 1..=50u32 {
        assert_eq!(array.item_length(u64::from(len) - 1).unwrap(), len);
    }
}

#[test]
fn round_trip_survives_close_and_reopen() {
    let dir = tempdir().unwrap();

    {
        let mut array = BigArray::open(small_config(dir.path(), "persist")).unwrap();
        array.append(b"hello").unwrap();
        array.append(b"world").unwrap();
        array.flush().unwrap();
        array.close().unwrap();
    }

    let mut array = BigArray::open(small_config(dir.path(), "persist")).unwrap();
    assert_eq!(array.size(), 2);
    assert_eq!(array.get(0).unwrap(), b"hello");
    assert_eq!(array.get(1).unwrap(), b"world");

    // appends continue where the head left off
    let index = array.append(b"again").unwrap();
    assert_eq!(index, 2);
    assert_eq!(array.get(2).unwrap(), b"again");
    assert_eq!(array.data_size(), 15);
}

#[test]
fn reopen_after_shifts_restores_tail() {
    let dir = tempdir().unwrap();

    {
        let mut array = BigArray::open(small_config(dir.path(), "tailpersist")).unwrap();
        for i in 0..10u32 {
            array.append(format!("entry-{i}").as_bytes()).unwrap();
        }
        for _ in 0..4 {
            array.shift().unwrap();
        }
        array.flush().unwrap();
        array.close().unwrap();
    }

    let mut array = BigArray::open(small_config(dir.path(), "tailpersist")).unwrap();
    assert_eq!(array.tail_index(), 4);
    assert_eq!(array.size(), 6);
    assert_eq!(array.shift().unwrap().unwrap(), b"entry-4");
}

#[test]
fn remove_before_index_collects_dead_pages_synchronously() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "removegc")).unwrap();
    let array_dir = array.array_dir().to_path_buf();

    // 8 KiB payloads: exactly 8 per data page; 16 records per index page
    let payload = vec![0x5Au8; 8192];
    for _ in 0..64 {
        array.append(&payload).unwrap();
    }
    assert!(index_page_path(&array_dir, 0).exists());
    assert!(data_page_path(&array_dir, 0).exists());

    array.remove_before_index(33).unwrap();

    // live index pages: 2..=4; live data pages: 4..=7
    for page in 0..2 {
        assert!(!index_page_path(&array_dir, page).exists(), "index page {page}");
    }
    for page in 2..4 {
        assert!(index_page_path(&array_dir, page).exists(), "index page {page}");
    }
    for page in 0..4 {
        assert!(!data_page_path(&array_dir, page).exists(), "data page {page}");
    }
    for page in 4..8 {
        assert!(data_page_path(&array_dir, page).exists(), "data page {page}");
    }

    let index_page_size: u64 = 16 * 32; // records per page * record width
    assert_eq!(
        array.backing_size().unwrap(),
        2 * index_page_size + 4 * DATA_PAGE
    );

    assert!(ArrayError::is_index_out_of_range(&array.get(32).unwrap_err()));
    assert_eq!(array.get(33).unwrap(), payload);
}

#[test]
fn shifts_across_page_boundaries_trigger_deferred_gc() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "deferredgc")).unwrap();
    let array_dir = array.array_dir().to_path_buf();

    let payload = vec![0xC3u8; 8192];
    for _ in 0..64 {
        array.append(&payload).unwrap();
    }
    for _ in 0..33 {
        array.shift().unwrap();
    }

    let collected = wait_until(Duration::from_secs(5), || {
        !index_page_path(&array_dir, 0).exists()
            && !index_page_path(&array_dir, 1).exists()
            && !data_page_path(&array_dir, 3).exists()
    });
    assert!(collected, "deferred gc did not retire dead pages");

    assert!(index_page_path(&array_dir, 2).exists());
    assert!(data_page_path(&array_dir, 4).exists());
    assert_eq!(array.get(33).unwrap(), payload);
    assert_eq!(array.size(), 31);
}

#[test]
fn remove_all_resets_to_empty() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "removeall")).unwrap();

    for i in 0..40u32 {
        array.append(format!("entry-{i}").as_bytes()).unwrap();
    }
    array.shift().unwrap();
    assert!(array.backing_size().unwrap() > 0);

    array.remove_all().unwrap();

    assert!(array.is_empty());
    assert_eq!(array.size(), 0);
    assert_eq!(array.data_size(), 0);
    assert_eq!(array.backing_size().unwrap(), 0);
    assert_eq!(array.head_index(), 0);
    assert_eq!(array.tail_index(), 0);

    // the array is immediately usable again
    array.append(b"fresh").unwrap();
    assert_eq!(array.get(0).unwrap(), b"fresh");
}

#[test]
fn close_is_idempotent_and_blocks_mutation() {
    let dir = tempdir().unwrap();
    let mut array = BigArray::open(small_config(dir.path(), "closed")).unwrap();

    array.append(b"x").unwrap();
    array.close().unwrap();
    array.close().unwrap();

    assert!(array.append(b"y").is_err());
    assert!(array.shift().is_err());
}

#[test]
fn invalid_configuration_is_rejected_at_construction() {
    let dir = tempdir().unwrap();

    let err = BigArray::open(
        ArrayConfig::new(dir.path(), "badpage").data_page_size(1024),
    )
    .unwrap_err();
    assert!(ArrayError::is_invalid_configuration(&err));

    let err = BigArray::open(
        ArrayConfig::new(dir.path(), "badmax").max_data_size_mb(0),
    )
    .unwrap_err();
    assert!(ArrayError::is_invalid_configuration(&err));
}
