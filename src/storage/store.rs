//! # Page Store
//!
//! A [`PageStore`] manages every same-sized page in one directory: lazy
//! creation of zero-filled page files, a bounded resident cache, bulk
//! deletion, and backing-size accounting.
//!
//! ## Cache
//!
//! The cache bounds residency two ways:
//!
//! - **Capacity**: at most `capacity` mapped pages; inserting past that evicts
//!   the least-recently-used entry.
//! - **TTL**: pages untouched for longer than `ttl` are expired on the next
//!   `acquire`.
//!
//! Eviction always flushes and closes the victim *before* the replacement
//! mapping is created, so a store never holds more than `capacity` live
//! mappings. While an entry is cached, every `acquire` of its page number
//! returns the same `Arc<Page>` instance.
//!
//! `release` does not close anything: it demotes the entry to the cold end of
//! the recency order, making it first in line for eviction.
//!
//! ## Deletion
//!
//! Deletes evict the page from the cache (flush+close) and then remove the
//! backing file, retrying transient failures a few times with a short fixed
//! backoff before surfacing the error. A missing file counts as deleted. Batch
//! deletes fail fast on the first error; files already removed stay removed.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::{Result, WrapErr};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::page::Page;
use super::{PAGE_FILE_PREFIX, PAGE_FILE_SUFFIX};

/// Attempts made to remove a page file before surfacing the error.
pub(crate) const DELETE_RETRY_ATTEMPTS: u32 = 5;
/// Fixed pause between delete attempts.
pub(crate) const DELETE_RETRY_BACKOFF: Duration = Duration::from_millis(100);

struct CacheEntry {
    page: Arc<Page>,
    last_access: Instant,
}

/// LRU order plus TTL stamps. `order[0]` is the coldest entry.
struct PageCache {
    capacity: usize,
    ttl: Duration,
    order: Vec<u64>,
    entries: HashMap<u64, CacheEntry>,
}

impl PageCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            order: Vec::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    fn get(&mut self, index: u64) -> Option<Arc<Page>> {
        let entry = self.entries.get_mut(&index)?;
        entry.last_access = Instant::now();
        let page = Arc::clone(&entry.page);
        self.move_to_back(index);
        Some(page)
    }

    fn insert(&mut self, index: u64, page: Arc<Page>) {
        self.entries.insert(
            index,
            CacheEntry {
                page,
                last_access: Instant::now(),
            },
        );
        self.move_to_back(index);
    }

    fn remove(&mut self, index: u64) -> Option<Arc<Page>> {
        if let Some(pos) = self.order.iter().position(|&i| i == index) {
            self.order.remove(pos);
        }
        self.entries.remove(&index).map(|e| e.page)
    }

    fn move_to_back(&mut self, index: u64) {
        if let Some(pos) = self.order.iter().position(|&i| i == index) {
            self.order.remove(pos);
        }
        self.order.push(index);
    }

    fn move_to_front(&mut self, index: u64) {
        if let Some(pos) = self.order.iter().position(|&i| i == index) {
            self.order.remove(pos);
            self.order.insert(0, index);
        }
    }

    fn pop_coldest(&mut self) -> Option<Arc<Page>> {
        if self.order.is_empty() {
            return None;
        }
        let index = self.order.remove(0);
        self.entries.remove(&index).map(|e| e.page)
    }

    fn take_expired(&mut self, now: Instant) -> Vec<Arc<Page>> {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_access) > self.ttl)
            .map(|(&i, _)| i)
            .collect();
        expired.into_iter().filter_map(|i| self.remove(i)).collect()
    }

    fn pages(&self) -> Vec<Arc<Page>> {
        self.entries.values().map(|e| Arc::clone(&e.page)).collect()
    }

    fn clear(&mut self) -> Vec<Arc<Page>> {
        self.order.clear();
        self.entries.drain().map(|(_, e)| e.page).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Lazily materializes fixed-size memory-mapped pages backed by index-named
/// files in one directory, bounding residency with a capacity+TTL cache.
pub struct PageStore {
    dir: PathBuf,
    page_size: u64,
    cache: Mutex<PageCache>,
}

impl PageStore {
    /// Opens a store over `dir`, creating the directory (recursively) if
    /// needed. `page_size` is the exact size of every page file in it.
    pub fn open(
        dir: impl AsRef<Path>,
        page_size: u64,
        capacity: usize,
        ttl: Duration,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("failed to create page directory '{}'", dir.display()))?;
        Ok(Self {
            dir,
            page_size,
            cache: Mutex::new(PageCache::new(capacity, ttl)),
        })
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, index: u64) -> PathBuf {
        self.dir
            .join(format!("{PAGE_FILE_PREFIX}{index}{PAGE_FILE_SUFFIX}"))
    }

    /// Returns the page, materializing file and mapping on a cache miss.
    ///
    /// A hit refreshes recency and returns the cached instance; concurrent
    /// callers observe the same `Arc<Page>` while it stays cached. Expired and
    /// capacity-evicted victims are flushed and closed before the new mapping
    /// is created.
    pub fn acquire(&self, index: u64) -> Result<Arc<Page>> {
        let mut cache = self.cache.lock();

        for expired in cache.take_expired(Instant::now()) {
            trace!(dir = %self.dir.display(), page = expired.index(), "closing expired page");
            expired.close()?;
        }

        if let Some(page) = cache.get(index) {
            return Ok(page);
        }

        while cache.len() >= cache.capacity {
            match cache.pop_coldest() {
                Some(victim) => {
                    trace!(dir = %self.dir.display(), page = victim.index(), "evicting page");
                    victim.close()?;
                }
                None => break,
            }
        }

        let path = self.file_path(index);
        trace!(path = %path.display(), "acquiring page");
        let page = Arc::new(Page::open(&path, index, self.page_size)?);
        cache.insert(index, Arc::clone(&page));
        Ok(page)
    }

    /// Demotes the page to the cold end of the recency order. Does not close
    /// it; eviction stays cache-driven.
    pub fn release(&self, index: u64) {
        self.cache.lock().move_to_front(index);
    }

    /// Evicts the page if resident and removes its backing file.
    pub fn delete_page(&self, index: u64) -> Result<()> {
        if let Some(page) = self.cache.lock().remove(index) {
            page.close()?;
        }
        self.delete_file(&self.file_path(index))
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        let mut attempt = 1;
        loop {
            match fs::remove_file(path) {
                Ok(()) => {
                    trace!(path = %path.display(), "deleted page file");
                    return Ok(());
                }
                // Someone already removed it; retirement is idempotent.
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) if attempt < DELETE_RETRY_ATTEMPTS => {
                    debug!(
                        path = %path.display(),
                        attempt,
                        error = %err,
                        "page delete failed, retrying"
                    );
                    attempt += 1;
                    std::thread::sleep(DELETE_RETRY_BACKOFF);
                }
                Err(err) => {
                    return Err(err).wrap_err_with(|| {
                        format!(
                            "failed to delete page file '{}' after {} attempts",
                            path.display(),
                            DELETE_RETRY_ATTEMPTS
                        )
                    });
                }
            }
        }
    }

    /// Deletes the given pages, failing fast on the first error. Pages already
    /// deleted before a failure stay deleted.
    pub fn delete_pages(&self, indexes: &[u64]) -> Result<()> {
        for &index in indexes {
            self.delete_page(index)?;
        }
        Ok(())
    }

    /// Deletes every existing page whose number falls inside any of `ranges`
    /// (inclusive bounds).
    pub fn delete_pages_in_ranges(&self, ranges: &[RangeInclusive<u64>]) -> Result<()> {
        let doomed: Vec<u64> = self
            .list_backing_indexes()?
            .into_iter()
            .filter(|index| ranges.iter().any(|range| range.contains(index)))
            .collect();
        if !doomed.is_empty() {
            debug!(dir = %self.dir.display(), count = doomed.len(), "deleting pages in ranges");
        }
        self.delete_pages(&doomed)
    }

    /// Clears the cache and deletes every page file in the directory.
    pub fn delete_all_pages(&self) -> Result<()> {
        for page in self.cache.lock().clear() {
            page.close()?;
        }
        let indexes = self.list_backing_indexes()?;
        self.delete_pages(&indexes)
    }

    /// Flushes every cached page, failing fast.
    pub fn flush(&self) -> Result<()> {
        let pages = self.cache.lock().pages();
        for page in pages {
            page.flush()?;
        }
        Ok(())
    }

    /// Flushes, closes, and drops every cached page.
    pub fn close_all(&self) -> Result<()> {
        for page in self.cache.lock().clear() {
            page.close()?;
        }
        Ok(())
    }

    /// Number of pages currently resident.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Sum of the on-disk sizes of every page file in the directory,
    /// independent of cache residency.
    pub fn backing_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for entry in fs::read_dir(&self.dir)
            .wrap_err_with(|| format!("failed to read page directory '{}'", self.dir.display()))?
        {
            let entry = entry
                .wrap_err_with(|| format!("failed to scan page directory '{}'", self.dir.display()))?;
            if parse_page_index(&entry.file_name().to_string_lossy()).is_some() {
                let metadata = entry.metadata().wrap_err_with(|| {
                    format!("failed to stat page file '{}'", entry.path().display())
                })?;
                total += metadata.len();
            }
        }
        Ok(total)
    }

    /// Page numbers parsed from the directory's file names.
    pub fn list_backing_indexes(&self) -> Result<Vec<u64>> {
        let mut indexes = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .wrap_err_with(|| format!("failed to read page directory '{}'", self.dir.display()))?
        {
            let entry = entry
                .wrap_err_with(|| format!("failed to scan page directory '{}'", self.dir.display()))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            match parse_page_index(&name) {
                Some(index) => indexes.push(index),
                None => {
                    if name.ends_with(PAGE_FILE_SUFFIX) {
                        warn!(file = %name, dir = %self.dir.display(), "ignoring unparsable page file name");
                    }
                }
            }
        }
        Ok(indexes)
    }
}

impl std::fmt::Debug for PageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStore")
            .field("dir", &self.dir)
            .field("page_size", &self.page_size)
            .field("cached", &self.cached_len())
            .finish()
    }
}

fn parse_page_index(file_name: &str) -> Option<u64> {
    let stem = file_name
        .strip_prefix(PAGE_FILE_PREFIX)?
        .strip_suffix(PAGE_FILE_SUFFIX)?;
    stem.parse().ok()
}
