//! # BigArray — Persistent Circular Array
//!
//! A disk-backed circular array supporting sequential append, sequential and
//! random read, and bulk retirement of old entries. It is the foundation the
//! [`BigQueue`](crate::BigQueue) facade builds FIFO semantics on.
//!
//! ## How an entry is stored
//!
//! Three page stores cooperate:
//!
//! ```text
//! meta_data/page-0.dat     16 bytes: head and tail cursors (big-endian u64s)
//! index/page-<n>.dat       one 32-byte record per logical slot
//! data/page-<n>.dat        raw payload bytes, appended sequentially
//! ```
//!
//! An append writes the payload at the head data cursor, then writes an index
//! record addressing it (data page, offset, length, wall-clock timestamp),
//! then advances and persists the head. A read resolves the logical index to
//! its record and copies the referenced bytes back out. Payloads never span
//! two data pages: when the current page cannot hold the payload, the head
//! moves to the next page (wrapping modulo the data-file limit) at offset 0.
//!
//! ## Index record layout (32 bytes, 24 used)
//!
//! ```text
//! Offset  Size  Field              Encoding
//! ------  ----  -----------------  ---------------
//! 0       8     data_page_index    u64 big-endian
//! 8       4     data_item_offset   u32 big-endian
//! 12      4     data_item_length   u32 big-endian
//! 16      8     timestamp_millis   u64 big-endian
//! 24      8     reserved           zero
//! ```
//!
//! ## Cursors
//!
//! Only head and tail are persisted. The data-side cursors are re-derived on
//! load: the head data position from the record *before* head, the tail data
//! position from the record *at* tail. `head == tail` means empty; one logical
//! slot stays reserved so a full ring is distinguishable.
//!
//! ## Retirement
//!
//! `shift` advances the tail past the oldest entry. When that crossing leaves
//! an index page behind, a coalesced garbage-collection pass is scheduled on
//! the background worker; it deletes every index and data page file outside
//! the live circular span. `remove_before_index` retires in bulk and collects
//! synchronously.
//!
//! ## Durability and visibility
//!
//! Mapped writes are visible to in-process readers immediately and to other
//! processes through the OS page cache; they are durable against a crash only
//! after [`BigArray::flush`]. Cached head/tail cursors are refreshed only by
//! [`BigArray::sync`] (and construction) — a process that shares the
//! directory with concurrent writers must serialize them externally.

pub mod cursor;
mod gc;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use eyre::{ensure, Result};
use tracing::{debug, trace, warn};

use crate::codec::{ByteReader, ByteWriter};
use crate::config::{ArrayConfig, ResolvedConfig};
use crate::error::ArrayError;
use crate::storage::PageStore;
use cursor::{next_index, prev_index, CursorCell};
use gc::GcContext;
use worker::Worker;

/// Width of one index record as a power of two.
pub(crate) const INDEX_ITEM_LENGTH_BITS: u32 = 5;
/// Width in bytes of one index record.
pub(crate) const INDEX_ITEM_LENGTH: u64 = 1 << INDEX_ITEM_LENGTH_BITS;
/// Size in bytes of the meta page: two big-endian u64 cursors.
pub(crate) const META_PAGE_SIZE: u64 = 16;

const INDEX_DIR: &str = "index";
const DATA_DIR: &str = "data";
const META_DIR: &str = "meta_data";
const META_PAGE_INDEX: u64 = 0;

/// One on-disk index record addressing a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexRecord {
    pub data_page_index: u64,
    pub data_item_offset: u32,
    pub data_item_length: u32,
    pub timestamp_millis: u64,
}

impl IndexRecord {
    pub const LEN: usize = INDEX_ITEM_LENGTH as usize;

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            data_page_index: reader.get_u64_be()?,
            data_item_offset: reader.get_u32_be()?,
            data_item_length: reader.get_u32_be()?,
            timestamp_millis: reader.get_u64_be()?,
        })
    }

    fn encode(&self, writer: &mut ByteWriter<'_>) -> Result<()> {
        writer.put_u64_be(self.data_page_index)?;
        writer.put_u32_be(self.data_item_offset)?;
        writer.put_u32_be(self.data_item_length)?;
        writer.put_u64_be(self.timestamp_millis)?;
        Ok(())
    }
}

/// A persistent, memory-mapped circular array.
///
/// Mutating operations take `&mut self`; wrap the array in a lock for
/// concurrent in-process use (that is exactly what [`BigQueue`](crate::BigQueue)
/// does).
pub struct BigArray {
    array_dir: PathBuf,
    max_index: u64,
    data_page_size: u64,
    max_data_size: u64,
    max_data_files: u64,
    index_items_per_page_bits: u32,
    backlog_batch_size: usize,
    has_backlog: bool,

    index_store: Arc<PageStore>,
    data_store: Arc<PageStore>,
    meta_store: Arc<PageStore>,

    head: u64,
    tail: u64,
    head_data_page: u64,
    head_data_offset: u32,
    tail_data_page: u64,
    tail_data_offset: u32,

    cursors: Arc<CursorCell>,
    worker: Worker,
    closed: bool,
}

impl BigArray {
    /// Opens (or creates) the array stored under the configured directory and
    /// re-derives every cursor from the meta page and index records.
    pub fn open(config: ArrayConfig) -> Result<Self> {
        let resolved = config.resolve()?;
        Self::open_resolved(resolved)
    }

    fn open_resolved(resolved: ResolvedConfig) -> Result<Self> {
        let ResolvedConfig {
            array_dir,
            data_page_size,
            max_data_size,
            max_data_files,
            max_index,
            index_items_per_page_bits,
            backlog,
            backlog_batch_size,
            cache_capacity,
            cache_ttl,
        } = resolved;

        debug!(dir = %array_dir.display(), data_page_size, max_data_size, "opening big array");

        let index_page_size = INDEX_ITEM_LENGTH << index_items_per_page_bits;
        let index_store = Arc::new(PageStore::open(
            array_dir.join(INDEX_DIR),
            index_page_size,
            cache_capacity,
            cache_ttl,
        )?);
        let data_store = Arc::new(PageStore::open(
            array_dir.join(DATA_DIR),
            data_page_size,
            cache_capacity,
            cache_ttl,
        )?);
        // The meta store only ever holds page 0; keep it pinned by capacity.
        let meta_store = Arc::new(PageStore::open(
            array_dir.join(META_DIR),
            META_PAGE_SIZE,
            1,
            cache_ttl,
        )?);

        let cursors = Arc::new(CursorCell::new());
        let has_backlog = backlog.is_some();
        let worker = Worker::spawn(
            GcContext {
                index_store: Arc::clone(&index_store),
                data_store: Arc::clone(&data_store),
                cursors: Arc::clone(&cursors),
                max_index,
                index_items_per_page_bits,
                max_data_files,
            },
            backlog,
        )?;

        let mut array = Self {
            array_dir,
            max_index,
            data_page_size,
            max_data_size,
            max_data_files,
            index_items_per_page_bits,
            backlog_batch_size,
            has_backlog,
            index_store,
            data_store,
            meta_store,
            head: 0,
            tail: 0,
            head_data_page: 0,
            head_data_offset: 0,
            tail_data_page: 0,
            tail_data_offset: 0,
            cursors,
            worker,
            closed: false,
        };
        array.sync()?;
        Ok(array)
    }

    /// Re-reads head and tail from the meta page and re-derives the data-side
    /// cursors from the index records. The explicit cross-process sync point.
    pub fn sync(&mut self) -> Result<()> {
        self.load_meta_cursors()?;
        self.derive_head_data_cursor()?;
        self.derive_tail_data_cursor()?;
        self.publish_cursors();
        debug!(head = self.head, tail = self.tail, "cursors synced");
        Ok(())
    }

    fn load_meta_cursors(&mut self) -> Result<()> {
        let page = self.meta_store.acquire(META_PAGE_INDEX)?;
        let view = page.view(0, META_PAGE_SIZE as usize)?;
        let mut reader = view.reader();
        self.head = reader.get_u64_be()?;
        self.tail = reader.get_u64_be()?;
        Ok(())
    }

    /// The head data cursor is the byte after the most recently appended
    /// payload — the record before head, or the origin when empty.
    fn derive_head_data_cursor(&mut self) -> Result<()> {
        if self.is_empty() {
            self.head_data_page = 0;
            self.head_data_offset = 0;
            return Ok(());
        }
        let record = self.read_record(prev_index(self.head, self.max_index))?;
        let end = record.data_item_offset as u64 + record.data_item_length as u64;
        ensure!(
            end <= self.data_page_size,
            "index record before head addresses bytes past the data page ({} > {})",
            end,
            self.data_page_size
        );
        self.head_data_page = record.data_page_index;
        self.head_data_offset = end as u32;
        Ok(())
    }

    fn derive_tail_data_cursor(&mut self) -> Result<()> {
        if self.is_empty() {
            // Equal cursors make the live data distance zero.
            self.tail_data_page = self.head_data_page;
            self.tail_data_offset = self.head_data_offset;
            return Ok(());
        }
        let record = self.read_record(self.tail)?;
        self.tail_data_page = record.data_page_index;
        self.tail_data_offset = record.data_item_offset;
        Ok(())
    }

    fn publish_cursors(&self) {
        self.cursors
            .publish(self.head, self.tail, self.head_data_page, self.tail_data_page);
    }

    /// Appends `data` at the head and returns the logical index it landed on.
    ///
    /// Fails with an [`ArrayError::OutOfSpace`] marker when the index ring or
    /// the data ceiling is exhausted — unless a backlog callback is
    /// configured, in which case the oldest entries are evicted in batches
    /// until the append fits.
    pub fn append(&mut self, data: &[u8]) -> Result<u64> {
        ensure!(!self.closed, "array is closed");
        ensure!(
            data.len() as u64 <= self.data_page_size,
            "payload of {} bytes cannot fit one data page of {} bytes",
            data.len(),
            self.data_page_size
        );

        self.reserve_space(data.len() as u64)?;

        // Payloads never span two data pages.
        if self.head_data_offset as u64 + data.len() as u64 > self.data_page_size {
            self.head_data_page = next_index(self.head_data_page, self.max_data_files);
            self.head_data_offset = 0;
            debug!(page = self.head_data_page, "data head moved to next page");
        }

        let data_page_index = self.head_data_page;
        let data_item_offset = self.head_data_offset;

        let data_page = self.data_store.acquire(data_page_index)?;
        {
            let mut view = data_page.view(data_item_offset as usize, data.len())?;
            view.writer().put_bytes(data)?;
        }
        self.head_data_offset += data.len() as u32;

        let appended_at = self.head;
        let record = IndexRecord {
            data_page_index,
            data_item_offset,
            data_item_length: data.len() as u32,
            timestamp_millis: wall_clock_millis(),
        };
        self.write_record(appended_at, &record)?;

        self.head = next_index(self.head, self.max_index);
        self.persist_head()?;
        self.publish_cursors();

        trace!(index = appended_at, len = data.len(), "appended");
        Ok(appended_at)
    }

    /// Evicts oldest entries through the backlog until `incoming` bytes fit,
    /// or fails with the OutOfSpace marker.
    fn reserve_space(&mut self, incoming: u64) -> Result<()> {
        while self.is_full() || self.is_data_full(incoming) {
            if !self.has_backlog {
                let detail = if self.is_full() {
                    format!(
                        "index ring exhausted (head: {}, tail: {}, max: {})",
                        self.head, self.tail, self.max_index
                    )
                } else {
                    format!(
                        "data ceiling exhausted (live: {}, incoming: {}, max: {})",
                        self.data_size(),
                        incoming,
                        self.max_data_size
                    )
                };
                return Err(ArrayError::OutOfSpace(detail).into());
            }

            let mut evicted = 0usize;
            for _ in 0..self.backlog_batch_size {
                match self.shift()? {
                    Some(entry) => {
                        self.worker.push_backlog(entry);
                        evicted += 1;
                    }
                    None => break,
                }
            }
            if evicted == 0 {
                return Err(ArrayError::OutOfSpace(format!(
                    "payload of {} bytes cannot fit even with the array drained (max data size: {})",
                    incoming, self.max_data_size
                ))
                .into());
            }
            debug!(evicted, "evicted oldest entries to backlog");
        }
        Ok(())
    }

    /// Returns a copy of the entry at `index`. The index record is re-read on
    /// every call; cached cursors are never trusted for addressing.
    pub fn get(&self, index: u64) -> Result<Vec<u8>> {
        self.validate_index(index)?;
        let record = self.read_record(index)?;
        let page = self.data_store.acquire(record.data_page_index)?;
        let view = page.view(
            record.data_item_offset as usize,
            record.data_item_length as usize,
        )?;
        ensure!(
            view.len() == record.data_item_length as usize,
            "index record at {} addresses bytes past data page {}",
            index,
            record.data_page_index
        );
        Ok(view.copy_out())
    }

    /// Removes and returns the oldest entry, or `None` when empty. Schedules
    /// a deferred garbage-collection pass when the tail crossed off an index
    /// page.
    pub fn shift(&mut self) -> Result<Option<Vec<u8>>> {
        ensure!(!self.closed, "array is closed");
        if self.is_empty() {
            return Ok(None);
        }

        let data = self.get(self.tail)?;

        let next_tail = next_index(self.tail, self.max_index);
        let bits = self.index_items_per_page_bits;
        let crossed_page = (self.tail >> bits) != (next_tail >> bits);

        self.tail = next_tail;
        self.persist_tail()?;
        self.derive_tail_data_cursor()?;
        self.publish_cursors();

        if crossed_page {
            debug!(tail = self.tail, "tail crossed an index page, scheduling gc");
            self.worker.schedule_gc();
        }

        Ok(Some(data))
    }

    /// The oldest entry without removing it, or `None` when empty.
    pub fn peek(&self) -> Result<Option<Vec<u8>>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.get(self.tail).map(Some)
    }

    /// Payload length of the entry at `index`, without touching its data page.
    pub fn item_length(&self, index: u64) -> Result<u32> {
        self.validate_index(index)?;
        Ok(self.read_record(index)?.data_item_length)
    }

    /// Number of live entries.
    pub fn size(&self) -> u64 {
        if self.tail <= self.head {
            self.head - self.tail
        } else {
            self.max_index - self.tail + self.head
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// True when advancing the head by one would collide with the tail.
    pub fn is_full(&self) -> bool {
        next_index(self.head, self.max_index) == self.tail
    }

    /// Circular byte distance between the tail and head data positions.
    pub fn data_size(&self) -> u64 {
        let head_abs = self.head_data_page * self.data_page_size + self.head_data_offset as u64;
        let tail_abs = self.tail_data_page * self.data_page_size + self.tail_data_offset as u64;
        if tail_abs <= head_abs {
            head_abs - tail_abs
        } else {
            self.max_data_files * self.data_page_size - tail_abs + head_abs
        }
    }

    /// True when storing `pending` more bytes would cross the data ceiling
    /// (checked with a one-byte safety margin).
    pub fn is_data_full(&self, pending: u64) -> bool {
        self.data_size()
            .saturating_add(pending)
            .saturating_add(1)
            > self.max_data_size
    }

    /// Advances the tail directly to `index`, which must be valid or the
    /// position just past the live range, and purges newly dead pages
    /// synchronously.
    pub fn remove_before_index(&mut self, index: u64) -> Result<()> {
        ensure!(!self.closed, "array is closed");
        if index != self.head {
            self.validate_index(index)?;
        }

        debug!(index, tail = self.tail, "removing entries before index");
        self.tail = index;
        self.persist_tail()?;
        self.derive_tail_data_cursor()?;
        self.publish_cursors();

        self.gc()
    }

    /// Deletes every index and data page outside the live span right now.
    pub fn gc(&self) -> Result<()> {
        self.gc_context().collect()
    }

    fn gc_context(&self) -> GcContext {
        GcContext {
            index_store: Arc::clone(&self.index_store),
            data_store: Arc::clone(&self.data_store),
            cursors: Arc::clone(&self.cursors),
            max_index: self.max_index,
            index_items_per_page_bits: self.index_items_per_page_bits,
            max_data_files: self.max_data_files,
        }
    }

    /// Deletes every page file across all three stores and resets the array
    /// to its initial empty state.
    pub fn remove_all(&mut self) -> Result<()> {
        ensure!(!self.closed, "array is closed");
        debug!(dir = %self.array_dir.display(), "removing all array data");

        self.index_store.delete_all_pages()?;
        self.data_store.delete_all_pages()?;
        self.meta_store.delete_all_pages()?;

        self.head = 0;
        self.tail = 0;
        self.head_data_page = 0;
        self.head_data_offset = 0;
        self.tail_data_page = 0;
        self.tail_data_offset = 0;
        self.persist_head()?;
        self.persist_tail()?;
        self.publish_cursors();
        Ok(())
    }

    /// Flushes every cached page in all three stores.
    pub fn flush(&self) -> Result<()> {
        self.meta_store.flush()?;
        self.index_store.flush()?;
        self.data_store.flush()?;
        Ok(())
    }

    /// Stops the background worker and flushes, closes, and unmaps every
    /// cached page. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.worker.shutdown();
        self.meta_store.close_all()?;
        self.index_store.close_all()?;
        self.data_store.close_all()?;
        self.closed = true;
        Ok(())
    }

    /// Combined on-disk footprint of the index and data stores.
    pub fn backing_size(&self) -> Result<u64> {
        Ok(self.index_store.backing_size()? + self.data_store.backing_size()?)
    }

    pub fn head_index(&self) -> u64 {
        self.head
    }

    pub fn tail_index(&self) -> u64 {
        self.tail
    }

    pub fn max_index(&self) -> u64 {
        self.max_index
    }

    pub fn data_page_size(&self) -> u64 {
        self.data_page_size
    }

    pub fn array_dir(&self) -> &Path {
        &self.array_dir
    }

    fn validate_index(&self, index: u64) -> Result<()> {
        if !cursor::is_valid_index(index, self.tail, self.head) {
            return Err(ArrayError::IndexOutOfRange {
                index,
                tail: self.tail,
                head: self.head,
            }
            .into());
        }
        Ok(())
    }

    fn index_page_of(&self, index: u64) -> u64 {
        index >> self.index_items_per_page_bits
    }

    fn index_slot_offset(&self, index: u64) -> usize {
        let mask = (1u64 << self.index_items_per_page_bits) - 1;
        ((index & mask) << INDEX_ITEM_LENGTH_BITS) as usize
    }

    fn read_record(&self, index: u64) -> Result<IndexRecord> {
        let page = self.index_store.acquire(self.index_page_of(index))?;
        let view = page.view(self.index_slot_offset(index), IndexRecord::LEN)?;
        IndexRecord::decode(&mut view.reader())
    }

    fn write_record(&mut self, index: u64, record: &IndexRecord) -> Result<()> {
        let page = self.index_store.acquire(self.index_page_of(index))?;
        let mut view = page.view(self.index_slot_offset(index), IndexRecord::LEN)?;
        record.encode(&mut view.writer())
    }

    fn persist_head(&mut self) -> Result<()> {
        let page = self.meta_store.acquire(META_PAGE_INDEX)?;
        let mut view = page.view(0, 8)?;
        view.writer().put_u64_be(self.head)
    }

    fn persist_tail(&mut self) -> Result<()> {
        let page = self.meta_store.acquire(META_PAGE_INDEX)?;
        let mut view = page.view(8, 8)?;
        view.writer().put_u64_be(self.tail)
    }
}

impl Drop for BigArray {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                warn!(error = ?err, "failed to close array on drop");
            }
        }
    }
}

impl std::fmt::Debug for BigArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigArray")
            .field("dir", &self.array_dir)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("max_index", &self.max_index)
            .field("data_page_size", &self.data_page_size)
            .finish()
    }
}

/// Milliseconds since the unix epoch, for index record timestamps.
fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
