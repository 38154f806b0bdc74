//! # BigQueue — Durable FIFO Queue
//!
//! A thin, thread-safe FIFO facade over [`BigArray`]: enqueue appends at the
//! head, dequeue shifts from the tail. All persistence, paging, space
//! accounting, and garbage collection behavior is the array's; the queue adds
//! a lock so multiple in-process workers can share one handle.
//!
//! ```ignore
//! let queue = BigQueue::open(ArrayConfig::new("/var/lib/myapp", "jobs"))?;
//! queue.enqueue(b"job-1")?;
//! queue.enqueue(b"job-2")?;
//! assert_eq!(queue.dequeue()?.as_deref(), Some(&b"job-1"[..]));
//! queue.flush()?;
//! ```

use eyre::Result;
use parking_lot::Mutex;

use crate::array::cursor::next_index;
use crate::array::BigArray;
use crate::config::ArrayConfig;

/// A persistent FIFO queue backed by a [`BigArray`].
pub struct BigQueue {
    array: Mutex<BigArray>,
}

impl BigQueue {
    /// Opens (or creates) the queue stored under the configured directory.
    pub fn open(config: ArrayConfig) -> Result<Self> {
        Ok(Self {
            array: Mutex::new(BigArray::open(config)?),
        })
    }

    /// Appends an entry at the back of the queue; returns its logical index.
    pub fn enqueue(&self, data: &[u8]) -> Result<u64> {
        self.array.lock().append(data)
    }

    /// Removes and returns the front entry, or `None` when empty.
    pub fn dequeue(&self) -> Result<Option<Vec<u8>>> {
        self.array.lock().shift()
    }

    /// The front entry without removing it, or `None` when empty.
    pub fn peek(&self) -> Result<Option<Vec<u8>>> {
        self.array.lock().peek()
    }

    pub fn size(&self) -> u64 {
        self.array.lock().size()
    }

    pub fn is_empty(&self) -> bool {
        self.array.lock().is_empty()
    }

    /// Visits every live entry in FIFO order. The queue stays locked for the
    /// whole walk; other callers block until it finishes.
    pub fn for_each<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(u64, &[u8]) -> Result<()>,
    {
        let array = self.array.lock();
        let head = array.head_index();
        let max_index = array.max_index();
        let mut index = array.tail_index();
        while index != head {
            let entry = array.get(index)?;
            visit(index, &entry)?;
            index = next_index(index, max_index);
        }
        Ok(())
    }

    /// Re-reads the persisted cursors; see [`BigArray::sync`].
    pub fn sync(&self) -> Result<()> {
        self.array.lock().sync()
    }

    /// Flushes every cached page to disk.
    pub fn flush(&self) -> Result<()> {
        self.array.lock().flush()
    }

    /// Flushes, unmaps, and stops background work. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.array.lock().close()
    }

    /// Deletes everything on disk and resets the queue to empty.
    pub fn remove_all(&self) -> Result<()> {
        self.array.lock().remove_all()
    }

    /// Combined on-disk footprint of the queue's page files.
    pub fn backing_size(&self) -> Result<u64> {
        self.array.lock().backing_size()
    }
}

impl std::fmt::Debug for BigQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueue").finish_non_exhaustive()
    }
}
