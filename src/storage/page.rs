//! # Memory-Mapped Page
//!
//! A [`Page`] owns one read-write memory mapping over one backing file. Pages
//! are created and cached by [`PageStore`](super::PageStore); the array never
//! constructs them directly.
//!
//! ## Lifecycle
//!
//! ```text
//! open    file created (zero-filled to the page size) if absent, then mapped
//! view    cursor-positioned byte window, clamped to the mapped region
//! flush   msync when dirty, then clear the dirty flag
//! close   flush, then unmap; idempotent
//! ```
//!
//! Writes through a view mark the page dirty. Dirty bytes are visible to other
//! in-process readers immediately (same mapping) and to other processes via
//! the OS page cache, but are durable against a crash only once `flush` has
//! run.
//!
//! ## Locking
//!
//! The mapping lives behind a `Mutex` because the cache shares pages as
//! `Arc<Page>` between the array and its garbage-collection worker. A
//! [`PageView`] holds that lock for its lifetime, so `close` on one thread
//! blocks until views on other threads drop — an evicted page is never yanked
//! out from under a live view. The flip side: never hold a view while calling
//! back into the owning store.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;
use parking_lot::{Mutex, MutexGuard};

use crate::codec::{ByteReader, ByteWriter};

struct PageState {
    mmap: Option<MmapMut>,
    dirty: bool,
}

/// One fixed-size memory-mapped region backed by one page file.
pub struct Page {
    index: u64,
    path: PathBuf,
    len: usize,
    state: Mutex<PageState>,
}

impl Page {
    /// Opens the page file at `path`, creating and zero-filling it to exactly
    /// `page_size` bytes when absent, and maps it read-write.
    pub(crate) fn open(path: &Path, index: u64, page_size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open page file '{}'", path.display()))?;

        let metadata = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?;

        if metadata.len() != page_size {
            file.set_len(page_size).wrap_err_with(|| {
                format!(
                    "failed to size page file '{}' to {} bytes",
                    path.display(),
                    page_size
                )
            })?;
        }

        // SAFETY: MmapMut::map_mut is unsafe because a mapped file can be
        // modified externally. This is safe because:
        // 1. The file is opened read-write and sized to page_size before mapping
        // 2. The mapping's lifetime is tied to PageState, preventing use-after-unmap
        // 3. All access goes through view(), which bounds-clamps to the region
        // 4. Cross-process writers share the format's append-only discipline
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            index,
            path: path.to_path_buf(),
            len: page_size as usize,
            state: Mutex::new(PageState {
                mmap: Some(mmap),
                dirty: false,
            }),
        })
    }

    /// The page number within its store.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Size of the mapped region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A cursor-positioned byte window starting at `offset`, clamped to the
    /// mapped region. Fails if the page has been closed.
    pub fn view(&self, offset: usize, len: usize) -> Result<PageView<'_>> {
        let guard = self.state.lock();
        ensure!(
            guard.mmap.is_some(),
            "page {} ('{}') is closed",
            self.index,
            self.path.display()
        );
        let start = offset.min(self.len);
        let end = offset.saturating_add(len).min(self.len);
        Ok(PageView { guard, start, end })
    }

    /// A view over the whole mapped region.
    pub fn full_view(&self) -> Result<PageView<'_>> {
        self.view(0, self.len)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.state.lock().dirty = dirty;
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Synchronizes the mapping with its backing file when dirty.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut PageState) -> Result<()> {
        if state.dirty {
            if let Some(mmap) = state.mmap.as_ref() {
                mmap.flush().wrap_err_with(|| {
                    format!(
                        "failed to flush page {} ('{}')",
                        self.index,
                        self.path.display()
                    )
                })?;
            }
            state.dirty = false;
        }
        Ok(())
    }

    /// Flushes, then unmaps. Idempotent; later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.mmap.is_none() {
            return Ok(());
        }
        self.flush_locked(&mut state)?;
        state.mmap = None;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().mmap.is_none()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}

/// A borrowed byte window into a mapped page. Holds the page lock; mutable
/// access marks the page dirty.
pub struct PageView<'a> {
    guard: MutexGuard<'a, PageState>,
    start: usize,
    end: usize,
}

impl PageView<'_> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn bytes(&self) -> &[u8] {
        let mmap = self
            .guard
            .mmap
            .as_ref()
            .expect("mapping present while view held"); // INVARIANT: view() checked the mapping and the lock has been held since
        &mmap[self.start..self.end]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.guard.dirty = true;
        let (start, end) = (self.start, self.end);
        let mmap = self
            .guard
            .mmap
            .as_mut()
            .expect("mapping present while view held"); // INVARIANT: view() checked the mapping and the lock has been held since
        &mut mmap[start..end]
    }

    /// Cursor reader over the window.
    pub fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(self.bytes())
    }

    /// Cursor writer over the window. Marks the page dirty.
    pub fn writer(&mut self) -> ByteWriter<'_> {
        ByteWriter::new(self.bytes_mut())
    }

    /// Copies the window out of the mapping.
    pub fn copy_out(&self) -> Vec<u8> {
        self.bytes().to_vec()
    }
}
