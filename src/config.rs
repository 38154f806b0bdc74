//! # Construction Configuration
//!
//! [`ArrayConfig`] collects everything a [`BigArray`](crate::BigArray) can be
//! opened with and normalizes it into the internal geometry. Normalization
//! happens once, at construction:
//!
//! - the data page size is rounded **down** to an OS page multiple and rejected
//!   below the minimum,
//! - the data-size ceiling is given in MB, rounded down to a multiple of the
//!   minimum data page size, and rejected below that minimum,
//! - the maximum number of data files is derived as `max_data_size / data_page_size`.
//!
//! Validation failures carry the
//! [`ArrayError::InvalidConfiguration`](crate::ArrayError) marker and are only
//! raised here; past construction the geometry is immutable.
//!
//! The minimum-page-size and items-per-page-bits overrides exist so tests can
//! exercise page rollover, wraparound, and garbage collection without writing
//! gigabytes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::Result;

use crate::error::ArrayError;

/// Default size in bytes of a data page.
pub const DEFAULT_DATA_PAGE_SIZE: u64 = 128 * 1024 * 1024;

/// Minimum size in bytes of a data page.
pub const MINIMUM_DATA_PAGE_SIZE: u64 = 32 * 1024 * 1024;

/// Default number of index records per index page, as a power of two.
/// 2^20 records of 32 bytes each put an index page at 32 MiB.
pub const DEFAULT_INDEX_ITEMS_PER_PAGE_BITS: u32 = 20;

/// Default number of oldest entries evicted per backlog pass when an append
/// runs out of space and a backlog callback is configured.
pub const DEFAULT_BACKLOG_BATCH_SIZE: usize = 10;

/// Default number of resident pages per store before the cache evicts.
pub const DEFAULT_PAGE_CACHE_CAPACITY: usize = 16;

/// Default time-to-live of an untouched cached page.
pub const DEFAULT_PAGE_CACHE_TTL: Duration = Duration::from_secs(20 * 60);

/// Callback receiving entries evicted to make room when the array is full.
pub type BacklogFn = Box<dyn FnMut(Vec<u8>) + Send + 'static>;

/// Granularity the OS maps pages at; data page sizes are rounded to it.
pub(crate) fn os_page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions; it returns -1 on unsupported
        // names, which we translate to the conventional 4 KiB fallback.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as u64;
        }
    }
    4096
}

/// Options for opening a [`BigArray`](crate::BigArray) or
/// [`BigQueue`](crate::BigQueue).
///
/// ```ignore
/// let array = BigArray::open(
///     ArrayConfig::new("/var/lib/myapp", "events")
///         .data_page_size(64 * 1024 * 1024)
///         .max_data_size_mb(4096),
/// )?;
/// ```
pub struct ArrayConfig {
    dir: PathBuf,
    name: String,
    data_page_size: u64,
    max_data_size_mb: Option<u64>,
    max_index: u64,
    min_data_page_size: u64,
    index_items_per_page_bits: u32,
    backlog: Option<BacklogFn>,
    backlog_batch_size: usize,
    cache_capacity: usize,
    cache_ttl: Duration,
}

impl ArrayConfig {
    /// Starts a configuration for the array stored at `<dir>/<name>/`.
    pub fn new(dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.into(),
            data_page_size: DEFAULT_DATA_PAGE_SIZE,
            max_data_size_mb: None,
            max_index: u64::MAX,
            min_data_page_size: MINIMUM_DATA_PAGE_SIZE,
            index_items_per_page_bits: DEFAULT_INDEX_ITEMS_PER_PAGE_BITS,
            backlog: None,
            backlog_batch_size: DEFAULT_BACKLOG_BATCH_SIZE,
            cache_capacity: DEFAULT_PAGE_CACHE_CAPACITY,
            cache_ttl: DEFAULT_PAGE_CACHE_TTL,
        }
    }

    /// Size of one data page in bytes. Rounded down to an OS page multiple;
    /// rejected below the minimum data page size.
    pub fn data_page_size(mut self, bytes: u64) -> Self {
        self.data_page_size = bytes;
        self
    }

    /// Ceiling on total live data bytes, in MB. Unbounded when unset.
    pub fn max_data_size_mb(mut self, mb: u64) -> Self {
        self.max_data_size_mb = Some(mb);
        self
    }

    /// Ceiling on the logical index space; indexes wrap modulo this value.
    /// Defaults to the full u64 range. Usable capacity is one less.
    pub fn max_index(mut self, max_index: u64) -> Self {
        self.max_index = max_index;
        self
    }

    /// Overrides the minimum allowed data page size. Test hook: lets suites
    /// run with pages far smaller than the production minimum.
    pub fn override_min_data_page_size(mut self, bytes: u64) -> Self {
        self.min_data_page_size = bytes;
        self
    }

    /// Overrides the number of index records per index page (as a power of
    /// two). Test hook: small values make index-page rollover cheap to reach.
    pub fn index_items_per_page_bits(mut self, bits: u32) -> Self {
        self.index_items_per_page_bits = bits;
        self
    }

    /// Installs an overflow policy: when an append would run out of space the
    /// array evicts its oldest entries in batches and hands each to `backlog`
    /// instead of failing. Invoked from the array's background worker.
    pub fn backlog(mut self, backlog: impl FnMut(Vec<u8>) + Send + 'static) -> Self {
        self.backlog = Some(Box::new(backlog));
        self
    }

    /// Number of entries evicted per backlog pass.
    pub fn backlog_batch_size(mut self, batch_size: usize) -> Self {
        self.backlog_batch_size = batch_size;
        self
    }

    /// Number of resident pages the index and data stores each keep cached.
    pub fn cache_capacity(mut self, pages: usize) -> Self {
        self.cache_capacity = pages;
        self
    }

    /// Time-to-live of an untouched cached page.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub(crate) fn resolve(self) -> Result<ResolvedConfig> {
        let os_page = os_page_size();

        let data_page_size = (self.data_page_size / os_page) * os_page;
        if data_page_size < self.min_data_page_size {
            return Err(ArrayError::InvalidConfiguration(format!(
                "data page size {} (normalized from {}) is below the minimum {}",
                data_page_size, self.data_page_size, self.min_data_page_size
            ))
            .into());
        }
        if data_page_size > u32::MAX as u64 {
            return Err(ArrayError::InvalidConfiguration(format!(
                "data page size {} exceeds the u32 offset range of the index record format",
                data_page_size
            ))
            .into());
        }

        let max_data_size = match self.max_data_size_mb {
            Some(mb) => {
                let requested = mb.saturating_mul(1024 * 1024);
                if requested < self.min_data_page_size {
                    return Err(ArrayError::InvalidConfiguration(format!(
                        "max data size {} is below the minimum data page size {}",
                        requested, self.min_data_page_size
                    ))
                    .into());
                }
                (requested / self.min_data_page_size) * self.min_data_page_size
            }
            None => u64::MAX,
        };

        let max_data_files = max_data_size / data_page_size;
        if max_data_files == 0 {
            return Err(ArrayError::InvalidConfiguration(format!(
                "max data size {} is smaller than one data page of {}",
                max_data_size, data_page_size
            ))
            .into());
        }

        if self.max_index < 2 {
            return Err(ArrayError::InvalidConfiguration(format!(
                "max index {} leaves no usable capacity (one slot is reserved)",
                self.max_index
            ))
            .into());
        }

        if self.index_items_per_page_bits == 0 || self.index_items_per_page_bits > 30 {
            return Err(ArrayError::InvalidConfiguration(format!(
                "index items-per-page bits {} out of range 1..=30",
                self.index_items_per_page_bits
            ))
            .into());
        }

        if self.backlog_batch_size == 0 {
            return Err(ArrayError::InvalidConfiguration(
                "backlog batch size must be at least 1".into(),
            )
            .into());
        }

        if self.cache_capacity == 0 {
            return Err(ArrayError::InvalidConfiguration(
                "page cache capacity must be at least 1".into(),
            )
            .into());
        }

        Ok(ResolvedConfig {
            array_dir: self.dir.join(&self.name),
            data_page_size,
            max_data_size,
            max_data_files,
            max_index: self.max_index,
            index_items_per_page_bits: self.index_items_per_page_bits,
            backlog: self.backlog,
            backlog_batch_size: self.backlog_batch_size,
            cache_capacity: self.cache_capacity,
            cache_ttl: self.cache_ttl,
        })
    }
}

impl std::fmt::Debug for ArrayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayConfig")
            .field("dir", &self.dir)
            .field("name", &self.name)
            .field("data_page_size", &self.data_page_size)
            .field("max_data_size_mb", &self.max_data_size_mb)
            .field("max_index", &self.max_index)
            .field("index_items_per_page_bits", &self.index_items_per_page_bits)
            .field("backlog", &self.backlog.is_some())
            .field("backlog_batch_size", &self.backlog_batch_size)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

/// The normalized geometry a [`BigArray`](crate::BigArray) runs with.
pub(crate) struct ResolvedConfig {
    pub array_dir: PathBuf,
    pub data_page_size: u64,
    pub max_data_size: u64,
    pub max_data_files: u64,
    pub max_index: u64,
    pub index_items_per_page_bits: u32,
    pub backlog: Option<BacklogFn>,
    pub backlog_batch_size: usize,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("array_dir", &self.array_dir)
            .field("data_page_size", &self.data_page_size)
            .field("max_data_size", &self.max_data_size)
            .field("max_data_files", &self.max_data_files)
            .field("max_index", &self.max_index)
            .field("index_items_per_page_bits", &self.index_items_per_page_bits)
            .field("backlog", &self.backlog.is_some())
            .field("backlog_batch_size", &self.backlog_batch_size)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}
