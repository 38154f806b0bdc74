//! # Storage Module
//!
//! The paged storage layer underneath [`BigArray`](crate::BigArray): fixed-size
//! memory-mapped page files materialized on demand and kept resident in a
//! bounded cache.
//!
//! ## Architecture Overview
//!
//! The layer is built around memory-mapped I/O. Instead of copying data
//! between kernel and user space, each page file is mapped directly into the
//! process address space:
//!
//! - **Zero-copy access**: page views are slices into the mapping
//! - **Minimal syscall overhead**: page faults handled transparently by the OS
//! - **Shared caching**: the OS page cache backs every mapping, so separate
//!   processes mapping the same file observe each other's writes
//!
//! ## Directory Layout
//!
//! Each [`PageStore`] owns one directory of same-sized page files:
//!
//! ```text
//! array_dir/
//! ├── index/               # 32-byte index records, one per logical slot
//! │   ├── page-0.dat
//! │   └── page-1.dat
//! ├── data/                # raw payload bytes, appended sequentially
//! │   ├── page-0.dat
//! │   └── page-7.dat       # file names carry the page number; gaps are
//! │                        # normal once old pages are garbage collected
//! └── meta_data/
//!     └── page-0.dat       # 16 bytes: persisted head and tail cursors
//! ```
//!
//! Every page file is pre-allocated to exactly its store's page size and
//! zero-filled at creation.
//!
//! ## Residency Model
//!
//! A store caches at most `capacity` mapped pages and expires untouched pages
//! after a TTL. Eviction always flushes and unmaps the victim before the
//! replacement mapping is created, so the number of live mappings is bounded
//! no matter how large the on-disk footprint grows.
//!
//! ## Module Organization
//!
//! - `page`: one mapped region over one backing file ([`Page`], [`PageView`])
//! - `store`: per-directory lifecycle, caching, deletion, size accounting
//!   ([`PageStore`])
//!
//! ## Thread Safety
//!
//! [`Page`] and [`PageStore`] are internally synchronized (`Send + Sync`); the
//! array and its garbage-collection worker share them through `Arc`. Callers
//! must not hold a [`PageView`] across another store call on the same thread:
//! a view holds its page's lock, and eviction of that page would deadlock
//! against it.

mod page;
mod store;

pub use page::{Page, PageView};
pub use store::PageStore;

/// Page file names are `page-<n>.dat`, where `<n>` is the page number.
pub const PAGE_FILE_PREFIX: &str = "page-";
/// Extension shared by every page file.
pub const PAGE_FILE_SUFFIX: &str = ".dat";
