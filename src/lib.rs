//! # bigring - Persistent Memory-Mapped Circular Array
//!
//! bigring is a disk-backed circular array with a durable FIFO queue facade,
//! built for datasets larger than available memory. This implementation
//! prioritizes:
//!
//! - **Near-O(1) operations**: sequential append and read cost one record
//!   write/read against a mapped page; random read adds at most one page fault
//! - **Bounded memory**: fixed-size pages swap in and out of a capacity+TTL
//!   cache no matter how large the on-disk footprint grows
//! - **Crash-consistent persistence**: all state lives in memory-mapped page
//!   files; an explicit flush makes it durable
//!
//! ## Quick Start
//!
//! ```ignore
//! use bigring::{ArrayConfig, BigQueue};
//!
//! let queue = BigQueue::open(ArrayConfig::new("/var/lib/myapp", "events"))?;
//!
//! queue.enqueue(b"hello")?;
//! queue.enqueue(b"world")?;
//!
//! assert_eq!(queue.dequeue()?.as_deref(), Some(&b"hello"[..]));
//! queue.flush()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │       FIFO Facade (BigQueue)        │
//! ├─────────────────────────────────────┤
//! │  Circular State Machine (BigArray)  │
//! │  head/tail cursors · space · GC     │
//! ├─────────────────────────────────────┤
//! │  Page Stores (index · data · meta)  │
//! │  bounded cache · file lifecycle     │
//! ├─────────────────────────────────────┤
//! │  Mapped Pages + Fixed-Width Codec   │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! An array named `events` under `/var/lib/myapp` owns:
//!
//! ```text
//! /var/lib/myapp/events/
//! ├── index/page-<n>.dat      # 32-byte records addressing each entry
//! ├── data/page-<n>.dat       # payload bytes (128 MiB pages by default)
//! └── meta_data/page-0.dat    # persisted head and tail cursors
//! ```
//!
//! ## Concurrency Model
//!
//! [`BigArray`] is a single-writer state machine (`&mut self`); [`BigQueue`]
//! wraps it in a lock for concurrent in-process workers. Separate processes
//! may open the same directory — mapped writes travel through the OS page
//! cache — but no cross-process locking is provided: serialize writers
//! externally and use `sync()` to refresh cursors.
//!
//! ## Module Overview
//!
//! - [`storage`]: memory-mapped pages and the bounded page store
//! - [`array`]: the circular array, cursor math, garbage collection
//! - [`queue`]: the FIFO facade
//! - [`codec`]: fixed-width cursor codec used for all on-disk records
//! - [`config`]: construction options and geometry normalization
//! - [`error`]: distinguishable failure markers

#[macro_use]
mod macros;

pub mod array;
pub mod codec;
pub mod config;
pub mod error;
pub mod queue;
pub mod storage;

pub use array::BigArray;
pub use config::ArrayConfig;
pub use error::ArrayError;
pub use queue::BigQueue;
