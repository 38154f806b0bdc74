//! Circular index arithmetic.
//!
//! Logical indexes live in `[0, max_index)` and wrap modulo `max_index`. One
//! slot is permanently reserved to disambiguate full from empty, so usable
//! capacity is `max_index - 1`. The functions here are pure and state-free;
//! every cursor decision in the array funnels through them.

use std::sync::atomic::{AtomicU64, Ordering};

/// The index after `index`, wrapping at `max_index`.
#[inline]
pub fn next_index(index: u64, max_index: u64) -> u64 {
    debug_assert!(index < max_index);
    let next = index + 1;
    if next == max_index {
        0
    } else {
        next
    }
}

/// The index before `index`, wrapping at `max_index`.
#[inline]
pub fn prev_index(index: u64, max_index: u64) -> u64 {
    if index == 0 {
        max_index - 1
    } else {
        index - 1
    }
}

/// True when `index` lies in the circular half-open range `[tail, head)`.
#[inline]
pub fn is_valid_index(index: u64, tail: u64, head: u64) -> bool {
    if tail <= head {
        tail <= index && index < head
    } else {
        index >= tail || index < head
    }
}

/// Snapshot of the cursors the garbage collector works from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CursorSnapshot {
    pub head: u64,
    pub tail: u64,
    pub head_data_page: u64,
    pub tail_data_page: u64,
}

/// Cursor state shared between the array and its background worker.
///
/// The array publishes after every cursor mutation; the worker reads a
/// snapshot when a deferred collection pass runs. Tail and head only advance,
/// so a page outside the live span at publish time stays dead.
#[derive(Debug)]
pub(crate) struct CursorCell {
    head: AtomicU64,
    tail: AtomicU64,
    head_data_page: AtomicU64,
    tail_data_page: AtomicU64,
}

impl CursorCell {
    pub fn new() -> Self {
        Self {
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            head_data_page: AtomicU64::new(0),
            tail_data_page: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, head: u64, tail: u64, head_data_page: u64, tail_data_page: u64) {
        self.head.store(head, Ordering::Release);
        self.tail.store(tail, Ordering::Release);
        self.head_data_page.store(head_data_page, Ordering::Release);
        self.tail_data_page.store(tail_data_page, Ordering::Release);
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        CursorSnapshot {
            head: self.head.load(Ordering::Acquire),
            tail: self.tail.load(Ordering::Acquire),
            head_data_page: self.head_data_page.load(Ordering::Acquire),
            tail_data_page: self.tail_data_page.load(Ordering::Acquire),
        }
    }
}
