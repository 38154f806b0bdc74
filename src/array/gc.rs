//! Garbage collection of retired page files.
//!
//! Shifting the tail strands whole index and data pages behind it. A
//! collection pass computes the page numbers *strictly outside* the live
//! circular span and deletes their backing files. The pages holding the head
//! and tail cursors are always part of the live span and are never deleted.

use std::ops::RangeInclusive;
use std::sync::Arc;

use eyre::Result;
use tracing::debug;

use crate::array::cursor::{CursorCell, CursorSnapshot};
use crate::storage::PageStore;

/// The inclusive page ranges dead for a live circular span `[live_lo, live_hi]`
/// over pages `0..=max_page`.
///
/// When the span wraps (`live_lo > live_hi`), the dead pages are the single
/// middle stretch; otherwise they are the stretches on both sides.
pub(crate) fn dead_ranges(live_lo: u64, live_hi: u64, max_page: u64) -> Vec<RangeInclusive<u64>> {
    debug_assert!(live_lo <= max_page && live_hi <= max_page);
    let mut ranges = Vec::with_capacity(2);
    if live_lo <= live_hi {
        if live_hi < max_page {
            ranges.push(live_hi + 1..=max_page);
        }
        if live_lo > 0 {
            ranges.push(0..=live_lo - 1);
        }
    } else if live_hi + 1 <= live_lo - 1 {
        ranges.push(live_hi + 1..=live_lo - 1);
    }
    ranges
}

/// Everything a collection pass needs, detached from the array so the
/// background worker can run one without borrowing the array itself.
pub(crate) struct GcContext {
    pub index_store: Arc<PageStore>,
    pub data_store: Arc<PageStore>,
    pub cursors: Arc<CursorCell>,
    pub max_index: u64,
    pub index_items_per_page_bits: u32,
    pub max_data_files: u64,
}

impl GcContext {
    /// Deletes every index and data page outside the live span derived from
    /// the current cursor snapshot. No-op while the array is empty.
    pub fn collect(&self) -> Result<()> {
        let snapshot = self.cursors.snapshot();
        if snapshot.head == snapshot.tail {
            return Ok(());
        }

        let index_ranges = self.dead_index_ranges(&snapshot);
        if !index_ranges.is_empty() {
            self.index_store.delete_pages_in_ranges(&index_ranges)?;
        }

        let data_ranges = self.dead_data_ranges(&snapshot);
        if !data_ranges.is_empty() {
            self.data_store.delete_pages_in_ranges(&data_ranges)?;
        }

        debug!(
            head = snapshot.head,
            tail = snapshot.tail,
            "garbage collection pass finished"
        );
        Ok(())
    }

    fn dead_index_ranges(&self, snapshot: &CursorSnapshot) -> Vec<RangeInclusive<u64>> {
        let bits = self.index_items_per_page_bits;
        let live_lo = snapshot.tail >> bits;
        let live_hi = snapshot.head >> bits;
        let max_page = (self.max_index - 1) >> bits;
        dead_ranges(live_lo, live_hi, max_page)
    }

    fn dead_data_ranges(&self, snapshot: &CursorSnapshot) -> Vec<RangeInclusive<u64>> {
        dead_ranges(
            snapshot.tail_data_page,
            snapshot.head_data_page,
            self.max_data_files - 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_span_leaves_both_sides_dead() {
        assert_eq!(dead_ranges(2, 4, 9), vec![5..=9, 0..=1]);
    }

    #[test]
    fn span_from_zero_leaves_only_the_high_side() {
        assert_eq!(dead_ranges(0, 3, 9), vec![4..=9]);
    }

    #[test]
    fn span_to_max_leaves_only_the_low_side() {
        assert_eq!(dead_ranges(6, 9, 9), vec![0..=5]);
    }

    #[test]
    fn full_straight_span_has_no_dead_pages() {
        assert!(dead_ranges(0, 9, 9).is_empty());
    }

    #[test]
    fn wrapped_span_leaves_the_middle_dead() {
        assert_eq!(dead_ranges(7, 2, 9), vec![3..=6]);
    }

    #[test]
    fn adjacent_wrapped_span_has_no_dead_pages() {
        assert!(dead_ranges(5, 4, 9).is_empty());
    }

    #[test]
    fn single_page_ring() {
        assert!(dead_ranges(0, 0, 0).is_empty());
    }

    #[test]
    fn single_live_page_in_larger_ring() {
        assert_eq!(dead_ranges(3, 3, 5), vec![4..=5, 0..=2]);
    }
}
