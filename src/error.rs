//! Typed failure markers for the array.
//!
//! Most fallible paths in this crate return `eyre::Result` with context chains.
//! The three failure classes callers need to tell apart programmatically are
//! modeled as [`ArrayError`] and embedded in the report, so a caller can
//! `downcast_ref::<ArrayError>()` (or use the predicates below) to special-case
//! "no room" versus a programming mistake versus a bad configuration.

use thiserror::Error;

/// Distinguishable failure classes surfaced by [`BigArray`](crate::BigArray).
///
/// Plain I/O failures (page creation, mapping, flush) are not represented here;
/// they propagate as wrapped `std::io::Error` reports and are always fatal to
/// the call that hit them.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// The index ring or the configured data-size ceiling is exhausted.
    ///
    /// Recoverable when a backlog callback is configured (the array evicts its
    /// oldest entries to make room); otherwise fatal to the append.
    #[error("out of space: {0}")]
    OutOfSpace(String),

    /// A read addressed a logical index outside the live `[tail, head)` range.
    #[error("index {index} out of range (tail: {tail}, head: {head})")]
    IndexOutOfRange {
        /// The requested logical index.
        index: u64,
        /// Tail cursor at the time of the call.
        tail: u64,
        /// Head cursor at the time of the call.
        head: u64,
    },

    /// A construction option failed validation. Raised only from
    /// [`ArrayConfig`](crate::ArrayConfig) resolution.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ArrayError {
    /// True when `report` carries an [`ArrayError::OutOfSpace`] marker.
    pub fn is_out_of_space(report: &eyre::Report) -> bool {
        matches!(
            report.downcast_ref::<ArrayError>(),
            Some(ArrayError::OutOfSpace(_))
        )
    }

    /// True when `report` carries an [`ArrayError::IndexOutOfRange`] marker.
    pub fn is_index_out_of_range(report: &eyre::Report) -> bool {
        matches!(
            report.downcast_ref::<ArrayError>(),
            Some(ArrayError::IndexOutOfRange { .. })
        )
    }

    /// True when `report` carries an [`ArrayError::InvalidConfiguration`] marker.
    pub fn is_invalid_configuration(report: &eyre::Report) -> bool {
        matches!(
            report.downcast_ref::<ArrayError>(),
            Some(ArrayError::InvalidConfiguration(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_survive_eyre_wrapping() {
        let report: eyre::Report = ArrayError::OutOfSpace("data ceiling".into()).into();
        assert!(ArrayError::is_out_of_space(&report));
        assert!(!ArrayError::is_index_out_of_range(&report));

        let report: eyre::Report = ArrayError::IndexOutOfRange {
            index: 7,
            tail: 2,
            head: 5,
        }
        .into();
        assert!(ArrayError::is_index_out_of_range(&report));
        assert!(report.to_string().contains("index 7"));
    }
}
