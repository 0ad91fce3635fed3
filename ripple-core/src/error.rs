//! Error types.

use thiserror::Error;

use crate::graph::CellId;

/// Errors raised by cell operations that violate a programmer precondition.
///
/// Tracking hazards (mutating the graph during a tracked read) are never
/// reported here; they go to the diagnostic sink instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// A derived cell built without a setter was written to.
    #[error("cell {cell:?} is derived without a setter and cannot be written")]
    ReadOnly {
        /// The cell that rejected the write.
        cell: CellId,
    },
}
