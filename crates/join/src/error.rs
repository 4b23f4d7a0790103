//! Aggregator failures.

use sirocco_expression::ExpressionError;
use sirocco_store::StoreError;
use thiserror::Error;

/// Errors from connection-group aggregation.
#[derive(Debug, Error)]
pub enum JoinError {
    /// A group field expression failed against an inbound event payload.
    #[error("extraction of field '{field}' failed: {source}")]
    Extraction {
        /// The group field being extracted.
        field: String,
        /// The expression failure.
        #[source]
        source: ExpressionError,
    },

    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}
