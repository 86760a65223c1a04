//! Store error surface

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection setup failed after the retry budget was spent.
    #[error("connection to graph store failed: {0}")]
    Connection(String),

    /// A query failed; the statement and parameters are logged at the
    /// call site before this surfaces.
    #[error("graph query failed: {0}")]
    Query(String),

    /// Node ids must be exactly 32 lowercase hex characters.
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    /// The backend cannot execute this operation (e.g. raw parameterised
    /// queries against the in-memory store).
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    /// A result row was missing an expected column or had the wrong type.
    #[error("malformed result row: {0}")]
    MalformedRow(String),
}
