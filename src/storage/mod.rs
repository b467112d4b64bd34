//! In-memory transactional graph storage.

pub mod accessor;
pub mod graph;
pub mod mvcc;

use thiserror::Error;

pub use accessor::GraphAccessor;
pub use graph::{
    Catalog, Direction, EdgeData, EdgeId, EdgeTypeId, Expansion, GraphStore, IndexStats, LabelId,
    PropertyId, PropertyKey, PropertyValue, RecordKey, VertexData, VertexId,
};
pub use mvcc::{CommandId, CommitId, Snapshot, TransactionId};

/// Failures raised by the storage engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Another transaction wrote the record first.
    #[error("{0}")]
    Conflict(String),
    /// A vertex with incident edges cannot be deleted without detach.
    #[error("vertex still has incident edges")]
    VertexHasEdges,
    /// The record is not visible to this transaction.
    #[error("{0} is gone")]
    RecordGone(&'static str),
}
