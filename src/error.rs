use thiserror::Error;

use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors surfaced by the query pipeline.
///
/// Every variant carries a human-readable message; parse failures also
/// carry the source location. Errors abort the query and the transaction
/// that owns it, unless the query runs inside an explicit transaction, in
/// which case the transaction is marked failed and stays open until it is
/// rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query text failed to parse.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    /// The query parsed but failed semantic validation.
    #[error("semantic error: {0}")]
    Semantic(String),
    /// A parameter named by a stripped placeholder was not supplied.
    #[error("parameter ${0} not provided")]
    UnprovidedParameter(String),
    /// Runtime failure during plan execution.
    #[error("query runtime error: {0}")]
    Runtime(String),
    /// The query was cancelled by an abort hint (client abort or timeout).
    #[error("query was asked to abort")]
    HintedAbort,
    /// The storage engine detected a serialization conflict.
    #[error("transaction conflict: {0}")]
    TransactionConflict(String),
}

impl QueryError {
    /// Builds a [`QueryError::Syntax`] for a specific source location.
    pub fn syntax(message: impl Into<String>, line: usize, column: usize) -> Self {
        QueryError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    /// Builds a [`QueryError::Semantic`].
    pub fn semantic(message: impl Into<String>) -> Self {
        QueryError::Semantic(message.into())
    }

    /// Builds a [`QueryError::Runtime`].
    pub fn runtime(message: impl Into<String>) -> Self {
        QueryError::Runtime(message.into())
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => QueryError::TransactionConflict(message),
            StorageError::VertexHasEdges => QueryError::Runtime(
                "cannot delete a vertex with incident edges without DETACH".into(),
            ),
            StorageError::RecordGone(what) => {
                QueryError::Runtime(format!("{what} no longer visible in this transaction"))
            }
        }
    }
}
