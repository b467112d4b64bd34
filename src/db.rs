//! Embedder-facing database handle.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::query::{CollectingStream, Interpreter, TypedValue};
use crate::storage::{GraphAccessor, GraphStore};

/// An in-memory graph database: one shared store plus an interpreter
/// with its plan cache. Queries run in parallel on distinct
/// transactions.
pub struct Database {
    store: Arc<GraphStore>,
    interpreter: Interpreter,
}

impl Database {
    pub fn new(config: Config) -> Self {
        Self {
            store: Arc::new(GraphStore::new()),
            interpreter: Interpreter::new(config),
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Opens a new transaction-scoped accessor.
    pub fn access(&self) -> GraphAccessor {
        self.store.access()
    }

    /// Runs one query in its own transaction, committing on success.
    pub fn execute(&self, query: &str) -> Result<CollectingStream> {
        self.execute_with_params(query, &HashMap::new())
    }

    pub fn execute_with_params(
        &self,
        query: &str,
        params: &HashMap<String, TypedValue>,
    ) -> Result<CollectingStream> {
        let accessor = self.access();
        let mut stream = CollectingStream::new();
        self.interpreter
            .interpret(query, &accessor, &mut stream, params, false)?;
        accessor.commit();
        Ok(stream)
    }

    /// Runs one statement inside a caller-owned explicit transaction.
    /// Errors mark the transaction failed instead of aborting it.
    pub fn execute_in(
        &self,
        accessor: &GraphAccessor,
        query: &str,
        params: &HashMap<String, TypedValue>,
    ) -> Result<CollectingStream> {
        let mut stream = CollectingStream::new();
        self.interpreter
            .interpret(query, accessor, &mut stream, params, true)?;
        Ok(stream)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
