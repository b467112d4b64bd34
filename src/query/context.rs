//! Per-query execution state threaded through every cursor pull.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{QueryError, Result};
use crate::query::symbol::SymbolTable;
use crate::query::typed_value::TypedValue;
use crate::storage::GraphAccessor;

pub struct ExecutionContext<'a> {
    pub accessor: &'a GraphAccessor,
    pub symbol_table: &'a SymbolTable,
    /// Stripped literals plus user parameters, keyed by placeholder name.
    pub parameters: HashMap<String, TypedValue>,
    /// Set externally to cancel the query (client abort or timeout
    /// watcher); checked between pulls.
    pub should_abort: Arc<AtomicBool>,
    pub is_index_created: Cell<bool>,
    pub in_explicit_transaction: bool,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(accessor: &'a GraphAccessor, symbol_table: &'a SymbolTable) -> Self {
        Self {
            accessor,
            symbol_table,
            parameters: HashMap::new(),
            should_abort: Arc::new(AtomicBool::new(false)),
            is_index_created: Cell::new(false),
            in_explicit_transaction: false,
        }
    }

    pub fn check_abort(&self) -> Result<()> {
        if self.should_abort.load(Ordering::Relaxed) {
            Err(QueryError::HintedAbort)
        } else {
            Ok(())
        }
    }
}
