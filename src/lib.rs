//! Trellis: an in-memory property-graph database with a Cypher query
//! pipeline.
//!
//! Queries are stripped of literals and hashed for plan caching, parsed
//! into an AST, bound to frame slots by the semantic phase, lowered to
//! a tree of logical operators, and executed by pull-based cursors
//! against a transaction-scoped MVCC accessor.
//!
//! ```
//! use trellis::{Config, Database};
//!
//! let db = Database::new(Config::default());
//! db.execute("CREATE (:Person {name: 'Ada'})").unwrap();
//! let result = db.execute("MATCH (p:Person) RETURN p.name").unwrap();
//! assert_eq!(result.results().len(), 1);
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod storage;

pub use crate::config::Config;
pub use crate::db::Database;
pub use crate::error::{QueryError, Result};
pub use crate::query::{CollectingStream, Interpreter, ResultStream, TypedValue};
pub use crate::storage::{GraphAccessor, GraphStore};
