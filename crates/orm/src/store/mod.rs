//! Backing Store Abstraction - The collaborator contract the runtime writes
//! through
//!
//! The runtime never touches physical storage itself: reads go through
//! `fetch_one` / `fetch_many` / `fetch_native`, writes go through
//! `execute_batch` as one atomic transaction. Constraint violations come
//! back as explicit error values, not exceptions.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

pub use memory::MemoryStore;

use crate::error::{OrmError, OrmResult};

/// One stored row: column name to value.
pub type Row = HashMap<String, Value>;

/// Typed column access over a row.
pub trait RowExt {
    /// Get a typed value from a column.
    fn get_typed<T>(&self, column: &str) -> OrmResult<T>
    where
        T: serde::de::DeserializeOwned;

    /// Get an optional typed value; null and missing both map to `None`.
    fn get_opt<T>(&self, column: &str) -> OrmResult<Option<T>>
    where
        T: serde::de::DeserializeOwned;
}

impl RowExt for Row {
    fn get_typed<T>(&self, column: &str) -> OrmResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::Serialization(format!("row missing column '{column}'")))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            OrmError::Serialization(format!("failed to deserialize column '{column}': {e}"))
        })
    }

    fn get_opt<T>(&self, column: &str) -> OrmResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.get(column) {
            None => Ok(None),
            Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                OrmError::Serialization(format!("failed to deserialize column '{column}': {e}"))
            }),
        }
    }
}

/// Comparison operator of a structured filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
}

/// One predicate over a column of the queried table.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Join request for an eager-fetch path: the owner's foreign-key columns
/// matched against the target table's key columns, target row returned
/// alongside the owner row in the same round trip.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// Association name the joined row is keyed under in the result
    pub association: String,
    pub target_table: String,
    /// (owner foreign-key column, target key column) pairs
    pub on: Vec<(String, String)>,
}

/// Structured query against one table, optionally joining association
/// targets in the same round trip.
#[derive(Debug, Clone)]
pub struct StoreQuery {
    pub table: String,
    pub filters: Vec<Filter>,
    pub joins: Vec<JoinSpec>,
}

/// One result row of a `StoreQuery`: the owner row plus any joined target
/// rows keyed by association name (`None` when the foreign key was null).
#[derive(Debug, Clone)]
pub struct StoreRow {
    pub row: Row,
    pub joined: HashMap<String, Option<Row>>,
}

/// One write operation of a flush batch.
#[derive(Debug, Clone)]
pub enum StoreOp {
    Insert {
        table: String,
        row: Row,
    },
    Update {
        table: String,
        key: Row,
        row: Row,
    },
    Delete {
        table: String,
        key: Row,
    },
}

impl StoreOp {
    pub fn table(&self) -> &str {
        match self {
            StoreOp::Insert { table, .. }
            | StoreOp::Update { table, .. }
            | StoreOp::Delete { table, .. } => table,
        }
    }
}

/// Abstract backing store. All operations are logically synchronous: each
/// call is one blocking round trip from the caller's point of view.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Fetch a single row by its key columns. Missing row is `Ok(None)`.
    async fn fetch_one(&self, table: &str, key: &Row) -> OrmResult<Option<Row>>;

    /// Execute a structured query, joins included, in one round trip.
    async fn fetch_many(&self, query: &StoreQuery) -> OrmResult<Vec<StoreRow>>;

    /// Execute a verbatim store-native statement with positional parameters
    /// and return raw rows.
    async fn fetch_native(&self, statement: &str, params: &[Value]) -> OrmResult<Vec<Row>>;

    /// Execute an ordered batch as one atomic transaction: any rejection
    /// aborts the whole batch with no partial write observable afterwards.
    /// Returns the number of affected rows.
    async fn execute_batch(&self, ops: &[StoreOp]) -> OrmResult<u64>;

    /// Reserve the next generated key for a table's sequence. Not a data
    /// round trip.
    async fn reserve_key(&self, table: &str) -> OrmResult<i64>;
}
