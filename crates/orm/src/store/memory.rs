//! In-Memory Backing Store - Schema-aware reference implementation of the
//! `BackingStore` contract
//!
//! Tables, key uniqueness, foreign-key constraints, and per-table key
//! sequences are derived from the mapping registry. Batches execute against
//! a working copy and swap in atomically, so a rejected batch leaves no
//! partial write behind. Data round trips are counted for observability.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{OrmError, OrmResult};
use crate::mapping::MappingRegistry;
use crate::store::{BackingStore, Filter, FilterOp, Row, StoreOp, StoreQuery, StoreRow};

#[derive(Debug, Clone)]
struct ForeignKey {
    /// (source column, target key column) pairs
    on: Vec<(String, String)>,
    target_table: String,
}

#[derive(Debug, Clone)]
struct TableSchema {
    key_columns: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone)]
struct TableData {
    schema: TableSchema,
    /// canonical key string -> row, ordered for deterministic scans
    rows: BTreeMap<String, Row>,
    sequence: i64,
}

struct StoreInner {
    tables: HashMap<String, TableData>,
}

/// In-memory backing store with constraint enforcement and atomic batches.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    fetches: AtomicU64,
}

impl MemoryStore {
    /// Build the table schemas from the registry's descriptors. Both
    /// association strategies contribute a storage-level foreign-key
    /// constraint.
    pub fn new(registry: &MappingRegistry) -> Self {
        let mut tables = HashMap::new();
        for descriptor in registry.descriptors() {
            let mut foreign_keys = Vec::new();
            for association in &descriptor.associations {
                // Registry build has already validated the target.
                if let Ok(target) = registry.descriptor(association.target) {
                    foreign_keys.push(ForeignKey {
                        on: association
                            .foreign_key
                            .iter()
                            .zip(&target.key.columns)
                            .map(|(fk, (kc, _))| ((*fk).to_string(), (*kc).to_string()))
                            .collect(),
                        target_table: target.table.to_string(),
                    });
                }
            }
            tables.insert(
                descriptor.table.to_string(),
                TableData {
                    schema: TableSchema {
                        key_columns: descriptor
                            .key
                            .columns
                            .iter()
                            .map(|(name, _)| (*name).to_string())
                            .collect(),
                        foreign_keys,
                    },
                    rows: BTreeMap::new(),
                    sequence: 0,
                },
            );
        }
        Self {
            inner: Mutex::new(StoreInner { tables }),
            fetches: AtomicU64::new(0),
        }
    }

    /// Number of data round trips served so far (fetches only; key
    /// reservation and writes are not counted).
    pub fn round_trips(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lock(&self) -> OrmResult<std::sync::MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| OrmError::Store("store lock poisoned".to_string()))
    }
}

fn canonical_key(key_columns: &[String], row: &Row) -> OrmResult<String> {
    let mut parts = Vec::with_capacity(key_columns.len());
    for column in key_columns {
        let value = row
            .get(column)
            .ok_or_else(|| OrmError::Store(format!("missing key column '{column}'")))?;
        if value.is_null() {
            return Err(OrmError::StoreConstraint(format!(
                "null key column '{column}'"
            )));
        }
        parts.push(value.to_string());
    }
    Ok(parts.join("|"))
}

fn matches_filter(row: &Row, filter: &Filter) -> bool {
    let actual = row.get(&filter.column).unwrap_or(&Value::Null);
    match filter.op {
        FilterOp::Eq => actual == &filter.value,
        FilterOp::Ne => actual != &filter.value,
        FilterOp::Gt => compare(actual, &filter.value).map_or(false, |o| o.is_gt()),
        FilterOp::Lt => compare(actual, &filter.value).map_or(false, |o| o.is_lt()),
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl StoreInner {
    fn table(&self, name: &str) -> OrmResult<&TableData> {
        self.tables
            .get(name)
            .ok_or_else(|| OrmError::Store(format!("unknown table '{name}'")))
    }

    /// Check every foreign key of `row` against the given table state.
    fn check_foreign_keys(
        tables: &HashMap<String, TableData>,
        table: &str,
        row: &Row,
    ) -> OrmResult<()> {
        let data = tables
            .get(table)
            .ok_or_else(|| OrmError::Store(format!("unknown table '{table}'")))?;
        for fk in &data.schema.foreign_keys {
            let mut target_key = Row::new();
            let mut null = false;
            for (source, target_column) in &fk.on {
                match row.get(source) {
                    None | Some(Value::Null) => {
                        null = true;
                        break;
                    }
                    Some(value) => {
                        target_key.insert(target_column.clone(), value.clone());
                    }
                }
            }
            if null {
                continue;
            }
            let target = tables
                .get(&fk.target_table)
                .ok_or_else(|| OrmError::Store(format!("unknown table '{}'", fk.target_table)))?;
            let key = canonical_key(&target.schema.key_columns, &target_key)?;
            if !target.rows.contains_key(&key) {
                return Err(OrmError::StoreConstraint(format!(
                    "foreign key violation: {table} references missing {}({key})",
                    fk.target_table
                )));
            }
        }
        Ok(())
    }

    /// Check that nothing in the given table state still references the row
    /// being deleted.
    fn check_not_referenced(
        tables: &HashMap<String, TableData>,
        table: &str,
        key: &str,
    ) -> OrmResult<()> {
        let key_columns = tables
            .get(table)
            .ok_or_else(|| OrmError::Store(format!("unknown table '{table}'")))?
            .schema
            .key_columns
            .clone();
        for (other_name, other) in tables {
            for fk in &other.schema.foreign_keys {
                if fk.target_table != table {
                    continue;
                }
                for row in other.rows.values() {
                    let mut target_key = Row::new();
                    let mut null = false;
                    for (source, target_column) in &fk.on {
                        match row.get(source) {
                            None | Some(Value::Null) => {
                                null = true;
                                break;
                            }
                            Some(value) => {
                                target_key.insert(target_column.clone(), value.clone());
                            }
                        }
                    }
                    if null {
                        continue;
                    }
                    let referenced = canonical_key(&key_columns, &target_key)?;
                    if referenced == key {
                        return Err(OrmError::StoreConstraint(format!(
                            "foreign key violation: {other_name} still references {table}({key})"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn fetch_one(&self, table: &str, key: &Row) -> OrmResult<Option<Row>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock()?;
        let data = inner.table(table)?;
        let key = canonical_key(&data.schema.key_columns, key)?;
        Ok(data.rows.get(&key).cloned())
    }

    async fn fetch_many(&self, query: &StoreQuery) -> OrmResult<Vec<StoreRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock()?;
        let data = inner.table(&query.table)?;

        let mut results = Vec::new();
        for row in data.rows.values() {
            if !query.filters.iter().all(|f| matches_filter(row, f)) {
                continue;
            }
            let mut joined = HashMap::new();
            for join in &query.joins {
                let target = inner.table(&join.target_table)?;
                let mut target_key = Row::new();
                let mut null = false;
                for (source, target_column) in &join.on {
                    match row.get(source) {
                        None | Some(Value::Null) => {
                            null = true;
                            break;
                        }
                        Some(value) => {
                            target_key.insert(target_column.clone(), value.clone());
                        }
                    }
                }
                let target_row = if null {
                    None
                } else {
                    let key = canonical_key(&target.schema.key_columns, &target_key)?;
                    target.rows.get(&key).cloned()
                };
                joined.insert(join.association.clone(), target_row);
            }
            results.push(StoreRow {
                row: row.clone(),
                joined,
            });
        }
        Ok(results)
    }

    async fn fetch_native(&self, statement: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (table, filters) = parse_native(statement, params)?;
        let inner = self.lock()?;
        let data = inner.table(&table)?;
        Ok(data
            .rows
            .values()
            .filter(|row| filters.iter().all(|f| matches_filter(row, f)))
            .cloned()
            .collect())
    }

    async fn execute_batch(&self, ops: &[StoreOp]) -> OrmResult<u64> {
        let mut inner = self.lock()?;

        // Validate and apply against a working copy; swap in only on success.
        let mut working = inner.tables.clone();
        let mut affected = 0u64;
        for op in ops {
            match op {
                StoreOp::Insert { table, row } => {
                    let data = working
                        .get(table.as_str())
                        .ok_or_else(|| OrmError::Store(format!("unknown table '{table}'")))?;
                    let key = canonical_key(&data.schema.key_columns, row)?;
                    if data.rows.contains_key(&key) {
                        return Err(OrmError::StoreConstraint(format!(
                            "uniqueness violation: {table}({key})"
                        )));
                    }
                    StoreInner::check_foreign_keys(&working, table, row)?;
                    if let Some(data) = working.get_mut(table.as_str()) {
                        data.rows.insert(key, row.clone());
                    }
                    affected += 1;
                }
                StoreOp::Update { table, key, row } => {
                    let data = working
                        .get(table.as_str())
                        .ok_or_else(|| OrmError::Store(format!("unknown table '{table}'")))?;
                    let key = canonical_key(&data.schema.key_columns, key)?;
                    if !data.rows.contains_key(&key) {
                        return Err(OrmError::Store(format!(
                            "update of missing row {table}({key})"
                        )));
                    }
                    StoreInner::check_foreign_keys(&working, table, row)?;
                    if let Some(data) = working.get_mut(table.as_str()) {
                        data.rows.insert(key, row.clone());
                    }
                    affected += 1;
                }
                StoreOp::Delete { table, key } => {
                    let data = working
                        .get(table.as_str())
                        .ok_or_else(|| OrmError::Store(format!("unknown table '{table}'")))?;
                    let key = canonical_key(&data.schema.key_columns, key)?;
                    if working
                        .get_mut(table.as_str())
                        .and_then(|d| d.rows.remove(&key))
                        .is_none()
                    {
                        return Err(OrmError::Store(format!(
                            "delete of missing row {table}({key})"
                        )));
                    }
                    StoreInner::check_not_referenced(&working, table, &key)?;
                    affected += 1;
                }
            }
        }

        inner.tables = working;
        debug!(ops = ops.len(), affected, "batch applied");
        Ok(affected)
    }

    async fn reserve_key(&self, table: &str) -> OrmResult<i64> {
        let mut inner = self.lock()?;
        let data = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| OrmError::Store(format!("unknown table '{table}'")))?;
        data.sequence += 1;
        Ok(data.sequence)
    }
}

/// Parse the store's native statement form:
/// `TABLE [WHERE col = $n [AND col = $n ...]]` with positional parameters.
fn parse_native(statement: &str, params: &[Value]) -> OrmResult<(String, Vec<Filter>)> {
    let mut tokens = statement.split_whitespace();
    let table = tokens
        .next()
        .ok_or_else(|| OrmError::Query("empty native statement".to_string()))?
        .to_string();

    let rest: Vec<&str> = tokens.collect();
    if rest.is_empty() {
        return Ok((table, Vec::new()));
    }
    if !rest[0].eq_ignore_ascii_case("where") {
        return Err(OrmError::Query(format!(
            "expected WHERE, found '{}'",
            rest[0]
        )));
    }

    let mut filters = Vec::new();
    let mut chunks = rest[1..].split(|t| t.eq_ignore_ascii_case("and"));
    for chunk in &mut chunks {
        match chunk {
            [column, eq, placeholder] if *eq == "=" && placeholder.starts_with('$') => {
                let index: usize = placeholder[1..]
                    .parse()
                    .map_err(|_| OrmError::Query(format!("bad placeholder '{placeholder}'")))?;
                let value = params.get(index.wrapping_sub(1)).ok_or_else(|| {
                    OrmError::Query(format!("missing parameter for '{placeholder}'"))
                })?;
                filters.push(Filter {
                    column: (*column).to_string(),
                    op: FilterOp::Eq,
                    value: value.clone(),
                });
            }
            _ => {
                return Err(OrmError::Query(format!(
                    "malformed condition '{}'",
                    chunk.join(" ")
                )))
            }
        }
    }
    Ok((table, filters))
}
