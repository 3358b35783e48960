//! Typed Query Builder - Declarative criteria over one entity type
//!
//! A `Query<T>` collects column filters and eager fetch paths, then
//! translates into one store query. Lazy associations stay unloaded unless
//! named in a fetch path, in which case the target joins into the same
//! round trip.

use std::marker::PhantomData;

use serde_json::Value;

use crate::error::{OrmError, OrmResult};
use crate::mapping::{AssociationStrategy, EntityDescriptor, MappingRegistry};
use crate::model::Entity;
use crate::store::{Filter, FilterOp, JoinSpec, StoreQuery};

/// Criteria query against a single entity type.
#[derive(Debug, Clone)]
pub struct Query<T: Entity> {
    filters: Vec<Filter>,
    fetch_paths: Vec<String>,
    _marker: PhantomData<T>,
}

impl<T: Entity> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Query<T> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            fetch_paths: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn filter(mut self, column: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn where_ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Ne, value)
    }

    pub fn where_gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gt, value)
    }

    pub fn where_lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lt, value)
    }

    /// Fetch a lazy association eagerly, in the same round trip. Returned
    /// owners carry the target already initialized.
    pub fn with(mut self, association: &str) -> Self {
        self.fetch_paths.push(association.to_string());
        self
    }

    pub(crate) fn to_store_query(
        &self,
        descriptor: &'static EntityDescriptor,
        registry: &MappingRegistry,
    ) -> OrmResult<StoreQuery> {
        for filter in &self.filters {
            if !descriptor.has_column(&filter.column) {
                return Err(OrmError::Query(format!(
                    "entity '{}' has no column '{}'",
                    descriptor.entity, filter.column
                )));
            }
        }

        let mut joins = Vec::with_capacity(self.fetch_paths.len());
        for path in &self.fetch_paths {
            let association = descriptor.association(path).ok_or_else(|| {
                OrmError::Query(format!(
                    "entity '{}' has no association '{path}'",
                    descriptor.entity
                ))
            })?;
            if association.strategy != AssociationStrategy::LazyObjectReference {
                return Err(OrmError::Query(format!(
                    "association '{path}' on '{}' holds a plain key and cannot be fetched eagerly",
                    descriptor.entity
                )));
            }
            let target = registry.association_target(association)?;
            let on = association
                .foreign_key
                .iter()
                .zip(target.key.columns.iter())
                .map(|(fk, (key_col, _))| (fk.to_string(), key_col.to_string()))
                .collect();
            joins.push(JoinSpec {
                association: path.clone(),
                target_table: target.table.to_string(),
                on,
            });
        }

        Ok(StoreQuery {
            table: descriptor.table.to_string(),
            filters: self.filters.clone(),
            joins,
        })
    }
}
