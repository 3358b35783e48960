//! Entity Descriptor System - Static metadata per entity type
//!
//! A descriptor names the backing table, the attribute columns, the
//! primary-key shape (scalar or composite component list), and the
//! many-to-one association fields with their resolution strategy.

use serde_json::Value;

use crate::error::{OrmError, OrmResult};
use crate::key::{KeyComponent, KeyType, PrimaryKey};
use crate::store::Row;

/// Resolution strategy for a unidirectional many-to-one association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationStrategy {
    /// The association is a plain scalar attribute holding the raw
    /// foreign-key value. No object navigation, no object-layer check.
    IdReference,
    /// The association is a navigable, lazily-resolved reference to the
    /// target entity.
    LazyObjectReference,
}

/// Column binding for one scalar attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Primary-key shape: ordered key columns with their component types, and
/// whether the key is generated by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub columns: Vec<(&'static str, KeyType)>,
    pub generated: bool,
}

impl KeyDescriptor {
    /// Store-generated scalar integer key.
    pub fn generated(column: &'static str) -> Self {
        Self {
            columns: vec![(column, KeyType::Int)],
            generated: true,
        }
    }

    /// Natural key over the given ordered, typed columns.
    pub fn natural(columns: Vec<(&'static str, KeyType)>) -> Self {
        Self {
            columns,
            generated: false,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    /// Build a key from a row, decoding each component by its declared type.
    pub fn key_from_row(&self, row: &Row) -> OrmResult<PrimaryKey> {
        let mut components = Vec::with_capacity(self.columns.len());
        for (name, kind) in &self.columns {
            let value = row
                .get(*name)
                .ok_or_else(|| OrmError::Serialization(format!("row missing key column '{name}'")))?;
            components.push(((*name).to_string(), KeyComponent::from_value(*kind, value)?));
        }
        if components.len() == 1 {
            Ok(PrimaryKey::Single(components.remove(0).1))
        } else {
            Ok(PrimaryKey::Composite(components))
        }
    }

    /// Project a key into its key-column row form.
    pub fn key_to_row(&self, key: &PrimaryKey) -> OrmResult<Row> {
        let components = key.components();
        if components.len() != self.columns.len() {
            return Err(OrmError::Mapping(format!(
                "key {key} has {} components, descriptor declares {}",
                components.len(),
                self.columns.len()
            )));
        }
        Ok(self
            .columns
            .iter()
            .zip(components)
            .map(|((name, _), component)| ((*name).to_string(), component.to_value()))
            .collect())
    }
}

/// Static metadata for one association field: foreign-key column(s) on the
/// source table, target entity, cardinality many-to-one, unidirectional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDescriptor {
    pub name: &'static str,
    pub foreign_key: Vec<&'static str>,
    pub target: &'static str,
    pub strategy: AssociationStrategy,
}

impl AssociationDescriptor {
    /// Raw foreign-key-as-attribute association.
    pub fn id_reference(
        name: &'static str,
        foreign_key: Vec<&'static str>,
        target: &'static str,
    ) -> Self {
        Self {
            name,
            foreign_key,
            target,
            strategy: AssociationStrategy::IdReference,
        }
    }

    /// Lazily-resolved object reference association.
    pub fn lazy(name: &'static str, foreign_key: Vec<&'static str>, target: &'static str) -> Self {
        Self {
            name,
            foreign_key,
            target,
            strategy: AssociationStrategy::LazyObjectReference,
        }
    }

    /// Extract the target key held in a source row's foreign-key columns,
    /// decoded against the target's key shape. `None` when every foreign-key
    /// column is null (no association).
    pub fn target_key(&self, row: &Row, target_key: &KeyDescriptor) -> OrmResult<Option<PrimaryKey>> {
        let mut components = Vec::with_capacity(self.foreign_key.len());
        for (fk, (target_column, kind)) in self.foreign_key.iter().zip(&target_key.columns) {
            let value = row.get(*fk).unwrap_or(&Value::Null);
            if value.is_null() {
                return Ok(None);
            }
            components.push((
                (*target_column).to_string(),
                KeyComponent::from_value(*kind, value)?,
            ));
        }
        if components.len() == 1 {
            Ok(Some(PrimaryKey::Single(components.remove(0).1)))
        } else {
            Ok(Some(PrimaryKey::Composite(components)))
        }
    }
}

/// Static metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Logical entity type name, the identity-map namespace
    pub entity: &'static str,
    /// Backing table name
    pub table: &'static str,
    pub columns: Vec<ColumnDescriptor>,
    pub key: KeyDescriptor,
    pub associations: Vec<AssociationDescriptor>,
}

impl EntityDescriptor {
    pub fn new(entity: &'static str, table: &'static str, key: KeyDescriptor) -> Self {
        Self {
            entity,
            table,
            columns: Vec::new(),
            key,
            associations: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_association(mut self, association: AssociationDescriptor) -> Self {
        self.associations.push(association);
        self
    }

    pub fn association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Validate the descriptor in isolation; cross-entity checks happen at
    /// registry build.
    pub fn validate(&self) -> OrmResult<()> {
        if self.key.columns.is_empty() {
            return Err(OrmError::Mapping(format!(
                "entity '{}' declares no key columns",
                self.entity
            )));
        }
        if self.key.generated
            && (self.key.columns.len() != 1 || self.key.columns[0].1 != KeyType::Int)
        {
            return Err(OrmError::Mapping(format!(
                "entity '{}': generated keys must be a single integer column",
                self.entity
            )));
        }
        for (name, _) in &self.key.columns {
            if !self.has_column(name) {
                return Err(OrmError::Mapping(format!(
                    "entity '{}': key column '{}' is not a declared column",
                    self.entity, name
                )));
            }
        }
        for association in &self.associations {
            if association.foreign_key.is_empty() {
                return Err(OrmError::Mapping(format!(
                    "entity '{}': association '{}' declares no foreign-key columns",
                    self.entity, association.name
                )));
            }
            for fk in &association.foreign_key {
                if !self.has_column(fk) {
                    return Err(OrmError::Mapping(format!(
                        "entity '{}': association '{}' uses undeclared column '{}'",
                        self.entity, association.name, fk
                    )));
                }
            }
        }
        let mut names: Vec<&str> = self.associations.iter().map(|a| a.name).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.associations.len() {
            return Err(OrmError::Mapping(format!(
                "entity '{}': duplicate association names",
                self.entity
            )));
        }
        Ok(())
    }
}
