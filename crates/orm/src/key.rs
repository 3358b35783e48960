//! Primary Key System - Scalar and composite entity identities
//!
//! A `PrimaryKey` is one first-class value whether the identity is a single
//! synthetic column or an ordered list of named components (e.g. employee id
//! paired with a period-start date). Two keys are equal iff shape and every
//! component compare equal pairwise; partial matches are never equal.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{OrmError, OrmResult};

/// A single key component value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyComponent {
    /// Integer component (store-generated keys are always this kind)
    Int(i64),
    /// String component
    Str(String),
    /// UUID component
    Uuid(Uuid),
    /// Calendar date component, carried as ISO-8601 in rows
    Date(NaiveDate),
}

/// Declared type of a key component, used to decode row values into
/// components without guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Int,
    Str,
    Uuid,
    Date,
}

impl KeyComponent {
    /// Row representation of this component.
    pub fn to_value(&self) -> Value {
        match self {
            KeyComponent::Int(v) => Value::from(*v),
            KeyComponent::Str(v) => Value::from(v.clone()),
            KeyComponent::Uuid(v) => Value::from(v.to_string()),
            KeyComponent::Date(v) => Value::from(v.format("%Y-%m-%d").to_string()),
        }
    }

    /// Decode a row value as a component of the declared type.
    pub fn from_value(kind: KeyType, value: &Value) -> OrmResult<Self> {
        let fail = || OrmError::Serialization(format!("key component {value} is not a {kind:?}"));
        match kind {
            KeyType::Int => value.as_i64().map(KeyComponent::Int).ok_or_else(fail),
            KeyType::Str => value
                .as_str()
                .map(|s| KeyComponent::Str(s.to_string()))
                .ok_or_else(fail),
            KeyType::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(KeyComponent::Uuid)
                .ok_or_else(fail),
            KeyType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(KeyComponent::Date)
                .ok_or_else(fail),
        }
    }
}

impl std::fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyComponent::Int(v) => write!(f, "{}", v),
            KeyComponent::Str(v) => write!(f, "{}", v),
            KeyComponent::Uuid(v) => write!(f, "{}", v),
            KeyComponent::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

impl From<i64> for KeyComponent {
    fn from(v: i64) -> Self {
        KeyComponent::Int(v)
    }
}

impl From<&str> for KeyComponent {
    fn from(v: &str) -> Self {
        KeyComponent::Str(v.to_string())
    }
}

impl From<Uuid> for KeyComponent {
    fn from(v: Uuid) -> Self {
        KeyComponent::Uuid(v)
    }
}

impl From<NaiveDate> for KeyComponent {
    fn from(v: NaiveDate) -> Self {
        KeyComponent::Date(v)
    }
}

/// Primary key of an entity: a scalar value or an ordered set of named
/// components in descriptor order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimaryKey {
    Single(KeyComponent),
    Composite(Vec<(String, KeyComponent)>),
}

impl PrimaryKey {
    pub fn single(component: impl Into<KeyComponent>) -> Self {
        PrimaryKey::Single(component.into())
    }

    pub fn composite<I, N, C>(components: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<KeyComponent>,
    {
        PrimaryKey::Composite(
            components
                .into_iter()
                .map(|(n, c)| (n.into(), c.into()))
                .collect(),
        )
    }

    /// Extract as i64 if this is a scalar integer key
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrimaryKey::Single(KeyComponent::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Components in canonical (descriptor) order.
    pub fn components(&self) -> Vec<&KeyComponent> {
        match self {
            PrimaryKey::Single(c) => vec![c],
            PrimaryKey::Composite(cs) => cs.iter().map(|(_, c)| c).collect(),
        }
    }

    /// Number of components.
    pub fn arity(&self) -> usize {
        match self {
            PrimaryKey::Single(_) => 1,
            PrimaryKey::Composite(cs) => cs.len(),
        }
    }
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimaryKey::Single(c) => write!(f, "{}", c),
            PrimaryKey::Composite(cs) => {
                let pairs: Vec<String> = cs.iter().map(|(n, c)| format!("{}:{}", n, c)).collect();
                write!(f, "{}", pairs.join(","))
            }
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        PrimaryKey::single(v)
    }
}

/// Identity-map lookup key: entity type name paired with the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub entity: &'static str,
    pub key: PrimaryKey,
}

impl Identity {
    pub fn new(entity: &'static str, key: PrimaryKey) -> Self {
        Self { entity, key }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.entity, self.key)
    }
}
