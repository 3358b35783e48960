//! Core Entity Trait - Contract between user-defined record types and the
//! persistence runtime
//!
//! An entity converts itself to and from the row value model
//! (`HashMap<String, serde_json::Value>`), names its descriptor, and exposes
//! its primary key. Hydration of association fields goes through the
//! `HydrationContext` handed to `from_row`, which binds lazy references to
//! the current session and serves pre-fetched targets in eager mode.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{OrmError, OrmResult};
use crate::key::{Identity, PrimaryKey};
use crate::mapping::{AssociationStrategy, EntityDescriptor};
use crate::proxy::LazyRef;
use crate::store::Row;
use crate::unit_of_work::SessionToken;

/// A type-erased managed entity, as held in identity-map slots.
pub(crate) type ErasedEntity = Arc<dyn Any + Send + Sync>;

/// Monomorphized hydration entry point stored in the registry, used when the
/// concrete entity type is only known through an association descriptor.
pub(crate) type ErasedLoader = fn(&Row, &HydrationContext<'_>) -> OrmResult<ErasedEntity>;

pub(crate) fn erased_loader<T: Entity>(
    row: &Row,
    ctx: &HydrationContext<'_>,
) -> OrmResult<ErasedEntity> {
    let entity: ErasedEntity = Arc::new(T::from_row(row, ctx)?);
    Ok(entity)
}

/// State of one lazy association field, as reported by `Entity::lazy_targets`
/// for the persist-time transient-reference check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LazyTarget {
    /// Reference to a target that carries a key
    Attached(PrimaryKey),
    /// Reference to a keyless transient target
    Pending,
}

/// Core trait for persistent entity types.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    /// Static mapping metadata for this type.
    fn descriptor() -> &'static EntityDescriptor;

    /// Logical entity type name, the identity-map namespace.
    fn entity_name() -> &'static str {
        Self::descriptor().entity
    }

    /// Backing table name.
    fn table_name() -> &'static str {
        Self::descriptor().table
    }

    /// Current primary key, `None` while transient with a generated key.
    fn primary_key(&self) -> Option<PrimaryKey>;

    /// Install a store-generated key. Entities with natural keys never
    /// receive this call.
    fn set_primary_key(&mut self, _key: PrimaryKey) {}

    /// Full row image of the current attribute values, foreign-key columns
    /// included.
    fn to_row(&self) -> Row;

    /// Hydrate an instance from a row. Lazy association fields are built
    /// through `ctx.lazy_ref`.
    fn from_row(row: &Row, ctx: &HydrationContext<'_>) -> OrmResult<Self>
    where
        Self: Sized;

    /// Current state of every lazy association field, by association name.
    /// Entities without lazy associations keep the default.
    fn lazy_targets(&self) -> Vec<(&'static str, Option<LazyTarget>)> {
        Vec::new()
    }
}

/// Per-hydration context: the session the produced entity belongs to, the
/// owner's descriptor, and (in eager-fetch mode) targets already fetched in
/// the same round trip.
pub struct HydrationContext<'a> {
    session: SessionToken,
    descriptor: &'static EntityDescriptor,
    preloaded: Option<&'a HashMap<Identity, ErasedEntity>>,
}

impl<'a> HydrationContext<'a> {
    pub(crate) fn new(session: SessionToken, descriptor: &'static EntityDescriptor) -> Self {
        Self {
            session,
            descriptor,
            preloaded: None,
        }
    }

    pub(crate) fn with_preloaded(
        session: SessionToken,
        descriptor: &'static EntityDescriptor,
        preloaded: &'a HashMap<Identity, ErasedEntity>,
    ) -> Self {
        Self {
            session,
            descriptor,
            preloaded: Some(preloaded),
        }
    }

    /// Build the lazy reference for one association field from the owner's
    /// row. `None` when every foreign-key column is null. In eager-fetch
    /// mode the reference comes back already initialized.
    pub fn lazy_ref<T: Entity>(&self, row: &Row, association: &str) -> OrmResult<Option<LazyRef<T>>> {
        let descriptor = self.descriptor.association(association).ok_or_else(|| {
            OrmError::Mapping(format!(
                "entity '{}' has no association '{association}'",
                self.descriptor.entity
            ))
        })?;
        if descriptor.strategy != AssociationStrategy::LazyObjectReference {
            return Err(OrmError::Mapping(format!(
                "association '{association}' on '{}' is not a lazy object reference",
                self.descriptor.entity
            )));
        }
        if descriptor.target != T::entity_name() {
            return Err(OrmError::Mapping(format!(
                "association '{association}' targets '{}', not '{}'",
                descriptor.target,
                T::entity_name()
            )));
        }

        let Some(key) = descriptor.target_key(row, &T::descriptor().key)? else {
            return Ok(None);
        };

        if let Some(preloaded) = self.preloaded {
            let identity = Identity::new(T::entity_name(), key.clone());
            if let Some(erased) = preloaded.get(&identity) {
                let entity = erased.clone().downcast::<T>().map_err(|_| {
                    OrmError::Serialization(format!("preloaded {identity} holds a different type"))
                })?;
                return Ok(Some(LazyRef::preloaded(key, self.session, entity)));
            }
        }

        Ok(Some(LazyRef::hydrated(key, self.session)))
    }
}
