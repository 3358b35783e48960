//! Unit of Work - Session-scoped identity map and write scheduling
//!
//! A `UnitOfWork` owns the first-level cache for one logical session: at
//! most one managed instance per (entity type, primary key), shared as
//! `Arc<T>`. State changes are scheduled against the session and only reach
//! the backing store on `flush`, as one dependency-ordered batch. `clear`
//! detaches everything and invalidates outstanding lazy references hydrated
//! by this session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{OrmError, OrmResult};
use crate::flush::{FlushPlan, PendingKind, PendingOp};
use crate::key::{Identity, PrimaryKey};
use crate::mapping::MappingRegistry;
use crate::model::{Entity, ErasedEntity, HydrationContext, LazyTarget};
use crate::query::Query;
use crate::store::{BackingStore, Row};

static NEXT_UOW_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one session generation. Lazy references hydrated by a session
/// carry its token and become stale when the epoch moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken {
    uow: u64,
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UowState {
    Active,
    Flushing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityState {
    Managed,
    Removed,
}

struct Slot {
    entity: ErasedEntity,
    state: EntityState,
}

/// Session-scoped persistence context.
pub struct UnitOfWork {
    id: u64,
    epoch: u64,
    state: UowState,
    registry: Arc<MappingRegistry>,
    store: Arc<dyn BackingStore>,
    identity: HashMap<Identity, Slot>,
    pending: Vec<PendingOp>,
    next_seq: usize,
}

impl UnitOfWork {
    pub fn new(registry: Arc<MappingRegistry>, store: Arc<dyn BackingStore>) -> Self {
        let id = NEXT_UOW_ID.fetch_add(1, Ordering::Relaxed);
        debug!(uow = id, "unit of work opened");
        Self {
            id,
            epoch: 0,
            state: UowState::Active,
            registry,
            store,
            identity: HashMap::new(),
            pending: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Token naming the current session generation.
    pub fn token(&self) -> SessionToken {
        SessionToken {
            uow: self.id,
            epoch: self.epoch,
        }
    }

    pub(crate) fn token_valid(&self, token: SessionToken) -> bool {
        self.state != UowState::Closed && token.uow == self.id && token.epoch == self.epoch
    }

    fn ensure_active(&self) -> OrmResult<()> {
        match self.state {
            UowState::Active => Ok(()),
            _ => Err(OrmError::StaleReference),
        }
    }

    /// Whether the identity map currently holds a managed instance for the
    /// given key.
    pub fn is_managed<T: Entity>(&self, key: &PrimaryKey) -> bool {
        let identity = Identity::new(T::entity_name(), key.clone());
        matches!(
            self.identity.get(&identity),
            Some(slot) if slot.state == EntityState::Managed
        )
    }

    /// Number of operations scheduled but not yet flushed.
    pub fn pending_ops(&self) -> usize {
        self.pending.len()
    }

    /// Look up an entity by primary key.
    ///
    /// An identity-map hit returns the managed instance without a store
    /// round trip. A miss fetches, hydrates, and registers. Entities marked
    /// removed in this session are not found.
    pub async fn find<T: Entity>(&mut self, key: &PrimaryKey) -> OrmResult<Option<Arc<T>>> {
        self.ensure_active()?;
        let identity = Identity::new(T::entity_name(), key.clone());
        if let Some(slot) = self.identity.get(&identity) {
            return match slot.state {
                EntityState::Removed => Ok(None),
                EntityState::Managed => {
                    debug!(%identity, "identity map hit");
                    Ok(Some(downcast_slot::<T>(&slot.entity, &identity)?))
                }
            };
        }

        let descriptor = T::descriptor();
        let key_row = descriptor.key.key_to_row(key)?;
        let Some(row) = self.store.fetch_one(descriptor.table, &key_row).await? else {
            return Ok(None);
        };
        Ok(Some(self.hydrate::<T>(&row)?))
    }

    /// Make a new entity managed and schedule its insert.
    ///
    /// Entities with a generated key get one reserved from the store here,
    /// so the key is readable before flush. Fails with `TransientReference`
    /// when a lazy association points at a target not managed by this unit
    /// of work, and with `DuplicateIdentity` when the identity is already in
    /// the map.
    pub async fn persist<T: Entity>(&mut self, mut entity: T) -> OrmResult<Arc<T>> {
        self.ensure_active()?;
        let descriptor = T::descriptor();

        for (association, target) in entity.lazy_targets() {
            let Some(target) = target else { continue };
            let transient = || OrmError::TransientReference {
                entity: descriptor.entity,
                association: association.to_string(),
            };
            match target {
                LazyTarget::Pending => return Err(transient()),
                LazyTarget::Attached(key) => {
                    let target_entity = descriptor
                        .association(association)
                        .ok_or_else(|| {
                            OrmError::Mapping(format!(
                                "entity '{}' reports unknown association '{association}'",
                                descriptor.entity
                            ))
                        })?
                        .target;
                    let target_identity = Identity::new(target_entity, key);
                    let managed = matches!(
                        self.identity.get(&target_identity),
                        Some(slot) if slot.state == EntityState::Managed
                    );
                    if !managed {
                        return Err(transient());
                    }
                }
            }
        }

        let key = match entity.primary_key() {
            Some(key) => key,
            None if descriptor.key.generated => {
                let reserved = self.store.reserve_key(descriptor.table).await?;
                let key = PrimaryKey::single(reserved);
                entity.set_primary_key(key.clone());
                key
            }
            None => {
                return Err(OrmError::Mapping(format!(
                    "entity '{}' has a natural key and must carry it before persist",
                    descriptor.entity
                )))
            }
        };

        let identity = Identity::new(descriptor.entity, key);
        if self.identity.contains_key(&identity) {
            return Err(OrmError::DuplicateIdentity(identity.to_string()));
        }

        let row = entity.to_row();
        let entity = Arc::new(entity);
        self.identity.insert(
            identity.clone(),
            Slot {
                entity: entity.clone(),
                state: EntityState::Managed,
            },
        );
        debug!(%identity, "entity persisted");
        self.schedule(PendingKind::Insert, identity, row);
        Ok(entity)
    }

    /// Replace the managed instance with a modified copy and schedule the
    /// update. Repeated updates of the same entity coalesce into one write.
    pub fn update<T: Entity>(&mut self, entity: T) -> OrmResult<Arc<T>> {
        self.ensure_active()?;
        let descriptor = T::descriptor();
        let key = entity.primary_key().ok_or_else(|| {
            OrmError::Mapping(format!(
                "entity '{}' has no primary key to update by",
                descriptor.entity
            ))
        })?;
        let identity = Identity::new(descriptor.entity, key);

        let row = entity.to_row();
        let entity = Arc::new(entity);
        match self.identity.get_mut(&identity) {
            Some(slot) if slot.state == EntityState::Managed => {
                slot.entity = entity.clone();
            }
            _ => return Err(OrmError::StaleReference),
        }

        // coalesce into the latest scheduled write for this identity
        if let Some(op) = self
            .pending
            .iter_mut()
            .find(|op| op.identity == identity && op.kind != PendingKind::Delete)
        {
            op.row = row;
        } else {
            self.schedule(PendingKind::Update, identity, row);
        }
        Ok(entity)
    }

    /// Mark a managed entity removed and schedule its delete. Removing an
    /// entity whose insert is still pending cancels both.
    pub fn remove<T: Entity>(&mut self, entity: &T) -> OrmResult<()> {
        self.ensure_active()?;
        let descriptor = T::descriptor();
        let key = entity.primary_key().ok_or_else(|| {
            OrmError::Mapping(format!(
                "entity '{}' has no primary key to remove by",
                descriptor.entity
            ))
        })?;
        let identity = Identity::new(descriptor.entity, key);
        match self.identity.get_mut(&identity) {
            Some(slot) if slot.state == EntityState::Managed => slot.state = EntityState::Removed,
            _ => return Err(OrmError::StaleReference),
        }

        let had_insert = self
            .pending
            .iter()
            .any(|op| op.identity == identity && op.kind == PendingKind::Insert);
        self.pending.retain(|op| op.identity != identity);
        if had_insert {
            // never reached the store, nothing to delete there
            self.identity.remove(&identity);
        } else {
            self.schedule(PendingKind::Delete, identity, entity.to_row());
        }
        Ok(())
    }

    /// Write every pending operation to the store as one dependency-ordered
    /// batch. On failure nothing is cleared and the store is untouched.
    pub async fn flush(&mut self) -> OrmResult<()> {
        self.ensure_active()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        self.state = UowState::Flushing;
        let result = self.flush_inner().await;
        self.state = UowState::Active;
        if let Err(error) = &result {
            warn!(uow = self.id, %error, "flush rejected");
        }
        result
    }

    async fn flush_inner(&mut self) -> OrmResult<()> {
        let plan = FlushPlan::build(&self.pending, &self.registry)?;
        debug!(uow = self.id, ops = plan.ops.len(), "executing flush plan");
        self.store.execute_batch(&plan.ops).await?;
        self.pending.clear();
        self.identity
            .retain(|_, slot| slot.state == EntityState::Managed);
        Ok(())
    }

    /// Detach every managed entity and drop unflushed work. Lazy references
    /// hydrated before the clear become stale.
    pub fn clear(&mut self) {
        debug!(uow = self.id, dropped = self.pending.len(), "session cleared");
        self.identity.clear();
        self.pending.clear();
        self.epoch += 1;
    }

    /// Close the session. Unflushed work is dropped.
    pub fn close(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                uow = self.id,
                dropped = self.pending.len(),
                "unit of work closed with pending operations"
            );
        }
        self.identity.clear();
        self.pending.clear();
        self.epoch += 1;
        self.state = UowState::Closed;
    }

    /// Run a typed query. Each result row hydrates through the identity
    /// map, so rows whose identity is already managed come back as the
    /// existing instance. Eager-fetched association targets are registered
    /// the same way.
    pub async fn query<T: Entity>(&mut self, query: Query<T>) -> OrmResult<Vec<Arc<T>>> {
        self.ensure_active()?;
        let descriptor = T::descriptor();
        let store_query = query.to_store_query(descriptor, &self.registry)?;
        let rows = self.store.fetch_many(&store_query).await?;
        debug!(entity = descriptor.entity, rows = rows.len(), "query fetched");

        let mut results = Vec::with_capacity(rows.len());
        for store_row in &rows {
            let mut preloaded: HashMap<Identity, ErasedEntity> = HashMap::new();
            for join in &store_query.joins {
                let Some(Some(target_row)) = store_row.joined.get(&join.association) else {
                    continue;
                };
                let association = descriptor.association(&join.association).ok_or_else(|| {
                    OrmError::Query(format!("unknown fetch path '{}'", join.association))
                })?;
                let target = self.registry.binding(association.target)?;
                let target_identity = Identity::new(
                    target.descriptor.entity,
                    target.descriptor.key.key_from_row(target_row)?,
                );
                let existing = match self.identity.get(&target_identity) {
                    Some(slot) if slot.state == EntityState::Managed => Some(slot.entity.clone()),
                    Some(_) => continue,
                    None => None,
                };
                let erased = match existing {
                    Some(erased) => erased,
                    None => {
                        let ctx = HydrationContext::new(self.token(), target.descriptor);
                        let erased = (target.loader)(target_row, &ctx)?;
                        self.identity.insert(
                            target_identity.clone(),
                            Slot {
                                entity: erased.clone(),
                                state: EntityState::Managed,
                            },
                        );
                        erased
                    }
                };
                preloaded.insert(target_identity, erased);
            }

            let identity = Identity::new(descriptor.entity, descriptor.key.key_from_row(&store_row.row)?);
            let existing = match self.identity.get(&identity) {
                Some(slot) if slot.state == EntityState::Managed => {
                    Some(downcast_slot::<T>(&slot.entity, &identity)?)
                }
                Some(_) => continue,
                None => None,
            };
            let entity = match existing {
                Some(entity) => entity,
                None => {
                    let ctx = HydrationContext::with_preloaded(self.token(), descriptor, &preloaded);
                    let entity = Arc::new(T::from_row(&store_row.row, &ctx)?);
                    self.identity.insert(
                        identity,
                        Slot {
                            entity: entity.clone(),
                            state: EntityState::Managed,
                        },
                    );
                    entity
                }
            };
            results.push(entity);
        }
        Ok(results)
    }

    /// Run a native store statement. Results bypass hydration and the
    /// identity map entirely.
    pub async fn native_query(&self, statement: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        self.ensure_active()?;
        self.store.fetch_native(statement, params).await
    }

    /// Fetch one row for a lazy reference and reconcile it through the
    /// identity map. Always costs a round trip; an already-managed identity
    /// wins over the freshly fetched row.
    pub(crate) async fn resolve_lazy<T: Entity>(
        &mut self,
        key: &PrimaryKey,
    ) -> OrmResult<Option<Arc<T>>> {
        self.ensure_active()?;
        let descriptor = T::descriptor();
        let key_row = descriptor.key.key_to_row(key)?;
        let Some(row) = self.store.fetch_one(descriptor.table, &key_row).await? else {
            return Ok(None);
        };
        let identity = Identity::new(descriptor.entity, key.clone());
        if let Some(slot) = self.identity.get(&identity) {
            return match slot.state {
                EntityState::Removed => Ok(None),
                EntityState::Managed => Ok(Some(downcast_slot::<T>(&slot.entity, &identity)?)),
            };
        }
        Ok(Some(self.hydrate::<T>(&row)?))
    }

    fn hydrate<T: Entity>(&mut self, row: &Row) -> OrmResult<Arc<T>> {
        let descriptor = T::descriptor();
        let identity = Identity::new(descriptor.entity, descriptor.key.key_from_row(row)?);
        let ctx = HydrationContext::new(self.token(), descriptor);
        let entity = Arc::new(T::from_row(row, &ctx)?);
        self.identity.insert(
            identity,
            Slot {
                entity: entity.clone(),
                state: EntityState::Managed,
            },
        );
        Ok(entity)
    }

    fn schedule(&mut self, kind: PendingKind, identity: Identity, row: Row) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(PendingOp {
            seq,
            kind,
            identity,
            row,
        });
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.state != UowState::Closed && !self.pending.is_empty() {
            warn!(
                uow = self.id,
                dropped = self.pending.len(),
                "unit of work dropped with pending operations"
            );
        }
    }
}

fn downcast_slot<T: Entity>(erased: &ErasedEntity, identity: &Identity) -> OrmResult<Arc<T>> {
    erased
        .clone()
        .downcast::<T>()
        .map_err(|_| OrmError::Serialization(format!("identity {identity} holds a different type")))
}
