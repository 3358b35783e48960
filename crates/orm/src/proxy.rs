//! Lazy Reference Proxies - Deferred single-valued association loading
//!
//! A `LazyRef<T>` stands in for an associated entity without fetching it.
//! The first `get` performs exactly one store round trip, reconciles the
//! result through the session's identity map, and caches the managed
//! instance; later calls return the cached instance without touching the
//! store. A reference binds to the session that hydrated or initialized it
//! and refuses to resolve once that session is cleared or closed.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{OrmError, OrmResult};
use crate::key::PrimaryKey;
use crate::model::{Entity, LazyTarget};
use crate::unit_of_work::{SessionToken, UnitOfWork};

/// Uninitialized-by-default reference to an associated entity.
///
/// The cell records which session resolved the target, so an initialized
/// reference is only valid against that same session generation.
#[derive(Debug, Clone)]
pub struct LazyRef<T: Entity> {
    key: Option<PrimaryKey>,
    session: Option<SessionToken>,
    cell: OnceCell<(SessionToken, Arc<T>)>,
}

impl<T: Entity> LazyRef<T> {
    /// Reference an in-memory target directly. The target's current key is
    /// captured; a keyless target makes the owner unpersistable until the
    /// target is persisted first.
    pub fn to(target: &T) -> Self {
        Self {
            key: target.primary_key(),
            session: None,
            cell: OnceCell::new(),
        }
    }

    /// Reference a target by key alone, without loading it.
    pub fn to_key(key: impl Into<PrimaryKey>) -> Self {
        Self {
            key: Some(key.into()),
            session: None,
            cell: OnceCell::new(),
        }
    }

    /// Uninitialized reference bound to the hydrating session.
    pub(crate) fn hydrated(key: PrimaryKey, session: SessionToken) -> Self {
        Self {
            key: Some(key),
            session: Some(session),
            cell: OnceCell::new(),
        }
    }

    /// Already-initialized reference, used by eager fetch.
    pub(crate) fn preloaded(key: PrimaryKey, session: SessionToken, entity: Arc<T>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set((session, entity));
        Self {
            key: Some(key),
            session: Some(session),
            cell,
        }
    }

    /// Target key, if the target has one.
    pub fn key(&self) -> Option<&PrimaryKey> {
        self.key.as_ref()
    }

    /// Whether the target has been loaded (or was attached in memory).
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Target state for the owner's persist-time checks.
    pub fn target(&self) -> LazyTarget {
        match &self.key {
            Some(key) => LazyTarget::Attached(key.clone()),
            None => LazyTarget::Pending,
        }
    }

    /// Resolve the target, initializing on first access.
    ///
    /// Initialization always costs one store round trip, then reconciles
    /// through the identity map so the instance handed back is the session's
    /// managed one. The reference binds to the resolving session at that
    /// point; whichever session hydrated or initialized it, `get` fails with
    /// `StaleReference` once that session is cleared or closed, and with
    /// `DanglingReference` when the target row does not exist.
    pub async fn get(&self, uow: &mut UnitOfWork) -> OrmResult<Arc<T>> {
        if let Some(session) = self.session {
            if !uow.token_valid(session) {
                return Err(OrmError::StaleReference);
            }
        }
        if let Some((session, entity)) = self.cell.get() {
            if !uow.token_valid(*session) {
                return Err(OrmError::StaleReference);
            }
            return Ok(Arc::clone(entity));
        }
        let key = self.key.clone().ok_or_else(|| OrmError::TransientReference {
            entity: T::entity_name(),
            association: "unresolved lazy reference".to_string(),
        })?;
        let entity = uow
            .resolve_lazy::<T>(&key)
            .await?
            .ok_or(OrmError::DanglingReference {
                entity: T::entity_name(),
                key,
            })?;
        let (_, entity) = self.cell.get_or_init(|| (uow.token(), entity));
        Ok(Arc::clone(entity))
    }
}

impl<T: Entity> From<&T> for LazyRef<T> {
    fn from(target: &T) -> Self {
        LazyRef::to(target)
    }
}
