//! # seam-orm - Session-Scoped Persistence Runtime
//!
//! An identity-map / unit-of-work core for mapping record types onto a
//! row-oriented backing store.
//!
//! ## Features
//!
//! - **Identity map**: at most one managed instance per (entity type,
//!   primary key) within a session, shared as `Arc<T>`
//! - **Unit of work**: persist/update/remove schedule changes, `flush`
//!   writes them as one dependency-ordered batch
//! - **Associations**: plain key columns (`IdReference`) or lazy proxies
//!   (`LazyRef<T>`) resolved on first access
//! - **Composite keys**: scalar and multi-component identities as one
//!   `PrimaryKey` value
//! - **Queries**: typed criteria with optional eager fetch paths, plus
//!   native store statements that bypass the identity map
//!
//! ## Example
//!
//! ```rust,ignore
//! let registry = Arc::new(
//!     MappingRegistry::builder()
//!         .entity::<Team>()
//!         .entity::<Member>()
//!         .build()?,
//! );
//! let store = Arc::new(MemoryStore::new(&registry));
//! let mut uow = UnitOfWork::new(registry, store);
//!
//! let team = uow.persist(Team::new("engineering")).await?;
//! uow.persist(Member::new("kim", LazyRef::to(&team))).await?;
//! uow.flush().await?;
//! ```

pub mod error;
pub mod key;
pub mod mapping;
pub mod model;
pub mod proxy;
pub mod query;
pub mod store;
pub mod unit_of_work;

mod flush;

pub use error::{OrmError, OrmResult};
pub use key::{Identity, KeyComponent, KeyType, PrimaryKey};
pub use mapping::{
    AssociationDescriptor, AssociationStrategy, ColumnDescriptor, EntityDescriptor, KeyDescriptor,
    MappingRegistry, RegistryBuilder,
};
pub use model::{Entity, HydrationContext, LazyTarget};
pub use proxy::LazyRef;
pub use query::Query;
pub use store::{
    BackingStore, Filter, FilterOp, JoinSpec, MemoryStore, Row, RowExt, StoreOp, StoreQuery,
    StoreRow,
};
pub use unit_of_work::{SessionToken, UnitOfWork};
