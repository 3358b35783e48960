//! Error types for the persistence runtime
//!
//! Every failure mode of the unit of work, the lazy proxies, the flush
//! planner, and the backing store adapter maps onto one variant here.

use crate::key::PrimaryKey;

/// Result type alias for runtime operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for persistence operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrmError {
    /// An entity was persisted while holding a lazy reference to a target
    /// that is neither managed nor persisted in the same unit of work.
    #[error("association '{association}' on '{entity}' references a transient target")]
    TransientReference {
        entity: &'static str,
        association: String,
    },

    /// A lazy proxy initialized against a row that no longer exists.
    #[error("lazy reference to '{entity}' with key {key} targets a missing row")]
    DanglingReference {
        entity: &'static str,
        key: PrimaryKey,
    },

    /// The backing store rejected a flush operation; the whole batch was
    /// aborted and nothing was written.
    #[error("store constraint violation: {0}")]
    StoreConstraint(String),

    /// The foreign-key dependency graph among pending operations is cyclic.
    #[error("cyclic dependency among pending operations: {0}")]
    FlushCycle(String),

    /// An entity, proxy, or unit of work was used after its session closed
    /// or was cleared.
    #[error("entity or proxy used outside its unit of work scope")]
    StaleReference,

    /// An identity was persisted while already managed.
    #[error("identity {0} is already managed by this unit of work")]
    DuplicateIdentity(String),

    /// Inconsistent or incomplete mapping metadata.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Malformed query or native statement.
    #[error("query error: {0}")]
    Query(String),

    /// Row to entity conversion failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backing store failure outside the constraint taxonomy.
    #[error("store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}
