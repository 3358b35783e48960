//! Flush Planning - Dependency ordering of pending operations
//!
//! A flush turns the session's pending operations into one batch of store
//! writes. Ordering constraints come from the mapping metadata: an insert
//! whose row references another pending insert runs after it, a delete whose
//! row references another pending delete runs before it. Within those
//! constraints the original scheduling order is kept. A reference cycle
//! among pending operations rejects the whole flush before any write.

use std::collections::HashMap;

use crate::error::{OrmError, OrmResult};
use crate::key::Identity;
use crate::mapping::MappingRegistry;
use crate::store::{Row, StoreOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingKind {
    Insert,
    Update,
    Delete,
}

/// One scheduled change, with the row image captured at scheduling time.
#[derive(Debug, Clone)]
pub(crate) struct PendingOp {
    pub seq: usize,
    pub kind: PendingKind,
    pub identity: Identity,
    pub row: Row,
}

/// Store-ready write batch in dependency order.
#[derive(Debug)]
pub(crate) struct FlushPlan {
    pub ops: Vec<StoreOp>,
}

impl FlushPlan {
    pub(crate) fn build(pending: &[PendingOp], registry: &MappingRegistry) -> OrmResult<FlushPlan> {
        let order = plan_order(pending, registry)?;

        let mut ops = Vec::with_capacity(order.len());
        for idx in order {
            let op = &pending[idx];
            let descriptor = registry.descriptor(op.identity.entity)?;
            ops.push(match op.kind {
                PendingKind::Insert => StoreOp::Insert {
                    table: descriptor.table.to_string(),
                    row: op.row.clone(),
                },
                PendingKind::Update => StoreOp::Update {
                    table: descriptor.table.to_string(),
                    key: descriptor.key.key_to_row(&op.identity.key)?,
                    row: op.row.clone(),
                },
                PendingKind::Delete => StoreOp::Delete {
                    table: descriptor.table.to_string(),
                    key: descriptor.key.key_to_row(&op.identity.key)?,
                },
            });
        }
        Ok(FlushPlan { ops })
    }
}

/// Topological order over the pending operations, stable by scheduling
/// sequence among unconstrained operations.
fn plan_order(pending: &[PendingOp], registry: &MappingRegistry) -> OrmResult<Vec<usize>> {
    let n = pending.len();
    let mut insert_at: HashMap<&Identity, usize> = HashMap::new();
    let mut delete_at: HashMap<&Identity, usize> = HashMap::new();
    for (idx, op) in pending.iter().enumerate() {
        match op.kind {
            PendingKind::Insert => {
                insert_at.insert(&op.identity, idx);
            }
            PendingKind::Delete => {
                delete_at.insert(&op.identity, idx);
            }
            PendingKind::Update => {}
        }
    }

    // edges[a] holds b where a must run before b
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    let add_edge = |edges: &mut Vec<Vec<usize>>, indegree: &mut Vec<usize>, a: usize, b: usize| {
        if a != b {
            edges[a].push(b);
            indegree[b] += 1;
        }
    };

    for (idx, op) in pending.iter().enumerate() {
        let descriptor = registry.descriptor(op.identity.entity)?;
        for association in &descriptor.associations {
            let target = registry.association_target(association)?;
            let Some(target_key) = association.target_key(&op.row, &target.key)? else {
                continue;
            };
            let target_identity = Identity::new(target.entity, target_key);
            match op.kind {
                PendingKind::Insert | PendingKind::Update => {
                    // referenced row must exist before this write lands
                    if let Some(&parent) = insert_at.get(&target_identity) {
                        add_edge(&mut edges, &mut indegree, parent, idx);
                    }
                }
                PendingKind::Delete => {
                    // this row must be gone before its referent is deleted
                    if let Some(&parent) = delete_at.get(&target_identity) {
                        add_edge(&mut edges, &mut indegree, idx, parent);
                    }
                }
            }
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];
    for _ in 0..n {
        let next = (0..n)
            .filter(|&i| !placed[i] && indegree[i] == 0)
            .min_by_key(|&i| pending[i].seq);
        let Some(next) = next else {
            let stuck: Vec<String> = (0..n)
                .filter(|&i| !placed[i])
                .map(|i| pending[i].identity.to_string())
                .collect();
            return Err(OrmError::FlushCycle(stuck.join(", ")));
        };
        placed[next] = true;
        for &b in &edges[next] {
            indegree[b] -= 1;
        }
        order.push(next);
    }
    Ok(order)
}
