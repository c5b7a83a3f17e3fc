//! Transaction buffering and commit reconciliation

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use tracing::debug;

use crate::model::{DescriptorRef, EntityKind, EntityRef};
use crate::pdu::response::CommitResponse;

/// Insertion-ordered map keyed by the entity's current id. Re-inserting an
/// id is idempotent: membership, not count, and the last handle wins.
#[derive(Default)]
pub struct OrderedIdMap {
    order: Vec<i64>,
    entries: HashMap<i64, EntityRef>,
}

impl OrderedIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: &EntityRef) {
        let id = entity.borrow().key_id();
        if !self.entries.contains_key(&id) {
            self.order.push(id);
        }
        self.entries.insert(id, entity.clone());
    }

    pub fn get(&self, id: i64) -> Option<EntityRef> {
        self.entries.get(&id).cloned()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Entities in first-insertion order.
    pub fn values(&self) -> Vec<EntityRef> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

/// Commit lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    Pending,
    Committing,
}

/// Per-connection pending change set: added, changed and removed entities
/// keyed by their client-visible ids.
pub struct TransactionBuffer {
    state: TxnState,
    added: OrderedIdMap,
    changed: OrderedIdMap,
    removed: OrderedIdMap,
}

impl Default for TransactionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuffer {
    pub fn new() -> Self {
        Self {
            state: TxnState::Idle,
            added: OrderedIdMap::new(),
            changed: OrderedIdMap::new(),
            removed: OrderedIdMap::new(),
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn added(&self) -> &OrderedIdMap {
        &self.added
    }

    pub fn changed(&self) -> &OrderedIdMap {
        &self.changed
    }

    pub fn removed(&self) -> &OrderedIdMap {
        &self.removed
    }

    pub fn insert_entity(&mut self, entity: &EntityRef) {
        self.added.insert(entity);
        self.state = TxnState::Pending;
    }

    pub fn update_entity(&mut self, entity: &EntityRef) {
        self.changed.insert(entity);
        self.state = TxnState::Pending;
    }

    pub fn delete_entity(&mut self, entity: &EntityRef) {
        self.removed.insert(entity);
        self.state = TxnState::Pending;
    }

    /// Cascading inclusion: every existing (non-new) endpoint of an edge in
    /// any buffer joins the changed set, so the server can validate and
    /// advance its version together with the edge mutation. Endpoints
    /// already scheduled for removal stay out of the changed set.
    pub fn cascade_endpoints(&mut self) {
        let mut endpoints: Vec<EntityRef> = Vec::new();
        for buffer in [&self.added, &self.changed, &self.removed] {
            for entity in buffer.values() {
                if entity.borrow().kind() != EntityKind::Edge {
                    continue;
                }
                let Some((from, to)) = entity.borrow().endpoints() else {
                    continue;
                };
                endpoints.push(from);
                endpoints.push(to);
            }
        }
        for node in endpoints {
            let id = {
                let n = node.borrow();
                if n.is_new() {
                    continue;
                }
                n.key_id()
            };
            if self.removed.contains(id) {
                continue;
            }
            debug!(node = id, "existing endpoint joins the changed set");
            self.changed.insert(&node);
        }
    }

    /// Enter the in-flight state. Buffers stay intact so a failed exchange
    /// can fall back to `abort_commit`.
    pub fn begin_commit(&mut self) {
        self.state = TxnState::Committing;
    }

    /// A failed commit leaves every buffer untouched for retry or rollback.
    pub fn abort_commit(&mut self) {
        self.state = TxnState::Pending;
    }

    /// Apply the server's fixups after a successful commit, then reset the
    /// dirty tracking and empty all buffers.
    pub fn apply_fixups(&mut self, response: &CommitResponse, new_descriptors: &[DescriptorRef]) {
        for (temp_id, real_id) in &response.descriptor_fixups {
            for desc in new_descriptors {
                let matches = desc.borrow().id() == *temp_id;
                if matches {
                    debug!(temp_id, real_id, "descriptor id fixed up");
                    desc.borrow_mut().set_id(*real_id);
                    break;
                }
            }
        }

        for (temp_id, real_id, version) in &response.added_fixups {
            if let Some(entity) = self.added.get(*temp_id) {
                debug!(temp_id, real_id, "added entity id fixed up");
                let mut e = entity.borrow_mut();
                e.set_entity_id(*real_id);
                e.set_version(*version as i32);
                e.set_is_new(false);
            }
        }

        for (id, version) in &response.updated_fixups {
            if let Some(entity) = self.changed.get(*id) {
                debug!(id, version, "updated entity version advanced");
                entity.borrow_mut().set_version(*version as i32);
            }
        }

        for entity in self.removed.values() {
            entity.borrow_mut().mark_deleted();
        }

        for entity in self.changed.values() {
            entity.borrow_mut().reset_modified_attributes();
        }
        for entity in self.added.values() {
            entity.borrow_mut().reset_modified_attributes();
        }

        self.clear();
    }

    /// Discard every pending change without contacting the server.
    pub fn rollback(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.added.clear();
        self.changed.clear();
        self.removed.clear();
        self.state = TxnState::Idle;
    }
}
