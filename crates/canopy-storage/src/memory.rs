use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use canopy_core::model::{AccessControlList, NodeId, TenantId};
use tokio::sync::OwnedMutexGuard;

use crate::traits::{NodeLockSession, NodeStore, StorageError, StoreFactory};

#[derive(Debug, Clone, Default)]
struct StoredNode {
    parent: Option<NodeId>,
    children: BTreeSet<NodeId>,
}

#[derive(Debug, Default)]
struct InnerState {
    nodes: HashMap<NodeId, StoredNode>,
    acls: HashMap<NodeId, AccessControlList>,
}

impl InnerState {
    fn is_ancestor_or_self(&self, candidate: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == candidate {
                return true;
            }
            match self.nodes.get(&node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }
}

type LockTable = Arc<Mutex<HashMap<NodeId, Arc<tokio::sync::Mutex<()>>>>>;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InnerState>>,
    locks: LockTable,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        guard(&self.locks).len()
    }
}

impl NodeStore for InMemoryStore {
    type Session = InMemoryLockSession;

    async fn create_node(&self, id: NodeId, parent: Option<NodeId>) -> Result<(), StorageError> {
        let mut state = guard(&self.state);

        if state.nodes.contains_key(&id) {
            return Err(StorageError::NodeAlreadyExists(id));
        }
        if let Some(parent) = parent {
            let parent_node = state
                .nodes
                .get_mut(&parent)
                .ok_or(StorageError::ParentNotFound(parent))?;
            parent_node.children.insert(id);
        }

        state.nodes.insert(
            id,
            StoredNode {
                parent,
                children: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn set_parent(&self, id: NodeId, parent: NodeId) -> Result<(), StorageError> {
        let mut state = guard(&self.state);

        let old_parent = state
            .nodes
            .get(&id)
            .ok_or(StorageError::NodeNotFound(id))?
            .parent;
        if !state.nodes.contains_key(&parent) {
            return Err(StorageError::ParentNotFound(parent));
        }
        if state.is_ancestor_or_self(id, parent) {
            return Err(StorageError::CycleDetected { node: id, parent });
        }

        if let Some(old_parent) = old_parent
            && let Some(old) = state.nodes.get_mut(&old_parent)
        {
            old.children.remove(&id);
        }
        if let Some(new_parent) = state.nodes.get_mut(&parent) {
            new_parent.children.insert(id);
        }
        if let Some(node) = state.nodes.get_mut(&id) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    async fn get_parent(&self, id: NodeId) -> Result<Option<NodeId>, StorageError> {
        let state = guard(&self.state);
        state
            .nodes
            .get(&id)
            .map(|node| node.parent)
            .ok_or(StorageError::NodeNotFound(id))
    }

    async fn get_children(&self, id: NodeId) -> Result<Vec<NodeId>, StorageError> {
        let state = guard(&self.state);
        state
            .nodes
            .get(&id)
            .map(|node| node.children.iter().copied().collect())
            .ok_or(StorageError::NodeNotFound(id))
    }

    async fn put_acl(&self, acl: AccessControlList) -> Result<(), StorageError> {
        let mut state = guard(&self.state);
        if !state.nodes.contains_key(&acl.resource_id) {
            return Err(StorageError::NodeNotFound(acl.resource_id));
        }
        state.acls.insert(acl.resource_id, acl);
        Ok(())
    }

    async fn delete_acl(&self, id: NodeId) -> Result<bool, StorageError> {
        let mut state = guard(&self.state);
        Ok(state.acls.remove(&id).is_some())
    }

    async fn get_acl(&self, id: NodeId) -> Result<Option<AccessControlList>, StorageError> {
        let state = guard(&self.state);
        Ok(state.acls.get(&id).cloned())
    }

    async fn has_acl(&self, id: NodeId) -> Result<bool, StorageError> {
        let state = guard(&self.state);
        Ok(state.acls.contains_key(&id))
    }

    fn begin_lock_session(&self) -> InMemoryLockSession {
        InMemoryLockSession {
            table: Arc::clone(&self.locks),
            held: HashMap::new(),
        }
    }
}

/// Holds one `tokio` mutex guard per locked node. Dropping the session
/// releases the guards and forgets table entries nobody else refers to.
pub struct InMemoryLockSession {
    table: LockTable,
    held: HashMap<NodeId, OwnedMutexGuard<()>>,
}

impl InMemoryLockSession {
    #[cfg(test)]
    fn held(&self) -> BTreeSet<NodeId> {
        self.held.keys().copied().collect()
    }
}

impl Drop for InMemoryLockSession {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let ids: Vec<NodeId> = self.held.drain().map(|(id, _)| id).collect();

        // Waiters clone the mutex under the table lock, so a count of one
        // means the table holds the last reference.
        let mut table = guard(&self.table);
        for id in ids {
            if table.get(&id).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
                table.remove(&id);
            }
        }
    }
}

impl NodeLockSession for InMemoryLockSession {
    async fn lock_nodes(&mut self, ids: &[NodeId]) -> Result<(), StorageError> {
        for id in ids {
            if self.held.contains_key(id) {
                continue;
            }
            let mutex = Arc::clone(guard(&self.table).entry(*id).or_default());
            let node_guard = mutex.lock_owned().await;
            self.held.insert(*id, node_guard);
        }
        tracing::trace!(ids = ?ids, "node locks acquired");
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryStoreFactory {
    stores: Mutex<HashMap<TenantId, InMemoryStore>>,
}

impl InMemoryStoreFactory {
    pub fn new() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreFactory for InMemoryStoreFactory {
    type Store = InMemoryStore;

    fn for_tenant(&self, tenant_id: &TenantId) -> InMemoryStore {
        let mut stores = guard(&self.stores);
        stores
            .entry(tenant_id.clone())
            .or_insert_with(InMemoryStore::new)
            .clone()
    }
}
