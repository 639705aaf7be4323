use std::sync::Arc;

use canopy_core::engine::{AclReader, EngineError, HierarchyReader, LockSession, NodeLocker};
use canopy_core::model::{AccessControlList, NodeId};
use canopy_storage::{NodeLockSession, NodeStore, StorageError};

fn to_engine_error(err: StorageError) -> EngineError {
    match err {
        StorageError::NodeNotFound(id) => EngineError::NodeNotFound(id),
        other => EngineError::Storage(other.to_string()),
    }
}

/// Exposes a [`NodeStore`] through the engine's read and lock traits.
pub struct StoreHierarchy<S: NodeStore> {
    store: Arc<S>,
}

impl<S: NodeStore> StoreHierarchy<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: NodeStore> HierarchyReader for StoreHierarchy<S> {
    async fn get_parent(&self, node: NodeId) -> Result<Option<NodeId>, EngineError> {
        self.store.get_parent(node).await.map_err(to_engine_error)
    }

    async fn get_children(&self, node: NodeId) -> Result<Vec<NodeId>, EngineError> {
        self.store.get_children(node).await.map_err(to_engine_error)
    }
}

impl<S: NodeStore> AclReader for StoreHierarchy<S> {
    async fn get_acl(&self, node: NodeId) -> Result<Option<AccessControlList>, EngineError> {
        self.store.get_acl(node).await.map_err(to_engine_error)
    }

    async fn has_acl(&self, node: NodeId) -> Result<bool, EngineError> {
        self.store.has_acl(node).await.map_err(to_engine_error)
    }
}

impl<S: NodeStore> NodeLocker for StoreHierarchy<S> {
    type Session = StoreLockSession<S::Session>;

    fn begin(&self) -> Self::Session {
        StoreLockSession(self.store.begin_lock_session())
    }
}

pub struct StoreLockSession<T>(T);

impl<T: NodeLockSession> LockSession for StoreLockSession<T> {
    async fn lock_nodes(&mut self, ids: &[NodeId]) -> Result<(), EngineError> {
        self.0.lock_nodes(ids).await.map_err(to_engine_error)
    }
}
