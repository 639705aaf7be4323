use canopy_core::model::{AccessControlList, NodeId, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("node already exists: {0}")]
    NodeAlreadyExists(NodeId),
    #[error("parent not found: {0}")]
    ParentNotFound(NodeId),
    #[error("moving {node} under {parent} would create a cycle")]
    CycleDetected { node: NodeId, parent: NodeId },
    #[error("internal storage error: {0}")]
    Internal(String),
}

pub trait NodeStore: Send + Sync {
    type Session: NodeLockSession;

    fn create_node(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Records a new parent edge. Rejects edges that would make `id` its own
    /// ancestor.
    fn set_parent(
        &self,
        id: NodeId,
        parent: NodeId,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_parent(
        &self,
        id: NodeId,
    ) -> impl Future<Output = Result<Option<NodeId>, StorageError>> + Send;

    fn get_children(
        &self,
        id: NodeId,
    ) -> impl Future<Output = Result<Vec<NodeId>, StorageError>> + Send;

    fn put_acl(
        &self,
        acl: AccessControlList,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Returns whether an ACL was removed.
    fn delete_acl(&self, id: NodeId) -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn get_acl(
        &self,
        id: NodeId,
    ) -> impl Future<Output = Result<Option<AccessControlList>, StorageError>> + Send;

    fn has_acl(&self, id: NodeId) -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn begin_lock_session(&self) -> Self::Session;
}

/// Exclusive named-key locks held until the session is dropped.
pub trait NodeLockSession: Send {
    fn lock_nodes(
        &mut self,
        ids: &[NodeId],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

pub trait StoreFactory: Send + Sync {
    type Store: NodeStore;

    fn for_tenant(&self, tenant_id: &TenantId) -> Self::Store;
}
