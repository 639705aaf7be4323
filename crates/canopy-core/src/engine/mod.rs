mod cache;
mod check;
mod decision;
mod policy;
mod resolver;
#[cfg(test)]
mod testing;

pub use cache::{BenefactorCache, CacheStats};
pub use check::{CheckRequest, DecisionEngine, UserPermissions};
pub use decision::{
    AuthorizationError, AuthorizationStatus, DenialReason, check_authorization_or_else_throw,
};
pub use policy::{CertificationPolicy, CertificationRule};
pub use resolver::BenefactorResolver;

use std::future::Future;
use std::time::Duration;

use crate::model::{AccessControlList, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("timed out after {timeout:?} waiting for locks on {keys:?}")]
    LockTimeout { keys: Vec<NodeId>, timeout: Duration },

    #[error("path depth limit of {depth} exceeded for: {node}")]
    MaxDepthExceeded { node: NodeId, depth: usize },

    #[error("benefactor {0} has no access control list")]
    MissingAcl(NodeId),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Only lock timeouts may be retried; the hierarchy edge is already
    /// written and the caller is expected to rerun the benefactor update.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::LockTimeout { .. })
    }

    /// The store or cache is corrupt. Callers must not mask these.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            EngineError::MissingAcl(_) | EngineError::MaxDepthExceeded { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub lock_timeout: Duration,
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(10),
            max_depth: 50,
        }
    }
}

pub trait HierarchyReader: Send + Sync {
    /// `Ok(None)` for a root, `NodeNotFound` for an unknown node.
    fn get_parent(
        &self,
        node: NodeId,
    ) -> impl Future<Output = Result<Option<NodeId>, EngineError>> + Send;

    fn get_children(
        &self,
        node: NodeId,
    ) -> impl Future<Output = Result<Vec<NodeId>, EngineError>> + Send;
}

pub trait AclReader: Send + Sync {
    fn get_acl(
        &self,
        node: NodeId,
    ) -> impl Future<Output = Result<Option<AccessControlList>, EngineError>> + Send;

    fn has_acl(&self, node: NodeId) -> impl Future<Output = Result<bool, EngineError>> + Send {
        async move { Ok(self.get_acl(node).await?.is_some()) }
    }
}

/// Named-key mutual exclusion over node ids.
pub trait NodeLocker: Send + Sync {
    type Session: LockSession;

    fn begin(&self) -> Self::Session;
}

/// Locks taken through a session are held until the session is dropped.
pub trait LockSession: Send {
    /// Acquires every id in the given order as a single batch. Ids already
    /// held by this session are not acquired twice.
    fn lock_nodes(
        &mut self,
        ids: &[NodeId],
    ) -> impl Future<Output = Result<(), EngineError>> + Send;
}
