use canopy_core::engine::{AuthorizationError, EngineError};
use canopy_core::model::NodeId;
use canopy_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("access control list for {acl} cannot be attached to node {node}")]
    AclMismatch { node: NodeId, acl: NodeId },

    #[error("root node {0} must keep its access control list")]
    RootAclRequired(NodeId),
}

impl ApiError {
    /// Lock timeouts leave the hierarchy edge written; rerunning the call
    /// finishes the benefactor update.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Engine(err) if err.is_retryable())
    }
}
