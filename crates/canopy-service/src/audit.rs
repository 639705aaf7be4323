use canopy_core::engine::AuthorizationStatus;
use canopy_core::model::{AccessType, NodeId, PrincipalId, TenantId};

pub fn audit_node_moved(
    tenant_id: &TenantId,
    node: NodeId,
    old_parent: Option<NodeId>,
    new_parent: NodeId,
    benefactor: NodeId,
) {
    tracing::info!(
        target: "audit",
        event = "node_moved",
        tenant_id = %tenant_id,
        node = node.value(),
        old_parent = old_parent.map(|p| p.to_string()).unwrap_or_default(),
        new_parent = new_parent.value(),
        benefactor = benefactor.value(),
        "node moved"
    );
}

pub fn audit_acl_changed(tenant_id: &TenantId, node: NodeId, change: &str, benefactor: NodeId) {
    tracing::info!(
        target: "audit",
        event = "acl_changed",
        tenant_id = %tenant_id,
        node = node.value(),
        change = change,
        benefactor = benefactor.value(),
        "access control list changed"
    );
}

pub fn audit_access_denied(
    tenant_id: &TenantId,
    user: PrincipalId,
    node: NodeId,
    access_type: AccessType,
    status: &AuthorizationStatus,
) {
    tracing::warn!(
        target: "audit",
        event = "access_denied",
        tenant_id = %tenant_id,
        user = user.value(),
        node = node.value(),
        access_type = access_type.as_str(),
        reason = status.denial_reason().map(|r| r.to_string()).unwrap_or_default(),
        "access denied"
    );
}
