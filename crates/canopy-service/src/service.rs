use std::sync::Arc;

use dashmap::DashMap;

use canopy_core::engine::{
    AuthorizationStatus, BenefactorCache, BenefactorResolver, CacheStats, CertificationPolicy,
    CheckRequest, DecisionEngine, EngineConfig, UserPermissions, check_authorization_or_else_throw,
};
use canopy_core::model::{AccessControlList, NodeId, ResourceType, TenantId, UserContext};
use canopy_storage::traits::{NodeStore, StoreFactory};

use crate::adapter::StoreHierarchy;
use crate::audit;
use crate::error::ApiError;

type TenantResolver<S> = BenefactorResolver<StoreHierarchy<S>>;

/// Multi-tenant front door: every hierarchy or ACL write goes through here
/// so the matching benefactor update runs right after the store write.
pub struct AccessService<F: StoreFactory> {
    factory: Arc<F>,
    caches: DashMap<TenantId, Arc<BenefactorCache>>,
    engine_config: EngineConfig,
    policy: Arc<CertificationPolicy>,
}

impl<F: StoreFactory> AccessService<F> {
    pub fn new(factory: Arc<F>, engine_config: EngineConfig, policy: CertificationPolicy) -> Self {
        Self {
            factory,
            caches: DashMap::new(),
            engine_config,
            policy: Arc::new(policy),
        }
    }

    pub async fn check_access(
        &self,
        tenant_id: &TenantId,
        user: &UserContext,
        request: &CheckRequest,
    ) -> Result<AuthorizationStatus, ApiError> {
        let engine = DecisionEngine::new(
            Arc::new(self.resolver(tenant_id)),
            Arc::clone(&self.policy),
        );
        let status = engine.check_access(user, request).await?;

        if !status.is_authorized() {
            audit::audit_access_denied(
                tenant_id,
                user.id,
                request.resource_id,
                request.access_type,
                &status,
            );
        }
        Ok(status)
    }

    /// Like [`Self::check_access`], but a denial becomes an error.
    pub async fn ensure_access(
        &self,
        tenant_id: &TenantId,
        user: &UserContext,
        request: &CheckRequest,
    ) -> Result<(), ApiError> {
        let status = self.check_access(tenant_id, user, request).await?;
        check_authorization_or_else_throw(&status)?;
        Ok(())
    }

    pub async fn user_permissions(
        &self,
        tenant_id: &TenantId,
        user: &UserContext,
        resource_id: NodeId,
        resource_type: ResourceType,
    ) -> Result<UserPermissions, ApiError> {
        let engine = DecisionEngine::new(
            Arc::new(self.resolver(tenant_id)),
            Arc::clone(&self.policy),
        );
        Ok(engine
            .user_permissions(user, resource_id, resource_type)
            .await?)
    }

    pub async fn resolve_benefactor(
        &self,
        tenant_id: &TenantId,
        node: NodeId,
    ) -> Result<NodeId, ApiError> {
        Ok(self.resolver(tenant_id).resolve(node).await?)
    }

    /// Creates a node, optionally with its own ACL, and records its
    /// benefactor. Root nodes must carry an ACL.
    pub async fn create_node(
        &self,
        tenant_id: &TenantId,
        id: NodeId,
        parent: Option<NodeId>,
        acl: Option<AccessControlList>,
    ) -> Result<NodeId, ApiError> {
        if let Some(acl) = &acl
            && acl.resource_id != id
        {
            return Err(ApiError::AclMismatch {
                node: id,
                acl: acl.resource_id,
            });
        }
        if parent.is_none() && acl.is_none() {
            return Err(ApiError::RootAclRequired(id));
        }

        let store = self.factory.for_tenant(tenant_id);
        store.create_node(id, parent).await?;
        if let Some(acl) = acl {
            store.put_acl(acl).await?;
        }

        let resolver = self.resolver_for(Arc::new(store), tenant_id);
        Ok(resolver.on_node_created(id).await?)
    }

    /// Reparents `node` and brings every affected benefactor up to date.
    ///
    /// If this returns a retryable error the edge is already written; call
    /// again with the same arguments to finish the update.
    pub async fn move_node(
        &self,
        tenant_id: &TenantId,
        node: NodeId,
        new_parent: NodeId,
    ) -> Result<NodeId, ApiError> {
        let store = Arc::new(self.factory.for_tenant(tenant_id));
        let resolver = self.resolver_for(Arc::clone(&store), tenant_id);

        let old_parent = store.get_parent(node).await?;
        let old_benefactor = resolver.resolve(node).await?;
        if old_parent != Some(new_parent) {
            store.set_parent(node, new_parent).await?;
        }

        let benefactor = resolver
            .on_parent_changed(node, old_benefactor, new_parent)
            .await?;

        audit::audit_node_moved(tenant_id, node, old_parent, new_parent, benefactor);
        Ok(benefactor)
    }

    /// Attaches (or replaces) the ACL on `acl.resource_id`, which becomes
    /// the benefactor of every descendant that has no ACL of its own.
    pub async fn create_acl(
        &self,
        tenant_id: &TenantId,
        acl: AccessControlList,
    ) -> Result<NodeId, ApiError> {
        let node = acl.resource_id;
        let store = self.factory.for_tenant(tenant_id);
        store.put_acl(acl).await?;

        let resolver = self.resolver_for(Arc::new(store), tenant_id);
        let benefactor = resolver.on_acl_changed(node).await?;

        audit::audit_acl_changed(tenant_id, node, "created", benefactor);
        Ok(benefactor)
    }

    /// Removes the ACL on `node` so it inherits from its nearest ancestor
    /// again. Returns `false` when there was nothing to remove.
    pub async fn delete_acl(&self, tenant_id: &TenantId, node: NodeId) -> Result<bool, ApiError> {
        let store = self.factory.for_tenant(tenant_id);
        if store.get_parent(node).await?.is_none() {
            return Err(ApiError::RootAclRequired(node));
        }
        if !store.delete_acl(node).await? {
            return Ok(false);
        }

        let resolver = self.resolver_for(Arc::new(store), tenant_id);
        let benefactor = resolver.on_acl_changed(node).await?;

        audit::audit_acl_changed(tenant_id, node, "deleted", benefactor);
        Ok(true)
    }

    pub fn cache_stats(&self, tenant_id: &TenantId) -> CacheStats {
        self.caches
            .get(tenant_id)
            .map(|cache| cache.stats())
            .unwrap_or_default()
    }

    fn resolver(&self, tenant_id: &TenantId) -> TenantResolver<F::Store> {
        self.resolver_for(Arc::new(self.factory.for_tenant(tenant_id)), tenant_id)
    }

    fn resolver_for(
        &self,
        store: Arc<F::Store>,
        tenant_id: &TenantId,
    ) -> TenantResolver<F::Store> {
        BenefactorResolver::new(
            Arc::new(StoreHierarchy::new(store)),
            self.cache(tenant_id),
            self.engine_config.clone(),
        )
    }

    fn cache(&self, tenant_id: &TenantId) -> Arc<BenefactorCache> {
        Arc::clone(
            self.caches
                .entry(tenant_id.clone())
                .or_insert_with(|| Arc::new(BenefactorCache::new()))
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::engine::{AuthorizationError, DenialReason, EngineError};
    use canopy_core::model::{AccessType, PrincipalId};
    use canopy_storage::{InMemoryStoreFactory, StorageError};
    use uuid::Uuid;

    const ALICE: PrincipalId = PrincipalId::new(100);
    const BOB: PrincipalId = PrincipalId::new(200);

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn make_service() -> (AccessService<InMemoryStoreFactory>, TenantId) {
        let service = AccessService::new(
            Arc::new(InMemoryStoreFactory::new()),
            EngineConfig::default(),
            CertificationPolicy::default(),
        );
        (service, TenantId::new(Uuid::new_v4()))
    }

    /// project 1 (ACL: alice reads/updates)
    ///   folder 2
    ///     file 3
    ///   folder 4 (ACL: bob reads)
    ///     file 5
    async fn seed(service: &AccessService<InMemoryStoreFactory>, tenant: &TenantId) {
        service
            .create_node(
                tenant,
                n(1),
                None,
                Some(AccessControlList::new(n(1)).grant(ALICE, [AccessType::Read, AccessType::Update])),
            )
            .await
            .unwrap();
        service.create_node(tenant, n(2), Some(n(1)), None).await.unwrap();
        service.create_node(tenant, n(3), Some(n(2)), None).await.unwrap();
        service
            .create_node(
                tenant,
                n(4),
                Some(n(1)),
                Some(AccessControlList::new(n(4)).grant(BOB, [AccessType::Read])),
            )
            .await
            .unwrap();
        service.create_node(tenant, n(5), Some(n(4)), None).await.unwrap();
    }

    fn read(node: u64) -> CheckRequest {
        CheckRequest::new(n(node), ResourceType::File, AccessType::Read)
    }

    #[tokio::test]
    async fn create_node_assigns_inherited_benefactor() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;

        assert_eq!(service.resolve_benefactor(&tenant, n(3)).await.unwrap(), n(1));
        assert_eq!(service.resolve_benefactor(&tenant, n(5)).await.unwrap(), n(4));
        assert_eq!(service.resolve_benefactor(&tenant, n(4)).await.unwrap(), n(4));
    }

    #[tokio::test]
    async fn create_root_without_acl_is_rejected() {
        let (service, tenant) = make_service();

        let err = service.create_node(&tenant, n(1), None, None).await.unwrap_err();
        assert!(
            matches!(err, ApiError::RootAclRequired(id) if id == n(1)),
            "expected RootAclRequired, got: {err}"
        );
    }

    #[tokio::test]
    async fn create_node_rejects_acl_for_another_node() {
        let (service, tenant) = make_service();

        let err = service
            .create_node(&tenant, n(1), None, Some(AccessControlList::new(n(9))))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ApiError::AclMismatch { .. }),
            "expected AclMismatch, got: {err}"
        );
    }

    #[tokio::test]
    async fn check_access_uses_benefactor_acl() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;
        let alice = UserContext::new(ALICE);

        assert!(
            service
                .check_access(&tenant, &alice, &read(3))
                .await
                .unwrap()
                .is_authorized()
        );

        let status = service.check_access(&tenant, &alice, &read(5)).await.unwrap();
        assert!(!status.is_authorized());
        assert_eq!(status.message(), "You lack READ access to the requested entity.");
    }

    #[tokio::test]
    async fn ensure_access_maps_denial_to_error() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;

        let err = service
            .ensure_access(&tenant, &UserContext::new(BOB), &read(3))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ApiError::Authorization(AuthorizationError::Unauthorized(_))),
            "expected Unauthorized, got: {err}"
        );

        service
            .ensure_access(&tenant, &UserContext::new(BOB), &read(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ensure_access_reports_missing_certification() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;
        let request = CheckRequest::new(n(3), ResourceType::File, AccessType::Update);

        let err = service
            .ensure_access(&tenant, &UserContext::new(ALICE), &request)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                ApiError::Authorization(AuthorizationError::UserCertificationRequired(_))
            ),
            "expected UserCertificationRequired, got: {err}"
        );

        service
            .ensure_access(&tenant, &UserContext::new(ALICE).certified(), &request)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn move_node_updates_subtree_benefactors() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;

        // Warm the cache before the move.
        assert_eq!(service.resolve_benefactor(&tenant, n(3)).await.unwrap(), n(1));

        let benefactor = service.move_node(&tenant, n(2), n(4)).await.unwrap();

        assert_eq!(benefactor, n(4));
        assert_eq!(service.resolve_benefactor(&tenant, n(2)).await.unwrap(), n(4));
        assert_eq!(service.resolve_benefactor(&tenant, n(3)).await.unwrap(), n(4));
        assert!(
            service
                .check_access(&tenant, &UserContext::new(BOB), &read(3))
                .await
                .unwrap()
                .is_authorized()
        );
    }

    #[tokio::test]
    async fn move_node_with_cold_cache_updates_subtree() {
        let factory = Arc::new(InMemoryStoreFactory::new());
        let tenant = TenantId::new(Uuid::new_v4());
        let seeded = AccessService::new(
            Arc::clone(&factory),
            EngineConfig::default(),
            CertificationPolicy::default(),
        );
        seed(&seeded, &tenant).await;

        // Same store, nothing cached yet.
        let service = AccessService::new(factory, EngineConfig::default(), CertificationPolicy::default());
        assert_eq!(service.cache_stats(&tenant), CacheStats::default());

        let benefactor = service.move_node(&tenant, n(2), n(5)).await.unwrap();

        assert_eq!(benefactor, n(4));
        assert_eq!(service.resolve_benefactor(&tenant, n(3)).await.unwrap(), n(4));
        assert!(
            service
                .check_access(&tenant, &UserContext::new(BOB), &read(3))
                .await
                .unwrap()
                .is_authorized()
        );
    }

    #[tokio::test]
    async fn move_node_rejects_cycles_without_touching_cache() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;

        let err = service.move_node(&tenant, n(1), n(3)).await.unwrap_err();
        assert!(
            matches!(err, ApiError::Storage(StorageError::CycleDetected { .. })),
            "expected CycleDetected, got: {err}"
        );
        assert_eq!(service.resolve_benefactor(&tenant, n(3)).await.unwrap(), n(1));
    }

    #[tokio::test]
    async fn move_unknown_node_is_not_found() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;

        let err = service.move_node(&tenant, n(99), n(1)).await.unwrap_err();
        assert!(
            matches!(err, ApiError::Storage(StorageError::NodeNotFound(_))),
            "expected NodeNotFound, got: {err}"
        );
    }

    #[tokio::test]
    async fn create_acl_takes_over_descendants() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;
        assert_eq!(service.resolve_benefactor(&tenant, n(3)).await.unwrap(), n(1));

        let benefactor = service
            .create_acl(
                &tenant,
                AccessControlList::new(n(2)).grant(BOB, [AccessType::Read]),
            )
            .await
            .unwrap();

        assert_eq!(benefactor, n(2));
        assert_eq!(service.resolve_benefactor(&tenant, n(3)).await.unwrap(), n(2));
    }

    #[tokio::test]
    async fn delete_acl_restores_inheritance() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;
        assert_eq!(service.resolve_benefactor(&tenant, n(5)).await.unwrap(), n(4));

        assert!(service.delete_acl(&tenant, n(4)).await.unwrap());

        assert_eq!(service.resolve_benefactor(&tenant, n(4)).await.unwrap(), n(1));
        assert_eq!(service.resolve_benefactor(&tenant, n(5)).await.unwrap(), n(1));
        assert!(!service.delete_acl(&tenant, n(4)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_root_acl_is_rejected() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;

        let err = service.delete_acl(&tenant, n(1)).await.unwrap_err();
        assert!(
            matches!(err, ApiError::RootAclRequired(id) if id == n(1)),
            "expected RootAclRequired, got: {err}"
        );
    }

    #[tokio::test]
    async fn user_permissions_summarises_access() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;

        let perms = service
            .user_permissions(&tenant, &UserContext::new(ALICE).certified(), n(3), ResourceType::File)
            .await
            .unwrap();

        assert!(perms.can_view);
        assert!(perms.can_edit);
        assert!(!perms.can_delete);
        assert!(!perms.can_move);
        assert!(perms.is_certified);
    }

    #[tokio::test]
    async fn unknown_resource_surfaces_engine_error() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;

        let err = service
            .check_access(&tenant, &UserContext::new(ALICE), &read(77))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ApiError::Engine(EngineError::NodeNotFound(_))),
            "expected NodeNotFound, got: {err}"
        );
    }

    #[tokio::test]
    async fn caches_are_per_tenant() {
        let (service, tenant) = make_service();
        let other = TenantId::new(Uuid::new_v4());
        seed(&service, &tenant).await;

        service.resolve_benefactor(&tenant, n(3)).await.unwrap();

        assert!(service.cache_stats(&tenant).entries > 0);
        assert_eq!(service.cache_stats(&other), CacheStats::default());
        assert!(service.resolve_benefactor(&other, n(3)).await.is_err());
    }

    #[tokio::test]
    async fn denial_reason_is_exposed_on_status() {
        let (service, tenant) = make_service();
        seed(&service, &tenant).await;
        let request = CheckRequest::new(n(2), ResourceType::Folder, AccessType::Create);

        let status = service
            .check_access(&tenant, &UserContext::new(ALICE), &request)
            .await
            .unwrap();

        assert_eq!(status.denial_reason(), Some(DenialReason::UserNotCertified));
    }
}
