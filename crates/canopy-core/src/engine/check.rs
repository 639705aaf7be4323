use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::{
    AccessControlList, AccessType, NodeId, PUBLIC_GROUP, PrincipalId, ResourceType, UserContext,
};

use super::{
    AclReader, AuthorizationStatus, BenefactorResolver, CertificationPolicy, DenialReason,
    EngineError, HierarchyReader, NodeLocker,
};

const ANONYMOUS_READ_ONLY: &str = "Anonymous users have only READ access permission.";
const CERTIFIED_USERS_ONLY: &str = "Only certified users may create or update content.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub resource_id: NodeId,
    pub resource_type: ResourceType,
    pub access_type: AccessType,
}

impl CheckRequest {
    pub fn new(resource_id: NodeId, resource_type: ResourceType, access_type: AccessType) -> Self {
        Self {
            resource_id,
            resource_type,
            access_type,
        }
    }
}

/// What a caller may do with one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPermissions {
    pub can_view: bool,
    pub can_download: bool,
    pub can_edit: bool,
    pub can_add_child: bool,
    pub can_delete: bool,
    pub can_change_permissions: bool,
    pub can_change_settings: bool,
    pub can_moderate: bool,
    pub can_move: bool,
    pub is_certified: bool,
    pub can_public_read: bool,
}

struct AccessContext<'a> {
    user: &'a UserContext,
    principals: &'a BTreeSet<PrincipalId>,
    acl: &'a AccessControlList,
    access_type: AccessType,
    certification_required: bool,
}

/// One step of the decision chain. `None` defers to the next step.
type Decider = fn(&AccessContext<'_>) -> Option<AuthorizationStatus>;

const DECIDERS: &[Decider] = &[
    deny_if_anonymous_writes,
    deny_if_not_certified,
    grant_if_acl_allows,
];

fn deny_if_anonymous_writes(ctx: &AccessContext<'_>) -> Option<AuthorizationStatus> {
    (ctx.user.is_anonymous() && ctx.access_type != AccessType::Read)
        .then(|| AuthorizationStatus::access_denied(ANONYMOUS_READ_ONLY))
}

fn deny_if_not_certified(ctx: &AccessContext<'_>) -> Option<AuthorizationStatus> {
    (ctx.certification_required && !ctx.user.is_certified()).then(|| {
        AuthorizationStatus::access_denied_with_reason(
            CERTIFIED_USERS_ONLY,
            DenialReason::UserNotCertified,
        )
    })
}

fn grant_if_acl_allows(ctx: &AccessContext<'_>) -> Option<AuthorizationStatus> {
    ctx.acl
        .grants_any(ctx.principals, ctx.access_type)
        .then(AuthorizationStatus::authorized)
}

/// Evaluates access requests against the ACL of the resource's benefactor.
/// Read-only apart from the cache entries `resolve` memoizes.
pub struct DecisionEngine<S> {
    resolver: Arc<BenefactorResolver<S>>,
    policy: Arc<CertificationPolicy>,
}

impl<S> DecisionEngine<S>
where
    S: HierarchyReader + AclReader + NodeLocker,
{
    pub fn new(resolver: Arc<BenefactorResolver<S>>, policy: Arc<CertificationPolicy>) -> Self {
        Self { resolver, policy }
    }

    pub async fn check_access(
        &self,
        user: &UserContext,
        request: &CheckRequest,
    ) -> Result<AuthorizationStatus, EngineError> {
        if user.is_admin {
            return Ok(AuthorizationStatus::authorized());
        }

        let acl = self.benefactor_acl(request.resource_id).await?;
        let principals = user.effective_principals();
        Ok(self.decide(
            user,
            &principals,
            &acl,
            request.resource_type,
            request.access_type,
        ))
    }

    /// Every access type evaluated against a single benefactor lookup.
    pub async fn user_permissions(
        &self,
        user: &UserContext,
        resource_id: NodeId,
        resource_type: ResourceType,
    ) -> Result<UserPermissions, EngineError> {
        let acl = self.benefactor_acl(resource_id).await?;
        let principals = user.effective_principals();
        let allowed = |access_type| {
            user.is_admin
                || self
                    .decide(user, &principals, &acl, resource_type, access_type)
                    .is_authorized()
        };

        let can_edit = allowed(AccessType::Update);
        let can_change_permissions = allowed(AccessType::ChangePermissions);
        Ok(UserPermissions {
            can_view: allowed(AccessType::Read),
            can_download: allowed(AccessType::Download),
            can_edit,
            can_add_child: allowed(AccessType::Create),
            can_delete: allowed(AccessType::Delete),
            can_change_permissions,
            can_change_settings: allowed(AccessType::ChangeSettings),
            can_moderate: allowed(AccessType::Moderate),
            can_move: can_edit && can_change_permissions,
            is_certified: user.is_certified(),
            can_public_read: acl.grants(PUBLIC_GROUP, AccessType::Read),
        })
    }

    async fn benefactor_acl(&self, resource_id: NodeId) -> Result<AccessControlList, EngineError> {
        let benefactor = self.resolver.resolve(resource_id).await?;
        match self.resolver.store().get_acl(benefactor).await? {
            Some(acl) => Ok(acl),
            None => {
                tracing::error!(
                    resource = %resource_id,
                    benefactor = %benefactor,
                    "benefactor has no access control list"
                );
                Err(EngineError::MissingAcl(benefactor))
            }
        }
    }

    fn decide(
        &self,
        user: &UserContext,
        principals: &BTreeSet<PrincipalId>,
        acl: &AccessControlList,
        resource_type: ResourceType,
        access_type: AccessType,
    ) -> AuthorizationStatus {
        let ctx = AccessContext {
            user,
            principals,
            acl,
            access_type,
            certification_required: self
                .policy
                .requires_certification(resource_type, access_type),
        };

        DECIDERS
            .iter()
            .find_map(|decider| decider(&ctx))
            .unwrap_or_else(|| {
                AuthorizationStatus::access_denied(format!(
                    "You lack {} access to the requested entity.",
                    ctx.access_type
                ))
            })
    }
}
