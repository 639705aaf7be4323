//! TOML description of a hierarchy, its ACLs and a few named users, used to
//! seed an in-memory tenant from the command line.
//!
//! ```toml
//! [[nodes]]
//! id = 1
//! type = "project"
//! acl = [{ principal = 100, access = ["READ", "UPDATE"] }]
//!
//! [[nodes]]
//! id = 2
//! parent = 1
//! type = "folder"
//!
//! [[users]]
//! name = "alice"
//! id = 100
//! certified = true
//! ```

use std::path::Path;

use serde::Deserialize;

use canopy_core::model::{
    AccessControlList, AccessType, NodeId, PrincipalId, ResourceType, TenantId, UserContext,
};
use canopy_storage::StoreFactory;

use crate::error::ApiError;
use crate::service::AccessService;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(rename = "type", default = "default_resource_type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub acl: Option<Vec<GrantSpec>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrantSpec {
    pub principal: PrincipalId,
    pub access: Vec<AccessType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSpec {
    pub name: String,
    pub id: PrincipalId,
    #[serde(default)]
    pub groups: Vec<PrincipalId>,
    #[serde(default)]
    pub certified: bool,
    #[serde(default)]
    pub admin: bool,
}

fn default_resource_type() -> ResourceType {
    ResourceType::Folder
}

impl NodeSpec {
    fn to_acl(&self) -> Option<AccessControlList> {
        self.acl.as_ref().map(|grants| {
            grants.iter().fold(AccessControlList::new(self.id), |acl, grant| {
                acl.grant(grant.principal, grant.access.iter().copied())
            })
        })
    }
}

impl UserSpec {
    fn to_context(&self) -> UserContext {
        let mut user = if self.admin {
            UserContext::admin(self.id)
        } else {
            UserContext::new(self.id)
        };
        for group in &self.groups {
            user = user.with_group(*group);
        }
        if self.certified {
            user = user.certified();
        }
        user
    }
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FixtureError::ReadFile(path.display().to_string(), e.to_string()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, FixtureError> {
        toml::from_str(contents).map_err(|e| FixtureError::ParseToml(e.to_string()))
    }

    /// Creates every node, in file order, through `service`. Parents must
    /// be listed before their children.
    pub async fn apply<F: StoreFactory>(
        &self,
        service: &AccessService<F>,
        tenant_id: &TenantId,
    ) -> Result<(), FixtureError> {
        for node in &self.nodes {
            service
                .create_node(tenant_id, node.id, node.parent, node.to_acl())
                .await?;
        }
        tracing::debug!(nodes = self.nodes.len(), users = self.users.len(), "fixture loaded");
        Ok(())
    }

    /// Looks up a named user. `anonymous` is always available.
    pub fn user(&self, name: &str) -> Result<UserContext, FixtureError> {
        if let Some(spec) = self.users.iter().find(|u| u.name == name) {
            return Ok(spec.to_context());
        }
        if name == "anonymous" {
            return Ok(UserContext::anonymous());
        }
        Err(FixtureError::UnknownUser(name.to_string()))
    }

    pub fn resource_type(&self, node: NodeId) -> Result<ResourceType, FixtureError> {
        self.nodes
            .iter()
            .find(|spec| spec.id == node)
            .map(|spec| spec.resource_type)
            .ok_or(FixtureError::UnknownNode(node))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixture file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML fixture: {0}")]
    ParseToml(String),

    #[error("unknown user: '{0}'")]
    UnknownUser(String),

    #[error("node {0} is not described in the fixture")]
    UnknownNode(NodeId),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use canopy_core::engine::{CertificationPolicy, EngineConfig};
    use canopy_core::model::CERTIFIED_USERS_GROUP;
    use canopy_storage::InMemoryStoreFactory;

    const FIXTURE: &str = r#"
[[nodes]]
id = 1
type = "project"
acl = [{ principal = 100, access = ["READ", "UPDATE"] }]

[[nodes]]
id = 2
parent = 1

[[nodes]]
id = 3
parent = 2
type = "file"

[[users]]
name = "alice"
id = 100
certified = true

[[users]]
name = "root"
id = 1
admin = true
"#;

    #[test]
    fn parses_nodes_and_users() {
        let fixture = Fixture::parse(FIXTURE).unwrap();

        assert_eq!(fixture.nodes.len(), 3);
        assert_eq!(fixture.users.len(), 2);
        assert_eq!(fixture.resource_type(NodeId::new(1)).unwrap(), ResourceType::Project);
        assert_eq!(fixture.resource_type(NodeId::new(2)).unwrap(), ResourceType::Folder);
        assert_eq!(fixture.resource_type(NodeId::new(3)).unwrap(), ResourceType::File);
    }

    #[test]
    fn builds_user_contexts() {
        let fixture = Fixture::parse(FIXTURE).unwrap();

        let alice = fixture.user("alice").unwrap();
        assert_eq!(alice.id, PrincipalId::new(100));
        assert!(alice.groups.contains(&CERTIFIED_USERS_GROUP));
        assert!(!alice.is_admin);

        assert!(fixture.user("root").unwrap().is_admin);
        assert!(fixture.user("anonymous").unwrap().is_anonymous());
        assert!(matches!(
            fixture.user("mallory"),
            Err(FixtureError::UnknownUser(ref name)) if name == "mallory"
        ));
    }

    #[test]
    fn rejects_unknown_access_type() {
        let result = Fixture::parse(
            r#"
[[nodes]]
id = 1
acl = [{ principal = 1, access = ["FLY"] }]
"#,
        );

        assert!(matches!(result, Err(FixtureError::ParseToml(_))));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.toml");
        std::fs::write(&path, FIXTURE).unwrap();

        let fixture = Fixture::load(&path).unwrap();
        assert_eq!(fixture.nodes.len(), 3);
    }

    #[tokio::test]
    async fn apply_seeds_tenant_with_acls() {
        let fixture = Fixture::parse(FIXTURE).unwrap();
        let service = AccessService::new(
            Arc::new(InMemoryStoreFactory::new()),
            EngineConfig::default(),
            CertificationPolicy::default(),
        );
        let tenant = TenantId::new(uuid::Uuid::nil());

        fixture.apply(&service, &tenant).await.unwrap();

        assert_eq!(
            service.resolve_benefactor(&tenant, NodeId::new(3)).await.unwrap(),
            NodeId::new(1)
        );
    }

    #[tokio::test]
    async fn apply_reports_children_listed_before_parents() {
        let fixture = Fixture::parse(
            r#"
[[nodes]]
id = 2
parent = 1

[[nodes]]
id = 1
acl = []
"#,
        )
        .unwrap();
        let service = AccessService::new(
            Arc::new(InMemoryStoreFactory::new()),
            EngineConfig::default(),
            CertificationPolicy::default(),
        );

        let err = fixture
            .apply(&service, &TenantId::new(uuid::Uuid::nil()))
            .await
            .unwrap_err();
        assert!(
            matches!(err, FixtureError::Api(ApiError::Storage(_))),
            "expected storage error, got: {err}"
        );
    }
}
