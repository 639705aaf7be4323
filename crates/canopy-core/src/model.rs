use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a node in the content hierarchy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user or a group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PrincipalId(u64);

impl PrincipalId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for PrincipalId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every authenticated and anonymous caller belongs to this group.
pub const PUBLIC_GROUP: PrincipalId = PrincipalId::new(273949);
/// Every caller except the anonymous user belongs to this group.
pub const AUTHENTICATED_USERS_GROUP: PrincipalId = PrincipalId::new(273948);
pub const CERTIFIED_USERS_GROUP: PrincipalId = PrincipalId::new(3);
pub const ANONYMOUS_USER: PrincipalId = PrincipalId::new(273950);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    Read,
    Download,
    Create,
    Update,
    Delete,
    ChangePermissions,
    ChangeSettings,
    Moderate,
}

impl AccessType {
    pub const ALL: [AccessType; 8] = [
        AccessType::Read,
        AccessType::Download,
        AccessType::Create,
        AccessType::Update,
        AccessType::Delete,
        AccessType::ChangePermissions,
        AccessType::ChangeSettings,
        AccessType::Moderate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Read => "READ",
            AccessType::Download => "DOWNLOAD",
            AccessType::Create => "CREATE",
            AccessType::Update => "UPDATE",
            AccessType::Delete => "DELETE",
            AccessType::ChangePermissions => "CHANGE_PERMISSIONS",
            AccessType::ChangeSettings => "CHANGE_SETTINGS",
            AccessType::Moderate => "MODERATE",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseModelError {
    kind: &'static str,
    value: String,
}

impl FromStr for AccessType {
    type Err = ParseModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        AccessType::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| ParseModelError {
                kind: "access type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Project,
    Folder,
    File,
    Table,
    EntityView,
    Link,
    DockerRepository,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Project => "project",
            ResourceType::Folder => "folder",
            ResourceType::File => "file",
            ResourceType::Table => "table",
            ResourceType::EntityView => "entity_view",
            ResourceType::Link => "link",
            ResourceType::DockerRepository => "docker_repository",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ParseModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "project" => Ok(ResourceType::Project),
            "folder" => Ok(ResourceType::Folder),
            "file" => Ok(ResourceType::File),
            "table" => Ok(ResourceType::Table),
            "entity_view" => Ok(ResourceType::EntityView),
            "link" => Ok(ResourceType::Link),
            "docker_repository" => Ok(ResourceType::DockerRepository),
            _ => Err(ParseModelError {
                kind: "resource type",
                value: s.to_string(),
            }),
        }
    }
}

/// Access granted on a benefactor node, keyed by principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    pub resource_id: NodeId,
    pub entries: BTreeMap<PrincipalId, BTreeSet<AccessType>>,
}

impl AccessControlList {
    pub fn new(resource_id: NodeId) -> Self {
        Self {
            resource_id,
            entries: BTreeMap::new(),
        }
    }

    pub fn grant(
        mut self,
        principal: PrincipalId,
        access: impl IntoIterator<Item = AccessType>,
    ) -> Self {
        self.entries.entry(principal).or_default().extend(access);
        self
    }

    pub fn grants(&self, principal: PrincipalId, access: AccessType) -> bool {
        self.entries
            .get(&principal)
            .is_some_and(|types| types.contains(&access))
    }

    pub fn grants_any<'a>(
        &self,
        principals: impl IntoIterator<Item = &'a PrincipalId>,
        access: AccessType,
    ) -> bool {
        principals.into_iter().any(|p| self.grants(*p, access))
    }
}

/// The requesting identity. Supplied per request and never mutated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub id: PrincipalId,
    pub is_admin: bool,
    pub groups: BTreeSet<PrincipalId>,
}

impl UserContext {
    pub fn new(id: PrincipalId) -> Self {
        Self {
            id,
            is_admin: false,
            groups: BTreeSet::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USER)
    }

    pub fn admin(id: PrincipalId) -> Self {
        Self {
            is_admin: true,
            ..Self::new(id)
        }
    }

    pub fn with_group(mut self, group: PrincipalId) -> Self {
        self.groups.insert(group);
        self
    }

    pub fn certified(self) -> Self {
        self.with_group(CERTIFIED_USERS_GROUP)
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS_USER
    }

    pub fn is_certified(&self) -> bool {
        self.groups.contains(&CERTIFIED_USERS_GROUP)
    }

    /// The caller's own id, its groups, and the implicit public groups.
    pub fn effective_principals(&self) -> BTreeSet<PrincipalId> {
        let mut principals = self.groups.clone();
        principals.insert(self.id);
        principals.insert(PUBLIC_GROUP);
        if !self.is_anonymous() {
            principals.insert(AUTHENTICATED_USERS_GROUP);
        }
        principals
    }
}
