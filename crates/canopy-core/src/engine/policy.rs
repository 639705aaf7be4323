use serde::{Deserialize, Serialize};

use crate::model::{AccessType, ResourceType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationRule {
    pub access_type: AccessType,
    #[serde(default)]
    pub exempt_resource_types: Vec<ResourceType>,
}

/// Operations that require the caller to be a certified user, independent
/// of what the ACL grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationPolicy {
    pub rules: Vec<CertificationRule>,
}

impl CertificationPolicy {
    /// A policy that never asks for certification.
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn requires_certification(
        &self,
        resource_type: ResourceType,
        access_type: AccessType,
    ) -> bool {
        self.rules.iter().any(|rule| {
            rule.access_type == access_type && !rule.exempt_resource_types.contains(&resource_type)
        })
    }
}

impl Default for CertificationPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                CertificationRule {
                    access_type: AccessType::Create,
                    exempt_resource_types: vec![ResourceType::Project],
                },
                CertificationRule {
                    access_type: AccessType::Update,
                    exempt_resource_types: vec![ResourceType::Project],
                },
            ],
        }
    }
}
