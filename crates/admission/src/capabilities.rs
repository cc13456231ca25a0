use serde::{Deserialize, Serialize};

use crate::AdmissionAction;

/// Operation named in a kind's admission capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdmissionOperation {
    #[serde(rename = "CREATE")]
    Create,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "CONNECT")]
    Connect,
    #[serde(rename = "*")]
    Any,
}

impl AdmissionOperation {
    pub fn covers(&self, action: AdmissionAction) -> bool {
        match self {
            Self::Any => true,
            Self::Create => action == AdmissionAction::Create,
            Self::Update => action == AdmissionAction::Update,
            Self::Delete => action == AdmissionAction::Delete,
            Self::Connect => action == AdmissionAction::Connect,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionCapability {
    #[serde(default)]
    pub operations: Vec<AdmissionOperation>,
}

/// Which admission hooks a kind opts into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<AdmissionCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<AdmissionCapability>,
}

impl AdmissionCapabilities {
    pub fn supports_any_mutation(&self) -> bool {
        self.mutation.as_ref().map_or(false, |c| !c.operations.is_empty())
    }

    pub fn supports_any_validation(&self) -> bool {
        self.validation.as_ref().map_or(false, |c| !c.operations.is_empty())
    }

    pub fn mutates(&self, action: AdmissionAction) -> bool {
        self.mutation.as_ref().map_or(false, |c| c.operations.iter().any(|op| op.covers(action)))
    }

    pub fn validates(&self, action: AdmissionAction) -> bool {
        self.validation.as_ref().map_or(false, |c| c.operations.iter().any(|op| op.covers(action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_manifest_capabilities() {
        let caps: AdmissionCapabilities = serde_json::from_value(serde_json::json!({
            "mutation": { "operations": ["CREATE", "UPDATE"] },
            "validation": { "operations": ["*"] },
        }))
        .unwrap();
        assert!(caps.supports_any_mutation());
        assert!(caps.mutates(AdmissionAction::Create));
        assert!(!caps.mutates(AdmissionAction::Delete));
        assert!(caps.validates(AdmissionAction::Connect));
    }

    #[test]
    fn empty_capabilities_support_nothing() {
        let caps = AdmissionCapabilities::default();
        assert!(!caps.supports_any_mutation());
        assert!(!caps.supports_any_validation());
        let caps = AdmissionCapabilities { mutation: Some(AdmissionCapability::default()), validation: None };
        assert!(!caps.supports_any_mutation());
    }
}
