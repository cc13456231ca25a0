//! Resource model shared by every kind.
//!
//! A [`Resource`] is the untyped envelope of a custom resource: type meta,
//! Kubernetes object metadata and opaque `spec`/`status` payloads.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
use kube::core::{GroupVersionKind, TypeMeta};
use serde::{Deserialize, Serialize};

/// Whether objects of a kind live inside a namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    Namespaced,
    Cluster,
}

/// Identity of a served kind: group/version/kind plus its plural and scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub scope: Scope,
}

/// Lowercased kind with an `s` suffix; used when a manifest omits the plural.
pub fn default_plural(kind: &str) -> String {
    format!("{}s", kind.to_lowercase())
}

impl ResourceKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: default_plural(kind),
            scope: Scope::Namespaced,
        }
    }

    pub fn with_plural(mut self, plural: &str) -> Self {
        self.plural = plural.to_string();
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn namespaced(&self) -> bool {
        self.scope == Scope::Namespaced
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// Stable key `group/version/Kind` (or `version/Kind` for the core group).
    pub fn gvk_key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }

    pub fn type_meta(&self) -> TypeMeta {
        TypeMeta { api_version: self.api_version(), kind: self.kind.clone() }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.gvk_key())
    }
}

/// A stored custom resource. `spec` and `status` are opaque to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

impl Resource {
    /// Blank object of `kind` addressed by `namespace`/`name`.
    pub fn new(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            types: Some(kind.type_meta()),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: namespace.map(|s| s.to_string()),
                ..ObjectMeta::default()
            },
            spec: serde_json::Value::Null,
            status: None,
        }
    }

    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_status(mut self, status: serde_json::Value) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    pub fn generation(&self) -> Option<i64> {
        self.metadata.generation
    }

    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    pub fn kind(&self) -> Option<&str> {
        self.types.as_ref().map(|t| t.kind.as_str())
    }

    pub fn api_version(&self) -> Option<&str> {
        self.types.as_ref().map(|t| t.api_version.as_str())
    }
}

/// One page of a list call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<Resource>,
}

impl ResourceList {
    /// Token for the next page; `None` on the last page.
    pub fn continue_token(&self) -> Option<&str> {
        self.metadata.continue_.as_deref().filter(|t| !t.is_empty())
    }

    pub fn remaining_item_count(&self) -> Option<i64> {
        self.metadata.remaining_item_count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_omits_core_group() {
        assert_eq!(ResourceKind::new("", "v1", "ConfigMap").api_version(), "v1");
        assert_eq!(ResourceKind::new("test", "v1", "Test").api_version(), "test/v1");
        assert_eq!(ResourceKind::new("test", "v1", "Test").plural, "tests");
    }

    #[test]
    fn resource_serializes_like_a_kubernetes_object() {
        let kind = ResourceKind::new("inventory.kapp.dev", "v1", "Item");
        let obj = Resource::new(&kind, Some("default"), "inv-1")
            .with_spec(serde_json::json!({"sku": "A-1"}))
            .with_label("tier", "gold");
        let v = serde_json::to_value(&obj).unwrap();
        assert_eq!(v["apiVersion"], "inventory.kapp.dev/v1");
        assert_eq!(v["kind"], "Item");
        assert_eq!(v["metadata"]["name"], "inv-1");
        assert_eq!(v["metadata"]["labels"]["tier"], "gold");
        assert_eq!(v["spec"]["sku"], "A-1");
        assert!(v.get("status").is_none());

        let back: Resource = serde_json::from_value(v).unwrap();
        assert_eq!(back, obj);
    }

    #[test]
    fn empty_namespace_reads_as_none() {
        let kind = ResourceKind::new("test", "v1", "Test");
        let obj = Resource::new(&kind, Some(""), "a");
        assert_eq!(obj.namespace(), None);
    }
}
