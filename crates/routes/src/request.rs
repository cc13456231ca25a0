//! Kubernetes-style request paths.

use crate::RouteError;

/// What a request addresses, as seen by a route dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub api_group: String,
    pub api_version: String,
    pub namespace: Option<String>,
    /// Plural resource name, e.g. `tests`.
    pub resource: String,
    pub name: Option<String>,
    /// Remaining path below the resource (or object), `/`-joined. Empty for none.
    pub subresource: String,
}

/// A parsed `/apis/{group}/{version}/...` or `/api/{version}/...` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    pub api_group: String,
    pub api_version: String,
    pub namespace: Option<String>,
    pub resource: String,
    /// Segments after the resource.
    pub parts: Vec<String>,
}

impl RequestPath {
    pub fn parse(path: &str) -> Result<Self, RouteError> {
        let malformed = || RouteError::MalformedPath(path.to_string());
        let trimmed = path.strip_prefix('/').ok_or_else(malformed)?;
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let segs: Vec<&str> = trimmed.split('/').collect();
        if segs.iter().any(|s| s.is_empty()) {
            return Err(malformed());
        }
        let (group, version, rest) = match segs.as_slice() {
            ["apis", group, version, rest @ ..] => (*group, *version, rest),
            ["api", version, rest @ ..] => ("", *version, rest),
            _ => return Err(malformed()),
        };
        let (namespace, resource, parts) = match rest {
            ["namespaces", ns, resource, parts @ ..] => (Some(ns.to_string()), *resource, parts),
            [resource, parts @ ..] => (None, *resource, parts),
            [] => return Err(malformed()),
        };
        Ok(Self {
            api_group: group.to_string(),
            api_version: version.to_string(),
            namespace,
            resource: resource.to_string(),
            parts: parts.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Readings of this path, resource-level first.
    ///
    /// `.../tests/metadata` is either the `metadata` route on the `tests`
    /// collection or the object named `metadata`; the route table decides.
    pub fn candidates(&self) -> Vec<RequestInfo> {
        let base = RequestInfo {
            api_group: self.api_group.clone(),
            api_version: self.api_version.clone(),
            namespace: self.namespace.clone(),
            resource: self.resource.clone(),
            name: None,
            subresource: self.parts.join("/"),
        };
        let mut out = Vec::with_capacity(2);
        if let Some((name, sub)) = self.parts.split_first() {
            let object = RequestInfo { name: Some(name.clone()), subresource: sub.join("/"), ..base.clone() };
            out.push(base);
            out.push(object);
        } else {
            out.push(base);
        }
        out
    }
}
