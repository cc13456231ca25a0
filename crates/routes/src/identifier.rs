use std::fmt;

use http::Method;

/// Kubernetes verbs an operation id may already start with.
const K8S_VERBS: &[&str] = &[
    "get", "log", "read", "replace", "patch", "delete", "deletecollection", "watch", "connect", "proxy", "list",
    "create",
];

/// Identity of one custom route: where it lives and which method it serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomRouteIdentifier {
    pub group: String,
    pub version: String,
    pub plural: String,
    pub subresource_path: String,
    pub method: Method,
}

impl CustomRouteIdentifier {
    pub fn new(group: &str, version: &str, plural: &str, subresource_path: &str, method: Method) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
            subresource_path: subresource_path.trim_matches('/').to_string(),
            method,
        }
    }

    /// Verb-prefixed operation id, e.g. `getTestsMetadata` for `GET tests/metadata`.
    pub fn operation_id(&self) -> String {
        let mut base = String::new();
        for seg in std::iter::once(self.plural.as_str()).chain(self.subresource_path.split('/')) {
            for word in seg.split(|c: char| !c.is_ascii_alphanumeric()) {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    base.push(first.to_ascii_uppercase());
                    base.push_str(chars.as_str());
                }
            }
        }
        prefix_with_verb(&base, &self.method)
    }
}

impl fmt::Display for CustomRouteIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{} {}", self.method, self.group, self.version, self.plural)?;
        if !self.subresource_path.is_empty() {
            write!(f, "/{}", self.subresource_path)?;
        }
        Ok(())
    }
}

/// Kubernetes verb for an HTTP method. Methods with no counterpart map to `connect`.
pub fn k8s_verb(method: &Method) -> &'static str {
    match *method {
        Method::GET => "get",
        Method::POST => "create",
        Method::PUT => "replace",
        Method::PATCH => "patch",
        Method::DELETE => "delete",
        _ => "connect",
    }
}

/// Prefix `operation_id` with the verb for `method` unless it already starts with one.
pub fn prefix_with_verb(operation_id: &str, method: &Method) -> String {
    let has_verb = K8S_VERBS
        .iter()
        .any(|verb| operation_id.len() > verb.len() && operation_id.starts_with(verb));
    if has_verb {
        operation_id.to_string()
    } else {
        format!("{}{}", k8s_verb(method), operation_id)
    }
}
