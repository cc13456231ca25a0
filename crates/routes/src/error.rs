use thiserror::Error;

/// Why a custom-route request was not served.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("malformed path: {0}")]
    MalformedPath(String),
    #[error("namespace missing: route {0} is namespaced")]
    NamespaceMissing(String),
    #[error("namespace not allowed: route {route} is cluster-scoped, got namespace {namespace}")]
    NamespaceNotAllowed { route: String, namespace: String },
    #[error("method not allowed: expected {expected}, got {actual}")]
    MethodNotAllowed { expected: String, actual: String },
    #[error("group mismatch: expected {expected}, got {actual}")]
    GroupMismatch { expected: String, actual: String },
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
    #[error("resource mismatch: expected {expected}, got {actual}")]
    ResourceMismatch { expected: String, actual: String },
    #[error("subresource mismatch: expected {expected}, got {actual}")]
    SubresourceMismatch { expected: String, actual: String },
    #[error("reading request body: {0}")]
    BodyRead(#[source] std::io::Error),
    #[error("no route for {0}")]
    NotFound(String),
    #[error("duplicate route: {0}")]
    DuplicateRoute(String),
    #[error("handler: {0:#}")]
    Handler(anyhow::Error),
}

impl RouteError {
    /// Client-side faults that the HTTP boundary reports as a plain 400.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Self::MalformedPath(_)
                | Self::NamespaceMissing(_)
                | Self::NamespaceNotAllowed { .. }
                | Self::MethodNotAllowed { .. }
                | Self::GroupMismatch { .. }
                | Self::VersionMismatch { .. }
                | Self::ResourceMismatch { .. }
                | Self::SubresourceMismatch { .. }
                | Self::BodyRead(_)
        )
    }
}
