use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use kapp_core::{RequestContext, ResourceKind};
use metrics::{counter, histogram};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::{CustomRouteIdentifier, RequestInfo, RouteError};

/// Everything a route handler sees about one request.
#[derive(Debug, Clone)]
pub struct ResourceCustomRouteRequest {
    pub namespace: Option<String>,
    /// Object name for object-level routes.
    pub name: Option<String>,
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub subresource_path: String,
    pub method: Method,
    pub headers: HeaderMap,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub body: Bytes,
}

/// Handler output, written back to the client as is.
#[derive(Debug, Clone)]
pub struct CustomRouteResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub headers: Option<HeaderMap>,
}

impl CustomRouteResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { status, body: body.into(), headers: None }
    }

    pub fn json<T: serde::Serialize + ?Sized>(status: StatusCode, value: &T) -> anyhow::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status, body).with_header(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    /// Append a header value; repeated names keep every value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.get_or_insert_with(HeaderMap::new).append(name, value);
        self
    }
}

#[async_trait::async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, ctx: &RequestContext, req: ResourceCustomRouteRequest) -> anyhow::Result<CustomRouteResponse>;
}

/// Adapts an async closure into a [`RouteHandler`].
pub struct HandlerFn<F>(pub F);

impl<F> HandlerFn<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(RequestContext, ResourceCustomRouteRequest) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<CustomRouteResponse>> + Send + 'static,
    {
        Self(f)
    }
}

#[async_trait::async_trait]
impl<F, Fut> RouteHandler for HandlerFn<F>
where
    F: Fn(RequestContext, ResourceCustomRouteRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CustomRouteResponse>> + Send + 'static,
{
    async fn handle(&self, ctx: &RequestContext, req: ResourceCustomRouteRequest) -> anyhow::Result<CustomRouteResponse> {
        (self.0)(ctx.clone(), req).await
    }
}

/// Request parts handed to [`RouteDispatcher::serve`]; the body is read lazily.
pub struct Inbound<B> {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: String,
    pub body: B,
}

/// Serves one [`CustomRouteIdentifier`] for one kind.
#[derive(Clone)]
pub struct RouteDispatcher {
    id: CustomRouteIdentifier,
    kind: String,
    namespaced: bool,
    operation_id: String,
    handler: Arc<dyn RouteHandler>,
}

impl RouteDispatcher {
    pub fn new(id: CustomRouteIdentifier, kind: &ResourceKind, handler: Arc<dyn RouteHandler>) -> Self {
        let operation_id = id.operation_id();
        Self { id, kind: kind.kind.clone(), namespaced: kind.namespaced(), operation_id, handler }
    }

    /// Route not tied to one kind, e.g. a version-level route.
    pub fn unbound(id: CustomRouteIdentifier, namespaced: bool, handler: Arc<dyn RouteHandler>) -> Self {
        let operation_id = id.operation_id();
        Self { id, kind: String::new(), namespaced, operation_id, handler }
    }

    pub fn id(&self) -> &CustomRouteIdentifier {
        &self.id
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn namespaced(&self) -> bool {
        self.namespaced
    }

    /// Check `info`/`method` against this route: namespace, method, group,
    /// version, resource, subresource, in that order.
    pub fn validate(&self, info: &RequestInfo, method: &Method) -> Result<(), RouteError> {
        let namespace = info.namespace.as_deref().filter(|ns| !ns.is_empty());
        match (self.namespaced, namespace) {
            (true, None) => return Err(RouteError::NamespaceMissing(self.id.to_string())),
            (false, Some(ns)) => {
                return Err(RouteError::NamespaceNotAllowed { route: self.id.to_string(), namespace: ns.to_string() })
            }
            _ => {}
        }
        if *method != self.id.method {
            return Err(RouteError::MethodNotAllowed {
                expected: self.id.method.to_string(),
                actual: method.to_string(),
            });
        }
        if info.api_group != self.id.group {
            return Err(RouteError::GroupMismatch { expected: self.id.group.clone(), actual: info.api_group.clone() });
        }
        if info.api_version != self.id.version {
            return Err(RouteError::VersionMismatch {
                expected: self.id.version.clone(),
                actual: info.api_version.clone(),
            });
        }
        if info.resource != self.id.plural {
            return Err(RouteError::ResourceMismatch { expected: self.id.plural.clone(), actual: info.resource.clone() });
        }
        if info.subresource != self.id.subresource_path {
            return Err(RouteError::SubresourceMismatch {
                expected: self.id.subresource_path.clone(),
                actual: info.subresource.clone(),
            });
        }
        Ok(())
    }

    /// Validate, read the whole body and invoke the handler.
    pub async fn serve<B>(
        &self,
        ctx: &RequestContext,
        info: &RequestInfo,
        inbound: Inbound<B>,
    ) -> Result<CustomRouteResponse, RouteError>
    where
        B: AsyncRead + Unpin + Send,
    {
        self.validate(info, &inbound.method)?;
        let Inbound { method, headers, query, mut body } = inbound;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await.map_err(RouteError::BodyRead)?;

        let req = ResourceCustomRouteRequest {
            namespace: info.namespace.clone(),
            name: info.name.clone(),
            group: self.id.group.clone(),
            version: self.id.version.clone(),
            kind: self.kind.clone(),
            plural: self.id.plural.clone(),
            subresource_path: self.id.subresource_path.clone(),
            method,
            headers,
            query,
            body: Bytes::from(buf),
        };
        let started = Instant::now();
        let res = self.handler.handle(ctx, req).await.map_err(RouteError::Handler);
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        let outcome = if res.is_ok() { "ok" } else { "err" };
        counter!("custom_route_calls_total", 1u64, "route" => self.operation_id.clone(), "outcome" => outcome);
        histogram!("custom_route_ms", ms, "route" => self.operation_id.clone());
        debug!(route = %self.operation_id, took_ms = ms, outcome, "routes: handled");
        res
    }
}

impl std::fmt::Debug for RouteDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDispatcher")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("namespaced", &self.namespaced)
            .finish_non_exhaustive()
    }
}
