use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request, Response, StatusCode};
use kapp_core::{status_body, RequestContext};
use metrics::counter;
use rustc_hash::FxHashMap;
use tokio::io::AsyncRead;
use tracing::{debug, error, warn};

use crate::{Inbound, RequestInfo, RequestPath, RouteDispatcher, RouteError};

/// All custom routes of an app group, keyed by `(plural, subresource path)`.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: FxHashMap<(String, String), Vec<RouteDispatcher>>,
    count: usize,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn register(&mut self, dispatcher: RouteDispatcher) -> Result<(), RouteError> {
        let id = dispatcher.id();
        let key = (id.plural.clone(), id.subresource_path.clone());
        let slot = self.routes.entry(key).or_default();
        if slot.iter().any(|d| d.id() == id && d.namespaced() == dispatcher.namespaced()) {
            return Err(RouteError::DuplicateRoute(id.to_string()));
        }
        debug!(route = %dispatcher.operation_id(), id = %id, "routes: registered");
        slot.push(dispatcher);
        self.count += 1;
        Ok(())
    }

    pub fn dispatchers(&self) -> impl Iterator<Item = &RouteDispatcher> {
        self.routes.values().flatten()
    }

    /// Pick the dispatcher for a parsed path.
    ///
    /// Resource-level readings win over object-level ones. Among routes on the
    /// same key a fully matching one is preferred, then one with the right
    /// method and scope, then one with the right method, then the first
    /// registered so its mismatch gets reported.
    pub fn resolve(&self, path: &RequestPath, method: &Method) -> Result<(&RouteDispatcher, RequestInfo), RouteError> {
        let namespaced = path.namespace.as_deref().map_or(false, |ns| !ns.is_empty());
        for info in path.candidates() {
            let Some(list) = self.routes.get(&(info.resource.clone(), info.subresource.clone())) else {
                continue;
            };
            let chosen = list
                .iter()
                .find(|d| d.validate(&info, method).is_ok())
                .or_else(|| list.iter().find(|d| d.id().method == *method && d.namespaced() == namespaced))
                .or_else(|| list.iter().find(|d| d.id().method == *method))
                .or_else(|| list.first());
            if let Some(d) = chosen {
                return Ok((d, info));
            }
        }
        Err(RouteError::NotFound(format!("{} {}", method, path_display(path))))
    }

    /// Serve an HTTP request and translate the outcome into a response.
    ///
    /// Routing and handler failures are reported with generic `Status`
    /// bodies; the detailed error is only logged.
    pub async fn dispatch<B>(&self, ctx: &RequestContext, req: Request<B>) -> Response<Bytes>
    where
        B: AsyncRead + Unpin + Send,
    {
        let (parts, body) = req.into_parts();
        let http::request::Parts { method, uri, headers, .. } = parts;
        let path = uri.path().to_string();
        let outcome = async {
            let parsed = RequestPath::parse(&path)?;
            let (dispatcher, info) = self.resolve(&parsed, &method)?;
            let inbound = Inbound { method: method.clone(), headers, query: uri.query().unwrap_or("").to_string(), body };
            dispatcher.serve(ctx, &info, inbound).await
        }
        .await;

        match outcome {
            Ok(out) => {
                let mut resp = Response::new(out.body);
                *resp.status_mut() = out.status;
                if let Some(headers) = out.headers {
                    resp.headers_mut().extend(headers);
                }
                resp
            }
            Err(err) => {
                if matches!(err, RouteError::Handler(_) | RouteError::DuplicateRoute(_)) {
                    error!(error = %err, method = %method, path = %path, "routes: handler failed");
                } else {
                    warn!(error = %err, method = %method, path = %path, "routes: request rejected");
                }
                error_response(&err)
            }
        }
    }
}

fn error_response(err: &RouteError) -> Response<Bytes> {
    let (code, reason, message) = if err.is_bad_request() {
        (StatusCode::BAD_REQUEST, "BadRequest", "bad request")
    } else if matches!(err, RouteError::NotFound(_)) {
        (StatusCode::NOT_FOUND, "NotFound", "the server could not find the requested resource")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "internal server error")
    };
    counter!("route_rejections_total", 1u64, "code" => code.as_u16().to_string());
    let body = serde_json::to_vec(&status_body(code, reason, message)).unwrap_or_default();
    let mut resp = Response::new(Bytes::from(body));
    *resp.status_mut() = code;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn path_display(path: &RequestPath) -> String {
    let mut out = if path.api_group.is_empty() {
        format!("/api/{}", path.api_version)
    } else {
        format!("/apis/{}/{}", path.api_group, path.api_version)
    };
    if let Some(ns) = path.namespace.as_deref() {
        out.push_str("/namespaces/");
        out.push_str(ns);
    }
    out.push('/');
    out.push_str(&path.resource);
    for p in path.parts.iter() {
        out.push('/');
        out.push_str(p);
    }
    out
}
