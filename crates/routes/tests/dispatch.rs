#![forbid(unsafe_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use kapp_core::{RequestContext, ResourceKind};
use kapp_routes::{
    CustomRouteIdentifier, CustomRouteResponse, HandlerFn, Inbound, RequestInfo, RequestPath, RouteDispatcher,
    RouteError, RouteHandler, RouteTable,
};
use tokio::io::{AsyncRead, ReadBuf};

fn kind() -> ResourceKind {
    ResourceKind::new("test", "v1", "Test")
}

/// Counts calls and echoes what it saw.
struct Echo {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl RouteHandler for Echo {
    async fn handle(
        &self,
        _ctx: &RequestContext,
        req: kapp_routes::ResourceCustomRouteRequest,
    ) -> anyhow::Result<CustomRouteResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seen = serde_json::json!({
            "namespace": req.namespace,
            "name": req.name,
            "kind": req.kind,
            "plural": req.plural,
            "sub": req.subresource_path,
            "query": req.query,
            "body": String::from_utf8_lossy(&req.body),
        });
        Ok(CustomRouteResponse::json(StatusCode::OK, &seen)?
            .with_header(http::header::HeaderName::from_static("x-trace"), HeaderValue::from_static("a"))
            .with_header(http::header::HeaderName::from_static("x-trace"), HeaderValue::from_static("b")))
    }
}

fn metadata_route(handler: Arc<dyn RouteHandler>) -> RouteDispatcher {
    RouteDispatcher::new(CustomRouteIdentifier::new("test", "v1", "tests", "metadata", Method::GET), &kind(), handler)
}

fn info(group: &str, version: &str, resource: &str, sub: &str) -> RequestInfo {
    RequestInfo {
        api_group: group.into(),
        api_version: version.into(),
        namespace: Some("default".into()),
        resource: resource.into(),
        name: None,
        subresource: sub.into(),
    }
}

fn get(path: &str) -> Request<&'static [u8]> {
    Request::builder().method(Method::GET).uri(path).body(&b""[..]).unwrap()
}

#[tokio::test]
async fn get_on_resource_route_invokes_handler() {
    let echo = Arc::new(Echo { calls: AtomicUsize::new(0) });
    let mut table = RouteTable::new();
    table.register(metadata_route(echo.clone())).unwrap();

    let resp = table
        .dispatch(&RequestContext::new(), get("/apis/test/v1/namespaces/default/tests/metadata?verbose=1"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    let all: Vec<_> = resp.headers().get_all("x-trace").iter().collect();
    assert_eq!(all, vec!["a", "b"]);
    let seen: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(seen["namespace"], "default");
    assert_eq!(seen["name"], serde_json::Value::Null);
    assert_eq!(seen["kind"], "Test");
    assert_eq!(seen["sub"], "metadata");
    assert_eq!(seen["query"], "verbose=1");
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let d = metadata_route(Arc::new(Echo { calls: AtomicUsize::new(0) }));
    let err = d.validate(&info("test", "v1", "tests", "metadata"), &Method::POST).unwrap_err();
    assert_eq!(err.to_string(), "method not allowed: expected GET, got POST");

    let mut table = RouteTable::new();
    table.register(d).unwrap();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/apis/test/v1/namespaces/default/tests/metadata")
        .body(&b""[..])
        .unwrap();
    let resp = table.dispatch(&RequestContext::new(), req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let status: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(status["message"], "bad request");
    assert_eq!(status["kind"], "Status");
}

#[tokio::test]
async fn each_mismatch_names_its_dimension() {
    let d = metadata_route(Arc::new(Echo { calls: AtomicUsize::new(0) }));
    let cases = [
        (info("wrong-group", "v1", "tests", "metadata"), "group mismatch: expected test, got wrong-group"),
        (info("test", "v2", "tests", "metadata"), "version mismatch: expected v1, got v2"),
        (info("test", "v1", "others", "metadata"), "resource mismatch: expected tests, got others"),
        (info("test", "v1", "tests", "status"), "subresource mismatch: expected metadata, got status"),
    ];
    for (i, want) in cases {
        assert_eq!(d.validate(&i, &Method::GET).unwrap_err().to_string(), want);
    }
    assert!(d.validate(&info("test", "v1", "tests", "metadata"), &Method::GET).is_ok());
}

#[tokio::test]
async fn namespace_is_checked_first() {
    let d = metadata_route(Arc::new(Echo { calls: AtomicUsize::new(0) }));
    let mut i = info("wrong-group", "v1", "tests", "metadata");
    i.namespace = None;
    let err = d.validate(&i, &Method::POST).unwrap_err();
    assert!(matches!(err, RouteError::NamespaceMissing(_)), "{:?}", err);

    let mut table = RouteTable::new();
    table.register(d).unwrap();
    let resp = table.dispatch(&RequestContext::new(), get("/apis/test/v1/tests/metadata")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn object_level_route_receives_name() {
    let echo = Arc::new(Echo { calls: AtomicUsize::new(0) });
    let mut table = RouteTable::new();
    let id = CustomRouteIdentifier::new("test", "v1", "tests", "", Method::POST);
    table.register(RouteDispatcher::new(id, &kind(), echo.clone())).unwrap();
    let id = CustomRouteIdentifier::new("test", "v1", "tests", "restock", Method::POST);
    table.register(RouteDispatcher::new(id, &kind(), echo.clone())).unwrap();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/apis/test/v1/namespaces/default/tests/inv-1/restock")
        .body(&b"{\"count\":3}"[..])
        .unwrap();
    let resp = table.dispatch(&RequestContext::new(), req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let seen: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(seen["name"], "inv-1");
    assert_eq!(seen["sub"], "restock");
    assert_eq!(seen["body"], "{\"count\":3}");
}

#[tokio::test]
async fn unknown_and_malformed_paths() {
    let mut table = RouteTable::new();
    table.register(metadata_route(Arc::new(Echo { calls: AtomicUsize::new(0) }))).unwrap();
    let ctx = RequestContext::new();

    let resp = table.dispatch(&ctx, get("/apis/test/v1/namespaces/default/widgets/metadata")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = table.dispatch(&ctx, get("/healthz")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let parsed = RequestPath::parse("/apis/test/v1/namespaces/default/widgets").unwrap();
    assert!(matches!(table.resolve(&parsed, &Method::GET), Err(RouteError::NotFound(_))));
}

#[tokio::test]
async fn handler_errors_are_hidden_from_clients() {
    let failing = HandlerFn::new(|_ctx, _req| async move {
        Err::<CustomRouteResponse, _>(anyhow::anyhow!("database password is hunter2"))
    });
    let mut table = RouteTable::new();
    table.register(metadata_route(Arc::new(failing))).unwrap();
    let resp = table.dispatch(&RequestContext::new(), get("/apis/test/v1/namespaces/default/tests/metadata")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8_lossy(resp.body()).to_string();
    assert!(!text.contains("hunter2"));
    assert!(text.contains("internal server error"));
}

#[tokio::test]
async fn duplicate_registration_fails() {
    let echo: Arc<dyn RouteHandler> = Arc::new(Echo { calls: AtomicUsize::new(0) });
    let mut table = RouteTable::new();
    table.register(metadata_route(echo.clone())).unwrap();
    assert!(matches!(table.register(metadata_route(echo.clone())), Err(RouteError::DuplicateRoute(_))));
    let post = CustomRouteIdentifier::new("test", "v1", "tests", "metadata", Method::POST);
    table.register(RouteDispatcher::new(post, &kind(), echo)).unwrap();
    assert_eq!(table.len(), 2);
}

#[tokio::test]
async fn same_key_routes_pick_by_method() {
    let get_handler = HandlerFn::new(|_ctx, _req| async move { Ok::<_, anyhow::Error>(CustomRouteResponse::new(StatusCode::OK, "get")) });
    let post_handler =
        HandlerFn::new(|_ctx, _req| async move { Ok::<_, anyhow::Error>(CustomRouteResponse::new(StatusCode::CREATED, "post")) });
    let mut table = RouteTable::new();
    table.register(metadata_route(Arc::new(get_handler))).unwrap();
    let post = CustomRouteIdentifier::new("test", "v1", "tests", "metadata", Method::POST);
    table.register(RouteDispatcher::new(post, &kind(), Arc::new(post_handler))).unwrap();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/apis/test/v1/namespaces/default/tests/metadata")
        .body(&b""[..])
        .unwrap();
    let resp = table.dispatch(&RequestContext::new(), req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.body(), &Bytes::from_static(b"post"));
}

struct BrokenBody;

impl AsyncRead for BrokenBody {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")))
    }
}

#[tokio::test]
async fn body_read_failure_is_a_client_error() {
    let echo = Arc::new(Echo { calls: AtomicUsize::new(0) });
    let d = metadata_route(echo.clone());
    let inbound = Inbound { method: Method::GET, headers: HeaderMap::new(), query: String::new(), body: BrokenBody };
    let err = d.serve(&RequestContext::new(), &info("test", "v1", "tests", "metadata"), inbound).await.unwrap_err();
    assert!(matches!(err, RouteError::BodyRead(_)));
    assert!(err.is_bad_request());
    assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
}

fn stats_route(namespaced: bool, body: &'static str) -> RouteDispatcher {
    let handler = HandlerFn::new(move |_ctx, _req| async move {
        Ok::<_, anyhow::Error>(CustomRouteResponse::new(StatusCode::OK, body))
    });
    let id = CustomRouteIdentifier::new("test", "v1", "stats", "", Method::GET);
    RouteDispatcher::unbound(id, namespaced, Arc::new(handler))
}

#[tokio::test]
async fn cluster_route_rejects_a_namespace() {
    let d = stats_route(false, "cluster");
    let mut i = info("test", "v1", "stats", "");
    i.namespace = Some("x".into());
    match d.validate(&i, &Method::GET).unwrap_err() {
        RouteError::NamespaceNotAllowed { namespace, .. } => assert_eq!(namespace, "x"),
        other => panic!("unexpected {:?}", other),
    }
    i.namespace = None;
    assert!(d.validate(&i, &Method::GET).is_ok());

    let mut table = RouteTable::new();
    table.register(d).unwrap();
    let ctx = RequestContext::new();
    let resp = table.dispatch(&ctx, get("/apis/test/v1/namespaces/x/stats")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = table.dispatch(&ctx, get("/apis/test/v1/stats")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let mut table = RouteTable::new();
    table.register(stats_route(true, "namespaced")).unwrap();
    let resp = table.dispatch(&ctx, get("/apis/test/v1/stats")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cluster_and_namespaced_routes_share_a_path() {
    let mut table = RouteTable::new();
    table.register(stats_route(false, "cluster")).unwrap();
    table.register(stats_route(true, "namespaced")).unwrap();
    assert!(matches!(table.register(stats_route(true, "again")), Err(RouteError::DuplicateRoute(_))));
    assert_eq!(table.len(), 2);

    let ctx = RequestContext::new();
    let resp = table.dispatch(&ctx, get("/apis/test/v1/stats")).await;
    assert_eq!(resp.body(), &Bytes::from_static(b"cluster"));
    let resp = table.dispatch(&ctx, get("/apis/test/v1/namespaces/x/stats")).await;
    assert_eq!(resp.body(), &Bytes::from_static(b"namespaced"));
}
