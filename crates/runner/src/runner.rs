use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use http::{Request, Response};
use kapp_admission::UnimplementedPolicy;
use kapp_core::RequestContext;
use kapp_routes::{RequestPath, RouteTable};
use kapp_store::StoreConfig;
use once_cell::sync::OnceCell;
use tokio::io::AsyncRead;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::{AppGroup, AppProvider, BaseConfig, ConfigResolver, RunnerError};

/// Settings applied to every app group at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    pub store: StoreConfig,
    pub unimplemented_policy: UnimplementedPolicy,
    /// How long `run` waits for the other apps after the first failure.
    pub shutdown_grace: Duration,
    /// Version-level routes switched off, as `group/version/resource` where
    /// resource is the first segment of the route path.
    pub disabled_routes: Vec<String>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            unimplemented_policy: UnimplementedPolicy::default(),
            shutdown_grace: Duration::from_secs(5),
            disabled_routes: Vec::new(),
        }
    }
}

impl RunnerOptions {
    /// Reads `KAPP_SHUTDOWN_GRACE_MS` and `KAPP_DISABLED_ROUTES`
    /// (comma separated) on top of the store and admission settings.
    pub fn from_env() -> Self {
        let d = Self::default();
        let shutdown_grace = std::env::var("KAPP_SHUTDOWN_GRACE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.shutdown_grace);
        let disabled_routes = std::env::var("KAPP_DISABLED_ROUTES")
            .ok()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            store: StoreConfig::from_env(),
            unimplemented_policy: UnimplementedPolicy::from_env(),
            shutdown_grace,
            disabled_routes,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn disable_route(mut self, group: &str, version: &str, resource: &str) -> Self {
        self.disabled_routes.push(format!("{}/{}/{}", group, version, resource));
        self
    }

    /// Whether the version-level route at `path` should be served.
    pub fn route_enabled(&self, group: &str, version: &str, path: &str) -> bool {
        let resource = path.trim_matches('/').split('/').next().unwrap_or("");
        let key = format!("{}/{}/{}", group, version, resource);
        !self.disabled_routes.iter().any(|d| *d == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Pending,
    Ready,
    Failed,
}

/// Owns the app groups of one server and drives their lifecycle:
/// construction, a single `init`, then `run`.
pub struct AppGroupRunner {
    groups: Vec<Arc<AppGroup>>,
    resolver: Arc<dyn ConfigResolver>,
    init_started: Mutex<bool>,
    base: OnceCell<Arc<BaseConfig>>,
    state_tx: watch::Sender<InitState>,
    shutdown_grace: Duration,
    unrouted: RouteTable,
}

impl AppGroupRunner {
    pub fn new(
        providers: Vec<Arc<dyn AppProvider>>,
        opts: RunnerOptions,
        resolver: Arc<dyn ConfigResolver>,
    ) -> Result<Self, RunnerError> {
        let mut groups = Vec::with_capacity(providers.len());
        for provider in providers {
            let group = AppGroup::new(provider, &opts)?;
            if groups.iter().any(|g: &Arc<AppGroup>| g.manifest().group == group.manifest().group) {
                return Err(RunnerError::Configuration(format!(
                    "API group {} is served by more than one app",
                    group.manifest().group
                )));
            }
            groups.push(Arc::new(group));
        }
        let (state_tx, _) = watch::channel(InitState::Pending);
        Ok(Self {
            groups,
            resolver,
            init_started: Mutex::new(false),
            base: OnceCell::new(),
            state_tx,
            shutdown_grace: opts.shutdown_grace,
            unrouted: RouteTable::new(),
        })
    }

    pub fn groups(&self) -> &[Arc<AppGroup>] {
        &self.groups
    }

    pub fn group(&self, app_name: &str) -> Option<&Arc<AppGroup>> {
        self.groups.iter().find(|g| g.name() == app_name)
    }

    pub fn is_ready(&self) -> bool {
        *self.state_tx.borrow() == InitState::Ready
    }

    /// Base config resolved by `init`.
    pub fn base_config(&self) -> Option<&Arc<BaseConfig>> {
        self.base.get()
    }

    /// Resolve the base config and build every app. May run once; later
    /// calls fail with [`RunnerError::AlreadyInitialized`] even if the first
    /// attempt failed. A failed attempt releases any `run` waiting for it.
    pub async fn init(&self, ctx: &RequestContext) -> Result<(), RunnerError> {
        let mut started = self.init_started.lock().await;
        if *started {
            return Err(RunnerError::AlreadyInitialized);
        }
        *started = true;
        let res = self.install_apps(ctx).await;
        match res.as_ref() {
            Ok(()) => self.state_tx.send_replace(InitState::Ready),
            Err(e) => {
                error!(error = %e, "runner: init failed");
                self.state_tx.send_replace(InitState::Failed)
            }
        };
        res
    }

    async fn install_apps(&self, ctx: &RequestContext) -> Result<(), RunnerError> {
        if ctx.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }
        let t0 = Instant::now();
        let base = self
            .resolver
            .resolve(ctx)
            .await
            .map_err(|e| RunnerError::Configuration(format!("resolving base config: {:#}", e)))?;
        let base = Arc::new(base);
        for group in self.groups.iter() {
            group.install(Arc::clone(&base))?;
        }
        let _ = self.base.set(Arc::clone(&base));
        info!(server = %base.server_name, apps = self.groups.len(), took_ms = t0.elapsed().as_millis() as u64, "runner: init ok");
        Ok(())
    }

    /// Wait for `init`, then run every app until all return or one fails.
    ///
    /// The first failure cancels the others and is returned once they stop,
    /// or after the shutdown grace period; apps still running then are
    /// dropped. A failed `init` yields [`RunnerError::NotInitialized`].
    pub async fn run(&self, ctx: &RequestContext) -> Result<(), RunnerError> {
        let mut state = self.state_tx.subscribe();
        let settled = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(RunnerError::Cancelled),
            s = async { state.wait_for(|s| *s != InitState::Pending).await.map(|s| *s) } => s,
        };
        if !matches!(settled, Ok(InitState::Ready)) {
            return Err(RunnerError::NotInitialized);
        }

        let child = ctx.child();
        let mut tasks = FuturesUnordered::new();
        for group in self.groups.iter() {
            let app = group.app().ok_or(RunnerError::NotInitialized)?;
            let name = group.name().to_string();
            let ctx = child.clone();
            tasks.push(async move {
                let res = app.run(&ctx).await;
                (name, res)
            });
        }
        info!(apps = tasks.len(), "runner: apps running");

        let mut first_err = None;
        while let Some((name, res)) = tasks.next().await {
            match res {
                Ok(()) => info!(app = %name, "runner: app finished"),
                Err(source) => {
                    error!(app = %name, error = %format!("{:#}", source), "runner: app failed; stopping the rest");
                    child.cancel();
                    first_err = Some(RunnerError::App { app: name, source });
                    break;
                }
            }
        }
        let Some(err) = first_err else {
            return Ok(());
        };

        let drain = async {
            while let Some((name, res)) = tasks.next().await {
                match res {
                    Ok(()) => debug!(app = %name, "runner: app stopped"),
                    Err(source) => warn!(app = %name, error = %format!("{:#}", source), "runner: app failed during shutdown"),
                }
            }
        };
        if tokio::time::timeout(self.shutdown_grace, drain).await.is_err() {
            warn!(
                pending = tasks.len(),
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "runner: apps ignored cancellation; dropping them"
            );
        }
        Err(err)
    }

    /// Route an HTTP request to the app group serving its API group.
    pub async fn dispatch<B>(&self, ctx: &RequestContext, req: Request<B>) -> Response<Bytes>
    where
        B: AsyncRead + Unpin + Send,
    {
        let group = RequestPath::parse(req.uri().path())
            .ok()
            .and_then(|p| self.groups.iter().find(|g| g.manifest().group == p.api_group));
        match group {
            Some(g) => g.routes().dispatch(ctx, req).await,
            None => self.unrouted.dispatch(ctx, req).await,
        }
    }
}
