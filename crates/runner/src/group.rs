use std::sync::Arc;

use kapp_admission::{AdmissionCapabilities, AdmissionHooks, AdmissionRequest, AdmissionTranslator, MutatingResponse};
use kapp_core::{KappError, KappResult, RequestContext, ResourceKind};
use kapp_routes::{CustomRouteIdentifier, CustomRouteResponse, ResourceCustomRouteRequest, RouteDispatcher, RouteHandler, RouteTable};
use kapp_store::StoreRegistry;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::manifest::parse_methods;
use crate::{App, AppConfig, AppProvider, BaseConfig, ManifestData, ManifestLocationType, RunnerError, RunnerOptions};

/// Holds the app once `init` has built it. Route handlers and admission
/// hooks are wired to the slot at construction and see the app afterwards.
pub struct AppSlot {
    name: String,
    app: OnceCell<Arc<dyn App>>,
}

impl AppSlot {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), app: OnceCell::new() }
    }

    pub fn get(&self) -> Option<&Arc<dyn App>> {
        self.app.get()
    }

    fn install(&self, app: Arc<dyn App>) -> Result<(), RunnerError> {
        self.app.set(app).map_err(|_| RunnerError::AlreadyInitialized)
    }

    fn not_ready(&self) -> KappError {
        KappError::internal(format!("app {} is not initialized", self.name))
    }
}

#[async_trait::async_trait]
impl AdmissionHooks for AppSlot {
    async fn mutate(&self, ctx: &RequestContext, req: &AdmissionRequest) -> KappResult<MutatingResponse> {
        match self.get() {
            Some(app) => app.mutate(ctx, req).await,
            None => Err(self.not_ready()),
        }
    }

    async fn validate(&self, ctx: &RequestContext, req: &AdmissionRequest) -> KappResult<()> {
        match self.get() {
            Some(app) => app.validate(ctx, req).await,
            None => Err(self.not_ready()),
        }
    }
}

struct AppRouteHandler {
    slot: Arc<AppSlot>,
}

#[async_trait::async_trait]
impl RouteHandler for AppRouteHandler {
    async fn handle(&self, ctx: &RequestContext, req: ResourceCustomRouteRequest) -> anyhow::Result<CustomRouteResponse> {
        match self.slot.get() {
            Some(app) => app.call_custom_route(ctx, req).await,
            None => Err(self.slot.not_ready().into()),
        }
    }
}

/// Stores, routes and admission for one app.
pub struct AppGroup {
    name: String,
    provider: Arc<dyn AppProvider>,
    manifest: ManifestData,
    kinds: Vec<ResourceKind>,
    stores: Arc<StoreRegistry>,
    routes: RouteTable,
    admission: AdmissionTranslator,
    slot: Arc<AppSlot>,
}

impl AppGroup {
    pub fn new(provider: Arc<dyn AppProvider>, opts: &RunnerOptions) -> Result<Self, RunnerError> {
        let manifest = provider.manifest();
        if manifest.location.kind != ManifestLocationType::Embedded {
            return Err(RunnerError::Configuration(format!(
                "manifest location {:?} ({}) is not supported; only embedded manifests can be served",
                manifest.location.kind,
                manifest.location.path.as_deref().unwrap_or("")
            )));
        }
        let data = manifest
            .data
            .ok_or_else(|| RunnerError::Configuration("embedded manifest carries no data".to_string()))?;
        data.validate()
            .map_err(|problems| RunnerError::InvalidManifest { app: data.app_name.clone(), problems })?;

        let name = data.app_name.clone();
        let slot = Arc::new(AppSlot::new(&name));
        let handler: Arc<dyn RouteHandler> = Arc::new(AppRouteHandler { slot: Arc::clone(&slot) });
        let stores = Arc::new(StoreRegistry::new(opts.store.clone()));
        let mut routes = RouteTable::new();
        let mut caps: FxHashMap<String, AdmissionCapabilities> = FxHashMap::default();
        let mut kinds = Vec::new();

        let mut selectable: FxHashMap<&str, Vec<String>> = FxHashMap::default();
        for mk in data.served_versions().flat_map(|v| v.kinds.iter()) {
            let fields = selectable.entry(mk.kind.as_str()).or_default();
            for f in mk.selectable_fields.iter() {
                let f = f.trim_start_matches('.').to_string();
                if !fields.contains(&f) {
                    fields.push(f);
                }
            }
        }
        for version in data.versions_by_preference() {
            for mk in version.kinds.iter() {
                let kind = mk.resource_kind(&data.group, &version.name);
                let fields = selectable.get(mk.kind.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                stores.register(&kind, fields);
            }
        }

        for version in data.served_versions() {
            for mk in version.kinds.iter() {
                let kind = mk.resource_kind(&data.group, &version.name);
                for (path, methods) in mk.routes.iter() {
                    for method in parse_methods(methods).map_err(RunnerError::Configuration)? {
                        let id = CustomRouteIdentifier::new(&data.group, &version.name, &kind.plural, path, method);
                        routes.register(RouteDispatcher::new(id, &kind, Arc::clone(&handler)))?;
                    }
                }
                if let Some(c) = mk.admission.as_ref() {
                    caps.insert(kind.gvk_key(), c.clone());
                }
                kinds.push(kind);
            }
            for (namespaced, table) in [(true, &version.routes.namespaced), (false, &version.routes.cluster)] {
                for (path, methods) in table.iter() {
                    if !opts.route_enabled(&data.group, &version.name, path) {
                        info!(app = %name, version = %version.name, path = %path, "runner: custom route disabled; skipping");
                        continue;
                    }
                    let path = path.trim_matches('/');
                    let (head, rest) = path.split_once('/').unwrap_or((path, ""));
                    for method in parse_methods(methods).map_err(RunnerError::Configuration)? {
                        let id = CustomRouteIdentifier::new(&data.group, &version.name, head, rest, method);
                        routes.register(RouteDispatcher::unbound(id, namespaced, Arc::clone(&handler)))?;
                    }
                }
            }
        }

        let hooks: Arc<dyn AdmissionHooks> = slot.clone();
        let admission = AdmissionTranslator::new(hooks).with_capabilities(caps).with_policy(opts.unimplemented_policy);
        info!(app = %name, group = %data.group, kinds = kinds.len(), routes = routes.len(), "runner: app group built");
        Ok(Self { name, provider, manifest: data, kinds, stores, routes, admission, slot })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest(&self) -> &ManifestData {
        &self.manifest
    }

    /// Served kinds, one entry per version.
    pub fn kinds(&self) -> &[ResourceKind] {
        &self.kinds
    }

    pub fn stores(&self) -> &Arc<StoreRegistry> {
        &self.stores
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn admission(&self) -> &AdmissionTranslator {
        &self.admission
    }

    pub fn app(&self) -> Option<Arc<dyn App>> {
        self.slot.get().cloned()
    }

    pub(crate) fn install(&self, base: Arc<BaseConfig>) -> Result<(), RunnerError> {
        if self.slot.get().is_some() {
            return Err(RunnerError::AlreadyInitialized);
        }
        let cfg = AppConfig {
            base,
            specific: self.provider.specific_config(),
            manifest: self.manifest.clone(),
            stores: Arc::clone(&self.stores),
        };
        let app = self
            .provider
            .new_app(cfg)
            .map_err(|source| RunnerError::App { app: self.name.clone(), source })?;
        self.slot.install(app)?;
        debug!(app = %self.name, "runner: app installed");
        Ok(())
    }
}
