//! App-facing traits: what an app provides and what it gets at construction.

use std::sync::Arc;

use kapp_admission::AdmissionHooks;
use kapp_core::RequestContext;
use kapp_routes::{CustomRouteResponse, ResourceCustomRouteRequest};
use kapp_store::StoreRegistry;
use serde::{Deserialize, Serialize};

use crate::{Manifest, ManifestData};

/// Server-wide settings shared by every app in a runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseConfig {
    pub server_name: String,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self { server_name: "kapp".to_string() }
    }
}

/// Produces the [`BaseConfig`] during `init`.
#[async_trait::async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn resolve(&self, ctx: &RequestContext) -> anyhow::Result<BaseConfig>;
}

/// Reads `KAPP_SERVER_NAME`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigResolver;

#[async_trait::async_trait]
impl ConfigResolver for EnvConfigResolver {
    async fn resolve(&self, _ctx: &RequestContext) -> anyhow::Result<BaseConfig> {
        let server_name = std::env::var("KAPP_SERVER_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| BaseConfig::default().server_name);
        Ok(BaseConfig { server_name })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticConfigResolver(pub BaseConfig);

#[async_trait::async_trait]
impl ConfigResolver for StaticConfigResolver {
    async fn resolve(&self, _ctx: &RequestContext) -> anyhow::Result<BaseConfig> {
        Ok(self.0.clone())
    }
}

/// Everything an app receives when constructed.
#[derive(Clone)]
pub struct AppConfig {
    pub base: Arc<BaseConfig>,
    /// App-specific settings from [`AppProvider::specific_config`].
    pub specific: Option<serde_json::Value>,
    pub manifest: ManifestData,
    pub stores: Arc<StoreRegistry>,
}

/// A running application: admission hooks, custom routes and a background loop.
#[async_trait::async_trait]
pub trait App: AdmissionHooks {
    async fn call_custom_route(
        &self,
        _ctx: &RequestContext,
        req: ResourceCustomRouteRequest,
    ) -> anyhow::Result<CustomRouteResponse> {
        anyhow::bail!("no handler for {} {}/{}", req.method, req.plural, req.subresource_path)
    }

    /// Long-running work; returns when done or when `ctx` is cancelled.
    async fn run(&self, _ctx: &RequestContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds an app once the runner has resolved its configuration.
pub trait AppProvider: Send + Sync {
    fn manifest(&self) -> Manifest;

    fn specific_config(&self) -> Option<serde_json::Value> {
        None
    }

    fn new_app(&self, cfg: AppConfig) -> anyhow::Result<Arc<dyn App>>;
}
