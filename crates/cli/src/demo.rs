//! Inventory demo app: one namespaced `Item` kind with admission hooks, a
//! `summary` route backed by the manifest's printer columns and a `stats`
//! route at the version level. Items are selectable by `spec.location`.

use std::sync::Arc;

use anyhow::{Context, Result};
use http::{Method, Request, StatusCode};
use kapp_admission::{AdmissionHooks, AdmissionRequest, AttributesRecord, MutatingResponse, Operation};
use kapp_core::{FieldSummary, KappError, KappResult, RequestContext, Resource, ResourceKind, Summarizable};
use kapp_routes::{CustomRouteResponse, ResourceCustomRouteRequest};
use kapp_runner::{
    App, AppConfig, AppGroupRunner, AppProvider, EnvConfigResolver, Manifest, ManifestData, RunnerOptions,
};
use kapp_store::{ListOptions, ResourceStore, UpdateOptions};
use serde::Serialize;
use tracing::{debug, info, warn};

pub const MANAGED_LABEL: &str = "inventory.kapp.dev/managed";

const INVENTORY_MANIFEST: &str = include_str!("../manifests/inventory.yaml");

pub fn inventory_manifest() -> Result<ManifestData> {
    ManifestData::from_yaml(INVENTORY_MANIFEST).context("parsing embedded inventory manifest")
}

fn item_kind(data: &ManifestData) -> Result<ResourceKind> {
    data.kinds().into_iter().find(|k| k.kind == "Item").context("manifest declares no Item kind")
}

struct InventoryApp {
    cfg: AppConfig,
    items: Arc<ResourceStore>,
    summary: FieldSummary,
}

#[async_trait::async_trait]
impl AdmissionHooks for InventoryApp {
    async fn mutate(&self, _ctx: &RequestContext, req: &AdmissionRequest) -> KappResult<MutatingResponse> {
        let obj = req.object.clone().ok_or_else(|| KappError::invalid("mutate without an object"))?;
        Ok(MutatingResponse::updated(obj.with_label(MANAGED_LABEL, "true")))
    }

    async fn validate(&self, _ctx: &RequestContext, req: &AdmissionRequest) -> KappResult<()> {
        let Some(obj) = req.object.as_ref() else { return Ok(()) };
        match obj.spec.get("quantity").and_then(|q| q.as_i64()) {
            Some(q) if q < 0 => Err(KappError::invalid(format!("{}: quantity must not be negative, got {}", obj.name(), q))),
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl App for InventoryApp {
    async fn call_custom_route(
        &self,
        ctx: &RequestContext,
        req: ResourceCustomRouteRequest,
    ) -> anyhow::Result<CustomRouteResponse> {
        let ns = req.namespace.as_deref();
        match (req.plural.as_str(), req.subresource_path.as_str()) {
            ("items", "summary") => {
                if let Some(name) = req.name.as_deref() {
                    let obj = self.items.get(ctx, ns, name).await?;
                    return CustomRouteResponse::json(StatusCode::OK, &self.summary.view(&obj).summary_json());
                }
                let mut opts = ListOptions::default();
                if let Some(ns) = ns {
                    opts = opts.in_namespace(ns);
                }
                let list = self.items.list(ctx, opts).await?;
                let rows: Vec<serde_json::Value> =
                    list.items.iter().map(|o| self.summary.view(o).summary_json()).collect();
                CustomRouteResponse::json(StatusCode::OK, &serde_json::json!({ "rows": rows }))
            }
            ("stats", "") => {
                let mut opts = ListOptions::default();
                if let Some(ns) = ns {
                    opts = opts.in_namespace(ns);
                }
                let list = self.items.list(ctx, opts).await?;
                let total: i64 = list.items.iter().filter_map(|o| o.spec.get("quantity").and_then(|q| q.as_i64())).sum();
                let body = serde_json::json!({
                    "server": self.cfg.base.server_name,
                    "items": list.len(),
                    "totalQuantity": total,
                });
                CustomRouteResponse::json(StatusCode::OK, &body)
            }
            (plural, path) => anyhow::bail!("inventory has no route {} {}/{}", req.method, plural, path),
        }
    }

    async fn run(&self, ctx: &RequestContext) -> anyhow::Result<()> {
        let mut versions = self.items.subscribe_versions();
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                changed = versions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let rv = *versions.borrow_and_update();
                    debug!(rv, "inventory: items changed");
                }
            }
        }
        info!(last_rv = self.items.current_version(), "inventory: watcher stopped");
        Ok(())
    }
}

pub struct InventoryProvider {
    data: ManifestData,
}

impl InventoryProvider {
    pub fn new() -> Result<Self> {
        Ok(Self { data: inventory_manifest()? })
    }
}

impl AppProvider for InventoryProvider {
    fn manifest(&self) -> Manifest {
        Manifest::embedded(self.data.clone())
    }

    fn new_app(&self, cfg: AppConfig) -> anyhow::Result<Arc<dyn App>> {
        let kind = item_kind(&cfg.manifest)?;
        let columns = cfg
            .manifest
            .versions
            .iter()
            .flat_map(|v| v.kinds.iter())
            .find(|k| k.kind == kind.kind)
            .map(|k| k.summary_columns())
            .unwrap_or_default();
        let summary = FieldSummary::new(&columns)?;
        let items = cfg.stores.store_for(&kind);
        Ok(Arc::new(InventoryApp { cfg, items, summary }))
    }
}

/// What the demo did, step by step.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoReport {
    pub created: Vec<String>,
    pub rejected: Vec<String>,
    pub conflicts: Vec<String>,
    pub pages: Vec<Vec<String>>,
    /// Items selected by `spec.location`.
    pub in_aisle: Vec<String>,
    pub summary: serde_json::Value,
    pub item_summary: serde_json::Value,
    pub stats: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
}

const SEED: &[(&str, &str, i64, &str)] = &[
    ("bolts", "B-100", 120, "aisle-1"),
    ("nuts", "N-070", 40, "aisle-1"),
    ("washers", "W-003", 0, "aisle-2"),
    ("gears", "G-042", 7, "aisle-3"),
    ("broken", "X-000", -5, "aisle-9"),
];

async fn get_json<T>(runner: &AppGroupRunner, ctx: &RequestContext, path: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let req = Request::builder().method(Method::GET).uri(path).body(&b""[..])?;
    let resp = runner.dispatch(ctx, req).await;
    if resp.status() != StatusCode::OK {
        anyhow::bail!("GET {} returned {}", path, resp.status());
    }
    Ok(serde_json::from_slice(resp.body())?)
}

/// Run the inventory app in process and exercise admission, the store and
/// custom routes against it.
pub async fn run(ctx: &RequestContext, opts: RunnerOptions, namespace: &str, page_size: u64) -> Result<DemoReport> {
    let provider: Arc<dyn AppProvider> = Arc::new(InventoryProvider::new()?);
    let runner = Arc::new(AppGroupRunner::new(vec![provider], opts, Arc::new(EnvConfigResolver))?);
    runner.init(ctx).await?;

    let app_ctx = ctx.child();
    let run_handle = {
        let runner = Arc::clone(&runner);
        let app_ctx = app_ctx.clone();
        tokio::spawn(async move { runner.run(&app_ctx).await })
    };

    let group = runner.group("inventory").context("inventory group missing")?;
    let kind = item_kind(group.manifest())?;
    let store = group.stores().store_for(&kind);
    let mut report = DemoReport::default();

    for (name, sku, quantity, location) in SEED.iter() {
        let obj = Resource::new(&kind, Some(namespace), name)
            .with_spec(serde_json::json!({ "sku": sku, "quantity": quantity, "location": location }));
        let mut attrs = AttributesRecord::new(Operation::Create, kind.clone(), Some(namespace), name).with_object(obj);
        group.admission().mutate(ctx, &mut attrs).await?;
        if let Err(e) = group.admission().validate(ctx, &attrs).await {
            warn!(item = %name, error = %e, "demo: create rejected");
            report.rejected.push(e.to_string());
            continue;
        }
        let obj = attrs.object.take().context("admission dropped the object")?;
        let stored = store.create(ctx, obj).await?;
        info!(item = %name, rv = ?stored.resource_version(), "demo: created");
        report.created.push(format!("{}@{}", stored.name(), stored.resource_version().unwrap_or("")));
    }

    let bolts = store.get(ctx, Some(namespace), "bolts").await?;
    let stale_rv = bolts.resource_version().unwrap_or_default().to_string();
    store
        .update(ctx, Some(namespace), "bolts", UpdateOptions::expecting(&stale_rv), |mut o| {
            o.spec["quantity"] = serde_json::json!(110);
            Ok(o)
        })
        .await?;
    match store
        .update(ctx, Some(namespace), "bolts", UpdateOptions::expecting(&stale_rv), |mut o| {
            o.spec["quantity"] = serde_json::json!(0);
            Ok(o)
        })
        .await
    {
        Err(e) if e.is_conflict() => report.conflicts.push(e.to_string()),
        Err(e) => return Err(e.into()),
        Ok(_) => anyhow::bail!("stale update of bolts was accepted"),
    }

    let mut opts = ListOptions::default().in_namespace(namespace).with_limit(page_size);
    loop {
        let page = store.list(ctx, opts.clone()).await?;
        report.pages.push(page.items.iter().map(|o| o.name().to_string()).collect());
        match page.continue_token() {
            Some(token) => opts = opts.with_continue(token),
            None => break,
        }
    }

    let aisle = ListOptions::default().in_namespace(namespace).with_fields("spec.location=aisle-1");
    report.in_aisle = store.list(ctx, aisle).await?.items.iter().map(|o| o.name().to_string()).collect();

    let base = format!("/apis/{}/v1/namespaces/{}", kind.group, namespace);
    report.summary = get_json(&runner, ctx, &format!("{}/items/summary", base)).await?;
    report.item_summary = get_json(&runner, ctx, &format!("{}/items/bolts/summary", base)).await?;
    report.stats = get_json(&runner, ctx, &format!("{}/stats", base)).await?;

    app_ctx.cancel();
    run_handle.await??;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_manifest_is_valid() {
        let data = inventory_manifest().unwrap();
        assert!(data.validate().is_ok());
        let kind = item_kind(&data).unwrap();
        assert_eq!(kind.plural, "items");
        assert!(kind.namespaced());
    }

    #[tokio::test]
    async fn demo_runs_end_to_end() {
        let ctx = RequestContext::new();
        let report = run(&ctx, RunnerOptions::default(), "default", 2).await.unwrap();
        assert_eq!(report.created.len(), 4);
        assert_eq!(report.rejected.len(), 1);
        assert!(report.rejected[0].contains("negative"));
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.pages, vec![vec!["bolts", "gears"], vec!["nuts", "washers"]]);
        assert_eq!(report.in_aisle, vec!["bolts", "nuts"]);
        assert!(report.metrics.is_empty());
        assert_eq!(report.summary["rows"].as_array().unwrap().len(), 4);
        assert_eq!(report.item_summary["Quantity"], "110");
        assert_eq!(report.item_summary["SKU"], "B-100");
        assert_eq!(report.stats["items"], 4);
        assert_eq!(report.stats["totalQuantity"], 157);
    }
}
