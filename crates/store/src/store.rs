use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, Time};
use kapp_core::{
    ContinueToken, FieldSelector, KappError, KappResult, LabelSelector, RequestContext, Resource, ResourceKind,
    ResourceList,
};
use metrics::{counter, histogram};
use tokio::sync::{watch, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::StoreConfig;

/// `(namespace, name)`; cluster-scoped kinds use an empty namespace.
type ObjectKey = (String, String);

/// Filters and paging for [`ResourceStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Restrict to one namespace; `None` lists every namespace.
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    /// `metadata.name`, `metadata.namespace` (namespaced kinds) or one of the
    /// store's selectable fields.
    pub field_selector: Option<String>,
    /// Page size. `None` or `0` returns every match.
    pub limit: Option<u64>,
    pub continue_token: Option<String>,
}

impl ListOptions {
    pub fn in_namespace(mut self, ns: &str) -> Self {
        self.namespace = Some(ns.to_string());
        self
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_string());
        self
    }

    pub fn with_fields(mut self, selector: &str) -> Self {
        self.field_selector = Some(selector.to_string());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_continue(mut self, token: &str) -> Self {
        self.continue_token = Some(token.to_string());
        self
    }
}

/// Preconditions for [`ResourceStore::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Version the caller last observed. Empty means the caller expects the
    /// object not to exist yet.
    pub expected_resource_version: String,
    /// Create the object when absent instead of failing with `NotFound`.
    pub create_if_missing: bool,
}

impl UpdateOptions {
    pub fn expecting(rv: &str) -> Self {
        Self { expected_resource_version: rv.to_string(), create_if_missing: false }
    }

    pub fn upsert(mut self) -> Self {
        self.create_if_missing = true;
        self
    }
}

struct StoreState {
    items: BTreeMap<ObjectKey, Resource>,
    rv: u64,
}

impl StoreState {
    fn next_rv(&mut self) -> u64 {
        self.rv += 1;
        self.rv
    }
}

/// In-memory objects of one kind.
///
/// `kind` carries the storage version: objects written without type meta get
/// its `apiVersion`, and lists report it.
///
/// Resource versions are a per-instance counter starting at zero. Nothing is
/// persisted, so a restarted process hands out versions from `1` again and
/// clients must not carry versions across restarts.
pub struct ResourceStore {
    kind: ResourceKind,
    config: StoreConfig,
    selectable_fields: Vec<String>,
    state: RwLock<StoreState>,
    version_tx: watch::Sender<u64>,
}

impl ResourceStore {
    pub fn new(kind: ResourceKind, config: StoreConfig) -> Self {
        let (version_tx, _) = watch::channel(0u64);
        Self {
            kind,
            config,
            selectable_fields: Vec::new(),
            state: RwLock::new(StoreState { items: BTreeMap::new(), rv: 0 }),
            version_tx,
        }
    }

    /// Extra fields usable in field selectors, as simple JSON paths.
    pub fn with_selectable_fields(mut self, fields: &[String]) -> Self {
        self.selectable_fields = fields.iter().map(|f| f.trim_start_matches('.').to_string()).collect();
        self
    }

    pub fn selectable_fields(&self) -> &[String] {
        &self.selectable_fields
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Latest resource version handed out by this store.
    pub fn current_version(&self) -> u64 {
        *self.version_tx.borrow()
    }

    /// Receives the new resource version after every mutation.
    pub fn subscribe_versions(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    pub async fn get(&self, ctx: &RequestContext, namespace: Option<&str>, name: &str) -> KappResult<Resource> {
        let started = Instant::now();
        let res = self.get_inner(ctx, namespace, name).await;
        self.record("get", started, &res);
        res
    }

    pub async fn list(&self, ctx: &RequestContext, opts: ListOptions) -> KappResult<ResourceList> {
        let started = Instant::now();
        let res = self.list_inner(ctx, opts).await;
        self.record("list", started, &res);
        res
    }

    pub async fn create(&self, ctx: &RequestContext, obj: Resource) -> KappResult<Resource> {
        let started = Instant::now();
        let res = self.create_inner(ctx, obj).await;
        self.record("create", started, &res);
        res
    }

    /// Compare-and-swap update. The version check and the write happen under
    /// the same write lock. `update_fn` receives a copy of the stored object
    /// (or a blank object carrying the key when creating); its error is
    /// returned as is and leaves the store untouched.
    pub async fn update<F>(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
        opts: UpdateOptions,
        update_fn: F,
    ) -> KappResult<Resource>
    where
        F: FnOnce(Resource) -> KappResult<Resource> + Send,
    {
        let started = Instant::now();
        let res = self.update_inner(ctx, namespace, name, opts, update_fn).await;
        self.record("update", started, &res);
        res
    }

    /// Remove an object and return its last stored value.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
        expected_resource_version: Option<&str>,
    ) -> KappResult<Resource> {
        let started = Instant::now();
        let res = self.delete_inner(ctx, namespace, name, expected_resource_version).await;
        self.record("delete", started, &res);
        res
    }

    async fn get_inner(&self, ctx: &RequestContext, namespace: Option<&str>, name: &str) -> KappResult<Resource> {
        let key = self.key(namespace, name);
        let st = self.read(ctx, "get").await?;
        st.items.get(&key).cloned().ok_or_else(|| self.not_found(&key))
    }

    async fn list_inner(&self, ctx: &RequestContext, opts: ListOptions) -> KappResult<ResourceList> {
        let selector = match opts.label_selector.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => LabelSelector::parse(s)?,
            None => LabelSelector::everything(),
        };
        let fields = match opts.field_selector.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => FieldSelector::parse(s)?.resolve(&self.kind, &self.selectable_fields)?,
            None => FieldSelector::everything(),
        };
        let limit = opts.limit.unwrap_or(0).min(self.config.max_list_limit);
        let cursor = match opts.continue_token.as_deref().filter(|t| !t.is_empty()) {
            Some(raw) => {
                let tok = ContinueToken::decode(raw)?;
                tok.validate_limit(limit)?;
                tok
            }
            None => ContinueToken::new(0, limit),
        };
        let ns_filter = if self.kind.namespaced() {
            opts.namespace.filter(|ns| !ns.is_empty())
        } else {
            None
        };

        let st = self.read(ctx, "list").await?;
        let matching: Vec<&Resource> = st
            .items
            .iter()
            .filter(|((ns, _), _)| ns_filter.as_deref().map_or(true, |want| want == ns.as_str()))
            .filter(|(_, obj)| selector.matches(obj.labels()))
            .filter(|(_, obj)| fields.matches(obj))
            .map(|(_, obj)| obj)
            .collect();

        let mut types = self.kind.type_meta();
        types.kind.push_str("List");
        let mut list = ResourceList {
            types: Some(types),
            metadata: ListMeta { resource_version: Some(st.rv.to_string()), ..ListMeta::default() },
            items: Vec::new(),
        };
        if limit == 0 {
            list.items = matching.into_iter().cloned().collect();
            return Ok(list);
        }
        let total = matching.len() as u64;
        let start = cursor.offset().min(total);
        let end = start.saturating_add(limit).min(total);
        list.items = matching[start as usize..end as usize].iter().map(|obj| (*obj).clone()).collect();
        if end < total {
            list.metadata.continue_ = Some(cursor.next().encode());
            list.metadata.remaining_item_count = Some((total - end) as i64);
        }
        Ok(list)
    }

    async fn create_inner(&self, ctx: &RequestContext, mut obj: Resource) -> KappResult<Resource> {
        if obj.name().is_empty() {
            return Err(KappError::invalid(format!("{}: metadata.name is required", self.kind)));
        }
        let key = self.key(obj.namespace(), obj.name());
        let mut st = self.write(ctx, "create").await?;
        if st.items.contains_key(&key) {
            return Err(KappError::AlreadyExists(format!("{} {}", self.kind, display_key(&key))));
        }
        let rv = st.next_rv();
        obj.metadata.namespace = non_empty(&key.0);
        obj.metadata.resource_version = Some(rv.to_string());
        obj.metadata.creation_timestamp = Some(Time(Utc::now()));
        obj.metadata.generation = Some(1);
        obj.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        if obj.types.is_none() {
            obj.types = Some(self.kind.type_meta());
        }
        st.items.insert(key, obj.clone());
        self.version_tx.send_replace(rv);
        debug!(kind = %self.kind, name = %obj.name(), rv, "store: create");
        Ok(obj)
    }

    async fn update_inner<F>(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
        opts: UpdateOptions,
        update_fn: F,
    ) -> KappResult<Resource>
    where
        F: FnOnce(Resource) -> KappResult<Resource> + Send,
    {
        if name.is_empty() {
            return Err(KappError::invalid(format!("{}: metadata.name is required", self.kind)));
        }
        let key = self.key(namespace, name);
        let mut st = self.write(ctx, "update").await?;
        let existing = st.items.get(&key).cloned();
        let base = match existing.as_ref() {
            Some(cur) => {
                let stored = cur.resource_version().unwrap_or("");
                if opts.expected_resource_version != stored {
                    return Err(KappError::Conflict(format!(
                        "{} {}: expected resourceVersion {:?}, stored {:?}",
                        self.kind,
                        display_key(&key),
                        opts.expected_resource_version,
                        stored
                    )));
                }
                cur.clone()
            }
            None if !opts.create_if_missing => return Err(self.not_found(&key)),
            None if !opts.expected_resource_version.is_empty() => {
                return Err(KappError::Conflict(format!(
                    "{} {}: expected resourceVersion {:?}, object does not exist",
                    self.kind,
                    display_key(&key),
                    opts.expected_resource_version
                )));
            }
            None => Resource::new(&self.kind, non_empty(&key.0).as_deref(), &key.1),
        };

        let mut next = update_fn(base)?;
        if next.name() != key.1 || self.resolve_namespace(next.namespace()) != key.0 {
            return Err(KappError::invalid(format!(
                "{} {}: name and namespace cannot be changed by an update",
                self.kind,
                display_key(&key)
            )));
        }

        let rv = st.next_rv();
        match existing.as_ref() {
            Some(cur) => {
                next.metadata.uid = cur.metadata.uid.clone();
                next.metadata.creation_timestamp = cur.metadata.creation_timestamp.clone();
                next.metadata.generation = Some(cur.generation().map_or(1, |g| g + 1));
            }
            None => {
                next.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
                next.metadata.creation_timestamp = Some(Time(Utc::now()));
                next.metadata.generation = Some(1);
            }
        }
        next.metadata.namespace = non_empty(&key.0);
        next.metadata.resource_version = Some(rv.to_string());
        if next.types.is_none() {
            next.types = Some(self.kind.type_meta());
        }
        st.items.insert(key, next.clone());
        self.version_tx.send_replace(rv);
        debug!(kind = %self.kind, name = %next.name(), rv, created = existing.is_none(), "store: update");
        Ok(next)
    }

    async fn delete_inner(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
        expected_resource_version: Option<&str>,
    ) -> KappResult<Resource> {
        let key = self.key(namespace, name);
        let mut st = self.write(ctx, "delete").await?;
        let stored = match st.items.get(&key) {
            Some(cur) => cur.resource_version().unwrap_or("").to_string(),
            None => return Err(self.not_found(&key)),
        };
        if let Some(want) = expected_resource_version.filter(|v| !v.is_empty()) {
            if want != stored {
                return Err(KappError::Conflict(format!(
                    "{} {}: expected resourceVersion {:?}, stored {:?}",
                    self.kind,
                    display_key(&key),
                    want,
                    stored
                )));
            }
        }
        let removed = st.items.remove(&key).ok_or_else(|| self.not_found(&key))?;
        let rv = st.next_rv();
        self.version_tx.send_replace(rv);
        debug!(kind = %self.kind, name = %removed.name(), rv, "store: delete");
        Ok(removed)
    }

    async fn read(&self, ctx: &RequestContext, op: &str) -> KappResult<RwLockReadGuard<'_, StoreState>> {
        ctx.check(op)?;
        let guard = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(KappError::Cancelled(format!("{}: request cancelled", op))),
            g = self.state.read() => g,
        };
        ctx.check(op)?;
        Ok(guard)
    }

    async fn write(&self, ctx: &RequestContext, op: &str) -> KappResult<RwLockWriteGuard<'_, StoreState>> {
        ctx.check(op)?;
        let guard = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(KappError::Cancelled(format!("{}: request cancelled", op))),
            g = self.state.write() => g,
        };
        ctx.check(op)?;
        Ok(guard)
    }

    fn resolve_namespace(&self, namespace: Option<&str>) -> String {
        if !self.kind.namespaced() {
            return String::new();
        }
        match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => ns.to_string(),
            None => self.config.default_namespace.clone(),
        }
    }

    fn key(&self, namespace: Option<&str>, name: &str) -> ObjectKey {
        (self.resolve_namespace(namespace), name.to_string())
    }

    fn not_found(&self, key: &ObjectKey) -> KappError {
        KappError::NotFound(format!("{} {}", self.kind, display_key(key)))
    }

    fn record<T>(&self, op: &'static str, started: Instant, res: &KappResult<T>) {
        let outcome = match res {
            Ok(_) => "ok",
            Err(e) => e.reason(),
        };
        counter!("store_ops_total", 1u64, "op" => op, "kind" => self.kind.kind.clone(), "outcome" => outcome);
        histogram!("store_op_ms", started.elapsed().as_secs_f64() * 1000.0, "op" => op);
    }
}

fn display_key(key: &ObjectKey) -> String {
    if key.0.is_empty() {
        key.1.clone()
    } else {
        format!("{}/{}", key.0, key.1)
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
