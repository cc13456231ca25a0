use std::sync::{Arc, Mutex};

use kapp_core::ResourceKind;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{ResourceStore, StoreConfig};

/// Owns one [`ResourceStore`] per kind.
///
/// Stores are keyed by `group/Kind`, so every served version of a kind reads
/// and writes the same objects. The first registration fixes the store's
/// storage version; later lookups through another version get the same store.
/// Objects that carry their own type meta keep it.
pub struct StoreRegistry {
    config: StoreConfig,
    stores: Mutex<FxHashMap<String, Arc<ResourceStore>>>,
}

impl StoreRegistry {
    pub fn new(config: StoreConfig) -> Self {
        Self { config, stores: Mutex::new(FxHashMap::default()) }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store for `kind`, created on first use. Concurrent first calls observe
    /// the same instance.
    pub fn store_for(&self, kind: &ResourceKind) -> Arc<ResourceStore> {
        self.register(kind, &[])
    }

    /// Like [`store_for`](Self::store_for), with the selectable fields used
    /// when the store is created. An existing store is returned unchanged.
    pub fn register(&self, kind: &ResourceKind, selectable_fields: &[String]) -> Arc<ResourceStore> {
        let key = registry_key(kind);
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(s) = stores.get(&key) {
            return Arc::clone(s);
        }
        debug!(kind = %kind, fields = selectable_fields.len(), "store: registered");
        let store = Arc::new(
            ResourceStore::new(kind.clone(), self.config.clone()).with_selectable_fields(selectable_fields),
        );
        stores.insert(key, Arc::clone(&store));
        store
    }

    /// Already-registered store for `kind`, if any.
    pub fn get(&self, kind: &ResourceKind) -> Option<Arc<ResourceStore>> {
        let stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        stores.get(&registry_key(kind)).cloned()
    }

    pub fn len(&self) -> usize {
        self.stores.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

fn registry_key(kind: &ResourceKind) -> String {
    format!("{}/{}", kind.group, kind.kind)
}
