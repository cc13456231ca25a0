use serde::{Deserialize, Serialize};

use kapp_core::DEFAULT_NAMESPACE;

/// Store tunables shared by every kind in an app group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Namespace assumed when a namespaced call omits one.
    pub default_namespace: String,
    /// Upper bound for `limit` on list calls; larger values are clamped.
    pub max_list_limit: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { default_namespace: DEFAULT_NAMESPACE.to_string(), max_list_limit: 500 }
    }
}

impl StoreConfig {
    /// Read `KAPP_DEFAULT_NAMESPACE` and `KAPP_MAX_LIST_LIMIT`, falling back to defaults.
    pub fn from_env() -> Self {
        let def = Self::default();
        let default_namespace = std::env::var("KAPP_DEFAULT_NAMESPACE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(def.default_namespace);
        let max_list_limit = std::env::var("KAPP_MAX_LIST_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(def.max_list_limit);
        Self { default_namespace, max_list_limit }
    }

    pub fn with_default_namespace(mut self, ns: &str) -> Self {
        self.default_namespace = ns.to_string();
        self
    }

    pub fn with_max_list_limit(mut self, limit: u64) -> Self {
        self.max_list_limit = limit;
        self
    }
}
