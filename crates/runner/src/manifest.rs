//! App manifests: which kinds, versions and routes an app serves.

use std::collections::BTreeMap;

use http::Method;
use kapp_admission::AdmissionCapabilities;
use kapp_core::{default_plural, selectable_field, FieldSummary, ResourceKind, Scope, SummaryColumn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Where the manifest data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestLocationType {
    Embedded,
    Filepath,
    Apiserver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLocation {
    #[serde(rename = "type")]
    pub kind: ManifestLocationType,
    /// File path or API server object name; unused for embedded manifests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub location: ManifestLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ManifestData>,
}

impl Manifest {
    pub fn embedded(data: ManifestData) -> Self {
        Self { location: ManifestLocation { kind: ManifestLocationType::Embedded, path: None }, data: Some(data) }
    }

    pub fn on_disk(path: &str) -> Self {
        Self { location: ManifestLocation { kind: ManifestLocationType::Filepath, path: Some(path.to_string()) }, data: None }
    }

    pub fn apiserver(name: &str) -> Self {
        Self { location: ManifestLocation { kind: ManifestLocationType::Apiserver, path: Some(name.to_string()) }, data: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestData {
    pub app_name: String,
    pub group: String,
    #[serde(default)]
    pub versions: Vec<ManifestVersion>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preferred_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVersion {
    pub name: String,
    #[serde(default = "served_by_default")]
    pub served: bool,
    #[serde(default)]
    pub kinds: Vec<ManifestVersionKind>,
    #[serde(default)]
    pub routes: ManifestVersionRoutes,
}

fn served_by_default() -> bool {
    true
}

/// Version-level routes: path → HTTP methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestVersionRoutes {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespaced: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVersionKind {
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plural: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission: Option<AdmissionCapabilities>,
    /// Subresource path → HTTP methods.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_printer_columns: Vec<PrinterColumn>,
    /// JSON paths usable in list field selectors besides `metadata.name`
    /// and `metadata.namespace`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectable_fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: String,
    pub json_path: String,
}

impl ManifestVersionKind {
    pub fn plural(&self) -> String {
        if self.plural.is_empty() {
            default_plural(&self.kind)
        } else {
            self.plural.to_lowercase()
        }
    }

    pub fn resource_kind(&self, group: &str, version: &str) -> ResourceKind {
        ResourceKind::new(group, version, &self.kind).with_plural(&self.plural()).with_scope(self.scope)
    }

    pub fn summary_columns(&self) -> Vec<SummaryColumn> {
        self.additional_printer_columns
            .iter()
            .map(|c| SummaryColumn { name: c.name.clone(), json_path: c.json_path.clone() })
            .collect()
    }
}

/// Parse one route's method list; names are case-insensitive.
pub fn parse_methods(methods: &[String]) -> Result<Vec<Method>, String> {
    methods
        .iter()
        .map(|m| Method::from_bytes(m.trim().to_uppercase().as_bytes()).map_err(|_| format!("invalid HTTP method {:?}", m)))
        .collect()
}

impl ManifestData {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn served_versions(&self) -> impl Iterator<Item = &ManifestVersion> {
        self.versions.iter().filter(|v| v.served)
    }

    /// Every served `(version, kind)` pair as a [`ResourceKind`].
    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.served_versions()
            .flat_map(|v| v.kinds.iter().map(move |k| k.resource_kind(&self.group, &v.name)))
            .collect()
    }

    /// Served versions with the preferred one first. Stores are registered
    /// in this order, so the preferred version becomes the storage version.
    pub fn versions_by_preference(&self) -> Vec<&ManifestVersion> {
        let preferred = self.preferred_version();
        let mut out: Vec<&ManifestVersion> = self.served_versions().collect();
        out.sort_by_key(|v| Some(v.name.as_str()) != preferred);
        out
    }

    /// Explicit preferred version, else the last served one.
    pub fn preferred_version(&self) -> Option<&str> {
        if !self.preferred_version.is_empty() {
            return Some(&self.preferred_version);
        }
        self.served_versions().last().map(|v| v.name.as_str())
    }

    /// Check cross-version consistency. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        struct Seen {
            plural: String,
            scope: Scope,
            version: String,
        }
        let mut problems = Vec::new();
        if self.app_name.trim().is_empty() {
            problems.push("appName is required".to_string());
        }
        if self.group.trim().is_empty() {
            problems.push("group is required".to_string());
        }
        if self.versions.is_empty() {
            problems.push("at least one version is required".to_string());
        }
        if !self.preferred_version.is_empty() && !self.versions.iter().any(|v| v.name == self.preferred_version) {
            problems.push(format!("preferredVersion '{}' is not a declared version", self.preferred_version));
        }

        let mut kinds: FxHashMap<&str, Seen> = FxHashMap::default();
        for version in self.versions.iter() {
            let mut namespaced_plurals = Vec::new();
            let mut cluster_plurals = Vec::new();
            let mut in_version: Vec<&str> = Vec::new();
            for kind in version.kinds.iter() {
                if kind.kind.is_empty() {
                    problems.push(format!("version '{}' has a kind without a name", version.name));
                    continue;
                }
                if in_version.contains(&kind.kind.as_str()) {
                    problems.push(format!("kind '{}' is declared twice in version '{}'", kind.kind, version.name));
                }
                in_version.push(&kind.kind);
                let plural = kind.plural();
                match kind.scope {
                    Scope::Cluster => cluster_plurals.push(plural.clone()),
                    Scope::Namespaced => namespaced_plurals.push(plural.clone()),
                }
                match kinds.get(kind.kind.as_str()) {
                    None => {
                        kinds.insert(&kind.kind, Seen { plural, scope: kind.scope, version: version.name.clone() });
                    }
                    Some(seen) => {
                        if seen.plural != plural {
                            problems.push(format!(
                                "kind '{}' has a different plural in versions '{}' and '{}'",
                                kind.kind, seen.version, version.name
                            ));
                        }
                        if seen.scope != kind.scope {
                            problems.push(format!(
                                "kind '{}' has a different scope in versions '{}' and '{}'",
                                kind.kind, seen.version, version.name
                            ));
                        }
                    }
                }
                if let Err(e) = FieldSummary::new(&kind.summary_columns()) {
                    problems.push(format!("kind '{}' in version '{}': {}", kind.kind, version.name, e));
                }
                for field in kind.selectable_fields.iter() {
                    if let Err(e) = selectable_field(field) {
                        problems.push(format!("kind '{}' in version '{}': {}", kind.kind, version.name, e));
                    }
                }
                for (path, methods) in kind.routes.iter() {
                    if path.trim_matches('/').is_empty() {
                        problems.push(format!("kind '{}' in version '{}' has a route with an empty path", kind.kind, version.name));
                    }
                    check_methods(&mut problems, path, methods);
                }
            }
            for (scope, routes, plurals) in [
                ("namespaced", &version.routes.namespaced, &namespaced_plurals),
                ("cluster-scoped", &version.routes.cluster, &cluster_plurals),
            ] {
                for (path, methods) in routes.iter() {
                    let key = path.trim_matches('/').to_lowercase();
                    if key.is_empty() {
                        problems.push(format!("{} custom route in version '{}' has an empty path", scope, version.name));
                    }
                    let first = key.split('/').next().unwrap_or("");
                    if plurals.iter().any(|p| p == &key || p == first) {
                        problems.push(format!(
                            "{} custom route '{}' conflicts with already-registered kind '{}'",
                            scope, path, first
                        ));
                    }
                    check_methods(&mut problems, path, methods);
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

fn check_methods(problems: &mut Vec<String>, path: &str, methods: &[String]) {
    if methods.is_empty() {
        problems.push(format!("route '{}' declares no methods", path));
    }
    if let Err(e) = parse_methods(methods) {
        problems.push(format!("route '{}': {}", path, e));
    }
}
