//! kapp runner: app manifests, per-app groups (stores, custom routes and
//! admission) and the [`AppGroupRunner`] lifecycle.

#![forbid(unsafe_code)]

mod app;
mod error;
mod group;
pub mod manifest;
mod runner;

pub use app::{App, AppConfig, AppProvider, BaseConfig, ConfigResolver, EnvConfigResolver, StaticConfigResolver};
pub use error::RunnerError;
pub use group::{AppGroup, AppSlot};
pub use manifest::{
    Manifest, ManifestData, ManifestLocation, ManifestLocationType, ManifestVersion, ManifestVersionKind,
    ManifestVersionRoutes, PrinterColumn,
};
pub use runner::{AppGroupRunner, RunnerOptions};
