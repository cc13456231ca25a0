//! kapp store: per-kind in-memory resource stores with optimistic concurrency.
//!
//! Each [`ResourceStore`] guards its objects and resource-version counter
//! with one reader/writer lock; stores of different kinds never share
//! locks. A [`StoreRegistry`] hands out the single store per kind.

#![forbid(unsafe_code)]

mod config;
mod registry;
mod store;

pub use config::StoreConfig;
pub use registry::StoreRegistry;
pub use store::{ListOptions, ResourceStore, UpdateOptions};
