//! kapp core types: resources, errors, label and field selectors and list
//! pagination.
//!
//! Everything here is transport- and storage-agnostic; the store, route and
//! admission crates build on these types.

#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod fields;
pub mod pagination;
pub mod resource;
pub mod selector;
pub mod summary;

pub use context::RequestContext;
pub use error::{status_body, KappError, KappResult};
pub use fields::{selectable_field, FieldRequirement, FieldSelector};
pub use pagination::ContinueToken;
pub use resource::{default_plural, Resource, ResourceKind, ResourceList, Scope};
pub use selector::{LabelSelector, Requirement};
pub use summary::{ColumnView, FieldSummary, Summarizable, SummaryColumn};

/// Namespace used when a namespaced request does not carry one.
pub const DEFAULT_NAMESPACE: &str = "default";

pub mod prelude {
    pub use super::{
        ContinueToken, FieldSelector, KappError, KappResult, LabelSelector, RequestContext, Resource, ResourceKind,
        ResourceList, Scope, Summarizable, DEFAULT_NAMESPACE,
    };
}
