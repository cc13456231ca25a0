//! kapp routes: custom (non-CRUD) HTTP routes on resource kinds.
//!
//! Paths are parsed into [`RequestInfo`], matched against a
//! [`RouteDispatcher`] per [`CustomRouteIdentifier`] and served through an
//! app-supplied [`RouteHandler`]. [`RouteTable`] is the HTTP-facing entry
//! point.

#![forbid(unsafe_code)]

mod dispatcher;
mod error;
mod identifier;
mod request;
mod table;

pub use dispatcher::{CustomRouteResponse, HandlerFn, Inbound, ResourceCustomRouteRequest, RouteDispatcher, RouteHandler};
pub use error::RouteError;
pub use identifier::{k8s_verb, prefix_with_verb, CustomRouteIdentifier};
pub use request::{RequestInfo, RequestPath};
pub use table::RouteTable;
