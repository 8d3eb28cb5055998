//! File-system routing for the Peaque framework.
//!
//! A project directory becomes a radix-style route tree: directories map to
//! path segments (`[param]`, `[...wildcard]` and `(group)` names get special
//! treatment), files attach roles to nodes (a terminal `page`/`handler`, or
//! stacked `layout`/`guard`/`head`/`middleware` entries inherited from every
//! ancestor). Matching walks the tree with a static > parameter > wildcard
//! tie-break.
//!
//! The crate also carries the HTTP seam the rest of the framework routes
//! through: [`PeaqueRequest`], the middleware chain, the cross-origin guard
//! and the request-scoped context storage.

pub mod builder;
pub mod config;
pub mod context;
pub mod guard;
pub mod http;
pub mod matcher;
pub mod middleware;
pub mod node;

pub use builder::{assign_component_identifiers, build_route_tree, ComponentImport};
pub use config::{api_rules, page_rules, RouteFileRule, RouteRole};
pub use guard::{check_same_origin, GuardConfig, GuardDecision};
pub use http::{HttpMethod, PeaqueRequest, ResponseState};
pub use matcher::{match_route, RouteMatch};
pub use middleware::{Handler, Middleware, Next};
pub use node::RouteNode;

/// Errors produced while building a route tree.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("failed to read route directory: {0}")]
    Fs(#[from] peaque_fs::FsError),
}

pub type RouterResult<T> = Result<T, RouterError>;
