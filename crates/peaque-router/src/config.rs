//! Route-file classification rules.
//!
//! A rule binds an exact file name to a role. Stack roles accumulate down
//! the tree; terminal roles make the node acceptable as a match.

/// Role a classified file plays on its route node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RouteRole {
    /// Terminal: a renderable page component.
    Page,
    /// Terminal: an API route handler module.
    Handler,
    /// Stacked: layout components, outermost first.
    Layout,
    /// Stacked: route guards.
    Guard,
    /// Stacked: head descriptor modules.
    Heads,
    /// Middleware; stacked for API trees, scalar for page trees.
    Middleware,
}

impl RouteRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteRole::Page => "page",
            RouteRole::Handler => "handler",
            RouteRole::Layout => "layout",
            RouteRole::Guard => "guard",
            RouteRole::Heads => "heads",
            RouteRole::Middleware => "middleware",
        }
    }
}

/// One classification rule: exact file name, role, and whether the file
/// joins the inherited stack (as opposed to a scalar name on the node).
#[derive(Debug, Clone)]
pub struct RouteFileRule {
    pub pattern: &'static str,
    pub role: RouteRole,
    pub stack: bool,
    pub accept: bool,
}

impl RouteFileRule {
    const fn terminal(pattern: &'static str, role: RouteRole) -> Self {
        RouteFileRule { pattern, role, stack: false, accept: true }
    }

    const fn stacked(pattern: &'static str, role: RouteRole) -> Self {
        RouteFileRule { pattern, role, stack: true, accept: false }
    }

    const fn scalar(pattern: &'static str, role: RouteRole) -> Self {
        RouteFileRule { pattern, role, stack: false, accept: false }
    }
}

/// Rules for the page tree under `src/pages`.
pub fn page_rules() -> Vec<RouteFileRule> {
    vec![
        RouteFileRule::terminal("page.tsx", RouteRole::Page),
        RouteFileRule::stacked("layout.tsx", RouteRole::Layout),
        RouteFileRule::stacked("guard.ts", RouteRole::Guard),
        RouteFileRule::stacked("head.ts", RouteRole::Heads),
        RouteFileRule::scalar("middleware.ts", RouteRole::Middleware),
    ]
}

/// Rules for the API tree under `src/api`.
pub fn api_rules() -> Vec<RouteFileRule> {
    vec![
        RouteFileRule::terminal("route.ts", RouteRole::Handler),
        RouteFileRule::stacked("middleware.ts", RouteRole::Middleware),
    ]
}
