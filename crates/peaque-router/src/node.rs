//! The route tree node.

use rustc_hash::FxHashMap;

use crate::config::RouteRole;

/// One level of the route tree, keyed on a single path segment.
///
/// Invariants maintained by the builder:
/// - at most one `param_child` and one `wildcard_child`;
/// - a wildcard child has no children of its own;
/// - `accept` is true iff `names` holds at least one terminal role;
/// - `stacks` are parent-flattened, so consumers never walk ancestors.
#[derive(Debug, Clone, Default)]
pub struct RouteNode {
    pub static_children: FxHashMap<String, RouteNode>,
    pub param_child: Option<Box<RouteNode>>,
    pub wildcard_child: Option<Box<RouteNode>>,
    /// Parameter name carried by a `[name]` or `[...name]` node.
    pub param_name: Option<String>,
    /// True for `(group)` nodes that do not contribute a URL segment.
    pub exclude_from_path: bool,
    /// True iff a terminal file is attached here.
    pub accept: bool,
    /// Terminal role → file reference (or component identifier).
    pub names: FxHashMap<RouteRole, String>,
    /// Stacked role → file references in parent-to-child order.
    pub stacks: FxHashMap<RouteRole, Vec<String>>,
}

impl RouteNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Static children in sorted-key order, for deterministic traversal.
    pub fn static_children_sorted(&self) -> Vec<(&String, &RouteNode)> {
        let mut children: Vec<_> = self.static_children.iter().collect();
        children.sort_by(|a, b| a.0.cmp(b.0));
        children
    }

    /// Visit every node in the tree, depth first, deterministic order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a RouteNode)) {
        f(self);
        for (_, child) in self.static_children_sorted() {
            child.visit(f);
        }
        if let Some(child) = &self.param_child {
            child.visit(f);
        }
        if let Some(child) = &self.wildcard_child {
            child.visit(f);
        }
    }

    /// Mutable variant of [`RouteNode::visit`].
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut RouteNode)) {
        f(self);
        let mut keys: Vec<String> = self.static_children.keys().cloned().collect();
        keys.sort();
        for key in keys {
            if let Some(child) = self.static_children.get_mut(&key) {
                child.visit_mut(f);
            }
        }
        if let Some(child) = &mut self.param_child {
            child.visit_mut(f);
        }
        if let Some(child) = &mut self.wildcard_child {
            child.visit_mut(f);
        }
    }

    /// Every path template reachable from this node. The root yields `/`
    /// only when it accepts.
    pub fn patterns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_patterns("", &mut out);
        out
    }

    fn collect_patterns(&self, prefix: &str, out: &mut Vec<String>) {
        if self.accept {
            out.push(if prefix.is_empty() { "/".to_string() } else { prefix.to_string() });
        }
        for (segment, child) in self.static_children_sorted() {
            let next = if child.exclude_from_path {
                prefix.to_string()
            } else {
                format!("{prefix}/{segment}")
            };
            child.collect_patterns(&next, out);
        }
        if let Some(child) = &self.param_child {
            let name = child.param_name.as_deref().unwrap_or("param");
            child.collect_patterns(&format!("{prefix}/:{name}"), out);
        }
        if let Some(child) = &self.wildcard_child {
            let name = child.param_name.as_deref().unwrap_or("rest");
            child.collect_patterns(&format!("{prefix}/*{name}"), out);
        }
    }
}
