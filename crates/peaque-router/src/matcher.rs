//! Path matching against a route tree.

use rustc_hash::FxHashMap;

use crate::config::RouteRole;
use crate::node::RouteNode;

/// A successful match.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Path template, e.g. `/users/:id` or `/docs/*slug`.
    pub pattern: String,
    /// Parameter values captured during the walk.
    pub params: FxHashMap<String, String>,
    /// Terminal roles as stored on the matched node.
    pub names: FxHashMap<RouteRole, String>,
    /// Parent-flattened stacks as stored on the matched node.
    pub stacks: FxHashMap<RouteRole, Vec<String>>,
}

/// Match a request path against the tree.
///
/// Trailing slashes are normalized off; URL-encoded segments are compared
/// literally (decoding is the caller's responsibility). Tie-break on
/// overlap: static > parameter > wildcard. Group nodes are transparent.
pub fn match_route(tree: &RouteNode, path: &str) -> Option<RouteMatch> {
    let trimmed = path.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    let mut params = FxHashMap::default();
    let (matched, pattern_parts) = descend(tree, &segments, 0, &mut params, &mut Vec::new())?;
    Some(RouteMatch {
        pattern: if pattern_parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", pattern_parts.join("/"))
        },
        params,
        names: matched.names.clone(),
        stacks: matched.stacks.clone(),
    })
}

/// Walk the tree. Returns the accepted node plus the pattern segments that
/// led there. `params` is threaded through and rolled back on backtrack.
fn descend<'t>(
    node: &'t RouteNode,
    segments: &[&str],
    index: usize,
    params: &mut FxHashMap<String, String>,
    pattern: &mut Vec<String>,
) -> Option<(&'t RouteNode, Vec<String>)> {
    if index == segments.len() {
        if node.accept {
            return Some((node, pattern.clone()));
        }
        // A group child may still accept without consuming a segment.
        for (_, child) in node.static_children_sorted() {
            if child.exclude_from_path {
                if let Some(found) = descend(child, segments, index, params, pattern) {
                    return Some(found);
                }
            }
        }
        return None;
    }

    let segment = segments[index];

    // 1. Exact static child.
    if let Some(child) = node.static_children.get(segment) {
        if !child.exclude_from_path {
            pattern.push(segment.to_string());
            if let Some(found) = descend(child, segments, index + 1, params, pattern) {
                return Some(found);
            }
            pattern.pop();
        }
    }

    // 2. Transparent group children, tried in sorted order.
    for (_, child) in node.static_children_sorted() {
        if child.exclude_from_path {
            if let Some(found) = descend(child, segments, index, params, pattern) {
                return Some(found);
            }
        }
    }

    // 3. Parameter child consumes one segment.
    if let Some(child) = &node.param_child {
        let name = child.param_name.clone().unwrap_or_else(|| "param".to_string());
        let previous = params.insert(name.clone(), segment.to_string());
        pattern.push(format!(":{name}"));
        if let Some(found) = descend(child, segments, index + 1, params, pattern) {
            return Some(found);
        }
        pattern.pop();
        match previous {
            Some(v) => {
                params.insert(name, v);
            }
            None => {
                params.remove(&name);
            }
        }
    }

    // 4. Wildcard consumes the remaining segments into one parameter.
    if let Some(child) = &node.wildcard_child {
        if child.accept {
            let name = child.param_name.clone().unwrap_or_else(|| "rest".to_string());
            params.insert(name.clone(), segments[index..].join("/"));
            pattern.push(format!("*{name}"));
            let found = (child.as_ref(), pattern.clone());
            pattern.pop();
            return Some(found);
        }
    }

    None
}
