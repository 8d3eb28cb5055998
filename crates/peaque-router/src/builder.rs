//! Route tree construction from a project directory.

use std::path::Path;

use peaque_fs::FileSystem;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::config::{RouteFileRule, RouteRole};
use crate::node::RouteNode;
use crate::RouterResult;

/// A component import derived from a route file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentImport {
    /// Deterministic PascalCase identifier, unique per import path.
    pub identifier: String,
    /// Project-relative path of the referenced file.
    pub import_path: String,
}

/// Build a route tree rooted at `root`.
///
/// File references stored on nodes are project-relative paths
/// (`<root>/<...>` with `root` expressed relative to the project). A
/// missing root directory yields the empty accept-free node.
pub fn build_route_tree(
    fs: &dyn FileSystem,
    root: &Path,
    rules: &[RouteFileRule],
) -> RouterResult<RouteNode> {
    if !fs.is_dir(root) {
        return Ok(RouteNode::new());
    }
    let mut node = walk(fs, root, rules, false)?;
    propagate_stacks(&mut node, &FxHashMap::default());
    Ok(node)
}

fn walk(
    fs: &dyn FileSystem,
    dir: &Path,
    rules: &[RouteFileRule],
    in_wildcard: bool,
) -> RouterResult<RouteNode> {
    let mut node = RouteNode::new();
    for entry in fs.list_dir(dir)? {
        let child_path = dir.join(&entry.name);
        if entry.is_dir {
            if in_wildcard {
                // A wildcard node consumes all remaining segments, so
                // nothing below it can ever match.
                warn!(dir = %child_path.display(), "ignoring directory inside a [...wildcard] route");
                continue;
            }
            classify_directory(fs, &child_path, &entry.name, rules, &mut node)?;
        } else {
            classify_file(&child_path, &entry.name, rules, &mut node);
        }
    }
    Ok(node)
}

fn classify_directory(
    fs: &dyn FileSystem,
    path: &Path,
    name: &str,
    rules: &[RouteFileRule],
    parent: &mut RouteNode,
) -> RouterResult<()> {
    if let Some(param) = name.strip_prefix("[...").and_then(|n| n.strip_suffix(']')) {
        let mut child = walk(fs, path, rules, true)?;
        child.param_name = Some(param.to_string());
        if parent.wildcard_child.is_some() {
            warn!(dir = %path.display(), "duplicate [...wildcard] directory ignored");
            return Ok(());
        }
        parent.wildcard_child = Some(Box::new(child));
        return Ok(());
    }
    if let Some(param) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
        let mut child = walk(fs, path, rules, false)?;
        child.param_name = Some(param.to_string());
        if parent.param_child.is_some() {
            warn!(dir = %path.display(), "duplicate [param] directory ignored");
            return Ok(());
        }
        parent.param_child = Some(Box::new(child));
        return Ok(());
    }
    let mut child = walk(fs, path, rules, false)?;
    if name.starts_with('(') && name.ends_with(')') {
        child.exclude_from_path = true;
    }
    parent.static_children.insert(name.to_string(), child);
    Ok(())
}

fn classify_file(path: &Path, name: &str, rules: &[RouteFileRule], node: &mut RouteNode) {
    for rule in rules {
        if rule.pattern != name {
            continue;
        }
        let reference = peaque_fs::normalize_path(path);
        if rule.stack {
            node.stacks.entry(rule.role).or_default().push(reference);
        } else {
            node.names.insert(rule.role, reference);
        }
        if rule.accept {
            node.accept = true;
        }
        return;
    }
    // Files matching no rule are ignored.
}

/// Child stacks become `parent_stacks ++ child_stacks`; scalar names do
/// not inherit.
fn propagate_stacks(node: &mut RouteNode, parent: &FxHashMap<RouteRole, Vec<String>>) {
    for (role, inherited) in parent {
        let own = node.stacks.remove(role).unwrap_or_default();
        let mut merged = inherited.clone();
        merged.extend(own);
        node.stacks.insert(*role, merged);
    }
    let flattened = node.stacks.clone();
    for child in node.static_children.values_mut() {
        propagate_stacks(child, &flattened);
    }
    if let Some(child) = &mut node.param_child {
        propagate_stacks(child, &flattened);
    }
    if let Some(child) = &mut node.wildcard_child {
        propagate_stacks(child, &flattened);
    }
}

/// Rewrite every file reference in `names`/`stacks` to a deterministic
/// PascalCase identifier and return the de-duplicated import list.
pub fn assign_component_identifiers(tree: &mut RouteNode) -> Vec<ComponentImport> {
    let mut by_path: FxHashMap<String, String> = FxHashMap::default();
    let mut imports: Vec<ComponentImport> = Vec::new();

    let mut assign = |path: &mut String| {
        if let Some(identifier) = by_path.get(path.as_str()) {
            *path = identifier.clone();
            return;
        }
        let identifier = pascal_identifier(path);
        by_path.insert(path.clone(), identifier.clone());
        imports.push(ComponentImport { identifier: identifier.clone(), import_path: path.clone() });
        *path = identifier;
    };

    tree.visit_mut(&mut |node| {
        for reference in node.names.values_mut() {
            assign(reference);
        }
        let mut roles: Vec<RouteRole> = node.stacks.keys().copied().collect();
        roles.sort();
        for role in roles {
            if let Some(stack) = node.stacks.get_mut(&role) {
                for reference in stack.iter_mut() {
                    assign(reference);
                }
            }
        }
    });
    imports
}

/// PascalCase a project-relative path: `src/pages/users/[id]/page.tsx`
/// becomes `SrcPagesUsersIdPage`.
fn pascal_identifier(path: &str) -> String {
    let without_ext = path.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(path);
    let mut out = String::new();
    let mut upper_next = true;
    for ch in without_ext.chars() {
        if ch.is_ascii_alphanumeric() {
            if upper_next {
                out.extend(ch.to_uppercase());
            } else {
                out.push(ch);
            }
            upper_next = false;
        } else {
            // Separators: '/', '[', ']', '(', ')', '.', '-', '_', "..."
            upper_next = true;
        }
    }
    out
}
