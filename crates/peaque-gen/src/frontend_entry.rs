//! Frontend entry generation.
//!
//! The generated module imports every component the route builder
//! discovered and registers the client-side route table with the runtime.
//! The dev server serves it as `/peaque.js`; the production build feeds
//! it to the bundler as the entry point.

use peaque_router::{ComponentImport, RouteNode, RouteRole};

use crate::code_builder::{CodeBuilder, ImportCollection};

/// Generate the frontend entry.
///
/// The `tree` must already have component identifiers assigned;
/// `imports` is the list returned by that step. `resolve` maps an import
/// path to the module specifier to emit (dev uses `/@src/...`, the
/// production build uses project-relative paths).
pub fn generate_frontend_entry(
    tree: &RouteNode,
    imports: &[ComponentImport],
    runtime_module: &str,
    mut resolve: impl FnMut(&str) -> String,
) -> String {
    let mut routes: Vec<RouteEntry> = Vec::new();
    collect(tree, "", &mut routes);
    routes.sort_by(|a, b| a.pattern.cmp(&b.pattern));

    // Only components the route table references; head and middleware
    // modules stay server-side.
    let mut used: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    for route in &routes {
        used.insert(route.page.as_str());
        used.extend(route.layouts.iter().map(String::as_str));
        used.extend(route.guards.iter().map(String::as_str));
    }

    let mut collection = ImportCollection::new();
    collection.named_import(runtime_module, "bootPeaque");
    for import in imports {
        if used.contains(import.identifier.as_str()) {
            collection.default_import(&resolve(&import.import_path), &import.identifier);
        }
    }

    let mut out = CodeBuilder::new();
    collection.emit(&mut out);
    out.blank();
    out.open("const routes = [");
    for route in &routes {
        let layouts = route.layouts.join(", ");
        let guards = route.guards.join(", ");
        out.line(format!(
            "{{ pattern: \"{}\", page: {}, layouts: [{layouts}], guards: [{guards}] }},",
            route.pattern, route.page,
        ));
    }
    out.close("];");
    out.blank();
    out.line("bootPeaque({ routes, target: document.getElementById(\"peaque-root\") });");
    out.finish()
}

struct RouteEntry {
    pattern: String,
    page: String,
    layouts: Vec<String>,
    guards: Vec<String>,
}

fn collect(node: &RouteNode, prefix: &str, out: &mut Vec<RouteEntry>) {
    if node.accept {
        if let Some(page) = node.names.get(&RouteRole::Page) {
            out.push(RouteEntry {
                pattern: if prefix.is_empty() { "/".to_string() } else { prefix.to_string() },
                page: page.clone(),
                layouts: node.stacks.get(&RouteRole::Layout).cloned().unwrap_or_default(),
                guards: node.stacks.get(&RouteRole::Guard).cloned().unwrap_or_default(),
            });
        }
    }
    for (segment, child) in node.static_children_sorted() {
        let next = if child.exclude_from_path {
            prefix.to_string()
        } else {
            format!("{prefix}/{segment}")
        };
        collect(child, &next, out);
    }
    if let Some(child) = &node.param_child {
        let name = child.param_name.as_deref().unwrap_or("param");
        collect(child, &format!("{prefix}/:{name}"), out);
    }
    if let Some(child) = &node.wildcard_child {
        let name = child.param_name.as_deref().unwrap_or("rest");
        collect(child, &format!("{prefix}/*{name}"), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peaque_fs::MemoryFileSystem;
    use peaque_router::{assign_component_identifiers, build_route_tree, page_rules};
    use std::path::Path;

    fn generate() -> String {
        let fs = MemoryFileSystem::with_files([
            ("src/pages/page.tsx", ""),
            ("src/pages/layout.tsx", ""),
            ("src/pages/users/[id]/page.tsx", ""),
            ("src/pages/users/[id]/guard.ts", ""),
        ]);
        let mut tree = build_route_tree(&fs, Path::new("src/pages"), &page_rules()).unwrap();
        let imports = assign_component_identifiers(&mut tree);
        generate_frontend_entry(&tree, &imports, "/peaque-dev.js", |path| {
            format!("/@src/{}", path.trim_end_matches(".tsx").trim_end_matches(".ts"))
        })
    }

    #[test]
    fn imports_every_component_once() {
        let entry = generate();
        assert!(entry.contains("import SrcPagesPage from \"/@src/src/pages/page\";"));
        assert!(entry.contains("import SrcPagesLayout from \"/@src/src/pages/layout\";"));
        assert!(entry.contains("import SrcPagesUsersIdPage from \"/@src/src/pages/users/[id]/page\";"));
        assert_eq!(entry.matches("import SrcPagesLayout ").count(), 1);
    }

    #[test]
    fn route_table_carries_stacks() {
        let entry = generate();
        assert!(entry.contains(
            "{ pattern: \"/\", page: SrcPagesPage, layouts: [SrcPagesLayout], guards: [] },"
        ));
        assert!(entry.contains(
            "{ pattern: \"/users/:id\", page: SrcPagesUsersIdPage, layouts: [SrcPagesLayout], guards: [SrcPagesUsersIdGuard] },"
        ));
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(generate(), generate());
    }

    #[test]
    fn boots_the_runtime() {
        let entry = generate();
        assert!(entry.contains("import { bootPeaque } from \"/peaque-dev.js\";"));
        assert!(entry.trim_end().ends_with(
            "bootPeaque({ routes, target: document.getElementById(\"peaque-root\") });"
        ));
    }
}
