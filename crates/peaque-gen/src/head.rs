//! Head descriptor merging and HTML emission.
//!
//! Each route accumulates a stack of head descriptors from the root
//! layout down to the leaf; the merge folds them onto a default
//! descriptor and the emitter renders one `<head>` fragment per distinct
//! stack so identical HTML is produced once.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use peaque_router::{RouteNode, RouteRole};
use peaque_transform::short_hash;

/// `<meta>` item. Identity for merging is the first of `name`,
/// `property`, `httpEquiv` both sides define.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaItem {
    pub name: Option<String>,
    pub property: Option<String>,
    pub http_equiv: Option<String>,
    pub charset: Option<String>,
    pub content: Option<String>,
}

/// `<link>` item. Identity is `(rel, href)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkItem {
    pub rel: String,
    pub href: String,
    /// Extra attributes such as `crossorigin`, sorted for determinism.
    #[serde(flatten)]
    pub attrs: BTreeMap<String, String>,
}

/// `<script>` item. Identity is `src`, when both sides have one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptItem {
    pub src: Option<String>,
    #[serde(rename = "type")]
    pub script_type: Option<String>,
    pub inner_html: Option<String>,
    pub defer: bool,
    pub r#async: bool,
}

/// `<style>` item. Identity is `(type, innerHTML)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleItem {
    #[serde(rename = "type")]
    pub style_type: Option<String>,
    pub inner_html: String,
}

/// A per-route head description, as exported by a `head.ts` module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadDescriptor {
    pub title: Option<String>,
    pub meta: Vec<MetaItem>,
    pub link: Vec<LinkItem>,
    pub script: Vec<ScriptItem>,
    pub style: Vec<StyleItem>,
    /// Free-form HTML fragments appended verbatim.
    pub extra: Vec<String>,
}

impl HeadDescriptor {
    /// The framework defaults every merge starts from.
    pub fn framework_default() -> Self {
        HeadDescriptor {
            title: Some("Peaque App".to_string()),
            meta: vec![
                MetaItem { charset: Some("utf-8".into()), ..Default::default() },
                MetaItem {
                    name: Some("viewport".into()),
                    content: Some("width=device-width, initial-scale=1".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }
}

fn meta_identity(a: &MetaItem, b: &MetaItem) -> bool {
    if let (Some(x), Some(y)) = (&a.name, &b.name) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (&a.property, &b.property) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (&a.http_equiv, &b.http_equiv) {
        return x == y;
    }
    a.charset.is_some() && b.charset.is_some()
}

/// Merge `child` over `parent`. The child wins every identity collision,
/// replacing the parent item at its original position.
pub fn merge_heads(parent: &HeadDescriptor, child: &HeadDescriptor) -> HeadDescriptor {
    let mut out = parent.clone();

    if child.title.is_some() {
        out.title = child.title.clone();
    }

    for item in &child.meta {
        match out.meta.iter_mut().find(|existing| meta_identity(existing, item)) {
            Some(slot) => *slot = item.clone(),
            None => out.meta.push(item.clone()),
        }
    }

    for item in &child.link {
        let identity = |existing: &LinkItem| existing.rel == item.rel && existing.href == item.href;
        match out.link.iter_mut().find(|existing| identity(existing)) {
            Some(slot) => *slot = item.clone(),
            None => out.link.push(item.clone()),
        }
    }

    for item in &child.script {
        let slot = item.src.as_ref().and_then(|src| {
            out.script
                .iter_mut()
                .find(|existing| existing.src.as_ref() == Some(src))
        });
        match slot {
            Some(existing) => *existing = item.clone(),
            None => out.script.push(item.clone()),
        }
    }

    for item in &child.style {
        let identity = |existing: &StyleItem| {
            existing.style_type == item.style_type && existing.inner_html == item.inner_html
        };
        match out.style.iter_mut().find(|existing| identity(existing)) {
            Some(slot) => *slot = item.clone(),
            None => out.style.push(item.clone()),
        }
    }

    out.extra.extend(child.extra.iter().cloned());
    out
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Prefix a root-relative URL with the asset prefix, leaving
/// protocol-relative URLs and already-prefixed values alone.
fn prefix_url(value: &str, asset_prefix: &str) -> String {
    if asset_prefix.is_empty()
        || !value.starts_with('/')
        || value.starts_with("//")
        || value.starts_with(asset_prefix)
    {
        value.to_string()
    } else {
        format!("{asset_prefix}{value}")
    }
}

/// Render the body of a `<head>` element from a merged descriptor.
pub fn render_head(descriptor: &HeadDescriptor, asset_prefix: &str) -> String {
    let mut out = String::new();

    for item in &descriptor.meta {
        out.push_str("<meta");
        for (attr, value) in [
            ("charset", &item.charset),
            ("name", &item.name),
            ("property", &item.property),
            ("http-equiv", &item.http_equiv),
            ("content", &item.content),
        ] {
            if let Some(value) = value {
                out.push_str(&format!(" {attr}=\"{}\"", escape_html(value)));
            }
        }
        out.push_str(">\n");
    }

    if let Some(title) = &descriptor.title {
        out.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    }

    for item in &descriptor.link {
        out.push_str(&format!(
            "<link rel=\"{}\" href=\"{}\"",
            escape_html(&item.rel),
            escape_html(&prefix_url(&item.href, asset_prefix)),
        ));
        for (attr, value) in &item.attrs {
            out.push_str(&format!(" {attr}=\"{}\"", escape_html(value)));
        }
        out.push_str(">\n");
    }

    for item in &descriptor.script {
        out.push_str("<script");
        if let Some(script_type) = &item.script_type {
            out.push_str(&format!(" type=\"{}\"", escape_html(script_type)));
        }
        if let Some(src) = &item.src {
            out.push_str(&format!(" src=\"{}\"", escape_html(&prefix_url(src, asset_prefix))));
        }
        if item.r#async {
            out.push_str(" async");
        }
        if item.defer {
            out.push_str(" defer");
        }
        out.push('>');
        if let Some(inner) = &item.inner_html {
            out.push_str(inner);
        }
        out.push_str("</script>\n");
    }

    for item in &descriptor.style {
        out.push_str("<style");
        if let Some(style_type) = &item.style_type {
            out.push_str(&format!(" type=\"{}\"", escape_html(style_type)));
        }
        out.push('>');
        out.push_str(&item.inner_html);
        out.push_str("</style>\n");
    }

    for fragment in &descriptor.extra {
        out.push_str(fragment);
        out.push('\n');
    }

    out
}

/// Head fragments keyed by stack key, plus the key each route uses.
#[derive(Debug, Default)]
pub struct HeadStacks {
    /// Stack key → rendered `<head>` body.
    pub by_key: BTreeMap<String, String>,
    /// Route pattern → stack key.
    pub route_keys: BTreeMap<String, String>,
}

/// The stable key for one head stack: equal stacks share a key.
pub fn stack_key(stack: &[String]) -> String {
    short_hash(stack.join("\n").as_bytes(), 12)
}

/// Walk every accepting route, merge its head stack over the default
/// descriptor, and render one HTML fragment per distinct stack key.
///
/// `load` resolves one head module reference to its descriptor; a load
/// failure falls back to an empty descriptor (the route keeps its page).
pub fn collect_head_stacks(
    tree: &RouteNode,
    asset_prefix: &str,
    mut load: impl FnMut(&str) -> Option<HeadDescriptor>,
) -> HeadStacks {
    let mut stacks = HeadStacks::default();
    let mut descriptors: FxHashMap<String, HeadDescriptor> = FxHashMap::default();

    let mut routes: Vec<(String, Vec<String>)> = Vec::new();
    collect_routes(tree, "", &mut routes);

    for (pattern, stack) in routes {
        let key = stack_key(&stack);
        if !stacks.by_key.contains_key(&key) {
            let mut merged = HeadDescriptor::framework_default();
            for reference in &stack {
                let descriptor = descriptors
                    .entry(reference.clone())
                    .or_insert_with(|| load(reference).unwrap_or_default());
                merged = merge_heads(&merged, descriptor);
            }
            stacks.by_key.insert(key.clone(), render_head(&merged, asset_prefix));
        }
        stacks.route_keys.insert(pattern, key);
    }
    stacks
}

fn collect_routes(node: &RouteNode, prefix: &str, out: &mut Vec<(String, Vec<String>)>) {
    if node.accept {
        let pattern = if prefix.is_empty() { "/".to_string() } else { prefix.to_string() };
        let stack = node.stacks.get(&RouteRole::Heads).cloned().unwrap_or_default();
        out.push((pattern, stack));
    }
    for (segment, child) in node.static_children_sorted() {
        let next = if child.exclude_from_path {
            prefix.to_string()
        } else {
            format!("{prefix}/{segment}")
        };
        collect_routes(child, &next, out);
    }
    if let Some(child) = &node.param_child {
        let name = child.param_name.as_deref().unwrap_or("param");
        collect_routes(child, &format!("{prefix}/:{name}"), out);
    }
    if let Some(child) = &node.wildcard_child {
        let name = child.param_name.as_deref().unwrap_or("rest");
        collect_routes(child, &format!("{prefix}/*{name}"), out);
    }
}
