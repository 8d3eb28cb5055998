//! The production build pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use peaque_fs::FileSystem;
use peaque_gen::{
    generate_backend_entry, generate_frontend_entry, render_document, ApiRoute, BackendEntrySpec,
    HeadDescriptor, JobEntry, PageRoute, RpcModule,
};
use peaque_router::{
    api_rules, assign_component_identifiers, build_route_tree, page_rules, RouteNode, RouteRole,
};
use peaque_transform::{scan_exports, ExportKind};

use crate::assets::{collect_public_paths, rewrite_asset_references};
use crate::bundler::Bundler;
use crate::compress::precompress_dir;
use crate::hash::build_hash;
use crate::jobs::discover_jobs;
use crate::BuildResult;

const HTTP_METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"];

/// Options for one build run.
pub struct BuildOptions {
    pub project_root: PathBuf,
    pub out_dir: PathBuf,
    /// Skip the public-asset reference rewrite (step 3/4).
    pub rewrite_assets: bool,
    /// Emit `backend.cjs`/`main.cjs`; off for serverless-frontend builds.
    pub emit_backend: bool,
    /// Resolve a head module reference to its descriptor. Load failures
    /// degrade to the default head.
    pub head_loader: Box<dyn FnMut(&str) -> Option<HeadDescriptor> + Send>,
}

impl BuildOptions {
    pub fn new(project_root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        BuildOptions {
            project_root: project_root.into(),
            out_dir: out_dir.into(),
            rewrite_assets: true,
            emit_backend: true,
            head_loader: Box::new(|_| None),
        }
    }

    pub fn with_head_loader(
        mut self,
        loader: impl FnMut(&str) -> Option<HeadDescriptor> + Send + 'static,
    ) -> Self {
        self.head_loader = Box::new(loader);
        self
    }
}

/// Everything a finished build produced.
#[derive(Debug)]
pub struct BuildArtifact {
    pub asset_dir: PathBuf,
    /// Public URL prefix, `/assets-<hash>`.
    pub asset_prefix: String,
    pub bundle_js: Vec<u8>,
    pub bundle_css: Vec<u8>,
    /// Stack key → rendered HTML document.
    pub head_stacks: BTreeMap<String, String>,
    pub backend_entry_source: String,
    /// Bundler metafile for `--analyze`: module path → input bytes.
    pub metafile: Vec<(String, u64)>,
}

/// Orchestrates components A–G offline.
pub struct ProductionBuilder {
    fs: Arc<dyn FileSystem>,
    bundler: Arc<dyn Bundler>,
}

impl ProductionBuilder {
    pub fn new(fs: Arc<dyn FileSystem>, bundler: Arc<dyn Bundler>) -> Self {
        ProductionBuilder { fs, bundler }
    }

    pub fn build(&self, mut options: BuildOptions) -> BuildResult<BuildArtifact> {
        let fs = self.fs.as_ref();
        let root = options.project_root.clone();
        let pages_dir = root.join("src/pages");
        let api_dir = root.join("src/api");
        let public_dir = root.join("src/public");

        // 1. Page tree and frontend entry.
        let mut page_tree = build_route_tree(fs, &pages_dir, &page_rules())?;
        let page_routes_with_stacks = collect_page_routes(&page_tree);
        let imports = assign_component_identifiers(&mut page_tree);
        let entry_source =
            generate_frontend_entry(&page_tree, &imports, "peaque/runtime", |path| {
                format!("./{}", project_relative(&root, path))
            });

        let hash = build_hash(&entry_source);
        let asset_prefix = format!("/assets-{hash}");
        let asset_dir = options.out_dir.join(format!("assets-{hash}"));
        fs.mkdir_all(&asset_dir)?;
        info!(%hash, "building into {}", asset_dir.display());

        // 2. Frontend bundle.
        let bundle = self.bundler.bundle(&entry_source, &root, &asset_dir)?;

        // 3/4. Public-asset reference rewriting in JS and CSS.
        let public_paths = collect_public_paths(fs, &public_dir)?;
        let js_text = String::from_utf8_lossy(&bundle.code).into_owned();
        let bundle_js = if options.rewrite_assets {
            rewrite_asset_references(&js_text, &public_paths, &asset_prefix).into_bytes()
        } else {
            bundle.code.clone()
        };
        let css_raw = self.bundler.bundle_css(&root)?;
        let css_text = String::from_utf8_lossy(&css_raw).into_owned();
        let bundle_css = if options.rewrite_assets {
            rewrite_asset_references(&css_text, &public_paths, &asset_prefix).into_bytes()
        } else {
            css_raw
        };
        fs.write(&asset_dir.join("peaque.js"), &bundle_js)?;
        fs.write(&asset_dir.join("peaque.css"), &bundle_css)?;

        // 5. Copy the public folder into the asset directory.
        if fs.is_dir(&public_dir) {
            fs.copy_recursive(&public_dir, &asset_dir)?;
        }

        // 6. Pre-compress everything under the asset directory.
        let compressed = precompress_dir(fs, &asset_dir)?;
        info!(compressed, "pre-compressed asset variants");

        // 7. API tree.
        let api_tree = build_route_tree(fs, &api_dir, &api_rules())?;
        let api_routes = self.collect_api_routes(&api_tree, &root)?;

        // 8. Head stacks: one document per distinct stack key.
        let head_stacks = peaque_gen::collect_head_stacks(&page_tree_with_paths(fs, &pages_dir)?,
            &asset_prefix,
            |reference| (options.head_loader)(reference),
        );
        let mut documents = BTreeMap::new();
        for (key, head_body) in &head_stacks.by_key {
            documents.insert(
                key.clone(),
                render_document(
                    head_body,
                    &format!("{asset_prefix}/peaque.js"),
                    &format!("{asset_prefix}/peaque.css"),
                ),
            );
        }

        // 9. Backend entry.
        let rpc_modules = self.collect_rpc_modules(&bundle.server_modules, &root);
        let jobs = discover_jobs(fs, &root.join("src/jobs"))?
            .into_iter()
            .map(|job| JobEntry { module_path: job.module_path, display_name: job.display_name })
            .collect();
        // Compressed variants are negotiated at serve time, not
        // registered as routes of their own.
        let asset_files = peaque_fs::walk_files(fs, &asset_dir)?
            .iter()
            .map(|p| {
                peaque_fs::normalize_path(p)
                    .trim_start_matches(&peaque_fs::normalize_path(&asset_dir))
                    .trim_start_matches('/')
                    .to_string()
            })
            .filter(|p| !p.ends_with(".gz") && !p.ends_with(".br"))
            .collect();
        let spec = BackendEntrySpec {
            api_routes,
            rpc_modules,
            pages: page_routes_with_stacks
                .iter()
                .map(|(pattern, _)| PageRoute {
                    pattern: pattern.clone(),
                    stack_key: head_stacks.route_keys.get(pattern).cloned().unwrap_or_default(),
                })
                .collect(),
            documents: documents.clone().into_iter().collect(),
            assets: asset_files,
            asset_prefix: asset_prefix.clone(),
            has_startup: fs.is_file(&root.join("src/startup.ts")),
            has_global_middleware: fs.is_file(&root.join("src/middleware.ts")),
            jobs,
            default_port: 3000,
        };
        let backend_entry_source = generate_backend_entry(&spec);

        // 10. Bundle the backend entry plus the thin loader.
        if options.emit_backend {
            let backend_file = options.out_dir.join("backend.cjs");
            let backend_code =
                self.bundler.bundle_backend(&backend_entry_source, &root, &backend_file)?;
            fs.write(&backend_file, &backend_code)?;
            fs.write(&options.out_dir.join("main.cjs"), main_cjs().as_bytes())?;
        }

        let mut metafile: Vec<(String, u64)> = bundle.metafile.into_iter().collect();
        metafile.sort();

        Ok(BuildArtifact {
            asset_dir,
            asset_prefix,
            bundle_js,
            bundle_css,
            head_stacks: documents,
            backend_entry_source,
            metafile,
        })
    }

    fn collect_api_routes(&self, api_tree: &RouteNode, root: &Path) -> BuildResult<Vec<ApiRoute>> {
        let mut out = Vec::new();
        let mut routes: Vec<(String, String, Vec<String>)> = Vec::new();
        collect_api(api_tree, "/api", &mut routes);
        for (pattern, module_path, middleware) in routes {
            let source = match self.fs.read_to_string(&root.join(&module_path)) {
                Ok(source) => source,
                Err(err) => {
                    warn!(%module_path, %err, "api route module unreadable, skipping");
                    continue;
                }
            };
            let methods: Vec<String> = scan_exports(&source)
                .into_iter()
                .filter(|e| e.kind != ExportKind::Star)
                .filter(|e| HTTP_METHODS.contains(&e.name.as_str()))
                .map(|e| e.name)
                .collect();
            if methods.is_empty() {
                warn!(%module_path, "api route exports no HTTP methods");
                continue;
            }
            out.push(ApiRoute {
                pattern,
                module_path: project_relative(root, &module_path),
                methods,
                middleware: middleware
                    .into_iter()
                    .map(|m| project_relative(root, &m))
                    .collect(),
            });
        }
        Ok(out)
    }

    fn collect_rpc_modules(&self, server_modules: &[String], root: &Path) -> Vec<RpcModule> {
        let mut sorted: Vec<&String> = server_modules.iter().collect();
        sorted.sort();
        sorted
            .into_iter()
            .enumerate()
            .map(|(index, module_path)| {
                let functions = self
                    .fs
                    .read_to_string(&root.join(module_path.as_str()))
                    .map(|source| {
                        scan_exports(&source)
                            .into_iter()
                            .filter(|e| e.kind != ExportKind::Star)
                            .map(|e| e.name)
                            .collect()
                    })
                    .unwrap_or_default();
                RpcModule {
                    index,
                    module_path: project_relative(root, module_path),
                    functions,
                }
            })
            .collect()
    }
}

/// `(pattern, page reference)` pairs for every accepting page route.
fn collect_page_routes(tree: &RouteNode) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect_pages(tree, "", &mut out);
    out
}

fn collect_pages(node: &RouteNode, prefix: &str, out: &mut Vec<(String, String)>) {
    if node.accept {
        if let Some(page) = node.names.get(&RouteRole::Page) {
            let pattern = if prefix.is_empty() { "/".to_string() } else { prefix.to_string() };
            out.push((pattern, page.clone()));
        }
    }
    for (segment, child) in node.static_children_sorted() {
        let next = if child.exclude_from_path {
            prefix.to_string()
        } else {
            format!("{prefix}/{segment}")
        };
        collect_pages(child, &next, out);
    }
    if let Some(child) = &node.param_child {
        let name = child.param_name.as_deref().unwrap_or("param");
        collect_pages(child, &format!("{prefix}/:{name}"), out);
    }
    if let Some(child) = &node.wildcard_child {
        let name = child.param_name.as_deref().unwrap_or("rest");
        collect_pages(child, &format!("{prefix}/*{name}"), out);
    }
}

fn collect_api(node: &RouteNode, prefix: &str, out: &mut Vec<(String, String, Vec<String>)>) {
    if node.accept {
        if let Some(handler) = node.names.get(&RouteRole::Handler) {
            out.push((
                prefix.to_string(),
                handler.clone(),
                node.stacks.get(&RouteRole::Middleware).cloned().unwrap_or_default(),
            ));
        }
    }
    for (segment, child) in node.static_children_sorted() {
        let next = if child.exclude_from_path {
            prefix.to_string()
        } else {
            format!("{prefix}/{segment}")
        };
        collect_api(child, &next, out);
    }
    if let Some(child) = &node.param_child {
        let name = child.param_name.as_deref().unwrap_or("param");
        collect_api(child, &format!("{prefix}/:{name}"), out);
    }
    if let Some(child) = &node.wildcard_child {
        let name = child.param_name.as_deref().unwrap_or("rest");
        collect_api(child, &format!("{prefix}/*{name}"), out);
    }
}

/// A fresh page tree whose references are still file paths (the main
/// tree's were rewritten to identifiers for the entry generator).
fn page_tree_with_paths(fs: &dyn FileSystem, pages_dir: &Path) -> BuildResult<RouteNode> {
    Ok(build_route_tree(fs, pages_dir, &page_rules())?)
}

fn project_relative(root: &Path, path: &str) -> String {
    let root = peaque_fs::normalize_path(root);
    let path = peaque_fs::normalize_path(Path::new(path));
    path.strip_prefix(&root)
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or(path)
}

/// The thin loader that restores `.env` before the backend starts.
fn main_cjs() -> &'static str {
    "try {\n  require(\"dotenv\").config();\n} catch {}\nrequire(\"./backend.cjs\");\n"
}
