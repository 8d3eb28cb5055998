//! The `build` command.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use peaque_build::{BuildOptions, EsbuildBundler, ProductionBuilder};
use peaque_fs::{FileSystem, RealFileSystem};
use peaque_gen::HeadDescriptor;
use peaque_transform::{wire, WireValue};

use crate::cli::BuildArgs;
use crate::error::{CliError, Result};
use crate::runtime::{ModuleRuntime, NodeRuntime};
use crate::{env, ui};

pub async fn execute(args: BuildArgs) -> Result<()> {
    let base = args
        .base
        .canonicalize()
        .map_err(|_| CliError::FileNotFound(args.base.clone()))?;
    let out_dir = args.output.clone().unwrap_or_else(|| base.join("dist"));
    env::load_env(&base, false);

    let started = std::time::Instant::now();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());
    let bundler = Arc::new(EsbuildBundler::new(!args.no_minify));
    if args.no_react_compiler {
        ui::info("react compiler pass disabled");
    }

    // Head descriptors come from evaluating each head.ts module; without
    // a module runtime every route gets the default head.
    let heads = load_head_descriptors(fs.as_ref(), &base).await;

    let builder = ProductionBuilder::new(Arc::clone(&fs), bundler);
    let mut options = BuildOptions::new(&base, &out_dir).with_head_loader(move |reference| {
        heads.iter().find(|(path, _)| path == reference).map(|(_, d)| d.clone())
    });
    options.rewrite_assets = !args.no_asset_rewrite;
    options.emit_backend = !args.serverless_frontend;

    let artifact = builder.build(options)?;

    if args.analyze {
        print_analysis(&artifact.metafile);
    }

    let elapsed = started.elapsed().as_millis() as u64;
    ui::success(&format!(
        "built {} ({} documents, {} of js) in {}",
        artifact.asset_dir.display(),
        artifact.head_stacks.len(),
        ui::format_size(artifact.bundle_js.len() as u64),
        ui::format_duration(elapsed),
    ));
    Ok(())
}

/// Evaluate every `head.ts` under `src/pages` through the node sidecar.
/// Failures degrade to the framework default head.
async fn load_head_descriptors(
    fs: &dyn FileSystem,
    base: &Path,
) -> Vec<(String, HeadDescriptor)> {
    let mut head_files = Vec::new();
    if let Ok(files) = peaque_fs::walk_files(fs, &base.join("src/pages")) {
        for file in files {
            if file.file_name().is_some_and(|name| name == "head.ts") {
                head_files.push(file);
            }
        }
    }
    if head_files.is_empty() {
        return Vec::new();
    }

    let node = match NodeRuntime::spawn(base) {
        Ok(node) => node,
        Err(err) => {
            warn!(%err, "module runtime unavailable, using default heads");
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for file in head_files {
        let full = peaque_fs::normalize_path(&file);
        let rel = full
            .strip_prefix(&peaque_fs::normalize_path(base))
            .map(|r| r.trim_start_matches('/').to_string())
            .unwrap_or(full.clone());
        let descriptor = match node.load(&rel).await {
            Ok(module) => match module.data_export("default").await {
                Some(value) => decode_head(&value),
                None => None,
            },
            Err(err) => {
                warn!(head = %rel, %err, "head module failed to load");
                None
            }
        };
        if let Some(descriptor) = descriptor {
            // The builder looks heads up by the tree's file reference,
            // which is the normalized full path.
            out.push((full, descriptor));
        }
    }
    out
}

fn decode_head(value: &WireValue) -> Option<HeadDescriptor> {
    serde_json::from_value(wire::to_plain_json(value)).ok()
}

fn print_analysis(metafile: &[(String, u64)]) {
    let mut rows: Vec<&(String, u64)> = metafile.iter().collect();
    rows.sort_by_key(|(_, bytes)| std::cmp::Reverse(*bytes));
    let total: u64 = rows.iter().map(|(_, bytes)| bytes).sum();
    println!("bundle inputs ({} total):", ui::format_size(total));
    for (module, bytes) in rows {
        println!("  {:>10}  {module}", ui::format_size(*bytes));
    }
}
