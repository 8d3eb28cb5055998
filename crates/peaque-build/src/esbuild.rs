//! Process adapter for the esbuild backend.
//!
//! The bundler is an external collaborator; this adapter drives the
//! `esbuild` binary (project-local `node_modules/.bin/esbuild` when
//! present, `esbuild` on PATH otherwise). Tests use
//! [`crate::MemoryBundler`] instead.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::bundler::{BundleOutput, Bundler};
use crate::{BuildError, BuildResult};

/// esbuild-backed [`Bundler`].
pub struct EsbuildBundler {
    minify: bool,
}

impl EsbuildBundler {
    pub fn new(minify: bool) -> Self {
        EsbuildBundler { minify }
    }

    fn binary(project_root: &Path) -> PathBuf {
        let local = project_root.join("node_modules/.bin/esbuild");
        if local.exists() {
            local
        } else {
            PathBuf::from("esbuild")
        }
    }

    fn run(&self, project_root: &Path, args: &[String], stdin: Option<&str>) -> BuildResult<Vec<u8>> {
        let mut command = Command::new(Self::binary(project_root));
        command
            .args(args)
            .current_dir(project_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if stdin.is_some() {
            command.stdin(Stdio::piped());
        }
        debug!(?args, "running esbuild");

        let mut child = command
            .spawn()
            .map_err(|e| BuildError::Bundler(format!("failed to run esbuild: {e}")))?;
        if let Some(source) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| BuildError::Bundler("esbuild stdin unavailable".into()))?;
            pipe.write_all(source.as_bytes())
                .map_err(|e| BuildError::Bundler(format!("esbuild stdin write: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| BuildError::Bundler(format!("esbuild did not finish: {e}")))?;
        if !output.status.success() {
            return Err(BuildError::Bundler(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(output.stdout)
    }

    fn common_flags(&self) -> Vec<String> {
        let mut flags = vec!["--bundle".to_string(), "--format=esm".to_string()];
        if self.minify {
            flags.push("--minify".to_string());
        }
        flags
    }
}

impl Bundler for EsbuildBundler {
    fn bundle(
        &self,
        entry_source: &str,
        project_root: &Path,
        out_dir: &Path,
    ) -> BuildResult<BundleOutput> {
        // The entry imports project files relatively, so it has to live
        // at the project root while esbuild runs.
        let entry_path = project_root.join(".peaque-entry.tsx");
        let meta_path = out_dir.join("meta.json");
        std::fs::write(&entry_path, entry_source)
            .map_err(|e| BuildError::Bundler(format!("failed to write entry: {e}")))?;

        let mut args = self.common_flags();
        args.push("--loader:.tsx=tsx".to_string());
        args.push(format!("--metafile={}", meta_path.display()));
        args.push(entry_path.display().to_string());
        let result = self.run(project_root, &args, None);
        let _ = std::fs::remove_file(&entry_path);
        let code = result?;

        let metafile = read_metafile(&meta_path);
        let server_modules = metafile
            .keys()
            .filter(|module| {
                std::fs::read_to_string(project_root.join(module))
                    .map(|source| peaque_transform::is_server_module(&source))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        Ok(BundleOutput { code, metafile, server_modules })
    }

    fn bundle_dependency(&self, name: &str, project_root: &Path) -> BuildResult<Vec<u8>> {
        // esbuild bundles stdin against the project's node_modules and
        // writes the result to stdout.
        let entry = format!("export * from \"{name}\";\nimport d from \"{name}\";\nexport default d;\n");
        let mut args = self.common_flags();
        args.push("--loader:.js=js".to_string());
        self.run(project_root, &args, Some(&entry))
    }

    fn bundle_css(&self, project_root: &Path) -> BuildResult<Vec<u8>> {
        let stylesheet = project_root.join("src/styles.css");
        if !stylesheet.exists() {
            return Ok(Vec::new());
        }
        let mut args = vec!["--bundle".to_string()];
        if self.minify {
            args.push("--minify".to_string());
        }
        args.push(stylesheet.display().to_string());
        self.run(project_root, &args, None)
    }

    fn transpile(&self, module_path: &str, source: &str) -> BuildResult<String> {
        let loader = if module_path.ends_with(".tsx") {
            "--loader=tsx"
        } else if module_path.ends_with(".jsx") {
            "--loader=jsx"
        } else {
            "--loader=ts"
        };
        let args = vec![loader.to_string(), "--format=esm".to_string()];
        let out = self.run(Path::new("."), &args, Some(source))?;
        String::from_utf8(out).map_err(|_| BuildError::Bundler("non-utf8 esbuild output".into()))
    }

    fn bundle_backend(
        &self,
        entry_source: &str,
        project_root: &Path,
        _out_file: &Path,
    ) -> BuildResult<Vec<u8>> {
        let entry_path = project_root.join(".peaque-backend-entry.ts");
        std::fs::write(&entry_path, entry_source)
            .map_err(|e| BuildError::Bundler(format!("failed to write backend entry: {e}")))?;
        let args = vec![
            "--bundle".to_string(),
            "--platform=node".to_string(),
            "--format=cjs".to_string(),
            entry_path.display().to_string(),
        ];
        let result = self.run(project_root, &args, None);
        let _ = std::fs::remove_file(&entry_path);
        result
    }
}

fn read_metafile(path: &Path) -> FxHashMap<String, u64> {
    let mut out = FxHashMap::default();
    let Ok(text) = std::fs::read_to_string(path) else {
        return out;
    };
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) else {
        return out;
    };
    if let Some(inputs) = parsed.get("inputs").and_then(|v| v.as_object()) {
        for (module, info) in inputs {
            let bytes = info.get("bytes").and_then(|b| b.as_u64()).unwrap_or(0);
            out.insert(module.clone(), bytes);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_prefers_project_local_install() {
        let dir = tempfile::TempDir::new().unwrap();
        let local = dir.path().join("node_modules/.bin/esbuild");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, "#!/bin/sh\n").unwrap();
        assert_eq!(EsbuildBundler::binary(dir.path()), local);

        let empty = tempfile::TempDir::new().unwrap();
        assert_eq!(EsbuildBundler::binary(empty.path()), PathBuf::from("esbuild"));
    }

    #[test]
    fn metafile_parsing_tolerates_absence() {
        assert!(read_metafile(Path::new("/definitely/missing.json")).is_empty());
    }
}
