//! Job module discovery.
//!
//! Jobs live under `src/jobs`: either a `job.ts` inside a job directory
//! or a `<name>.job.ts` file. The display name is the jobs-relative path
//! with the job suffix stripped; it labels every scheduler log line.

use std::path::Path;

use peaque_fs::FileSystem;

use crate::BuildResult;

/// One discovered job module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobModule {
    /// Project-relative module path.
    pub module_path: String,
    /// `src/jobs`-relative name with `/job.ts` or `.job.ts` stripped.
    pub display_name: String,
}

/// Discover every job module under `jobs_dir`, sorted by path.
pub fn discover_jobs(fs: &dyn FileSystem, jobs_dir: &Path) -> BuildResult<Vec<JobModule>> {
    let base = peaque_fs::normalize_path(jobs_dir);
    let mut out = Vec::new();
    for file in peaque_fs::walk_files(fs, jobs_dir)? {
        let full = peaque_fs::normalize_path(&file);
        let Some(rel) = full.strip_prefix(&base).map(|r| r.trim_start_matches('/')) else {
            continue;
        };
        let display_name = if let Some(stripped) = rel.strip_suffix("/job.ts") {
            stripped
        } else if rel == "job.ts" {
            "job"
        } else if let Some(stripped) = rel.strip_suffix(".job.ts") {
            stripped
        } else {
            continue;
        };
        out.push(JobModule {
            module_path: full.clone(),
            display_name: display_name.to_string(),
        });
    }
    Ok(out)
}
