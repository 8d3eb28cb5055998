//! File watching and HMR policy.
//!
//! Structural events (create/delete) under `src/pages` rebuild the page
//! router; content updates to components refresh just that module in the
//! browser. `src/api` rebuilds silently and `src/jobs` reloads the job
//! scheduler.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{CliError, Result};

/// One debounced change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(PathBuf),
    Updated(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Created(p) | FileChange::Updated(p) | FileChange::Removed(p) => p,
        }
    }

    fn is_structural(&self) -> bool {
        matches!(self, FileChange::Created(_) | FileChange::Removed(_))
    }
}

/// What the dev server does about one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeAction {
    /// Rebuild the page router and tell clients to re-import `/peaque.js`.
    RebuildPageRouter,
    /// Broadcast a component-level refresh for this module path
    /// (project-relative, extension stripped).
    ComponentRefresh(String),
    /// Rebuild the API router; no broadcast.
    RebuildApiRouter,
    /// Reload job schedules.
    ReloadJobs,
    /// Nothing to do.
    Ignore,
}

/// Apply the watcher policy to one change.
pub fn classify_change(project_root: &Path, change: &FileChange) -> ChangeAction {
    let root = peaque_fs::normalize_path(project_root);
    let path = peaque_fs::normalize_path(change.path());
    let Some(rel) = path.strip_prefix(&root).map(|r| r.trim_start_matches('/')) else {
        return ChangeAction::Ignore;
    };

    if rel.starts_with("src/pages/") || rel == "src/pages" {
        if change.is_structural() {
            return ChangeAction::RebuildPageRouter;
        }
        if rel.ends_with(".tsx") {
            return ChangeAction::ComponentRefresh(rel.trim_end_matches(".tsx").to_string());
        }
        return ChangeAction::Ignore;
    }
    if rel.starts_with("src/api/") || rel == "src/api" {
        return ChangeAction::RebuildApiRouter;
    }
    if rel.starts_with("src/jobs/") || rel == "src/jobs" {
        return ChangeAction::ReloadJobs;
    }
    if rel.starts_with("src/") && rel.ends_with(".tsx") && !change.is_structural() {
        return ChangeAction::ComponentRefresh(rel.trim_end_matches(".tsx").to_string());
    }
    ChangeAction::Ignore
}

/// Debounced recursive watcher over `src/`.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Watch `<project_root>/src`, delivering debounced changes on the
    /// returned channel.
    pub fn new(
        project_root: PathBuf,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        let src = project_root.join("src");
        if !src.exists() {
            return Err(CliError::FileNotFound(src));
        }

        let (tx, rx) = mpsc::channel(256);
        let debounce = Duration::from_millis(debounce_ms);
        let mut last_event: Option<(PathBuf, Instant)> = None;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            for path in &event.paths {
                if is_ignored(path) {
                    continue;
                }
                let now = Instant::now();
                if let Some((last_path, last_time)) = &last_event {
                    if last_path == path && now.duration_since(*last_time) < debounce {
                        continue;
                    }
                }
                last_event = Some((path.clone(), now));

                let change = match event.kind {
                    notify::EventKind::Create(_) => FileChange::Created(path.clone()),
                    notify::EventKind::Modify(_) => FileChange::Updated(path.clone()),
                    notify::EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };
                let _ = tx.blocking_send(change);
            }
        })
        .map_err(CliError::Watch)?;

        watcher.watch(&src, RecursiveMode::Recursive).map_err(CliError::Watch)?;

        Ok((Self { _watcher: watcher, root: project_root }, rx))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_ignored(path: &Path) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name == "node_modules" || (name.starts_with('.') && name != "." && name != "..")
    })
}
