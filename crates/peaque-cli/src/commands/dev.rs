//! The `dev` command.
//!
//! Startup order matters and is fixed: run `src/startup.ts`, start the
//! jobs runner, hook the global middleware, build both routers,
//! subscribe the watcher, then bind the listener. The main loop selects
//! over watcher events and ctrl-c.

use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tracing::warn;

use peaque_build::EsbuildBundler;
use peaque_fs::{FileSystem, RealFileSystem};
use peaque_transform::TransformCache;

use crate::cli::DevArgs;
use crate::config::load_aliases;
use crate::cron::{CronScheduler, SidecarCron};
use crate::dev::state::{DevState, SharedDevState};
use crate::dev::watcher::{classify_change, ChangeAction, FileChange, FileWatcher};
use crate::dev::{DevServer, HmrFrame};
use crate::error::{CliError, Result};
use crate::runtime::{ModuleRuntime, NodeRuntime};
use crate::{env, jobs, ui};

pub async fn execute(args: DevArgs) -> Result<()> {
    let base = args
        .base
        .canonicalize()
        .map_err(|_| CliError::FileNotFound(args.base.clone()))?;
    ui::info(&format!("project: {}", base.display()));

    env::load_env(&base, true);

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());
    let bundler = Arc::new(EsbuildBundler::new(false));
    let node = NodeRuntime::spawn(&base)
        .map_err(|e| CliError::Runtime(format!("module runtime unavailable: {e}")))?;
    let runtime: Arc<dyn ModuleRuntime> = Arc::new(Arc::clone(&node));
    let scheduler: Arc<dyn CronScheduler> = Arc::new(SidecarCron::new(Arc::clone(&node)));

    let aliases = load_aliases(fs.as_ref(), &base);
    let cache = TransformCache::load(Arc::clone(&fs), base.join(".peaque/cache"));

    let mut state = DevState::new(
        Arc::clone(&fs),
        bundler,
        Arc::clone(&runtime),
        base.clone(),
        aliases,
        cache,
    );
    state.full_stack_traces = args.full_stack_traces;
    let state: SharedDevState = Arc::new(state);

    // 1. Startup script side-effects; a throw here is fatal.
    if fs.is_file(&base.join("src/startup.ts")) {
        runtime
            .load("src/startup.ts")
            .await
            .map_err(|e| CliError::Runtime(format!("startup script failed: {e}")))?;
    }

    // 2. Jobs.
    jobs::load_jobs(fs.as_ref(), runtime.as_ref(), scheduler.as_ref(), &base).await;

    // 3. Global middleware.
    if fs.is_file(&base.join("src/middleware.ts")) {
        state.set_global_middleware(Some("src/middleware.ts".to_string()));
    }

    // 4. Both routers.
    state.rebuild_page_router()?;
    state.rebuild_api_router()?;

    // 5. Watcher.
    let (watcher, mut changes) = FileWatcher::new(base.clone(), 80)?;
    ui::info(&format!("watching {}", watcher.root().join("src").display()));

    // 6. Listener.
    let server = DevServer::new(Arc::clone(&state), args.port);
    let mut server_handle = tokio::spawn(server.start());

    loop {
        tokio::select! {
            Some(change) = changes.recv() => {
                handle_change(&state, runtime.as_ref(), scheduler.as_ref(), &base, change).await;
            }
            _ = signal::ctrl_c() => {
                ui::info("shutting down");
                break;
            }
            result = &mut server_handle => {
                return match result {
                    Ok(Err(err)) => Err(err),
                    Ok(Ok(())) => Ok(()),
                    Err(join_err) => Err(CliError::Server(join_err.to_string())),
                };
            }
        }
    }

    // Shutdown: watcher drops with this scope, jobs stop, then the
    // listener task is aborted.
    scheduler.stop_all().await;
    server_handle.abort();
    ui::success("dev server stopped");
    Ok(())
}

async fn handle_change(
    state: &SharedDevState,
    runtime: &dyn ModuleRuntime,
    scheduler: &dyn CronScheduler,
    base: &Path,
    change: FileChange,
) {
    let rel = state.project_relative(change.path());
    runtime.invalidate(&rel);
    if matches!(change, FileChange::Removed(_)) {
        state.cache.invalidate(&rel);
    }

    match classify_change(base, &change) {
        ChangeAction::RebuildPageRouter => {
            if let Err(err) = state.rebuild_page_router() {
                warn!(%err, "page router rebuild failed, keeping the last good tree");
                return;
            }
            state.broadcast_hmr(HmrFrame::router_changed());
        }
        ChangeAction::ComponentRefresh(path) => {
            state.broadcast_hmr(HmrFrame::change(path));
        }
        ChangeAction::RebuildApiRouter => {
            if let Err(err) = state.rebuild_api_router() {
                warn!(%err, "api router rebuild failed, keeping the last good tree");
            }
        }
        ChangeAction::ReloadJobs => {
            jobs::reload_jobs(state.fs.as_ref(), runtime, scheduler, base).await;
        }
        ChangeAction::Ignore => {}
    }
}
