//! The dev jobs runner.
//!
//! Discovers job modules under `src/jobs`, reads each module's
//! `schedule` array through the module runtime, and registers one cron
//! subscription per expression. Reload stops everything and runs the
//! discovery again.

use std::path::Path;

use tracing::{info, warn};

use peaque_build::discover_jobs;
use peaque_fs::FileSystem;
use peaque_transform::WireValue;

use crate::cron::{CronScheduler, ScheduledJob};
use crate::runtime::ModuleRuntime;

/// Load every job under `<root>/src/jobs` and register its schedules.
/// Returns the number of subscriptions made. Individual job failures are
/// logged and skipped; the runner itself never fails the server.
pub async fn load_jobs(
    fs: &dyn FileSystem,
    runtime: &dyn ModuleRuntime,
    scheduler: &dyn CronScheduler,
    project_root: &Path,
) -> usize {
    let jobs = match discover_jobs(fs, &project_root.join("src/jobs")) {
        Ok(jobs) => jobs,
        Err(err) => {
            warn!(%err, "job discovery failed");
            return 0;
        }
    };

    let mut registered = 0;
    for job in jobs {
        let module = match runtime.load(&job.module_path).await {
            Ok(module) => module,
            Err(err) => {
                warn!(job = %job.display_name, %err, "job module failed to load");
                continue;
            }
        };
        let schedules = match module.data_export("schedule").await {
            Some(WireValue::Array(items)) => items,
            Some(_) | None => {
                warn!(job = %job.display_name, "job has no `schedule` array export");
                continue;
            }
        };
        for schedule in schedules {
            let WireValue::String(expression) = schedule else {
                warn!(job = %job.display_name, "non-string schedule entry skipped");
                continue;
            };
            let entry = ScheduledJob {
                module_path: job.module_path.clone(),
                display_name: job.display_name.clone(),
            };
            match scheduler.schedule(&expression, entry).await {
                Ok(()) => registered += 1,
                Err(err) => {
                    warn!(job = %job.display_name, %expression, %err, "schedule registration failed")
                }
            }
        }
    }
    info!(registered, "job schedules active");
    registered
}

/// Drop every subscription and re-run discovery (watcher event under
/// `src/jobs`).
pub async fn reload_jobs(
    fs: &dyn FileSystem,
    runtime: &dyn ModuleRuntime,
    scheduler: &dyn CronScheduler,
    project_root: &Path,
) -> usize {
    scheduler.stop_all().await;
    load_jobs(fs, runtime, scheduler, project_root).await
}
